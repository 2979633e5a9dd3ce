//! Kernel configuration.
//!
//! Supports TOML config files, environment variable overrides, and defaults,
//! the same layering the host process uses for its own configuration.

use crate::error::{KernelError, Result};
use crate::storage::chunk::{DEFAULT_CHUNK_BYTES, DEFAULT_CHUNK_CAPACITY};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Floor on retained event history regardless of configuration — see
/// [`crate::events::MIN_HISTORY_FRAMES`] for why this can't go lower.
const ABSOLUTE_MIN_HISTORY_FRAMES: usize = crate::events::MIN_HISTORY_FRAMES;

/// Kernel-wide configuration recognized by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Lower bound on retained event frame batches (default ~3s worth at
    /// `frame_rate_hz`).
    pub min_history_frames: usize,
    /// Upper bound on retained event frame batches; exceeding it sets the
    /// `data_loss` flag on flushed views rather than growing unbounded.
    pub max_history_frames: usize,
    /// Slots per chunk for the managed tier (fixed per build).
    pub chunk_capacity: usize,
    /// Bytes per blittable chunk.
    pub chunk_bytes: usize,
    /// Size of the worker pool used for asynchronous modules.
    pub workers: usize,
    /// Drives the period computation backing each module's `frequency_hz`.
    pub frame_rate_hz: f64,
    /// Open → half-open timeout for a tripped circuit breaker, milliseconds.
    pub circuit_reset_ms: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        let frame_rate_hz = 60.0;
        Self {
            min_history_frames: (frame_rate_hz * 3.0) as usize,
            max_history_frames: crate::events::MAX_HISTORY_FRAMES,
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            workers: 4,
            frame_rate_hz,
            circuit_reset_ms: 5_000,
        }
    }
}

impl KernelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| KernelError::ConfigError(format!("failed to read config file: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| KernelError::ConfigError(format!("invalid TOML: {e}")))
    }

    /// Saves the configuration to a TOML file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| KernelError::ConfigError(format!("failed to serialize config: {e}")))?;
        std::fs::write(path.as_ref(), toml)
            .map_err(|e| KernelError::ConfigError(format!("failed to write config file: {e}")))?;
        Ok(())
    }

    /// Applies environment variable overrides, prefixed `KERNEL_`.
    /// Example: `KERNEL_WORKERS=8` overrides `workers`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var("KERNEL_MIN_HISTORY_FRAMES") {
            self.min_history_frames = val
                .parse()
                .map_err(|_| KernelError::ConfigError(format!("invalid min_history_frames: {val}")))?;
        }
        if let Ok(val) = env::var("KERNEL_MAX_HISTORY_FRAMES") {
            self.max_history_frames = val
                .parse()
                .map_err(|_| KernelError::ConfigError(format!("invalid max_history_frames: {val}")))?;
        }
        if let Ok(val) = env::var("KERNEL_CHUNK_CAPACITY") {
            self.chunk_capacity = val
                .parse()
                .map_err(|_| KernelError::ConfigError(format!("invalid chunk_capacity: {val}")))?;
        }
        if let Ok(val) = env::var("KERNEL_CHUNK_BYTES") {
            self.chunk_bytes = val
                .parse()
                .map_err(|_| KernelError::ConfigError(format!("invalid chunk_bytes: {val}")))?;
        }
        if let Ok(val) = env::var("KERNEL_WORKERS") {
            self.workers = val
                .parse()
                .map_err(|_| KernelError::ConfigError(format!("invalid workers: {val}")))?;
        }
        if let Ok(val) = env::var("KERNEL_FRAME_RATE_HZ") {
            self.frame_rate_hz = val
                .parse()
                .map_err(|_| KernelError::ConfigError(format!("invalid frame_rate_hz: {val}")))?;
        }
        if let Ok(val) = env::var("KERNEL_CIRCUIT_RESET_MS") {
            self.circuit_reset_ms = val
                .parse()
                .map_err(|_| KernelError::ConfigError(format!("invalid circuit_reset_ms: {val}")))?;
        }
        self.validate()
    }

    /// Clamps/validates fields that have a hard floor independent of what
    /// the file or environment specified.
    pub fn validate(&mut self) -> Result<()> {
        if self.chunk_capacity == 0 {
            return Err(KernelError::ConfigError("chunk_capacity must be non-zero".into()));
        }
        if self.chunk_bytes == 0 {
            return Err(KernelError::ConfigError("chunk_bytes must be non-zero".into()));
        }
        if self.frame_rate_hz <= 0.0 {
            return Err(KernelError::ConfigError("frame_rate_hz must be positive".into()));
        }
        self.min_history_frames = self.min_history_frames.max(ABSOLUTE_MIN_HISTORY_FRAMES);
        self.max_history_frames = self.max_history_frames.max(self.min_history_frames);
        Ok(())
    }

    pub fn circuit_reset(&self) -> Duration {
        Duration::from_millis(self.circuit_reset_ms)
    }

    /// Wall-clock period of one tick at `frame_rate_hz`.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate_hz)
    }
}
