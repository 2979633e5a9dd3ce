use thiserror::Error;

/// Errors surfaced at the store/view API boundary.
///
/// `CircularDependency` and `ImmutabilityViolation` are fatal and meant to
/// abort start-up; the rest are returned to the caller, or in the command
/// buffer's case counted and dropped rather than propagated (fail-soft).
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("entity {0:?} is not alive")]
    DeadEntity(crate::entity::Entity),

    #[error("component type {0} is not registered")]
    UnknownType(crate::component::ComponentTypeId),

    #[error("event type {0} is not registered")]
    UnregisteredEvent(crate::component::ComponentTypeId),

    #[error("component type {0} accessed through the wrong tier")]
    TierMismatch(crate::component::ComponentTypeId),

    #[error("component type {0} is already registered")]
    DuplicateType(crate::component::ComponentTypeId),

    #[error("entity {0:?} has no component of type {1}")]
    ComponentNotFound(crate::entity::Entity, crate::component::ComponentTypeId),

    #[error("managed type {0} failed the immutability check: {1}")]
    ImmutabilityViolation(&'static str, String),

    #[error("module graph has a circular before/after dependency: {0}")]
    CircularDependency(String),

    #[error("operation timed out")]
    TimeoutExceeded,

    #[error("module {0} panicked: {1}")]
    ModulePanic(String, String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, KernelError>;
