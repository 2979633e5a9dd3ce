pub mod any_table;
pub mod blittable;
pub mod chunk;
pub mod managed;
pub mod table_set;

pub use any_table::AnyTable;
pub use blittable::BlittableTable;
pub use managed::ManagedTable;
pub use table_set::TableSet;
