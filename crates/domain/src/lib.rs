//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod audit;
mod change;
mod field_values;
mod schema;
mod state;

pub use audit::{AuditOperation, AuditRecord};
pub use change::{EntryHandle, PendingChange, resolve_entity_id};
pub use field_values::FieldValues;
pub use schema::EntitySchema;
pub use state::EntityState;
