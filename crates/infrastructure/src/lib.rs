//! Storage engines, audit sinks, and clock/serializer adapters for application ports.

#![forbid(unsafe_code)]

mod change_tracker;
mod in_memory_audit_sink;
mod in_memory_entity_store;
mod in_memory_unit_of_work;
mod json_value_serializer;
mod postgres_audit_sink;
mod postgres_migrations;
mod postgres_unit_of_work;
mod system_clock;

pub use change_tracker::ChangeTracker;
pub use in_memory_audit_sink::InMemoryAuditSink;
pub use in_memory_entity_store::{AppliedWrites, InMemoryEntityStore};
pub use in_memory_unit_of_work::InMemoryUnitOfWork;
pub use json_value_serializer::JsonValueSerializer;
pub use postgres_audit_sink::PostgresAuditSink;
pub use postgres_migrations::run_migrations;
pub use postgres_unit_of_work::PostgresUnitOfWork;
pub use system_clock::SystemClock;
