mod audit_sink;
mod clock;
mod unit_of_work;
mod value_serializer;

pub use audit_sink::AuditSink;
pub use clock::Clock;
pub use unit_of_work::UnitOfWork;
pub use value_serializer::ValueSerializer;
