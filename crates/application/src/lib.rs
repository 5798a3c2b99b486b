//! Application services and ports.

#![forbid(unsafe_code)]

mod audit_recorder;
mod recorder_ports;

pub use audit_recorder::{AuditRecorder, AuditSynthesizer, ChangeSnapshot, CommitPhase};
pub use recorder_ports::{AuditSink, Clock, UnitOfWork, ValueSerializer};
pub use tokio_util::sync::CancellationToken;
