use std::fmt::{Display, Formatter};
use std::sync::Arc;

use scribe_core::{AppError, AppResult};
use scribe_domain::{AuditRecord, resolve_entity_id};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::recorder_ports::{AuditSink, Clock, UnitOfWork, ValueSerializer};

mod snapshot;
mod synthesizer;

pub use snapshot::ChangeSnapshot;
pub use synthesizer::AuditSynthesizer;

/// Phases of one audited commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPhase {
    /// Pending changes are being snapshotted and partitioned.
    Collecting,
    /// Records for modified and deleted entries are being synthesized.
    PreCommitSynthesis,
    /// The underlying commit is running.
    Committing,
    /// Records for added entries are being synthesized with assigned identifiers.
    PostCommitSynthesis,
    /// All records were appended and the commit result is returned.
    Appended,
    /// The attempt failed; nothing from it was appended.
    Aborted,
}

impl CommitPhase {
    /// Returns a stable label for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collecting => "collecting",
            Self::PreCommitSynthesis => "pre_commit_synthesis",
            Self::Committing => "committing",
            Self::PostCommitSynthesis => "post_commit_synthesis",
            Self::Appended => "appended",
            Self::Aborted => "aborted",
        }
    }

    /// Returns whether cancellation is still honoured in this phase.
    #[must_use]
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Collecting | Self::PreCommitSynthesis)
    }
}

impl Display for CommitPhase {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Saves a unit of work and appends the audit trail of every change it commits.
#[derive(Clone)]
pub struct AuditRecorder {
    unit_of_work: Arc<dyn UnitOfWork>,
    audit_sink: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    synthesizer: AuditSynthesizer,
}

struct CommitAttempt {
    id: Uuid,
    phase: CommitPhase,
}

impl CommitAttempt {
    fn start() -> Self {
        let attempt = Self {
            id: Uuid::new_v4(),
            phase: CommitPhase::Collecting,
        };
        debug!(attempt_id = %attempt.id, phase = %attempt.phase, "commit attempt started");
        attempt
    }

    fn advance(&mut self, next: CommitPhase) {
        debug!(attempt_id = %self.id, from = %self.phase, to = %next, "commit attempt advanced");
        self.phase = next;
    }

    fn ensure_not_cancelled(&self, cancellation: &CancellationToken) -> AppResult<()> {
        if self.phase.is_cancellable() && cancellation.is_cancelled() {
            return Err(AppError::Cancelled(format!(
                "save cancelled during {}",
                self.phase
            )));
        }

        Ok(())
    }

    fn abort(&mut self, error: &AppError) {
        warn!(
            attempt_id = %self.id,
            phase = %self.phase,
            error = %error,
            "commit attempt aborted"
        );
        self.phase = CommitPhase::Aborted;
    }
}

impl AuditRecorder {
    /// Creates a recorder for one unit of work.
    #[must_use]
    pub fn new(
        unit_of_work: Arc<dyn UnitOfWork>,
        audit_sink: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        serializer: Arc<dyn ValueSerializer>,
    ) -> Self {
        Self {
            unit_of_work,
            audit_sink,
            clock,
            synthesizer: AuditSynthesizer::new(serializer),
        }
    }

    /// Commits pending changes, blocking the calling thread, and returns the affected row count.
    ///
    /// Runs the same state machine as [`AuditRecorder::save_async`] on a private
    /// current-thread runtime, so it must not be called from inside an async runtime.
    pub fn save(&self) -> AppResult<u64> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(AppError::Internal(
                "blocking save called inside an async runtime; use save_async instead".to_owned(),
            ));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                AppError::Internal(format!("failed to build blocking save runtime: {error}"))
            })?;

        runtime.block_on(self.save_async(&CancellationToken::new()))
    }

    /// Commits pending changes and returns the affected row count.
    ///
    /// Cancellation is honoured until the underlying commit starts; a cancelled
    /// attempt discards its synthesized records and leaves the unit of work untouched.
    pub async fn save_async(&self, cancellation: &CancellationToken) -> AppResult<u64> {
        let mut attempt = CommitAttempt::start();
        match self.run_attempt(&mut attempt, cancellation).await {
            Ok(affected_rows) => Ok(affected_rows),
            Err(error) => {
                attempt.abort(&error);
                Err(error)
            }
        }
    }

    async fn run_attempt(
        &self,
        attempt: &mut CommitAttempt,
        cancellation: &CancellationToken,
    ) -> AppResult<u64> {
        let snapshot = ChangeSnapshot::collect(self.unit_of_work.pending_changes().await?);
        if snapshot.is_empty() {
            debug!(attempt_id = %attempt.id, "no pending writes to audit");
        }
        attempt.ensure_not_cancelled(cancellation)?;

        attempt.advance(CommitPhase::PreCommitSynthesis);
        let pre_commit_at = self.clock.now();
        let mut records = Vec::new();
        for change in snapshot.identifier_known() {
            records.extend(
                self.synthesizer
                    .synthesize(change, change.state, pre_commit_at)?,
            );
        }
        attempt.ensure_not_cancelled(cancellation)?;

        attempt.advance(CommitPhase::Committing);
        let affected_rows = self.unit_of_work.commit(cancellation).await?;

        attempt.advance(CommitPhase::PostCommitSynthesis);
        let post_commit_at = self.clock.now().max(pre_commit_at);
        for change in snapshot.identifier_pending() {
            let key_value = self.unit_of_work.identifier_value(change.handle).await?;
            let entity_id = resolve_entity_id(
                change.entity_type_name.as_str(),
                change.key_field_name.as_str(),
                key_value.as_ref(),
            )?;
            records.extend(self.synthesizer.synthesize_resolved(
                change,
                change.state,
                entity_id,
                post_commit_at,
            )?);
        }

        let record_count = records.len();
        self.append(records).await?;
        attempt.advance(CommitPhase::Appended);

        info!(
            attempt_id = %attempt.id,
            affected_rows,
            record_count,
            "audited commit completed"
        );

        Ok(affected_rows)
    }

    async fn append(&self, records: Vec<AuditRecord>) -> AppResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        self.audit_sink.append_all(records).await
    }
}
