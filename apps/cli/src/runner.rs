use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use scribe_application::{AuditRecorder, AuditSink, CancellationToken, UnitOfWork};
use scribe_core::AppResult;
use scribe_domain::{AuditRecord, EntryHandle};
use scribe_infrastructure::{
    InMemoryUnitOfWork, JsonValueSerializer, PostgresUnitOfWork, SystemClock,
};
use serde_json::{Map, Value};
use tracing::info;

use crate::script::ScriptStep;

/// Unit of work for the selected storage engine.
#[derive(Clone)]
pub enum Staging {
    Memory(Arc<InMemoryUnitOfWork>),
    Postgres(Arc<PostgresUnitOfWork>),
}

impl Staging {
    async fn add(
        &self,
        entity_type_name: &str,
        values: Map<String, Value>,
    ) -> AppResult<EntryHandle> {
        match self {
            Self::Memory(unit_of_work) => unit_of_work.add(entity_type_name, values).await,
            Self::Postgres(unit_of_work) => unit_of_work.add(entity_type_name, values).await,
        }
    }

    async fn load(&self, entity_type_name: &str, entity_id: i64) -> AppResult<EntryHandle> {
        match self {
            Self::Memory(unit_of_work) => unit_of_work.load(entity_type_name, entity_id).await,
            Self::Postgres(unit_of_work) => unit_of_work.load(entity_type_name, entity_id).await,
        }
    }

    async fn set_field(
        &self,
        handle: EntryHandle,
        field_name: &str,
        value: Value,
    ) -> AppResult<()> {
        match self {
            Self::Memory(unit_of_work) => unit_of_work.set_field(handle, field_name, value).await,
            Self::Postgres(unit_of_work) => unit_of_work.set_field(handle, field_name, value).await,
        }
    }

    async fn remove(&self, handle: EntryHandle) -> AppResult<()> {
        match self {
            Self::Memory(unit_of_work) => unit_of_work.remove(handle).await,
            Self::Postgres(unit_of_work) => unit_of_work.remove(handle).await,
        }
    }

    fn unit_of_work(&self) -> Arc<dyn UnitOfWork> {
        match self {
            Self::Memory(unit_of_work) => unit_of_work.clone(),
            Self::Postgres(unit_of_work) => unit_of_work.clone(),
        }
    }
}

/// Audit sink wrapper that counts appended records.
pub struct CountingAuditSink {
    inner: Arc<dyn AuditSink>,
    appended: AtomicUsize,
}

impl CountingAuditSink {
    pub fn new(inner: Arc<dyn AuditSink>) -> Self {
        Self {
            inner,
            appended: AtomicUsize::new(0),
        }
    }

    pub fn appended(&self) -> usize {
        self.appended.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AuditSink for CountingAuditSink {
    async fn append_all(&self, records: Vec<AuditRecord>) -> AppResult<()> {
        let record_count = records.len();
        self.inner.append_all(records).await?;
        self.appended.fetch_add(record_count, Ordering::Relaxed);
        Ok(())
    }
}

/// Totals reported after a script run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub saves: usize,
    pub affected_rows: u64,
    pub audit_records: usize,
}

/// Stages script steps and saves them through an [`AuditRecorder`].
pub struct ScriptRunner {
    staging: Staging,
    recorder: AuditRecorder,
    sink: Arc<CountingAuditSink>,
}

impl ScriptRunner {
    pub fn new(staging: Staging, audit_sink: Arc<dyn AuditSink>) -> Self {
        let sink = Arc::new(CountingAuditSink::new(audit_sink));
        let recorder = AuditRecorder::new(
            staging.unit_of_work(),
            sink.clone(),
            Arc::new(SystemClock),
            Arc::new(JsonValueSerializer),
        );

        Self {
            staging,
            recorder,
            sink,
        }
    }

    /// Runs every step; changes staged after the last `save` are saved at the end.
    pub async fn run(
        &self,
        steps: Vec<ScriptStep>,
        cancellation: &CancellationToken,
    ) -> AppResult<ApplySummary> {
        let mut summary = ApplySummary::default();
        let mut staged = false;

        for step in steps {
            match step {
                ScriptStep::Create {
                    entity_type_name,
                    values,
                } => {
                    self.staging.add(entity_type_name.as_str(), values).await?;
                    staged = true;
                }
                ScriptStep::Update {
                    entity_type_name,
                    id,
                    values,
                } => {
                    let handle = self.staging.load(entity_type_name.as_str(), id).await?;
                    for (field_name, value) in values {
                        self.staging
                            .set_field(handle, field_name.as_str(), value)
                            .await?;
                    }
                    staged = true;
                }
                ScriptStep::Delete {
                    entity_type_name,
                    id,
                } => {
                    let handle = self.staging.load(entity_type_name.as_str(), id).await?;
                    self.staging.remove(handle).await?;
                    staged = true;
                }
                ScriptStep::Save => {
                    self.save(&mut summary, cancellation).await?;
                    staged = false;
                }
            }
        }

        if staged {
            self.save(&mut summary, cancellation).await?;
        }
        summary.audit_records = self.sink.appended();

        Ok(summary)
    }

    async fn save(
        &self,
        summary: &mut ApplySummary,
        cancellation: &CancellationToken,
    ) -> AppResult<()> {
        let affected_rows = self.recorder.save_async(cancellation).await?;
        summary.saves += 1;
        summary.affected_rows += affected_rows;
        info!(save = summary.saves, affected_rows, "script batch saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use scribe_application::CancellationToken;
    use scribe_core::AppError;
    use scribe_domain::AuditOperation;
    use scribe_infrastructure::{InMemoryAuditSink, InMemoryEntityStore, InMemoryUnitOfWork};

    use super::{ScriptRunner, Staging};
    use crate::script::ChangeScript;

    const SCRIPT: &str = r#"{
        "schemas": [
            {"entity_type_name": "customer", "key_field_name": "id", "field_names": ["id", "name"]}
        ],
        "steps": [
            {"op": "create", "entity_type_name": "customer", "values": {"name": "A"}},
            {"op": "save"},
            {"op": "update", "entity_type_name": "customer", "id": 1, "values": {"name": "B"}},
            {"op": "save"},
            {"op": "delete", "entity_type_name": "customer", "id": 1}
        ]
    }"#;

    fn runner(script: &ChangeScript) -> (ScriptRunner, Arc<InMemoryAuditSink>) {
        let schemas = script.entity_schemas().unwrap_or_else(|_| unreachable!());
        let unit_of_work = Arc::new(InMemoryUnitOfWork::new(
            Arc::new(InMemoryEntityStore::new()),
            schemas,
        ));
        let sink = Arc::new(InMemoryAuditSink::new());
        (
            ScriptRunner::new(Staging::Memory(unit_of_work), sink.clone()),
            sink,
        )
    }

    #[tokio::test]
    async fn script_saves_each_batch_and_the_trailing_changes() {
        let script = ChangeScript::parse(SCRIPT).unwrap_or_else(|_| unreachable!());
        let (runner, sink) = runner(&script);

        let summary = runner
            .run(script.steps.clone(), &CancellationToken::new())
            .await
            .unwrap_or_default();

        assert_eq!(summary.saves, 3);
        assert_eq!(summary.affected_rows, 3);
        assert_eq!(summary.audit_records, 3);
        let operations: Vec<_> = sink
            .records()
            .await
            .iter()
            .map(|record| record.operation())
            .collect();
        assert_eq!(
            operations,
            vec![
                AuditOperation::Created,
                AuditOperation::Updated,
                AuditOperation::Deleted
            ]
        );
    }

    #[tokio::test]
    async fn updating_unknown_entity_stops_the_run() {
        let script = ChangeScript::parse(
            r#"{
                "schemas": [
                    {"entity_type_name": "customer", "key_field_name": "id", "field_names": ["id", "name"]}
                ],
                "steps": [
                    {"op": "update", "entity_type_name": "customer", "id": 9, "values": {"name": "B"}}
                ]
            }"#,
        )
        .unwrap_or_else(|_| unreachable!());
        let (runner, sink) = runner(&script);

        let result = runner
            .run(script.steps.clone(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(sink.records().await.is_empty());
    }

    #[tokio::test]
    async fn cancelled_run_saves_nothing() {
        let script = ChangeScript::parse(SCRIPT).unwrap_or_else(|_| unreachable!());
        let (runner, sink) = runner(&script);
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let result = runner.run(script.steps.clone(), &cancellation).await;

        assert!(matches!(result, Err(AppError::Cancelled(_))));
        assert!(sink.records().await.is_empty());
    }
}
