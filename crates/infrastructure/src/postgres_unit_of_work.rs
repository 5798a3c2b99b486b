use async_trait::async_trait;
use scribe_application::{CancellationToken, UnitOfWork};
use scribe_core::{AppError, AppResult};
use scribe_domain::{EntitySchema, EntityState, EntryHandle, FieldValues, PendingChange};
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;
use tracing::debug;

use crate::ChangeTracker;

/// PostgreSQL-backed unit of work.
///
/// Entities live in `tracked_entities`; the key field is stored in the `id`
/// column and every other field inside the `data` document.
pub struct PostgresUnitOfWork {
    pool: PgPool,
    tracker: Mutex<ChangeTracker>,
}

impl PostgresUnitOfWork {
    /// Creates a unit of work for the provided schemas.
    #[must_use]
    pub fn new(pool: PgPool, schemas: impl IntoIterator<Item = EntitySchema>) -> Self {
        Self {
            pool,
            tracker: Mutex::new(ChangeTracker::new(schemas)),
        }
    }

    /// Stages a new entity for insertion.
    pub async fn add(
        &self,
        entity_type_name: &str,
        values: Map<String, Value>,
    ) -> AppResult<EntryHandle> {
        self.tracker.lock().await.add(entity_type_name, values)
    }

    /// Loads a stored entity and starts tracking it.
    ///
    /// Returns the existing handle when the entity is already tracked.
    pub async fn load(&self, entity_type_name: &str, entity_id: i64) -> AppResult<EntryHandle> {
        let mut tracker = self.tracker.lock().await;
        if let Some(handle) = tracker.find(entity_type_name, entity_id) {
            return Ok(handle);
        }
        let key_field_name = tracker
            .schema(entity_type_name)?
            .key_field_name()
            .as_str()
            .to_owned();

        let data: Option<Value> = sqlx::query_scalar(
            r#"
            SELECT data
            FROM tracked_entities
            WHERE entity_type_name = $1 AND id = $2
            "#,
        )
        .bind(entity_type_name)
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load entity '{entity_type_name}' with identifier {entity_id}: {error}"
            ))
        })?;

        let Some(Value::Object(mut values)) = data else {
            return Err(AppError::NotFound(format!(
                "entity '{entity_type_name}' with identifier {entity_id} does not exist"
            )));
        };
        values.insert(key_field_name, Value::from(entity_id));

        tracker.attach(entity_type_name, values)
    }

    /// Changes one field of a tracked entity.
    pub async fn set_field(
        &self,
        handle: EntryHandle,
        field_name: &str,
        value: Value,
    ) -> AppResult<()> {
        self.tracker.lock().await.set_field(handle, field_name, value)
    }

    /// Marks a tracked entity for deletion.
    pub async fn remove(&self, handle: EntryHandle) -> AppResult<()> {
        self.tracker.lock().await.remove(handle)
    }

    /// Returns the tracking state of an entry.
    pub async fn state(&self, handle: EntryHandle) -> EntityState {
        self.tracker.lock().await.state(handle)
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn pending_changes(&self) -> AppResult<Vec<PendingChange>> {
        Ok(self.tracker.lock().await.snapshot())
    }

    async fn commit(&self, cancellation: &CancellationToken) -> AppResult<u64> {
        let mut tracker = self.tracker.lock().await;
        if !tracker.has_changes() {
            return Ok(0);
        }
        let changes = tracker.snapshot();
        if cancellation.is_cancelled() {
            return Err(AppError::Cancelled(
                "commit cancelled before the transaction started".to_owned(),
            ));
        }

        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start unit of work transaction: {error}"))
        })?;

        let mut affected_rows = 0;
        let mut assigned_ids = Vec::new();
        for change in &changes {
            match change.state {
                EntityState::Added => {
                    let entity_id = insert_entity(&mut transaction, change).await?;
                    assigned_ids.push((change.handle, entity_id));
                }
                EntityState::Modified => update_entity(&mut transaction, change).await?,
                EntityState::Deleted => delete_entity(&mut transaction, change).await?,
                EntityState::Unchanged | EntityState::Detached => continue,
            }
            affected_rows += 1;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit unit of work transaction: {error}"))
        })?;

        for (handle, entity_id) in assigned_ids {
            tracker.assign_identifier(handle, entity_id)?;
        }
        tracker.accept_changes();
        debug!(affected_rows, "unit of work committed");

        Ok(affected_rows)
    }

    async fn identifier_value(&self, handle: EntryHandle) -> AppResult<Option<Value>> {
        Ok(self.tracker.lock().await.identifier_value(handle))
    }
}

async fn insert_entity(
    transaction: &mut Transaction<'_, Postgres>,
    change: &PendingChange,
) -> AppResult<i64> {
    let explicit_id = key_value(change.current_values.as_ref(), change)
        .filter(|value| !value.is_null())
        .map(|value| {
            value.as_i64().ok_or_else(|| {
                AppError::Validation(format!(
                    "identifier of new '{}' must be an integer or null",
                    change.entity_type_name
                ))
            })
        })
        .transpose()?;
    let data = document(change);

    let result = match explicit_id {
        Some(entity_id) => {
            sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO tracked_entities (entity_type_name, id, data)
                VALUES ($1, $2, $3)
                RETURNING id
                "#,
            )
            .bind(change.entity_type_name.as_str())
            .bind(entity_id)
            .bind(data)
            .fetch_one(&mut **transaction)
            .await
        }
        None => {
            sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO tracked_entities (entity_type_name, data)
                VALUES ($1, $2)
                RETURNING id
                "#,
            )
            .bind(change.entity_type_name.as_str())
            .bind(data)
            .fetch_one(&mut **transaction)
            .await
        }
    };

    let entity_id = result.map_err(|error| {
        if let sqlx::Error::Database(database_error) = &error
            && database_error.code().as_deref() == Some("23505")
        {
            return AppError::Conflict(format!(
                "entity '{}' with identifier {} already exists",
                change.entity_type_name,
                explicit_id.map_or_else(|| "<generated>".to_owned(), |id| id.to_string())
            ));
        }

        AppError::Internal(format!(
            "failed to insert entity '{}': {error}",
            change.entity_type_name
        ))
    })?;

    // Generated identifiers must stay ahead of explicit ones.
    if explicit_id.is_some() {
        sqlx::query(
            r#"
            SELECT setval(
                'tracked_entities_id_seq',
                GREATEST($1, (SELECT last_value FROM tracked_entities_id_seq)),
                true
            )
            "#,
        )
        .bind(entity_id)
        .execute(&mut **transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to advance identifier sequence for '{}': {error}",
                change.entity_type_name
            ))
        })?;
    }

    Ok(entity_id)
}

async fn update_entity(
    transaction: &mut Transaction<'_, Postgres>,
    change: &PendingChange,
) -> AppResult<()> {
    let entity_id = stored_id(change)?;
    let updated = sqlx::query(
        r#"
        UPDATE tracked_entities
        SET data = $3, updated_at = now()
        WHERE entity_type_name = $1 AND id = $2
        "#,
    )
    .bind(change.entity_type_name.as_str())
    .bind(entity_id)
    .bind(document(change))
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to update entity '{}' with identifier {entity_id}: {error}",
            change.entity_type_name
        ))
    })?;

    if updated.rows_affected() == 0 {
        return Err(AppError::Conflict(format!(
            "entity '{}' with identifier {entity_id} no longer exists",
            change.entity_type_name
        )));
    }

    Ok(())
}

async fn delete_entity(
    transaction: &mut Transaction<'_, Postgres>,
    change: &PendingChange,
) -> AppResult<()> {
    let entity_id = stored_id(change)?;
    let deleted = sqlx::query(
        r#"
        DELETE FROM tracked_entities
        WHERE entity_type_name = $1 AND id = $2
        "#,
    )
    .bind(change.entity_type_name.as_str())
    .bind(entity_id)
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to delete entity '{}' with identifier {entity_id}: {error}",
            change.entity_type_name
        ))
    })?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::Conflict(format!(
            "entity '{}' with identifier {entity_id} no longer exists",
            change.entity_type_name
        )));
    }

    Ok(())
}

fn key_value<'a>(
    values: Option<&'a FieldValues>,
    change: &PendingChange,
) -> Option<&'a Value> {
    values.and_then(|values| values.get(change.key_field_name.as_str()))
}

fn stored_id(change: &PendingChange) -> AppResult<i64> {
    key_value(change.prior_values.as_ref(), change)
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            AppError::Validation(format!(
                "stored '{}' has no integer identifier",
                change.entity_type_name
            ))
        })
}

fn document(change: &PendingChange) -> Value {
    let mut values = change.current_values.clone().unwrap_or_default();
    values.remove(change.key_field_name.as_str());
    values.to_json_object()
}
