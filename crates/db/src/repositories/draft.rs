use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;

use dealdesk_core::drafts::{DraftKey, DraftSnapshot, DraftStore};
use dealdesk_core::errors::DraftStoreError;
use dealdesk_core::wizard::{StepId, WizardKind};

use super::RepositoryError;
use crate::DbPool;

/// A stored draft together with the key it was saved under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DraftRecord {
    pub key: DraftKey,
    pub snapshot: DraftSnapshot,
}

pub struct SqlDraftStore {
    pool: DbPool,
}

impl SqlDraftStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<DraftRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT draft_key, wizard_kind, entity_key, current_step, furthest_step,
                    payload_json, captured_at
             FROM wizard_draft
             ORDER BY captured_at DESC, draft_key",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    pub async fn find(&self, key: &DraftKey) -> Result<Option<DraftSnapshot>, RepositoryError> {
        let row = sqlx::query(
            "SELECT draft_key, wizard_kind, entity_key, current_step, furthest_step,
                    payload_json, captured_at
             FROM wizard_draft WHERE draft_key = ?",
        )
        .bind(key.storage_key())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_record(r)?.snapshot)),
            None => Ok(None),
        }
    }

    pub async fn save(
        &self,
        key: &DraftKey,
        snapshot: &DraftSnapshot,
    ) -> Result<(), RepositoryError> {
        let payload_json = serde_json::to_string(&snapshot.payload)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO wizard_draft (draft_key, wizard_kind, entity_key, current_step,
                                       furthest_step, payload_json, captured_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(draft_key) DO UPDATE SET
                 current_step = excluded.current_step,
                 furthest_step = excluded.furthest_step,
                 payload_json = excluded.payload_json,
                 captured_at = excluded.captured_at",
        )
        .bind(key.storage_key())
        .bind(key.wizard.as_str())
        .bind(key.entity_key())
        .bind(i64::from(snapshot.current_step.0))
        .bind(i64::from(snapshot.furthest_reached_step.0))
        .bind(payload_json)
        .bind(format_timestamp(snapshot.captured_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn remove(&self, key: &DraftKey) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM wizard_draft WHERE draft_key = ?")
            .bind(key.storage_key())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every draft captured strictly before `cutoff` and returns how
    /// many rows went.
    pub async fn purge_captured_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM wizard_draft WHERE captured_at < ?")
            .bind(format_timestamp(cutoff))
            .execute(&self.pool)
            .await?;

        let purged = result.rows_affected();
        tracing::info!(
            event_name = "draft.purged",
            purged,
            cutoff = %cutoff,
            "purged stale drafts"
        );
        Ok(purged)
    }
}

#[async_trait::async_trait]
impl DraftStore for SqlDraftStore {
    async fn get(&self, key: &DraftKey) -> Result<Option<DraftSnapshot>, DraftStoreError> {
        Ok(self.find(key).await?)
    }

    async fn put(&self, key: &DraftKey, snapshot: &DraftSnapshot) -> Result<(), DraftStoreError> {
        Ok(self.save(key, snapshot).await?)
    }

    async fn delete(&self, key: &DraftKey) -> Result<(), DraftStoreError> {
        self.remove(key).await?;
        Ok(())
    }
}

// Fixed-width UTC text so that lexical order in SQLite matches time order.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<DraftRecord, RepositoryError> {
    let wizard_kind: String =
        row.try_get("wizard_kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entity_key: String =
        row.try_get("entity_key").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let current_step: i64 =
        row.try_get("current_step").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let furthest_step: i64 =
        row.try_get("furthest_step").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let payload_json: String =
        row.try_get("payload_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let captured_at_str: String =
        row.try_get("captured_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let wizard = WizardKind::parse(&wizard_kind)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown wizard kind `{wizard_kind}`")))?;
    let key = DraftKey::parse(&format!("draft:{}:{entity_key}", wizard.as_str()))
        .ok_or_else(|| RepositoryError::Decode(format!("invalid entity key `{entity_key}`")))?;
    let payload = serde_json::from_str(&payload_json)
        .map_err(|e| RepositoryError::Decode(format!("payload_json: {e}")))?;
    let captured_at = DateTime::parse_from_rfc3339(&captured_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("captured_at: {e}")))?;

    Ok(DraftRecord {
        key,
        snapshot: DraftSnapshot {
            current_step: decode_step("current_step", current_step)?,
            furthest_reached_step: decode_step("furthest_step", furthest_step)?,
            payload,
            captured_at,
        },
    })
}

fn decode_step(column: &str, raw: i64) -> Result<StepId, RepositoryError> {
    u8::try_from(raw)
        .ok()
        .filter(|step| *step >= 1)
        .map(StepId)
        .ok_or_else(|| RepositoryError::Decode(format!("{column} out of range: {raw}")))
}
