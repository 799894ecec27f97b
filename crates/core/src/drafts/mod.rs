//! Local recovery of in-progress wizard sessions.

pub mod manager;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::DraftConfig;
use crate::domain::counterparty::EntityId;
use crate::errors::DraftStoreError;
use crate::wizard::states::{payload_has_non_empty_field, StepId, WizardKind, WizardPayload};

pub use manager::{DraftPersistenceManager, RestorePrompt, SnapshotOutcome, VisibilityOutcome};

/// Entity segment used before the entity under construction has an id.
pub const NEW_ENTITY_KEY: &str = "new";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DraftKey {
    pub wizard: WizardKind,
    pub entity: Option<EntityId>,
}

impl DraftKey {
    pub fn new(wizard: WizardKind, entity: Option<EntityId>) -> Self {
        Self { wizard, entity }
    }

    pub fn entity_key(&self) -> &str {
        self.entity.as_ref().map_or(NEW_ENTITY_KEY, |entity| entity.0.as_str())
    }

    pub fn storage_key(&self) -> String {
        format!("draft:{}:{}", self.wizard.as_str(), self.entity_key())
    }

    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.strip_prefix("draft:")?;
        let (wizard, entity) = rest.split_once(':')?;
        let wizard = WizardKind::parse(wizard)?;
        let entity = match entity {
            "" => return None,
            NEW_ENTITY_KEY => None,
            other => Some(EntityId(other.to_owned())),
        };
        Some(Self { wizard, entity })
    }
}

impl fmt::Display for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSnapshot {
    pub current_step: StepId,
    pub furthest_reached_step: StepId,
    pub payload: WizardPayload,
    pub captured_at: DateTime<Utc>,
}

impl DraftSnapshot {
    /// Worth offering back to the user: progressed past the first step, or
    /// holds at least one filled-in field.
    pub fn is_meaningful(&self) -> bool {
        self.furthest_reached_step > StepId::FIRST || payload_has_non_empty_field(&self.payload)
    }

    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.captured_at > window
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotAssessment {
    Stale,
    Empty,
    Restorable,
}

pub fn assess_snapshot(
    snapshot: &DraftSnapshot,
    now: DateTime<Utc>,
    window: Duration,
) -> SnapshotAssessment {
    if snapshot.is_stale(now, window) {
        SnapshotAssessment::Stale
    } else if !snapshot.is_meaningful() {
        SnapshotAssessment::Empty
    } else {
        SnapshotAssessment::Restorable
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DraftPolicy {
    pub staleness_window: Duration,
    pub autosave_interval: StdDuration,
}

impl Default for DraftPolicy {
    fn default() -> Self {
        Self { staleness_window: Duration::days(7), autosave_interval: StdDuration::from_secs(15) }
    }
}

/// Shortest tick the autosave loop accepts.
pub const MIN_AUTOSAVE_PERIOD: StdDuration = StdDuration::from_millis(1);

impl DraftPolicy {
    /// Autosave tick, never shorter than [`MIN_AUTOSAVE_PERIOD`].
    pub fn autosave_period(&self) -> StdDuration {
        self.autosave_interval.max(MIN_AUTOSAVE_PERIOD)
    }
}

impl From<&DraftConfig> for DraftPolicy {
    fn from(settings: &DraftConfig) -> Self {
        Self {
            staleness_window: Duration::days(i64::from(settings.staleness_days)),
            autosave_interval: StdDuration::from_secs(settings.autosave_interval_secs),
        }
    }
}

/// Key-value store of one snapshot per draft key. `delete` of a missing key
/// succeeds.
#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn get(&self, key: &DraftKey) -> Result<Option<DraftSnapshot>, DraftStoreError>;
    async fn put(&self, key: &DraftKey, snapshot: &DraftSnapshot) -> Result<(), DraftStoreError>;
    async fn delete(&self, key: &DraftKey) -> Result<(), DraftStoreError>;
}

#[derive(Default)]
pub struct InMemoryDraftStore {
    drafts: RwLock<HashMap<String, DraftSnapshot>>,
}

impl InMemoryDraftStore {
    pub async fn len(&self) -> usize {
        self.drafts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.drafts.read().await.is_empty()
    }
}

#[async_trait]
impl DraftStore for InMemoryDraftStore {
    async fn get(&self, key: &DraftKey) -> Result<Option<DraftSnapshot>, DraftStoreError> {
        let drafts = self.drafts.read().await;
        Ok(drafts.get(&key.storage_key()).cloned())
    }

    async fn put(&self, key: &DraftKey, snapshot: &DraftSnapshot) -> Result<(), DraftStoreError> {
        let mut drafts = self.drafts.write().await;
        drafts.insert(key.storage_key(), snapshot.clone());
        Ok(())
    }

    async fn delete(&self, key: &DraftKey) -> Result<(), DraftStoreError> {
        let mut drafts = self.drafts.write().await;
        drafts.remove(&key.storage_key());
        Ok(())
    }
}
