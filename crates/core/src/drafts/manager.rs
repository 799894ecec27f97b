use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::batch::BatchReport;
use crate::drafts::{
    assess_snapshot, DraftKey, DraftPolicy, DraftSnapshot, DraftStore, SnapshotAssessment,
};
use crate::wizard::engine::{WizardFlow, WizardStateMachine};
use crate::wizard::states::StepId;

/// What the host should show after a visibility change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VisibilityOutcome {
    /// Opened with no usable draft; the wizard starts fresh.
    Fresh,
    /// Opened with a restorable draft; the wizard body stays blocked until
    /// [`DraftPersistenceManager::restore`] or [`DraftPersistenceManager::discard`].
    PromptRestore(RestorePrompt),
    /// No open/close transition happened.
    Unchanged,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestorePrompt {
    pub current_step: StepId,
    pub furthest_reached_step: StepId,
    pub captured_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Written,
    SkippedClosed,
    SkippedTerminalStep,
    SkippedPendingPrompt,
    /// The stored draft is still being read after the open edge.
    SkippedLoading,
    Failed,
}

#[derive(Debug, Default)]
struct VisibilityState {
    open: bool,
    /// Bumped on every close -> open edge so a read that resolves after the
    /// wizard closed again is ignored.
    open_generation: u64,
    /// Set from the open edge until the stored draft has been assessed.
    loading: bool,
    pending: Option<DraftSnapshot>,
}

/// Snapshots one wizard instance into a [`DraftStore`] and decides, once per
/// open transition, whether the user is offered the stored draft back.
///
/// Store failures never reach the caller: they are logged and the wizard keeps
/// working without drafts.
pub struct DraftPersistenceManager {
    store: Arc<dyn DraftStore>,
    key: DraftKey,
    policy: DraftPolicy,
    state: Mutex<VisibilityState>,
}

impl DraftPersistenceManager {
    pub fn new(store: Arc<dyn DraftStore>, key: DraftKey, policy: DraftPolicy) -> Self {
        Self { store, key, policy, state: Mutex::new(VisibilityState::default()) }
    }

    pub fn key(&self) -> &DraftKey {
        &self.key
    }

    pub fn policy(&self) -> &DraftPolicy {
        &self.policy
    }

    pub fn is_open(&self) -> bool {
        self.lock_state().open
    }

    /// True while a restore prompt is unanswered.
    pub fn body_blocked(&self) -> bool {
        self.lock_state().pending.is_some()
    }

    /// True between the open edge and the end of the draft read.
    pub fn is_loading(&self) -> bool {
        self.lock_state().loading
    }

    /// Feeds the host's current visibility. Mount logic runs only on the
    /// closed -> open edge; repeated `true` calls are inert.
    pub async fn sync_visibility(&self, open: bool) -> VisibilityOutcome {
        let generation = {
            let mut state = self.lock_state();
            match (state.open, open) {
                (false, true) => {
                    state.open = true;
                    state.open_generation += 1;
                    state.loading = true;
                    state.pending = None;
                    state.open_generation
                }
                (true, false) => {
                    state.open = false;
                    state.loading = false;
                    state.pending = None;
                    debug!(event_name = "draft.closed", draft_key = %self.key, "wizard closed");
                    return VisibilityOutcome::Closed;
                }
                _ => return VisibilityOutcome::Unchanged,
            }
        };

        let snapshot = match self.store.get(&self.key).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return self.finish_loading(generation, VisibilityOutcome::Fresh),
            Err(error) => {
                warn!(
                    event_name = "draft.read_failed",
                    draft_key = %self.key,
                    error = %error,
                    "draft read failed; starting without draft support"
                );
                return self.finish_loading(generation, VisibilityOutcome::Fresh);
            }
        };

        match assess_snapshot(&snapshot, Utc::now(), self.policy.staleness_window) {
            SnapshotAssessment::Stale | SnapshotAssessment::Empty => {
                debug!(
                    event_name = "draft.dropped",
                    draft_key = %self.key,
                    captured_at = %snapshot.captured_at,
                    "stored draft is stale or empty; discarding silently"
                );
                self.delete_quietly().await;
                self.finish_loading(generation, VisibilityOutcome::Fresh)
            }
            SnapshotAssessment::Restorable => {
                let mut state = self.lock_state();
                if !state.open || state.open_generation != generation {
                    return VisibilityOutcome::Unchanged;
                }
                state.loading = false;
                let prompt = RestorePrompt {
                    current_step: snapshot.current_step,
                    furthest_reached_step: snapshot.furthest_reached_step,
                    captured_at: snapshot.captured_at,
                };
                state.pending = Some(snapshot);
                info!(
                    event_name = "draft.restore_offered",
                    draft_key = %self.key,
                    current_step = prompt.current_step.0,
                    "restorable draft found"
                );
                VisibilityOutcome::PromptRestore(prompt)
            }
        }
    }

    /// Applies the offered draft to `machine`. Returns false when no prompt
    /// was pending.
    pub fn restore<F: WizardFlow>(&self, machine: &mut WizardStateMachine<F>) -> bool {
        let Some(snapshot) = self.lock_state().pending.take() else {
            return false;
        };
        machine.apply_snapshot(
            snapshot.current_step,
            snapshot.furthest_reached_step,
            snapshot.payload,
        );
        info!(event_name = "draft.restored", draft_key = %self.key, "draft restored");
        true
    }

    /// Declines the offered draft and deletes it.
    pub async fn discard(&self) {
        self.lock_state().pending = None;
        self.delete_quietly().await;
        info!(event_name = "draft.discarded", draft_key = %self.key, "draft discarded");
    }

    /// Deletes the draft once a submission created at least one record.
    pub async fn clear_after_submit(&self, report: &BatchReport) -> bool {
        if !report.should_clear_draft() {
            return false;
        }
        self.lock_state().pending = None;
        self.delete_quietly().await;
        true
    }

    /// Builds the snapshot the next autosave would write, or the reason it
    /// would be skipped.
    pub fn capture<F: WizardFlow>(
        &self,
        machine: &WizardStateMachine<F>,
    ) -> Result<DraftSnapshot, SnapshotOutcome> {
        {
            let state = self.lock_state();
            if !state.open {
                return Err(SnapshotOutcome::SkippedClosed);
            }
            if state.loading {
                return Err(SnapshotOutcome::SkippedLoading);
            }
            if state.pending.is_some() {
                return Err(SnapshotOutcome::SkippedPendingPrompt);
            }
        }
        if machine.is_terminal_step() {
            return Err(SnapshotOutcome::SkippedTerminalStep);
        }

        let session = machine.session();
        Ok(DraftSnapshot {
            current_step: session.current_step,
            furthest_reached_step: session.furthest_reached_step,
            payload: session.payload.clone(),
            captured_at: Utc::now(),
        })
    }

    pub async fn snapshot<F: WizardFlow>(
        &self,
        machine: &WizardStateMachine<F>,
    ) -> SnapshotOutcome {
        match self.capture(machine) {
            Ok(snapshot) => self.write(&snapshot).await,
            Err(skipped) => skipped,
        }
    }

    pub async fn write(&self, snapshot: &DraftSnapshot) -> SnapshotOutcome {
        match self.store.put(&self.key, snapshot).await {
            Ok(()) => {
                debug!(
                    event_name = "draft.saved",
                    draft_key = %self.key,
                    current_step = snapshot.current_step.0,
                    "draft snapshot written"
                );
                SnapshotOutcome::Written
            }
            Err(error) => {
                warn!(
                    event_name = "draft.write_failed",
                    draft_key = %self.key,
                    error = %error,
                    "draft write failed"
                );
                SnapshotOutcome::Failed
            }
        }
    }

    /// Runs the autosave loop until `shutdown` flips to true or its sender is
    /// dropped. The wizard lock is released before the store write.
    pub fn spawn_autosave<F>(
        self: Arc<Self>,
        wizard: Arc<AsyncMutex<WizardStateMachine<F>>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()>
    where
        F: WizardFlow + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.policy.autosave_period());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let captured = {
                            let machine = wizard.lock().await;
                            self.capture(&machine)
                        };
                        if let Ok(snapshot) = captured {
                            self.write(&snapshot).await;
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!(
                event_name = "draft.autosave_stopped",
                draft_key = %self.key,
                "autosave stopped"
            );
        })
    }

    /// Ends the loading window opened by `generation`, unless the wizard was
    /// closed or reopened meanwhile.
    fn finish_loading(&self, generation: u64, outcome: VisibilityOutcome) -> VisibilityOutcome {
        let mut state = self.lock_state();
        if !state.open || state.open_generation != generation {
            return VisibilityOutcome::Unchanged;
        }
        state.loading = false;
        outcome
    }

    async fn delete_quietly(&self) {
        if let Err(error) = self.store.delete(&self.key).await {
            warn!(
                event_name = "draft.delete_failed",
                draft_key = %self.key,
                error = %error,
                "draft delete failed"
            );
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, VisibilityState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use tokio::sync::{watch, Mutex, Notify};

    use super::{DraftPersistenceManager, SnapshotOutcome, VisibilityOutcome};
    use crate::domain::field::FieldValue;
    use crate::drafts::{DraftKey, DraftPolicy, DraftSnapshot, DraftStore, InMemoryDraftStore};
    use crate::errors::DraftStoreError;
    use crate::wizard::engine::WizardStateMachine;
    use crate::wizard::flows::{vendor, VendorOnboardingFlow};
    use crate::wizard::states::{StepId, WizardKind, WizardPayload};

    fn key() -> DraftKey {
        DraftKey::new(WizardKind::VendorOnboarding, None)
    }

    fn filled_machine() -> WizardStateMachine<VendorOnboardingFlow> {
        let mut machine = WizardStateMachine::new(VendorOnboardingFlow);
        for (field, value) in [
            (vendor::LEGAL_NAME, "Acme GmbH"),
            (vendor::TAX_ID, "DE123456789"),
            (vendor::COUNTRY, "DE"),
        ] {
            machine.set_field(StepId(1), field, FieldValue::text(value)).expect("company step");
        }
        machine.go_next();
        machine
            .set_field(StepId(2), vendor::CONTACT_NAME, FieldValue::text("Dana"))
            .expect("contact step");
        machine
            .set_field(StepId(2), vendor::CONTACT_EMAIL, FieldValue::text("dana@acme.test"))
            .expect("contact step");
        machine.go_next();
        machine
    }

    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryDraftStore,
        reads: AtomicUsize,
        fail_reads: bool,
    }

    #[async_trait]
    impl DraftStore for CountingStore {
        async fn get(&self, key: &DraftKey) -> Result<Option<DraftSnapshot>, DraftStoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_reads {
                return Err(DraftStoreError::Storage("quota exceeded".to_owned()));
            }
            self.inner.get(key).await
        }

        async fn put(
            &self,
            key: &DraftKey,
            snapshot: &DraftSnapshot,
        ) -> Result<(), DraftStoreError> {
            self.inner.put(key, snapshot).await
        }

        async fn delete(&self, key: &DraftKey) -> Result<(), DraftStoreError> {
            self.inner.delete(key).await
        }
    }

    /// Holds every read until `release` is notified.
    #[derive(Default)]
    struct GatedStore {
        inner: InMemoryDraftStore,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl DraftStore for GatedStore {
        async fn get(&self, key: &DraftKey) -> Result<Option<DraftSnapshot>, DraftStoreError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.get(key).await
        }

        async fn put(
            &self,
            key: &DraftKey,
            snapshot: &DraftSnapshot,
        ) -> Result<(), DraftStoreError> {
            self.inner.put(key, snapshot).await
        }

        async fn delete(&self, key: &DraftKey) -> Result<(), DraftStoreError> {
            self.inner.delete(key).await
        }
    }

    fn snapshot_of(machine: &WizardStateMachine<VendorOnboardingFlow>) -> DraftSnapshot {
        DraftSnapshot {
            current_step: machine.current_step(),
            furthest_reached_step: machine.furthest_reached_step(),
            payload: machine.session().payload.clone(),
            captured_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn snapshot_then_restore_reproduces_position_and_payload() {
        let store = Arc::new(InMemoryDraftStore::default());
        let writer = DraftPersistenceManager::new(store.clone(), key(), DraftPolicy::default());
        let machine = filled_machine();
        assert_eq!(machine.furthest_reached_step(), StepId(3));

        writer.sync_visibility(true).await;
        assert_eq!(writer.snapshot(&machine).await, SnapshotOutcome::Written);

        let reader = DraftPersistenceManager::new(store, key(), DraftPolicy::default());
        let outcome = reader.sync_visibility(true).await;
        assert!(matches!(
            outcome,
            VisibilityOutcome::PromptRestore(ref prompt) if prompt.current_step == StepId(3)
        ));
        assert!(reader.body_blocked());

        let mut restored = WizardStateMachine::new(VendorOnboardingFlow);
        assert!(reader.restore(&mut restored));
        assert!(!reader.body_blocked());
        assert_eq!(restored.current_step(), machine.current_step());
        assert_eq!(restored.session().payload, machine.session().payload);
    }

    #[tokio::test]
    async fn empty_first_step_snapshot_never_prompts() {
        let store = Arc::new(InMemoryDraftStore::default());
        store
            .put(
                &key(),
                &DraftSnapshot {
                    current_step: StepId(1),
                    furthest_reached_step: StepId(1),
                    payload: WizardPayload::new(),
                    captured_at: Utc::now(),
                },
            )
            .await
            .expect("seed draft");
        let manager = DraftPersistenceManager::new(store.clone(), key(), DraftPolicy::default());

        assert_eq!(manager.sync_visibility(true).await, VisibilityOutcome::Fresh);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn stale_snapshot_is_dropped_without_prompt() {
        let store = Arc::new(InMemoryDraftStore::default());
        let machine = filled_machine();
        store
            .put(
                &key(),
                &DraftSnapshot {
                    current_step: machine.current_step(),
                    furthest_reached_step: machine.furthest_reached_step(),
                    payload: machine.session().payload.clone(),
                    captured_at: Utc::now() - Duration::days(8),
                },
            )
            .await
            .expect("seed draft");
        let manager = DraftPersistenceManager::new(store.clone(), key(), DraftPolicy::default());

        assert_eq!(manager.sync_visibility(true).await, VisibilityOutcome::Fresh);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn open_is_edge_triggered() {
        let store = Arc::new(CountingStore::default());
        let manager = DraftPersistenceManager::new(store.clone(), key(), DraftPolicy::default());

        assert_eq!(manager.sync_visibility(true).await, VisibilityOutcome::Fresh);
        assert_eq!(manager.sync_visibility(true).await, VisibilityOutcome::Unchanged);
        assert_eq!(manager.sync_visibility(true).await, VisibilityOutcome::Unchanged);
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);

        assert_eq!(manager.sync_visibility(false).await, VisibilityOutcome::Closed);
        assert_eq!(manager.sync_visibility(true).await, VisibilityOutcome::Fresh);
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn read_failure_degrades_to_a_fresh_session() {
        let store = Arc::new(CountingStore { fail_reads: true, ..CountingStore::default() });
        let manager = DraftPersistenceManager::new(store, key(), DraftPolicy::default());

        assert_eq!(manager.sync_visibility(true).await, VisibilityOutcome::Fresh);
        assert!(!manager.body_blocked());
    }

    #[tokio::test]
    async fn pending_prompt_suppresses_snapshots_and_terminal_step_is_never_saved() {
        let store = Arc::new(InMemoryDraftStore::default());
        let seeded = filled_machine();
        let writer = DraftPersistenceManager::new(store.clone(), key(), DraftPolicy::default());
        writer.sync_visibility(true).await;
        writer.snapshot(&seeded).await;

        let manager = DraftPersistenceManager::new(store.clone(), key(), DraftPolicy::default());
        manager.sync_visibility(true).await;
        let fresh = WizardStateMachine::new(VendorOnboardingFlow);
        assert_eq!(manager.snapshot(&fresh).await, SnapshotOutcome::SkippedPendingPrompt);

        manager.discard().await;
        assert!(store.is_empty().await);

        let mut review = filled_machine();
        review
            .set_field(StepId(3), vendor::CURRENCY, FieldValue::text("EUR"))
            .expect("payment step");
        review.go_next();
        assert!(review.is_terminal_step());
        assert_eq!(manager.snapshot(&review).await, SnapshotOutcome::SkippedTerminalStep);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn autosave_writes_on_interval_and_stops_on_shutdown() {
        let store = Arc::new(InMemoryDraftStore::default());
        let policy = DraftPolicy {
            autosave_interval: StdDuration::from_millis(10),
            ..DraftPolicy::default()
        };
        let manager = Arc::new(DraftPersistenceManager::new(store.clone(), key(), policy));
        manager.sync_visibility(true).await;
        let wizard = Arc::new(Mutex::new(filled_machine()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = Arc::clone(&manager).spawn_autosave(Arc::clone(&wizard), shutdown_rx);
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        shutdown_tx.send(true).expect("autosave still running");
        handle.await.expect("autosave task");

        let stored = store.get(&key()).await.expect("read draft").expect("draft written");
        assert_eq!(stored.current_step, StepId(3));
    }

    #[tokio::test]
    async fn snapshots_wait_for_the_open_read_to_settle() {
        let store = Arc::new(GatedStore::default());
        store.inner.put(&key(), &snapshot_of(&filled_machine())).await.expect("seed draft");
        let manager =
            Arc::new(DraftPersistenceManager::new(store.clone(), key(), DraftPolicy::default()));

        let opening = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.sync_visibility(true).await }
        });
        store.entered.notified().await;
        assert!(manager.is_loading());

        let fresh = WizardStateMachine::new(VendorOnboardingFlow);
        assert_eq!(manager.snapshot(&fresh).await, SnapshotOutcome::SkippedLoading);

        store.release.notify_one();
        let outcome = opening.await.expect("open task");
        assert!(matches!(
            outcome,
            VisibilityOutcome::PromptRestore(ref prompt)
                if prompt.furthest_reached_step == StepId(3)
        ));
        assert!(!manager.is_loading());
        assert!(manager.body_blocked());

        let stored = store.inner.get(&key()).await.expect("read draft").expect("draft kept");
        assert_eq!(stored.furthest_reached_step, StepId(3));
    }

    #[tokio::test]
    async fn closing_during_the_open_read_ends_loading() {
        let store = Arc::new(GatedStore::default());
        store.inner.put(&key(), &snapshot_of(&filled_machine())).await.expect("seed draft");
        let manager =
            Arc::new(DraftPersistenceManager::new(store.clone(), key(), DraftPolicy::default()));

        let opening = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.sync_visibility(true).await }
        });
        store.entered.notified().await;
        assert_eq!(manager.sync_visibility(false).await, VisibilityOutcome::Closed);
        assert!(!manager.is_loading());

        store.release.notify_one();
        assert_eq!(opening.await.expect("open task"), VisibilityOutcome::Unchanged);
        assert!(!manager.body_blocked());
        assert_eq!(store.inner.len().await, 1);
    }

    #[tokio::test]
    async fn zero_autosave_interval_still_ticks() {
        let store = Arc::new(InMemoryDraftStore::default());
        let policy = DraftPolicy { autosave_interval: StdDuration::ZERO, ..DraftPolicy::default() };
        let manager = Arc::new(DraftPersistenceManager::new(store.clone(), key(), policy));
        manager.sync_visibility(true).await;
        let wizard = Arc::new(Mutex::new(filled_machine()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = Arc::clone(&manager).spawn_autosave(Arc::clone(&wizard), shutdown_rx);
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        shutdown_tx.send(true).expect("autosave still running");
        handle.await.expect("autosave task");

        assert_eq!(store.len().await, 1);
    }
}
