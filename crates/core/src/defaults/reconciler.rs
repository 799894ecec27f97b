use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::defaults::AppliedSuggestion;
use crate::domain::counterparty::{CounterpartyId, EntityId};
use crate::domain::field::FieldId;
use crate::services::SmartDefaultsFetcher;
use crate::wizard::engine::{WizardFlow, WizardStateMachine};
use crate::wizard::states::StepId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Suggestions were merged into the live payload.
    Applied { filled: Vec<(StepId, FieldId)> },
    /// The pair was already reconciled (or is being reconciled).
    AlreadyCurrent,
    /// A newer pair was requested while this fetch was in flight.
    Superseded,
    FetchFailed,
}

#[derive(Debug, Default)]
struct ReconcileState {
    generation: u64,
    pair: Option<(EntityId, CounterpartyId)>,
    /// Suggestions written by the last applied pair, withdrawn on the next.
    applied: Vec<AppliedSuggestion>,
}

/// Fetches smart defaults when the selected (entity, counterparty) pair
/// changes and merges them into whatever payload is live when the fetch
/// resolves. A new pair replaces the previous pair's untouched suggestions.
pub struct SmartDefaultsReconciler {
    fetcher: Arc<dyn SmartDefaultsFetcher>,
    state: Mutex<ReconcileState>,
}

impl SmartDefaultsReconciler {
    pub fn new(fetcher: Arc<dyn SmartDefaultsFetcher>) -> Self {
        Self { fetcher, state: Mutex::new(ReconcileState::default()) }
    }

    pub async fn reconcile<F: WizardFlow>(
        &self,
        wizard: &AsyncMutex<WizardStateMachine<F>>,
        entity_id: &EntityId,
        counterparty_id: &CounterpartyId,
    ) -> ReconcileOutcome {
        let generation = {
            let mut state = self.lock_state();
            let requested = (entity_id.clone(), counterparty_id.clone());
            if state.pair.as_ref() == Some(&requested) {
                return ReconcileOutcome::AlreadyCurrent;
            }
            state.generation += 1;
            state.pair = Some(requested);
            state.generation
        };

        debug!(
            event_name = "defaults.fetch_started",
            entity_id = %entity_id,
            counterparty_id = %counterparty_id,
            generation,
            "fetching smart defaults"
        );

        let defaults = match self.fetcher.fetch_smart_defaults(entity_id, counterparty_id).await {
            Ok(defaults) => defaults,
            Err(error) => {
                warn!(
                    event_name = "defaults.fetch_failed",
                    entity_id = %entity_id,
                    counterparty_id = %counterparty_id,
                    error = %error,
                    "smart defaults unavailable; form left as is"
                );
                let mut state = self.lock_state();
                if state.generation == generation {
                    state.pair = None;
                }
                return ReconcileOutcome::FetchFailed;
            }
        };

        if !self.is_current(generation) {
            return ReconcileOutcome::Superseded;
        }

        let mut machine = wizard.lock().await;
        // A newer request may have started while we waited for the wizard.
        if !self.is_current(generation) {
            return ReconcileOutcome::Superseded;
        }

        let previous = std::mem::take(&mut self.lock_state().applied);
        let applied = machine.replace_smart_defaults(&previous, &defaults);
        let filled: Vec<(StepId, FieldId)> =
            applied.iter().map(|(step, field, _)| (*step, field.clone())).collect();
        self.lock_state().applied = applied;
        info!(
            event_name = "defaults.applied",
            entity_id = %entity_id,
            counterparty_id = %counterparty_id,
            filled = filled.len(),
            "smart defaults merged"
        );
        ReconcileOutcome::Applied { filled }
    }

    /// Forgets the last reconciled pair so the next call fetches again.
    pub fn invalidate(&self) {
        let mut state = self.lock_state();
        state.generation += 1;
        state.pair = None;
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_state().generation == generation
    }

    fn lock_state(&self) -> MutexGuard<'_, ReconcileState> {
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

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use tokio::sync::{Mutex, Notify};

    use super::{ReconcileOutcome, SmartDefaultsReconciler};
    use crate::domain::counterparty::{CounterpartyId, EntityId};
    use crate::domain::field::FieldValue;
    use crate::domain::negotiation::{PriceQuantityDefaults, SmartDefaults};
    use crate::errors::ServiceError;
    use crate::services::SmartDefaultsFetcher;
    use crate::wizard::engine::WizardStateMachine;
    use crate::wizard::flows::{deal, DealConfigurationFlow};

    fn price_defaults(price: i64) -> SmartDefaults {
        SmartDefaults {
            price_quantity: Some(PriceQuantityDefaults {
                target_price: Some(Decimal::from(price)),
                quantity: Some(Decimal::from(1_000)),
            }),
            ..SmartDefaults::default()
        }
    }

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SmartDefaultsFetcher for CountingFetcher {
        async fn fetch_smart_defaults(
            &self,
            _entity_id: &EntityId,
            _counterparty_id: &CounterpartyId,
        ) -> Result<SmartDefaults, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ServiceError::Unavailable("connection refused".to_owned()));
            }
            Ok(price_defaults(80))
        }
    }

    /// Holds every fetch until released, so user edits can land mid-flight.
    struct GatedFetcher {
        release: Notify,
    }

    #[async_trait]
    impl SmartDefaultsFetcher for GatedFetcher {
        async fn fetch_smart_defaults(
            &self,
            _entity_id: &EntityId,
            _counterparty_id: &CounterpartyId,
        ) -> Result<SmartDefaults, ServiceError> {
            self.release.notified().await;
            Ok(price_defaults(80))
        }
    }

    fn ids(counterparty: &str) -> (EntityId, CounterpartyId) {
        (EntityId("ENT-1".to_owned()), CounterpartyId(counterparty.to_owned()))
    }

    #[tokio::test]
    async fn fills_empty_fields_once_per_pair() {
        let fetcher = Arc::new(CountingFetcher::default());
        let reconciler = SmartDefaultsReconciler::new(fetcher.clone());
        let wizard = Mutex::new(WizardStateMachine::new(DealConfigurationFlow));
        let (entity, counterparty) = ids("CP-1");

        let first = reconciler.reconcile(&wizard, &entity, &counterparty).await;
        let second = reconciler.reconcile(&wizard, &entity, &counterparty).await;

        assert!(matches!(first, ReconcileOutcome::Applied { ref filled } if filled.len() == 2));
        assert_eq!(second, ReconcileOutcome::AlreadyCurrent);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        let machine = wizard.lock().await;
        assert_eq!(
            machine.session().field(deal::PRICING_STEP, deal::TARGET_PRICE),
            Some(&FieldValue::number(80))
        );
    }

    #[tokio::test]
    async fn edit_made_during_fetch_survives_the_merge() {
        let fetcher = Arc::new(GatedFetcher { release: Notify::new() });
        let reconciler = Arc::new(SmartDefaultsReconciler::new(fetcher.clone()));
        let wizard = Arc::new(Mutex::new(WizardStateMachine::new(DealConfigurationFlow)));
        let (entity, counterparty) = ids("CP-1");

        let task = {
            let reconciler = Arc::clone(&reconciler);
            let wizard = Arc::clone(&wizard);
            tokio::spawn(async move { reconciler.reconcile(&wizard, &entity, &counterparty).await })
        };
        tokio::task::yield_now().await;

        wizard
            .lock()
            .await
            .set_field(deal::PRICING_STEP, deal::TARGET_PRICE, FieldValue::number(50))
            .expect("pricing step exists");
        fetcher.release.notify_one();

        let outcome = task.await.expect("reconcile task");
        assert!(matches!(outcome, ReconcileOutcome::Applied { .. }));
        let machine = wizard.lock().await;
        assert_eq!(
            machine.session().field(deal::PRICING_STEP, deal::TARGET_PRICE),
            Some(&FieldValue::number(50))
        );
        assert_eq!(
            machine.session().field(deal::PRICING_STEP, deal::QUANTITY),
            Some(&FieldValue::number(1_000))
        );
    }

    #[tokio::test]
    async fn failed_fetch_leaves_payload_alone_and_allows_retry() {
        let fetcher = Arc::new(CountingFetcher { fail: true, ..CountingFetcher::default() });
        let reconciler = SmartDefaultsReconciler::new(fetcher.clone());
        let wizard = Mutex::new(WizardStateMachine::new(DealConfigurationFlow));
        let (entity, counterparty) = ids("CP-1");

        let first = reconciler.reconcile(&wizard, &entity, &counterparty).await;
        let second = reconciler.reconcile(&wizard, &entity, &counterparty).await;

        assert_eq!(first, ReconcileOutcome::FetchFailed);
        assert_eq!(second, ReconcileOutcome::FetchFailed);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(wizard.lock().await.session().payload.is_empty());
    }

    #[tokio::test]
    async fn changing_the_pair_fetches_again() {
        let fetcher = Arc::new(CountingFetcher::default());
        let reconciler = SmartDefaultsReconciler::new(fetcher.clone());
        let wizard = Mutex::new(WizardStateMachine::new(DealConfigurationFlow));
        let (entity, first) = ids("CP-1");
        let (_, second) = ids("CP-2");

        reconciler.reconcile(&wizard, &entity, &first).await;
        let outcome = reconciler.reconcile(&wizard, &entity, &second).await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(matches!(outcome, ReconcileOutcome::Applied { ref filled } if filled.len() == 2));
    }

    /// Suggests a different target price per counterparty; CP-3 has none.
    struct PerCounterpartyFetcher;

    #[async_trait]
    impl SmartDefaultsFetcher for PerCounterpartyFetcher {
        async fn fetch_smart_defaults(
            &self,
            _entity_id: &EntityId,
            counterparty_id: &CounterpartyId,
        ) -> Result<SmartDefaults, ServiceError> {
            Ok(match counterparty_id.0.as_str() {
                "CP-1" => price_defaults(80),
                "CP-2" => price_defaults(95),
                _ => SmartDefaults::default(),
            })
        }
    }

    #[tokio::test]
    async fn new_pair_replaces_untouched_suggestions_only() {
        let reconciler = SmartDefaultsReconciler::new(Arc::new(PerCounterpartyFetcher));
        let wizard = Mutex::new(WizardStateMachine::new(DealConfigurationFlow));
        let (entity, first) = ids("CP-1");
        let (_, second) = ids("CP-2");
        let (_, third) = ids("CP-3");

        reconciler.reconcile(&wizard, &entity, &first).await;
        wizard
            .lock()
            .await
            .set_field(deal::PRICING_STEP, deal::QUANTITY, FieldValue::number(500))
            .expect("pricing step exists");

        let switched = reconciler.reconcile(&wizard, &entity, &second).await;
        assert!(matches!(
            switched,
            ReconcileOutcome::Applied { ref filled }
                if filled.len() == 1 && filled[0].1.as_str() == deal::TARGET_PRICE
        ));
        {
            let machine = wizard.lock().await;
            assert_eq!(
                machine.session().field(deal::PRICING_STEP, deal::TARGET_PRICE),
                Some(&FieldValue::number(95))
            );
            assert_eq!(
                machine.session().field(deal::PRICING_STEP, deal::QUANTITY),
                Some(&FieldValue::number(500))
            );
        }

        let cleared = reconciler.reconcile(&wizard, &entity, &third).await;
        assert_eq!(cleared, ReconcileOutcome::Applied { filled: Vec::new() });
        let machine = wizard.lock().await;
        assert_eq!(machine.session().field(deal::PRICING_STEP, deal::TARGET_PRICE), None);
        assert_eq!(
            machine.session().field(deal::PRICING_STEP, deal::QUANTITY),
            Some(&FieldValue::number(500))
        );
    }
}
