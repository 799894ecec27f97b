use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::defaults::{merge_payload, withdraw_suggestions, AppliedSuggestion, EmptinessPolicy};
use crate::domain::counterparty::EntityId;
use crate::domain::field::{FieldId, FieldValue, StepPayload};
use crate::domain::negotiation::SmartDefaults;
use crate::errors::WizardError;
use crate::services::StepPersistence;
use crate::wizard::states::{
    NavigationOutcome, StepDefinition, StepId, ValidationErrors, WizardKind, WizardPayload,
    WizardSession,
};

/// Static description of one wizard: its step table, per-step validation and
/// how server suggestions map onto its payload.
pub trait WizardFlow: Send + Sync {
    fn kind(&self) -> WizardKind;

    fn steps(&self) -> &[StepDefinition];

    /// Validates the slice owned by `step`. Cross-step rules are checked by the
    /// step that introduces the second of the two dependent fields, so the
    /// whole payload is available here.
    fn validate(&self, step: StepId, payload: &WizardPayload) -> ValidationErrors;

    fn project_defaults(&self, _defaults: &SmartDefaults) -> WizardPayload {
        WizardPayload::new()
    }

    fn emptiness_policy(&self) -> EmptinessPolicy {
        EmptinessPolicy::default()
    }
}

/// Owns step position and payload for one wizard instance. Every mutation goes
/// through `&mut self`, so one machine has exactly one writer at a time.
pub struct WizardStateMachine<F> {
    flow: F,
    session: WizardSession,
    audit: Option<(Arc<dyn AuditSink>, AuditContext)>,
}

impl<F> WizardStateMachine<F>
where
    F: WizardFlow,
{
    pub fn new(flow: F) -> Self {
        Self { flow, session: WizardSession::default(), audit: None }
    }

    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>, context: AuditContext) -> Self {
        self.audit = Some((sink, context));
        self
    }

    pub fn flow(&self) -> &F {
        &self.flow
    }

    pub fn kind(&self) -> WizardKind {
        self.flow.kind()
    }

    pub fn session(&self) -> &WizardSession {
        &self.session
    }

    pub fn current_step(&self) -> StepId {
        self.session.current_step
    }

    pub fn furthest_reached_step(&self) -> StepId {
        self.session.furthest_reached_step
    }

    pub fn validation_errors(&self) -> &ValidationErrors {
        &self.session.validation_errors
    }

    pub fn step_count(&self) -> StepId {
        StepId(u8::try_from(self.flow.steps().len()).unwrap_or(u8::MAX).max(1))
    }

    pub fn is_terminal_step(&self) -> bool {
        self.session.current_step >= self.step_count()
    }

    pub fn current_definition(&self) -> Option<&StepDefinition> {
        self.flow.steps().iter().find(|step| step.id == self.session.current_step)
    }

    /// Whether the step indicator for `step` should react to clicks.
    pub fn is_step_reachable(&self, step: StepId) -> bool {
        step >= StepId::FIRST && step <= self.session.furthest_reached_step
    }

    pub fn go_next(&mut self) -> NavigationOutcome {
        if let Err(blocked) = self.validate_current_step() {
            return blocked;
        }
        self.advance()
    }

    /// Validates, saves the current step server-side, and only then advances.
    /// A failed save leaves the step unchanged and is surfaced to the caller.
    pub async fn go_next_persisted(
        &mut self,
        persistence: &dyn StepPersistence,
        entity_id: &EntityId,
    ) -> Result<NavigationOutcome, WizardError> {
        if let Err(blocked) = self.validate_current_step() {
            return Ok(blocked);
        }
        if self.is_terminal_step() {
            return Ok(NavigationOutcome::Unchanged);
        }

        let step = self.session.current_step;
        let empty = StepPayload::new();
        let slice = self.session.payload.get(&step).unwrap_or(&empty);
        if let Err(source) = persistence.persist_entity_step(entity_id, step, slice).await {
            warn!(
                event_name = "wizard.step_save_failed",
                wizard = self.flow.kind().as_str(),
                entity_id = %entity_id,
                step = step.0,
                error = %source,
                "progressive step save failed; staying on step"
            );
            self.emit_audit("wizard.step_save_failed", AuditOutcome::Failed, step, step);
            return Err(WizardError::ProgressiveSave { step, source });
        }

        Ok(self.advance())
    }

    pub fn go_back(&mut self) -> NavigationOutcome {
        self.session.validation_errors.clear();
        let from = self.session.current_step;
        let to = from.previous();
        if to == from {
            return NavigationOutcome::Unchanged;
        }

        self.session.current_step = to;
        debug!(
            event_name = "wizard.step_back",
            wizard = self.flow.kind().as_str(),
            from = from.0,
            to = to.0,
            "moved back one step"
        );
        NavigationOutcome::Moved { from, to }
    }

    /// Jumps to an already reached step. Anything beyond the furthest reached
    /// step is ignored rather than reported.
    pub fn jump_to(&mut self, step: StepId) -> NavigationOutcome {
        if !self.is_step_reachable(step) || step == self.session.current_step {
            return NavigationOutcome::Unchanged;
        }

        let from = self.session.current_step;
        self.session.current_step = step;
        self.session.validation_errors.clear();
        debug!(
            event_name = "wizard.step_jump",
            wizard = self.flow.kind().as_str(),
            from = from.0,
            to = step.0,
            "jumped to reached step"
        );
        NavigationOutcome::Moved { from, to: step }
    }

    /// Shallow-merges `partial` into the slice for `step`. Errors attached to
    /// the edited fields are cleared; errors on other fields are kept.
    pub fn set_step_payload(
        &mut self,
        step: StepId,
        partial: StepPayload,
    ) -> Result<(), WizardError> {
        if step < StepId::FIRST || step > self.step_count() {
            return Err(WizardError::UnknownStep(step));
        }

        let slice = self.session.payload.entry(step).or_default();
        for (field, value) in partial {
            self.session.validation_errors.remove(&field);
            slice.insert(field, value);
        }
        Ok(())
    }

    pub fn set_field(
        &mut self,
        step: StepId,
        field: &str,
        value: FieldValue,
    ) -> Result<(), WizardError> {
        let mut partial = StepPayload::new();
        partial.insert(FieldId::from(field), value);
        self.set_step_payload(step, partial)
    }

    /// Merges server suggestions into the live payload and returns the fields
    /// that were filled in.
    pub fn apply_smart_defaults(&mut self, defaults: &SmartDefaults) -> Vec<(StepId, FieldId)> {
        let suggested = self.flow.project_defaults(defaults);
        let policy = self.flow.emptiness_policy();
        let outcome = merge_payload(&policy, &self.session.payload, &suggested);

        for (_, field) in &outcome.filled {
            self.session.validation_errors.remove(field);
        }
        self.session.payload = outcome.payload;
        outcome.filled
    }

    /// Withdraws the untouched suggestions of a previous pair, then merges the
    /// new pair's suggestions. Returns the suggestions that landed.
    pub fn replace_smart_defaults(
        &mut self,
        previous: &[AppliedSuggestion],
        defaults: &SmartDefaults,
    ) -> Vec<AppliedSuggestion> {
        let withdrawn = withdraw_suggestions(&mut self.session.payload, previous);
        if !withdrawn.is_empty() {
            debug!(
                event_name = "wizard.defaults_withdrawn",
                wizard = self.flow.kind().as_str(),
                withdrawn = withdrawn.len(),
                "previous suggestions withdrawn"
            );
        }

        self.apply_smart_defaults(defaults)
            .into_iter()
            .filter_map(|(step, field)| {
                let value = self.session.payload.get(&step)?.get(&field)?.clone();
                Some((step, field, value))
            })
            .collect()
    }

    /// Union of every step slice: the final submission body. Field ids are
    /// unique across steps of a flow, so no slice shadows another.
    pub fn merged_payload(&self) -> StepPayload {
        let mut merged = StepPayload::new();
        for (step, slice) in &self.session.payload {
            for (field, value) in slice {
                if merged.insert(field.clone(), value.clone()).is_some() {
                    warn!(
                        event_name = "wizard.field_shadowed",
                        wizard = self.flow.kind().as_str(),
                        step = step.0,
                        field = %field,
                        "field id repeated across steps; later step wins"
                    );
                }
            }
        }
        merged
    }

    /// Replaces position and payload with a restored draft.
    pub fn apply_snapshot(
        &mut self,
        current_step: StepId,
        furthest_reached_step: StepId,
        payload: WizardPayload,
    ) {
        let last = self.step_count();
        let current = current_step.clamp(StepId::FIRST, last);
        let furthest = furthest_reached_step.clamp(StepId::FIRST, last).max(current);

        self.session = WizardSession {
            current_step: current,
            furthest_reached_step: furthest,
            payload,
            validation_errors: ValidationErrors::new(),
        };
        info!(
            event_name = "wizard.snapshot_applied",
            wizard = self.flow.kind().as_str(),
            current_step = current.0,
            furthest_reached_step = furthest.0,
            "wizard state restored from draft"
        );
    }

    pub fn reset(&mut self) {
        self.session = WizardSession::default();
    }

    fn validate_current_step(&mut self) -> Result<(), NavigationOutcome> {
        let step = self.session.current_step;
        let errors = self.flow.validate(step, &self.session.payload);
        if errors.is_empty() {
            self.session.validation_errors.clear();
            return Ok(());
        }

        let error_count = errors.len();
        debug!(
            event_name = "wizard.step_blocked",
            wizard = self.flow.kind().as_str(),
            step = step.0,
            error_count,
            "step validation failed"
        );
        self.session.validation_errors = errors;
        self.emit_audit("wizard.step_blocked", AuditOutcome::Rejected, step, step);
        Err(NavigationOutcome::Blocked { error_count })
    }

    fn advance(&mut self) -> NavigationOutcome {
        let from = self.session.current_step;
        let to = from.next().min(self.step_count());
        if to == from {
            return NavigationOutcome::Unchanged;
        }

        self.session.current_step = to;
        if to > self.session.furthest_reached_step {
            self.session.furthest_reached_step = to;
        }
        info!(
            event_name = "wizard.step_advanced",
            wizard = self.flow.kind().as_str(),
            from = from.0,
            to = to.0,
            "advanced to next step"
        );
        self.emit_audit("wizard.step_advanced", AuditOutcome::Success, from, to);
        NavigationOutcome::Moved { from, to }
    }

    fn emit_audit(&self, event_type: &str, outcome: AuditOutcome, from: StepId, to: StepId) {
        if let Some((sink, context)) = &self.audit {
            sink.emit(
                context
                    .event(event_type, AuditCategory::Wizard, outcome)
                    .with_metadata("wizard", self.flow.kind().as_str())
                    .with_metadata("from", from.to_string())
                    .with_metadata("to", to.to_string()),
            );
        }
    }
}
