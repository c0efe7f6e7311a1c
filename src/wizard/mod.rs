//! Multi-step form engine
//!
//! A [`WizardSession`] owns the field values of one form instance and moves
//! through the applicable steps of a [`WizardFlow`]:
//!
//! - the step set is re-resolved after every field update
//! - `next` is gated by [`validate_step`] and saves a draft on success
//! - `prev` is always allowed and never validates
//! - submission validates every applicable step, then calls the repository
//!   once; failures keep values, position and draft so the user can retry
//! - an edit whose entity disappears before submit ends in
//!   [`WizardPhase::NotFound`]

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::SubmissionConfig;
use crate::drafts::{merge_with_baseline, DraftStore};
use crate::entities::{EntityRecord, EntityRepository, RepositoryError};
use crate::fields::{FieldPath, FieldValue, FieldValues};

mod error;
mod flow;
mod resolver;
pub mod types;
pub mod validation;

pub use error::WizardError;
pub use flow::{FlowMode, WizardFlow};
pub use resolver::{reconcile_position, resolve_steps};
pub use types::*;
pub use validation::{
    validate_all, validate_step, CrossFieldRule, FieldRequirement, FieldRule, PatternKind,
    ValidationResult,
};


/// Tunables for a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Limit for each fetch/create/update call
    pub operation_timeout: Duration,
}

impl SessionOptions {
    pub fn from_config(config: &SubmissionConfig) -> Self {
        Self {
            operation_timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(10),
        }
    }
}

/// One running instance of a wizard
pub struct WizardSession {
    flow: WizardFlow,
    entity_key: String,
    values: FieldValues,
    steps: StepSet,
    state: WizardState,
    phase: WizardPhase,
    drafts: DraftStore,
    repository: Arc<dyn EntityRepository>,
    options: SessionOptions,
    /// Set between `request_submit` and `complete_submit`
    in_flight: bool,
    submission_seq: u64,
    /// Cleared on cancel, unmount and drop
    mounted: Arc<AtomicBool>,
    errors: BTreeMap<FieldPath, String>,
    banner: Option<String>,
    /// File fields restored from a draft without their file
    pending_files: BTreeSet<FieldPath>,
}

impl WizardSession {
    /// Start a session.
    ///
    /// Edit flows fetch the baseline first; a missing entity yields
    /// [`WizardError::EntityNotFound`] instead of an empty form. A stored
    /// draft is merged over the baseline and the session resumes at the
    /// first applicable step not yet completed.
    pub async fn mount(
        flow: WizardFlow,
        drafts: DraftStore,
        repository: Arc<dyn EntityRepository>,
        options: SessionOptions,
    ) -> Result<Self, WizardError> {
        let entity_key = flow.entity_key();

        let baseline = match &flow.mode {
            FlowMode::Create => None,
            FlowMode::Edit { id } => {
                let fetch = repository.fetch_entity(&flow.entity_kind, id);
                match with_timeout(options.operation_timeout, fetch).await {
                    Ok(record) => Some(FieldValues::from_payload(&record.data)),
                    Err(e) => {
                        tracing::warn!(
                            flow = %flow.name,
                            entity_key = %entity_key,
                            error = %e,
                            "Failed to load baseline"
                        );
                        return Err(e);
                    }
                }
            }
        };

        let draft = drafts.load(&entity_key);
        let values = match &baseline {
            Some(baseline) => merge_with_baseline(baseline, draft.as_ref()),
            None => draft
                .as_ref()
                .map(|d| d.field_values.clone())
                .unwrap_or_default(),
        };
        let completed = draft
            .as_ref()
            .map(|d| d.completed_step_ids.clone())
            .unwrap_or_default();
        let pending_files: BTreeSet<FieldPath> = draft
            .as_ref()
            .map(|d| {
                d.pending_files
                    .iter()
                    .filter(|path| !values.contains(path))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let steps = resolve_steps(&values, &flow.steps);
        let current_index = resume_position(&steps, &completed);
        let snapshots = steps
            .iter()
            .filter(|s| completed.contains(&s.id))
            .map(|s| (s.id, values.subset(s.field_paths())))
            .collect();
        let current_id = steps.get(current_index).map_or(1, |s| s.id);

        tracing::info!(
            flow = %flow.name,
            entity_key = %entity_key,
            resumed = draft.is_some(),
            step = current_id,
            steps = ?steps.ids(),
            pending_files = ?pending_files,
            "Wizard mounted"
        );

        Ok(Self {
            flow,
            entity_key,
            values,
            steps,
            state: WizardState {
                current_index,
                completed,
                snapshots,
            },
            phase: WizardPhase::Editing(current_id),
            drafts,
            repository,
            options,
            in_flight: false,
            submission_seq: 0,
            mounted: Arc::new(AtomicBool::new(true)),
            errors: BTreeMap::new(),
            banner: None,
            pending_files,
        })
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    pub fn flow(&self) -> &WizardFlow {
        &self.flow
    }

    pub fn entity_key(&self) -> &str {
        &self.entity_key
    }

    pub fn values(&self) -> &FieldValues {
        &self.values
    }

    pub fn steps(&self) -> &StepSet {
        &self.steps
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn phase(&self) -> &WizardPhase {
        &self.phase
    }

    /// 1-based position in the current step set
    pub fn current_index(&self) -> usize {
        self.state.current_index
    }

    pub fn current_step(&self) -> Option<&StepDefinition> {
        self.steps.get(self.state.current_index)
    }

    /// Field errors from the last blocked transition or rejected submit
    pub fn errors(&self) -> &BTreeMap<FieldPath, String> {
        &self.errors
    }

    /// User-visible message from the last failed external operation
    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// True while the form accepts input: mounted and in an editing phase
    pub fn is_editing(&self) -> bool {
        self.is_mounted() && matches!(self.phase, WizardPhase::Editing(_))
    }

    /// File fields the user has to attach again after resuming a draft
    pub fn pending_files(&self) -> &BTreeSet<FieldPath> {
        &self.pending_files
    }

    pub fn is_last_step(&self) -> bool {
        self.state.current_index == self.steps.len()
    }

    // ─── Field updates ──────────────────────────────────────────────────────

    /// Set a field and re-resolve the step set.
    ///
    /// Returns false when the session is no longer editing.
    pub fn set_field(&mut self, path: impl Into<FieldPath>, value: FieldValue) -> bool {
        if !self.is_editing() {
            return false;
        }
        let path = path.into();
        self.errors.remove(&path);
        if value.is_file() {
            self.pending_files.remove(&path);
        }
        self.values.set(path, value);
        self.refresh_steps();
        true
    }

    pub fn remove_field(&mut self, path: &str) -> bool {
        if !self.is_editing() {
            return false;
        }
        self.errors.remove(path);
        self.pending_files.remove(path);
        self.values.remove(path);
        self.refresh_steps();
        true
    }

    fn refresh_steps(&mut self) {
        let resolved = resolve_steps(&self.values, &self.flow.steps);
        if resolved.ids() == self.steps.ids() {
            return;
        }

        let index = reconcile_position(&self.steps, &resolved, self.state.current_index);
        tracing::info!(
            flow = %self.flow.name,
            from = ?self.steps.ids(),
            to = ?resolved.ids(),
            index,
            "Step set changed"
        );
        self.steps = resolved;
        self.state.current_index = index;
        self.sync_phase();
    }

    fn sync_phase(&mut self) {
        if let Some(step) = self.steps.get(self.state.current_index) {
            self.phase = WizardPhase::Editing(step.id);
        }
    }

    fn persist_draft(&self) {
        if let Err(e) = self.drafts.save(
            &self.entity_key,
            &self.values,
            &self.state.completed,
            &self.pending_files,
        ) {
            tracing::warn!(entity_key = %self.entity_key, error = %e, "Failed to save draft");
        }
    }

    // ─── Navigation ─────────────────────────────────────────────────────────

    /// Advance one step if the current step validates
    pub fn next(&mut self) -> NavOutcome {
        if !self.is_editing() {
            return NavOutcome::Inactive;
        }
        let Some(step) = self.current_step().cloned() else {
            return NavOutcome::Inactive;
        };
        if self.is_last_step() {
            return NavOutcome::AtBoundary;
        }

        let result = validate_step(step.id, &self.values, &self.flow.steps);
        if !result.is_valid {
            let focus = result.focus_path(&step);
            tracing::debug!(
                flow = %self.flow.name,
                step = step.id,
                errors = result.field_errors.len(),
                focus = ?focus,
                "Forward transition blocked"
            );
            self.errors = result.field_errors.clone();
            return NavOutcome::Blocked {
                step_id: step.id,
                errors: result.field_errors,
                focus,
            };
        }

        self.errors.clear();
        self.state
            .snapshots
            .insert(step.id, self.values.subset(step.field_paths()));
        self.state.completed.insert(step.id);
        self.persist_draft();

        self.state.current_index += 1;
        self.sync_phase();
        let to = self.current_step().map_or(step.id, |s| s.id);

        tracing::info!(
            flow = %self.flow.name,
            entity_key = %self.entity_key,
            from = step.id,
            to,
            "Advanced to next step"
        );
        NavOutcome::Moved { from: step.id, to }
    }

    /// Go back one step.
    ///
    /// The snapshot saved when leaving the target step fills paths that are
    /// no longer present; values typed since then are kept.
    pub fn prev(&mut self) -> NavOutcome {
        if !self.is_editing() {
            return NavOutcome::Inactive;
        }
        if self.state.current_index <= 1 {
            return NavOutcome::AtBoundary;
        }
        let from = self.current_step().map_or(0, |s| s.id);

        self.state.current_index -= 1;
        if let Some(target) = self.current_step().map(|s| s.id) {
            if let Some(snapshot) = self.state.snapshots.get(&target) {
                self.values = self.values.merged_over(snapshot);
            }
        }
        self.errors.clear();
        self.sync_phase();
        self.refresh_steps();
        let to = self.current_step().map_or(from, |s| s.id);

        tracing::info!(flow = %self.flow.name, from, to, "Moved to previous step");
        NavOutcome::Moved { from, to }
    }

    // ─── Submission ─────────────────────────────────────────────────────────

    /// Validate everything and hand out the single in-flight submission.
    ///
    /// `Err` carries the outcome when no repository call is made: a
    /// validation rejection, or an ignored signal (already in flight, not on
    /// the last step, not editing).
    pub fn request_submit(&mut self) -> Result<PendingSubmission, SubmitOutcome> {
        if !self.is_editing() {
            return Err(SubmitOutcome::Ignored(IgnoredReason::Inactive));
        }
        if self.in_flight {
            tracing::debug!(flow = %self.flow.name, "Submission in flight, ignoring submit");
            return Err(SubmitOutcome::Ignored(IgnoredReason::InFlight));
        }
        if !self.is_last_step() {
            return Err(SubmitOutcome::Ignored(IgnoredReason::NotOnLastStep));
        }

        let mut failing: Vec<ValidationResult> = validate_all(&self.values, &self.steps)
            .into_iter()
            .filter(|r| !r.is_valid)
            .collect();
        self.flag_pending_files(&mut failing);
        if !failing.is_empty() {
            let focus = failing
                .first()
                .and_then(|r| self.flow.step(r.step_id).and_then(|s| r.focus_path(s)));
            self.errors = failing
                .iter()
                .flat_map(|r| r.field_errors.clone())
                .collect();
            tracing::info!(
                flow = %self.flow.name,
                failing_steps = ?failing.iter().map(|r| r.step_id).collect::<Vec<_>>(),
                "Submission rejected by validation"
            );
            return Err(SubmitOutcome::Rejected { failing, focus });
        }

        self.errors.clear();
        self.banner = None;
        self.in_flight = true;
        self.submission_seq += 1;

        tracing::info!(
            flow = %self.flow.name,
            entity_key = %self.entity_key,
            seq = self.submission_seq,
            "Submitting"
        );

        Ok(PendingSubmission {
            seq: self.submission_seq,
            entity_kind: self.flow.entity_kind.clone(),
            mode: self.flow.mode.clone(),
            payload: self.values.to_payload(),
            repository: Arc::clone(&self.repository),
            timeout: self.options.operation_timeout,
            mounted: Arc::clone(&self.mounted),
        })
    }

    /// A file dropped from the draft blocks submit until it is attached again
    /// or the field is cleared; steps that no longer apply are skipped.
    fn flag_pending_files(&self, failing: &mut Vec<ValidationResult>) {
        for path in &self.pending_files {
            let Some(step) = self
                .steps
                .iter()
                .find(|s| s.field_paths().contains(&path.as_str()))
            else {
                continue;
            };
            let message = "Attach this file again".to_string();
            match failing.iter_mut().find(|r| r.step_id == step.id) {
                Some(result) => {
                    result.field_errors.entry(path.clone()).or_insert(message);
                }
                None => failing.push(ValidationResult {
                    step_id: step.id,
                    is_valid: false,
                    field_errors: BTreeMap::from([(path.clone(), message)]),
                }),
            }
        }
        failing.sort_by_key(|r| self.steps.position_of(r.step_id));
    }

    /// Apply the result of a submission started by [`Self::request_submit`].
    ///
    /// Results arriving after the session was cancelled or unmounted are
    /// dropped without touching any state. An edit whose entity no longer
    /// exists moves to [`WizardPhase::NotFound`]; there is nothing to retry.
    pub fn complete_submit(&mut self, report: SubmissionReport) -> SubmitOutcome {
        if !self.is_mounted() {
            tracing::warn!(
                flow = %self.flow.name,
                seq = report.seq,
                "Dropping submission result for unmounted wizard"
            );
            return SubmitOutcome::Ignored(IgnoredReason::Unmounted);
        }
        if !self.in_flight || report.seq != self.submission_seq {
            return SubmitOutcome::Ignored(IgnoredReason::Stale);
        }
        self.in_flight = false;

        match report.result {
            Ok(record) => {
                if let Err(e) = self.drafts.clear(&self.entity_key) {
                    tracing::warn!(entity_key = %self.entity_key, error = %e, "Failed to clear draft");
                }
                self.values = FieldValues::new();
                self.state.snapshots.clear();
                self.phase = WizardPhase::Submitted(record.clone());
                tracing::info!(
                    flow = %self.flow.name,
                    entity_key = %self.entity_key,
                    id = %record.id,
                    "Wizard submitted"
                );
                SubmitOutcome::Submitted(record)
            }
            Err(e @ WizardError::EntityNotFound { .. }) => {
                let message = e.user_message();
                if let Err(clear_err) = self.drafts.clear(&self.entity_key) {
                    tracing::warn!(entity_key = %self.entity_key, error = %clear_err, "Failed to clear draft");
                }
                self.phase = WizardPhase::NotFound;
                self.state.snapshots.clear();
                self.errors.clear();
                self.banner = Some(message.clone());
                tracing::warn!(
                    flow = %self.flow.name,
                    entity_key = %self.entity_key,
                    error = %e,
                    "Entity vanished during edit"
                );
                SubmitOutcome::Failed {
                    message,
                    retryable: false,
                }
            }
            Err(e) => {
                let message = e.user_message();
                let retryable = e.is_retryable();
                tracing::warn!(
                    flow = %self.flow.name,
                    entity_key = %self.entity_key,
                    error = %e,
                    retryable,
                    "Submission failed"
                );
                self.banner = Some(message.clone());
                SubmitOutcome::Failed { message, retryable }
            }
        }
    }

    /// Request, run and complete a submission in one call
    pub async fn submit(&mut self) -> SubmitOutcome {
        let pending = match self.request_submit() {
            Ok(pending) => pending,
            Err(outcome) => return outcome,
        };
        let report = pending.run().await;
        self.complete_submit(report)
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Discard this session. The stored draft is kept so the user can resume.
    pub fn cancel(&mut self) -> bool {
        if !self.is_editing() {
            return false;
        }
        self.phase = WizardPhase::Cancelled;
        self.values = FieldValues::new();
        self.state.snapshots.clear();
        self.errors.clear();
        self.mounted.store(false, Ordering::SeqCst);
        tracing::info!(
            flow = %self.flow.name,
            entity_key = %self.entity_key,
            "Wizard cancelled, draft kept"
        );
        true
    }

    /// Mark the session as gone.
    ///
    /// Later field updates, navigation and submits are inactive and late
    /// submission results are dropped.
    pub fn unmount(&mut self) {
        self.mounted.store(false, Ordering::SeqCst);
        tracing::debug!(flow = %self.flow.name, "Wizard unmounted");
    }
}

impl Drop for WizardSession {
    fn drop(&mut self) {
        self.mounted.store(false, Ordering::SeqCst);
    }
}

/// A submission that has passed validation and awaits its repository call
pub struct PendingSubmission {
    seq: u64,
    entity_kind: String,
    mode: FlowMode,
    payload: Value,
    repository: Arc<dyn EntityRepository>,
    timeout: Duration,
    mounted: Arc<AtomicBool>,
}

impl PendingSubmission {
    /// Payload in the external API shape
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Call create/update, bounded by the session timeout
    pub async fn run(self) -> SubmissionReport {
        let PendingSubmission {
            seq,
            entity_kind,
            mode,
            payload,
            repository,
            timeout,
            mounted,
        } = self;

        if !mounted.load(Ordering::SeqCst) {
            return SubmissionReport {
                seq,
                result: Err(WizardError::Unmounted),
            };
        }

        let result = match &mode {
            FlowMode::Create => {
                with_timeout(timeout, repository.create_entity(&entity_kind, payload)).await
            }
            FlowMode::Edit { id } => {
                with_timeout(timeout, repository.update_entity(&entity_kind, id, payload)).await
            }
        };
        SubmissionReport { seq, result }
    }
}

/// Result of [`PendingSubmission::run`]
#[derive(Debug, Clone)]
pub struct SubmissionReport {
    seq: u64,
    pub result: Result<EntityRecord, WizardError>,
}

async fn with_timeout<F>(limit: Duration, operation: F) -> Result<EntityRecord, WizardError>
where
    F: Future<Output = Result<EntityRecord, RepositoryError>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result.map_err(WizardError::from),
        Err(_) => Err(WizardError::Timeout {
            after_ms: limit.as_millis() as u64,
        }),
    }
}

/// First applicable step not yet completed; the last step when all are
fn resume_position(steps: &StepSet, completed: &BTreeSet<StepId>) -> usize {
    steps
        .iter()
        .position(|s| !completed.contains(&s.id))
        .map_or(steps.len(), |i| i + 1)
        .max(1)
}
