//! Type definitions for the wizard engine

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::entities::EntityRecord;
use crate::fields::{FieldPath, FieldValues};

use super::validation::{CrossFieldRule, FieldRequirement, ValidationResult};

/// 1-based step identifier, fixed by declaration
pub type StepId = u32;

/// Condition under which a step belongs to the step set
#[derive(Debug, Clone)]
pub enum Applicability {
    /// Always shown
    Always,
    /// Shown while the selection at `path` contains `option`
    SelectionContains { path: FieldPath, option: String },
    /// Shown while the boolean at `path` is true
    FlagSet(FieldPath),
    /// Arbitrary predicate supplied by the host flow
    Predicate(fn(&FieldValues) -> bool),
}

impl Applicability {
    pub fn selection_contains(path: impl Into<FieldPath>, option: impl Into<String>) -> Self {
        Applicability::SelectionContains {
            path: path.into(),
            option: option.into(),
        }
    }

    pub fn holds(&self, values: &FieldValues) -> bool {
        match self {
            Applicability::Always => true,
            Applicability::SelectionContains { path, option } => {
                values.selection(path).iter().any(|s| s == option)
            }
            Applicability::FlagSet(path) => values.flag(path),
            Applicability::Predicate(predicate) => predicate(values),
        }
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Applicability::Always)
    }
}

impl fmt::Display for Applicability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Applicability::Always => write!(f, "always"),
            Applicability::SelectionContains { path, option } => {
                write!(f, "when {} includes \"{}\"", path, option)
            }
            Applicability::FlagSet(path) => write!(f, "when {} is set", path),
            Applicability::Predicate(_) => write!(f, "conditional"),
        }
    }
}

/// One page of a multi-step form
#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub id: StepId,
    pub label: String,
    /// Field requirements in display order
    pub fields: Vec<FieldRequirement>,
    pub cross_rules: Vec<CrossFieldRule>,
    pub applicability: Applicability,
}

impl StepDefinition {
    /// Create an always-applicable step with no fields
    pub fn new(id: StepId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            fields: Vec::new(),
            cross_rules: Vec::new(),
            applicability: Applicability::Always,
        }
    }

    pub fn field(mut self, requirement: FieldRequirement) -> Self {
        self.fields.push(requirement);
        self
    }

    pub fn cross_rule(mut self, rule: CrossFieldRule) -> Self {
        self.cross_rules.push(rule);
        self
    }

    pub fn when(mut self, applicability: Applicability) -> Self {
        self.applicability = applicability;
        self
    }

    pub fn is_applicable(&self, values: &FieldValues) -> bool {
        self.applicability.holds(values)
    }

    /// Paths owned by this step, fields first, then cross-rule targets
    pub fn field_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.fields.iter().map(|f| f.path.as_str()).collect();
        for rule in &self.cross_rules {
            for path in rule.paths() {
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }
        paths
    }
}

/// Ordered, non-empty list of the steps that currently apply
#[derive(Debug, Clone)]
pub struct StepSet {
    steps: Vec<StepDefinition>,
}

impl StepSet {
    pub(crate) fn from_steps(steps: Vec<StepDefinition>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step at a 1-based position
    pub fn get(&self, position: usize) -> Option<&StepDefinition> {
        position.checked_sub(1).and_then(|i| self.steps.get(i))
    }

    /// 1-based position of a step id
    pub fn position_of(&self, id: StepId) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id).map(|i| i + 1)
    }

    pub fn contains(&self, id: StepId) -> bool {
        self.steps.iter().any(|s| s.id == id)
    }

    pub fn ids(&self) -> Vec<StepId> {
        self.steps.iter().map(|s| s.id).collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.label.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StepDefinition> {
        self.steps.iter()
    }
}

/// Position and progress of one wizard instance
#[derive(Debug, Clone, PartialEq)]
pub struct WizardState {
    /// 1-based position in the current [`StepSet`]
    pub current_index: usize,
    pub completed: BTreeSet<StepId>,
    /// Values of each step captured at its last successful forward transition
    pub snapshots: BTreeMap<StepId, FieldValues>,
}

impl Default for WizardState {
    fn default() -> Self {
        Self {
            current_index: 1,
            completed: BTreeSet::new(),
            snapshots: BTreeMap::new(),
        }
    }
}

/// Lifecycle phase of a wizard session
#[derive(Debug, Clone, PartialEq)]
pub enum WizardPhase {
    /// Editing the step with this id
    Editing(StepId),
    /// Final submission succeeded
    Submitted(EntityRecord),
    /// Session discarded by the user; the draft stays in storage
    Cancelled,
    /// The edited entity was deleted while the form was open
    NotFound,
}

/// Result of a next/prev signal
#[derive(Debug, Clone, PartialEq)]
pub enum NavOutcome {
    /// Moved between steps
    Moved { from: StepId, to: StepId },
    /// Forward transition refused by the validation gate
    Blocked {
        step_id: StepId,
        errors: BTreeMap<FieldPath, String>,
        /// First failing field in display order, for focus/scroll
        focus: Option<FieldPath>,
    },
    /// Already at the first (prev) or last (next) step
    AtBoundary,
    /// Session is not editing
    Inactive,
}

/// Why a submit signal was dropped without effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredReason {
    /// A submission is already in flight
    InFlight,
    /// Submit is only accepted on the last step
    NotOnLastStep,
    /// Session is submitted, cancelled, unmounted or its entity is gone
    Inactive,
    /// Session was unmounted before the result arrived
    Unmounted,
    /// Result belongs to a submission that is no longer current
    Stale,
}

/// Result of a submit signal
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Submitted(EntityRecord),
    /// One or more applicable steps failed validation; nothing was sent
    Rejected {
        failing: Vec<ValidationResult>,
        focus: Option<FieldPath>,
    },
    /// The external operation failed; values, position and draft are kept
    Failed { message: String, retryable: bool },
    Ignored(IgnoredReason),
}
