//! Flow definitions: the configuration a wizard session runs

use super::error::WizardError;
use super::types::{StepDefinition, StepId};

/// Whether a flow creates a new entity or edits an existing one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowMode {
    Create,
    Edit { id: String },
}

/// A named, validated list of step declarations for one entity kind
#[derive(Debug, Clone)]
pub struct WizardFlow {
    /// Flow name used in logs and the CLI (e.g. "new-band")
    pub name: String,
    /// Entity kind passed to the repository (e.g. "band")
    pub entity_kind: String,
    pub mode: FlowMode,
    pub steps: Vec<StepDefinition>,
}

impl WizardFlow {
    /// Validate and build a flow.
    ///
    /// Step ids must be unique, start at 1 and increase in declaration order,
    /// and at least one step must be unconditional so the step set can never
    /// be empty.
    pub fn new(
        name: impl Into<String>,
        entity_kind: impl Into<String>,
        mode: FlowMode,
        steps: Vec<StepDefinition>,
    ) -> Result<Self, WizardError> {
        let name = name.into();
        if steps.is_empty() {
            return Err(WizardError::InvalidFlow(format!("{}: no steps declared", name)));
        }
        if steps[0].id != 1 {
            return Err(WizardError::InvalidFlow(format!(
                "{}: first step id must be 1, got {}",
                name, steps[0].id
            )));
        }
        if steps.windows(2).any(|pair| pair[1].id <= pair[0].id) {
            return Err(WizardError::InvalidFlow(format!(
                "{}: step ids must increase in declaration order",
                name
            )));
        }
        if !steps.iter().any(|s| s.applicability.is_always()) {
            return Err(WizardError::InvalidFlow(format!(
                "{}: at least one step must always apply",
                name
            )));
        }

        Ok(Self {
            name,
            entity_kind: entity_kind.into(),
            mode,
            steps,
        })
    }

    /// Key that namespaces this flow's draft (`band:new`, `band:<id>`)
    pub fn entity_key(&self) -> String {
        match &self.mode {
            FlowMode::Create => format!("{}:new", self.entity_kind),
            FlowMode::Edit { id } => format!("{}:{}", self.entity_kind, id),
        }
    }

    pub fn step(&self, id: StepId) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == id)
    }
}
