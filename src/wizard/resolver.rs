//! Step-set resolution

use crate::fields::FieldValues;

use super::types::{StepDefinition, StepSet};

/// Compute the ordered set of applicable steps.
///
/// Declaration order is kept. If no declared step applies the first
/// declaration is returned alone so the set is never empty; flows built
/// through [`super::WizardFlow::new`] always declare an unconditional step,
/// so this only guards custom predicates.
pub fn resolve_steps(values: &FieldValues, definitions: &[StepDefinition]) -> StepSet {
    let mut steps: Vec<StepDefinition> = definitions
        .iter()
        .filter(|step| step.is_applicable(values))
        .cloned()
        .collect();

    if steps.is_empty() {
        if let Some(first) = definitions.first() {
            tracing::warn!(step = first.id, "No step applicable, falling back to first step");
            steps.push(first.clone());
        }
    }

    StepSet::from_steps(steps)
}

/// Map the current 1-based position from `old` onto `new`.
///
/// The current step is followed when it survives. Otherwise the last
/// remaining step declared before it is chosen, or position 1 when there is
/// none. The result is always within `[1, new.len()]`.
pub fn reconcile_position(old: &StepSet, new: &StepSet, old_index: usize) -> usize {
    let upper = new.len().max(1);

    let Some(current) = old.get(old_index) else {
        return old_index.clamp(1, upper);
    };

    if let Some(position) = new.position_of(current.id) {
        return position;
    }

    new.iter()
        .enumerate()
        .rev()
        .find(|(_, step)| step.id < current.id)
        .map_or(1, |(i, _)| i + 1)
        .clamp(1, upper)
}
