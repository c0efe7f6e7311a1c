//! Validation gate for step transitions and final submission
//!
//! Validation never mutates anything and never fails: every problem comes
//! back as data in a [`ValidationResult`], keyed by field path.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::fields::{FieldPath, FieldValue, FieldValues};

use super::types::{StepDefinition, StepId, StepSet};

static PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\(?\d{2}\)?\s?9?\d{4}-?\d{4}$").expect("phone pattern compiles")
});
static POSTAL_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{5}-?\d{3}$").expect("postal code pattern compiles"));
static TAX_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{3}\.?\d{3}\.?\d{3}-?\d{2}$").expect("tax id pattern compiles")
});
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
});

/// Formats checked by [`FieldRule::Pattern`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// Brazilian phone with area code, `(11) 91234-5678`
    Phone,
    /// CEP, `01310-100`
    PostalCode,
    /// CPF, `123.456.789-09`
    TaxId,
    Email,
}

impl PatternKind {
    pub fn matches(self, input: &str) -> bool {
        let regex = match self {
            PatternKind::Phone => &PHONE,
            PatternKind::PostalCode => &POSTAL_CODE,
            PatternKind::TaxId => &TAX_ID,
            PatternKind::Email => &EMAIL,
        };
        regex.is_match(input)
    }

    /// Example shown to the user when the format is wrong
    pub fn hint(self) -> &'static str {
        match self {
            PatternKind::Phone => "(11) 91234-5678",
            PatternKind::PostalCode => "01310-100",
            PatternKind::TaxId => "123.456.789-09",
            PatternKind::Email => "nome@exemplo.com",
        }
    }
}

/// Rule applied to a single field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRule {
    /// Present and not blank
    Required,
    /// Text matching a known format
    Pattern(PatternKind),
    /// Numeric value (or numeric text) within `[min, max]`
    Range { min: f64, max: f64 },
    /// Selection or record list with at least this many entries
    MinItems(usize),
    /// Text with at least this many characters
    MinLength(usize),
}

impl FieldRule {
    fn check(&self, label: &str, value: Option<&FieldValue>) -> Result<(), String> {
        let blank = value.map_or(true, FieldValue::is_blank);
        match self {
            FieldRule::Required => {
                if blank {
                    return Err(format!("{} is required", label));
                }
            }
            FieldRule::MinItems(min) => {
                let count = value.and_then(FieldValue::item_count).unwrap_or(0);
                if count < *min {
                    return Err(format!("{} needs at least {} item(s)", label, min));
                }
            }
            // Format rules only apply to filled-in values
            _ if blank => {}
            FieldRule::Pattern(kind) => match value {
                Some(FieldValue::Text(text)) if kind.matches(text.trim()) => {}
                _ => return Err(format!("{} must look like {}", label, kind.hint())),
            },
            FieldRule::Range { min, max } => {
                let number = match value {
                    Some(FieldValue::Number(n)) => Some(*n),
                    Some(FieldValue::Text(text)) => text.trim().replace(',', ".").parse().ok(),
                    _ => None,
                };
                match number {
                    Some(n) if n >= *min && n <= *max => {}
                    _ => {
                        return Err(format!("{} must be between {} and {}", label, min, max));
                    }
                }
            }
            FieldRule::MinLength(min) => {
                let length = match value {
                    Some(FieldValue::Text(text)) => text.trim().chars().count(),
                    _ => 0,
                };
                if length < *min {
                    return Err(format!("{} must have at least {} characters", label, min));
                }
            }
        }
        Ok(())
    }
}

/// A field owned by a step, with the rules it must pass
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRequirement {
    pub path: FieldPath,
    pub label: String,
    pub rules: Vec<FieldRule>,
}

impl FieldRequirement {
    /// Field that must be filled in
    pub fn required(path: impl Into<FieldPath>, label: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            label: label.into(),
            rules: vec![FieldRule::Required],
        }
    }

    /// Field whose rules only apply once it has a value
    pub fn optional(path: impl Into<FieldPath>, label: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            label: label.into(),
            rules: Vec::new(),
        }
    }

    pub fn rule(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// First failing rule's message
    pub fn check(&self, values: &FieldValues) -> Option<String> {
        let value = values.get(&self.path);
        self.rules
            .iter()
            .find_map(|rule| rule.check(&self.label, value).err())
    }
}

/// Rule spanning more than one field, or a whole selection
#[derive(Debug, Clone, PartialEq)]
pub enum CrossFieldRule {
    /// `confirm` must repeat the text at `path`; the error lands on `confirm`
    Matches {
        path: FieldPath,
        confirm: FieldPath,
        message: String,
    },
    /// The selection at `path` must not be empty, whatever else is filled in
    AnySelected { path: FieldPath, message: String },
}

impl CrossFieldRule {
    pub fn matches(
        path: impl Into<FieldPath>,
        confirm: impl Into<FieldPath>,
        message: impl Into<String>,
    ) -> Self {
        CrossFieldRule::Matches {
            path: path.into(),
            confirm: confirm.into(),
            message: message.into(),
        }
    }

    pub fn any_selected(path: impl Into<FieldPath>, message: impl Into<String>) -> Self {
        CrossFieldRule::AnySelected {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Paths this rule reads
    pub fn paths(&self) -> Vec<&str> {
        match self {
            CrossFieldRule::Matches { path, confirm, .. } => vec![path.as_str(), confirm.as_str()],
            CrossFieldRule::AnySelected { path, .. } => vec![path.as_str()],
        }
    }

    /// Path the error is reported on and its message, when the rule fails
    fn check(&self, values: &FieldValues) -> Option<(&str, &str)> {
        match self {
            CrossFieldRule::Matches {
                path,
                confirm,
                message,
            } => {
                let original = values.text(path).unwrap_or_default();
                let repeated = values.text(confirm).unwrap_or_default();
                (original != repeated).then_some((confirm.as_str(), message.as_str()))
            }
            CrossFieldRule::AnySelected { path, message } => values
                .selection(path)
                .is_empty()
                .then_some((path.as_str(), message.as_str())),
        }
    }
}

/// Outcome of validating one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub step_id: StepId,
    pub is_valid: bool,
    pub field_errors: BTreeMap<FieldPath, String>,
}

impl ValidationResult {
    /// First failing path in the step's display order
    pub fn focus_path(&self, step: &StepDefinition) -> Option<FieldPath> {
        step.field_paths()
            .into_iter()
            .find(|p| self.field_errors.contains_key(*p))
            .map(str::to_string)
            .or_else(|| self.field_errors.keys().next().cloned())
    }
}

/// Validate a single step against the current values.
///
/// All field errors are collected; cross-field errors are only reported on
/// paths that do not already carry a field error.
pub fn validate_step(
    step_id: StepId,
    values: &FieldValues,
    definitions: &[StepDefinition],
) -> ValidationResult {
    let Some(step) = definitions.iter().find(|s| s.id == step_id) else {
        tracing::warn!(step = step_id, "Validation requested for unknown step");
        return ValidationResult {
            step_id,
            is_valid: false,
            field_errors: BTreeMap::new(),
        };
    };

    let mut field_errors = BTreeMap::new();
    for requirement in &step.fields {
        if let Some(message) = requirement.check(values) {
            field_errors.insert(requirement.path.clone(), message);
        }
    }
    for rule in &step.cross_rules {
        if let Some((path, message)) = rule.check(values) {
            field_errors
                .entry(path.to_string())
                .or_insert_with(|| message.to_string());
        }
    }

    ValidationResult {
        step_id,
        is_valid: field_errors.is_empty(),
        field_errors,
    }
}

/// Validate every step in the set, in order
pub fn validate_all(values: &FieldValues, steps: &StepSet) -> Vec<ValidationResult> {
    let definitions: Vec<StepDefinition> = steps.iter().cloned().collect();
    steps
        .iter()
        .map(|step| validate_step(step.id, values, &definitions))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::resolver::resolve_steps;

    fn credentials_step() -> StepDefinition {
        StepDefinition::new(3, "Credenciais")
            .field(FieldRequirement::required("senha", "Senha").rule(FieldRule::MinLength(8)))
            .field(FieldRequirement::required("confirmarSenha", "Confirmação"))
            .field(FieldRequirement::required("tipoUsuario", "Tipo de usuário"))
            .cross_rule(CrossFieldRule::matches(
                "senha",
                "confirmarSenha",
                "Passwords do not match",
            ))
            .cross_rule(CrossFieldRule::any_selected(
                "tipoUsuario",
                "Select at least one role",
            ))
    }

    #[test]
    fn test_patterns() {
        assert!(PatternKind::Phone.matches("(11) 91234-5678"));
        assert!(PatternKind::Phone.matches("1132345678"));
        assert!(!PatternKind::Phone.matches("123"));
        assert!(PatternKind::PostalCode.matches("01310-100"));
        assert!(PatternKind::PostalCode.matches("01310100"));
        assert!(!PatternKind::PostalCode.matches("0131-100"));
        assert!(PatternKind::TaxId.matches("123.456.789-09"));
        assert!(PatternKind::TaxId.matches("12345678909"));
        assert!(PatternKind::Email.matches("ana@banda.com.br"));
        assert!(!PatternKind::Email.matches("ana@"));
    }

    #[test]
    fn test_collects_all_errors_in_one_pass() {
        let result = validate_step(3, &FieldValues::new(), &[credentials_step()]);
        assert!(!result.is_valid);
        assert_eq!(result.field_errors.len(), 3);
        assert_eq!(result.field_errors["senha"], "Senha is required");
        assert_eq!(result.field_errors["tipoUsuario"], "Tipo de usuário is required");
    }

    #[test]
    fn test_empty_role_selection_blocks_even_when_rest_is_valid() {
        let values = FieldValues::new()
            .with("senha", FieldValue::text("segredo123"))
            .with("confirmarSenha", FieldValue::text("segredo123"))
            .with("tipoUsuario", FieldValue::Selection(vec![]));

        let step = StepDefinition::new(3, "Credenciais")
            .field(FieldRequirement::required("senha", "Senha"))
            .cross_rule(CrossFieldRule::any_selected("tipoUsuario", "Select at least one role"));
        let result = validate_step(3, &values, &[step]);

        assert!(!result.is_valid);
        assert_eq!(result.field_errors["tipoUsuario"], "Select at least one role");
    }

    #[test]
    fn test_password_mismatch_reported_on_confirmation() {
        let values = FieldValues::new()
            .with("senha", FieldValue::text("segredo123"))
            .with("confirmarSenha", FieldValue::text("segredo124"))
            .with("tipoUsuario", FieldValue::selection(["musico"]));

        let result = validate_step(3, &values, &[credentials_step()]);
        assert!(!result.is_valid);
        assert_eq!(result.field_errors.len(), 1);
        assert_eq!(result.field_errors["confirmarSenha"], "Passwords do not match");
    }

    #[test]
    fn test_optional_field_rules_skip_blank_values() {
        let step = StepDefinition::new(1, "Mídia").field(
            FieldRequirement::optional("site", "Site").rule(FieldRule::MinLength(5)),
        );
        assert!(validate_step(1, &FieldValues::new(), &[step.clone()]).is_valid);

        let values = FieldValues::new().with("site", FieldValue::text("x"));
        assert!(!validate_step(1, &values, &[step]).is_valid);
    }

    #[test]
    fn test_range_accepts_numeric_text() {
        let step = StepDefinition::new(1, "Básico").field(
            FieldRequirement::required("ano", "Ano").rule(FieldRule::Range {
                min: 1900.0,
                max: 2100.0,
            }),
        );
        let ok = FieldValues::new().with("ano", FieldValue::text("1998"));
        let low = FieldValues::new().with("ano", FieldValue::Number(1850.0));
        let junk = FieldValues::new().with("ano", FieldValue::text("noventa"));

        assert!(validate_step(1, &ok, &[step.clone()]).is_valid);
        assert_eq!(
            validate_step(1, &low, &[step.clone()]).field_errors["ano"],
            "Ano must be between 1900 and 2100"
        );
        assert!(!validate_step(1, &junk, &[step]).is_valid);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let values = FieldValues::new().with("senha", FieldValue::text("curta"));
        let defs = [credentials_step()];
        let first = validate_step(3, &values, &defs);
        let second = validate_step(3, &values, &defs);
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_step_is_invalid() {
        let result = validate_step(42, &FieldValues::new(), &[credentials_step()]);
        assert!(!result.is_valid);
        assert!(result.field_errors.is_empty());
    }

    #[test]
    fn test_focus_follows_display_order() {
        let step = credentials_step();
        let result = validate_step(3, &FieldValues::new(), &[step.clone()]);
        // "confirmarSenha" sorts first alphabetically, but "senha" is shown first
        assert_eq!(result.focus_path(&step).as_deref(), Some("senha"));
    }

    #[test]
    fn test_validate_all_covers_every_step() {
        let defs = vec![
            StepDefinition::new(1, "Nome").field(FieldRequirement::required("nome", "Nome")),
            credentials_step(),
        ];
        let values = FieldValues::new().with("nome", FieldValue::text("Ana"));
        let steps = resolve_steps(&values, &defs);

        let results = validate_all(&values, &steps);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_valid);
        assert!(!results[1].is_valid);
    }
}
