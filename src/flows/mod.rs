//! The wizards shipped with the application

use std::fmt;
use std::str::FromStr;

use crate::wizard::{WizardError, WizardFlow};

pub mod band;
pub mod signup;

/// Multi-select holding the account types chosen at signup
pub const ROLE_FIELD: &str = "tipoUsuario";
pub const ROLE_MUSICIAN: &str = "musico";
pub const ROLE_MANAGER: &str = "gestor";

/// Available flows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Signup,
    NewBand,
    EditBand,
}

impl FlowKind {
    pub fn all() -> &'static [FlowKind] {
        &[FlowKind::Signup, FlowKind::NewBand, FlowKind::EditBand]
    }

    pub fn key(&self) -> &'static str {
        match self {
            FlowKind::Signup => "signup",
            FlowKind::NewBand => "new-band",
            FlowKind::EditBand => "edit-band",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FlowKind::Signup => "Create a user account (musician and/or band manager)",
            FlowKind::NewBand => "Register a new band",
            FlowKind::EditBand => "Edit an existing band (requires --entity)",
        }
    }

    pub fn requires_entity(&self) -> bool {
        matches!(self, FlowKind::EditBand)
    }

    /// Build the flow; `entity` is the id of the record to edit
    pub fn build(&self, entity: Option<&str>) -> Result<WizardFlow, WizardError> {
        match (self, entity) {
            (FlowKind::Signup, _) => signup::flow(),
            (FlowKind::NewBand, _) => band::new_band(),
            (FlowKind::EditBand, Some(id)) if !id.trim().is_empty() => band::edit_band(id.trim()),
            (FlowKind::EditBand, _) => Err(WizardError::InvalidFlow(
                "edit-band needs the id of the band to edit".to_string(),
            )),
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for FlowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlowKind::all()
            .iter()
            .copied()
            .find(|kind| kind.key() == s)
            .ok_or_else(|| {
                let known: Vec<_> = FlowKind::all().iter().map(FlowKind::key).collect();
                format!("unknown flow '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flow_kind() {
        assert_eq!("signup".parse::<FlowKind>().unwrap(), FlowKind::Signup);
        assert_eq!("edit-band".parse::<FlowKind>().unwrap(), FlowKind::EditBand);
        let err = "delete-band".parse::<FlowKind>().unwrap_err();
        assert!(err.contains("signup, new-band, edit-band"));
    }

    #[test]
    fn test_edit_band_requires_entity() {
        assert!(FlowKind::EditBand.build(None).is_err());
        assert!(FlowKind::EditBand.build(Some("  ")).is_err());
        let flow = FlowKind::EditBand.build(Some("banda-001")).unwrap();
        assert_eq!(flow.entity_key(), "band:banda-001");
    }

    #[test]
    fn test_every_flow_builds() {
        for kind in FlowKind::all() {
            let entity = kind.requires_entity().then_some("banda-001");
            assert!(kind.build(entity).is_ok(), "{} failed to build", kind);
        }
    }
}
