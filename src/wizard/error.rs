//! Wizard error types

use thiserror::Error;

use crate::entities::RepositoryError;

/// Errors surfaced by a wizard session.
///
/// Validation problems are never errors; they travel as
/// [`super::ValidationResult`] values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WizardError {
    /// The entity being edited does not exist (terminal for the session)
    #[error("{kind} '{id}' was not found")]
    EntityNotFound { kind: String, id: String },

    /// Create/update/fetch failed in the backing store
    #[error("external operation failed: {0}")]
    External(RepositoryError),

    #[error("operation timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The session was closed before the operation started
    #[error("wizard session is no longer mounted")]
    Unmounted,

    #[error("invalid flow definition: {0}")]
    InvalidFlow(String),
}

impl WizardError {
    /// Whether the user may retry the same action
    pub fn is_retryable(&self) -> bool {
        match self {
            WizardError::External(e) => e.is_retryable(),
            WizardError::Timeout { .. } => true,
            WizardError::EntityNotFound { .. }
            | WizardError::InvalidFlow(_)
            | WizardError::Unmounted => false,
        }
    }

    /// Banner text shown to the user
    pub fn user_message(&self) -> String {
        match self {
            WizardError::EntityNotFound { kind, id } => {
                format!("The {} '{}' no longer exists.", kind, id)
            }
            WizardError::External(RepositoryError::Validation(msg)) => {
                format!("The server rejected the data: {}", msg)
            }
            WizardError::External(_) | WizardError::Timeout { .. } => {
                "Could not save right now. Your data is kept; please try again.".to_string()
            }
            WizardError::InvalidFlow(msg) => format!("This form is misconfigured: {}", msg),
            WizardError::Unmounted => "This form was closed.".to_string(),
        }
    }
}

impl From<RepositoryError> for WizardError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { kind, id } => WizardError::EntityNotFound { kind, id },
            other => WizardError::External(other),
        }
    }
}
