//! Backing store for the entities a wizard creates or edits
//!
//! The wizard never talks to a concrete backend. It sees the
//! [`EntityRepository`] trait, which the application wires to
//! [`MockRepository`] (in-memory, artificial latency) or to a real service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

mod mock;

pub use mock::MockRepository;

/// A stored entity as returned by the repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    /// Entity type (e.g. "user", "band")
    pub kind: String,
    /// Nested payload in the external API shape
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Errors returned by repository operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    #[error("invalid payload: {0}")]
    Validation(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        RepositoryError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Whether repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepositoryError::Unavailable(_))
    }
}

/// CRUD operations the wizard depends on
#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Load the baseline for an edit flow
    async fn fetch_entity(&self, kind: &str, id: &str) -> Result<EntityRecord, RepositoryError>;

    /// Final submission of a "new" flow
    async fn create_entity(&self, kind: &str, payload: Value)
        -> Result<EntityRecord, RepositoryError>;

    /// Final submission of an "edit" flow
    async fn update_entity(
        &self,
        kind: &str,
        id: &str,
        payload: Value,
    ) -> Result<EntityRecord, RepositoryError>;

    async fn delete_entity(&self, kind: &str, id: &str) -> Result<(), RepositoryError>;
}
