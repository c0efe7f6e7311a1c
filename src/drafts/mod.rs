//! Draft persistence for in-progress wizards
//!
//! A draft is a snapshot of one wizard's values and completed steps, stored
//! as JSON under `draft:<entity key>`. Drafts are best effort: a missing or
//! unreadable draft is simply "no draft".

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fields::{FieldPath, FieldValues};
use crate::wizard::StepId;

mod store;

pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};

/// Prefix shared by every draft key
pub const DRAFT_KEY_PREFIX: &str = "draft:";

/// Storage key for an entity's draft
pub fn draft_key(entity_key: &str) -> String {
    format!("{}{}", DRAFT_KEY_PREFIX, entity_key)
}

/// Persisted snapshot of an in-progress wizard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub entity_key: String,
    /// Serializable values only; file handles are never stored
    pub field_values: FieldValues,
    pub completed_step_ids: BTreeSet<StepId>,
    pub saved_at_epoch_millis: i64,
    /// Paths that held a file when the draft was saved; the user has to
    /// attach them again after a reload
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub pending_files: BTreeSet<FieldPath>,
}

/// Errors raised while saving or clearing drafts
#[derive(Error, Debug)]
pub enum DraftError {
    #[error("failed to serialize draft: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("draft store error: {0}")]
    Store(#[from] StoreError),
}

/// Draft operations over a shared key-value store
#[derive(Clone)]
pub struct DraftStore {
    store: Arc<dyn KeyValueStore>,
}

impl DraftStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Draft store over a fresh [`MemoryStore`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Save (overwrite) the draft for `entity_key`.
    ///
    /// File handles are dropped from the snapshot before serializing; their
    /// paths are recorded in `pending_files` together with `still_pending`,
    /// the files that were already missing when this session resumed.
    pub fn save(
        &self,
        entity_key: &str,
        values: &FieldValues,
        completed: &BTreeSet<StepId>,
        still_pending: &BTreeSet<FieldPath>,
    ) -> Result<Draft, DraftError> {
        let mut pending_files = still_pending.clone();
        pending_files.extend(values.file_paths().into_iter().map(str::to_string));

        let draft = Draft {
            entity_key: entity_key.to_string(),
            field_values: values.without_files(),
            completed_step_ids: completed.clone(),
            saved_at_epoch_millis: Utc::now().timestamp_millis(),
            pending_files,
        };
        let contents = serde_json::to_string(&draft)?;
        self.store.set(&draft_key(entity_key), &contents)?;

        tracing::debug!(
            entity_key,
            fields = draft.field_values.len(),
            completed = ?draft.completed_step_ids,
            pending_files = draft.pending_files.len(),
            "Draft saved"
        );
        Ok(draft)
    }

    /// Load the draft for `entity_key`; unreadable drafts count as absent
    pub fn load(&self, entity_key: &str) -> Option<Draft> {
        let key = draft_key(entity_key);
        let contents = match self.store.get(&key) {
            Ok(Some(contents)) => contents,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(entity_key, error = %e, "Failed to read draft, ignoring it");
                return None;
            }
        };

        match serde_json::from_str::<Draft>(&contents) {
            Ok(draft) if draft.entity_key == entity_key => Some(draft),
            Ok(draft) => {
                tracing::warn!(
                    entity_key,
                    stored_key = %draft.entity_key,
                    "Draft belongs to another entity, ignoring it"
                );
                None
            }
            Err(e) => {
                tracing::warn!(entity_key, error = %e, "Corrupt draft, ignoring it");
                None
            }
        }
    }

    /// Remove the draft for `entity_key`
    pub fn clear(&self, entity_key: &str) -> Result<(), DraftError> {
        self.store.remove(&draft_key(entity_key))?;
        tracing::debug!(entity_key, "Draft cleared");
        Ok(())
    }

    /// All readable drafts, ordered by entity key
    pub fn list(&self) -> Result<Vec<Draft>, DraftError> {
        let keys = self.store.keys(DRAFT_KEY_PREFIX)?;
        Ok(keys
            .iter()
            .filter_map(|key| key.strip_prefix(DRAFT_KEY_PREFIX))
            .filter_map(|entity_key| self.load(entity_key))
            .collect())
    }
}

/// Combine a freshly fetched baseline with a draft.
///
/// Draft values win per path; paths the draft lacks keep the baseline value.
pub fn merge_with_baseline(baseline: &FieldValues, draft: Option<&Draft>) -> FieldValues {
    match draft {
        Some(draft) => draft.field_values.merged_over(baseline),
        None => baseline.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldValue, FileHandle};

    fn sample_values() -> FieldValues {
        FieldValues::new()
            .with("nome", FieldValue::text("Trio Jazz"))
            .with("anoFormacao", FieldValue::Number(2017.0))
            .with("aceitaContratacao", FieldValue::Bool(true))
            .with("generos", FieldValue::selection(["jazz"]))
            .with(
                "integrantes",
                FieldValue::Records(vec![
                    FieldValues::new().with("nome", FieldValue::text("Rui"))
                ]),
            )
    }

    #[test]
    fn test_round_trip_keeps_serializable_values() {
        let drafts = DraftStore::in_memory();
        let values = sample_values();
        let completed = BTreeSet::from([1, 2]);

        drafts.save("band:new", &values, &completed, &BTreeSet::new()).unwrap();
        let draft = drafts.load("band:new").unwrap();

        assert_eq!(draft.entity_key, "band:new");
        assert_eq!(draft.field_values, values);
        assert_eq!(draft.completed_step_ids, completed);
        assert!(draft.saved_at_epoch_millis > 0);
    }

    #[test]
    fn test_file_handles_are_excluded() {
        let drafts = DraftStore::in_memory();
        let values = sample_values().with("logo", FieldValue::File(FileHandle::new("logo.png", 1)));

        drafts.save("band:new", &values, &BTreeSet::new(), &BTreeSet::new()).unwrap();
        let draft = drafts.load("band:new").unwrap();

        assert!(!draft.field_values.contains("logo"));
        assert_eq!(draft.field_values, sample_values());
        assert_eq!(draft.pending_files, BTreeSet::from(["logo".to_string()]));
    }

    #[test]
    fn test_pending_files_carry_over_until_reattached() {
        let drafts = DraftStore::in_memory();
        let still_missing = BTreeSet::from(["logo".to_string()]);

        drafts.save("band:new", &sample_values(), &BTreeSet::new(), &still_missing).unwrap();
        assert_eq!(drafts.load("band:new").unwrap().pending_files, still_missing);

        drafts.save("band:new", &sample_values(), &BTreeSet::new(), &BTreeSet::new()).unwrap();
        assert!(drafts.load("band:new").unwrap().pending_files.is_empty());
    }

    #[test]
    fn test_drafts_without_pending_files_still_load() {
        let store = Arc::new(MemoryStore::new());
        let drafts = DraftStore::new(store.clone());
        store
            .set(
                "draft:band:new",
                r#"{"entityKey":"band:new","fieldValues":{},"completedStepIds":[1],"savedAtEpochMillis":5}"#,
            )
            .unwrap();

        let draft = drafts.load("band:new").unwrap();
        assert!(draft.pending_files.is_empty());
        assert_eq!(draft.completed_step_ids, BTreeSet::from([1]));
    }

    #[test]
    fn test_missing_and_corrupt_drafts_are_absent() {
        let store = Arc::new(MemoryStore::new());
        let drafts = DraftStore::new(store.clone());
        assert!(drafts.load("band:new").is_none());

        store.set("draft:band:new", "{not json").unwrap();
        assert!(drafts.load("band:new").is_none());
    }

    #[test]
    fn test_drafts_are_scoped_per_entity() {
        let drafts = DraftStore::in_memory();
        let a = FieldValues::new().with("nome", FieldValue::text("A"));
        let b = FieldValues::new().with("nome", FieldValue::text("B"));
        drafts.save("band:banda-001", &a, &BTreeSet::new(), &BTreeSet::new()).unwrap();
        drafts.save("band:banda-002", &b, &BTreeSet::new(), &BTreeSet::new()).unwrap();

        drafts.clear("band:banda-001").unwrap();
        assert!(drafts.load("band:banda-001").is_none());
        assert_eq!(
            drafts.load("band:banda-002").unwrap().field_values.text("nome"),
            Some("B")
        );
    }

    #[test]
    fn test_save_overwrites() {
        let drafts = DraftStore::in_memory();
        let first = FieldValues::new().with("nome", FieldValue::text("Primeiro"));
        let second = FieldValues::new().with("nome", FieldValue::text("Segundo"));
        drafts.save("user:new", &first, &BTreeSet::from([1]), &BTreeSet::new()).unwrap();
        drafts.save("user:new", &second, &BTreeSet::from([1, 2]), &BTreeSet::new()).unwrap();

        let draft = drafts.load("user:new").unwrap();
        assert_eq!(draft.field_values.text("nome"), Some("Segundo"));
        assert_eq!(draft.completed_step_ids, BTreeSet::from([1, 2]));
        assert_eq!(drafts.list().unwrap().len(), 1);
    }

    #[test]
    fn test_merge_prefers_draft_values() {
        let baseline = FieldValues::new()
            .with("nome", FieldValue::text("Orquestra"))
            .with("contato.email", FieldValue::text("old@ojr.org.br"));
        let draft = Draft {
            entity_key: "band:banda-001".to_string(),
            field_values: FieldValues::new().with("nome", FieldValue::text("Orquestra Nova")),
            completed_step_ids: BTreeSet::new(),
            saved_at_epoch_millis: 0,
            pending_files: BTreeSet::new(),
        };

        let merged = merge_with_baseline(&baseline, Some(&draft));
        assert_eq!(merged.text("nome"), Some("Orquestra Nova"));
        assert_eq!(merged.text("contato.email"), Some("old@ojr.org.br"));
        assert_eq!(merge_with_baseline(&baseline, None), baseline);
    }
}
