//! In-memory repository with simulated latency
//!
//! Constructed once at startup and shared through `Arc`; there is no
//! module-level state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{EntityRecord, EntityRepository, RepositoryError};
use crate::config::MockConfig;

/// Mock CRUD backend
pub struct MockRepository {
    records: RwLock<BTreeMap<(String, String), EntityRecord>>,
    latency: Duration,
    /// Number of upcoming calls that fail with `Unavailable`
    failures_pending: AtomicUsize,
    /// Completed create/update calls, including failed ones
    write_calls: AtomicUsize,
}

impl MockRepository {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            latency: Duration::ZERO,
            failures_pending: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
        }
    }

    /// Build from configuration, optionally seeded with sample bands
    pub fn from_config(config: &MockConfig) -> Self {
        let repo = Self::new().with_latency(Duration::from_millis(config.latency_ms));
        if config.seed_fixtures {
            repo.with_records(fixtures())
        } else {
            repo
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_records(mut self, records: Vec<EntityRecord>) -> Self {
        {
            let map = self.records.get_mut();
            for record in records {
                map.insert((record.kind.clone(), record.id.clone()), record);
            }
        }
        self
    }

    /// Make the next `count` calls fail as if the backend were down
    pub fn fail_next(&self, count: usize) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn simulate(&self, operation: &str) -> Result<(), RepositoryError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let injected = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            tracing::debug!(operation, "Injected backend failure");
            return Err(RepositoryError::Unavailable(format!(
                "simulated failure during {}",
                operation
            )));
        }
        Ok(())
    }
}

impl Default for MockRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn require_object(payload: &Value) -> Result<(), RepositoryError> {
    if payload.is_object() {
        Ok(())
    } else {
        Err(RepositoryError::Validation(
            "payload must be a JSON object".to_string(),
        ))
    }
}

#[async_trait]
impl EntityRepository for MockRepository {
    async fn fetch_entity(&self, kind: &str, id: &str) -> Result<EntityRecord, RepositoryError> {
        self.simulate("fetch").await?;
        self.records
            .read()
            .await
            .get(&(kind.to_string(), id.to_string()))
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(kind, id))
    }

    async fn create_entity(
        &self,
        kind: &str,
        payload: Value,
    ) -> Result<EntityRecord, RepositoryError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate("create").await?;
        require_object(&payload)?;

        let now = Utc::now();
        let record = EntityRecord {
            id: Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            data: payload,
            created_at: now,
            updated_at: now,
        };
        self.records
            .write()
            .await
            .insert((kind.to_string(), record.id.clone()), record.clone());
        tracing::info!(kind, id = %record.id, "Entity created");
        Ok(record)
    }

    async fn update_entity(
        &self,
        kind: &str,
        id: &str,
        payload: Value,
    ) -> Result<EntityRecord, RepositoryError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate("update").await?;
        require_object(&payload)?;

        let mut records = self.records.write().await;
        let record = records
            .get_mut(&(kind.to_string(), id.to_string()))
            .ok_or_else(|| RepositoryError::not_found(kind, id))?;
        record.data = payload;
        record.updated_at = Utc::now();
        tracing::info!(kind, id, "Entity updated");
        Ok(record.clone())
    }

    async fn delete_entity(&self, kind: &str, id: &str) -> Result<(), RepositoryError> {
        self.simulate("delete").await?;
        self.records
            .write()
            .await
            .remove(&(kind.to_string(), id.to_string()))
            .map(|_| ())
            .ok_or_else(|| RepositoryError::not_found(kind, id))
    }
}

/// Sample bands available to `edit-band` when fixtures are enabled
pub(crate) fn fixtures() -> Vec<EntityRecord> {
    let now = Utc::now();
    vec![
        EntityRecord {
            id: "banda-001".to_string(),
            kind: "band".to_string(),
            data: json!({
                "nome": "Orquestra Jovem do Recife",
                "generoMusical": "erudito",
                "anoFormacao": 2009,
                "contato": { "email": "contato@ojr.org.br", "telefone": "(81) 93456-7890" },
                "integrantes": [
                    { "nome": "Helena Costa", "instrumento": "violino" },
                    { "nome": "Caio Lima", "instrumento": "violoncelo" }
                ],
                "aceitaContratacao": true,
                "cacheMinimo": 4500
            }),
            created_at: now,
            updated_at: now,
        },
        EntityRecord {
            id: "banda-002".to_string(),
            kind: "band".to_string(),
            data: json!({
                "nome": "Trio Jazz",
                "generoMusical": "jazz",
                "anoFormacao": 2017,
                "contato": { "email": "trio@jazz.com.br", "telefone": "(11) 91234-5678" },
                "integrantes": [{ "nome": "Rui Alves", "instrumento": "contrabaixo" }],
                "aceitaContratacao": false
            }),
            created_at: now,
            updated_at: now,
        },
    ]
}
