pub mod collection;
pub mod json;
pub mod memory;
pub mod postgres;

pub use collection::ReviewCollection;
pub use json::JsonLedger;
pub use memory::MemoryLedger;
pub use postgres::PostgresLedger;

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{ReviewError, Result};
use crate::models::{Granularity, Review, ReviewDraft, ReviewFilter};

/// Ids of voters who marked a review helpful
pub type VoterSet = BTreeSet<String>;

/// An atomic edit of one review and its voter set.
///
/// Returns whether anything changed; unchanged records are not written back.
pub type Mutation = Box<dyn FnOnce(&mut Review, &mut VoterSet) -> Result<bool> + Send>;

/// Result of applying a `Mutation`
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub review: Review,
    pub changed: bool,
}

/// Storage backend for reviews.
///
/// Every mutating call is atomic with respect to every other call on the
/// same backend: no two load/mutate/store cycles interleave.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Reviews matching `filter`, oldest first
    async fn list(&self, filter: &ReviewFilter) -> Result<Vec<Review>>;

    async fn get(&self, id: u64) -> Result<Option<Review>>;

    /// Allocate the next id and persist a pending review, refusing a draft
    /// that collides with an existing review under `granularity`
    async fn insert(
        &self,
        draft: ReviewDraft,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> Result<Review>;

    /// Apply `mutation` to review `id`, failing with `NotFound` if absent
    async fn update(&self, id: u64, mutation: Mutation) -> Result<MutationOutcome>;

    /// Permanently remove a review; false if it did not exist
    async fn delete(&self, id: u64) -> Result<bool>;
}

/// Open the backend named in config. Called once at startup.
pub async fn open(config: &StorageConfig) -> anyhow::Result<Arc<dyn Ledger>> {
    let ledger: Arc<dyn Ledger> = match config.backend {
        StorageBackend::Json => Arc::new(JsonLedger::new(&config.path)?),
        StorageBackend::Memory => Arc::new(MemoryLedger::new()),
        StorageBackend::Postgres => {
            let url = config
                .database_url()
                .context("storage.database_url or DATABASE_URL must be set for postgres")?;
            let ledger = PostgresLedger::new(&url).await?;
            ledger.migrate().await?;
            Arc::new(ledger)
        }
    };

    info!(backend = ?config.backend, "Opened review ledger");

    Ok(ledger)
}

pub(crate) fn unavailable(err: impl Into<anyhow::Error>) -> ReviewError {
    ReviewError::StorageUnavailable(err.into())
}
