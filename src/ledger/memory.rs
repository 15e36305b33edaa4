//! Non-durable ledger kept in process memory.
//!
//! Mirrors the JSON document shape so it can stand in wherever shared
//! storage is unavailable; all data is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{Ledger, Mutation, MutationOutcome, ReviewCollection};
use crate::error::Result;
use crate::models::{Granularity, Review, ReviewDraft, ReviewFilter};

pub struct MemoryLedger {
    collection: RwLock<ReviewCollection>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::from_collection(ReviewCollection::default())
    }

    pub fn from_collection(collection: ReviewCollection) -> Self {
        Self {
            collection: RwLock::new(collection),
        }
    }

    /// Copy of the current collection
    pub async fn snapshot(&self) -> ReviewCollection {
        self.collection.read().await.clone()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn list(&self, filter: &ReviewFilter) -> Result<Vec<Review>> {
        Ok(self.collection.read().await.list(filter))
    }

    async fn get(&self, id: u64) -> Result<Option<Review>> {
        Ok(self.collection.read().await.get(id))
    }

    async fn insert(
        &self,
        draft: ReviewDraft,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> Result<Review> {
        self.collection.write().await.insert(draft, granularity, now)
    }

    async fn update(&self, id: u64, mutation: Mutation) -> Result<MutationOutcome> {
        self.collection.write().await.apply(id, mutation)
    }

    async fn delete(&self, id: u64) -> Result<bool> {
        Ok(self.collection.write().await.remove(id))
    }
}
