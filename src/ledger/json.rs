use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{unavailable, Ledger, Mutation, MutationOutcome, ReviewCollection};
use crate::error::{ReviewError, Result};
use crate::models::{Granularity, Review, ReviewDraft, ReviewFilter};

/// Single JSON document holding every review.
///
/// Mutations take `write_lock` and keep it until the rewritten file has been
/// renamed into place, so concurrent writers never lose each other's updates.
/// The lock is per process: only one process may own a given file.
pub struct JsonLedger {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonLedger {
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create ledger directory: {}", parent.display()))?;
        }

        info!(path = %path.display(), "Initialized JSON ledger");

        Ok(Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole collection without taking the write lock
    pub async fn snapshot(&self) -> Result<ReviewCollection> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_collection(&path))
            .await
            .map_err(|e| unavailable(anyhow!("ledger read task failed: {}", e)))?
    }

    /// Run `f` as one load→mutate→write cycle under the write lock
    async fn transact<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut ReviewCollection) -> Result<(T, bool)> + Send + 'static,
    {
        // The owned guard moves into the blocking task, so the lock is held
        // until the write finishes even if the caller stops waiting.
        let guard = self.write_lock.clone().lock_owned().await;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let mut collection = load_collection(&path)?;
            let (value, dirty) = f(&mut collection)?;
            if dirty {
                store_collection(&path, &collection)?;
            }
            Ok(value)
        })
        .await
        .map_err(|e| unavailable(anyhow!("ledger write task failed: {}", e)))?
    }
}

fn load_collection(path: &Path) -> Result<ReviewCollection> {
    if !path.exists() {
        return Ok(ReviewCollection::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read review ledger: {}", path.display()))
        .map_err(ReviewError::StorageUnavailable)?;

    if content.trim().is_empty() {
        return Ok(ReviewCollection::default());
    }

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse review ledger: {}", path.display()))
        .map_err(ReviewError::StorageCorrupt)
}

/// Write to a sibling temp file and rename it over the document
fn store_collection(path: &Path, collection: &ReviewCollection) -> Result<()> {
    let content = serde_json::to_string_pretty(collection)
        .context("Failed to serialize review ledger")
        .map_err(ReviewError::StorageUnavailable)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "reviews.json".to_string());
    let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    let write = || -> anyhow::Result<()> {
        let mut file = fs::File::create(&tmp_path)
            .with_context(|| format!("Failed to create temp file: {}", tmp_path.display()))?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to replace review ledger: {}", path.display()))?;
        Ok(())
    };

    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp_path);
        return Err(ReviewError::StorageUnavailable(e));
    }

    debug!(path = %path.display(), reviews = collection.reviews.len(), "Wrote review ledger");

    Ok(())
}

#[async_trait]
impl Ledger for JsonLedger {
    async fn list(&self, filter: &ReviewFilter) -> Result<Vec<Review>> {
        Ok(self.snapshot().await?.list(filter))
    }

    async fn get(&self, id: u64) -> Result<Option<Review>> {
        Ok(self.snapshot().await?.get(id))
    }

    async fn insert(
        &self,
        draft: ReviewDraft,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> Result<Review> {
        self.transact(move |collection| {
            let review = collection.insert(draft, granularity, now)?;
            Ok((review, true))
        })
        .await
    }

    async fn update(&self, id: u64, mutation: Mutation) -> Result<MutationOutcome> {
        self.transact(move |collection| {
            let outcome = collection.apply(id, mutation)?;
            let changed = outcome.changed;
            Ok((outcome, changed))
        })
        .await
    }

    async fn delete(&self, id: u64) -> Result<bool> {
        self.transact(move |collection| {
            let removed = collection.remove(id);
            Ok((removed, removed))
        })
        .await
    }
}
