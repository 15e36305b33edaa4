use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{ReviewError, Result};
use crate::ledger::{Ledger, Mutation, MutationOutcome, VoterSet};
use crate::models::{Granularity, NewReview, Review, ReviewFilter, ReviewStatus};
use crate::moderation;
use crate::validation::validate_new_review;

/// Sole owner of persisted reviews.
///
/// Cheap to clone; clones share the same backend. Every backend call is
/// bounded by `io_timeout` and surfaces as `StorageUnavailable` on expiry.
#[derive(Clone)]
pub struct ReviewStore {
    ledger: Arc<dyn Ledger>,
    io_timeout: Duration,
    granularity: Granularity,
}

impl ReviewStore {
    pub fn new(ledger: Arc<dyn Ledger>, io_timeout: Duration, granularity: Granularity) -> Self {
        Self {
            ledger,
            io_timeout,
            granularity,
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    async fn bounded<T>(&self, op: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.io_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout_ms = self.io_timeout.as_millis() as u64, "Storage operation timed out");
                Err(ReviewError::StorageUnavailable(anyhow!(
                    "{} timed out after {:?}",
                    op,
                    self.io_timeout
                )))
            }
        }
    }

    /// Every review for a product regardless of status, in creation order
    pub async fn get_reviews_for_product(&self, product_id: &str) -> Result<Vec<Review>> {
        let filter = ReviewFilter::product(product_id);
        let reviews = self.bounded("list reviews", self.ledger.list(&filter)).await?;
        debug!(product_id, count = reviews.len(), "Loaded product reviews");
        Ok(reviews)
    }

    pub async fn get_approved_reviews_for_product(&self, product_id: &str) -> Result<Vec<Review>> {
        let filter = ReviewFilter::product(product_id).with_status(ReviewStatus::Approved);
        self.bounded("list approved reviews", self.ledger.list(&filter))
            .await
    }

    pub async fn get_user_reviews_for_product(
        &self,
        product_id: &str,
        user_id: &str,
    ) -> Result<Vec<Review>> {
        let filter = ReviewFilter::product(product_id).with_user(user_id);
        self.bounded("list user reviews", self.ledger.list(&filter))
            .await
    }

    pub async fn get_all_reviews(&self) -> Result<Vec<Review>> {
        self.bounded("list all reviews", self.ledger.list(&ReviewFilter::all()))
            .await
    }

    pub async fn get_pending_reviews(&self) -> Result<Vec<Review>> {
        let filter = ReviewFilter::all().with_status(ReviewStatus::Pending);
        self.bounded("list pending reviews", self.ledger.list(&filter))
            .await
    }

    pub async fn get_review(&self, id: u64) -> Result<Review> {
        self.bounded("get review", self.ledger.get(id))
            .await?
            .ok_or(ReviewError::NotFound(id))
    }

    /// Validate and persist a new pending review
    pub async fn create_review(&self, input: NewReview) -> Result<Review> {
        let draft = validate_new_review(input)?;
        let review = self
            .bounded(
                "create review",
                self.ledger.insert(draft, self.granularity, Utc::now()),
            )
            .await?;

        info!(
            review_id = review.id,
            product_id = %review.product_id,
            user_id = %review.user_id,
            rating = review.rating.value(),
            "Created review"
        );

        Ok(review)
    }

    /// Move a pending review to `new_status`
    pub async fn update_status(&self, id: u64, new_status: ReviewStatus) -> Result<Review> {
        let mutation: Mutation =
            Box::new(move |review: &mut Review, _: &mut VoterSet| -> Result<bool> {
                moderation::transition(review, new_status, Utc::now())?;
                Ok(true)
            });
        let outcome = self.update("update status", id, mutation).await?;

        info!(review_id = id, status = %outcome.review.status, "Updated review status");

        Ok(outcome.review)
    }

    /// Anonymous +1 with no voter tracking
    pub async fn increment_helpful(&self, id: u64) -> Result<Review> {
        let mutation: Mutation =
            Box::new(|review: &mut Review, _: &mut VoterSet| -> Result<bool> {
                review.helpful_count = review.helpful_count.saturating_add(1);
                review.touch(Utc::now());
                Ok(true)
            });
        Ok(self.update("increment helpful", id, mutation).await?.review)
    }

    /// Apply an arbitrary atomic edit to one review
    pub async fn update(&self, op: &'static str, id: u64, mutation: Mutation) -> Result<MutationOutcome> {
        self.bounded(op, self.ledger.update(id, mutation)).await
    }

    /// Permanently remove a review; false if it did not exist
    pub async fn delete_review(&self, id: u64) -> Result<bool> {
        let removed = self.bounded("delete review", self.ledger.delete(id)).await?;
        if removed {
            info!(review_id = id, "Deleted review");
        } else {
            debug!(review_id = id, "Delete requested for unknown review");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{JsonLedger, MemoryLedger};
    use async_trait::async_trait;
    use chrono::DateTime;
    use tempfile::tempdir;

    fn new_review(user: &str, product: &str, rating: i64) -> NewReview {
        NewReview {
            product_id: product.to_string(),
            user_id: user.to_string(),
            user_name: format!("{} name", user),
            rating,
            title: "Nice".to_string(),
            review_body: "Works as described".to_string(),
            images: Vec::new(),
            order_id: Some(format!("order-{}", user)),
            is_verified_purchase: true,
        }
    }

    fn memory_store() -> (ReviewStore, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new());
        let store = ReviewStore::new(ledger.clone(), Duration::from_secs(5), Granularity::PerOrder);
        (store, ledger)
    }

    #[tokio::test]
    async fn test_created_review_defaults() {
        let (store, _) = memory_store();
        let review = store.create_review(new_review("u1", "p1", 4)).await.unwrap();

        assert_eq!(review.status, ReviewStatus::Pending);
        assert_eq!(review.helpful_count, 0);
        assert_eq!(review.created_at, review.updated_at);

        let listed = store.get_reviews_for_product("p1").await.unwrap();
        assert_eq!(listed, vec![review.clone()]);
        assert_eq!(listed[0].rating.value(), 4);
        assert_eq!(listed[0].user_name, "u1 name");
    }

    #[tokio::test]
    async fn test_invalid_rating_persists_nothing() {
        let (store, ledger) = memory_store();
        let before = ledger.snapshot().await.next_id;

        let err = store.create_review(new_review("u1", "p1", 6)).await.unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));

        let after = ledger.snapshot().await;
        assert!(after.reviews.is_empty());
        assert_eq!(after.next_id, before);
    }

    #[tokio::test]
    async fn test_terminal_status_is_final() {
        let (store, _) = memory_store();
        let review = store.create_review(new_review("u1", "p1", 5)).await.unwrap();

        let approved = store.update_status(review.id, ReviewStatus::Approved).await.unwrap();
        assert_eq!(approved.status, ReviewStatus::Approved);
        assert!(approved.updated_at >= approved.created_at);

        let err = store
            .update_status(review.id, ReviewStatus::Rejected)
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::InvalidStateTransition { .. }));
        assert_eq!(
            store.get_review(review.id).await.unwrap().status,
            ReviewStatus::Approved
        );
    }

    #[tokio::test]
    async fn test_unknown_id_changes_nothing() {
        let (store, ledger) = memory_store();
        store.create_review(new_review("u1", "p1", 5)).await.unwrap();
        let before = ledger.snapshot().await;

        let err = store
            .update_status(99, ReviewStatus::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::NotFound(99)));
        assert!(matches!(
            store.increment_helpful(99).await,
            Err(ReviewError::NotFound(99))
        ));
        assert!(!store.delete_review(99).await.unwrap());

        let after = ledger.snapshot().await;
        assert_eq!(after.reviews, before.reviews);
        assert_eq!(after.next_id, before.next_id);
    }

    #[tokio::test]
    async fn test_approved_and_pending_views() {
        let (store, _) = memory_store();
        let a = store.create_review(new_review("u1", "p1", 5)).await.unwrap();
        let b = store.create_review(new_review("u2", "p1", 2)).await.unwrap();
        store.create_review(new_review("u3", "p2", 3)).await.unwrap();

        store.update_status(a.id, ReviewStatus::Approved).await.unwrap();
        store.update_status(b.id, ReviewStatus::Rejected).await.unwrap();

        let approved = store.get_approved_reviews_for_product("p1").await.unwrap();
        assert_eq!(approved.iter().map(|r| r.id).collect::<Vec<_>>(), vec![a.id]);

        let pending = store.get_pending_reviews().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].product_id, "p2");

        assert_eq!(store.get_all_reviews().await.unwrap().len(), 3);
        assert_eq!(store.get_reviews_for_product("p1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_is_permanent() {
        let (store, _) = memory_store();
        let review = store.create_review(new_review("u1", "p1", 5)).await.unwrap();
        store.update_status(review.id, ReviewStatus::Approved).await.unwrap();

        assert!(store.delete_review(review.id).await.unwrap());
        assert!(matches!(
            store.get_review(review.id).await,
            Err(ReviewError::NotFound(_))
        ));
        assert!(store.get_reviews_for_product("p1").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let dir = tempdir().unwrap();
        let ledger = Arc::new(JsonLedger::new(dir.path().join("reviews.json")).unwrap());
        let store = ReviewStore::new(ledger, Duration::from_secs(30), Granularity::PerOrder);
        let review = store.create_review(new_review("u1", "p1", 5)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..40 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment_helpful(review.id).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.get_review(review.id).await.unwrap().helpful_count, 40);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_keep_unique_ids() {
        let dir = tempdir().unwrap();
        let ledger = Arc::new(JsonLedger::new(dir.path().join("reviews.json")).unwrap());
        let store = ReviewStore::new(ledger, Duration::from_secs(30), Granularity::PerOrder);

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create_review(new_review(&format!("u{}", i), "p1", 4)).await
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.sort_unstable();
        ids.dedup();

        assert_eq!(ids.len(), 20);
        assert_eq!(store.get_all_reviews().await.unwrap().len(), 20);
    }

    struct StalledLedger;

    #[async_trait]
    impl Ledger for StalledLedger {
        async fn list(&self, _: &ReviewFilter) -> Result<Vec<Review>> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Vec::new())
        }

        async fn get(&self, _: u64) -> Result<Option<Review>> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(None)
        }

        async fn insert(
            &self,
            _: crate::models::ReviewDraft,
            _: Granularity,
            _: DateTime<Utc>,
        ) -> Result<Review> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Err(ReviewError::NotFound(0))
        }

        async fn update(&self, id: u64, _: Mutation) -> Result<MutationOutcome> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Err(ReviewError::NotFound(id))
        }

        async fn delete(&self, _: u64) -> Result<bool> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_timeout_maps_to_storage_unavailable() {
        let store = ReviewStore::new(
            Arc::new(StalledLedger),
            Duration::from_millis(20),
            Granularity::PerOrder,
        );

        let err = store.get_pending_reviews().await.unwrap_err();
        assert!(matches!(err, ReviewError::StorageUnavailable(_)));
        assert!(err.is_retryable());

        let err = store.create_review(new_review("u1", "p1", 5)).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
