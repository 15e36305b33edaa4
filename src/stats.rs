use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::models::{Rating, Review, ReviewStatus};
use crate::store::ReviewStore;

/// Aggregate view over a product's approved reviews
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewStats {
    pub average_rating: f64,
    pub total_reviews: usize,
    /// Count per star value; always holds keys 1 through 5
    pub rating_distribution: BTreeMap<u8, usize>,
    pub verified_purchase_percentage: f64,
    pub recent_reviews_count: usize,
}

impl ReviewStats {
    pub fn empty() -> Self {
        Self {
            average_rating: 0.0,
            total_reviews: 0,
            rating_distribution: (Rating::MIN..=Rating::MAX).map(|r| (r, 0)).collect(),
            verified_purchase_percentage: 0.0,
            recent_reviews_count: 0,
        }
    }
}

/// Summarize `reviews`, ignoring any that are not approved
pub fn compute_stats(reviews: &[Review], now: DateTime<Utc>, recent_window: Duration) -> ReviewStats {
    let mut stats = ReviewStats::empty();
    // A window reaching past the representable range counts everything as recent
    let cutoff = now
        .checked_sub_signed(recent_window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let mut rating_sum: u64 = 0;
    let mut verified: u64 = 0;

    for review in reviews.iter().filter(|r| r.status == ReviewStatus::Approved) {
        stats.total_reviews += 1;
        rating_sum += review.rating.value() as u64;
        *stats
            .rating_distribution
            .entry(review.rating.value())
            .or_insert(0) += 1;
        if review.is_verified_purchase {
            verified += 1;
        }
        if review.created_at >= cutoff {
            stats.recent_reviews_count += 1;
        }
    }

    if stats.total_reviews > 0 {
        let total = stats.total_reviews as u64;
        stats.average_rating = round_tenths(rating_sum, total);
        stats.verified_purchase_percentage = round_tenths(verified * 100, total);
    }

    stats
}

/// `numerator / denominator` rounded half-up to one decimal, in integer math
fn round_tenths(numerator: u64, denominator: u64) -> f64 {
    let tenths = (numerator * 20 + denominator) / (denominator * 2);
    tenths as f64 / 10.0
}

/// Read-only statistics over approved reviews
#[derive(Clone)]
pub struct StatsAggregator {
    store: ReviewStore,
    recent_window: Duration,
}

impl StatsAggregator {
    pub fn new(store: ReviewStore, recent_window_days: u32) -> Self {
        Self {
            store,
            recent_window: Duration::days(recent_window_days as i64),
        }
    }

    pub async fn compute_stats(&self, product_id: &str) -> Result<ReviewStats> {
        let approved = self.store.get_approved_reviews_for_product(product_id).await?;
        let stats = compute_stats(&approved, Utc::now(), self.recent_window);

        debug!(
            product_id,
            total = stats.total_reviews,
            average = stats.average_rating,
            "Computed review stats"
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReviewDraft;

    fn review(id: u64, rating: i64, status: ReviewStatus, verified: bool, age_days: i64) -> Review {
        let created = Utc::now() - Duration::days(age_days);
        let mut review = Review::from_draft(
            id,
            ReviewDraft {
                product_id: "p1".to_string(),
                user_id: format!("u{}", id),
                user_name: "Sam".to_string(),
                rating: Rating::new(rating).unwrap(),
                title: "t".to_string(),
                review_body: "b".to_string(),
                images: Vec::new(),
                order_id: None,
                is_verified_purchase: verified,
            },
            created,
        );
        review.status = status;
        review
    }

    #[test]
    fn test_no_reviews_is_all_zero() {
        let stats = compute_stats(&[], Utc::now(), Duration::days(30));
        assert_eq!(stats, ReviewStats::empty());
        assert_eq!(stats.rating_distribution.len(), 5);
        assert!(stats.rating_distribution.values().all(|&c| c == 0));
    }

    #[test]
    fn test_only_approved_reviews_count() {
        let reviews = vec![
            review(1, 5, ReviewStatus::Approved, true, 1),
            review(2, 1, ReviewStatus::Pending, true, 1),
            review(3, 1, ReviewStatus::Rejected, false, 1),
        ];
        let stats = compute_stats(&reviews, Utc::now(), Duration::days(30));

        assert_eq!(stats.total_reviews, 1);
        assert_eq!(stats.average_rating, 5.0);
        assert_eq!(stats.rating_distribution[&1], 0);
        assert_eq!(stats.rating_distribution[&5], 1);
    }

    #[test]
    fn test_rounding_is_half_up() {
        // (5 + 4 + 4 + 4) / 4 = 4.25 -> 4.3
        let reviews = vec![
            review(1, 5, ReviewStatus::Approved, true, 1),
            review(2, 4, ReviewStatus::Approved, true, 1),
            review(3, 4, ReviewStatus::Approved, false, 1),
            review(4, 4, ReviewStatus::Approved, true, 1),
        ];
        let stats = compute_stats(&reviews, Utc::now(), Duration::days(30));
        assert_eq!(stats.average_rating, 4.3);
        assert_eq!(stats.verified_purchase_percentage, 75.0);

        // 2 / 3 verified = 66.66.. -> 66.7
        let reviews = vec![
            review(1, 1, ReviewStatus::Approved, true, 1),
            review(2, 2, ReviewStatus::Approved, true, 1),
            review(3, 2, ReviewStatus::Approved, false, 1),
        ];
        let stats = compute_stats(&reviews, Utc::now(), Duration::days(30));
        assert_eq!(stats.average_rating, 1.7);
        assert_eq!(stats.verified_purchase_percentage, 66.7);
    }

    #[test]
    fn test_recent_window() {
        let reviews = vec![
            review(1, 3, ReviewStatus::Approved, true, 2),
            review(2, 3, ReviewStatus::Approved, true, 29),
            review(3, 3, ReviewStatus::Approved, true, 31),
            review(4, 3, ReviewStatus::Approved, true, 400),
        ];
        let stats = compute_stats(&reviews, Utc::now(), Duration::days(30));
        assert_eq!(stats.recent_reviews_count, 2);
        assert_eq!(stats.total_reviews, 4);
    }

    #[test]
    fn test_distribution_serializes_all_keys() {
        let json = serde_json::to_value(ReviewStats::empty()).unwrap();
        let dist = json["rating_distribution"].as_object().unwrap();
        assert_eq!(dist.len(), 5);
        assert_eq!(dist["3"], 0);
    }

    #[test]
    fn test_huge_recent_window_counts_everything() {
        let reviews = vec![
            review(1, 4, ReviewStatus::Approved, true, 0),
            review(2, 2, ReviewStatus::Approved, false, 4000),
        ];

        let stats = compute_stats(&reviews, Utc::now(), Duration::days(u32::MAX as i64));
        assert_eq!(stats.total_reviews, 2);
        assert_eq!(stats.recent_reviews_count, 2);

        let empty = compute_stats(&[], Utc::now(), Duration::days(u32::MAX as i64));
        assert_eq!(empty, ReviewStats::empty());
    }
}
