use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::eligibility::{Eligibility, EligibilityEngine};
use crate::error::{ReviewError, Result};
use crate::helpful::{HelpfulRetraction, HelpfulVote, HelpfulVoteCounter};
use crate::ledger::Ledger;
use crate::models::{Customer, IneligibleReason, NewReview, Review, ReviewStatus};
use crate::moderation::{ModerationAction, ModerationStateMachine, ModeratorGrant};
use crate::orders::OrderHistoryProvider;
use crate::stats::{ReviewStats, StatsAggregator};
use crate::store::ReviewStore;

/// Review submitted by a shopper; identity and purchase proof come from the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSubmission {
    pub product_id: String,
    pub rating: i64,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub images: Vec<String>,
    /// Which purchase the review is for; defaults to the oldest eligible order
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductReviews {
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityResponse {
    pub logged_in: bool,
    pub has_purchased: bool,
    pub can_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "eligible_orders", skip_serializing_if = "Option::is_none")]
    pub eligible_orders: Option<Vec<String>>,
    #[serde(rename = "total_orders", skip_serializing_if = "Option::is_none")]
    pub total_orders: Option<usize>,
    #[serde(rename = "reviewed_orders", skip_serializing_if = "Option::is_none")]
    pub reviewed_orders: Option<Vec<String>>,
}

impl EligibilityResponse {
    fn from_eligibility(logged_in: bool, eligibility: &Eligibility) -> Self {
        // Order details are only disclosed to the signed-in owner
        let detail = logged_in && eligibility.reason != Some(IneligibleReason::OrderHistoryUnavailable);
        Self {
            logged_in,
            has_purchased: eligibility.has_purchased,
            can_review: eligibility.can_review,
            reason: eligibility.reason.map(|r| r.to_string()),
            eligible_orders: detail.then(|| eligibility.eligible_orders.clone()),
            total_orders: detail.then_some(eligibility.purchase_orders.len()),
            reviewed_orders: detail.then(|| eligibility.reviewed_orders.clone()),
        }
    }
}

/// `{success, review}` or `{success: false, error}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<Review>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<Review>> for SubmissionResponse {
    fn from(result: Result<Review>) -> Self {
        match result {
            Ok(review) => Self {
                success: true,
                review: Some(review),
                error: None,
            },
            Err(e) => Self {
                success: false,
                review: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Admin request body: `{action: "moderate", status: "approved" | "rejected"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationRequest {
    pub action: String,
    pub status: ReviewStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationReceipt {
    pub message: String,
    pub review: Review,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionReceipt {
    pub message: String,
}

/// Entry point tying the engine's components to one store
#[derive(Clone)]
pub struct ReviewService {
    store: ReviewStore,
    eligibility: EligibilityEngine,
    moderation: ModerationStateMachine,
    stats: StatsAggregator,
    helpful: HelpfulVoteCounter,
}

impl ReviewService {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        orders: Arc<dyn OrderHistoryProvider>,
        config: &Config,
    ) -> Self {
        let store = ReviewStore::new(
            ledger,
            config.storage.io_timeout(),
            config.eligibility.granularity,
        );

        Self {
            eligibility: EligibilityEngine::new(
                store.clone(),
                orders,
                config.eligibility.provider_timeout(),
            ),
            moderation: ModerationStateMachine::new(store.clone()),
            stats: StatsAggregator::new(store.clone(), config.stats.recent_window_days),
            helpful: HelpfulVoteCounter::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &ReviewStore {
        &self.store
    }

    /// Approved reviews shown on a product page
    pub async fn product_reviews(&self, product_id: &str) -> Result<ProductReviews> {
        Ok(ProductReviews {
            reviews: self.store.get_approved_reviews_for_product(product_id).await?,
        })
    }

    pub async fn eligibility(
        &self,
        product_id: &str,
        customer: Option<&Customer>,
    ) -> Result<EligibilityResponse> {
        let eligibility = self.eligibility.can_review(product_id, customer).await?;
        Ok(EligibilityResponse::from_eligibility(customer.is_some(), &eligibility))
    }

    /// Re-check eligibility and persist a pending, verified review
    pub async fn submit_review(
        &self,
        customer: Option<&Customer>,
        submission: ReviewSubmission,
    ) -> Result<Review> {
        let customer = customer.ok_or(ReviewError::NotEligible(IneligibleReason::NotLoggedIn))?;

        let eligibility = self
            .eligibility
            .can_review(&submission.product_id, Some(customer))
            .await?;
        if !eligibility.can_review {
            let reason = eligibility.reason.unwrap_or(IneligibleReason::MustPurchase);
            warn!(
                product_id = %submission.product_id,
                user_id = %customer.user_id,
                reason = ?reason,
                "Review submission refused"
            );
            return Err(ReviewError::NotEligible(reason));
        }

        let order_id = match submission.order_id {
            Some(requested) => {
                let requested = requested.trim().to_string();
                if !eligibility.eligible_orders.contains(&requested) {
                    return Err(ReviewError::NotEligible(IneligibleReason::OrderNotEligible));
                }
                requested
            }
            None => eligibility
                .eligible_orders
                .first()
                .cloned()
                .ok_or(ReviewError::NotEligible(IneligibleReason::AlreadyReviewed))?,
        };

        let review = self
            .store
            .create_review(NewReview {
                product_id: submission.product_id,
                user_id: customer.user_id.clone(),
                user_name: customer.display_name.clone(),
                rating: submission.rating,
                title: submission.title,
                review_body: submission.body,
                images: submission.images,
                order_id: Some(order_id),
                is_verified_purchase: eligibility.has_purchased,
            })
            .await?;

        info!(review_id = review.id, order_id = ?review.order_id, "Review submitted for moderation");

        Ok(review)
    }

    pub async fn mark_helpful(&self, id: u64, voter_id: &str) -> Result<HelpfulVote> {
        self.helpful.mark_helpful(id, voter_id).await
    }

    pub async fn retract_helpful(&self, id: u64, voter_id: &str) -> Result<HelpfulRetraction> {
        self.helpful.retract_helpful(id, voter_id).await
    }

    pub async fn stats(&self, product_id: &str) -> Result<ReviewStats> {
        self.stats.compute_stats(product_id).await
    }

    pub async fn moderate(
        &self,
        id: u64,
        request: ModerationRequest,
        grant: &ModeratorGrant,
    ) -> Result<ModerationReceipt> {
        if request.action != "moderate" {
            return Err(ReviewError::Validation(format!(
                "unsupported action: {}",
                request.action
            )));
        }
        let action = ModerationAction::from_status(request.status).ok_or_else(|| {
            ReviewError::Validation("status must be approved or rejected".to_string())
        })?;

        let review = self.moderation.moderate(id, action, grant).await?;
        Ok(ModerationReceipt {
            message: format!("Review {} {}", id, review.status),
            review,
        })
    }

    pub async fn delete(&self, id: u64, grant: &ModeratorGrant) -> Result<DeletionReceipt> {
        self.moderation.delete(id, grant).await?;
        Ok(DeletionReceipt {
            message: format!("Review {} deleted", id),
        })
    }
}
