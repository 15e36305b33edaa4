use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{Customer, Granularity, IneligibleReason};
use crate::orders::{OrderHistoryProvider, PurchaseOrder};
use crate::store::ReviewStore;

/// Whether a customer may review a product, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub can_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<IneligibleReason>,
    pub has_purchased: bool,
    pub has_reviewed: bool,
    /// Completed orders containing the product, oldest first
    pub purchase_orders: Vec<String>,
    /// Orders already covered by a review
    pub reviewed_orders: Vec<String>,
    /// Orders a new review may be attached to
    pub eligible_orders: Vec<String>,
}

impl Eligibility {
    fn denied(reason: IneligibleReason) -> Self {
        Self {
            can_review: false,
            reason: Some(reason),
            has_purchased: false,
            has_reviewed: false,
            purchase_orders: Vec::new(),
            reviewed_orders: Vec::new(),
            eligible_orders: Vec::new(),
        }
    }
}

/// Purchase-gated review permission
#[derive(Clone)]
pub struct EligibilityEngine {
    store: ReviewStore,
    orders: Arc<dyn OrderHistoryProvider>,
    provider_timeout: Duration,
}

impl EligibilityEngine {
    pub fn new(
        store: ReviewStore,
        orders: Arc<dyn OrderHistoryProvider>,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            store,
            orders,
            provider_timeout,
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.store.granularity()
    }

    /// Decide whether `customer` may review `product_id`.
    ///
    /// Order history failures fail closed; store failures propagate.
    pub async fn can_review(
        &self,
        product_id: &str,
        customer: Option<&Customer>,
    ) -> Result<Eligibility> {
        let Some(customer) = customer else {
            return Ok(Eligibility::denied(IneligibleReason::NotLoggedIn));
        };
        let user_id = customer.user_id.as_str();

        let purchase_orders = match self.purchase_orders(product_id, user_id).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(product_id, user_id, error = %e, "Order history unavailable, denying review");
                return Ok(Eligibility::denied(IneligibleReason::OrderHistoryUnavailable));
            }
        };

        let existing = self.store.get_user_reviews_for_product(product_id, user_id).await?;
        let has_reviewed = !existing.is_empty();

        let mut reviewed: BTreeSet<String> = existing
            .iter()
            .filter_map(|r| r.order_id.clone())
            .collect();
        let unattached = existing.iter().filter(|r| r.order_id.is_none()).count();

        let mut eligible_orders: Vec<String> = match self.granularity() {
            Granularity::PerProduct if has_reviewed => Vec::new(),
            _ => purchase_orders
                .iter()
                .filter(|o| !reviewed.contains(*o))
                .cloned()
                .collect(),
        };

        // Reviews without an order each use up the oldest remaining purchase
        if self.granularity() == Granularity::PerOrder {
            let consumed = unattached.min(eligible_orders.len());
            for order in eligible_orders.drain(..consumed) {
                reviewed.insert(order);
            }
        }

        let has_purchased = !purchase_orders.is_empty();
        let can_review = has_purchased && !eligible_orders.is_empty();
        let reason = if !has_purchased {
            Some(IneligibleReason::MustPurchase)
        } else if !can_review {
            Some(IneligibleReason::AlreadyReviewed)
        } else {
            None
        };

        debug!(
            product_id,
            user_id,
            can_review,
            purchases = purchase_orders.len(),
            eligible = eligible_orders.len(),
            "Computed review eligibility"
        );

        Ok(Eligibility {
            can_review,
            reason,
            has_purchased,
            has_reviewed,
            purchase_orders,
            reviewed_orders: reviewed.into_iter().collect(),
            eligible_orders,
        })
    }

    /// Ids of completed orders containing the product, oldest first, deduplicated
    async fn purchase_orders(&self, product_id: &str, user_id: &str) -> anyhow::Result<Vec<String>> {
        let mut orders: Vec<PurchaseOrder> =
            tokio::time::timeout(self.provider_timeout, self.orders.orders_for_user(user_id))
                .await
                .map_err(|_| anyhow::anyhow!("order history timed out after {:?}", self.provider_timeout))??
                .into_iter()
                .filter(|o| o.proves_purchase_of(product_id))
                .collect();

        orders.sort_by(|a, b| {
            a.completed_at
                .cmp(&b.completed_at)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });

        let mut seen = BTreeSet::new();
        Ok(orders
            .into_iter()
            .map(|o| o.order_id)
            .filter(|id| seen.insert(id.clone()))
            .collect())
    }
}
