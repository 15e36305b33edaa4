use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReviewError;

/// Moderation status of a review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    /// Approved and rejected reviews never change status again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReviewStatus::Pending)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReviewStatus::Pending),
            "approved" => Some(ReviewStatus::Approved),
            "rejected" => Some(ReviewStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Star rating, always within 1..=5
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, ReviewError> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ReviewError::Validation(format!(
                "rating must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = ReviewError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Rating::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

/// A customer review of a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    pub product_id: String,
    pub user_id: String,
    pub user_name: String,
    pub rating: Rating,
    pub title: String,
    pub review_body: String,
    pub status: ReviewStatus,
    pub is_verified_purchase: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub helpful_count: u32,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

impl Review {
    /// Build a freshly allocated pending review
    pub fn from_draft(id: u64, draft: ReviewDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            product_id: draft.product_id,
            user_id: draft.user_id,
            user_name: draft.user_name,
            rating: draft.rating,
            title: draft.title,
            review_body: draft.review_body,
            status: ReviewStatus::Pending,
            is_verified_purchase: draft.is_verified_purchase,
            created_at: now,
            updated_at: now,
            helpful_count: 0,
            images: draft.images,
            order_id: draft.order_id,
        }
    }

    /// Refresh `updated_at`, never letting it fall behind `created_at`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now.max(self.created_at);
    }
}

/// Server-side input for creating a review
///
/// `is_verified_purchase` and `order_id` are filled in by the submission
/// flow from eligibility results, never taken from the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReview {
    pub product_id: String,
    pub user_id: String,
    pub user_name: String,
    pub rating: i64,
    pub title: String,
    pub review_body: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(skip_deserializing)]
    pub is_verified_purchase: bool,
}

/// A `NewReview` that passed validation; produced by `validation::validate_new_review`
#[derive(Debug, Clone)]
pub struct ReviewDraft {
    pub product_id: String,
    pub user_id: String,
    pub user_name: String,
    pub rating: Rating,
    pub title: String,
    pub review_body: String,
    pub images: Vec<String>,
    pub order_id: Option<String>,
    pub is_verified_purchase: bool,
}

/// Selection criteria for listing reviews; `None` fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewFilter {
    pub product_id: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<ReviewStatus>,
}

impl ReviewFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn product(product_id: &str) -> Self {
        Self {
            product_id: Some(product_id.to_string()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: ReviewStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn matches(&self, review: &Review) -> bool {
        self.product_id.as_ref().map_or(true, |p| *p == review.product_id)
            && self.user_id.as_ref().map_or(true, |u| *u == review.user_id)
            && self.status.map_or(true, |s| s == review.status)
    }
}

/// How many reviews a customer may leave for one product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One review per purchase order containing the product
    #[default]
    PerOrder,
    /// One review per product regardless of how often it was bought
    PerProduct,
}

impl Granularity {
    /// Whether `existing` already occupies the slot `draft` wants
    pub fn conflicts(&self, existing: &Review, draft: &ReviewDraft) -> bool {
        if existing.user_id != draft.user_id || existing.product_id != draft.product_id {
            return false;
        }
        match self {
            Granularity::PerProduct => true,
            Granularity::PerOrder => existing.order_id == draft.order_id,
        }
    }
}

/// An authenticated shopper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub user_id: String,
    pub display_name: String,
}

impl Customer {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Why a customer may not review a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibleReason {
    NotLoggedIn,
    MustPurchase,
    AlreadyReviewed,
    OrderNotEligible,
    OrderHistoryUnavailable,
}

impl IneligibleReason {
    pub fn message(&self) -> &'static str {
        match self {
            IneligibleReason::NotLoggedIn => "you must be logged in to review products",
            IneligibleReason::MustPurchase => "you must purchase this product before reviewing it",
            IneligibleReason::AlreadyReviewed => "you have already reviewed this product",
            IneligibleReason::OrderNotEligible => {
                "the selected order is not eligible for a review of this product"
            }
            IneligibleReason::OrderHistoryUnavailable => {
                "purchase history is temporarily unavailable, please try again later"
            }
        }
    }
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
