use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ReviewError, Result};
use crate::models::{Review, ReviewStatus};
use crate::store::ReviewStore;

/// Decision a moderator makes about a pending review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationAction {
    Approve,
    Reject,
}

impl ModerationAction {
    pub fn target_status(&self) -> ReviewStatus {
        match self {
            ModerationAction::Approve => ReviewStatus::Approved,
            ModerationAction::Reject => ReviewStatus::Rejected,
        }
    }

    /// Map a requested status ("approved" / "rejected") to an action
    pub fn from_status(status: ReviewStatus) -> Option<Self> {
        match status {
            ReviewStatus::Approved => Some(ModerationAction::Approve),
            ReviewStatus::Rejected => Some(ModerationAction::Reject),
            ReviewStatus::Pending => None,
        }
    }
}

/// Result of an external credential check.
///
/// The engine never inspects credentials itself; whoever verified the
/// admin session hands over a grant or a denial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeratorGrant {
    moderator: Option<String>,
}

impl ModeratorGrant {
    pub fn granted(moderator: impl Into<String>) -> Self {
        Self {
            moderator: Some(moderator.into()),
        }
    }

    pub fn denied() -> Self {
        Self { moderator: None }
    }

    /// Grant when `presented` equals a configured shared token
    pub fn from_shared_token(
        moderator: &str,
        presented: Option<&str>,
        expected: Option<&str>,
    ) -> Self {
        match (presented, expected) {
            (Some(p), Some(e)) if !e.is_empty() && tokens_match(p, e) => Self::granted(moderator),
            _ => Self::denied(),
        }
    }

    pub fn moderator(&self) -> Option<&str> {
        self.moderator.as_deref()
    }

    fn require(&self) -> Result<&str> {
        self.moderator()
            .ok_or_else(|| ReviewError::Unauthorized("a valid moderator credential is required".into()))
    }
}

fn tokens_match(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Move `review` from pending to a terminal status
pub fn transition(review: &mut Review, target: ReviewStatus, now: DateTime<Utc>) -> Result<()> {
    if review.status.is_terminal() {
        return Err(ReviewError::invalid_transition(
            review.id,
            format!("review is already {} and cannot become {}", review.status, target),
        ));
    }
    if target == ReviewStatus::Pending {
        return Err(ReviewError::invalid_transition(
            review.id,
            "review is already pending",
        ));
    }

    review.status = target;
    review.touch(now);
    Ok(())
}

/// Pending → approved | rejected, gated on a moderator grant
#[derive(Clone)]
pub struct ModerationStateMachine {
    store: ReviewStore,
}

impl ModerationStateMachine {
    pub fn new(store: ReviewStore) -> Self {
        Self { store }
    }

    pub async fn moderate(
        &self,
        id: u64,
        action: ModerationAction,
        grant: &ModeratorGrant,
    ) -> Result<Review> {
        let moderator = match grant.require() {
            Ok(m) => m,
            Err(e) => {
                warn!(review_id = id, "Moderation refused without credential");
                return Err(e);
            }
        };

        let review = self.store.update_status(id, action.target_status()).await?;

        info!(review_id = id, moderator, status = %review.status, "Review moderated");

        Ok(review)
    }

    /// Irreversibly remove an already moderated review
    pub async fn delete(&self, id: u64, grant: &ModeratorGrant) -> Result<()> {
        let moderator = grant.require()?;

        // Terminal statuses never revert to pending, so this check cannot go stale
        let review = self.store.get_review(id).await?;
        if review.status == ReviewStatus::Pending {
            return Err(ReviewError::invalid_transition(
                id,
                "pending reviews must be approved or rejected before deletion",
            ));
        }

        if !self.store.delete_review(id).await? {
            return Err(ReviewError::NotFound(id));
        }

        info!(review_id = id, moderator, "Review deleted by moderator");

        Ok(())
    }
}
