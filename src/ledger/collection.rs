use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Mutation, MutationOutcome, VoterSet};
use crate::error::{ReviewError, Result};
use crate::models::{Granularity, IneligibleReason, Review, ReviewDraft, ReviewFilter};

/// The durable unit shared by the file and in-memory ledgers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewCollection {
    pub reviews: Vec<Review>,
    pub next_id: u64,
    /// Voter ids per review id that have marked it helpful
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub helpful_votes: BTreeMap<u64, VoterSet>,
}

impl Default for ReviewCollection {
    fn default() -> Self {
        Self {
            reviews: Vec::new(),
            next_id: 1,
            helpful_votes: BTreeMap::new(),
        }
    }
}

impl ReviewCollection {
    /// Matching reviews in insertion order
    pub fn list(&self, filter: &ReviewFilter) -> Vec<Review> {
        self.reviews
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: u64) -> Option<Review> {
        self.reviews.iter().find(|r| r.id == id).cloned()
    }

    /// Allocate an id and append a pending review
    pub fn insert(
        &mut self,
        draft: ReviewDraft,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> Result<Review> {
        if self.reviews.iter().any(|r| granularity.conflicts(r, &draft)) {
            return Err(ReviewError::NotEligible(IneligibleReason::AlreadyReviewed));
        }

        // Ids are never reused, even if a stale document has a low counter
        let max_existing = self.reviews.iter().map(|r| r.id).max().unwrap_or(0);
        let id = self.next_id.max(max_existing + 1);
        self.next_id = id + 1;

        let review = Review::from_draft(id, draft, now);
        self.reviews.push(review.clone());
        Ok(review)
    }

    /// Run `mutation` against one review, committing only on success
    pub fn apply(&mut self, id: u64, mutation: Mutation) -> Result<MutationOutcome> {
        let index = self
            .reviews
            .iter()
            .position(|r| r.id == id)
            .ok_or(ReviewError::NotFound(id))?;

        let mut review = self.reviews[index].clone();
        let mut voters = self.helpful_votes.get(&id).cloned().unwrap_or_default();

        let changed = mutation(&mut review, &mut voters)?;
        if changed {
            self.reviews[index] = review.clone();
            if voters.is_empty() {
                self.helpful_votes.remove(&id);
            } else {
                self.helpful_votes.insert(id, voters);
            }
        }

        Ok(MutationOutcome { review, changed })
    }

    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.reviews.len();
        self.reviews.retain(|r| r.id != id);
        let removed = self.reviews.len() != before;
        if removed {
            self.helpful_votes.remove(&id);
        }
        removed
    }

    pub fn voters(&self, id: u64) -> BTreeSet<String> {
        self.helpful_votes.get(&id).cloned().unwrap_or_default()
    }
}
