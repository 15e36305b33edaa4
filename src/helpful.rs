use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ReviewError, Result};
use crate::ledger::{Mutation, VoterSet};
use crate::models::Review;
use crate::store::ReviewStore;

/// Outcome of a helpful vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpfulVote {
    pub helpful_count: u32,
    /// The voter had already marked this review; nothing changed
    pub already_voted: bool,
}

/// Outcome of withdrawing a helpful vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpfulRetraction {
    pub helpful_count: u32,
    /// False when the voter had no vote to withdraw
    pub retracted: bool,
}

/// Per-voter helpful counts, deduplicated in the store
#[derive(Clone)]
pub struct HelpfulVoteCounter {
    store: ReviewStore,
}

impl HelpfulVoteCounter {
    pub fn new(store: ReviewStore) -> Self {
        Self { store }
    }

    /// Count `voter_id` once towards review `id`
    pub async fn mark_helpful(&self, id: u64, voter_id: &str) -> Result<HelpfulVote> {
        let voter = normalize_voter(voter_id)?;
        let mutation: Mutation =
            Box::new(move |review: &mut Review, voters: &mut VoterSet| -> Result<bool> {
                if !voters.insert(voter) {
                    return Ok(false);
                }
                review.helpful_count = review.helpful_count.saturating_add(1);
                review.touch(Utc::now());
                Ok(true)
            });

        let outcome = self.store.update("mark helpful", id, mutation).await?;
        if outcome.changed {
            info!(review_id = id, helpful_count = outcome.review.helpful_count, "Review marked helpful");
        } else {
            debug!(review_id = id, "Duplicate helpful vote ignored");
        }

        Ok(HelpfulVote {
            helpful_count: outcome.review.helpful_count,
            already_voted: !outcome.changed,
        })
    }

    /// Undo `voter_id`'s own earlier vote; never touches other votes
    pub async fn retract_helpful(&self, id: u64, voter_id: &str) -> Result<HelpfulRetraction> {
        let voter = normalize_voter(voter_id)?;
        let mutation: Mutation =
            Box::new(move |review: &mut Review, voters: &mut VoterSet| -> Result<bool> {
                if !voters.remove(&voter) {
                    return Ok(false);
                }
                review.helpful_count = review.helpful_count.saturating_sub(1);
                review.touch(Utc::now());
                Ok(true)
            });

        let outcome = self.store.update("retract helpful", id, mutation).await?;
        if outcome.changed {
            info!(review_id = id, helpful_count = outcome.review.helpful_count, "Helpful vote retracted");
        }

        Ok(HelpfulRetraction {
            helpful_count: outcome.review.helpful_count,
            retracted: outcome.changed,
        })
    }
}

fn normalize_voter(voter_id: &str) -> Result<String> {
    let voter = voter_id.trim();
    if voter.is_empty() {
        return Err(ReviewError::Validation("voter id is required".to_string()));
    }
    Ok(voter.to_string())
}
