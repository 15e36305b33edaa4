pub mod config;
pub mod eligibility;
pub mod error;
pub mod helpful;
pub mod ledger;
pub mod models;
pub mod moderation;
pub mod orders;
pub mod service;
pub mod stats;
pub mod store;
pub mod validation;

pub use config::Config;
pub use eligibility::{Eligibility, EligibilityEngine};
pub use error::ReviewError;
pub use helpful::{HelpfulRetraction, HelpfulVote, HelpfulVoteCounter};
pub use ledger::{JsonLedger, Ledger, MemoryLedger, PostgresLedger, ReviewCollection};
pub use models::*;
pub use moderation::{ModerationAction, ModerationStateMachine, ModeratorGrant};
pub use orders::{HttpOrderHistory, OrderHistoryProvider, PurchaseOrder, StaticOrderHistory};
pub use service::{ReviewService, ReviewSubmission};
pub use stats::{ReviewStats, StatsAggregator};
pub use store::ReviewStore;
