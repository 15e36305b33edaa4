use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use review_engine::config::OrderHistorySource;
use review_engine::service::{ModerationRequest, SubmissionResponse};
use review_engine::{
    ledger, Config, Customer, HttpOrderHistory, ModeratorGrant, OrderHistoryProvider,
    ReviewService, ReviewStatus, ReviewSubmission, StaticOrderHistory,
};

#[derive(Parser)]
#[command(name = "review-engine")]
#[command(about = "Product review submission and moderation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(long, default_value = ".reviews/config.yml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// List reviews for a product (approved only unless --all)
    List {
        /// Product ID
        product: String,

        /// Include pending and rejected reviews
        #[arg(long)]
        all: bool,
    },

    /// List reviews awaiting moderation
    Pending,

    /// List every stored review
    All,

    /// Check whether a customer may review a product
    Eligibility {
        /// Product ID
        product: String,

        /// Customer ID (omit to check as a signed-out visitor)
        #[arg(long)]
        user: Option<String>,
    },

    /// Submit a review on behalf of a customer
    Submit {
        /// Product ID
        product: String,

        /// Customer ID
        #[arg(long)]
        user: String,

        /// Display name shown with the review
        #[arg(long)]
        name: String,

        /// Star rating (1-5)
        #[arg(long, allow_negative_numbers = true)]
        rating: i64,

        #[arg(long)]
        title: String,

        #[arg(long)]
        body: String,

        /// Image URL (repeatable)
        #[arg(long = "image")]
        images: Vec<String>,

        /// Order the review is for
        #[arg(long)]
        order: Option<String>,
    },

    /// Approve or reject a pending review
    Moderate {
        /// Review ID
        id: u64,

        #[arg(long, conflicts_with = "reject")]
        approve: bool,

        #[arg(long, conflicts_with = "approve")]
        reject: bool,

        /// Admin token
        #[arg(long)]
        token: Option<String>,

        /// Your username
        #[arg(long, env = "USER", default_value = "admin")]
        moderator: String,
    },

    /// Permanently delete a moderated review
    Delete {
        /// Review ID
        id: u64,

        /// Admin token
        #[arg(long)]
        token: Option<String>,

        /// Your username
        #[arg(long, env = "USER", default_value = "admin")]
        moderator: String,
    },

    /// Mark a review helpful
    Helpful {
        /// Review ID
        id: u64,

        /// Voter ID
        #[arg(long)]
        voter: String,

        /// Withdraw the voter's earlier vote instead
        #[arg(long)]
        undo: bool,
    },

    /// Show rating statistics for a product
    Stats {
        /// Product ID
        product: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("review_engine=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let ledger = ledger::open(&config.storage).await?;
    let orders = open_order_history(&config)?;
    let service = ReviewService::new(ledger, orders, &config);

    match cli.command {
        Commands::List { product, all } => {
            if all {
                print_json(&service.store().get_reviews_for_product(&product).await?)?;
            } else {
                print_json(&service.product_reviews(&product).await?)?;
            }
        }
        Commands::Pending => {
            print_json(&service.store().get_pending_reviews().await?)?;
        }
        Commands::All => {
            print_json(&service.store().get_all_reviews().await?)?;
        }
        Commands::Eligibility { product, user } => {
            let customer = user.map(|u| Customer::new(u.clone(), u));
            print_json(&service.eligibility(&product, customer.as_ref()).await?)?;
        }
        Commands::Submit {
            product,
            user,
            name,
            rating,
            title,
            body,
            images,
            order,
        } => {
            let customer = Customer::new(user, name);
            let submission = ReviewSubmission {
                product_id: product,
                rating,
                title,
                body,
                images,
                order_id: order,
            };
            let response: SubmissionResponse = service
                .submit_review(Some(&customer), submission)
                .await
                .into();
            print_json(&response)?;
            if !response.success {
                std::process::exit(1);
            }
        }
        Commands::Moderate {
            id,
            approve,
            reject,
            token,
            moderator,
        } => {
            let status = if approve {
                ReviewStatus::Approved
            } else if reject {
                ReviewStatus::Rejected
            } else {
                anyhow::bail!("Must specify --approve or --reject");
            };
            let grant = moderator_grant(&config, &moderator, token.as_deref());
            let request = ModerationRequest {
                action: "moderate".to_string(),
                status,
            };
            print_json(&service.moderate(id, request, &grant).await?)?;
        }
        Commands::Delete {
            id,
            token,
            moderator,
        } => {
            let grant = moderator_grant(&config, &moderator, token.as_deref());
            print_json(&service.delete(id, &grant).await?)?;
        }
        Commands::Helpful { id, voter, undo } => {
            if undo {
                print_json(&service.retract_helpful(id, &voter).await?)?;
            } else {
                print_json(&service.mark_helpful(id, &voter).await?)?;
            }
        }
        Commands::Stats { product } => {
            print_json(&service.stats(&product).await?)?;
        }
    }

    Ok(())
}

fn open_order_history(config: &Config) -> Result<Arc<dyn OrderHistoryProvider>> {
    let settings = &config.order_history;
    let provider: Arc<dyn OrderHistoryProvider> = match settings.source {
        OrderHistorySource::File => Arc::new(StaticOrderHistory::load(&settings.path)?),
        OrderHistorySource::Http => {
            let base_url = settings
                .base_url
                .clone()
                .context("order_history.base_url must be set for the http source")?;
            let token = std::env::var(&settings.token_env).ok();
            Arc::new(HttpOrderHistory::new(
                base_url,
                token,
                config.eligibility.provider_timeout(),
            )?)
        }
    };
    Ok(provider)
}

fn moderator_grant(config: &Config, moderator: &str, token: Option<&str>) -> ModeratorGrant {
    let expected = std::env::var(&config.moderation.admin_token_env).ok();
    ModeratorGrant::from_shared_token(moderator, token, expected.as_deref())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
