use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use super::{unavailable, Ledger, Mutation, MutationOutcome, VoterSet};
use crate::error::{ReviewError, Result};
use crate::models::{
    Granularity, IneligibleReason, Rating, Review, ReviewDraft, ReviewFilter, ReviewStatus,
};

const REVIEW_COLUMNS: &str = "id, product_id, user_id, user_name, rating, title, review_body, \
     status, is_verified_purchase, created_at, updated_at, helpful_count, images, order_id";

/// PostgreSQL-backed ledger for production persistence
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Create a new PostgreSQL ledger with the given connection string
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;

        info!("Database migrations complete");

        Ok(())
    }
}

#[async_trait]
impl Ledger for PostgresLedger {
    async fn list(&self, filter: &ReviewFilter) -> Result<Vec<Review>> {
        let sql = format!(
            r#"
            SELECT {REVIEW_COLUMNS}
            FROM reviews
            WHERE ($1::text IS NULL OR product_id = $1)
              AND ($2::text IS NULL OR user_id = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY id
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(filter.product_id.as_deref())
            .bind(filter.user_id.as_deref())
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

        rows.iter().map(review_from_row).collect()
    }

    async fn get(&self, id: u64) -> Result<Option<Review>> {
        let Some(db_id) = db_id(id) else {
            return Ok(None);
        };

        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(db_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        row.as_ref().map(review_from_row).transpose()
    }

    async fn insert(
        &self,
        draft: ReviewDraft,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> Result<Review> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        // Serialize submissions for the same (user, product) pair
        let lock_key = format!("{}\u{1f}{}", draft.user_id, draft.product_id);
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(&lock_key)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;

        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE user_id = $1 AND product_id = $2"
        );
        let existing = sqlx::query(&sql)
            .bind(&draft.user_id)
            .bind(&draft.product_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(unavailable)?;

        for row in &existing {
            if granularity.conflicts(&review_from_row(row)?, &draft) {
                return Err(ReviewError::NotEligible(IneligibleReason::AlreadyReviewed));
            }
        }

        let sql = format!(
            r#"
            INSERT INTO reviews (
                product_id, user_id, user_name, rating, title, review_body, status,
                is_verified_purchase, created_at, updated_at, helpful_count, images, order_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9, 0, $10, $11)
            RETURNING {REVIEW_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&draft.product_id)
            .bind(&draft.user_id)
            .bind(&draft.user_name)
            .bind(draft.rating.value() as i16)
            .bind(&draft.title)
            .bind(&draft.review_body)
            .bind(ReviewStatus::Pending.as_str())
            .bind(draft.is_verified_purchase)
            .bind(now)
            .bind(&draft.images)
            .bind(&draft.order_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(unavailable)?;

        let review = review_from_row(&row)?;
        tx.commit().await.map_err(unavailable)?;

        debug!(review_id = review.id, "Inserted review into database");

        Ok(review)
    }

    async fn update(&self, id: u64, mutation: Mutation) -> Result<MutationOutcome> {
        let db_id = db_id(id).ok_or(ReviewError::NotFound(id))?;
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(db_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unavailable)?
            .ok_or(ReviewError::NotFound(id))?;
        let mut review = review_from_row(&row)?;

        let before: VoterSet = sqlx::query("SELECT voter_id FROM helpful_votes WHERE review_id = $1")
            .bind(db_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(unavailable)?
            .iter()
            .map(|r| r.try_get::<String, _>("voter_id"))
            .collect::<std::result::Result<_, _>>()
            .map_err(corrupt)?;
        let mut voters = before.clone();

        // Dropping `tx` on any early return rolls back
        let changed = mutation(&mut review, &mut voters)?;
        if !changed {
            return Ok(MutationOutcome { review, changed });
        }

        let helpful_count = i32::try_from(review.helpful_count)
            .map_err(|_| ReviewError::Validation("helpful count overflow".to_string()))?;
        sqlx::query(
            r#"
            UPDATE reviews
            SET status = $2, helpful_count = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(db_id)
        .bind(review.status.as_str())
        .bind(helpful_count)
        .bind(review.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        for voter in voters.difference(&before) {
            sqlx::query("INSERT INTO helpful_votes (review_id, voter_id) VALUES ($1, $2)")
                .bind(db_id)
                .bind(voter)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
        }
        for voter in before.difference(&voters) {
            sqlx::query("DELETE FROM helpful_votes WHERE review_id = $1 AND voter_id = $2")
                .bind(db_id)
                .bind(voter)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
        }

        tx.commit().await.map_err(unavailable)?;

        debug!(review_id = id, status = %review.status, "Updated review in database");

        Ok(MutationOutcome { review, changed })
    }

    async fn delete(&self, id: u64) -> Result<bool> {
        let Some(db_id) = db_id(id) else {
            return Ok(false);
        };

        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(db_id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(result.rows_affected() > 0)
    }
}

fn db_id(id: u64) -> Option<i64> {
    i64::try_from(id).ok()
}

fn corrupt(err: impl Into<anyhow::Error>) -> ReviewError {
    ReviewError::StorageCorrupt(err.into())
}

fn review_from_row(row: &PgRow) -> Result<Review> {
    let id: i64 = row.try_get("id").map_err(corrupt)?;
    let rating: i16 = row.try_get("rating").map_err(corrupt)?;
    let status: String = row.try_get("status").map_err(corrupt)?;
    let helpful_count: i32 = row.try_get("helpful_count").map_err(corrupt)?;

    Ok(Review {
        id: u64::try_from(id).map_err(|_| corrupt(anyhow!("negative review id {}", id)))?,
        product_id: row.try_get("product_id").map_err(corrupt)?,
        user_id: row.try_get("user_id").map_err(corrupt)?,
        user_name: row.try_get("user_name").map_err(corrupt)?,
        rating: Rating::new(rating as i64)
            .map_err(|_| corrupt(anyhow!("review {} has rating {}", id, rating)))?,
        title: row.try_get("title").map_err(corrupt)?,
        review_body: row.try_get("review_body").map_err(corrupt)?,
        status: ReviewStatus::parse(&status)
            .ok_or_else(|| corrupt(anyhow!("review {} has status {:?}", id, status)))?,
        is_verified_purchase: row.try_get("is_verified_purchase").map_err(corrupt)?,
        created_at: row.try_get("created_at").map_err(corrupt)?,
        updated_at: row.try_get("updated_at").map_err(corrupt)?,
        helpful_count: u32::try_from(helpful_count)
            .map_err(|_| corrupt(anyhow!("review {} has helpful count {}", id, helpful_count)))?,
        images: row.try_get("images").map_err(corrupt)?,
        order_id: row.try_get("order_id").map_err(corrupt)?,
    })
}
