use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashSet;

/// A review this system has already answered for a location.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RepliedReview {
    pub tenant_id: String,
    pub location_id: String,
    pub review_id: String,
    pub replied_at: DateTime<Utc>,
}

impl RepliedReview {
    pub async fn ids_for_location(
        tenant_id: &str,
        location_id: &str,
        pool: &PgPool,
    ) -> Result<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT review_id FROM replied_reviews WHERE tenant_id = $1 AND location_id = $2",
        )
        .bind(tenant_id)
        .bind(location_id)
        .fetch_all(pool)
        .await?;

        Ok(ids.into_iter().collect())
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO replied_reviews (tenant_id, location_id, review_id, replied_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (location_id, review_id) DO NOTHING
            "#,
        )
        .bind(&self.tenant_id)
        .bind(&self.location_id)
        .bind(&self.review_id)
        .bind(self.replied_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}
