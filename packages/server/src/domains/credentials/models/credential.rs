use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::fmt;

/// A tenant's Google OAuth credential.
///
/// The access token must never be used past `expires_at`. Once a refresh
/// fails the credential is `invalid` until the tenant reconnects.
#[derive(Clone, sqlx::FromRow)]
pub struct Credential {
    pub tenant_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub account_id: Option<String>,
    pub invalid: bool,
    pub last_error: Option<String>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("tenant_id", &self.tenant_id)
            .field("access_token", &"[redacted]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("expires_at", &self.expires_at)
            .field("account_id", &self.account_id)
            .field("invalid", &self.invalid)
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl Credential {
    pub fn new(
        tenant_id: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            access_token: access_token.into(),
            refresh_token: Some(refresh_token.into()),
            expires_at,
            account_id: None,
            invalid: false,
            last_error: None,
            refreshed_at: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub async fn find_by_tenant(tenant_id: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT tenant_id, access_token, refresh_token, expires_at, account_id,
                   invalid, last_error, refreshed_at
            FROM oauth_credentials
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Insert or replace, as on a fresh OAuth connect.
    pub async fn upsert(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO oauth_credentials
                (tenant_id, access_token, refresh_token, expires_at, account_id, invalid, last_error)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at,
                account_id = EXCLUDED.account_id,
                invalid = EXCLUDED.invalid,
                last_error = EXCLUDED.last_error,
                updated_at = NOW()
            "#,
        )
        .bind(&self.tenant_id)
        .bind(&self.access_token)
        .bind(&self.refresh_token)
        .bind(self.expires_at)
        .bind(&self.account_id)
        .bind(self.invalid)
        .bind(&self.last_error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Persist a refreshed token. A rotated refresh token replaces the old
    /// one; otherwise the stored refresh token is kept.
    pub async fn save_refreshed(
        tenant_id: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
        refresh_token: Option<&str>,
        refreshed_at: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE oauth_credentials
            SET access_token = $2,
                expires_at = $3,
                refresh_token = COALESCE($4, refresh_token),
                refreshed_at = $5,
                invalid = FALSE,
                last_error = NULL,
                updated_at = NOW()
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .bind(access_token)
        .bind(expires_at)
        .bind(refresh_token)
        .bind(refreshed_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_invalid(tenant_id: &str, error: &str, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE oauth_credentials
            SET invalid = TRUE, last_error = $2, updated_at = NOW()
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }
}
