use anyhow::Result;
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use sqlx::PgPool;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use super::action::{ActionKey, ActionKind};
use super::cadence::{parse_time_of_day, Cadence, UnknownCadence};

/// Business details fed to content generation. Never used for scheduling.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BusinessProfile {
    pub name: String,
    pub category: Option<String>,
    pub keywords: Vec<String>,
}

/// Automation settings for one (tenant, location).
///
/// Posting is schedulable only when enabled with a cadence and at least one
/// trigger time; anything less leaves the config inert.
#[derive(Debug, Clone)]
pub struct TenantAutomationConfig {
    pub tenant_id: String,
    pub location_id: String,
    pub posting_enabled: bool,
    pub cadence: Option<Cadence>,
    pub time_of_day: Option<NaiveTime>,
    pub timezone: String,
    pub reply_enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Resolved Business Profile account, cached after the first lookup.
    pub account_id: Option<String>,
    pub business: BusinessProfile,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl TenantAutomationConfig {
    /// Minimal enabled daily config, mostly for tests and fixtures.
    pub fn daily(
        tenant_id: impl Into<String>,
        location_id: impl Into<String>,
        time_of_day: NaiveTime,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            location_id: location_id.into(),
            posting_enabled: true,
            cadence: Some(Cadence::Daily),
            time_of_day: Some(time_of_day),
            timezone: "UTC".to_string(),
            reply_enabled: false,
            last_run_at: None,
            last_error: None,
            account_id: None,
            business: BusinessProfile::default(),
            next_run_at: None,
        }
    }

    pub fn key(&self, kind: ActionKind) -> ActionKey {
        ActionKey::new(&self.tenant_id, &self.location_id, kind)
    }

    pub fn trigger_times(&self) -> Vec<NaiveTime> {
        self.cadence
            .as_ref()
            .map(|c| c.trigger_times(self.time_of_day))
            .unwrap_or_default()
    }

    pub fn is_schedulable(&self) -> bool {
        self.posting_enabled && self.cadence.is_some() && !self.trigger_times().is_empty()
    }

    /// Tenant timezone, UTC when the stored name is not a valid IANA zone.
    pub fn tz(&self) -> Tz {
        match self.timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                tracing::warn!(
                    tenant_id = %self.tenant_id,
                    location_id = %self.location_id,
                    timezone = %self.timezone,
                    "Invalid timezone, falling back to UTC"
                );
                Tz::UTC
            }
        }
    }
}

// =============================================================================
// Store row
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SettingsRowError {
    #[error("automation settings row has no tenant identifier")]
    MissingTenant,
    #[error(transparent)]
    Cadence(#[from] UnknownCadence),
}

/// Raw `automation_settings` row, legacy alias columns included.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AutomationSettingsRow {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub gmail_id: Option<String>,
    pub user_id: Option<String>,
    pub location_id: String,
    pub posting_enabled: bool,
    pub cadence: Option<String>,
    pub post_time: Option<NaiveTime>,
    pub custom_times: Option<Vec<String>>,
    pub timezone: String,
    pub reply_enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub account_id: Option<String>,
    pub business_name: Option<String>,
    pub category: Option<String>,
    pub keywords: Vec<String>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TryFrom<AutomationSettingsRow> for TenantAutomationConfig {
    type Error = SettingsRowError;

    fn try_from(row: AutomationSettingsRow) -> Result<Self, Self::Error> {
        let tenant_id = non_empty(row.tenant_id)
            .or_else(|| non_empty(row.gmail_id))
            .or_else(|| non_empty(row.user_id))
            .ok_or(SettingsRowError::MissingTenant)?;

        let custom_times: Vec<NaiveTime> = row
            .custom_times
            .unwrap_or_default()
            .iter()
            .filter_map(|raw| parse_time_of_day(raw))
            .collect();

        let cadence = match non_empty(row.cadence) {
            Some(raw) => Some(Cadence::parse(&raw, custom_times)?),
            None => None,
        };

        Ok(Self {
            tenant_id,
            location_id: row.location_id,
            posting_enabled: row.posting_enabled,
            cadence,
            time_of_day: row.post_time,
            timezone: row.timezone,
            reply_enabled: row.reply_enabled,
            last_run_at: row.last_run_at,
            last_error: row.last_error,
            account_id: non_empty(row.account_id),
            business: BusinessProfile {
                name: row.business_name.unwrap_or_default(),
                category: non_empty(row.category),
                keywords: row.keywords,
            },
            next_run_at: row.next_run_at,
        })
    }
}

/// Insert/update parameters for a settings row.
#[derive(TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct UpsertAutomationSettings<'a> {
    pub tenant_id: &'a str,
    pub location_id: &'a str,
    #[builder(default = true)]
    pub posting_enabled: bool,
    #[builder(default)]
    pub cadence: Option<&'a str>,
    #[builder(default)]
    pub post_time: Option<NaiveTime>,
    #[builder(default)]
    pub custom_times: Vec<String>,
    #[builder(default = "UTC")]
    pub timezone: &'a str,
    #[builder(default = false)]
    pub reply_enabled: bool,
    #[builder(default)]
    pub business_name: Option<&'a str>,
    #[builder(default)]
    pub category: Option<&'a str>,
    #[builder(default)]
    pub keywords: Vec<String>,
}

impl UpsertAutomationSettings<'_> {
    pub async fn execute(&self, pool: &PgPool) -> Result<AutomationSettingsRow> {
        sqlx::query_as::<_, AutomationSettingsRow>(
            r#"
            INSERT INTO automation_settings (
                id, tenant_id, location_id, posting_enabled, cadence, post_time,
                custom_times, timezone, reply_enabled, business_name, category, keywords
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (tenant_key, location_id) DO UPDATE SET
                posting_enabled = EXCLUDED.posting_enabled,
                cadence = EXCLUDED.cadence,
                post_time = EXCLUDED.post_time,
                custom_times = EXCLUDED.custom_times,
                timezone = EXCLUDED.timezone,
                reply_enabled = EXCLUDED.reply_enabled,
                business_name = EXCLUDED.business_name,
                category = EXCLUDED.category,
                keywords = EXCLUDED.keywords,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(self.tenant_id)
        .bind(self.location_id)
        .bind(self.posting_enabled)
        .bind(self.cadence)
        .bind(self.post_time)
        .bind(&self.custom_times)
        .bind(self.timezone)
        .bind(self.reply_enabled)
        .bind(self.business_name)
        .bind(self.category)
        .bind(&self.keywords)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}

impl AutomationSettingsRow {
    pub async fn find_all(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM automation_settings
            WHERE posting_enabled OR reply_enabled
            ORDER BY tenant_key, location_id
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find(tenant_id: &str, location_id: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM automation_settings WHERE tenant_key = $1 AND location_id = $2",
        )
        .bind(tenant_id)
        .bind(location_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Successful run: set last-run and clear the recorded error.
    pub async fn record_success(
        tenant_id: &str,
        location_id: &str,
        ran_at: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE automation_settings
            SET last_run_at = $3, last_error = NULL, updated_at = NOW()
            WHERE tenant_key = $1 AND location_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(location_id)
        .bind(ran_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Failed run: record the error, leave last-run untouched.
    pub async fn record_error(
        tenant_id: &str,
        location_id: &str,
        error: &str,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE automation_settings
            SET last_error = $3, updated_at = NOW()
            WHERE tenant_key = $1 AND location_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(location_id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn save_account_id(
        tenant_id: &str,
        location_id: &str,
        account_id: &str,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE automation_settings
            SET account_id = $3, updated_at = NOW()
            WHERE tenant_key = $1 AND location_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(location_id)
        .bind(account_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_next_run_at(
        tenant_id: &str,
        location_id: &str,
        next_run_at: Option<DateTime<Utc>>,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE automation_settings SET next_run_at = $3 WHERE tenant_key = $1 AND location_id = $2",
        )
        .bind(tenant_id)
        .bind(location_id)
        .bind(next_run_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}
