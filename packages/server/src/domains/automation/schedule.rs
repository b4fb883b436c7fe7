//! Cadence arithmetic: cron expressions for the timer layer, the due check
//! used by both timers and reconciliation, and the informational next run.

use chrono::{DateTime, Datelike, DurationRound, TimeZone, Timelike, Utc};

use super::models::TenantAutomationConfig;

/// Slack on the every-N-days gate so minute-level drift of the previous run
/// does not push the next one a whole cycle out.
pub const ELAPSED_GRACE_MINUTES: i64 = 10;

fn eligible_after(last_run: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    last_run + chrono::Duration::days(i64::from(days))
        - chrono::Duration::minutes(ELAPSED_GRACE_MINUTES)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DueDecision {
    /// Disabled, or missing cadence / trigger time
    Inert,
    /// Wall clock is not on a trigger minute (or weekday)
    NotTriggerMinute,
    /// Already ran at or after this trigger slot
    AlreadyRan { slot: DateTime<Utc> },
    /// Every-N-days gate not yet satisfied
    TooSoon { eligible_at: DateTime<Utc> },
    Due { slot: DateTime<Utc> },
}

impl DueDecision {
    pub fn is_due(&self) -> bool {
        matches!(self, DueDecision::Due { .. })
    }
}

/// Decide whether `config` should post at `now`.
///
/// Fires only when the tenant-local wall clock sits in the same minute as a
/// trigger time on an allowed weekday. Fixed-time cadences are then skipped
/// if last-run is at or after this slot; every-N-days is gated on elapsed
/// time since last-run instead.
pub fn evaluate(config: &TenantAutomationConfig, now: DateTime<Utc>) -> DueDecision {
    let Some(cadence) = config.cadence.as_ref().filter(|_| config.is_schedulable()) else {
        return DueDecision::Inert;
    };

    let local = now.with_timezone(&config.tz());
    if !cadence.fires_on(local.weekday()) {
        return DueDecision::NotTriggerMinute;
    }

    let on_trigger = config
        .trigger_times()
        .iter()
        .any(|t| t.hour() == local.hour() && t.minute() == local.minute());
    if !on_trigger {
        return DueDecision::NotTriggerMinute;
    }

    let slot = now
        .duration_trunc(chrono::Duration::minutes(1))
        .unwrap_or(now);

    if let Some(days) = cadence.interval_days() {
        if let Some(last) = config.last_run_at {
            let eligible_at = eligible_after(last, days);
            if now < eligible_at {
                return DueDecision::TooSoon { eligible_at };
            }
        }
        return DueDecision::Due { slot };
    }

    match config.last_run_at {
        Some(last) if last >= slot => DueDecision::AlreadyRan { slot },
        _ => DueDecision::Due { slot },
    }
}

/// Six-field cron expressions (sec min hour dom mon dow), in tenant-local
/// time, for the coarse timer layer.
pub fn cron_expressions(config: &TenantAutomationConfig) -> Vec<String> {
    let Some(cadence) = config.cadence.as_ref().filter(|_| config.is_schedulable()) else {
        return Vec::new();
    };

    let dow = match cadence.weekdays() {
        None => "*".to_string(),
        Some(days) => days
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(","),
    };

    let mut times = config.trigger_times();
    times.sort();
    times.dedup();
    times
        .into_iter()
        .map(|t| format!("0 {} {} * * {}", t.minute(), t.hour(), dow))
        .collect()
}

/// Next instant the config is expected to post, for display only.
pub fn next_trigger_after(
    config: &TenantAutomationConfig,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let cadence = config.cadence.as_ref().filter(|_| config.is_schedulable())?;
    let tz = config.tz();

    let earliest = match (cadence.interval_days(), config.last_run_at) {
        (Some(days), Some(last)) => eligible_after(last, days).max(now),
        _ => now,
    };

    let mut times = config.trigger_times();
    times.sort();

    let start = earliest.with_timezone(&tz).date_naive();
    for offset in 0..=8 {
        let date = start + chrono::Duration::days(offset);
        if !cadence.fires_on(date.weekday()) {
            continue;
        }
        for time in &times {
            let Some(local) = tz.from_local_datetime(&date.and_time(*time)).earliest() else {
                // Skipped by a DST jump
                continue;
            };
            let instant = local.with_timezone(&Utc);
            if instant > now && instant >= earliest {
                return Some(instant);
            }
        }
    }
    None
}
