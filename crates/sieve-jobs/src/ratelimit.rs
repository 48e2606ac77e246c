//! Persisted rate-limit gate.
//!
//! When the generation endpoint reports a retry-after duration, the absolute
//! resume timestamp is written to the settings table so every process sharing
//! the database honours it. New generation starts are refused until then.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{info, warn};

use sieve_core::defaults::{RATE_LIMIT_COOLDOWN_SECS, RATE_LIMIT_SETTING_KEY};
use sieve_core::{Result, SettingsStore};
use sieve_db::SqliteSettingsStore;

#[derive(Clone)]
pub struct RateLimitGate {
    settings: SqliteSettingsStore,
}

impl RateLimitGate {
    pub fn new(settings: SqliteSettingsStore) -> Self {
        Self { settings }
    }

    /// Resume timestamp if it is still in the future.
    ///
    /// An expired or unreadable entry is deleted and reads as `None`.
    pub async fn resume_at(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.settings.get_setting(RATE_LIMIT_SETTING_KEY).await? else {
            return Ok(None);
        };

        match parse_timestamp(&raw) {
            Some(resume_at) if resume_at > now => Ok(Some(resume_at)),
            Some(_) => {
                self.settings.delete_setting(RATE_LIMIT_SETTING_KEY).await?;
                info!(
                    subsystem = "jobs",
                    component = "rate_limit",
                    "Rate-limit window elapsed"
                );
                Ok(None)
            }
            None => {
                warn!(
                    subsystem = "jobs",
                    component = "rate_limit",
                    value = %raw,
                    "Discarding unreadable rate-limit timestamp"
                );
                self.settings.delete_setting(RATE_LIMIT_SETTING_KEY).await?;
                Ok(None)
            }
        }
    }

    /// Persist `now + retry_after` as the resume timestamp.
    pub async fn record(&self, retry_after: Duration, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let wait = chrono::Duration::from_std(retry_after)
            .unwrap_or_else(|_| chrono::Duration::seconds(RATE_LIMIT_COOLDOWN_SECS as i64));
        let resume_at = now + wait;

        self.settings
            .set_setting(RATE_LIMIT_SETTING_KEY, &resume_at.to_rfc3339())
            .await?;

        warn!(
            subsystem = "jobs",
            component = "rate_limit",
            retry_after_secs = retry_after.as_secs(),
            resume_at = %resume_at,
            "Generation rate limited, new jobs blocked"
        );
        Ok(resume_at)
    }

    /// Remaining wait before new jobs may start, if any.
    pub async fn time_until_allowed(&self, now: DateTime<Utc>) -> Result<Option<Duration>> {
        Ok(self
            .resume_at(now)
            .await?
            .map(|at| (at - now).to_std().unwrap_or_default()))
    }
}

/// RFC 3339, or integer epoch milliseconds.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}
