use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A limit configured for a single site. `domain` is compared against the hostname of a tab, so
/// `www.example.com` and `example.com` are different sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeLimit {
    pub domain: String,
    pub minutes_per_day: f64,
    pub minutes_per_month: f64,
    /// Kept for compatibility with records written by the extension UI. Nothing reads it.
    #[serde(default)]
    pub is_blocked: bool,
}

impl TimeLimit {
    pub fn new(domain: impl Into<String>, minutes_per_day: f64, minutes_per_month: f64) -> Self {
        Self {
            domain: domain.into(),
            minutes_per_day,
            minutes_per_month,
            is_blocked: false,
        }
    }

    /// Returns true once either counter has reached its limit.
    pub fn is_exceeded_by(&self, stats: &UsageStats) -> bool {
        stats.time_spent_today >= self.minutes_per_day
            || stats.time_spent_this_month >= self.minutes_per_month
    }
}

/// Accumulated minutes for a domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub domain: String,
    pub time_spent_today: f64,
    pub time_spent_this_month: f64,
}

impl UsageStats {
    pub fn empty(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            time_spent_today: 0.,
            time_spent_this_month: 0.,
        }
    }
}

/// Bedtime window. Times are stored as `HH:MM` strings, the same way the settings page writes
/// them, and parsed only when evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedtimeSettings {
    pub enabled: bool,
    pub start_time: String,
    pub end_time: String,
}

impl Default for BedtimeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            start_time: "23:00".into(),
            end_time: "06:00".into(),
        }
    }
}

/// Partial update of [BedtimeSettings]. Unset fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BedtimePatch {
    pub enabled: Option<bool>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl BedtimePatch {
    pub fn apply_to(self, bedtime: &mut BedtimeSettings) {
        if let Some(enabled) = self.enabled {
            bedtime.enabled = enabled;
        }
        if let Some(start_time) = self.start_time {
            bedtime.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            bedtime.end_time = end_time;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.start_time.is_none() && self.end_time.is_none()
    }
}

/// The whole persisted record. Every read and write goes through this struct as a unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionSettings {
    #[serde(default)]
    pub time_limits: Vec<TimeLimit>,
    #[serde(default)]
    pub bedtime: BedtimeSettings,
    #[serde(default)]
    pub usage_stats: HashMap<String, UsageStats>,
}

impl ExtensionSettings {
    pub fn time_limit(&self, domain: &str) -> Option<&TimeLimit> {
        self.time_limits.iter().find(|v| v.domain == domain)
    }

    /// Replaces the limit with the same domain in place, or appends a new one.
    pub fn upsert_time_limit(&mut self, time_limit: TimeLimit) {
        match self
            .time_limits
            .iter_mut()
            .find(|v| v.domain == time_limit.domain)
        {
            Some(existing) => *existing = time_limit,
            None => self.time_limits.push(time_limit),
        }
    }

    /// Returns true if a limit was removed. Usage already collected for the domain is kept.
    pub fn remove_time_limit(&mut self, domain: &str) -> bool {
        let before = self.time_limits.len();
        self.time_limits.retain(|v| v.domain != domain);
        before != self.time_limits.len()
    }

    pub fn add_usage(&mut self, domain: &str, minutes: f64) -> &UsageStats {
        let stats = self
            .usage_stats
            .entry(domain.to_owned())
            .or_insert_with(|| UsageStats::empty(domain));
        stats.time_spent_today += minutes;
        stats.time_spent_this_month += minutes;
        stats
    }

    pub fn reset_daily(&mut self) {
        for stats in self.usage_stats.values_mut() {
            stats.time_spent_today = 0.;
        }
    }

    pub fn reset_monthly(&mut self) {
        for stats in self.usage_stats.values_mut() {
            stats.time_spent_this_month = 0.;
        }
    }
}
