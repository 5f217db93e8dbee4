use std::collections::BTreeSet;

use ansi_term::Colour;
use anyhow::Result;
use chrono::{Local, NaiveTime};

use crate::{
    bedtime::is_bedtime_active,
    settings::{
        entities::{BedtimeSettings, ExtensionSettings, TimeLimit, UsageStats},
        store::SettingsStore,
    },
};

/// Formats minutes as `Xh Ym`. Hours are floored, the remaining minutes rounded.
pub fn format_minutes(minutes: f64) -> String {
    let hours = (minutes / 60.).floor();
    let rest = (minutes % 60.).round();
    format!("{}h {}m", hours as i64, rest as i64)
}

#[derive(Debug, PartialEq)]
struct StatusRow {
    usage: UsageStats,
    limit: Option<TimeLimit>,
}

impl StatusRow {
    fn is_over_limit(&self) -> bool {
        self.limit
            .as_ref()
            .is_some_and(|limit| limit.is_exceeded_by(&self.usage))
    }

    fn render(&self) -> String {
        let against = |spent: f64, limit: Option<f64>| match limit {
            Some(limit) => format!("{} / {}", format_minutes(spent), format_minutes(limit)),
            None => format_minutes(spent),
        };
        format!(
            "{}\ttoday {}\tthis month {}",
            self.usage.domain,
            against(
                self.usage.time_spent_today,
                self.limit.as_ref().map(|v| v.minutes_per_day)
            ),
            against(
                self.usage.time_spent_this_month,
                self.limit.as_ref().map(|v| v.minutes_per_month)
            ),
        )
    }
}

/// One row per domain that has a limit or collected usage, ordered by domain.
fn status_rows(settings: &ExtensionSettings, domain: Option<&str>) -> Vec<StatusRow> {
    let domains = settings
        .time_limits
        .iter()
        .map(|v| v.domain.as_str())
        .chain(settings.usage_stats.keys().map(String::as_str))
        .filter(|v| domain.map_or(true, |domain| domain == *v))
        .collect::<BTreeSet<_>>();

    let mut rows = domains
        .into_iter()
        .map(|domain| StatusRow {
            usage: settings
                .usage_stats
                .get(domain)
                .cloned()
                .unwrap_or_else(|| UsageStats::empty(domain)),
            limit: settings.time_limit(domain).cloned(),
        })
        .collect::<Vec<_>>();

    if rows.is_empty() {
        if let Some(domain) = domain {
            rows.push(StatusRow {
                usage: UsageStats::empty(domain),
                limit: None,
            });
        }
    }
    rows
}

fn describe_bedtime(bedtime: &BedtimeSettings, now: NaiveTime) -> String {
    let window = format!("{}-{}", bedtime.start_time, bedtime.end_time);
    if !bedtime.enabled {
        return format!("Bedtime mode off ({window})");
    }
    match is_bedtime_active(now, bedtime) {
        Ok(true) => format!("Bedtime mode on ({window}), grayscale active"),
        Ok(false) => format!("Bedtime mode on ({window})"),
        Err(e) => format!("Bedtime mode on with an invalid window ({window}): {e}"),
    }
}

pub async fn process_status_command(
    domain: Option<String>,
    store: &impl SettingsStore,
) -> Result<()> {
    let settings = store.get().await?;
    println!(
        "{}",
        describe_bedtime(&settings.bedtime, Local::now().time())
    );
    println!();

    let rows = status_rows(&settings, domain.as_deref());
    if rows.is_empty() {
        println!("No limits configured");
    }
    for row in rows {
        if row.is_over_limit() {
            println!("{}", Colour::Red.bold().paint(row.render()));
        } else {
            println!("{}", row.render());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use crate::settings::entities::{BedtimeSettings, ExtensionSettings, TimeLimit};

    use super::{describe_bedtime, format_minutes, status_rows};

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(0.), "0h 0m");
        assert_eq!(format_minutes(31.), "0h 31m");
        assert_eq!(format_minutes(90.), "1h 30m");
        assert_eq!(format_minutes(125.4), "2h 5m");
        assert_eq!(format_minutes(59.6), "0h 60m");
    }

    fn settings() -> ExtensionSettings {
        let mut settings = ExtensionSettings::default();
        settings.upsert_time_limit(TimeLimit::new("x.com", 30., 300.));
        settings.upsert_time_limit(TimeLimit::new("a.com", 30., 300.));
        settings.add_usage("x.com", 31.);
        settings.add_usage("old.com", 5.);
        settings
    }

    #[test]
    fn test_rows_cover_limits_and_usage() {
        let rows = status_rows(&settings(), None);
        let domains = rows
            .iter()
            .map(|v| v.usage.domain.as_str())
            .collect::<Vec<_>>();
        assert_eq!(domains, vec!["a.com", "old.com", "x.com"]);

        assert!(!rows[0].is_over_limit());
        assert!(rows[1].limit.is_none());
        assert!(!rows[1].is_over_limit());
        assert!(rows[2].is_over_limit());
        assert_eq!(
            rows[2].render(),
            "x.com\ttoday 0h 31m / 0h 30m\tthis month 0h 31m / 5h 0m"
        );
        assert_eq!(rows[1].render(), "old.com\ttoday 0h 5m\tthis month 0h 5m");
    }

    #[test]
    fn test_rows_for_single_domain() {
        let rows = status_rows(&settings(), Some("x.com"));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].usage.time_spent_today, 31.);

        let rows = status_rows(&settings(), Some("new.com"));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].render(), "new.com\ttoday 0h 0m\tthis month 0h 0m");
    }

    #[test]
    fn test_describe_bedtime() {
        let mut bedtime = BedtimeSettings::default();
        let midnight = NaiveTime::MIN;
        assert_eq!(describe_bedtime(&bedtime, midnight), "Bedtime mode off (23:00-06:00)");

        bedtime.enabled = true;
        assert_eq!(
            describe_bedtime(&bedtime, midnight),
            "Bedtime mode on (23:00-06:00), grayscale active"
        );
        assert_eq!(
            describe_bedtime(&bedtime, NaiveTime::from_hms_opt(12, 0, 0).unwrap()),
            "Bedtime mode on (23:00-06:00)"
        );
    }
}
