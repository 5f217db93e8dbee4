use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    host::BrowserHost,
    settings::{
        entities::TimeLimit,
        store::{SettingsStore, SettingsStoreExt},
    },
    tabs::{TabId, TabTracker},
};

/// What a single tick did, mostly for logging and tests.
#[derive(Debug, Default, PartialEq)]
pub struct TickReport {
    pub elapsed_minutes: f64,
    pub accumulated: Vec<(TabId, String)>,
    pub redirected: Vec<TabId>,
}

/// Adds the time between ticks to every active tab whose domain has a limit and sends tabs that
/// went over the limit to the blocked page.
pub struct UsageAccumulator {
    last_tick: DateTime<Utc>,
}

impl UsageAccumulator {
    pub fn new(started: DateTime<Utc>) -> Self {
        Self {
            last_tick: started,
        }
    }

    pub fn last_tick(&self) -> DateTime<Utc> {
        self.last_tick
    }

    fn take_elapsed_minutes(&mut self, now: DateTime<Utc>) -> f64 {
        let elapsed = now - self.last_tick;
        self.last_tick = now;
        // A clock set backwards shouldn't take time away.
        (elapsed.num_milliseconds().max(0) as f64) / 1000. / 60.
    }

    pub async fn tick(
        &mut self,
        now: DateTime<Utc>,
        tabs: &TabTracker,
        store: &impl SettingsStore,
        host: &mut impl BrowserHost,
    ) -> Result<TickReport> {
        let elapsed_minutes = self.take_elapsed_minutes(now);
        let span = info_span!("Usage tick", elapsed_minutes);
        self.tick_inner(elapsed_minutes, tabs, store, host)
            .instrument(span)
            .await
    }

    async fn tick_inner(
        &self,
        elapsed_minutes: f64,
        tabs: &TabTracker,
        store: &impl SettingsStore,
        host: &mut impl BrowserHost,
    ) -> Result<TickReport> {
        let mut report = TickReport {
            elapsed_minutes,
            ..Default::default()
        };

        // One snapshot of the limits is shared by every tab of this tick.
        let settings = store.get().await?;
        let limits = settings
            .time_limits
            .iter()
            .map(|v| (v.domain.as_str(), v))
            .collect::<HashMap<&str, &TimeLimit>>();

        for tab in tabs.active_tabs() {
            let Some(limit) = limits.get(tab.domain.as_str()) else {
                continue;
            };

            let stats = store.add_usage(&tab.domain, elapsed_minutes).await?;
            report.accumulated.push((tab.id, tab.domain.clone()));
            debug!(
                "{} at {:.2}/{} minutes today, {:.2}/{} this month",
                tab.domain,
                stats.time_spent_today,
                limit.minutes_per_day,
                stats.time_spent_this_month,
                limit.minutes_per_month
            );

            if limit.is_exceeded_by(&stats) {
                info!("Limit for {} reached, blocking tab {}", tab.domain, tab.id);
                let blocked_page = host.blocked_page_url();
                match host.redirect_tab(tab.id, &blocked_page) {
                    Ok(()) => report.redirected.push(tab.id),
                    Err(e) => error!("Failed to redirect tab {}: {e:?}", tab.id),
                }
            }
        }

        if report.accumulated.is_empty() && !tabs.active_tabs().is_empty() {
            debug!("No active tab has a limit");
        }
        if elapsed_minutes > 5. {
            warn!("Ticks were {elapsed_minutes:.1} minutes apart");
        }
        Ok(report)
    }
}
