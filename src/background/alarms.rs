//! Durable alarms driving the daily and monthly usage resets.
//!
//! Alarms live in their own file next to the settings. They survive restarts: an alarm that came
//! due while the host wasn't running fires once when it starts and moves to its next future slot.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    settings::store::{SettingsStore, SettingsStoreExt},
    utils::{
        clock::Clock,
        time::{next_day_start, next_month_start, wall_time_to_utc},
    },
};

pub const DAILY_RESET: &str = "dailyReset";
pub const MONTHLY_RESET: &str = "monthlyReset";

const DAILY_PERIOD_MINUTES: i64 = 24 * 60;
const MONTHLY_PERIOD_MINUTES: i64 = 30 * 24 * 60;

/// Longest single sleep. Monotonic time may stand still while the machine is suspended, so the
/// wall clock is looked at again at least this often.
const MAX_ALARM_SLEEP: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub scheduled_time: DateTime<Utc>,
    pub period_minutes: i64,
}

impl Alarm {
    pub fn new(name: impl Into<String>, scheduled_time: DateTime<Utc>, period_minutes: i64) -> Self {
        Self {
            name: name.into(),
            scheduled_time,
            period_minutes,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_time <= now
    }

    /// Moves the alarm to its first slot after `now`, skipping every missed one. Fails and leaves
    /// the alarm untouched when the next slot can't be represented, e.g. for an absurd period.
    pub fn advance_past(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.scheduled_time > now {
            return Ok(());
        }
        let period = TimeDelta::try_minutes(self.period_minutes.max(1))
            .with_context(|| format!("Period of {} is out of range", self.name))?
            .num_milliseconds();
        let missed = (now - self.scheduled_time).num_milliseconds() / period + 1;
        self.scheduled_time = missed
            .checked_mul(period)
            .and_then(TimeDelta::try_milliseconds)
            .and_then(|v| self.scheduled_time.checked_add_signed(v))
            .with_context(|| format!("Next slot of {} is out of range", self.name))?;
        Ok(())
    }
}

/// The two reset alarms as they are first installed: the daily one at the next local midnight and
/// the monthly one at the start of the next local month.
pub fn default_alarms<Tz: TimeZone>(tz: &Tz, now: DateTime<Utc>) -> [Alarm; 2] {
    let local_now = now.with_timezone(tz).naive_local();
    [
        Alarm::new(
            DAILY_RESET,
            wall_time_to_utc(tz, next_day_start(local_now)),
            DAILY_PERIOD_MINUTES,
        ),
        Alarm::new(
            MONTHLY_RESET,
            wall_time_to_utc(tz, next_month_start(local_now)),
            MONTHLY_PERIOD_MINUTES,
        ),
    ]
}

/// Alarms persisted in a json file. Only the host writes it.
pub struct AlarmRegistry {
    path: PathBuf,
}

impl AlarmRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Vec<Alarm>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => Err(e).with_context(|| format!("Failed to read alarms {:?}", self.path))?,
        };
        if contents.trim().is_empty() {
            return Ok(vec![]);
        }
        Ok(serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!("Stored alarms are malformed, dropping them: {e}");
            vec![]
        }))
    }

    async fn save(&self, alarms: &[Alarm]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(alarms)?).await?;
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Option<Alarm>> {
        Ok(self.load().await?.into_iter().find(|v| v.name == name))
    }

    /// Stores `alarm` unless one with the same name exists. Returns the stored alarm.
    pub async fn ensure(&self, alarm: Alarm) -> Result<Alarm> {
        let mut alarms = self.load().await?;
        if let Some(existing) = alarms.iter().find(|v| v.name == alarm.name) {
            debug!("Alarm {} already scheduled at {}", existing.name, existing.scheduled_time);
            return Ok(existing.clone());
        }
        info!("Scheduling alarm {} at {}", alarm.name, alarm.scheduled_time);
        alarms.push(alarm.clone());
        self.save(&alarms).await?;
        Ok(alarm)
    }

    /// Stores `alarm`, replacing one with the same name.
    pub async fn create(&self, alarm: Alarm) -> Result<()> {
        let mut alarms = self.load().await?;
        alarms.retain(|v| v.name != alarm.name);
        alarms.push(alarm);
        self.save(&alarms).await
    }

    /// Replaces the whole set of alarms.
    pub async fn replace_all(&self, alarms: &[Alarm]) -> Result<()> {
        self.save(alarms).await
    }
}

/// Fires reset alarms against the settings store.
pub struct ResetScheduler<S, Tz> {
    store: S,
    registry: AlarmRegistry,
    clock: Arc<dyn Clock>,
    timezone: Tz,
}

impl<S: SettingsStore, Tz: TimeZone> ResetScheduler<S, Tz> {
    pub fn new(store: S, registry: AlarmRegistry, clock: Arc<dyn Clock>, timezone: Tz) -> Self {
        Self {
            store,
            registry,
            clock,
            timezone,
        }
    }

    /// Installs the reset alarms that aren't stored yet.
    pub async fn install(&self) -> Result<()> {
        for alarm in default_alarms(&self.timezone, self.clock.time()) {
            self.registry.ensure(alarm).await?;
        }
        Ok(())
    }

    /// Schedules the reset alarms afresh from now, replacing the stored ones. Done when the
    /// extension is installed or updated.
    pub async fn reinstall(&self) -> Result<()> {
        for alarm in default_alarms(&self.timezone, self.clock.time()) {
            info!("Rescheduling alarm {} at {}", alarm.name, alarm.scheduled_time);
            self.registry.create(alarm).await?;
        }
        Ok(())
    }

    async fn fire(&self, name: &str) -> Result<()> {
        match name {
            DAILY_RESET => {
                info!("Resetting daily usage");
                self.store.reset_daily().await
            }
            MONTHLY_RESET => {
                info!("Resetting monthly usage");
                self.store.reset_monthly().await
            }
            other => {
                warn!("Ignoring unknown alarm {other}");
                Ok(())
            }
        }
    }

    /// Fires every due alarm once, reschedules them and returns the earliest upcoming deadline.
    pub async fn fire_due(&self) -> Result<Option<DateTime<Utc>>> {
        let now = self.clock.time();
        let mut alarms = self.registry.load().await?;
        let mut fired = false;
        for alarm in alarms.iter_mut().filter(|v| v.is_due(now)) {
            if let Err(e) = self.fire(&alarm.name).await {
                error!("Alarm {} failed: {e:?}", alarm.name);
            }
            if let Err(e) = alarm.advance_past(now) {
                warn!("Dropping alarm: {e:?}");
            }
            fired = true;
        }
        if !fired {
            return Ok(alarms.iter().map(|v| v.scheduled_time).min());
        }

        // Whatever is still due couldn't be rescheduled.
        let scheduled = alarms.len();
        alarms.retain(|v| !v.is_due(now));
        self.registry.replace_all(&alarms).await?;
        if alarms.len() < scheduled {
            self.install().await?;
            alarms = self.registry.load().await?;
        }
        Ok(alarms.iter().map(|v| v.scheduled_time).min())
    }

    /// Fires alarms as they come due. Every message on `installs` reschedules the alarms.
    pub async fn run(
        self,
        mut installs: mpsc::UnboundedReceiver<()>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        self.install().await?;
        loop {
            let next = self
                .fire_due()
                .await
                .inspect_err(|e| error!("Failed to process alarms {e:?}"))
                .ok()
                .flatten();
            let wait = match next {
                Some(next) => (next - self.clock.time())
                    .to_std()
                    .unwrap_or(Duration::ZERO),
                None => MAX_ALARM_SLEEP,
            }
            .min(MAX_ALARM_SLEEP);
            tokio::select! {
                _ = shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.clock.sleep(wait) => {}
                Some(()) = installs.recv() => {
                    if let Err(e) = self.reinstall().await {
                        error!("Failed to reschedule alarms {e:?}");
                    }
                }
            }
        }
    }
}
