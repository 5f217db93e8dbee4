use std::{future::Future, ops::Deref, sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::utils::{clock::Clock, schedule::Schedule};

use super::entities::{BedtimePatch, BedtimeSettings, ExtensionSettings, TimeLimit, UsageStats};

/// Interface for abstracting persistence of [ExtensionSettings].
pub trait SettingsStore {
    /// Returns the stored record, or the default record if nothing usable is stored.
    fn get(&self) -> impl Future<Output = Result<ExtensionSettings>>;

    /// Overwrites the stored record.
    fn set(&self, settings: ExtensionSettings) -> impl Future<Output = Result<()>>;

    /// Read-modify-write of the whole record. Implementations must not let another writer of the
    /// same store interleave between the read and the write.
    fn update<T, F>(&self, change: F) -> impl Future<Output = Result<T>>
    where
        F: FnOnce(&mut ExtensionSettings) -> T;

    /// Receiver that is notified after every successful write through this store, and after
    /// [SettingsStore::refresh] finds a change made elsewhere.
    fn subscribe(&self) -> watch::Receiver<u64>;

    /// Notifies subscribers if the record was changed outside this store, e.g. by another
    /// process. Stores that only change through themselves have nothing to do.
    fn refresh(&self) -> impl Future<Output = Result<()>> {
        async { Ok(()) }
    }
}

impl<T: Deref> SettingsStore for T
where
    T::Target: SettingsStore,
{
    fn get(&self) -> impl Future<Output = Result<ExtensionSettings>> {
        self.deref().get()
    }

    fn set(&self, settings: ExtensionSettings) -> impl Future<Output = Result<()>> {
        self.deref().set(settings)
    }

    fn update<R, F>(&self, change: F) -> impl Future<Output = Result<R>>
    where
        F: FnOnce(&mut ExtensionSettings) -> R,
    {
        self.deref().update(change)
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.deref().subscribe()
    }

    fn refresh(&self) -> impl Future<Output = Result<()>> {
        self.deref().refresh()
    }
}

/// Calls [SettingsStore::refresh] every `interval` until `shutdown` is cancelled.
pub async fn watch_external_changes(
    store: &impl SettingsStore,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut schedule = Schedule::every(clock, interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Stopped watching settings");
                return Ok(())
            }
            _ = schedule.wait() => {
                if let Err(e) = store.refresh().await {
                    warn!("Failed to look for settings changes {e:?}");
                }
            }
        }
    }
}

/// Typed operations used by the background process and the cli. Each one is a single
/// [SettingsStore::update] or [SettingsStore::get].
pub trait SettingsStoreExt: SettingsStore {
    fn time_limits(&self) -> impl Future<Output = Result<Vec<TimeLimit>>> {
        async move { Ok(self.get().await?.time_limits) }
    }

    fn upsert_time_limit(&self, time_limit: TimeLimit) -> impl Future<Output = Result<()>> {
        self.update(move |settings| settings.upsert_time_limit(time_limit))
    }

    fn remove_time_limit(&self, domain: &str) -> impl Future<Output = Result<bool>> {
        self.update(move |settings| settings.remove_time_limit(domain))
    }

    fn bedtime(&self) -> impl Future<Output = Result<BedtimeSettings>> {
        async move { Ok(self.get().await?.bedtime) }
    }

    /// Merges `patch` onto the stored bedtime and returns the result.
    fn set_bedtime(&self, patch: BedtimePatch) -> impl Future<Output = Result<BedtimeSettings>> {
        self.update(move |settings| {
            patch.apply_to(&mut settings.bedtime);
            settings.bedtime.clone()
        })
    }

    fn toggle_bedtime(&self) -> impl Future<Output = Result<BedtimeSettings>> {
        self.update(|settings| {
            settings.bedtime.enabled = !settings.bedtime.enabled;
            settings.bedtime.clone()
        })
    }

    fn usage_stats(&self) -> impl Future<Output = Result<Vec<UsageStats>>> {
        async move {
            let mut stats = self
                .get()
                .await?
                .usage_stats
                .into_values()
                .collect::<Vec<_>>();
            stats.sort_by(|a, b| a.domain.cmp(&b.domain));
            Ok(stats)
        }
    }

    /// Adds `minutes` to both counters of `domain` and returns the updated counters.
    fn add_usage(&self, domain: &str, minutes: f64) -> impl Future<Output = Result<UsageStats>> {
        self.update(move |settings| settings.add_usage(domain, minutes).clone())
    }

    fn reset_daily(&self) -> impl Future<Output = Result<()>> {
        self.update(ExtensionSettings::reset_daily)
    }

    fn reset_monthly(&self) -> impl Future<Output = Result<()>> {
        self.update(ExtensionSettings::reset_monthly)
    }
}

impl<S: SettingsStore> SettingsStoreExt for S {}
