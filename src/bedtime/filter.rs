use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    host::PageStyle,
    settings::store::{SettingsStore, SettingsStoreExt},
    tabs::TabId,
    utils::{clock::Clock, schedule::Schedule},
};

use super::is_bedtime_active;

pub const GRAYSCALE_STYLE_ID: &str = "prodi-grayscale-style";

pub const GRAYSCALE_CSS: &str = "html {
  filter: grayscale(100%) !important;
  -webkit-filter: grayscale(100%) !important;
}
";

/// Tracks whether the grayscale style is present on pages. Applying an applied style, or
/// removing a removed one, does nothing. The state is unknown until the first call, so the first
/// call always reaches the page.
pub struct GrayscaleStyle<P> {
    page: P,
    applied: Option<bool>,
}

impl<P: PageStyle> GrayscaleStyle<P> {
    pub fn new(page: P) -> Self {
        Self {
            page,
            applied: None,
        }
    }

    pub fn is_applied(&self) -> bool {
        self.applied.unwrap_or(false)
    }

    pub fn set(&mut self, active: bool) -> Result<()> {
        if self.applied == Some(active) {
            return Ok(());
        }
        if active {
            self.page.inject(GRAYSCALE_STYLE_ID, GRAYSCALE_CSS)?;
        } else {
            self.page.remove(GRAYSCALE_STYLE_ID)?;
        }
        self.applied = Some(active);
        Ok(())
    }

    pub fn apply(&mut self) -> Result<()> {
        self.set(true)
    }

    pub fn remove(&mut self) -> Result<()> {
        self.set(false)
    }

    /// Repeats an applied style for a page that just loaded in `tab`. A fresh page has no style,
    /// so nothing is sent while the style is off.
    pub fn page_loaded(&mut self, tab: TabId) -> Result<()> {
        if self.applied == Some(true) {
            self.page.inject_into(tab, GRAYSCALE_STYLE_ID, GRAYSCALE_CSS)?;
        }
        Ok(())
    }
}

/// Keeps the grayscale style in sync with the bedtime window.
pub struct BedtimeFilter<S, P> {
    store: S,
    style: GrayscaleStyle<P>,
    clock: Arc<dyn Clock>,
    check_interval: Duration,
}

impl<S: SettingsStore, P: PageStyle> BedtimeFilter<S, P> {
    pub fn new(store: S, page: P, clock: Arc<dyn Clock>, check_interval: Duration) -> Self {
        Self {
            store,
            style: GrayscaleStyle::new(page),
            clock,
            check_interval,
        }
    }

    async fn evaluate(&self) -> Result<bool> {
        let bedtime = self.store.bedtime().await?;
        is_bedtime_active(self.clock.local_time().time(), &bedtime)
    }

    /// Evaluates the window and updates the style. Any failure turns the effect off.
    pub async fn check(&mut self) {
        let active = self.evaluate().await.unwrap_or_else(|e| {
            error!("Error checking bedtime mode: {e:?}");
            false
        });
        let was_applied = self.style.is_applied();
        match self.style.set(active) {
            Ok(()) if was_applied != active => info!("Bedtime grayscale turned {}", on_off(active)),
            Ok(()) => debug!("Bedtime grayscale stays {}", on_off(active)),
            Err(e) => error!("Failed to update bedtime grayscale: {e:?}"),
        }
    }

    /// Re-evaluates the window for a page that finished loading in `tab`. A transition reaches
    /// every page, the new one included; otherwise an applied style is sent to that page alone.
    pub async fn page_loaded(&mut self, tab: TabId) {
        let was_applied = self.style.is_applied();
        self.check().await;
        if !(was_applied && self.style.is_applied()) {
            return;
        }
        if let Err(e) = self.style.page_loaded(tab) {
            error!("Failed to style page of tab {tab}: {e:?}");
        }
    }

    /// Checks once immediately, then on every settings change, every loaded page and every
    /// `check_interval`.
    pub async fn run(
        mut self,
        mut page_loads: mpsc::UnboundedReceiver<TabId>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut changes = self.store.subscribe();
        let mut schedule = Schedule::every(self.clock.clone(), self.check_interval);
        self.check().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    return Ok(())
                }
                Ok(()) = changes.changed() => {
                    self.check().await
                }
                Some(tab) = page_loads.recv() => {
                    self.page_loaded(tab).await
                }
                _ = schedule.wait() => {
                    self.check().await
                }
            }
        }
    }
}

fn on_off(active: bool) -> &'static str {
    if active {
        "on"
    } else {
        "off"
    }
}
