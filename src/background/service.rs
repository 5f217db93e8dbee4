use std::{pin::pin, sync::Arc, time::Duration};

use anyhow::Result;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    host::{
        messages::{InboundMessage, OutboundMessage},
        native::NativeHost,
    },
    settings::store::SettingsStore,
    tabs::{TabEvent, TabId, TabTracker},
    utils::{clock::Clock, schedule::Schedule},
};

use super::accumulator::UsageAccumulator;

/// Owns the tab map. Applies browser messages to it and runs the usage tick, both from a single
/// loop, so the tracker never needs to be shared.
pub struct HostService {
    tabs: TabTracker,
    accumulator: UsageAccumulator,
    host: NativeHost,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    page_loads: Option<mpsc::UnboundedSender<TabId>>,
    installs: Option<mpsc::UnboundedSender<()>>,
}

impl HostService {
    pub fn new(
        tabs: TabTracker,
        host: NativeHost,
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            tabs,
            accumulator: UsageAccumulator::new(clock.time()),
            host,
            clock,
            tick_interval,
            page_loads: None,
            installs: None,
        }
    }

    /// Reports the tab of every completed navigation to `page_loads`.
    pub fn with_page_loads(mut self, page_loads: mpsc::UnboundedSender<TabId>) -> Self {
        self.page_loads = Some(page_loads);
        self
    }

    /// Reports install and update notifications of the extension to `installs`.
    pub fn with_installs(mut self, installs: mpsc::UnboundedSender<()>) -> Self {
        self.installs = Some(installs);
        self
    }

    pub fn tabs(&self) -> &TabTracker {
        &self.tabs
    }

    pub fn handle_message(&mut self, message: InboundMessage) -> Result<()> {
        match message {
            InboundMessage::GetActiveTabInfo { tab_id } => {
                let tab = match tab_id {
                    Some(tab_id) => self.tabs.get(tab_id),
                    None => self.tabs.active_tab(),
                };
                self.host.send(OutboundMessage::ActiveTabInfo {
                    tab_id,
                    tab: tab.cloned(),
                })
            }
            InboundMessage::Installed => {
                info!("Extension was installed or updated");
                if let Some(installs) = &self.installs {
                    installs.send(())?;
                }
                Ok(())
            }
            message => {
                let Some(event) = message.into_tab_event() else {
                    return Ok(());
                };
                let loaded = match &event {
                    TabEvent::Updated {
                        id, complete: true, ..
                    } => Some(*id),
                    _ => None,
                };
                self.tabs.handle(event, self.clock.time());
                if let (Some(tab), Some(page_loads)) = (loaded, &self.page_loads) {
                    page_loads.send(tab)?;
                }
                Ok(())
            }
        }
    }

    async fn tick(&mut self, store: &impl SettingsStore) {
        let now = self.clock.time();
        if let Err(e) = self
            .accumulator
            .tick(now, &self.tabs, store, &mut self.host)
            .await
        {
            error!("Usage tick failed {e:?}");
        }
    }

    /// Runs until `messages` ends or `shutdown` is cancelled. The end of the message stream means
    /// the browser closed the port, which cancels `shutdown` for the other tasks.
    pub async fn run(
        mut self,
        messages: impl Stream<Item = Result<InboundMessage>>,
        store: &impl SettingsStore,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut messages = pin!(messages);
        let mut schedule = Schedule::every(self.clock.clone(), self.tick_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Service stopped");
                    return Ok(())
                }
                message = messages.next() => {
                    match message {
                        Some(Ok(message)) => {
                            if let Err(e) = self.handle_message(message) {
                                error!("Failed to handle message {e:?}");
                            }
                        }
                        Some(Err(e)) => {
                            shutdown.cancel();
                            return Err(e.context("Browser channel failed"));
                        }
                        None => {
                            info!("Browser closed the channel");
                            shutdown.cancel();
                            return Ok(());
                        }
                    }
                }
                _ = schedule.wait() => {
                    self.tick(store).await
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::Result;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use futures::{stream, StreamExt};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        host::{
            messages::{InboundMessage, OutboundMessage},
            native::NativeHost,
        },
        settings::{
            entities::TimeLimit, memory_store::MemorySettingsStore, store::SettingsStoreExt,
        },
        tabs::{ActivationPolicy, TabTracker},
        utils::clock::TestClock,
    };

    use super::HostService;

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn service() -> (HostService, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let clock = Arc::new(TestClock::starting_at(Utc.from_utc_datetime(&TEST_START_DATE)));
        let service = HostService::new(
            TabTracker::new(ActivationPolicy::Sticky),
            NativeHost::new("chrome-extension://abc/", sender),
            clock,
            Duration::from_secs(60),
        );
        (service, receiver)
    }

    fn opened(tab_id: i64, url: &str) -> InboundMessage {
        InboundMessage::TabUpdated {
            tab_id,
            url: url.into(),
            status: Some("complete".into()),
            active: true,
        }
    }

    #[test]
    fn test_active_tab_info_reply() -> Result<()> {
        let (mut service, mut receiver) = service();
        service.handle_message(opened(1, "https://x.com/feed"))?;
        service.handle_message(InboundMessage::GetActiveTabInfo { tab_id: Some(1) })?;
        service.handle_message(InboundMessage::GetActiveTabInfo { tab_id: Some(2) })?;

        match receiver.try_recv()? {
            OutboundMessage::ActiveTabInfo { tab_id, tab } => {
                assert_eq!(tab_id, Some(1));
                assert_eq!(tab.map(|v| v.domain), Some("x.com".to_string()));
            }
            other => panic!("Unexpected message {other:?}"),
        }
        assert_eq!(
            receiver.try_recv()?,
            OutboundMessage::ActiveTabInfo {
                tab_id: Some(2),
                tab: None
            }
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_without_tab_returns_latest_active() -> Result<()> {
        let (mut service, mut receiver) = service();
        service.handle_message(InboundMessage::GetActiveTabInfo { tab_id: None })?;
        service.handle_message(opened(1, "https://x.com/"))?;
        tokio::time::advance(Duration::from_secs(5)).await;
        service.handle_message(opened(2, "https://y.com/"))?;
        service.handle_message(InboundMessage::GetActiveTabInfo { tab_id: None })?;

        assert_eq!(
            receiver.try_recv()?,
            OutboundMessage::ActiveTabInfo {
                tab_id: None,
                tab: None
            }
        );
        match receiver.try_recv()? {
            OutboundMessage::ActiveTabInfo { tab_id: None, tab } => {
                assert_eq!(tab.map(|v| v.id), Some(2));
            }
            other => panic!("Unexpected message {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_completed_navigations_are_reported() -> Result<()> {
        let (service, _receiver) = service();
        let (page_loads, mut loads) = mpsc::unbounded_channel();
        let (installs, mut installed) = mpsc::unbounded_channel();
        let mut service = service.with_page_loads(page_loads).with_installs(installs);

        service.handle_message(InboundMessage::TabUpdated {
            tab_id: 3,
            url: "https://x.com/".into(),
            status: Some("loading".into()),
            active: true,
        })?;
        service.handle_message(opened(4, "https://x.com/"))?;
        service.handle_message(InboundMessage::TabActivated { tab_id: 4 })?;
        service.handle_message(InboundMessage::Installed)?;

        assert_eq!(loads.try_recv()?, 4);
        assert!(loads.try_recv().is_err());
        assert!(installed.try_recv().is_ok());
        Ok(())
    }

    #[test]
    fn test_removed_tab_is_forgotten() -> Result<()> {
        let (mut service, _receiver) = service();
        service.handle_message(opened(1, "https://x.com/"))?;
        service.handle_message(InboundMessage::TabRemoved { tab_id: 1 })?;
        assert!(service.tabs().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_of_messages_cancels_shutdown() -> Result<()> {
        let (service, _receiver) = service();
        let store = MemorySettingsStore::default();
        let shutdown = CancellationToken::new();
        let messages = stream::iter(vec![Ok(opened(1, "https://x.com/"))]);
        service.run(messages, &store, shutdown.clone()).await?;
        assert!(shutdown.is_cancelled());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_redirect_over_limit_tab() -> Result<()> {
        let (service, mut receiver) = service();
        let store = MemorySettingsStore::default();
        store
            .upsert_time_limit(TimeLimit::new("x.com", 2., 300.))
            .await?;
        let shutdown = CancellationToken::new();
        let messages =
            stream::iter(vec![Ok(opened(1, "https://x.com/"))]).chain(stream::pending());

        let (result, ()) = tokio::join!(service.run(messages, &store, shutdown.clone()), async {
            tokio::time::sleep(Duration::from_secs(61)).await;
            assert!(receiver.try_recv().is_err());
            tokio::time::sleep(Duration::from_secs(60)).await;
            shutdown.cancel();
        });
        result?;

        assert_eq!(
            receiver.try_recv()?,
            OutboundMessage::Redirect {
                tab_id: 1,
                url: "chrome-extension://abc/pages/blocked.html".into()
            }
        );
        assert_eq!(
            store.usage_stats().await?[0].time_spent_today,
            2.
        );
        Ok(())
    }
}
