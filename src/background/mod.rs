use std::{path::PathBuf, sync::Arc, time::Duration};

use alarms::{AlarmRegistry, ResetScheduler};
use anyhow::Result;
use chrono::{Local, TimeZone};
use service::HostService;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    bedtime::filter::BedtimeFilter,
    host::native::{read_messages, write_messages, NativeHost},
    settings::{
        file_store::FileSettingsStore,
        store::{watch_external_changes, SettingsStore},
    },
    tabs::{ActivationPolicy, TabTracker},
    utils::{
        clock::{Clock, DefaultClock},
        dir::{alarms_path, settings_path},
    },
};

pub mod accumulator;
pub mod alarms;
pub mod args;
pub mod service;
pub mod shutdown;

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_BEDTIME_CHECK_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_SETTINGS_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct HostOptions {
    pub origin: String,
    pub policy: ActivationPolicy,
    pub tick_interval: Duration,
    pub bedtime_check_interval: Duration,
    /// How often the storage file is checked for changes made by the cli.
    pub settings_poll_interval: Duration,
}

impl HostOptions {
    pub fn new(origin: String, policy: ActivationPolicy) -> Self {
        Self {
            origin,
            policy,
            tick_interval: DEFAULT_TICK_INTERVAL,
            bedtime_check_interval: DEFAULT_BEDTIME_CHECK_INTERVAL,
            settings_poll_interval: DEFAULT_SETTINGS_POLL_INTERVAL,
        }
    }
}

/// Represents the starting point for the host. Talks to the browser over stdin/stdout until the
/// browser closes the channel.
pub async fn start_host(app_dir: PathBuf, options: HostOptions) -> Result<()> {
    let store = FileSettingsStore::new(settings_path(&app_dir))?;
    let registry = AlarmRegistry::new(alarms_path(&app_dir));
    let shutdown_token = CancellationToken::new();

    info!("Serving {}", options.origin);
    let (_, result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        serve(
            tokio::io::stdin(),
            tokio::io::stdout(),
            &store,
            registry,
            Arc::new(DefaultClock),
            Local,
            options,
            shutdown_token.clone(),
        ),
    );
    result
}

/// Runs every background task against the given channel. Returns once all of them stopped.
#[allow(clippy::too_many_arguments)]
async fn serve<S: SettingsStore, Tz: TimeZone>(
    reader: impl AsyncRead + Unpin,
    writer: impl AsyncWrite + Unpin,
    store: &S,
    registry: AlarmRegistry,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    options: HostOptions,
    shutdown_token: CancellationToken,
) -> Result<()> {
    let (sender, receiver) = mpsc::unbounded_channel();
    let (page_loads, loads) = mpsc::unbounded_channel();
    let (installs, installed) = mpsc::unbounded_channel();
    let host = NativeHost::new(&options.origin, sender);

    let service = HostService::new(
        TabTracker::new(options.policy),
        host.clone(),
        clock.clone(),
        options.tick_interval,
    )
    .with_page_loads(page_loads)
    .with_installs(installs);
    let filter = BedtimeFilter::new(
        store,
        host,
        clock.clone(),
        options.bedtime_check_interval,
    );
    let scheduler = ResetScheduler::new(store, registry, clock.clone(), timezone);

    let (service_result, writer_result, filter_result, alarm_result, watch_result) = tokio::join!(
        service.run(read_messages(reader), store, shutdown_token.clone()),
        async {
            // Writer stops once every host handle is dropped, i.e. after the other tasks.
            let result = write_messages(writer, receiver).await;
            shutdown_token.cancel();
            result
        },
        filter.run(loads, shutdown_token.clone()),
        scheduler.run(installed, shutdown_token.clone()),
        watch_external_changes(
            store,
            clock,
            options.settings_poll_interval,
            shutdown_token.clone()
        ),
    );

    if let Err(e) = &service_result {
        error!("Service got an error {e:?}");
    }
    if let Err(e) = &writer_result {
        error!("Writer got an error {e:?}");
    }
    if let Err(e) = &filter_result {
        error!("Bedtime filter got an error {e:?}");
    }
    if let Err(e) = &alarm_result {
        error!("Reset scheduler got an error {e:?}");
    }
    if let Err(e) = &watch_result {
        error!("Settings watch got an error {e:?}");
    }

    service_result
        .and(writer_result)
        .and(filter_result)
        .and(alarm_result)
        .and(watch_result)
}

#[cfg(test)]
mod host_tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::Result;
    use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
    use serde_json::{json, Value};
    use tempfile::tempdir;
    use tokio::{
        io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream},
        time::timeout,
    };
    use tokio_util::sync::CancellationToken;

    use crate::{
        bedtime::filter::GRAYSCALE_STYLE_ID,
        settings::{
            entities::{BedtimePatch, TimeLimit},
            file_store::FileSettingsStore,
            store::SettingsStoreExt,
        },
        tabs::ActivationPolicy,
        utils::{clock::TestClock, logging::TEST_LOGGING},
    };

    use super::{alarms::AlarmRegistry, serve, HostOptions};

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        let date = NaiveDate::from_ymd_opt(2018, 7, day).unwrap();
        Utc.from_utc_datetime(&date.and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap()))
    }

    async fn send(browser: &mut DuplexStream, value: Value) -> Result<()> {
        let body = serde_json::to_vec(&value)?;
        browser
            .write_all(&(body.len() as u32).to_ne_bytes())
            .await?;
        browser.write_all(&body).await?;
        Ok(())
    }

    async fn receive(browser: &mut DuplexStream) -> Result<Value> {
        let mut length = [0u8; 4];
        browser.read_exact(&mut length).await?;
        let mut body = vec![0u8; u32::from_ne_bytes(length) as usize];
        browser.read_exact(&mut body).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Drives a whole session over an in-memory channel: a limited site gets blocked, the bedtime
    /// window turns on and the daily reset fires at midnight.
    #[tokio::test(start_paused = true)]
    async fn smoke_test_host() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let store = FileSettingsStore::new(dir.path().join("storage.json"))?;
        store
            .upsert_time_limit(TimeLimit::new("x.com", 2., 300.))
            .await?;
        store
            .set_bedtime(BedtimePatch {
                enabled: Some(true),
                start_time: Some("23:55".into()),
                end_time: Some("06:00".into()),
            })
            .await?;

        let (mut browser, host_side) = duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(host_side);
        let clock = Arc::new(TestClock::starting_at(at(4, 23, 50)));
        let shutdown = CancellationToken::new();

        let (result, checks) = tokio::join!(
            serve(
                reader,
                writer,
                &store,
                AlarmRegistry::new(dir.path().join("alarms.json")),
                clock,
                Utc,
                HostOptions::new(
                    "chrome-extension://abc/".into(),
                    ActivationPolicy::Sticky
                ),
                shutdown.clone(),
            ),
            async {
                // Outside the window on start.
                assert_eq!(
                    receive(&mut browser).await?,
                    json!({"type": "removeStyle", "id": GRAYSCALE_STYLE_ID})
                );

                send(
                    &mut browser,
                    json!({
                        "type": "tabUpdated",
                        "tabId": 5,
                        "url": "https://x.com/home",
                        "status": "complete",
                        "active": true,
                    }),
                )
                .await?;
                send(&mut browser, json!({"type": "getActiveTabInfo", "tabId": 5})).await?;
                let info = receive(&mut browser).await?;
                assert_eq!(info["type"], "activeTabInfo");
                assert_eq!(info["tab"]["domain"], "x.com");

                // Second tick crosses the 2 minute limit.
                assert_eq!(
                    receive(&mut browser).await?,
                    json!({
                        "type": "redirect",
                        "tabId": 5,
                        "url": "chrome-extension://abc/pages/blocked.html",
                    })
                );

                // The extension follows the redirect, the blocked page has no limit.
                send(
                    &mut browser,
                    json!({
                        "type": "tabUpdated",
                        "tabId": 5,
                        "url": "chrome-extension://abc/pages/blocked.html",
                        "status": "complete",
                        "active": true,
                    }),
                )
                .await?;

                // 23:55
                let style = receive(&mut browser).await?;
                assert_eq!(style["type"], "injectStyle");
                assert_eq!(style["id"], GRAYSCALE_STYLE_ID);

                tokio::time::sleep(Duration::from_secs(11 * 60)).await;
                drop(browser);
                anyhow::Ok(())
            }
        );
        result?;
        checks?;

        // Past midnight the daily counter was reset, the monthly one kept.
        let stats = store.usage_stats().await?;
        assert_eq!(stats[0].domain, "x.com");
        assert_eq!(stats[0].time_spent_today, 0.);
        assert_eq!(stats[0].time_spent_this_month, 2.);
        assert!(shutdown.is_cancelled());
        Ok(())
    }

    fn options() -> HostOptions {
        HostOptions::new("chrome-extension://abc/".into(), ActivationPolicy::Sticky)
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_loaded_during_bedtime_turns_gray() -> Result<()> {
        let dir = tempdir()?;
        let store = FileSettingsStore::new(dir.path().join("storage.json"))?;
        store
            .set_bedtime(BedtimePatch {
                enabled: Some(true),
                start_time: Some("23:00".into()),
                end_time: Some("06:00".into()),
            })
            .await?;

        let (mut browser, host_side) = duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(host_side);
        let clock = Arc::new(TestClock::starting_at(at(4, 23, 30)));

        let (result, checks) = tokio::join!(
            serve(
                reader,
                writer,
                &store,
                AlarmRegistry::new(dir.path().join("alarms.json")),
                clock,
                Utc,
                options(),
                CancellationToken::new(),
            ),
            async {
                let style = receive(&mut browser).await?;
                assert_eq!(style["type"], "injectStyle");
                assert!(style.get("tabId").is_none());

                send(
                    &mut browser,
                    json!({
                        "type": "tabUpdated",
                        "tabId": 9,
                        "url": "https://news.example.org/",
                        "status": "complete",
                        "active": true,
                    }),
                )
                .await?;
                let style = timeout(Duration::from_secs(30), receive(&mut browser)).await??;
                assert_eq!(style["type"], "injectStyle");
                assert_eq!(style["tabId"], 9);
                assert_eq!(style["id"], GRAYSCALE_STYLE_ID);

                drop(browser);
                anyhow::Ok(())
            }
        );
        result?;
        checks
    }

    #[tokio::test(start_paused = true)]
    async fn test_bedtime_changed_by_another_process() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("storage.json");
        let store = FileSettingsStore::new(path.clone())?;
        let cli_store = FileSettingsStore::new(path)?;

        let (mut browser, host_side) = duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(host_side);
        let clock = Arc::new(TestClock::starting_at(at(4, 23, 30)));

        let (result, checks) = tokio::join!(
            serve(
                reader,
                writer,
                &store,
                AlarmRegistry::new(dir.path().join("alarms.json")),
                clock,
                Utc,
                options(),
                CancellationToken::new(),
            ),
            async {
                // Bedtime is disabled by default.
                assert_eq!(
                    receive(&mut browser).await?,
                    json!({"type": "removeStyle", "id": GRAYSCALE_STYLE_ID})
                );

                cli_store
                    .set_bedtime(BedtimePatch {
                        enabled: Some(true),
                        ..Default::default()
                    })
                    .await?;
                let style = timeout(Duration::from_secs(5), receive(&mut browser)).await??;
                assert_eq!(style["type"], "injectStyle");

                drop(browser);
                anyhow::Ok(())
            }
        );
        result?;
        checks
    }
}
