//! In-memory view of the browser's tabs. Nothing here is persisted, the map is rebuilt from tab
//! events every time the host starts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, trace};
use url::Url;

pub type TabId = i64;

/// Latest known state of a tab.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: TabId,
    pub url: String,
    pub domain: String,
    pub active: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_active: DateTime<Utc>,
}

/// Tab lifecycle events reported by the browser.
#[derive(Debug, Clone, PartialEq)]
pub enum TabEvent {
    /// Navigation state changed. Only `complete` navigations are tracked.
    Updated {
        id: TabId,
        url: String,
        complete: bool,
        active: bool,
    },
    Activated { id: TabId },
    Removed { id: TabId },
}

/// How an activation affects the other tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ActivationPolicy {
    /// Activation only marks the activated tab. Tabs activated earlier stay active, so several
    /// tabs can accumulate time in the same tick.
    #[default]
    Sticky,
    /// Activation clears the flag on every other tab.
    Exclusive,
}

/// Hostname portion of `url`, if it has one.
pub fn resolve_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|url| url.host_str().map(String::from))
}

#[derive(Debug, Default)]
pub struct TabTracker {
    tabs: HashMap<TabId, TabInfo>,
    policy: ActivationPolicy,
}

impl TabTracker {
    pub fn new(policy: ActivationPolicy) -> Self {
        Self {
            tabs: HashMap::new(),
            policy,
        }
    }

    pub fn handle(&mut self, event: TabEvent, now: DateTime<Utc>) {
        trace!("Tab event {:?}", event);
        match event {
            TabEvent::Updated {
                id,
                url,
                complete,
                active,
            } => {
                if complete {
                    self.navigation_completed(id, url, active, now)
                }
            }
            TabEvent::Activated { id } => self.activated(id, now),
            TabEvent::Removed { id } => self.removed(id),
        }
    }

    fn navigation_completed(&mut self, id: TabId, url: String, active: bool, now: DateTime<Utc>) {
        let Some(domain) = resolve_domain(&url) else {
            debug!("Ignoring tab {id} without a hostname: {url}");
            return;
        };
        self.tabs.insert(
            id,
            TabInfo {
                id,
                url,
                domain,
                active,
                last_active: now,
            },
        );
        if active && self.policy == ActivationPolicy::Exclusive {
            self.deactivate_others(id);
        }
    }

    fn activated(&mut self, id: TabId, now: DateTime<Utc>) {
        let Some(tab) = self.tabs.get_mut(&id) else {
            return;
        };
        tab.active = true;
        tab.last_active = now;
        if self.policy == ActivationPolicy::Exclusive {
            self.deactivate_others(id);
        }
    }

    fn removed(&mut self, id: TabId) {
        self.tabs.remove(&id);
    }

    fn deactivate_others(&mut self, id: TabId) {
        for tab in self.tabs.values_mut().filter(|v| v.id != id) {
            tab.active = false;
        }
    }

    pub fn get(&self, id: TabId) -> Option<&TabInfo> {
        self.tabs.get(&id)
    }

    /// Tabs currently flagged active, ordered by id.
    pub fn active_tabs(&self) -> Vec<&TabInfo> {
        let mut tabs = self.tabs.values().filter(|v| v.active).collect::<Vec<_>>();
        tabs.sort_by_key(|v| v.id);
        tabs
    }

    /// The active tab that was activated or navigated most recently.
    pub fn active_tab(&self) -> Option<&TabInfo> {
        self.tabs
            .values()
            .filter(|v| v.active)
            .max_by_key(|v| (v.last_active, v.id))
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    use super::{resolve_domain, ActivationPolicy, TabEvent, TabTracker};

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn start() -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE)
    }

    fn navigated(id: i64, url: &str, active: bool) -> TabEvent {
        TabEvent::Updated {
            id,
            url: url.into(),
            complete: true,
            active,
        }
    }

    #[test]
    fn test_resolve_domain() {
        assert_eq!(
            resolve_domain("https://www.youtube.com/watch?v=1"),
            Some("www.youtube.com".into())
        );
        assert_eq!(
            resolve_domain("http://localhost:8080/"),
            Some("localhost".into())
        );
        assert_eq!(resolve_domain("about:blank"), None);
        assert_eq!(resolve_domain("not a url"), None);
    }

    #[test]
    fn test_only_complete_navigation_is_tracked() {
        let mut tracker = TabTracker::default();
        tracker.handle(
            TabEvent::Updated {
                id: 1,
                url: "https://x.com/".into(),
                complete: false,
                active: true,
            },
            start(),
        );
        assert!(tracker.is_empty());

        tracker.handle(navigated(1, "https://x.com/home", true), start());
        let tab = tracker.get(1).unwrap();
        assert_eq!(tab.domain, "x.com");
        assert!(tab.active);
        assert_eq!(tab.last_active, start());
    }

    #[test]
    fn test_navigation_replaces_entry() {
        let mut tracker = TabTracker::default();
        tracker.handle(navigated(1, "https://x.com/", true), start());
        tracker.handle(
            navigated(1, "https://y.com/", false),
            start() + Duration::minutes(1),
        );
        assert_eq!(tracker.len(), 1);
        let tab = tracker.get(1).unwrap();
        assert_eq!(tab.domain, "y.com");
        assert!(!tab.active);
    }

    #[test]
    fn test_activation_of_unknown_tab_is_ignored() {
        let mut tracker = TabTracker::default();
        tracker.handle(TabEvent::Activated { id: 5 }, start());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_removal() {
        let mut tracker = TabTracker::default();
        tracker.handle(navigated(1, "https://x.com/", true), start());
        tracker.handle(TabEvent::Removed { id: 1 }, start());
        tracker.handle(TabEvent::Removed { id: 2 }, start());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_sticky_activation_keeps_previous_tabs_active() {
        let mut tracker = TabTracker::new(ActivationPolicy::Sticky);
        tracker.handle(navigated(1, "https://x.com/", false), start());
        tracker.handle(navigated(2, "https://y.com/", false), start());

        tracker.handle(TabEvent::Activated { id: 1 }, start());
        tracker.handle(
            TabEvent::Activated { id: 2 },
            start() + Duration::seconds(5),
        );

        let active = tracker
            .active_tabs()
            .iter()
            .map(|v| v.id)
            .collect::<Vec<_>>();
        assert_eq!(active, vec![1, 2]);
        assert_eq!(tracker.active_tab().map(|v| v.id), Some(2));
    }

    #[test]
    fn test_exclusive_activation_deactivates_siblings() {
        let mut tracker = TabTracker::new(ActivationPolicy::Exclusive);
        tracker.handle(navigated(1, "https://x.com/", true), start());
        tracker.handle(navigated(2, "https://y.com/", true), start());
        assert_eq!(tracker.active_tabs().len(), 1);

        tracker.handle(TabEvent::Activated { id: 1 }, start());
        let active = tracker
            .active_tabs()
            .iter()
            .map(|v| v.id)
            .collect::<Vec<_>>();
        assert_eq!(active, vec![1]);
    }
}
