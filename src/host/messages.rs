use serde::{Deserialize, Serialize};

use crate::tabs::{TabEvent, TabId, TabInfo};

/// Messages the extension forwards to the host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InboundMessage {
    TabUpdated {
        tab_id: TabId,
        url: String,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        active: bool,
    },
    TabActivated {
        tab_id: TabId,
    },
    TabRemoved {
        tab_id: TabId,
    },
    /// Asks for the tracked state of `tab_id`, or of the most recently active tab without one.
    GetActiveTabInfo {
        #[serde(default)]
        tab_id: Option<TabId>,
    },
    /// The extension was installed or updated.
    Installed,
}

impl InboundMessage {
    /// Returns the tab event carried by this message, if any.
    pub fn into_tab_event(self) -> Option<TabEvent> {
        match self {
            InboundMessage::TabUpdated {
                tab_id,
                url,
                status,
                active,
            } => Some(TabEvent::Updated {
                id: tab_id,
                url,
                complete: status.as_deref() == Some("complete"),
                active,
            }),
            InboundMessage::TabActivated { tab_id } => Some(TabEvent::Activated { id: tab_id }),
            InboundMessage::TabRemoved { tab_id } => Some(TabEvent::Removed { id: tab_id }),
            InboundMessage::GetActiveTabInfo { .. } | InboundMessage::Installed => None,
        }
    }
}

/// Messages the host sends to the extension.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    Redirect {
        tab_id: TabId,
        url: String,
    },
    /// Adds the style to every page, or only to the page of `tab_id`.
    InjectStyle {
        #[serde(skip_serializing_if = "Option::is_none")]
        tab_id: Option<TabId>,
        id: String,
        css: String,
    },
    RemoveStyle {
        id: String,
    },
    ActiveTabInfo {
        tab_id: Option<TabId>,
        tab: Option<TabInfo>,
    },
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use serde_json::json;

    use crate::tabs::TabEvent;

    use super::{InboundMessage, OutboundMessage};

    #[test]
    fn test_parse_tab_updated() -> Result<()> {
        let message: InboundMessage = serde_json::from_value(json!({
            "type": "tabUpdated",
            "tabId": 12,
            "url": "https://x.com/",
            "status": "complete",
            "active": true,
        }))?;
        assert_eq!(
            message.into_tab_event(),
            Some(TabEvent::Updated {
                id: 12,
                url: "https://x.com/".into(),
                complete: true,
                active: true,
            })
        );
        Ok(())
    }

    #[test]
    fn test_loading_status_is_not_complete() -> Result<()> {
        let message: InboundMessage = serde_json::from_value(json!({
            "type": "tabUpdated",
            "tabId": 12,
            "url": "https://x.com/",
            "status": "loading",
        }))?;
        assert!(matches!(
            message.into_tab_event(),
            Some(TabEvent::Updated {
                complete: false,
                active: false,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn test_parse_simple_messages() -> Result<()> {
        let query: InboundMessage =
            serde_json::from_value(json!({"type": "getActiveTabInfo", "tabId": 9}))?;
        assert_eq!(query, InboundMessage::GetActiveTabInfo { tab_id: Some(9) });
        assert_eq!(query.into_tab_event(), None);

        let query: InboundMessage = serde_json::from_value(json!({"type": "getActiveTabInfo"}))?;
        assert_eq!(query, InboundMessage::GetActiveTabInfo { tab_id: None });

        let installed: InboundMessage = serde_json::from_value(json!({"type": "installed"}))?;
        assert_eq!(installed, InboundMessage::Installed);
        assert_eq!(installed.into_tab_event(), None);

        let removed: InboundMessage =
            serde_json::from_value(json!({"type": "tabRemoved", "tabId": 3}))?;
        assert_eq!(removed.into_tab_event(), Some(TabEvent::Removed { id: 3 }));
        Ok(())
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serde_json::from_value::<InboundMessage>(json!({"type": "bogus"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_style_target() -> Result<()> {
        let everywhere = serde_json::to_value(OutboundMessage::InjectStyle {
            tab_id: None,
            id: "s".into(),
            css: "html {}".into(),
        })?;
        assert_eq!(
            everywhere,
            json!({"type": "injectStyle", "id": "s", "css": "html {}"})
        );

        let one_tab = serde_json::to_value(OutboundMessage::InjectStyle {
            tab_id: Some(4),
            id: "s".into(),
            css: "html {}".into(),
        })?;
        assert_eq!(one_tab["tabId"], 4);
        Ok(())
    }

    #[test]
    fn test_serialize_redirect() -> Result<()> {
        let value = serde_json::to_value(OutboundMessage::Redirect {
            tab_id: 4,
            url: "chrome-extension://abc/pages/blocked.html".into(),
        })?;
        assert_eq!(
            value,
            json!({
                "type": "redirect",
                "tabId": 4,
                "url": "chrome-extension://abc/pages/blocked.html",
            })
        );
        Ok(())
    }
}
