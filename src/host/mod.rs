//! Contains the boundary to the browser. The background logic only talks to the browser through
//! [BrowserHost] and [PageStyle]; [native::NativeHost] is the realization that speaks the native
//! messaging protocol over stdin/stdout.

pub mod messages;
pub mod native;

use anyhow::Result;

use crate::tabs::TabId;

/// Path of the page shown instead of a site whose limit is exhausted.
pub const BLOCKED_PAGE_PATH: &str = "pages/blocked.html";

/// Actions the background process can ask the browser to perform.
#[cfg_attr(test, mockall::automock)]
pub trait BrowserHost {
    /// Navigates `tab` to `url`.
    fn redirect_tab(&mut self, tab: TabId, url: &str) -> Result<()>;

    /// Url of the internal page that replaces blocked sites.
    fn blocked_page_url(&self) -> String;
}

/// A page-wide style that can be added or removed.
#[cfg_attr(test, mockall::automock)]
pub trait PageStyle {
    /// Adds the style to every open page.
    fn inject(&mut self, id: &str, css: &str) -> Result<()>;

    /// Adds the style to the page shown in `tab` only.
    fn inject_into(&mut self, tab: TabId, id: &str, css: &str) -> Result<()>;

    fn remove(&mut self, id: &str) -> Result<()>;
}
