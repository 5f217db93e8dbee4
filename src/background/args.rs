use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

use crate::tabs::ActivationPolicy;

/// Arguments of the native messaging host. The browser launches it with the calling origin.
#[derive(Parser)]
pub struct HostArgs {
    /// Origin of the extension, e.g. `chrome-extension://<id>/`.
    pub origin: String,
    /// Passed by Chrome on Windows.
    #[arg(long = "parent-window")]
    pub parent_window: Option<i64>,
    #[arg(long)]
    pub dir: Option<PathBuf>,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
    #[arg(long, value_enum, default_value_t)]
    pub activation: ActivationPolicy,
}
