//! Time limits for websites and a bedtime grayscale mode, enforced by a native messaging host
//! that the browser extension talks to. The `prodi` cli edits the same settings the host reads.
//!

pub mod background;
pub mod bedtime;
pub mod cli;
pub mod host;
pub mod settings;
pub mod tabs;
pub mod utils;
