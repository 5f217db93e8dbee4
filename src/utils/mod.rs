pub mod clock;
pub mod dir;
pub mod logging;
pub mod runtime;
pub mod schedule;
pub mod time;
