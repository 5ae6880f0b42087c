//! Small shared helpers: time sources and display formatting.

pub mod clock;
pub mod format;

pub use clock::{Clock, ManualClock, SystemClock};
pub use format::{format_remaining, format_timestamp};
