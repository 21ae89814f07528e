//! Clocks, delays and the cooperative timer scheduler
//!
//! The receiver runs a single loop, so all timing is explicit:
//!
//! - [`Clock`] supplies monotonic milliseconds since node start and, once
//!   synchronized, the wall-clock time
//! - [`Delay`] blocks for the settle times the radio module needs
//! - [`Scheduler`] holds one-shot deadlines keyed by [`Action`] and hands back
//!   whatever has expired when the loop asks
//!
//! # Examples
//!
//! ```
//! use mailbox_link::time::{Action, Scheduler};
//!
//! let mut scheduler = Scheduler::new();
//! scheduler.arm(Action::Rollcall, 1_000);
//! assert!(scheduler.due(999).is_empty());
//! assert_eq!(scheduler.due(1_000), vec![Action::Rollcall]);
//! ```

mod clock;
mod scheduler;

pub use self::clock::{Clock, Delay, ManualClock, SystemClock, ThreadDelay};
pub use self::scheduler::{Action, Scheduler};

/// Utility functions for wall-clock arithmetic
pub mod util {
    use chrono::{DateTime, Utc};
    use std::time::Duration;

    /// Time elapsed from `then` to `now`; `None` if `then` lies in the future
    pub fn elapsed(now: DateTime<Utc>, then: DateTime<Utc>) -> Option<Duration> {
        (now - then).to_std().ok()
    }

    /// Whole days elapsed from `then` to `now`
    pub fn whole_days(now: DateTime<Utc>, then: DateTime<Utc>) -> i64 {
        (now - then).num_days().max(0)
    }
}
