use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Time source for the receiver
pub trait Clock {
    /// Milliseconds since node start
    fn monotonic_ms(&self) -> u64;

    /// Current wall-clock time, `None` until it has been synchronized
    fn wall_clock(&self) -> Option<DateTime<Utc>>;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn monotonic_ms(&self) -> u64 {
        (**self).monotonic_ms()
    }

    fn wall_clock(&self) -> Option<DateTime<Utc>> {
        (**self).wall_clock()
    }
}

/// Host clock; the wall clock is assumed to be synchronized
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    /// Starts counting from now
    pub fn new() -> Self {
        SystemClock {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn wall_clock(&self) -> Option<DateTime<Utc>> {
        Some(Utc::now())
    }
}

#[derive(Debug)]
struct ManualState {
    monotonic_ms: u64,
    wall_clock: Option<DateTime<Utc>>,
}

/// Hand-driven clock; clones share the same time
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    /// Clock at monotonic 0 with the given wall-clock time
    pub fn new(wall_clock: Option<DateTime<Utc>>) -> Self {
        ManualClock {
            state: Arc::new(Mutex::new(ManualState {
                monotonic_ms: 0,
                wall_clock,
            })),
        }
    }

    /// Moves both clocks forward
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.monotonic_ms += by.as_millis() as u64;
        if let Some(wall) = state.wall_clock {
            state.wall_clock = chrono::Duration::from_std(by).ok().map(|d| wall + d);
        }
    }

    /// Sets (or clears) the wall clock without touching monotonic time
    pub fn set_wall_clock(&self, wall_clock: Option<DateTime<Utc>>) {
        self.lock().wall_clock = wall_clock;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn monotonic_ms(&self) -> u64 {
        self.lock().monotonic_ms
    }

    fn wall_clock(&self) -> Option<DateTime<Utc>> {
        self.lock().wall_clock
    }
}

/// Blocking wait used for radio settle times
pub trait Delay {
    /// Waits for `duration`
    fn delay(&mut self, duration: Duration);
}

/// Sleeps the current thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Waiting on a manual clock just moves it forward
impl Delay for ManualClock {
    fn delay(&mut self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_advance() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let clock = ManualClock::new(Some(start));
        let shared = clock.clone();

        clock.advance(Duration::from_millis(1500));
        assert_eq!(shared.monotonic_ms(), 1500);
        assert_eq!(
            shared.wall_clock(),
            Some(start + chrono::Duration::milliseconds(1500))
        );
    }

    #[test]
    fn test_manual_clock_without_wall_time() {
        let clock = ManualClock::new(None);
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.wall_clock(), None);
        assert_eq!(clock.monotonic_ms(), 5000);
    }

    #[test]
    fn test_manual_clock_as_delay() {
        let clock = ManualClock::new(None);
        let mut delay = clock.clone();
        delay.delay(Duration::from_millis(250));
        assert_eq!(clock.monotonic_ms(), 250);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.monotonic_ms();
        let b = clock.monotonic_ms();
        assert!(b >= a);
        assert!(clock.wall_clock().is_some());
    }
}
