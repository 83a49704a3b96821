use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use super::get_monotonic_time;

/// Shareable clock used for event timestamps and repeat deadlines.
///
/// Clones share the same time source. Tests pin it with [`Clock::with_time`].
#[derive(Debug, Default, Clone)]
pub struct Clock {
    fixed: Rc<Cell<Option<Duration>>>,
}

impl Clock {
    /// Creates a clock stopped at `time`.
    pub fn with_time(time: Duration) -> Self {
        Self {
            fixed: Rc::new(Cell::new(Some(time))),
        }
    }

    pub fn now(&self) -> Duration {
        self.fixed.get().unwrap_or_else(get_monotonic_time)
    }

    /// Current time in milliseconds, as carried by events.
    pub fn now_ms(&self) -> u32 {
        super::to_event_time(self.now())
    }

    /// Stops the clock at `time`.
    pub fn set_time(&self, time: Duration) {
        self.fixed.set(Some(time));
    }

    pub fn advance(&self, by: Duration) {
        self.set_time(self.now() + by);
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_time() {
        let clock = Clock::with_time(Duration::ZERO);
        let other = clock.clone();
        clock.advance(Duration::from_millis(16));
        assert_eq!(other.now(), Duration::from_millis(16));
        assert_eq!(other.now_ms(), 16);
    }
}
