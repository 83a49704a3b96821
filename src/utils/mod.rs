use std::sync::OnceLock;
use std::time::{Duration, Instant};

pub mod clock;
pub mod logging;

pub use clock::Clock;

/// Time since the first call in this process, on the monotonic clock.
pub fn get_monotonic_time() -> Duration {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed()
}

/// Milliseconds of a monotonic timestamp, truncated to the 32-bit event time
/// used by both protocols.
pub fn to_event_time(time: Duration) -> u32 {
    time.as_millis() as u32
}

/// Rounds half-up, the way integer device positions are reported.
pub fn round_half_up(value: f64) -> i32 {
    (value + 0.5).floor() as i32
}
