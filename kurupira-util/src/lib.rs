pub mod buffer;
pub mod error;
pub mod gate;
pub mod queue;

pub use buffer::Buffer;
pub use error::{KurupiraError, Result};
pub use gate::{AtomicIntervalGate, IntervalGate};
pub use queue::BoundedQueue;

/// Milliseconds per LP/NP scheduler tick.
pub const TICK_MS: i64 = 500;

/// Monotonic milliseconds since an arbitrary epoch, the time base all tick
/// counters and interval gates are expressed in.
pub fn time_ticks() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}
