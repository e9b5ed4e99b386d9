use std::sync::atomic::{AtomicI64, Ordering};

/// Fires at most once every `FREQ` milliseconds. Used by the LP/NP scheduler
/// threads to pace periodic work (node-hunt, connect-floor top-up) without a
/// dedicated timer per task.
pub struct IntervalGate<const FREQ: i64>(i64);

impl<const FREQ: i64> IntervalGate<FREQ> {
    #[inline(always)]
    pub fn new(initial_ts: i64) -> Self {
        Self(initial_ts)
    }

    #[inline(always)]
    pub fn gate(&mut self, time: i64) -> bool {
        if (time - self.0) >= FREQ {
            self.0 = time;
            true
        } else {
            false
        }
    }
}

/// Atomic sibling of [`IntervalGate`] for fields shared across threads without
/// a surrounding mutex.
pub struct AtomicIntervalGate<const FREQ: i64>(AtomicI64);

impl<const FREQ: i64> AtomicIntervalGate<FREQ> {
    #[inline(always)]
    pub fn new(initial_ts: i64) -> Self {
        Self(AtomicI64::new(initial_ts))
    }

    pub fn gate(&self, time: i64) -> bool {
        let prev = self.0.load(Ordering::Relaxed);
        if (time - prev) >= FREQ {
            self.0.compare_exchange(prev, time, Ordering::Relaxed, Ordering::Relaxed).is_ok()
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_fires_only_after_interval_elapses() {
        let mut g = IntervalGate::<500>::new(0);
        assert!(!g.gate(100));
        assert!(g.gate(500));
        assert!(!g.gate(600));
        assert!(g.gate(1001));
    }
}
