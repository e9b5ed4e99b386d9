use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{KurupiraError, Result};

struct Inner<T> {
    items: VecDeque<(T, Vec<u8>)>,
    capacity: usize,
    shut_down: bool,
}

/// Fixed-capacity multi-producer/multi-consumer FIFO of tagged byte messages.
/// NP keeps one of these per logical upper channel (reliable, unreliable); the
/// tag is a peer ID, an LP session number, or whatever the caller chooses to
/// key delivered payloads by.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
}

impl<T: Clone> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner { items: VecDeque::with_capacity(capacity), capacity, shut_down: false }),
            not_empty: Condvar::new(),
        }
    }

    pub fn enqueue(&self, tag: T, bytes: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.items.len() >= inner.capacity {
            return Err(KurupiraError::Capacity("queue full".into()));
        }
        inner.items.push_back((tag, bytes));
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocks until an item is available, copies up to `max` bytes of the head
    /// record into `buf`, and returns `(tag, copied_len)`. Returns `None` if the
    /// queue was shut down while waiting.
    pub fn dequeue(&self, buf: &mut [u8]) -> Option<(T, usize)> {
        let mut inner = self.inner.lock();
        loop {
            if let Some((tag, bytes)) = inner.items.pop_front() {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                return Some((tag, n));
            }
            if inner.shut_down {
                return None;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Like [`Self::dequeue`] but gives up after `timeout` instead of blocking forever.
    pub fn dequeue_timeout(&self, buf: &mut [u8], timeout: Duration) -> Option<(T, usize)> {
        let mut inner = self.inner.lock();
        loop {
            if let Some((tag, bytes)) = inner.items.pop_front() {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                return Some((tag, n));
            }
            if inner.shut_down {
                return None;
            }
            let timed_out = self.not_empty.wait_for(&mut inner, timeout).timed_out();
            if timed_out {
                return None;
            }
        }
    }

    pub fn try_dequeue(&self, buf: &mut [u8]) -> Option<(T, usize)> {
        let mut inner = self.inner.lock();
        inner.items.pop_front().map(|(tag, bytes)| {
            let n = bytes.len().min(buf.len());
            buf[..n].copy_from_slice(&bytes[..n]);
            (tag, n)
        })
    }

    pub fn flush(&self) {
        self.inner.lock().items.clear();
    }

    pub fn shut_down(&self) {
        let mut inner = self.inner.lock();
        inner.shut_down = true;
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_dequeue_round_trips_bytes_and_tag() {
        let q: BoundedQueue<u32> = BoundedQueue::new(4);
        q.enqueue(7, b"hello".to_vec()).unwrap();
        let mut buf = [0u8; 16];
        let (tag, n) = q.dequeue(&mut buf).unwrap();
        assert_eq!(tag, 7);
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn enqueue_fails_when_full() {
        let q: BoundedQueue<u32> = BoundedQueue::new(1);
        q.enqueue(1, vec![1]).unwrap();
        assert!(q.enqueue(2, vec![2]).is_err());
    }

    #[test]
    fn shut_down_wakes_blocked_dequeue() {
        let q: std::sync::Arc<BoundedQueue<u32>> = std::sync::Arc::new(BoundedQueue::new(4));
        let q2 = q.clone();
        let h = std::thread::spawn(move || {
            let mut buf = [0u8; 16];
            q2.dequeue(&mut buf)
        });
        std::thread::sleep(Duration::from_millis(20));
        q.shut_down();
        assert!(h.join().unwrap().is_none());
    }
}
