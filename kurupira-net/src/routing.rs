//! C10: NP routing table. An open-addressed hash table keyed by peer ID,
//! linear probing, Knuth back-shift deletion so probe chains never break —
//! directly modeled on `lnp_routing_table.c`'s `routing_table_t`. Each
//! entry carries its own history ring buffer (`history.rs`) plus a mutex and
//! condvar for NP handshake waiters, matching Section 5's locking
//! discipline: one structural mutex for the table, one payload mutex per
//! entry, re-verify `is_used` after re-acquiring the entry lock.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::constants::ROUTING_TABLE_SIZE;
use crate::history::History;
use crate::id::PeerId;

pub struct EntryData {
    pub is_used: bool,
    pub id: PeerId,
    pub store_index: Option<u32>,
    pub history: History,
    /// Bumped every time a handshake-terminating packet is handled for this
    /// entry, so a waiter that missed the `notify` between checking the
    /// predicate and calling `wait` doesn't block past its timeout for no
    /// reason (guards the classic lost-wakeup window).
    epoch: u64,
}

impl Default for EntryData {
    fn default() -> Self {
        Self { is_used: false, id: [0; crate::constants::ID_LENGTH], store_index: None, history: History::default(), epoch: 0 }
    }
}

struct Entry {
    data: Mutex<EntryData>,
    condvar: Condvar,
}

impl Default for Entry {
    fn default() -> Self {
        Self { data: Mutex::new(EntryData::default()), condvar: Condvar::new() }
    }
}

pub struct RoutingTable {
    /// Guards the structural shape of the table: which slots are used, probe
    /// chain integrity on insert/remove. Entry payload fields (history,
    /// store_index) are mutated under the entry's own mutex once its index
    /// is known, not this one.
    table_mutex: Mutex<()>,
    entries: Vec<Entry>,
}

fn hash_id(id: &PeerId) -> usize {
    u32::from_be_bytes([id[0], id[1], id[2], id[3]]) as usize
}

impl Default for RoutingTable {
    fn default() -> Self {
        let mut entries = Vec::with_capacity(ROUTING_TABLE_SIZE);
        entries.resize_with(ROUTING_TABLE_SIZE, Entry::default);
        Self { table_mutex: Mutex::new(()), entries }
    }
}

impl RoutingTable {
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Looks up `id`, returning its slot index if present. Probing walks
    /// forward from the canonical hash slot and stops at the first unused
    /// slot, since insertion never leaves a hole inside a chain it created
    /// (Knuth-style deletion preserves that property).
    pub fn lookup(&self, id: &PeerId) -> Option<usize> {
        let _guard = self.table_mutex.lock();
        self.probe_for(id)
    }

    fn probe_for(&self, id: &PeerId) -> Option<usize> {
        let start = hash_id(id) % self.entries.len();
        for i in 0..self.entries.len() {
            let idx = (start + i) % self.entries.len();
            let data = self.entries[idx].data.lock();
            if !data.is_used {
                return None;
            }
            if data.id == *id {
                return Some(idx);
            }
        }
        None
    }

    /// Returns the existing slot for `id`, or claims the first free slot on
    /// its probe chain. At least one slot is always left unused (capacity
    /// minus live entries never reaches the table size), so the probe below
    /// is guaranteed to terminate.
    pub fn find_or_insert(&self, id: &PeerId) -> usize {
        let _guard = self.table_mutex.lock();
        if let Some(idx) = self.probe_for(id) {
            return idx;
        }
        let start = hash_id(id) % self.entries.len();
        for i in 0..self.entries.len() {
            let idx = (start + i) % self.entries.len();
            let mut data = self.entries[idx].data.lock();
            if !data.is_used {
                *data = EntryData { is_used: true, id: *id, store_index: None, history: History::default(), epoch: 0 };
                return idx;
            }
        }
        unreachable!("routing table has no free slot; capacity invariant violated")
    }

    /// Knuth's backward-shift deletion: clear `index`, then walk forward
    /// compacting any entry whose ideal probe position doesn't lie strictly
    /// between the hole and its current position, so no live entry's probe
    /// chain is ever broken by the removal.
    pub fn remove(&self, index: usize) {
        let _guard = self.table_mutex.lock();
        let len = self.entries.len();
        {
            let mut data = self.entries[index].data.lock();
            if !data.is_used {
                return;
            }
            *data = EntryData::default();
        }
        let mut hole = index;
        let mut j = (index + 1) % len;
        loop {
            let moved = {
                let data = self.entries[j].data.lock();
                if !data.is_used {
                    break;
                }
                EntryData { is_used: true, id: data.id, store_index: data.store_index, history: clone_history(&data.history), epoch: data.epoch }
            };
            let ideal = hash_id(&moved.id) % len;
            if !in_probe_range(ideal, hole, j, len) {
                *self.entries[hole].data.lock() = moved;
                *self.entries[j].data.lock() = EntryData::default();
                hole = j;
            }
            j = (j + 1) % len;
            if j == hole {
                break;
            }
        }
    }

    /// Runs `f` with the entry's payload locked, re-checking `is_used` first
    /// so a concurrent [`Self::remove`] between index lookup and this call
    /// is observed rather than acted on with stale data.
    pub fn with_entry<R>(&self, index: usize, f: impl FnOnce(&mut EntryData) -> R) -> Option<R> {
        let mut data = self.entries[index].data.lock();
        if !data.is_used {
            return None;
        }
        Some(f(&mut data))
    }

    pub fn notify_waiters(&self, index: usize) {
        {
            let mut data = self.entries[index].data.lock();
            data.epoch += 1;
        }
        self.entries[index].condvar.notify_all();
    }

    /// Blocks the calling thread until `predicate` holds or `timeout`
    /// elapses, re-checking after every wake the way the NP handshake
    /// initiator waits for `KEY_EXCHANGE_OK` to land (Section 4.12 step 5).
    pub fn wait_for(&self, index: usize, timeout: Duration, mut predicate: impl FnMut(&EntryData) -> bool) -> bool {
        let entry = &self.entries[index];
        let mut data = entry.data.lock();
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if !data.is_used {
                return false;
            }
            if predicate(&data) {
                return true;
            }
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let result = entry.condvar.wait_for(&mut data, remaining);
            if result.timed_out() {
                return predicate(&data) && data.is_used;
            }
        }
    }
}

fn clone_history(h: &History) -> History {
    // History has no public snapshot API beyond its operations; a routing
    // entry move during backward-shift deletion happens far less often than
    // lookups, so paying for a fresh ring buffer via insert-replay is fine.
    h.clone()
}

/// Whether slot `check` lies on the cyclic path from `hole` (exclusive) up
/// to but not including `at` — i.e. whether leaving the entry currently at
/// `at` in place would still let a probe starting at its ideal slot reach
/// it without crossing the hole.
fn in_probe_range(ideal: usize, hole: usize, at: usize, len: usize) -> bool {
    let rel = |x: usize| (x + len - hole) % len;
    let r = rel(ideal);
    r >= 1 && r <= rel(at)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(b: u8) -> PeerId {
        let mut id = [0u8; crate::constants::ID_LENGTH];
        id[0] = b;
        id
    }

    #[test]
    fn insert_then_lookup_finds_the_same_slot() {
        let t = RoutingTable::default();
        let a = id(1);
        let idx = t.find_or_insert(&a);
        assert_eq!(t.lookup(&a), Some(idx));
    }

    #[test]
    fn remove_preserves_probe_chain_for_a_colliding_successor() {
        let t = RoutingTable::default();
        let len = t.capacity();
        // Two ids that hash to the same slot: second one must probe forward.
        let mut a = [0u8; crate::constants::ID_LENGTH];
        let mut b = [0u8; crate::constants::ID_LENGTH];
        let base = 7u32;
        a[0..4].copy_from_slice(&base.to_be_bytes());
        b[0..4].copy_from_slice(&base.to_be_bytes());
        a[19] = 1;
        b[19] = 2;
        let idx_a = t.find_or_insert(&a);
        let idx_b = t.find_or_insert(&b);
        assert_eq!(idx_b, (idx_a + 1) % len);

        t.remove(idx_a);
        assert_eq!(t.lookup(&b), Some(idx_a), "back-shift should have moved b into a's old slot");
    }

    #[test]
    fn with_entry_returns_none_after_removal() {
        let t = RoutingTable::default();
        let a = id(3);
        let idx = t.find_or_insert(&a);
        t.remove(idx);
        assert!(t.with_entry(idx, |_| ()).is_none());
    }

    #[test]
    fn wait_for_times_out_when_never_notified() {
        let t = RoutingTable::default();
        let idx = t.find_or_insert(&id(9));
        let woke = t.wait_for(idx, Duration::from_millis(20), |_| false);
        assert!(!woke);
    }

    #[test]
    fn notify_wakes_a_waiting_predicate() {
        let t = std::sync::Arc::new(RoutingTable::default());
        let idx = t.find_or_insert(&id(4));
        let t2 = t.clone();
        let h = std::thread::spawn(move || t2.wait_for(idx, Duration::from_secs(2), |d| d.epoch >= 1));
        std::thread::sleep(Duration::from_millis(20));
        t.notify_waiters(idx);
        assert!(h.join().unwrap());
    }
}
