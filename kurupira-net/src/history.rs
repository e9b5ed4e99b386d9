//! Per-routing-entry arrival history: a true ring buffer of LP session
//! numbers packets from one peer ID have recently arrived on, used to pick
//! a next-hop session for replies without a full routing table lookup.
//! Grounded on `lnp_history_table.c`'s `history_entry_t` exactly, including
//! its random-draw-then-splice-on-stale route selection.

use crate::constants::HISTORY_SIZE;

/// No next hop is known; the caller decides between broadcasting and
/// bouncing the packet back the way it came.
pub const NO_ROUTE: i32 = -1;

#[derive(Clone)]
pub struct History {
    entries: [u8; HISTORY_SIZE],
    begin: usize,
    end: usize,
}

impl Default for History {
    fn default() -> Self {
        Self { entries: [0; HISTORY_SIZE], begin: 0, end: 0 }
    }
}

impl History {
    fn len(&self) -> usize {
        self.end - self.begin
    }

    /// Appends `session`; when the ring is full, the oldest entry is
    /// overwritten and `begin` advances, exactly mirroring the original's
    /// oldest-drop behavior rather than erroring on overflow.
    pub fn insert(&mut self, session: u8) {
        if self.len() == HISTORY_SIZE {
            self.begin += 1;
        }
        self.entries[self.end % HISTORY_SIZE] = session;
        self.end += 1;
        if self.begin >= HISTORY_SIZE {
            self.begin -= HISTORY_SIZE;
            self.end -= HISTORY_SIZE;
        }
    }

    /// Removes every occurrence of `session`, compacting the remaining
    /// entries forward in place.
    pub fn drop_session(&mut self, session: u8) {
        let mut write = self.begin;
        for read in self.begin..self.end {
            let v = self.entries[read % HISTORY_SIZE];
            if v != session {
                self.entries[write % HISTORY_SIZE] = v;
                write += 1;
            }
        }
        self.end = write;
    }

    pub fn clear(&mut self) {
        self.begin = 0;
        self.end = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Picks a uniformly random entry not equal to `exclude_session` and
    /// still active per `is_active`. A candidate that `is_active` rejects is
    /// spliced out of the history (it's stale) and the draw retries, so a
    /// history full of dead sessions eventually empties rather than looping
    /// forever.
    pub fn pick_route(&mut self, exclude_session: u8, random_u32: impl Fn() -> u32, is_active: impl Fn(u8) -> bool) -> i32 {
        loop {
            let used = self.len();
            if used == 0 {
                return NO_ROUTE;
            }
            let start_offset = random_u32() as usize % used;
            let mut found = None;
            for i in 0..used {
                let offset = (start_offset + i) % used;
                let candidate = self.entries[(self.begin + offset) % HISTORY_SIZE];
                if candidate != exclude_session {
                    found = Some(candidate);
                    break;
                }
            }
            match found {
                None => return NO_ROUTE,
                Some(candidate) => {
                    if is_active(candidate) {
                        return candidate as i32;
                    }
                    self.drop_session(candidate);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_drops_oldest_once_full() {
        let mut h = History::default();
        for i in 0..HISTORY_SIZE as u8 + 3 {
            h.insert(i);
        }
        let chosen = h.pick_route(255, || 0, |_| true);
        assert_eq!(chosen, 3);
    }

    #[test]
    fn drop_session_removes_all_occurrences() {
        let mut h = History::default();
        h.insert(5);
        h.insert(7);
        h.insert(5);
        h.drop_session(5);
        assert_eq!(h.pick_route(7, || 0, |_| true), NO_ROUTE);
    }

    #[test]
    fn pick_route_splices_out_inactive_candidates() {
        let mut h = History::default();
        h.insert(1);
        h.insert(2);
        let chosen = h.pick_route(255, || 0, |s| s == 2);
        assert_eq!(chosen, 2);
        assert!(h.pick_route(255, || 0, |_| false) == NO_ROUTE);
    }

    #[test]
    fn empty_history_has_no_route() {
        let mut h = History::default();
        assert_eq!(h.pick_route(0, || 0, |_| true), NO_ROUTE);
    }
}
