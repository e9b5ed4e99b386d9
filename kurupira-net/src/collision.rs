//! Duplicate-suppression table: bounds the window in which NP will forward
//! the same content hash twice. Grounded on `lnp_collision_table.c`'s
//! `lnp_handle_collision`: a fixed-size open-address table keyed by the low
//! bytes of the content hash, one slot per hash bucket, last writer wins.

use parking_lot::Mutex;

use crate::constants::COLLISION_TABLE_SIZE;

pub const NO_COLLISION: i32 = -1;

#[derive(Clone, Copy)]
struct Slot {
    hash: [u8; 20],
    forwarding_session: u8,
    occupied: bool,
}

impl Default for Slot {
    fn default() -> Self {
        Self { hash: [0; 20], forwarding_session: 0, occupied: false }
    }
}

pub struct CollisionTable {
    slots: Mutex<Vec<Slot>>,
}

impl Default for CollisionTable {
    fn default() -> Self {
        Self { slots: Mutex::new(vec![Slot::default(); COLLISION_TABLE_SIZE]) }
    }
}

fn bucket(hash: &[u8; 20]) -> usize {
    u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]) as usize % COLLISION_TABLE_SIZE
}

impl CollisionTable {
    /// Inserts `hash` with its `forwarding_session`. If the bucket already
    /// holds this exact hash, the insert is a collision: the previously
    /// recorded forwarding session is returned and the slot is left as-is.
    /// Any other occupant is simply overwritten (the table never chains).
    pub fn check_and_insert(&self, hash: [u8; 20], forwarding_session: u8) -> i32 {
        let mut slots = self.slots.lock();
        let b = bucket(&hash);
        let slot = &mut slots[b];
        if slot.occupied && slot.hash == hash {
            return slot.forwarding_session as i32;
        }
        *slot = Slot { hash, forwarding_session, occupied: true };
        NO_COLLISION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sight_of_a_hash_is_not_a_collision() {
        let t = CollisionTable::default();
        assert_eq!(t.check_and_insert([1; 20], 3), NO_COLLISION);
    }

    #[test]
    fn repeated_hash_returns_prior_forwarding_session() {
        let t = CollisionTable::default();
        t.check_and_insert([1; 20], 3);
        assert_eq!(t.check_and_insert([1; 20], 9), 3);
    }

    #[test]
    fn distinct_hash_in_same_bucket_overwrites() {
        let t = CollisionTable::default();
        let mut other = [2u8; 20];
        // force the same bucket as [1;20] by matching the first four bytes
        other[0] = 1;
        other[1] = 1;
        other[2] = 1;
        other[3] = 1;
        t.check_and_insert([1; 20], 3);
        assert_eq!(t.check_and_insert(other, 5), NO_COLLISION);
        assert_eq!(t.check_and_insert([1; 20], 7), NO_COLLISION);
    }
}
