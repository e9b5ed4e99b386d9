//! C11: NP key store. A fixed-size slab of per-peer end-to-end crypto state,
//! threaded through a free list the way LP's session table draws from a
//! fixed array — except the key store additionally needs O(1) free/alloc
//! since its slots churn with handshakes, not with neighbor count, so a
//! singly linked free list (`lnp_key_store.c`'s `next_free_slot`) is used
//! instead of an `acquire_free` scan.

use parking_lot::Mutex;

use kurupira_crypto::{CipherDescriptor, HashDescriptor, MacDescriptor};
use kurupira_util::error::{KurupiraError, Result};

use crate::constants::{K_LENGTH, KEY_TABLE_SIZE};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum HandshakeState {
    Closed,
    Connecting,
    BeingConnected,
    ExchangingKeys,
    Connected,
}

#[derive(Default, Clone)]
pub struct KeyMaterial {
    pub cipher_in_key: Vec<u8>,
    pub cipher_in_iv: Vec<u8>,
    pub cipher_out_key: Vec<u8>,
    pub cipher_out_iv: Vec<u8>,
    pub mac_in_key: Vec<u8>,
    pub mac_out_key: Vec<u8>,
}

pub struct KeyStoreEntry {
    pub handshake_state: HandshakeState,
    pub cipher: Option<CipherDescriptor>,
    pub hash: Option<HashDescriptor>,
    pub mac: Option<MacDescriptor>,
    pub keys: KeyMaterial,
    pub public_key: Vec<u8>,
    pub k_in: [u8; K_LENGTH],
    pub k_out: [u8; K_LENGTH],
}

impl Default for KeyStoreEntry {
    fn default() -> Self {
        Self {
            handshake_state: HandshakeState::Closed,
            cipher: None,
            hash: None,
            mac: None,
            keys: KeyMaterial::default(),
            public_key: Vec::new(),
            k_in: [0; K_LENGTH],
            k_out: [0; K_LENGTH],
        }
    }
}

enum Slot {
    Free { next_free: u32 },
    Used(KeyStoreEntry),
}

/// `NULL_SLOT` terminator for the free list, matching `lnp_key_store.c`.
const NULL_SLOT: u32 = u32::MAX;

struct Inner {
    slots: Vec<Slot>,
    free_head: u32,
}

pub struct KeyStore {
    inner: Mutex<Inner>,
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new(KEY_TABLE_SIZE)
    }
}

impl KeyStore {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for i in 0..capacity {
            let next_free = if i + 1 == capacity { NULL_SLOT } else { (i + 1) as u32 };
            slots.push(Slot::Free { next_free });
        }
        Self { inner: Mutex::new(Inner { slots, free_head: if capacity == 0 { NULL_SLOT } else { 0 } }) }
    }

    /// Pops a slot off the free list. Fails with [`KurupiraError::Capacity`]
    /// if the slab is exhausted.
    pub fn allocate(&self) -> Result<u32> {
        let mut inner = self.inner.lock();
        let head = inner.free_head;
        if head == NULL_SLOT {
            return Err(KurupiraError::Capacity("NP key store exhausted".into()));
        }
        let next_free = match inner.slots[head as usize] {
            Slot::Free { next_free } => next_free,
            Slot::Used(_) => unreachable!("free-list head must point at a free slot"),
        };
        inner.free_head = next_free;
        inner.slots[head as usize] = Slot::Used(KeyStoreEntry::default());
        Ok(head)
    }

    /// Pushes `index` back onto the free list.
    pub fn delete(&self, index: u32) {
        let mut inner = self.inner.lock();
        let prev_head = inner.free_head;
        inner.slots[index as usize] = Slot::Free { next_free: prev_head };
        inner.free_head = index;
    }

    pub fn with_entry<R>(&self, index: u32, f: impl FnOnce(&mut KeyStoreEntry) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        match &mut inner.slots[index as usize] {
            Slot::Used(entry) => Some(f(entry)),
            Slot::Free { .. } => None,
        }
    }

    pub fn handshake_state(&self, index: u32) -> Option<HandshakeState> {
        self.with_entry(index, |e| e.handshake_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_delete_round_trip_through_free_list() {
        let store = KeyStore::new(2);
        let a = store.allocate().unwrap();
        let b = store.allocate().unwrap();
        assert!(store.allocate().is_err());
        store.delete(a);
        let c = store.allocate().unwrap();
        assert_eq!(a, c);
        let _ = b;
    }

    #[test]
    fn fresh_entry_starts_closed() {
        let store = KeyStore::new(4);
        let slot = store.allocate().unwrap();
        assert_eq!(store.handshake_state(slot), Some(HandshakeState::Closed));
    }
}
