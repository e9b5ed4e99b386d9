use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use kurupira_crypto::{CipherDescriptor, HashDescriptor, MacDescriptor};
use kurupira_util::error::{KurupiraError, Result};

use crate::constants::MAX_SESSIONS;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SessionState {
    Closed,
    Connecting,
    BeingConnected,
    Established,
    CloseWait,
    TimeWait,
}

/// Directional key material, present only while `state` is one of
/// `Established`, `CloseWait`, `TimeWait`.
#[derive(Default, Clone)]
pub struct KeyMaterial {
    pub cipher_in_key: Vec<u8>,
    pub cipher_in_iv: Vec<u8>,
    pub cipher_out_key: Vec<u8>,
    pub cipher_out_iv: Vec<u8>,
    pub mac_in_key: Vec<u8>,
    pub mac_out_key: Vec<u8>,
    pub verifier: Vec<u8>,
}

pub struct SessionData {
    pub state: SessionState,
    pub address: Option<SocketAddrV4>,
    pub foreign_session: Option<u8>,
    pub cipher: Option<CipherDescriptor>,
    pub hash: Option<HashDescriptor>,
    pub mac: Option<MacDescriptor>,
    pub h_in: [u8; 16],
    pub h_out: [u8; 16],
    pub y_in: Vec<u8>,
    pub y_out: Vec<u8>,
    /// Our DH exponent, kept only for the duration of the handshake.
    pub x: Vec<u8>,
    pub z: Vec<u8>,
    pub keys: KeyMaterial,
    pub timeout: u32,
    pub silence: u32,
    pub alive: u32,
    pub hunt_time: i64,
    pub packets_sent: u64,
    pub packets_received: u64,
}

impl Default for SessionData {
    fn default() -> Self {
        Self {
            state: SessionState::Closed,
            address: None,
            foreign_session: None,
            cipher: None,
            hash: None,
            mac: None,
            h_in: [0; 16],
            h_out: [0; 16],
            y_in: Vec::new(),
            y_out: Vec::new(),
            x: Vec::new(),
            z: Vec::new(),
            keys: KeyMaterial::default(),
            timeout: 0,
            silence: 0,
            alive: 0,
            hunt_time: 0,
            packets_sent: 0,
            packets_received: 0,
        }
    }
}

impl SessionData {
    pub fn encrypted(&self) -> bool {
        self.cipher.map(|c| !c.is_null()).unwrap_or(false)
    }
}

/// One slot of the session table, with its own mutex so timer threads can
/// `try_lock` around a slow session instead of blocking the whole table.
pub struct Session {
    pub data: Mutex<SessionData>,
    packets_received_hint: AtomicU64,
    reuse_generation: AtomicU32,
}

impl Default for Session {
    fn default() -> Self {
        Self { data: Mutex::new(SessionData::default()), packets_received_hint: AtomicU64::new(0), reuse_generation: AtomicU32::new(0) }
    }
}

impl Session {
    pub fn is_established(&self) -> bool {
        self.data.lock().state == SessionState::Established
    }

    pub fn generation(&self) -> u32 {
        self.reuse_generation.load(Ordering::Relaxed)
    }
}

/// Fixed array of [`MAX_SESSIONS`] slots, indexed by the one-byte wire session
/// number. Cross-references elsewhere (node cache, routing history) store this
/// index rather than an owning reference, per the arena+index design note.
pub struct SessionTable {
    sessions: Vec<Session>,
}

impl Default for SessionTable {
    fn default() -> Self {
        let mut sessions = Vec::with_capacity(MAX_SESSIONS);
        sessions.resize_with(MAX_SESSIONS, Session::default);
        Self { sessions }
    }
}

impl SessionTable {
    pub fn get(&self, session: u8) -> &Session {
        &self.sessions[session as usize]
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.data.lock().state != SessionState::Closed).count()
    }

    /// Scans for a `Closed` slot using `try_lock` so a slot held by a slow
    /// operation on another thread is simply skipped, not waited on.
    pub fn acquire_free(&self, target_state: SessionState) -> Result<u8> {
        for (i, s) in self.sessions.iter().enumerate() {
            if let Some(mut guard) = s.data.try_lock() {
                if guard.state == SessionState::Closed {
                    *guard = SessionData { state: target_state, ..SessionData::default() };
                    s.reuse_generation.fetch_add(1, Ordering::Relaxed);
                    return Ok(i as u8);
                }
            }
        }
        Err(KurupiraError::Capacity("no free LP session slot".into()))
    }

    pub fn find_by_address(&self, addr: SocketAddrV4) -> Option<u8> {
        for (i, s) in self.sessions.iter().enumerate() {
            let guard = s.data.lock();
            if guard.state != SessionState::Closed && guard.address == Some(addr) {
                return Some(i as u8);
            }
        }
        None
    }

    /// Frees all key material and resets to `Closed`. Returns the address the
    /// session was bound to, so the caller can mark the node-cache entry
    /// inactive, and whether a close callback should fire.
    pub fn close(&self, session: u8) -> Option<SocketAddrV4> {
        let s = self.get(session);
        let mut guard = s.data.lock();
        if guard.state == SessionState::Closed {
            return None;
        }
        let addr = guard.address;
        *guard = SessionData::default();
        s.packets_received_hint.store(0, Ordering::Relaxed);
        addr
    }
}
