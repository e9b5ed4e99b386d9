//! C8: the three timer ticks run by the scheduler threads. Kept as free
//! functions over the session table and node cache so they can be unit
//! tested without spinning up real threads.

use kurupira_crypto::{find_cipher, find_hash, find_mac, parse_list};

use crate::cache::NodeCache;
use crate::constants::*;
use crate::dataplane::encode_data_frame;
use crate::handshake::AlgorithmLists;
use crate::host::LinkHost;
use crate::session::{SessionState, SessionTable};

/// Per-slot timeout/expiration bookkeeping, called once a tick. Sessions past
/// `T_TIMEOUT_TICKS` of total silence are closed; sessions past
/// `expiration_ticks` of cumulative lifetime begin a graceful disconnect.
/// Uses `try_lock` so a slow session never stalls the whole pass.
pub fn tick_timeouts<H: LinkHost>(table: &SessionTable, cache: &NodeCache, host: &H, expiration_ticks: u32) -> Vec<u8> {
    let mut to_close = Vec::new();
    let mut to_disconnect = Vec::new();
    for i in 0..table.len() {
        let s = table.get(i as u8);
        if let Some(mut guard) = s.data.try_lock() {
            if guard.state == SessionState::Closed {
                continue;
            }
            if guard.timeout == 0 {
                to_close.push(i as u8);
                continue;
            }
            guard.timeout -= 1;
            if guard.timeout == 0 {
                to_close.push(i as u8);
                continue;
            }
            guard.alive += 1;
            if guard.alive >= expiration_ticks && guard.state == SessionState::Established {
                to_disconnect.push(i as u8);
            }
        }
    }
    for session in &to_close {
        if let Some(addr) = table.close(*session) {
            cache.mark_inactive(*session);
            let _ = addr;
        }
        host.event_session_closed(*session);
    }
    to_disconnect
}

/// Increments silence counters; returns the sessions that should have a
/// keep-alive (established) or close-request re-send (close-wait) emitted.
pub fn tick_silence(table: &SessionTable) -> (Vec<u8>, Vec<u8>) {
    let mut keepalive = Vec::new();
    let mut resend_close = Vec::new();
    for i in 0..table.len() {
        let s = table.get(i as u8);
        if let Some(mut guard) = s.data.try_lock() {
            match guard.state {
                SessionState::Established => {
                    guard.silence += 1;
                    if guard.silence >= T_SILENT_TICKS {
                        guard.silence = 0;
                        keepalive.push(i as u8);
                    }
                }
                SessionState::CloseWait => {
                    guard.silence += 1;
                    if guard.silence >= T_SILENT_TICKS {
                        guard.silence = 0;
                        resend_close.push(i as u8);
                    }
                }
                _ => {}
            }
        }
    }
    (keepalive, resend_close)
}

/// Node-hunt and connect-floor maintenance, run once every
/// [`MONITOR_TICKS`] by the monitor thread.
pub fn tick_monitor(cache: &NodeCache, min_connections: usize, active_count: usize) -> (bool, Vec<u8>) {
    let need_more_connections = active_count < min_connections;
    let underfilled = cache.fill_ratio() < 0.5;
    let hunt_sessions = if underfilled { cache.active_sessions() } else { Vec::new() };
    (need_more_connections, hunt_sessions)
}

/// Builds and sends a `KEEP_ALIVE` inner packet for `session` over `host`.
pub fn send_keep_alive<H: LinkHost>(table: &SessionTable, host: &H, session: u8) {
    let s = table.get(session);
    let (addr, foreign, frame) = {
        let data = s.data.lock();
        let addr = match data.address {
            Some(a) => a,
            None => return,
        };
        let foreign = match data.foreign_session {
            Some(f) => f,
            None => return,
        };
        match encode_data_frame(&data, foreign, crate::constants::PACKET_KEEP_ALIVE, &[]) {
            Ok(f) => (addr, foreign, f),
            Err(_) => return,
        }
    };
    let _ = foreign;
    let _ = host.wire_send(addr, frame.as_bytes());
}

pub fn default_algorithm_lists() -> AlgorithmLists {
    AlgorithmLists { cipher_list: DEFAULT_CIPHER_LIST.into(), hash_list: DEFAULT_HASH_LIST.into(), mac_list: DEFAULT_MAC_LIST.into() }
}

/// Validates that a configured algorithm list names at least one known
/// algorithm in each category; used at startup so a bad config value is
/// caught before the first handshake attempt rather than failing silently
/// mid-negotiation.
pub fn validate_algorithm_lists(lists: &AlgorithmLists) -> bool {
    !parse_list(&lists.cipher_list).iter().all(|n| find_cipher(n).is_none())
        && !parse_list(&lists.hash_list).iter().all(|n| find_hash(n).is_none())
        && !parse_list(&lists.mac_list).iter().all(|n| find_mac(n).is_none())
}
