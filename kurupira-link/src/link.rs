//! The LP facade: owns the session table, node cache, and scheduler threads,
//! and exposes the connect/read/write/disconnect contract `layer_link.h`
//! describes for the neighbor layer.

use std::net::SocketAddrV4;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use kurupira_util::error::{KurupiraError, Result};
use kurupira_util::queue::BoundedQueue;

use crate::cache::NodeCache;
use crate::constants::*;
use crate::dataplane::{decode_data_frame, encode_data_frame};
use crate::handshake::{self, AlgorithmLists};
use crate::host::LinkHost;
use crate::scheduler;
use crate::session::{SessionState, SessionTable};
use crate::wire::{self, ConnectionOk, ConnectionRequest, KeyExchange, LpBuffer};

pub struct LinkConfig {
    pub min_connections: usize,
    pub max_connections: usize,
    pub cache_size: usize,
    pub expiration_ticks: u32,
    pub static_nodes_file: PathBuf,
    pub recent_nodes_file: PathBuf,
    pub algorithm_lists: AlgorithmLists,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            min_connections: 10,
            max_connections: 100,
            cache_size: 100,
            expiration_ticks: (86400 * 1000 / kurupira_util::TICK_MS) as u32,
            static_nodes_file: PathBuf::from("llp.static"),
            recent_nodes_file: PathBuf::from("llp.recent"),
            algorithm_lists: AlgorithmLists { cipher_list: DEFAULT_CIPHER_LIST.into(), hash_list: DEFAULT_HASH_LIST.into(), mac_list: DEFAULT_MAC_LIST.into() },
        }
    }
}

type Callback = Box<dyn Fn(u8) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_connect: Vec<Callback>,
    on_close: Vec<Callback>,
}

/// The LP engine. Generic over the host so embedders (a real UDP-bound
/// daemon, or an in-memory test harness) plug in without LP depending on
/// `std::net::UdpSocket` directly for anything but address types.
pub struct Link<H: LinkHost> {
    table: SessionTable,
    cache: NodeCache,
    host: Arc<H>,
    config: LinkConfig,
    callbacks: Mutex<Callbacks>,
    upward: BoundedQueue<u8>,
    finish: AtomicBool,
    tick_cv: Condvar,
    tick_mutex: Mutex<()>,
    last_error: Mutex<Option<String>>,
}

impl<H: LinkHost + 'static> Link<H> {
    pub fn new(host: Arc<H>, config: LinkConfig) -> Self {
        let cache = NodeCache::new(config.cache_size);
        Self {
            table: SessionTable::default(),
            cache,
            host,
            config,
            callbacks: Mutex::new(Callbacks::default()),
            upward: BoundedQueue::new(1024),
            finish: AtomicBool::new(false),
            tick_cv: Condvar::new(),
            tick_mutex: Mutex::new(()),
            last_error: Mutex::new(None),
        }
    }

    pub fn load_node_cache(&self) -> Result<()> {
        self.cache.load(&self.config.static_nodes_file, &self.config.recent_nodes_file)
    }

    fn set_last_error(&self, e: &KurupiraError) {
        *self.last_error.lock() = Some(e.to_string());
    }

    pub fn get_last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn register_connect_handler(&self, f: Callback) {
        self.callbacks.lock().on_connect.push(f);
    }

    pub fn register_close_handler(&self, f: Callback) {
        self.callbacks.lock().on_close.push(f);
    }

    pub fn active_count(&self) -> usize {
        self.table.active_count()
    }

    /// Initiates an outbound handshake to `addr`. Consults the node cache
    /// first so two concurrent attempts to the same neighbor don't each win
    /// a session.
    pub fn connect_to(&self, addr: SocketAddrV4) -> Result<u8> {
        let (session, req) = match handshake::begin_connect(&self.table, &self.cache, addr, &self.config.algorithm_lists) {
            Ok(v) => v,
            Err(e) => {
                self.set_last_error(&e);
                return Err(e);
            }
        };
        let buf = req.encode()?;
        self.host.wire_send(addr, buf.as_bytes())?;
        Ok(session)
    }

    pub fn connect_any(&self) -> Result<u8> {
        let addr = self.cache.random_inactive().ok_or_else(|| KurupiraError::Capacity("no inactive node cache entry".into()))?;
        self.connect_to(addr)
    }

    /// Begins graceful teardown: `Established -> CloseWait`, sends
    /// `CLOSE_REQUEST` carrying `HASH(z)`.
    pub fn disconnect(&self, session: u8) -> Result<()> {
        let s = self.table.get(session);
        let (addr, foreign, frame) = {
            let mut data = s.data.lock();
            if data.state != SessionState::Established {
                return Err(KurupiraError::Parse("disconnect on non-established session".into()));
            }
            data.state = SessionState::CloseWait;
            data.silence = 0;
            let addr = data.address.ok_or_else(|| KurupiraError::Parse("session has no address".into()))?;
            let foreign = data.foreign_session.ok_or_else(|| KurupiraError::Parse("session has no foreign session".into()))?;
            let verifier = data.keys.verifier.clone();
            let frame = encode_data_frame(&data, foreign, PACKET_CLOSE_REQUEST, &verifier)?;
            (addr, foreign, frame)
        };
        let _ = foreign;
        self.host.wire_send(addr, frame.as_bytes())?;
        Ok(())
    }

    /// Encrypts and sends `payload` as a `DATAGRAM` inner packet. Fails if
    /// the session isn't `Established`.
    pub fn write(&self, session: u8, payload: &[u8]) -> Result<()> {
        let s = self.table.get(session);
        let (addr, foreign, frame) = {
            let data = s.data.lock();
            if data.state != SessionState::Established {
                return Err(KurupiraError::Parse("write on non-established session".into()));
            }
            let addr = data.address.ok_or_else(|| KurupiraError::Parse("session has no address".into()))?;
            let foreign = data.foreign_session.ok_or_else(|| KurupiraError::Parse("session has no foreign session".into()))?;
            let frame = encode_data_frame(&data, foreign, INNER_DATAGRAM, payload)?;
            (addr, foreign, frame)
        };
        let _ = foreign;
        self.host.wire_send(addr, frame.as_bytes())?;
        Ok(())
    }

    /// Blocks until a `DATAGRAM` payload delivered from some session is
    /// available, then copies it into `buf`. Returns the originating
    /// session number and the copied length.
    pub fn read(&self, buf: &mut [u8]) -> Option<(u8, usize)> {
        self.upward.dequeue(buf)
    }

    pub fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> Option<(u8, usize)> {
        self.upward.dequeue_timeout(buf, timeout)
    }

    /// Dispatches one received UDP datagram by its `type[0]` byte. The
    /// embedder's listen loop calls this once per `recvfrom`.
    pub fn handle_datagram(&self, from: SocketAddrV4, raw: &[u8]) {
        if let Err(e) = self.handle_datagram_inner(from, raw) {
            self.set_last_error(&e);
            self.host.event_security_warning(&format!("LP packet from {} dropped: {}", from, e));
        }
    }

    fn handle_datagram_inner(&self, from: SocketAddrV4, raw: &[u8]) -> Result<()> {
        let b = LpBuffer::from_bytes(raw)?;
        let ty = wire::peek_type(&b)?;
        match ty {
            PACKET_CONNECTION_REQUEST => {
                let mut c = 1;
                let req = ConnectionRequest::decode(&b, &mut c)?;
                match handshake::handle_connection_request(&self.table, &self.config.algorithm_lists, req, self.config.max_connections) {
                    Ok((session, ok)) => {
                        self.cache.mark_connecting(from, session);
                        self.table.get(session).data.lock().address = Some(from);
                        let buf = ok.encode()?;
                        self.host.wire_send(from, buf.as_bytes())?;
                    }
                    Err(e) => {
                        self.host.event_security_warning(&format!("rejected CONNECTION_REQUEST from {}: {}", from, e));
                    }
                }
            }
            PACKET_CONNECTION_OK => {
                let mut c = 1;
                let ok = ConnectionOk::decode(&b, &mut c)?;
                let dest = ok.destination_session;
                let kx = handshake::handle_connection_ok(&self.table, ok)?;
                self.cache.mark_active(from, dest);
                self.host.event_session_established(dest, from);
                self.fire_connect(dest);
                let buf = kx.encode()?;
                self.host.wire_send(from, buf.as_bytes())?;
            }
            PACKET_KEY_EXCHANGE => {
                let mut c = 1;
                let kx = KeyExchange::decode(&b, &mut c)?;
                let dest = kx.destination_session;
                handshake::handle_key_exchange(&self.table, kx)?;
                self.cache.mark_active(from, dest);
                self.host.event_session_established(dest, from);
                self.fire_connect(dest);
            }
            PACKET_DATA => {
                let session = wire::session_number(&b)?;
                self.handle_data(session, &b.as_bytes()[2..])?;
            }
            _ => return Err(KurupiraError::Parse(format!("unknown LP packet type {}", ty))),
        }
        Ok(())
    }

    fn fire_connect(&self, session: u8) {
        for f in &self.callbacks.lock().on_connect {
            f(session);
        }
    }

    fn fire_close(&self, session: u8) {
        for f in &self.callbacks.lock().on_close {
            f(session);
        }
    }

    fn handle_data(&self, session: u8, body: &[u8]) -> Result<()> {
        let s = self.table.get(session);
        let inner = {
            let data = s.data.lock();
            if data.state == SessionState::Closed {
                return Err(KurupiraError::Parse("DATA on closed session".into()));
            }
            decode_data_frame(&data, body)?
        };
        let inner = match inner {
            Some(i) => i,
            None => return Err(KurupiraError::Crypto("MAC mismatch".into())),
        };

        {
            let mut data = s.data.lock();
            if data.state != SessionState::CloseWait {
                data.timeout = T_TIMEOUT_TICKS;
            }
            data.silence = 0;
            data.packets_received += 1;
        }

        match inner.inner_type {
            INNER_DATAGRAM => {
                let _ = self.upward.enqueue(session, inner.payload);
            }
            PACKET_KEEP_ALIVE => {}
            PACKET_CLOSE_REQUEST => {
                let verifier_ours = s.data.lock().keys.verifier.clone();
                if inner.payload == verifier_ours {
                    let (addr, foreign) = {
                        let mut data = s.data.lock();
                        data.state = SessionState::TimeWait;
                        data.timeout = T_TIMEOUT_TICKS;
                        (data.address, data.foreign_session)
                    };
                    if let (Some(addr), Some(foreign)) = (addr, foreign) {
                        let data = s.data.lock();
                        let frame = encode_data_frame(&data, foreign, PACKET_CLOSE_OK, &verifier_ours)?;
                        drop(data);
                        self.host.wire_send(addr, frame.as_bytes())?;
                    }
                } else {
                    self.host.event_security_warning("CLOSE_REQUEST with wrong verifier rejected");
                }
            }
            PACKET_CLOSE_OK => {
                let verifier_ours = s.data.lock().keys.verifier.clone();
                let in_close_wait = s.data.lock().state == SessionState::CloseWait;
                if inner.payload == verifier_ours && in_close_wait {
                    self.table.close(session);
                    self.cache.mark_inactive(session);
                    self.fire_close(session);
                }
            }
            PACKET_NODE_HUNT => {
                let addrs = self.cache.sample(self.hunt_result_max());
                let inner_buf = wire::encode_hunt_result(&addrs)?;
                let foreign = s.data.lock().foreign_session;
                if let Some(foreign) = foreign {
                    let data = s.data.lock();
                    let frame = encode_data_frame(&data, foreign, PACKET_HUNT_RESULT, &inner_buf.as_bytes()[1..])?;
                    drop(data);
                    let addr = s.data.lock().address;
                    if let Some(addr) = addr {
                        self.host.wire_send(addr, frame.as_bytes())?;
                    }
                }
            }
            PACKET_HUNT_RESULT => {
                let expired = {
                    let data = s.data.lock();
                    self.host.time_ticks() - data.hunt_time > HUNT_RESULT_GRACE_MS
                };
                if !expired {
                    let mut c = 0usize;
                    let tmp = LpBuffer::from_bytes(&inner.payload)?;
                    if let Ok(addrs) = wire::decode_hunt_result(&tmp, &mut c) {
                        for a in addrs {
                            self.cache.add(a);
                        }
                    }
                }
            }
            other => return Err(KurupiraError::Parse(format!("unknown inner packet type {}", other))),
        }
        Ok(())
    }

    fn hunt_result_max(&self) -> usize {
        (MTU / 6).max(1)
    }

    /// Issues a `NODE_HUNT` to `session` and records the request time so a
    /// stray late `HUNT_RESULT` can be ignored.
    pub fn hunt_for_nodes(&self, session: u8) -> Result<()> {
        let s = self.table.get(session);
        let (addr, foreign, frame) = {
            let mut data = s.data.lock();
            data.hunt_time = self.host.time_ticks();
            let addr = data.address.ok_or_else(|| KurupiraError::Parse("no address".into()))?;
            let foreign = data.foreign_session.ok_or_else(|| KurupiraError::Parse("no foreign session".into()))?;
            let frame = encode_data_frame(&data, foreign, PACKET_NODE_HUNT, &[])?;
            (addr, foreign, frame)
        };
        let _ = foreign;
        self.host.wire_send(addr, frame.as_bytes())?;
        Ok(())
    }

    /// Runs the timeout/silence/monitor ticks once; a real deployment calls
    /// this from three threads parked on `tick_cv` at `TICK_MS` / `MONITOR_TICKS * TICK_MS`.
    pub fn run_one_tick(&self, tick_count: u64) {
        let to_disconnect = scheduler::tick_timeouts(&self.table, &self.cache, self.host.as_ref(), self.config.expiration_ticks);
        for session in to_disconnect {
            let _ = self.disconnect(session);
        }
        let (keepalive, resend_close) = scheduler::tick_silence(&self.table);
        for session in keepalive {
            scheduler::send_keep_alive(&self.table, self.host.as_ref(), session);
        }
        for session in resend_close {
            let s = self.table.get(session);
            let (addr, foreign, verifier) = {
                let data = s.data.lock();
                (data.address, data.foreign_session, data.keys.verifier.clone())
            };
            if let (Some(addr), Some(foreign)) = (addr, foreign) {
                let data = s.data.lock();
                if let Ok(frame) = encode_data_frame(&data, foreign, PACKET_CLOSE_REQUEST, &verifier) {
                    drop(data);
                    let _ = self.host.wire_send(addr, frame.as_bytes());
                }
            }
        }
        if tick_count % MONITOR_TICKS as u64 == 0 {
            let (need_connect, hunt_sessions) = scheduler::tick_monitor(&self.cache, self.config.min_connections, self.active_count());
            if need_connect {
                let _ = self.connect_any();
            }
            for session in hunt_sessions {
                let _ = self.hunt_for_nodes(session);
            }
        }
    }

    /// Spawns the tick thread driving timeouts, keep-alives, and node-hunt
    /// maintenance, parked on `tick_cv` between ticks so [`Self::shutdown`]
    /// wakes it immediately instead of waiting out the last interval. The
    /// listener side (reading datagrams and calling [`Self::handle_datagram`])
    /// is the embedder's loop, since this crate never binds a socket itself.
    pub fn run_scheduler(self: &Arc<Self>) -> std::thread::JoinHandle<()> {
        let this = self.clone();
        std::thread::spawn(move || {
            let mut tick_count: u64 = 0;
            loop {
                if this.finish.load(Ordering::Relaxed) {
                    break;
                }
                this.run_one_tick(tick_count);
                tick_count = tick_count.wrapping_add(1);
                let mut guard = this.tick_mutex.lock();
                this.tick_cv.wait_for(&mut guard, Duration::from_millis(kurupira_util::TICK_MS as u64));
            }
        })
    }

    pub fn shutdown(&self) {
        self.finish.store(true, Ordering::Relaxed);
        self.tick_cv.notify_all();
        self.upward.shut_down();
        let _ = self.cache.flush(&self.config.recent_nodes_file);
    }
}

/// How long a `NODE_HUNT` request stays answerable; a `HUNT_RESULT` arriving
/// after this is assumed to belong to a request we've since forgotten about.
const HUNT_RESULT_GRACE_MS: i64 = 30_000;
