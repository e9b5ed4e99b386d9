//! Kurupira: an anonymizing peer-to-peer overlay built from two protocol
//! engines — LP (`kurupira-link`), authenticated neighbor sessions over UDP,
//! and NP (`kurupira-net`), ID-addressed routing with end-to-end crypto
//! carried as LP `DATAGRAM` payloads. `Kurupira<H: Host>` is the thin
//! delegating facade over both, directly modeled on
//! `NetworkHypervisor<I: Interface>` owning `vl1`/`vl2`.

pub mod config;
pub mod host;

use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kurupira_link::Link;
use kurupira_net::{wire::MAX_NP_PACKET, Net, PeerId};
use kurupira_util::error::Result;

pub use config::CoreConfig;
pub use host::Host;

/// Owns one LP engine and one NP engine. LP and NP don't call into each
/// other directly (neither crate depends on the other), so unlike
/// `NetworkHypervisor`'s single `wire_receive` the facade also pumps LP's
/// delivered `DATAGRAM`s over to NP's `receive` — see [`Self::pump_np_once`].
pub struct Kurupira<H: Host> {
    link: Arc<Link<H>>,
    net: Arc<Net<H>>,
    tick_count: AtomicU64,
    finish: AtomicBool,
}

impl<H: Host + 'static> Kurupira<H> {
    pub fn new(host: Arc<H>, config: &CoreConfig) -> Result<Self> {
        let link = Arc::new(Link::new(host.clone(), config.link_config()));
        link.load_node_cache()?;
        let net = Arc::new(Net::new(host.clone(), config.net_config())?);
        Ok(Self { link, net, tick_count: AtomicU64::new(0), finish: AtomicBool::new(false) })
    }

    #[inline(always)]
    pub fn link(&self) -> &Arc<Link<H>> {
        &self.link
    }

    #[inline(always)]
    pub fn net(&self) -> &Arc<Net<H>> {
        &self.net
    }

    #[inline(always)]
    pub fn id(&self) -> &PeerId {
        self.net.id()
    }

    /// Runs one round of LP's timeout/silence/keep-alive/node-hunt
    /// maintenance. Returns how long the caller should wait before calling
    /// again, matching `NetworkHypervisor::do_background_tasks`'s contract.
    #[inline(always)]
    pub fn do_background_tasks(&self) -> Duration {
        let tick = self.tick_count.fetch_add(1, Ordering::Relaxed);
        self.link.run_one_tick(tick);
        Duration::from_millis(kurupira_util::TICK_MS as u64)
    }

    /// Hands one received UDP datagram to LP.
    #[inline(always)]
    pub fn wire_receive(&self, from: SocketAddrV4, data: &[u8]) {
        self.link.handle_datagram(from, data);
    }

    /// Pulls one `DATAGRAM` LP has delivered and hands it to NP for routing.
    /// Returns `false` on timeout or shutdown. A deployment runs this in a
    /// loop on its own thread, alongside [`kurupira_link::Link::run_scheduler`].
    pub fn pump_np_once(&self, timeout: Duration) -> bool {
        let mut buf = [0u8; MAX_NP_PACKET];
        match self.link.read_timeout(&mut buf, timeout) {
            Some((session, n)) => {
                self.net.receive(session, &buf[..n]);
                true
            }
            None => false,
        }
    }

    /// Spawns LP's scheduler thread plus a dispatch thread pumping LP
    /// `DATAGRAM`s into NP, returning both handles so the embedder can join
    /// on clean shutdown.
    pub fn run(self: &Arc<Self>) -> (std::thread::JoinHandle<()>, std::thread::JoinHandle<()>) {
        let scheduler = self.link.run_scheduler();
        let this = self.clone();
        let dispatch = std::thread::spawn(move || {
            while !this.finish.load(Ordering::Relaxed) {
                this.pump_np_once(Duration::from_millis(kurupira_util::TICK_MS as u64));
            }
        });
        (scheduler, dispatch)
    }

    pub fn shutdown(&self) {
        self.finish.store(true, Ordering::Relaxed);
        self.link.shutdown();
        self.net.shutdown();
    }
}
