//! Host callback surface NP needs from whatever embeds it. NP never binds a
//! socket of its own: every NP frame leaves as the payload of an LP
//! `DATAGRAM`, so the embedder's job is to route `lp_send`/`lp_broadcast`
//! onto the right `Link<H>` session numbers. Mirrors `kurupira_link::LinkHost`
//! in shape, the way `SwitchInterface` sits next to `SystemInterface` in the
//! teacher.

pub trait NetHost: Send + Sync {
    /// Hands `frame` (an encoded NP packet) to LP for delivery as a
    /// `DATAGRAM` over the neighbor session `lp_session`.
    fn lp_send(&self, lp_session: u8, frame: &[u8]) -> std::io::Result<()>;

    /// All currently active LP session numbers, for `Route::Broadcast`.
    fn lp_active_sessions(&self) -> Vec<u8>;

    /// Monotonic milliseconds, shared with LP's time base.
    fn time_ticks(&self) -> i64 {
        kurupira_util::time_ticks()
    }

    /// An NP handshake with `peer` reached `Connected`.
    fn event_peer_connected(&self, _peer: &crate::id::PeerId) {}

    /// Something worth a human's attention happened but isn't fatal.
    fn event_security_warning(&self, message: &str) {
        eprintln!("WARNING: {}", message);
    }
}
