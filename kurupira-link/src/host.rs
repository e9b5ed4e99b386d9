use std::net::SocketAddrV4;

/// Host callback surface LP needs from whatever embeds it: wire I/O, a time
/// source, and event notification. Modeled on `SystemInterface` — the engine
/// never logs through a logging crate, it calls back into the host so the
/// embedder decides where events go.
pub trait LinkHost: Send + Sync {
    fn wire_send(&self, addr: SocketAddrV4, data: &[u8]) -> std::io::Result<()>;

    /// Monotonic milliseconds, the time base session tick counters are compared against.
    fn time_ticks(&self) -> i64 {
        kurupira_util::time_ticks()
    }

    /// A session finished its DH handshake and moved to `Established`.
    fn event_session_established(&self, _session: u8, _addr: SocketAddrV4) {}

    /// A session closed, gracefully or otherwise.
    fn event_session_closed(&self, _session: u8) {}

    /// Something worth a human's attention happened but isn't fatal: a MAC
    /// mismatch, a version downgrade, a malformed packet.
    fn event_security_warning(&self, message: &str) {
        eprintln!("WARNING: {}", message);
    }
}
