//! LP: authenticated, encrypted, keep-alive-monitored neighbor sessions
//! carried over UDP between directly reachable nodes.

pub mod cache;
pub mod constants;
pub mod dataplane;
pub mod handshake;
pub mod host;
pub mod link;
pub mod scheduler;
pub mod session;
pub mod wire;

pub use cache::NodeCache;
pub use handshake::AlgorithmLists;
pub use host::LinkHost;
pub use link::{Link, LinkConfig};
pub use session::{SessionState, SessionTable};
