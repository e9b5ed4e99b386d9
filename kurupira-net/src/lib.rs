//! NP: ID-addressed overlay routing with end-to-end crypto, learned-history
//! routing over whatever LP neighbor sessions exist, and duplicate
//! suppression so a broadcast doesn't loop the mesh forever.

pub mod collision;
pub mod constants;
pub mod dataplane;
pub mod handshake;
pub mod history;
pub mod host;
pub mod id;
pub mod keystore;
pub mod net;
pub mod router;
pub mod routing;
pub mod wire;

pub use handshake::NpAlgorithmLists;
pub use host::NetHost;
pub use id::{LocalIdentity, PeerId};
pub use net::{Net, NetConfig};
pub use router::Route;
pub use routing::RoutingTable;
