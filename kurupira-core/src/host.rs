//! `Host: LinkHost + NetHost` mirrors `Interface: SystemInterface +
//! SwitchInterface` in the teacher: one trait an embedder implements once to
//! satisfy both the neighbor layer and the overlay layer.

pub trait Host: kurupira_link::LinkHost + kurupira_net::NetHost {}

impl<T: kurupira_link::LinkHost + kurupira_net::NetHost> Host for T {}
