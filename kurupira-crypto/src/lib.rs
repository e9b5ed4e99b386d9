pub mod dh;
pub mod kdf;
pub mod registry;
pub mod rsa;

pub use dh::{generate as dh_generate, shared_secret as dh_shared_secret};
pub use kdf::{derive as kdf_derive, Label as KdfLabel};
pub use registry::{find_cipher, find_hash, find_mac, negotiate, parse_list, CipherDescriptor, Direction, HashDescriptor, MacDescriptor};
