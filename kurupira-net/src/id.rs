//! C9: NP identity. The overlay address is the SHA-1 of the owning RSA
//! public key; trust is on first sight, the same as LP has no certificate
//! authority to check against.

use std::path::Path;

use kurupira_crypto::registry::HashDescriptor;
use kurupira_crypto::rsa::{self, IdentityKeyPair};
use kurupira_util::error::Result;

use crate::constants::ID_LENGTH;

pub type PeerId = [u8; ID_LENGTH];

pub fn peer_id_from_public_key(hash: &HashDescriptor, public_der: &[u8]) -> Result<PeerId> {
    let digest = hash.digest_bytes(public_der)?;
    let mut id = [0u8; ID_LENGTH];
    id.copy_from_slice(&digest[..ID_LENGTH]);
    Ok(id)
}

/// Local node identity: our own ID plus the RSA keys backing it, loaded once
/// at startup. `public_der` is cached alongside the parsed key so handshake
/// packets can copy it straight onto the wire without re-serializing.
pub struct LocalIdentity {
    pub id: PeerId,
    pub keys: IdentityKeyPair,
}

impl LocalIdentity {
    pub fn load(hash: &HashDescriptor, public_key_file: &Path, private_key_file: &Path) -> Result<Self> {
        let keys = rsa::load(public_key_file, private_key_file)?;
        let id = peer_id_from_public_key(hash, &keys.public_der)?;
        Ok(Self { id, keys })
    }
}

pub fn format_id(id: &PeerId) -> String {
    id.iter().map(|b| format!("{:02x}", b)).collect()
}
