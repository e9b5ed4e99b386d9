use std::path::Path;

use kurupira_util::error::{KurupiraError, Result};
use openssl::pkey::{Private, Public};
use openssl::rsa::Rsa;

/// An RSA keypair loaded from the disk paths named in the NP identity config
/// (`public_key_file`, `private_key_file`). Peer IDs are derived from
/// `public_der`, never recomputed from the private key, so a node whose
/// private key file is unreadable but whose public key is known can still be
/// addressed.
pub struct IdentityKeyPair {
    pub public: Rsa<Public>,
    pub private: Option<Rsa<Private>>,
    pub public_der: Vec<u8>,
}

pub fn load(public_key_file: &Path, private_key_file: &Path) -> Result<IdentityKeyPair> {
    let public_pem = std::fs::read(public_key_file)?;
    let public = Rsa::public_key_from_pem(&public_pem).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
    let public_der = public.public_key_to_der().map_err(|e| KurupiraError::Crypto(e.to_string()))?;

    let private = match std::fs::read(private_key_file) {
        Ok(pem) => Some(Rsa::private_key_from_pem(&pem).map_err(|e| KurupiraError::Crypto(e.to_string()))?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    Ok(IdentityKeyPair { public, private, public_der })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keypair_round_trips_through_der() {
        let rsa = Rsa::generate(2048).unwrap();
        let public_pem = rsa.public_key_to_pem().unwrap();
        let der_direct = rsa.public_key_to_der().unwrap();
        let reloaded = Rsa::public_key_from_pem(&public_pem).unwrap();
        assert_eq!(reloaded.public_key_to_der().unwrap(), der_direct);
    }
}
