use kurupira_util::error::{KurupiraError, Result};
use openssl::hash::{hash, MessageDigest};
use openssl::pkey::PKey;
use openssl::sign::Signer;
use openssl::symm::{Cipher as SslCipher, Crypter, Mode};

#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// A named, fixed-length-field cipher. `"none"` is the distinguished null
/// cipher: a session negotiated onto it is marked unencrypted and `operate`
/// is the identity function.
#[derive(Copy, Clone)]
pub struct CipherDescriptor {
    pub name: &'static str,
    pub key_length: usize,
    pub iv_length: usize,
    pub block_size: usize,
}

impl CipherDescriptor {
    pub fn is_null(&self) -> bool {
        self.name == "none"
    }

    fn ssl_cipher(&self) -> Option<SslCipher> {
        match self.name {
            "blowfish-cbc" => Some(SslCipher::bf_cbc()),
            _ => None,
        }
    }

    pub fn operate(&self, dir: Direction, input: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
        if self.is_null() {
            return Ok(input.to_vec());
        }
        let cipher = self.ssl_cipher().ok_or_else(|| KurupiraError::Crypto(format!("unknown cipher {}", self.name)))?;
        let mode = match dir {
            Direction::Encrypt => Mode::Encrypt,
            Direction::Decrypt => Mode::Decrypt,
        };
        let mut crypter = Crypter::new(cipher, mode, key, Some(iv)).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
        crypter.pad(false);
        let mut out = vec![0u8; input.len() + self.block_size];
        let mut count = crypter.update(input, &mut out).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
        count += crypter.finalize(&mut out[count..]).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
        out.truncate(count);
        Ok(out)
    }
}

#[derive(Copy, Clone)]
pub struct HashDescriptor {
    pub name: &'static str,
    pub length: usize,
}

impl HashDescriptor {
    fn digest(&self) -> Option<MessageDigest> {
        match self.name {
            "sha1" => Some(MessageDigest::sha1()),
            _ => None,
        }
    }

    pub fn digest_bytes(&self, input: &[u8]) -> Result<Vec<u8>> {
        let md = self.digest().ok_or_else(|| KurupiraError::Crypto(format!("unknown hash {}", self.name)))?;
        hash(md, input).map(|d| d.to_vec()).map_err(|e| KurupiraError::Crypto(e.to_string()))
    }
}

#[derive(Copy, Clone)]
pub struct MacDescriptor {
    pub name: &'static str,
    pub key_length: usize,
    pub length: usize,
}

impl MacDescriptor {
    fn digest(&self) -> Option<MessageDigest> {
        match self.name {
            "sha1-mac" => Some(MessageDigest::sha1()),
            _ => None,
        }
    }

    pub fn compute(&self, input: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        let md = self.digest().ok_or_else(|| KurupiraError::Crypto(format!("unknown mac {}", self.name)))?;
        let pkey = PKey::hmac(key).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
        let mut signer = Signer::new(md, &pkey).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
        signer.update(input).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
        signer.sign_to_vec().map_err(|e| KurupiraError::Crypto(e.to_string()))
    }

    /// Constant-time compare, used by the data plane to check inbound MACs
    /// without leaking timing information about where the mismatch occurred.
    pub fn verify(&self, input: &[u8], key: &[u8], candidate: &[u8]) -> Result<bool> {
        let expected = self.compute(input, key)?;
        if expected.len() != candidate.len() {
            return Ok(false);
        }
        let mut diff = 0u8;
        for (a, b) in expected.iter().zip(candidate.iter()) {
            diff |= a ^ b;
        }
        Ok(diff == 0)
    }
}

pub const CIPHERS: &[CipherDescriptor] = &[
    CipherDescriptor { name: "blowfish-cbc", key_length: 16, iv_length: 8, block_size: 8 },
    CipherDescriptor { name: "none", key_length: 0, iv_length: 0, block_size: 1 },
];

pub const HASHES: &[HashDescriptor] = &[HashDescriptor { name: "sha1", length: 20 }];

pub const MACS: &[MacDescriptor] = &[MacDescriptor { name: "sha1-mac", key_length: 20, length: 20 }];

pub fn find_cipher(name: &str) -> Option<CipherDescriptor> {
    CIPHERS.iter().copied().find(|c| c.name == name)
}

pub fn find_hash(name: &str) -> Option<HashDescriptor> {
    HASHES.iter().copied().find(|h| h.name == name)
}

pub fn find_mac(name: &str) -> Option<MacDescriptor> {
    MACS.iter().copied().find(|m| m.name == name)
}

/// Parses a semicolon-separated algorithm list as sent on the wire in a
/// `CONNECTION_REQUEST`/`PUBLIC_KEY_REQUEST`-style packet.
pub fn parse_list(s: &str) -> Vec<&str> {
    s.split(';').filter(|p| !p.is_empty()).collect()
}

/// The responder side of algorithm negotiation: the first name in the
/// initiator's list that also appears in our configured list wins. Returns
/// `None` if no name matches, at which point the caller drops the connection.
pub fn negotiate<'a>(initiator_list: &'a [&'a str], local_list: &[&str]) -> Option<&'a str> {
    initiator_list.iter().copied().find(|name| local_list.contains(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_cipher_is_identity() {
        let c = find_cipher("none").unwrap();
        let out = c.operate(Direction::Encrypt, b"hello", &[], &[]).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn negotiation_picks_first_shared_name() {
        let initiator = parse_list("aes-cbc;blowfish-cbc;none");
        let local = parse_list("blowfish-cbc;none");
        assert_eq!(negotiate(&initiator, &local), Some("blowfish-cbc"));
    }

    #[test]
    fn negotiation_fails_with_no_overlap() {
        let initiator = parse_list("aes-cbc");
        let local = parse_list("blowfish-cbc");
        assert_eq!(negotiate(&initiator, &local), None);
    }

    #[test]
    fn blowfish_round_trips() {
        let c = find_cipher("blowfish-cbc").unwrap();
        let key = [1u8; 16];
        let iv = [2u8; 8];
        let pt = b"0123456701234567";
        let ct = c.operate(Direction::Encrypt, pt, &key, &iv).unwrap();
        let back = c.operate(Direction::Decrypt, &ct, &key, &iv).unwrap();
        assert_eq!(&back[..pt.len()], pt);
    }

    #[test]
    fn mac_verify_rejects_tampered_input() {
        let m = find_mac("sha1-mac").unwrap();
        let key = [3u8; 20];
        let tag = m.compute(b"payload", &key).unwrap();
        assert!(m.verify(b"payload", &key, &tag).unwrap());
        assert!(!m.verify(b"payloae", &key, &tag).unwrap());
    }
}
