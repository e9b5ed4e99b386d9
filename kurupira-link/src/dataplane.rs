//! C7: the LP data plane — padding, encryption, MAC, and inner-packet dispatch
//! for everything that isn't handshake traffic.

use openssl::rand::rand_bytes;

use kurupira_crypto::Direction;
use kurupira_util::error::{KurupiraError, Result};

use crate::constants::*;
use crate::session::SessionData;
use crate::wire::LpBuffer;

pub struct InnerPacket {
    pub inner_type: u8,
    pub payload: Vec<u8>,
}

/// Picks a padding length so `inner_packet + 2` bytes (the trailing
/// `padding_length` field) lands on a cipher block boundary, with at least
/// [`MIN_PADDING_LENGTH`] bytes of padding. The null cipher never pads.
fn padding_length(inner_len: usize, block_size: usize, is_null: bool) -> usize {
    if is_null {
        return 0;
    }
    let tail = inner_len + 2 + MIN_PADDING_LENGTH;
    let remainder = tail % block_size;
    if remainder == 0 {
        MIN_PADDING_LENGTH
    } else {
        MIN_PADDING_LENGTH + (block_size - remainder)
    }
}

/// Builds a full outbound `DATA` datagram: encrypts the padded inner packet
/// under `cipher_out_*` and appends a MAC computed with `mac_out_key` over
/// the plaintext. Fails if the assembled datagram would exceed [`MTU`].
pub fn encode_data_frame(data: &SessionData, foreign_session: u8, inner_type: u8, inner_payload: &[u8]) -> Result<LpBuffer> {
    let cipher = data.cipher.ok_or_else(|| KurupiraError::Crypto("no cipher".into()))?;
    let mac = data.mac.ok_or_else(|| KurupiraError::Crypto("no mac".into()))?;

    let inner_len = 1 + inner_payload.len();
    let pad_len = padding_length(inner_len, cipher.block_size.max(1), cipher.is_null());

    let mut plaintext = Vec::with_capacity(pad_len + inner_len + 2);
    let mut padding = vec![0u8; pad_len];
    if pad_len > 0 {
        rand_bytes(&mut padding).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
    }
    plaintext.extend_from_slice(&padding);
    plaintext.push(inner_type);
    plaintext.extend_from_slice(inner_payload);
    plaintext.extend_from_slice(&(pad_len as u16).to_be_bytes());

    let ciphertext = cipher.operate(Direction::Encrypt, &plaintext, &data.keys.cipher_out_key, &data.keys.cipher_out_iv)?;
    let tag = mac.compute(&plaintext, &data.keys.mac_out_key)?;

    if 2 + ciphertext.len() + tag.len() > MTU {
        return Err(KurupiraError::Parse("DATA frame exceeds LP MTU".into()));
    }

    let mut b = LpBuffer::new();
    b.append_u8(PACKET_DATA)?;
    b.append_u8(foreign_session)?;
    b.append_bytes(&ciphertext)?;
    b.append_bytes(&tag)?;
    Ok(b)
}

/// Decrypts and authenticates an inbound `DATA` datagram's ciphertext+MAC
/// tail. `body` is everything after the `type`/`session` header bytes.
/// Returns `None` on MAC mismatch — the caller must drop the packet without
/// otherwise changing session state, per the crypto error-handling rule that
/// a MAC failure must not be usable to induce state transitions.
pub fn decode_data_frame(data: &SessionData, body: &[u8]) -> Result<Option<InnerPacket>> {
    let cipher = data.cipher.ok_or_else(|| KurupiraError::Crypto("no cipher".into()))?;
    let mac = data.mac.ok_or_else(|| KurupiraError::Crypto("no mac".into()))?;

    if body.len() < mac.length {
        return Err(KurupiraError::Parse("DATA frame shorter than MAC".into()));
    }
    let (ciphertext, tag) = body.split_at(body.len() - mac.length);
    let plaintext = cipher.operate(Direction::Decrypt, ciphertext, &data.keys.cipher_in_key, &data.keys.cipher_in_iv)?;

    if !mac.verify(&plaintext, &data.keys.mac_in_key, tag)? {
        return Ok(None);
    }

    if plaintext.len() < 3 {
        return Err(KurupiraError::Parse("DATA plaintext too short".into()));
    }
    let pad_len = u16::from_be_bytes([plaintext[plaintext.len() - 2], plaintext[plaintext.len() - 1]]) as usize;
    if pad_len + 3 > plaintext.len() {
        return Err(KurupiraError::Parse("invalid padding length".into()));
    }
    let inner_type = plaintext[pad_len];
    let payload = plaintext[pad_len + 1..plaintext.len() - 2].to_vec();
    Ok(Some(InnerPacket { inner_type, payload }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurupira_crypto::{find_cipher, find_hash, find_mac, kdf, KdfLabel};
    use crate::session::KeyMaterial;

    fn paired_session() -> SessionData {
        let cipher = find_cipher("blowfish-cbc").unwrap();
        let hash = find_hash("sha1").unwrap();
        let mac = find_mac("sha1-mac").unwrap();
        let z = [7u8; 32];
        let h = [9u8; 16];
        let keys = KeyMaterial {
            cipher_in_key: kdf::derive(&hash, &z, &h, KdfLabel::Key, cipher.key_length).unwrap(),
            cipher_in_iv: kdf::derive(&hash, &z, &h, KdfLabel::Iv, cipher.iv_length).unwrap(),
            cipher_out_key: kdf::derive(&hash, &z, &h, KdfLabel::Key, cipher.key_length).unwrap(),
            cipher_out_iv: kdf::derive(&hash, &z, &h, KdfLabel::Iv, cipher.iv_length).unwrap(),
            mac_in_key: kdf::derive(&hash, &z, &h, KdfLabel::Mac, mac.key_length).unwrap(),
            mac_out_key: kdf::derive(&hash, &z, &h, KdfLabel::Mac, mac.key_length).unwrap(),
            verifier: hash.digest_bytes(&z).unwrap(),
        };
        SessionData { cipher: Some(cipher), hash: Some(hash), mac: Some(mac), keys, ..SessionData::default() }
    }

    #[test]
    fn round_trips_inner_payload() {
        let data = paired_session();
        let frame = encode_data_frame(&data, 3, INNER_DATAGRAM, b"hello").unwrap();
        let body = &frame.as_bytes()[2..];
        let inner = decode_data_frame(&data, body).unwrap().unwrap();
        assert_eq!(inner.inner_type, INNER_DATAGRAM);
        assert_eq!(inner.payload, b"hello");
    }

    #[test]
    fn tampered_mac_is_rejected() {
        let data = paired_session();
        let frame = encode_data_frame(&data, 3, INNER_DATAGRAM, b"hello").unwrap();
        let mut body = frame.as_bytes()[2..].to_vec();
        *body.last_mut().unwrap() ^= 0xFF;
        assert!(decode_data_frame(&data, &body).unwrap().is_none());
    }
}
