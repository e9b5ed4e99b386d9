//! C13 (data half): encrypt+MAC outbound NP `DATA` content, verify+decrypt
//! inbound, with the same padding-to-block-boundary scheme
//! `kurupira_link::dataplane` uses for LP, sized against [`LIBFREEDOM_FTU`]
//! instead of LP's own MTU since an NP frame travels as the payload of one
//! LP `DATAGRAM`.

use openssl::rand::rand_bytes;

use kurupira_crypto::{CipherDescriptor, Direction, MacDescriptor};
use kurupira_util::error::{KurupiraError, Result};

use crate::constants::*;
use crate::keystore::KeyMaterial;
use crate::wire::NpHeader;

pub struct DecodedData {
    pub protocol: u8,
    pub timestamp: u16,
    pub payload: Vec<u8>,
}

fn padding_length(fixed_len: usize, block_size: usize, is_null: bool) -> usize {
    if is_null {
        return 0;
    }
    let tail = fixed_len + 2 + LNP_MIN_PADDING_LENGTH;
    let remainder = tail % block_size;
    if remainder == 0 {
        LNP_MIN_PADDING_LENGTH
    } else {
        LNP_MIN_PADDING_LENGTH + (block_size - remainder)
    }
}

/// Builds the encrypted-content + MAC tail of a `DATA` packet (everything
/// after the NP header). Refuses with [`KurupiraError::Capacity`] if the
/// resulting frame, plus `header`'s encoded size, wouldn't leave room for at
/// least [`LNP_MIN_PADDING_LENGTH`] bytes of padding within
/// [`LIBFREEDOM_FTU`].
pub fn encode_data_content(
    header: &NpHeader,
    cipher: &CipherDescriptor,
    mac: &MacDescriptor,
    keys: &KeyMaterial,
    protocol: u8,
    timestamp: u16,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let header_len = 1 + 1 + ID_LENGTH + ID_LENGTH + 1;
    let fixed_len = 1 + 2 + payload.len();
    let pad_len = padding_length(fixed_len, cipher.block_size.max(1), cipher.is_null());

    let budget = LIBFREEDOM_FTU.saturating_sub(header_len).saturating_sub(mac.length);
    let total_plaintext = pad_len + fixed_len + 2;
    if total_plaintext > budget || pad_len < LNP_MIN_PADDING_LENGTH && !cipher.is_null() {
        return Err(KurupiraError::Capacity("NP DATA frame too large for LIBFREEDOM_FTU".into()));
    }

    let mut plaintext = Vec::with_capacity(total_plaintext);
    let mut padding = vec![0u8; pad_len];
    if pad_len > 0 {
        rand_bytes(&mut padding).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
    }
    plaintext.extend_from_slice(&padding);
    plaintext.push(protocol);
    plaintext.extend_from_slice(&timestamp.to_be_bytes());
    plaintext.extend_from_slice(payload);
    plaintext.extend_from_slice(&(pad_len as u16).to_be_bytes());

    let ciphertext = cipher.operate(Direction::Encrypt, &plaintext, &keys.cipher_out_key, &keys.cipher_out_iv)?;
    let tag = mac.compute(&plaintext, &keys.mac_out_key)?;

    let mut out = Vec::with_capacity(ciphertext.len() + tag.len());
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(&tag);
    let _ = header;
    Ok(out)
}

/// Decrypts and authenticates a `DATA` packet's content tail. Returns `None`
/// on MAC mismatch without touching any state, mirroring LP's rule that a
/// crypto failure must not be usable to induce a state transition.
pub fn decode_data_content(cipher: &CipherDescriptor, mac: &MacDescriptor, keys: &KeyMaterial, body: &[u8]) -> Result<Option<DecodedData>> {
    if body.len() < mac.length {
        return Err(KurupiraError::Parse("NP DATA content shorter than MAC".into()));
    }
    let (ciphertext, tag) = body.split_at(body.len() - mac.length);
    let plaintext = cipher.operate(Direction::Decrypt, ciphertext, &keys.cipher_in_key, &keys.cipher_in_iv)?;

    if !mac.verify(&plaintext, &keys.mac_in_key, tag)? {
        return Ok(None);
    }

    if plaintext.len() < 5 {
        return Err(KurupiraError::Parse("NP DATA plaintext too short".into()));
    }
    let pad_len = u16::from_be_bytes([plaintext[plaintext.len() - 2], plaintext[plaintext.len() - 1]]) as usize;
    if pad_len + 5 > plaintext.len() {
        return Err(KurupiraError::Parse("invalid NP padding length".into()));
    }
    let protocol = plaintext[pad_len];
    let timestamp = u16::from_be_bytes([plaintext[pad_len + 1], plaintext[pad_len + 2]]);
    let payload = plaintext[pad_len + 3..plaintext.len() - 2].to_vec();
    Ok(Some(DecodedData { protocol, timestamp, payload }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurupira_crypto::{find_cipher, find_hash, find_mac, kdf, KdfLabel};

    fn paired_keys() -> (CipherDescriptor, MacDescriptor, KeyMaterial) {
        let cipher = find_cipher("blowfish-cbc").unwrap();
        let hash = find_hash("sha1").unwrap();
        let mac = find_mac("sha1-mac").unwrap();
        let z = [11u8; 32];
        let h = [1u8; 16];
        let keys = KeyMaterial {
            cipher_in_key: kdf::derive(&hash, &z, &h, KdfLabel::Key, cipher.key_length).unwrap(),
            cipher_in_iv: kdf::derive(&hash, &z, &h, KdfLabel::Iv, cipher.iv_length).unwrap(),
            cipher_out_key: kdf::derive(&hash, &z, &h, KdfLabel::Key, cipher.key_length).unwrap(),
            cipher_out_iv: kdf::derive(&hash, &z, &h, KdfLabel::Iv, cipher.iv_length).unwrap(),
            mac_in_key: kdf::derive(&hash, &z, &h, KdfLabel::Mac, mac.key_length).unwrap(),
            mac_out_key: kdf::derive(&hash, &z, &h, KdfLabel::Mac, mac.key_length).unwrap(),
        };
        (cipher, mac, keys)
    }

    fn header() -> NpHeader {
        NpHeader { packet_type: PACKET_DATA, ttl: 16, source: [1; ID_LENGTH], destination: [2; ID_LENGTH], flags: 0 }
    }

    #[test]
    fn round_trips_payload_protocol_and_timestamp() {
        let (cipher, mac, keys) = paired_keys();
        let content = encode_data_content(&header(), &cipher, &mac, &keys, PROTOCOL_UNRELIABLE, 42, b"hello").unwrap();
        let decoded = decode_data_content(&cipher, &mac, &keys, &content).unwrap().unwrap();
        assert_eq!(decoded.protocol, PROTOCOL_UNRELIABLE);
        assert_eq!(decoded.timestamp, 42);
        assert_eq!(decoded.payload, b"hello");
    }

    #[test]
    fn tampered_mac_is_rejected() {
        let (cipher, mac, keys) = paired_keys();
        let mut content = encode_data_content(&header(), &cipher, &mac, &keys, PROTOCOL_RELIABLE, 1, b"x").unwrap();
        *content.last_mut().unwrap() ^= 0xFF;
        assert!(decode_data_content(&cipher, &mac, &keys, &content).unwrap().is_none());
    }

    #[test]
    fn oversized_payload_is_refused() {
        let (cipher, mac, keys) = paired_keys();
        let huge = vec![0u8; LIBFREEDOM_FTU];
        assert!(encode_data_content(&header(), &cipher, &mac, &keys, PROTOCOL_UNRELIABLE, 0, &huge).is_err());
    }
}
