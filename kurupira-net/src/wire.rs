//! Encode/decode of the NP packet types from Section 4.12/4.13's wire
//! layouts. Every NP packet shares a common header (type, TTL, source ID,
//! destination ID, flags) ahead of its type-specific content, mirroring how
//! `kurupira-link::wire` composes LP packets from the same `Buffer` cursor.

use kurupira_util::buffer::Buffer;
use kurupira_util::error::Result;

use crate::constants::*;
use crate::id::PeerId;

/// Upper bound on an encoded NP packet; sized to fit comfortably inside
/// [`LIBFREEDOM_FTU`] once LP's own framing and MAC are added on top.
pub const MAX_NP_PACKET: usize = 1024;

pub type NpBuffer = Buffer<MAX_NP_PACKET>;

#[derive(Copy, Clone, Debug)]
pub struct NpHeader {
    pub packet_type: u8,
    pub ttl: u8,
    pub source: PeerId,
    pub destination: PeerId,
    pub flags: u8,
}

impl NpHeader {
    pub fn encode(&self, b: &mut NpBuffer) -> Result<()> {
        b.append_u8(self.packet_type)?;
        b.append_u8(self.ttl)?;
        b.append_bytes(&self.source)?;
        b.append_bytes(&self.destination)?;
        b.append_u8(self.flags)?;
        Ok(())
    }

    pub fn decode(b: &NpBuffer, cursor: &mut usize) -> Result<Self> {
        let packet_type = b.read_u8(cursor)?;
        let ttl = b.read_u8(cursor)?;
        let source = b.read_bytes_fixed::<ID_LENGTH>(cursor)?;
        let destination = b.read_bytes_fixed::<ID_LENGTH>(cursor)?;
        let flags = b.read_u8(cursor)?;
        Ok(Self { packet_type, ttl, source, destination, flags })
    }
}

/// `PUBLIC_KEY_REQUEST`: the initiator's half of the NP handshake.
pub struct PublicKeyRequest {
    pub header: NpHeader,
    pub major: u8,
    pub minor: u8,
    pub transmission_mode: TransmissionMode,
    pub public_key: Vec<u8>,
}

impl PublicKeyRequest {
    pub fn encode(&self) -> Result<NpBuffer> {
        let mut b = NpBuffer::new();
        self.header.encode(&mut b)?;
        b.append_u8(self.major)?;
        b.append_u8(self.minor)?;
        b.append_u8(self.transmission_mode as u8)?;
        b.append_mpint(&self.public_key)?;
        Ok(b)
    }

    pub fn decode(b: &NpBuffer, header: NpHeader, cursor: &mut usize) -> Result<Self> {
        let major = b.read_u8(cursor)?;
        let minor = b.read_u8(cursor)?;
        let mode_byte = b.read_u8(cursor)?;
        let transmission_mode = if mode_byte == TransmissionMode::Broadcast as u8 { TransmissionMode::Broadcast } else { TransmissionMode::Unicast };
        let (_, public_key) = b.read_mpint(cursor)?;
        Ok(Self { header, major, minor, transmission_mode, public_key })
    }
}

/// `PUBLIC_KEY_RESPONSE`: responder's public key plus its half of the shared
/// key material. The field carrying `k_out` is named `encrypted_k` on the
/// wire to match the original layout even though this implementation (like
/// the one it's grounded on) transmits it unwrapped — see DESIGN.md for the
/// preserved-but-unimplemented asymmetric-wrap hook.
pub struct PublicKeyResponse {
    pub header: NpHeader,
    pub public_key: Vec<u8>,
    pub encrypted_k: [u8; K_LENGTH],
}

impl PublicKeyResponse {
    pub fn encode(&self) -> Result<NpBuffer> {
        let mut b = NpBuffer::new();
        self.header.encode(&mut b)?;
        b.append_mpint(&self.public_key)?;
        b.append_bytes(&self.encrypted_k)?;
        Ok(b)
    }

    pub fn decode(b: &NpBuffer, header: NpHeader, cursor: &mut usize) -> Result<Self> {
        let (_, public_key) = b.read_mpint(cursor)?;
        let encrypted_k = b.read_bytes_fixed::<K_LENGTH>(cursor)?;
        Ok(Self { header, public_key, encrypted_k })
    }
}

/// `KEY_EXCHANGE`: algorithm lists plus the responder's `k` echoed back and
/// the initiator's own freshly generated `k`.
pub struct KeyExchange {
    pub header: NpHeader,
    pub cipher_list: String,
    pub hash_list: String,
    pub mac_list: String,
    pub k_echo: [u8; K_LENGTH],
    pub k_new: [u8; K_LENGTH],
}

impl KeyExchange {
    pub fn encode(&self) -> Result<NpBuffer> {
        let mut b = NpBuffer::new();
        self.header.encode(&mut b)?;
        b.append_string(&self.cipher_list)?;
        b.append_string(&self.hash_list)?;
        b.append_string(&self.mac_list)?;
        b.append_bytes(&self.k_echo)?;
        b.append_bytes(&self.k_new)?;
        Ok(b)
    }

    pub fn decode(b: &NpBuffer, header: NpHeader, cursor: &mut usize) -> Result<Self> {
        let cipher_list = b.read_string(cursor)?;
        let hash_list = b.read_string(cursor)?;
        let mac_list = b.read_string(cursor)?;
        let k_echo = b.read_bytes_fixed::<K_LENGTH>(cursor)?;
        let k_new = b.read_bytes_fixed::<K_LENGTH>(cursor)?;
        Ok(Self { header, cipher_list, hash_list, mac_list, k_echo, k_new })
    }
}

/// `KEY_EXCHANGE_OK`: chosen algorithms and the initiator's `k` echoed back
/// to prove both sides agree on the same material.
pub struct KeyExchangeOk {
    pub header: NpHeader,
    pub cipher: String,
    pub hash: String,
    pub mac: String,
    pub k_echo: [u8; K_LENGTH],
}

impl KeyExchangeOk {
    pub fn encode(&self) -> Result<NpBuffer> {
        let mut b = NpBuffer::new();
        self.header.encode(&mut b)?;
        b.append_string(&self.cipher)?;
        b.append_string(&self.hash)?;
        b.append_string(&self.mac)?;
        b.append_bytes(&self.k_echo)?;
        Ok(b)
    }

    pub fn decode(b: &NpBuffer, header: NpHeader, cursor: &mut usize) -> Result<Self> {
        let cipher = b.read_string(cursor)?;
        let hash = b.read_string(cursor)?;
        let mac = b.read_string(cursor)?;
        let k_echo = b.read_bytes_fixed::<K_LENGTH>(cursor)?;
        Ok(Self { header, cipher, hash, mac, k_echo })
    }
}

/// Peeks the header without consuming it from a fresh cursor, so the caller
/// can dispatch on `packet_type` before picking which decoder to run.
pub fn peek_header(b: &NpBuffer) -> Result<NpHeader> {
    let mut c = 0usize;
    NpHeader::decode(b, &mut c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(packet_type: u8) -> NpHeader {
        NpHeader { packet_type, ttl: 16, source: [1; ID_LENGTH], destination: [2; ID_LENGTH], flags: 0 }
    }

    #[test]
    fn public_key_request_round_trips() {
        let req = PublicKeyRequest { header: header(PACKET_PUBLIC_KEY_REQUEST), major: 1, minor: 0, transmission_mode: TransmissionMode::Broadcast, public_key: vec![9, 8, 7] };
        let buf = req.encode().unwrap();
        let mut c = 0usize;
        let hdr = NpHeader::decode(&buf, &mut c).unwrap();
        let back = PublicKeyRequest::decode(&buf, hdr, &mut c).unwrap();
        assert_eq!(back.public_key, vec![9, 8, 7]);
        assert_eq!(back.transmission_mode, TransmissionMode::Broadcast);
        assert_eq!(back.header.source, [1; ID_LENGTH]);
    }

    #[test]
    fn key_exchange_ok_round_trips() {
        let ok = KeyExchangeOk { header: header(PACKET_KEY_EXCHANGE_OK), cipher: "blowfish-cbc".into(), hash: "sha1".into(), mac: "sha1-mac".into(), k_echo: [5u8; K_LENGTH] };
        let buf = ok.encode().unwrap();
        let mut c = 0usize;
        let hdr = NpHeader::decode(&buf, &mut c).unwrap();
        let back = KeyExchangeOk::decode(&buf, hdr, &mut c).unwrap();
        assert_eq!(back.cipher, "blowfish-cbc");
        assert_eq!(back.k_echo, [5u8; K_LENGTH]);
    }
}
