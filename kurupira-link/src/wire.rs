//! Encode/decode of the LP packet types from Section 4.6/4.7's wire layouts.

use kurupira_util::buffer::Buffer;
use kurupira_util::error::{KurupiraError, Result};

use crate::constants::*;

pub type LpBuffer = Buffer<MTU>;

pub struct ConnectionRequest {
    pub major: u8,
    pub minor: u8,
    pub initiator_session: u8,
    pub cipher_list: String,
    pub hash_list: String,
    pub mac_list: String,
    pub h: [u8; 16],
}

impl ConnectionRequest {
    pub fn encode(&self) -> Result<LpBuffer> {
        let mut b = LpBuffer::new();
        b.append_u8(PACKET_CONNECTION_REQUEST)?;
        b.append_u8(self.major)?;
        b.append_u8(self.minor)?;
        b.append_u8(self.initiator_session)?;
        b.append_string(&self.cipher_list)?;
        b.append_string(&self.hash_list)?;
        b.append_string(&self.mac_list)?;
        b.append_bytes(&self.h)?;
        Ok(b)
    }

    pub fn decode(b: &LpBuffer, cursor: &mut usize) -> Result<Self> {
        let major = b.read_u8(cursor)?;
        let minor = b.read_u8(cursor)?;
        let initiator_session = b.read_u8(cursor)?;
        let cipher_list = b.read_string(cursor)?;
        let hash_list = b.read_string(cursor)?;
        let mac_list = b.read_string(cursor)?;
        let h = b.read_bytes_fixed::<16>(cursor)?;
        Ok(Self { major, minor, initiator_session, cipher_list, hash_list, mac_list, h })
    }
}

pub struct ConnectionOk {
    pub destination_session: u8,
    pub source_session: u8,
    pub cipher: String,
    pub hash: String,
    pub mac: String,
    pub h: [u8; 16],
    pub y: Vec<u8>,
}

impl ConnectionOk {
    pub fn encode(&self) -> Result<LpBuffer> {
        let mut b = LpBuffer::new();
        b.append_u8(PACKET_CONNECTION_OK)?;
        b.append_u8(self.destination_session)?;
        b.append_u8(self.source_session)?;
        b.append_string(&self.cipher)?;
        b.append_string(&self.hash)?;
        b.append_string(&self.mac)?;
        b.append_bytes(&self.h)?;
        b.append_mpint(&self.y)?;
        Ok(b)
    }

    pub fn decode(b: &LpBuffer, cursor: &mut usize) -> Result<Self> {
        let destination_session = b.read_u8(cursor)?;
        let source_session = b.read_u8(cursor)?;
        let cipher = b.read_string(cursor)?;
        let hash = b.read_string(cursor)?;
        let mac = b.read_string(cursor)?;
        let h = b.read_bytes_fixed::<16>(cursor)?;
        let (_, y) = b.read_mpint(cursor)?;
        Ok(Self { destination_session, source_session, cipher, hash, mac, h, y })
    }
}

pub struct KeyExchange {
    pub destination_session: u8,
    pub y: Vec<u8>,
}

impl KeyExchange {
    pub fn encode(&self) -> Result<LpBuffer> {
        let mut b = LpBuffer::new();
        b.append_u8(PACKET_KEY_EXCHANGE)?;
        b.append_u8(self.destination_session)?;
        b.append_mpint(&self.y)?;
        Ok(b)
    }

    pub fn decode(b: &LpBuffer, cursor: &mut usize) -> Result<Self> {
        let destination_session = b.read_u8(cursor)?;
        let (_, y) = b.read_mpint(cursor)?;
        Ok(Self { destination_session, y })
    }
}

/// The `type[0]` discriminator every LP datagram starts with.
pub fn peek_type(b: &LpBuffer) -> Result<u8> {
    let mut c = 0;
    b.read_u8(&mut c)
}

pub fn session_number(b: &LpBuffer) -> Result<u8> {
    let mut c = 1;
    b.read_u8(&mut c)
}

/// Reads a trailing `HUNT_RESULT` address list: byte count, then
/// `(addr_type, 4-byte ipv4, u16 port)` repeated `count` times.
pub fn decode_hunt_result(b: &LpBuffer, cursor: &mut usize) -> Result<Vec<std::net::SocketAddrV4>> {
    let count = b.read_u8(cursor)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let _addr_type = b.read_u8(cursor)?;
        let ip = b.read_bytes_fixed::<4>(cursor)?;
        let port = b.read_u16(cursor)?;
        out.push(std::net::SocketAddrV4::new(std::net::Ipv4Addr::from(ip), port));
    }
    Ok(out)
}

pub fn encode_hunt_result(addrs: &[std::net::SocketAddrV4]) -> Result<LpBuffer> {
    if addrs.len() > u8::MAX as usize {
        return Err(KurupiraError::Parse("too many hunt-result addresses".into()));
    }
    let mut b = LpBuffer::new();
    b.append_u8(PACKET_HUNT_RESULT)?;
    // session byte is filled in by the data-plane wrapper that owns this inner packet.
    b.append_u8(addrs.len() as u8)?;
    for a in addrs {
        b.append_u8(1)?; // addr_type: IPv4
        b.append_bytes(&a.ip().octets())?;
        b.append_u16(a.port())?;
    }
    Ok(b)
}
