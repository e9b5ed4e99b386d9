//! C6: the three-way DH handshake, algorithm negotiation, and key derivation.

use std::net::SocketAddrV4;

use openssl::bn::BigNum;
use openssl::rand::rand_bytes;

use kurupira_crypto::{dh, kdf, negotiate, parse_list, registry, KdfLabel};
use kurupira_util::error::{KurupiraError, Result};

use crate::cache::NodeCache;
use crate::constants::*;
use crate::host::LinkHost;
use crate::session::{KeyMaterial, SessionState, SessionTable};
use crate::wire::{ConnectionOk, ConnectionRequest, KeyExchange};

pub struct AlgorithmLists {
    pub cipher_list: String,
    pub hash_list: String,
    pub mac_list: String,
}

fn random_nonce() -> Result<[u8; 16]> {
    let mut h = [0u8; 16];
    rand_bytes(&mut h).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
    Ok(h)
}

/// Derives and stores the six directional keys plus the close verifier once
/// `z` is known on both sides. `h_in`/`h_out` disambiguate which nonce feeds
/// which direction so the two ends land on matching key pairs.
fn derive_keys(table: &SessionTable, session: u8) -> Result<()> {
    let s = table.get(session);
    let mut data = s.data.lock();
    let hash = data.hash.ok_or_else(|| KurupiraError::Crypto("no hash negotiated".into()))?;
    let cipher = data.cipher.ok_or_else(|| KurupiraError::Crypto("no cipher negotiated".into()))?;
    let mac = data.mac.ok_or_else(|| KurupiraError::Crypto("no mac negotiated".into()))?;
    let z = data.z.clone();
    let h_in = data.h_in;
    let h_out = data.h_out;

    let keys = KeyMaterial {
        cipher_in_key: kdf::derive(&hash, &z, &h_in, KdfLabel::Key, cipher.key_length)?,
        cipher_in_iv: kdf::derive(&hash, &z, &h_in, KdfLabel::Iv, cipher.iv_length)?,
        cipher_out_key: kdf::derive(&hash, &z, &h_out, KdfLabel::Key, cipher.key_length)?,
        cipher_out_iv: kdf::derive(&hash, &z, &h_out, KdfLabel::Iv, cipher.iv_length)?,
        mac_in_key: kdf::derive(&hash, &z, &h_in, KdfLabel::Mac, mac.key_length)?,
        mac_out_key: kdf::derive(&hash, &z, &h_out, KdfLabel::Mac, mac.key_length)?,
        verifier: hash.digest_bytes(&z)?,
    };
    data.keys = keys;
    Ok(())
}

/// Initiator side: reserve a session, generate our DH keypair, and build the
/// `CONNECTION_REQUEST` to send. Fails if the node cache already has a live
/// session for `addr` (connect-duplicate prevention) or if no slot is free.
pub fn begin_connect(table: &SessionTable, cache: &NodeCache, addr: SocketAddrV4, lists: &AlgorithmLists) -> Result<(u8, ConnectionRequest)> {
    if cache.lookup_session_by_address(addr).is_some() {
        return Err(KurupiraError::Capacity("session already exists for address".into()));
    }
    let session = table.acquire_free(SessionState::Connecting)?;
    let keypair = dh::generate()?;
    let h_out = random_nonce()?;

    {
        let s = table.get(session);
        let mut data = s.data.lock();
        data.address = Some(addr);
        data.h_out = h_out;
        data.x = keypair.x.to_vec();
        data.y_out = keypair.y.to_vec();
    }
    cache.mark_connecting(addr, session);

    Ok((
        session,
        ConnectionRequest {
            major: LLP_MAJOR_VERSION,
            minor: LLP_MINOR_VERSION,
            initiator_session: session,
            cipher_list: lists.cipher_list.clone(),
            hash_list: lists.hash_list.clone(),
            mac_list: lists.mac_list.clone(),
            h: h_out,
        },
    ))
}

/// Responder side. `max_connections` admission and the major-version check
/// happen here; a mismatch or negotiation failure leaves no session allocated.
pub fn handle_connection_request(
    table: &SessionTable,
    lists: &AlgorithmLists,
    req: ConnectionRequest,
    max_connections: usize,
) -> Result<(u8, ConnectionOk)> {
    if req.major != LLP_MAJOR_VERSION {
        return Err(KurupiraError::Parse(format!("major version mismatch: peer={} local={}", req.major, LLP_MAJOR_VERSION)));
    }
    if table.active_count() >= max_connections {
        return Err(KurupiraError::Capacity("max_connections reached".into()));
    }

    let local_ciphers = parse_list(&lists.cipher_list);
    let local_hashes = parse_list(&lists.hash_list);
    let local_macs = parse_list(&lists.mac_list);
    let peer_ciphers = parse_list(&req.cipher_list);
    let peer_hashes = parse_list(&req.hash_list);
    let peer_macs = parse_list(&req.mac_list);

    let cipher_name = negotiate(&peer_ciphers, &local_ciphers).ok_or_else(|| KurupiraError::Parse("no shared cipher".into()))?;
    let hash_name = negotiate(&peer_hashes, &local_hashes).ok_or_else(|| KurupiraError::Parse("no shared hash".into()))?;
    let mac_name = negotiate(&peer_macs, &local_macs).ok_or_else(|| KurupiraError::Parse("no shared mac".into()))?;

    let cipher = registry::find_cipher(cipher_name).ok_or_else(|| KurupiraError::Parse("unsupported cipher".into()))?;
    let hash = registry::find_hash(hash_name).ok_or_else(|| KurupiraError::Parse("unsupported hash".into()))?;
    let mac = registry::find_mac(mac_name).ok_or_else(|| KurupiraError::Parse("unsupported mac".into()))?;

    let session = table.acquire_free(SessionState::BeingConnected)?;
    let keypair = dh::generate()?;
    let h_out = random_nonce()?;

    {
        let s = table.get(session);
        let mut data = s.data.lock();
        data.foreign_session = Some(req.initiator_session);
        data.cipher = Some(cipher);
        data.hash = Some(hash);
        data.mac = Some(mac);
        data.h_in = req.h;
        data.h_out = h_out;
        data.x = keypair.x.to_vec();
        data.y_out = keypair.y.to_vec();
    }

    Ok((
        session,
        ConnectionOk {
            destination_session: req.initiator_session,
            source_session: session,
            cipher: cipher_name.to_string(),
            hash: hash_name.to_string(),
            mac: mac_name.to_string(),
            h: h_out,
            y: keypair.y.to_vec(),
        },
    ))
}

/// Initiator receives `CONNECTION_OK`: locks in the negotiated algorithms,
/// computes `z`, derives keys, transitions to `Established`, and returns the
/// `KEY_EXCHANGE` to send back.
pub fn handle_connection_ok(table: &SessionTable, ok: ConnectionOk) -> Result<KeyExchange> {
    let session = ok.destination_session;
    let s = table.get(session);
    let x_bytes;
    let y_out;
    {
        let mut data = s.data.lock();
        if data.state != SessionState::Connecting {
            return Err(KurupiraError::Parse("CONNECTION_OK received in wrong state".into()));
        }
        let cipher = registry::find_cipher(&ok.cipher).ok_or_else(|| KurupiraError::Parse("unsupported cipher".into()))?;
        let hash = registry::find_hash(&ok.hash).ok_or_else(|| KurupiraError::Parse("unsupported hash".into()))?;
        let mac = registry::find_mac(&ok.mac).ok_or_else(|| KurupiraError::Parse("unsupported mac".into()))?;
        data.cipher = Some(cipher);
        data.hash = Some(hash);
        data.mac = Some(mac);
        data.foreign_session = Some(ok.source_session);
        data.h_in = ok.h;
        data.y_in = ok.y.clone();
        x_bytes = data.x.clone();
        y_out = data.y_out.clone();
    }

    let x = BigNum::from_slice(&x_bytes).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
    let z = dh::shared_secret(&ok.y, &x)?;
    {
        let mut data = s.data.lock();
        data.z = z;
        data.state = SessionState::Established;
    }
    derive_keys(table, session)?;

    Ok(KeyExchange { destination_session: ok.source_session, y: y_out })
}

/// Responder receives `KEY_EXCHANGE`: computes `z`, derives keys, transitions
/// to `Established`.
pub fn handle_key_exchange(table: &SessionTable, kx: KeyExchange) -> Result<()> {
    let session = kx.destination_session;
    let s = table.get(session);
    let x_bytes;
    {
        let mut data = s.data.lock();
        if data.state != SessionState::BeingConnected {
            return Err(KurupiraError::Parse("KEY_EXCHANGE received in wrong state".into()));
        }
        data.y_in = kx.y.clone();
        x_bytes = data.x.clone();
    }
    let x = BigNum::from_slice(&x_bytes).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
    let z = dh::shared_secret(&kx.y, &x)?;
    {
        let mut data = s.data.lock();
        data.z = z;
        data.state = SessionState::Established;
    }
    derive_keys(table, session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn lists() -> AlgorithmLists {
        AlgorithmLists { cipher_list: DEFAULT_CIPHER_LIST.into(), hash_list: DEFAULT_HASH_LIST.into(), mac_list: DEFAULT_MAC_LIST.into() }
    }

    #[test]
    fn full_handshake_derives_matching_directional_keys() {
        let table_a = SessionTable::default();
        let table_b = SessionTable::default();
        let cache_a = NodeCache::new(8);
        let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 20002);

        let (sess_a, req) = begin_connect(&table_a, &cache_a, addr, &lists()).unwrap();
        let (sess_b, ok) = handle_connection_request(&table_b, &lists(), req, 100).unwrap();
        let kx = handle_connection_ok(&table_a, ok).unwrap();
        handle_key_exchange(&table_b, kx).unwrap();

        let a = table_a.get(sess_a).data.lock();
        let b = table_b.get(sess_b).data.lock();
        assert_eq!(a.state, SessionState::Established);
        assert_eq!(b.state, SessionState::Established);
        assert_eq!(a.keys.cipher_out_key, b.keys.cipher_in_key);
        assert_eq!(a.keys.cipher_in_key, b.keys.cipher_out_key);
        assert_eq!(a.keys.mac_out_key, b.keys.mac_in_key);
        assert_eq!(a.keys.verifier, b.keys.verifier);
        assert_eq!(a.foreign_session, Some(sess_b));
        assert_eq!(b.foreign_session, Some(sess_a));
    }

    #[test]
    fn negotiation_failure_leaves_no_session_allocated() {
        let table_b = SessionTable::default();
        let req = ConnectionRequest {
            major: LLP_MAJOR_VERSION,
            minor: LLP_MINOR_VERSION,
            initiator_session: 0,
            cipher_list: "aes-cbc".into(),
            hash_list: DEFAULT_HASH_LIST.into(),
            mac_list: DEFAULT_MAC_LIST.into(),
            h: [0; 16],
        };
        assert!(handle_connection_request(&table_b, &lists(), req, 100).is_err());
        assert_eq!(table_b.active_count(), 0);
    }
}
