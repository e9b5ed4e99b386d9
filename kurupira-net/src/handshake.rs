//! C12: NP handshake. A two-round public-key exchange followed by symmetric
//! key negotiation, unicast-or-broadcast over whatever LP sessions the
//! routing history names — grounded on `lnp_handshake.c` for the four
//! packet flow and `lnp_routing_policy.c` for the unicast/broadcast choice
//! that picks how `PUBLIC_KEY_REQUEST` leaves the initiator.

use openssl::rand::rand_bytes;

use kurupira_crypto::{find_cipher, find_hash, find_mac, kdf, negotiate, parse_list, CipherDescriptor, HashDescriptor, KdfLabel, MacDescriptor};
use kurupira_util::error::{KurupiraError, Result};

use crate::constants::*;
use crate::id::PeerId;
use crate::keystore::{HandshakeState, KeyMaterial, KeyStore};
use crate::routing::RoutingTable;
use crate::wire::{KeyExchange, KeyExchangeOk, NpHeader, PublicKeyRequest, PublicKeyResponse};

pub struct NpAlgorithmLists {
    pub cipher_list: String,
    pub hash_list: String,
    pub mac_list: String,
}

fn random_k() -> Result<[u8; K_LENGTH]> {
    let mut k = [0u8; K_LENGTH];
    rand_bytes(&mut k).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
    Ok(k)
}

/// Derives the six directional keys for one NP peer relationship. Inbound
/// material is derived with the peer's own public key as `z`, outbound with
/// our own public key as `z` — mirroring `create_keys()` in
/// `lnp_handshake.c` (inbound keyed off `lnp_key_store[index].public_key`,
/// outbound off `lnp_get_public_key()`). The `k_in || k_out` vs
/// `k_out || k_in` concat asymmetry alone isn't enough: without also
/// swapping which side's public key feeds `z`, both peers would derive
/// their outbound key from the same `z` their peer used for its inbound
/// key. Combined, the two asymmetries make each side's outbound key equal
/// the peer's inbound key.
fn derive_keys(hash: &HashDescriptor, cipher: &CipherDescriptor, mac: &MacDescriptor, public_key_local: &[u8], public_key_remote: &[u8], k_in: &[u8; K_LENGTH], k_out: &[u8; K_LENGTH]) -> Result<KeyMaterial> {
    let mut in_concat = Vec::with_capacity(2 * K_LENGTH);
    in_concat.extend_from_slice(k_in);
    in_concat.extend_from_slice(k_out);
    let mut out_concat = Vec::with_capacity(2 * K_LENGTH);
    out_concat.extend_from_slice(k_out);
    out_concat.extend_from_slice(k_in);

    Ok(KeyMaterial {
        cipher_in_key: kdf::derive(hash, public_key_remote, &in_concat, KdfLabel::Key, cipher.key_length)?,
        cipher_in_iv: kdf::derive(hash, public_key_remote, &in_concat, KdfLabel::Iv, cipher.iv_length)?,
        cipher_out_key: kdf::derive(hash, public_key_local, &out_concat, KdfLabel::Key, cipher.key_length)?,
        cipher_out_iv: kdf::derive(hash, public_key_local, &out_concat, KdfLabel::Iv, cipher.iv_length)?,
        mac_in_key: kdf::derive(hash, public_key_remote, &in_concat, KdfLabel::Mac, mac.key_length)?,
        mac_out_key: kdf::derive(hash, public_key_local, &out_concat, KdfLabel::Mac, mac.key_length)?,
    })
}

/// Initiator side, step 1: allocate a key-store slot, build the
/// `PUBLIC_KEY_REQUEST`, and report whether the caller should send it
/// unicast (a routing history for `dest` already exists) or broadcast.
pub fn begin_connect(routing: &RoutingTable, keystore: &KeyStore, self_id: &PeerId, self_public_der: &[u8], dest: &PeerId) -> Result<(usize, u32, PublicKeyRequest, TransmissionMode)> {
    let routing_idx = routing.find_or_insert(dest);
    let has_history = routing.with_entry(routing_idx, |e| !e.history.is_empty()).unwrap_or(false);
    let mode = if has_history { TransmissionMode::Unicast } else { TransmissionMode::Broadcast };

    let store_idx = keystore.allocate()?;
    keystore.with_entry(store_idx, |e| e.handshake_state = HandshakeState::Connecting);
    routing.with_entry(routing_idx, |e| e.store_index = Some(store_idx));

    let req = PublicKeyRequest {
        header: NpHeader { packet_type: PACKET_PUBLIC_KEY_REQUEST, ttl: LNP_DEFAULT_TTL, source: *self_id, destination: *dest, flags: 0 },
        major: LNP_MAJOR_VERSION,
        minor: LNP_MINOR_VERSION,
        transmission_mode: mode,
        public_key: self_public_der.to_vec(),
    };
    Ok((routing_idx, store_idx, req, mode))
}

/// Responder side, step 2: record the initiator's public key, generate our
/// `k_out`, and build the `PUBLIC_KEY_RESPONSE`.
pub fn handle_public_key_request(routing: &RoutingTable, keystore: &KeyStore, self_id: &PeerId, self_public_der: &[u8], req: PublicKeyRequest) -> Result<PublicKeyResponse> {
    if req.major != LNP_MAJOR_VERSION {
        return Err(KurupiraError::Parse(format!("NP major version mismatch: peer={} local={}", req.major, LNP_MAJOR_VERSION)));
    }
    let source = req.header.source;
    let routing_idx = routing.find_or_insert(&source);
    let store_idx = keystore.allocate()?;
    let k_out = random_k()?;
    keystore.with_entry(store_idx, |e| {
        e.handshake_state = HandshakeState::BeingConnected;
        e.public_key = req.public_key.clone();
        e.k_out = k_out;
    });
    routing.with_entry(routing_idx, |e| e.store_index = Some(store_idx));

    Ok(PublicKeyResponse {
        header: NpHeader { packet_type: PACKET_PUBLIC_KEY_RESPONSE, ttl: LNP_DEFAULT_TTL, source: *self_id, destination: source, flags: 0 },
        public_key: self_public_der.to_vec(),
        encrypted_k: k_out,
    })
}

/// Initiator, step 3: must still be `Connecting`. Records B's public key and
/// `k` as `k_in`, generates our own `k_out`, and builds `KEY_EXCHANGE`.
pub fn handle_public_key_response(routing: &RoutingTable, keystore: &KeyStore, self_id: &PeerId, lists: &NpAlgorithmLists, resp: PublicKeyResponse) -> Result<KeyExchange> {
    let source = resp.header.source;
    let routing_idx = routing.lookup(&source).ok_or_else(|| KurupiraError::Parse("PUBLIC_KEY_RESPONSE from unknown peer".into()))?;
    let store_idx = routing.with_entry(routing_idx, |e| e.store_index).flatten().ok_or_else(|| KurupiraError::Parse("no key-store slot for peer".into()))?;

    let k_out = random_k()?;
    let k_echo = keystore
        .with_entry(store_idx, |e| {
            if e.handshake_state != HandshakeState::Connecting {
                return None;
            }
            e.public_key = resp.public_key.clone();
            e.k_in = resp.encrypted_k;
            e.k_out = k_out;
            e.handshake_state = HandshakeState::ExchangingKeys;
            Some(resp.encrypted_k)
        })
        .flatten()
        .ok_or_else(|| KurupiraError::Parse("PUBLIC_KEY_RESPONSE received in wrong state".into()))?;

    Ok(KeyExchange {
        header: NpHeader { packet_type: PACKET_KEY_EXCHANGE, ttl: LNP_DEFAULT_TTL, source: *self_id, destination: source, flags: 0 },
        cipher_list: lists.cipher_list.clone(),
        hash_list: lists.hash_list.clone(),
        mac_list: lists.mac_list.clone(),
        k_echo,
        k_new: k_out,
    })
}

/// Responder, step 4: must still be `BeingConnected`. Validates the echoed
/// `k`, negotiates algorithms, derives all six directional keys, and builds
/// `KEY_EXCHANGE_OK`.
pub fn handle_key_exchange(routing: &RoutingTable, keystore: &KeyStore, self_id: &PeerId, self_public_der: &[u8], local_lists: &NpAlgorithmLists, kx: KeyExchange) -> Result<KeyExchangeOk> {
    let source = kx.header.source;
    let routing_idx = routing.lookup(&source).ok_or_else(|| KurupiraError::Parse("KEY_EXCHANGE from unknown peer".into()))?;
    let store_idx = routing.with_entry(routing_idx, |e| e.store_index).flatten().ok_or_else(|| KurupiraError::Parse("no key-store slot for peer".into()))?;

    let local_ciphers = parse_list(&local_lists.cipher_list);
    let local_hashes = parse_list(&local_lists.hash_list);
    let local_macs = parse_list(&local_lists.mac_list);
    let peer_ciphers = parse_list(&kx.cipher_list);
    let peer_hashes = parse_list(&kx.hash_list);
    let peer_macs = parse_list(&kx.mac_list);
    let cipher_name = negotiate(&peer_ciphers, &local_ciphers).ok_or_else(|| KurupiraError::Parse("no shared NP cipher".into()))?.to_string();
    let hash_name = negotiate(&peer_hashes, &local_hashes).ok_or_else(|| KurupiraError::Parse("no shared NP hash".into()))?.to_string();
    let mac_name = negotiate(&peer_macs, &local_macs).ok_or_else(|| KurupiraError::Parse("no shared NP mac".into()))?.to_string();
    let cipher = find_cipher(&cipher_name).ok_or_else(|| KurupiraError::Parse("unsupported NP cipher".into()))?;
    let hash = find_hash(&hash_name).ok_or_else(|| KurupiraError::Parse("unsupported NP hash".into()))?;
    let mac = find_mac(&mac_name).ok_or_else(|| KurupiraError::Parse("unsupported NP mac".into()))?;

    let k_new = kx.k_new;
    let result = keystore.with_entry(store_idx, |e| {
        if e.handshake_state != HandshakeState::BeingConnected || kx.k_echo != e.k_out {
            return None;
        }
        e.k_in = k_new;
        e.cipher = Some(cipher);
        e.hash = Some(hash);
        e.mac = Some(mac);
        Some((e.public_key.clone(), e.k_in, e.k_out))
    });
    let (public_key_remote, k_in, k_out) = result.flatten().ok_or_else(|| KurupiraError::Parse("KEY_EXCHANGE received in wrong state or bad echo".into()))?;

    let keys = derive_keys(&hash, &cipher, &mac, self_public_der, &public_key_remote, &k_in, &k_out)?;
    keystore.with_entry(store_idx, |e| {
        e.keys = keys;
        e.handshake_state = HandshakeState::Connected;
    });
    routing.notify_waiters(routing_idx);

    Ok(KeyExchangeOk {
        header: NpHeader { packet_type: PACKET_KEY_EXCHANGE_OK, ttl: LNP_DEFAULT_TTL, source: *self_id, destination: source, flags: 0 },
        cipher: cipher_name,
        hash: hash_name,
        mac: mac_name,
        k_echo: k_new,
    })
}

/// Initiator, step 5: must still be `ExchangingKeys`. Validates the echoed
/// `k`, locks in the negotiated algorithms, derives keys, and signals the
/// waiting caller of [`crate::net::Net::connect`].
pub fn handle_key_exchange_ok(routing: &RoutingTable, keystore: &KeyStore, self_public_der: &[u8], ok: KeyExchangeOk) -> Result<()> {
    let source = ok.header.source;
    let routing_idx = routing.lookup(&source).ok_or_else(|| KurupiraError::Parse("KEY_EXCHANGE_OK from unknown peer".into()))?;
    let store_idx = routing.with_entry(routing_idx, |e| e.store_index).flatten().ok_or_else(|| KurupiraError::Parse("no key-store slot for peer".into()))?;

    let cipher = find_cipher(&ok.cipher).ok_or_else(|| KurupiraError::Parse("unsupported NP cipher".into()))?;
    let hash = find_hash(&ok.hash).ok_or_else(|| KurupiraError::Parse("unsupported NP hash".into()))?;
    let mac = find_mac(&ok.mac).ok_or_else(|| KurupiraError::Parse("unsupported NP mac".into()))?;

    let result = keystore.with_entry(store_idx, |e| {
        if e.handshake_state != HandshakeState::ExchangingKeys || ok.k_echo != e.k_out {
            return None;
        }
        e.cipher = Some(cipher);
        e.hash = Some(hash);
        e.mac = Some(mac);
        Some((e.public_key.clone(), e.k_in, e.k_out))
    });
    let (public_key_remote, k_in, k_out) = result.flatten().ok_or_else(|| KurupiraError::Parse("KEY_EXCHANGE_OK received in wrong state or bad echo".into()))?;

    let keys = derive_keys(&hash, &cipher, &mac, self_public_der, &public_key_remote, &k_in, &k_out)?;
    keystore.with_entry(store_idx, |e| {
        e.keys = keys;
        e.handshake_state = HandshakeState::Connected;
    });
    routing.notify_waiters(routing_idx);
    Ok(())
}

/// Tears down a handshake that never completed within `LNP_T_HANDSHAKE`:
/// the key-store slot is freed and the routing entry's `store_index` is
/// cleared so a later connect attempt starts fresh.
pub fn abandon(routing: &RoutingTable, keystore: &KeyStore, routing_idx: usize, store_idx: u32) {
    keystore.delete(store_idx);
    routing.with_entry(routing_idx, |e| e.store_index = None);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lists() -> NpAlgorithmLists {
        NpAlgorithmLists { cipher_list: DEFAULT_CIPHER_LIST.into(), hash_list: DEFAULT_HASH_LIST.into(), mac_list: DEFAULT_MAC_LIST.into() }
    }

    fn id(b: u8) -> PeerId {
        let mut id = [0u8; ID_LENGTH];
        id[0] = b;
        id
    }

    #[test]
    fn full_handshake_derives_matching_directional_keys() {
        let routing_a = RoutingTable::default();
        let routing_b = RoutingTable::default();
        let keystore_a = KeyStore::new(8);
        let keystore_b = KeyStore::new(8);
        let id_a = id(1);
        let id_b = id(2);
        let pub_a = vec![10, 11, 12];
        let pub_b = vec![20, 21, 22];

        let (ridx_a, sidx_a, req, mode) = begin_connect(&routing_a, &keystore_a, &id_a, &pub_a, &id_b).unwrap();
        assert_eq!(mode, TransmissionMode::Broadcast);

        let resp = handle_public_key_request(&routing_b, &keystore_b, &id_b, &pub_b, req).unwrap();
        let kx = handle_public_key_response(&routing_a, &keystore_a, &id_a, &lists(), resp).unwrap();
        let ridx_b = routing_b.lookup(&id_a).unwrap();
        let sidx_b = routing_b.with_entry(ridx_b, |e| e.store_index).flatten().unwrap();

        let ok = handle_key_exchange(&routing_b, &keystore_b, &id_b, &pub_b, &lists(), kx).unwrap();
        handle_key_exchange_ok(&routing_a, &keystore_a, &pub_a, ok).unwrap();

        let a_connected = keystore_a.handshake_state(sidx_a).unwrap();
        let b_connected = keystore_b.handshake_state(sidx_b).unwrap();
        assert_eq!(a_connected, HandshakeState::Connected);
        assert_eq!(b_connected, HandshakeState::Connected);

        let a_keys = keystore_a.with_entry(sidx_a, |e| e.keys.clone()).unwrap();
        let b_keys = keystore_b.with_entry(sidx_b, |e| e.keys.clone()).unwrap();
        assert_eq!(a_keys.cipher_out_key, b_keys.cipher_in_key);
        assert_eq!(a_keys.cipher_in_key, b_keys.cipher_out_key);
        assert_eq!(a_keys.mac_out_key, b_keys.mac_in_key);
        let _ = ridx_a;
    }

    #[test]
    fn wrong_echo_is_rejected() {
        let routing_a = RoutingTable::default();
        let routing_b = RoutingTable::default();
        let keystore_a = KeyStore::new(8);
        let keystore_b = KeyStore::new(8);
        let id_a = id(3);
        let id_b = id(4);

        let (_, _, req, _) = begin_connect(&routing_a, &keystore_a, &id_a, &[1, 2, 3], &id_b).unwrap();
        let resp = handle_public_key_request(&routing_b, &keystore_b, &id_b, &[4, 5, 6], req).unwrap();
        let mut kx = handle_public_key_response(&routing_a, &keystore_a, &id_a, &lists(), resp).unwrap();
        kx.k_echo = [0xAA; K_LENGTH];
        assert!(handle_key_exchange(&routing_b, &keystore_b, &id_b, &[4, 5, 6], &lists(), kx).is_err());
    }
}
