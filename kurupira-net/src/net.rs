//! The NP facade: owns the routing table, key store, collision table, and
//! local identity, and exposes the connect/send/read contract the overlay
//! layer presents upward, mirroring the shape of `kurupira_link::Link`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use openssl::rand::rand_bytes;
use parking_lot::Mutex;

use kurupira_crypto::find_hash;
use kurupira_util::error::{KurupiraError, Result};
use kurupira_util::queue::BoundedQueue;

use crate::collision::CollisionTable;
use crate::constants::*;
use crate::dataplane::{decode_data_content, encode_data_content};
use crate::handshake::{self, NpAlgorithmLists};
use crate::host::NetHost;
use crate::id::{LocalIdentity, PeerId};
use crate::keystore::{HandshakeState, KeyStore};
use crate::router::{route_for, Route};
use crate::routing::RoutingTable;
use crate::wire::{self, KeyExchange, KeyExchangeOk, NpHeader, PublicKeyRequest, PublicKeyResponse};

pub struct NetConfig {
    pub key_store_size: usize,
    pub public_key_file: PathBuf,
    pub private_key_file: PathBuf,
    pub algorithm_lists: NpAlgorithmLists,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            key_store_size: KEY_TABLE_SIZE,
            public_key_file: PathBuf::from(DEFAULT_PUBLIC_KEY_FILE),
            private_key_file: PathBuf::from(DEFAULT_PRIVATE_KEY_FILE),
            algorithm_lists: NpAlgorithmLists { cipher_list: DEFAULT_CIPHER_LIST.into(), hash_list: DEFAULT_HASH_LIST.into(), mac_list: DEFAULT_MAC_LIST.into() },
        }
    }
}

fn random_u32() -> u32 {
    let mut b = [0u8; 4];
    // A failure here means the system RNG is broken; fall back to zero rather
    // than panic, which just biases route selection rather than corrupting it.
    let _ = rand_bytes(&mut b);
    u32::from_be_bytes(b)
}

type ConnectCallback = Box<dyn Fn(&PeerId) + Send + Sync>;

/// The NP engine. Generic over the host so the embedder decides how NP
/// frames actually leave as LP `DATAGRAM` payloads.
pub struct Net<H: NetHost> {
    identity: LocalIdentity,
    routing: RoutingTable,
    keystore: KeyStore,
    collisions: CollisionTable,
    host: Arc<H>,
    config: NetConfig,
    upward_reliable: BoundedQueue<PeerId>,
    upward_unreliable: BoundedQueue<PeerId>,
    on_connect: Mutex<Vec<ConnectCallback>>,
    last_error: Mutex<Option<String>>,
}

impl<H: NetHost + 'static> Net<H> {
    pub fn new(host: Arc<H>, config: NetConfig) -> Result<Self> {
        let hash = find_hash("sha1").ok_or_else(|| KurupiraError::Configuration("sha1 hash not registered".into()))?;
        let identity = LocalIdentity::load(&hash, &config.public_key_file, &config.private_key_file)?;
        Ok(Self {
            identity,
            routing: RoutingTable::default(),
            keystore: KeyStore::new(config.key_store_size),
            collisions: CollisionTable::default(),
            host,
            config,
            upward_reliable: BoundedQueue::new(1024),
            upward_unreliable: BoundedQueue::new(1024),
            on_connect: Mutex::new(Vec::new()),
            last_error: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &PeerId {
        &self.identity.id
    }

    fn set_last_error(&self, e: &KurupiraError) {
        *self.last_error.lock() = Some(e.to_string());
    }

    pub fn get_last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn register_connect_handler(&self, f: ConnectCallback) {
        self.on_connect.lock().push(f);
    }

    fn fire_connect(&self, peer: &PeerId) {
        for f in self.on_connect.lock().iter() {
            f(peer);
        }
        self.host.event_peer_connected(peer);
    }

    /// Normalizes a packet for duplicate suppression by zeroing the
    /// hop-mutated TTL byte, so the same logical packet hashes identically at
    /// every relay even though each hop decrements it.
    fn content_hash(&self, raw: &[u8]) -> Result<[u8; 20]> {
        let hash = find_hash("sha1").ok_or_else(|| KurupiraError::Configuration("sha1 hash not registered".into()))?;
        let mut normalized = raw.to_vec();
        if normalized.len() > 1 {
            normalized[1] = 0;
        }
        let digest = hash.digest_bytes(&normalized)?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[..20]);
        Ok(out)
    }

    /// Routes a locally-originated frame: unicast if routing history names a
    /// next hop for `destination`, broadcast over every active LP session
    /// otherwise. Shares `route_for` with the receive path so both agree on
    /// what "known route" means.
    fn send_packet(&self, destination: &PeerId, frame: &[u8]) -> Result<()> {
        let active = self.host.lp_active_sessions();
        let hash = self.content_hash(frame)?;
        let route = route_for(&self.routing, &self.collisions, &self.identity.id, hash, &self.identity.id, destination, None, |s| active.contains(&s), random_u32);
        match route {
            Route::Unicast(session) => self.host.lp_send(session, frame).map_err(Into::into),
            Route::Broadcast => {
                for session in &active {
                    let _ = self.host.lp_send(*session, frame);
                }
                Ok(())
            }
            Route::Receive | Route::Drop | Route::Back | Route::BackWithError => Ok(()),
        }
    }

    /// Begins an NP handshake with `dest` and blocks the caller up to
    /// [`LNP_T_HANDSHAKE_MS`] waiting for it to reach `Connected`, tearing
    /// the key-store slot back down on timeout.
    pub fn connect(&self, dest: &PeerId) -> Result<()> {
        let (routing_idx, store_idx, req, _mode) = handshake::begin_connect(&self.routing, &self.keystore, &self.identity.id, &self.identity.keys.public_der, dest)?;
        let frame = req.encode()?;
        self.send_packet(dest, frame.as_bytes())?;

        let completed = self.routing.wait_for(routing_idx, Duration::from_millis(LNP_T_HANDSHAKE_MS), |_| self.keystore.handshake_state(store_idx) == Some(HandshakeState::Connected));
        if !completed {
            handshake::abandon(&self.routing, &self.keystore, routing_idx, store_idx);
            return Err(KurupiraError::Timeout("NP handshake timed out".into()));
        }
        self.fire_connect(dest);
        Ok(())
    }

    /// Encrypts and routes `payload` to `dest` over an already-`Connected`
    /// NP relationship.
    pub fn send(&self, dest: &PeerId, protocol: u8, payload: &[u8]) -> Result<()> {
        let routing_idx = self.routing.lookup(dest).ok_or_else(|| KurupiraError::Parse("no NP relationship with destination".into()))?;
        let store_idx = self.routing.with_entry(routing_idx, |e| e.store_index).flatten().ok_or_else(|| KurupiraError::Parse("no key-store slot for destination".into()))?;

        let header = NpHeader { packet_type: PACKET_DATA, ttl: LNP_DEFAULT_TTL, source: self.identity.id, destination: *dest, flags: 0 };
        let timestamp = (self.host.time_ticks() & 0xFFFF) as u16;
        let content = self
            .keystore
            .with_entry(store_idx, |e| -> Result<Vec<u8>> {
                if e.handshake_state != HandshakeState::Connected {
                    return Err(KurupiraError::Parse("NP relationship not connected".into()));
                }
                let cipher = e.cipher.ok_or_else(|| KurupiraError::Crypto("no negotiated cipher".into()))?;
                let mac = e.mac.ok_or_else(|| KurupiraError::Crypto("no negotiated mac".into()))?;
                encode_data_content(&header, &cipher, &mac, &e.keys, protocol, timestamp, payload)
            })
            .ok_or_else(|| KurupiraError::Parse("no key-store slot for destination".into()))??;

        let mut buf = wire::NpBuffer::new();
        header.encode(&mut buf)?;
        let mut frame = buf.as_bytes().to_vec();
        frame.extend_from_slice(&content);
        self.send_packet(dest, &frame)
    }

    pub fn read_reliable(&self, buf: &mut [u8]) -> Option<(PeerId, usize)> {
        self.upward_reliable.dequeue(buf)
    }

    pub fn read_unreliable_timeout(&self, buf: &mut [u8], timeout: Duration) -> Option<(PeerId, usize)> {
        self.upward_unreliable.dequeue_timeout(buf, timeout)
    }

    /// Dispatches one NP frame that arrived as the payload of an LP
    /// `DATAGRAM` on `arrival_session`.
    pub fn receive(&self, arrival_session: u8, raw: &[u8]) {
        if let Err(e) = self.receive_inner(arrival_session, raw) {
            self.set_last_error(&e);
            self.host.event_security_warning(&format!("NP packet from session {} dropped: {}", arrival_session, e));
        }
    }

    fn receive_inner(&self, arrival_session: u8, raw: &[u8]) -> Result<()> {
        let buf = wire::NpBuffer::from_bytes(raw)?;
        let header = wire::peek_header(&buf)?;
        let hash = self.content_hash(raw)?;
        let active = self.host.lp_active_sessions();
        let route = route_for(&self.routing, &self.collisions, &self.identity.id, hash, &header.source, &header.destination, Some(arrival_session), |s| active.contains(&s), random_u32);

        match route {
            Route::Drop => Ok(()),
            Route::Receive => self.deliver_local(header, &buf, raw),
            Route::Back | Route::BackWithError => self.forward(arrival_session, header, raw),
            Route::Broadcast => {
                for session in &active {
                    if *session != arrival_session {
                        let _ = self.forward(*session, header, raw);
                    }
                }
                Ok(())
            }
            Route::Unicast(session) => self.forward(session, header, raw),
        }
    }

    /// Decrements TTL and relays `raw` to `session`, dropping it instead if
    /// TTL is already exhausted.
    fn forward(&self, session: u8, header: NpHeader, raw: &[u8]) -> Result<()> {
        if header.ttl == 0 {
            return Ok(());
        }
        let mut out = raw.to_vec();
        out[1] = header.ttl - 1;
        self.host.lp_send(session, &out).map_err(Into::into)
    }

    fn deliver_local(&self, header: NpHeader, buf: &wire::NpBuffer, raw: &[u8]) -> Result<()> {
        let mut cursor = 1 + 1 + ID_LENGTH + ID_LENGTH + 1;
        match header.packet_type {
            PACKET_PUBLIC_KEY_REQUEST => {
                let req = PublicKeyRequest::decode(buf, header, &mut cursor)?;
                let source = req.header.source;
                let resp = handshake::handle_public_key_request(&self.routing, &self.keystore, &self.identity.id, &self.identity.keys.public_der, req)?;
                let frame = resp.encode()?;
                self.send_packet(&source, frame.as_bytes())
            }
            PACKET_PUBLIC_KEY_RESPONSE => {
                let resp = PublicKeyResponse::decode(buf, header, &mut cursor)?;
                let source = resp.header.source;
                let kx = handshake::handle_public_key_response(&self.routing, &self.keystore, &self.identity.id, &self.config.algorithm_lists, resp)?;
                let frame = kx.encode()?;
                self.send_packet(&source, frame.as_bytes())
            }
            PACKET_KEY_EXCHANGE => {
                let kx = KeyExchange::decode(buf, header, &mut cursor)?;
                let source = kx.header.source;
                let ok = handshake::handle_key_exchange(&self.routing, &self.keystore, &self.identity.id, &self.identity.keys.public_der, &self.config.algorithm_lists, kx)?;
                self.fire_connect(&source);
                let frame = ok.encode()?;
                self.send_packet(&source, frame.as_bytes())
            }
            PACKET_KEY_EXCHANGE_OK => {
                let ok = KeyExchangeOk::decode(buf, header, &mut cursor)?;
                let source = ok.header.source;
                handshake::handle_key_exchange_ok(&self.routing, &self.keystore, &self.identity.keys.public_der, ok)?;
                self.fire_connect(&source);
                Ok(())
            }
            PACKET_DATA => self.handle_data(header, raw),
            other => Err(KurupiraError::Parse(format!("unknown NP packet type {}", other))),
        }
    }

    fn handle_data(&self, header: NpHeader, raw: &[u8]) -> Result<()> {
        let routing_idx = self.routing.lookup(&header.source).ok_or_else(|| KurupiraError::Parse("DATA from peer with no NP relationship".into()))?;
        let store_idx = self.routing.with_entry(routing_idx, |e| e.store_index).flatten().ok_or_else(|| KurupiraError::Parse("DATA from peer with no key-store slot".into()))?;

        let header_len = 1 + 1 + ID_LENGTH + ID_LENGTH + 1;
        if raw.len() < header_len {
            return Err(KurupiraError::Parse("NP DATA shorter than header".into()));
        }
        let body = &raw[header_len..];

        let decoded = self
            .keystore
            .with_entry(store_idx, |e| -> Result<Option<crate::dataplane::DecodedData>> {
                if e.handshake_state != HandshakeState::Connected {
                    return Err(KurupiraError::Parse("DATA on NP relationship that isn't connected".into()));
                }
                let cipher = e.cipher.ok_or_else(|| KurupiraError::Crypto("no negotiated cipher".into()))?;
                let mac = e.mac.ok_or_else(|| KurupiraError::Crypto("no negotiated mac".into()))?;
                decode_data_content(&cipher, &mac, &e.keys, body)
            })
            .ok_or_else(|| KurupiraError::Parse("DATA from peer with no key-store slot".into()))??;

        let decoded = match decoded {
            Some(d) => d,
            None => {
                self.host.event_security_warning("NP DATA MAC mismatch, dropped");
                return Ok(());
            }
        };

        let queue = if decoded.protocol == PROTOCOL_RELIABLE { &self.upward_reliable } else { &self.upward_unreliable };
        let _ = queue.enqueue(header.source, decoded.payload);
        Ok(())
    }

    pub fn shutdown(&self) {
        self.upward_reliable.shut_down();
        self.upward_unreliable.shut_down();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct TestHost {
        sent: StdMutex<Vec<(u8, Vec<u8>)>>,
        active: Vec<u8>,
    }

    impl NetHost for TestHost {
        fn lp_send(&self, lp_session: u8, frame: &[u8]) -> std::io::Result<()> {
            self.sent.lock().unwrap().push((lp_session, frame.to_vec()));
            Ok(())
        }

        fn lp_active_sessions(&self) -> Vec<u8> {
            self.active.clone()
        }
    }

    fn write_rsa_keys(dir: &std::path::Path) -> (PathBuf, PathBuf) {
        use openssl::rsa::Rsa;
        let rsa = Rsa::generate(1024).unwrap();
        let pub_path = dir.join("public.key");
        let priv_path = dir.join("private.key");
        std::fs::write(&pub_path, rsa.public_key_to_pem().unwrap()).unwrap();
        std::fs::write(&priv_path, rsa.private_key_to_pem().unwrap()).unwrap();
        (pub_path, priv_path)
    }

    #[test]
    fn content_hash_ignores_ttl_byte() {
        let dir = std::env::temp_dir().join(format!("kurupira-net-test-{}", random_u32()));
        std::fs::create_dir_all(&dir).unwrap();
        let (pub_path, priv_path) = write_rsa_keys(&dir);
        let mut config = NetConfig::default();
        config.public_key_file = pub_path;
        config.private_key_file = priv_path;
        let host = Arc::new(TestHost { sent: StdMutex::new(Vec::new()), active: vec![] });
        let net = Net::new(host, config).unwrap();

        let mut a = vec![1u8, 5, 2, 3, 4];
        let mut b = vec![1u8, 9, 2, 3, 4];
        assert_eq!(net.content_hash(&a).unwrap(), net.content_hash(&b).unwrap());
        a[2] = 0xFF;
        b[2] = 0xFF;
        assert_eq!(net.content_hash(&a).unwrap(), net.content_hash(&b).unwrap());
    }
}
