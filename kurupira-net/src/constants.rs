/// NP peer IDs are the SHA-1 of the owning RSA public key.
pub const ID_LENGTH: usize = 20;

/// Length in bytes of each half (`k_in`/`k_out`) of the NP shared-secret
/// material exchanged during the handshake.
pub const K_LENGTH: usize = 32;

/// Routing-table slots. Must exceed the expected number of distinct peers by
/// enough headroom that open addressing doesn't thrash; one slot is always
/// left unused so probing is guaranteed to terminate.
pub const ROUTING_TABLE_SIZE: usize = 1024;

/// Ring-buffer depth of a routing entry's arrival-session history.
pub const HISTORY_SIZE: usize = 16;

/// Duplicate-suppression table slots, indexed by the low 4 bytes of the
/// content hash.
pub const COLLISION_TABLE_SIZE: usize = 256;

/// NP end-to-end key-store slab capacity.
pub const KEY_TABLE_SIZE: usize = 256;

/// How long an NP handshake initiator blocks on the per-entry condvar before
/// giving up and tearing its key-store slot back down.
pub const LNP_T_HANDSHAKE_MS: u64 = 30_000;

/// Minimum random padding an NP `DATA` frame's plaintext must carry.
pub const LNP_MIN_PADDING_LENGTH: usize = 8;

/// Upper bound on an NP `DATA` frame once it's handed to LP as a `DATAGRAM`
/// payload; must leave room for LP's own framing and MAC.
pub const LIBFREEDOM_FTU: usize = 480;

pub const LNP_MAJOR_VERSION: u8 = 1;
pub const LNP_MINOR_VERSION: u8 = 0;

/// Starting hop count stamped on a locally-originated NP packet.
pub const LNP_DEFAULT_TTL: u8 = 32;

pub const PACKET_PUBLIC_KEY_REQUEST: u8 = 0;
pub const PACKET_PUBLIC_KEY_RESPONSE: u8 = 1;
pub const PACKET_KEY_EXCHANGE: u8 = 2;
pub const PACKET_KEY_EXCHANGE_OK: u8 = 3;
pub const PACKET_DATA: u8 = 4;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TransmissionMode {
    Unicast = 0,
    Broadcast = 1,
}

pub const PROTOCOL_RELIABLE: u8 = 1;
pub const PROTOCOL_UNRELIABLE: u8 = 2;

pub const DEFAULT_CIPHER_LIST: &str = "blowfish-cbc";
pub const DEFAULT_HASH_LIST: &str = "sha1";
pub const DEFAULT_MAC_LIST: &str = "sha1-mac";

pub const DEFAULT_PUBLIC_KEY_FILE: &str = "public.key";
pub const DEFAULT_PRIVATE_KEY_FILE: &str = "private.key";
