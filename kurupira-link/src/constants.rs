/// Maximum number of simultaneous LP sessions. Session numbers are one wire
/// octet, so this can never exceed 256.
pub const MAX_SESSIONS: usize = 256;

/// LP's maximum UDP datagram size.
pub const MTU: usize = 512;

/// Minimum random padding applied to a DATA frame's plaintext, even when the
/// cipher's block size would allow less.
pub const MIN_PADDING_LENGTH: usize = 8;

/// Ticks (of [`kurupira_util::TICK_MS`] each) of silence before a keep-alive
/// (or close re-send) is sent on an otherwise-idle session.
pub const T_SILENT_TICKS: u32 = 20;

/// Ticks of total silence after which a session is considered dead.
pub const T_TIMEOUT_TICKS: u32 = 40;

/// Monitor thread runs its slower maintenance pass every this many ticks.
pub const MONITOR_TICKS: u32 = 10;

pub const LLP_MAJOR_VERSION: u8 = 1;
pub const LLP_MINOR_VERSION: u8 = 0;

pub const PACKET_CONNECTION_REQUEST: u8 = 1;
pub const PACKET_CONNECTION_OK: u8 = 2;
pub const PACKET_KEY_EXCHANGE: u8 = 3;
pub const PACKET_DATA: u8 = 4;
pub const PACKET_CLOSE_REQUEST: u8 = 5;
pub const PACKET_CLOSE_OK: u8 = 6;
pub const PACKET_NODE_HUNT: u8 = 7;
pub const PACKET_HUNT_RESULT: u8 = 8;
pub const PACKET_KEEP_ALIVE: u8 = 9;
pub const INNER_DATAGRAM: u8 = 15;

/// Default negotiable algorithm lists, per Section 6's config table.
pub const DEFAULT_CIPHER_LIST: &str = "blowfish-cbc";
pub const DEFAULT_HASH_LIST: &str = "sha1";
pub const DEFAULT_MAC_LIST: &str = "sha1-mac";
