use std::fmt::{Display, Formatter};

/// Flat error taxonomy shared by LP and NP. Variants follow the error handling
/// design laid out for the protocol engine: configuration problems fall back
/// to defaults, socket/parse/crypto problems drop the offending packet, and
/// capacity/timeout problems are reported back to the caller as distinguishable
/// failures rather than panics.
#[derive(Debug)]
pub enum KurupiraError {
    /// Unknown config key, missing file, or an out-of-range value. Carries the
    /// key name that was defaulted.
    Configuration(String),
    /// Bind/read/send failure on a socket.
    Socket(String),
    /// Truncated buffer, bad type tag, or an algorithm name with no local match.
    Parse(String),
    /// MAC mismatch, verifier mismatch, key-derivation failure, DH value out of range.
    Crypto(String),
    /// No free session slot, max_connections reached, queue full, cache full.
    Capacity(String),
    /// Session idle past timeout, expired lifetime, or handshake past its deadline.
    Timeout(String),
}

impl Display for KurupiraError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            KurupiraError::Configuration(m) => write!(f, "configuration error: {}", m),
            KurupiraError::Socket(m) => write!(f, "socket error: {}", m),
            KurupiraError::Parse(m) => write!(f, "parse error: {}", m),
            KurupiraError::Crypto(m) => write!(f, "crypto error: {}", m),
            KurupiraError::Capacity(m) => write!(f, "capacity error: {}", m),
            KurupiraError::Timeout(m) => write!(f, "timeout: {}", m),
        }
    }
}

impl std::error::Error for KurupiraError {}

impl From<std::io::Error> for KurupiraError {
    fn from(e: std::io::Error) -> Self {
        KurupiraError::Socket(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KurupiraError>;
