use kurupira_util::error::{KurupiraError, Result};
use openssl::bn::{BigNum, BigNumContext};

/// The RFC 3526 group 14 2048-bit MODP prime, generator 2, already
/// space-free (no `concat!`/`replace` indirection to compact at runtime).
/// The handshake is not negotiable over this parameter set; both LP and NP
/// agree on it ahead of time the way the original implementation hardcodes
/// it in `llp_dh.c`.
const GROUP_14_PRIME_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC7",
    "4020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F14",
    "374FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B",
    "7EDEE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163",
    "BF0598DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208",
    "552BB9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E",
    "36CE3BE39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF69",
    "55817183995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF",
);

const GENERATOR: u32 = 2;

/// Bit length of the random exponent `x`, matching `LLP_X_LENGTH` in the
/// original implementation.
pub const X_BITS: i32 = 256;

/// `BigNum` holds a raw `BIGNUM *` and isn't `Sync`, so it can't be cached
/// behind a `lazy_static`; each call re-parses the const hex literal
/// directly instead of going through a pointless runtime "compaction" step.
fn prime() -> Result<BigNum> {
    BigNum::from_hex_str(GROUP_14_PRIME_HEX).map_err(|e| KurupiraError::Crypto(e.to_string()))
}

pub struct KeyPair {
    pub x: BigNum,
    pub y: BigNum,
}

/// Generates a random exponent `x` and computes `y = g^x mod p`, the value a
/// peer sends as its half of the handshake.
pub fn generate() -> Result<KeyPair> {
    let p = prime()?;
    let g = BigNum::from_u32(GENERATOR).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
    let mut x = BigNum::new().map_err(|e| KurupiraError::Crypto(e.to_string()))?;
    x.rand(X_BITS, openssl::bn::MsbOption::MAYBE_ZERO, false).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
    let mut y = BigNum::new().map_err(|e| KurupiraError::Crypto(e.to_string()))?;
    let mut ctx = BigNumContext::new().map_err(|e| KurupiraError::Crypto(e.to_string()))?;
    y.mod_exp(&g, &x, &p, &mut ctx).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
    Ok(KeyPair { x, y })
}

/// Computes the shared secret `z = y_in^x mod p` given the peer's public value.
pub fn shared_secret(y_in: &[u8], x: &BigNum) -> Result<Vec<u8>> {
    let p = prime()?;
    let y_in = BigNum::from_slice(y_in).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
    let mut z = BigNum::new().map_err(|e| KurupiraError::Crypto(e.to_string()))?;
    let mut ctx = BigNumContext::new().map_err(|e| KurupiraError::Crypto(e.to_string()))?;
    z.mod_exp(&y_in, &x, &p, &mut ctx).map_err(|e| KurupiraError::Crypto(e.to_string()))?;
    if z.num_bytes() == 0 {
        return Err(KurupiraError::Crypto("DH value out of range".into()));
    }
    Ok(z.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_sides_derive_matching_secrets() {
        let a = generate().unwrap();
        let b = generate().unwrap();
        let z_a = shared_secret(&b.y.to_vec(), &a.x).unwrap();
        let z_b = shared_secret(&a.y.to_vec(), &b.x).unwrap();
        assert_eq!(z_a, z_b);
    }
}
