use kurupira_util::error::Result;

use crate::registry::HashDescriptor;

/// Directional key-derivation label, appended to the hash input on every
/// iteration so the same (z, h) pair yields independent key/iv/mac material.
#[derive(Copy, Clone)]
pub enum Label {
    Key,
    Iv,
    Mac,
}

impl Label {
    fn byte(self) -> u8 {
        match self {
            Label::Key => b'k',
            Label::Iv => b'i',
            Label::Mac => b'm',
        }
    }
}

/// Derives `length` bytes from a shared secret `z` and handshake nonce `h`:
/// iterate `HASH(z || h || label || digest_so_far)`, concatenating successive
/// digests until there is enough material, then truncate the final chunk.
/// Both ends of a handshake run this with identical inputs and so compute
/// identical keys without exchanging them.
pub fn derive(hash: &HashDescriptor, z: &[u8], h: &[u8], label: Label, length: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(length + hash.length);
    let mut prev: Vec<u8> = Vec::new();
    while out.len() < length {
        let mut input = Vec::with_capacity(z.len() + h.len() + 1 + prev.len());
        input.extend_from_slice(z);
        input.extend_from_slice(h);
        input.push(label.byte());
        input.extend_from_slice(&prev);
        let digest = hash.digest_bytes(&input)?;
        out.extend_from_slice(&digest);
        prev = digest;
    }
    out.truncate(length);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::find_hash;

    #[test]
    fn identical_inputs_yield_identical_keys() {
        let hash = find_hash("sha1").unwrap();
        let z = [9u8; 32];
        let h = [4u8; 16];
        let a = derive(&hash, &z, &h, Label::Key, 16).unwrap();
        let b = derive(&hash, &z, &h, Label::Key, 16).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_labels_yield_different_material() {
        let hash = find_hash("sha1").unwrap();
        let z = [9u8; 32];
        let h = [4u8; 16];
        let key = derive(&hash, &z, &h, Label::Key, 16).unwrap();
        let iv = derive(&hash, &z, &h, Label::Iv, 16).unwrap();
        assert_ne!(key, iv);
    }

    #[test]
    fn derives_lengths_longer_than_one_digest() {
        let hash = find_hash("sha1").unwrap();
        let out = derive(&hash, &[1, 2, 3], &[4, 5, 6], Label::Mac, 37).unwrap();
        assert_eq!(out.len(), 37);
    }
}
