use std::mem::MaybeUninit;

use crate::error::{KurupiraError, Result};

fn overflow() -> KurupiraError {
    KurupiraError::Parse("buffer overflow".into())
}

/// A bounds-checked byte cursor over a fixed-capacity array, used to encode and
/// decode every LP and NP packet type. `L` is the compile-time upper bound on
/// the encoded size of whatever is being built, so packets are stack-allocated
/// rather than heap-allocated.
pub struct Buffer<const L: usize>(usize, [u8; L]);

impl<const L: usize> Default for Buffer<L> {
    #[inline(always)]
    fn default() -> Self {
        Self::new()
    }
}

impl<const L: usize> Buffer<L> {
    pub const CAPACITY: usize = L;

    #[inline(always)]
    pub fn new() -> Self {
        Self(0, [0u8; L])
    }

    /// Create an empty buffer without zeroing memory. Unwritten bytes have
    /// undefined content until overwritten by an append.
    #[inline(always)]
    pub unsafe fn new_without_memzero() -> Self {
        Self(0, MaybeUninit::uninit().assume_init())
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self> {
        if b.len() > L {
            return Err(overflow());
        }
        let mut buf = Self::new();
        buf.0 = b.len();
        buf.1[..b.len()].copy_from_slice(b);
        Ok(buf)
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.1[..self.0]
    }

    #[inline(always)]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.1[..self.0]
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.0
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub fn clear(&mut self) {
        self.1[..self.0].fill(0);
        self.0 = 0;
    }

    /// Reserve `count` bytes and return them as a mutable slice so the caller
    /// can fill them in place (used by the data plane for padding/ciphertext).
    pub fn append_reserve(&mut self, count: usize) -> Result<&mut [u8]> {
        let ptr = self.0;
        let end = ptr + count;
        if end > L {
            return Err(overflow());
        }
        self.0 = end;
        Ok(&mut self.1[ptr..end])
    }

    pub fn append_bytes(&mut self, b: &[u8]) -> Result<()> {
        self.append_reserve(b.len())?.copy_from_slice(b);
        Ok(())
    }

    pub fn append_u8(&mut self, v: u8) -> Result<()> {
        let ptr = self.0;
        if ptr >= L {
            return Err(overflow());
        }
        self.1[ptr] = v;
        self.0 = ptr + 1;
        Ok(())
    }

    pub fn append_u16(&mut self, v: u16) -> Result<()> {
        self.append_bytes(&v.to_be_bytes())
    }

    pub fn append_u32(&mut self, v: u32) -> Result<()> {
        self.append_bytes(&v.to_be_bytes())
    }

    /// Length-prefixed string: four big-endian octets of length, then bytes (no terminator).
    pub fn append_string(&mut self, s: &str) -> Result<()> {
        self.append_u32(s.len() as u32)?;
        self.append_bytes(s.as_bytes())
    }

    /// mpint: four big-endian octets of magnitude length, one sign octet (0 = non-negative,
    /// the only sign this protocol ever produces since DH values and hashes are unsigned),
    /// then the big-endian magnitude.
    pub fn append_mpint(&mut self, magnitude: &[u8]) -> Result<()> {
        self.append_u32(magnitude.len() as u32)?;
        self.append_u8(0)?;
        self.append_bytes(magnitude)
    }

    pub fn read_u8(&self, cursor: &mut usize) -> Result<u8> {
        let ptr = *cursor;
        if ptr >= self.0 {
            return Err(overflow());
        }
        *cursor = ptr + 1;
        Ok(self.1[ptr])
    }

    pub fn read_bytes(&self, len: usize, cursor: &mut usize) -> Result<&[u8]> {
        let ptr = *cursor;
        let end = ptr + len;
        if end > self.0 {
            return Err(overflow());
        }
        *cursor = end;
        Ok(&self.1[ptr..end])
    }

    pub fn read_bytes_fixed<const S: usize>(&self, cursor: &mut usize) -> Result<[u8; S]> {
        let mut out = [0u8; S];
        out.copy_from_slice(self.read_bytes(S, cursor)?);
        Ok(out)
    }

    pub fn read_u16(&self, cursor: &mut usize) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_bytes_fixed::<2>(cursor)?))
    }

    pub fn read_u32(&self, cursor: &mut usize) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_bytes_fixed::<4>(cursor)?))
    }

    pub fn read_string(&self, cursor: &mut usize) -> Result<String> {
        let len = self.read_u32(cursor)? as usize;
        let b = self.read_bytes(len, cursor)?;
        String::from_utf8(b.to_vec()).map_err(|e| KurupiraError::Parse(e.to_string()))
    }

    /// Reads an mpint and returns its (sign, magnitude) pair. Sign is 0 or 1; the
    /// protocol never negotiates negative values but the field is preserved on
    /// the wire so a peer running a differently ordered implementation round-trips.
    pub fn read_mpint(&self, cursor: &mut usize) -> Result<(u8, Vec<u8>)> {
        let len = self.read_u32(cursor)? as usize;
        let sign = self.read_u8(cursor)?;
        let magnitude = self.read_bytes(len, cursor)?.to_vec();
        Ok((sign, magnitude))
    }
}

impl<const L: usize> PartialEq for Buffer<L> {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const L: usize> Eq for Buffer<L> {}

impl<const L: usize> AsRef<[u8]> for Buffer<L> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_primitive_fields() {
        let mut b = Buffer::<128>::new();
        b.append_u8(7).unwrap();
        b.append_u16(0xBEEF).unwrap();
        b.append_string("blowfish-cbc;none").unwrap();
        b.append_mpint(&[0xFF, 0x01, 0x02]).unwrap();

        let mut c = 0usize;
        assert_eq!(b.read_u8(&mut c).unwrap(), 7);
        assert_eq!(b.read_u16(&mut c).unwrap(), 0xBEEF);
        assert_eq!(b.read_string(&mut c).unwrap(), "blowfish-cbc;none");
        let (sign, mag) = b.read_mpint(&mut c).unwrap();
        assert_eq!(sign, 0);
        assert_eq!(mag, vec![0xFF, 0x01, 0x02]);
        assert_eq!(c, b.len());
    }

    #[test]
    fn refuses_reads_past_written_length() {
        let mut b = Buffer::<4>::new();
        b.append_u16(1).unwrap();
        let mut c = 0usize;
        assert!(b.read_u32(&mut c).is_err());
    }

    #[test]
    fn refuses_appends_past_capacity() {
        let mut b = Buffer::<2>::new();
        assert!(b.append_bytes(&[1, 2, 3]).is_err());
    }
}
