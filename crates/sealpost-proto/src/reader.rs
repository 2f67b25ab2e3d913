//! Bounds-checked cursor over untrusted bytes.

use crate::errors::{ProtocolError, Result};

/// Forward-only reader. Every read is length-checked before slicing, so
/// malformed input surfaces as [`ProtocolError::Truncated`] instead of a panic.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Bytes consumed so far.
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    pub(crate) fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(ProtocolError::InvalidLength { field, len })?;
        let slice = self.bytes.get(self.pos..end).ok_or(ProtocolError::Truncated {
            field,
            expected: len,
            actual: self.remaining(),
        })?;
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self, field: &'static str) -> Result<u8> {
        Ok(self.array::<1>(field)?[0])
    }

    pub(crate) fn u16(&mut self, field: &'static str) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array(field)?))
    }

    /// 24-bit big-endian length.
    pub(crate) fn u24(&mut self, field: &'static str) -> Result<u32> {
        let [a, b, c] = self.array::<3>(field)?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_advance_position() {
        let mut r = Reader::new(&[1, 0, 2, 0, 0, 3]);
        assert_eq!(r.u8("a").unwrap(), 1);
        assert_eq!(r.u16("b").unwrap(), 2);
        assert_eq!(r.u24("c").unwrap(), 3);
        assert_eq!(r.position(), 6);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn short_read_reports_field() {
        let mut r = Reader::new(&[1, 2]);
        let err = r.take(5, "ephemeral key").unwrap_err();
        let expected = ProtocolError::Truncated { field: "ephemeral key", expected: 5, actual: 2 };
        assert_eq!(err, expected);
        // Failed read does not move the cursor.
        assert_eq!(r.position(), 0);
    }
}
