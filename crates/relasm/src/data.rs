//! Small-buffer-optimized byte payload for raw data nodes.

use alloc::boxed::Box;
use alloc::vec::Vec;

/// Inline capacity of [`Data`] in bytes.
pub const INLINE_CAPACITY: usize = 8;

/// Raw bytes embedded in the instruction stream.
///
/// Payloads of up to [`INLINE_CAPACITY`] bytes are stored inline with no heap
/// allocation for the common `db`/`dw`/`dd`/`dq` cases.  Larger payloads own a
/// boxed slice.  Cloning deep-copies; [`Data::take`] moves the payload out and
/// leaves an empty value behind.
///
/// The storage mode is chosen by the constructors and is not observable
/// beyond [`Data::is_inline`].  With the `serde` feature a payload
/// serializes as its byte sequence.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(from = "Vec<u8>", into = "Vec<u8>")
)]
pub struct Data(Repr);

#[derive(Clone, PartialEq, Eq, Hash)]
enum Repr {
    /// Only `bytes[..len]` is meaningful; `len <= INLINE_CAPACITY`.
    Inline {
        bytes: [u8; INLINE_CAPACITY],
        len: u8,
    },
    /// Always longer than the inline capacity.
    Heap(Box<[u8]>),
}

impl Data {
    /// An empty payload.
    #[inline]
    pub const fn new() -> Self {
        Data(Repr::Inline {
            bytes: [0; INLINE_CAPACITY],
            len: 0,
        })
    }

    /// Copy `src` into a new payload.
    pub fn from_slice(src: &[u8]) -> Self {
        if src.len() <= INLINE_CAPACITY {
            Data::inline_le(src)
        } else {
            Data(Repr::Heap(Box::from(src)))
        }
    }

    /// Repeat `byte` `count` times (`.fill` / `times n db x`).
    pub fn filled(byte: u8, count: usize) -> Self {
        if count <= INLINE_CAPACITY {
            let mut bytes = [0; INLINE_CAPACITY];
            bytes[..count].fill(byte);
            Data(Repr::Inline {
                bytes,
                len: count as u8,
            })
        } else {
            Data(Repr::Heap(alloc::vec![byte; count].into_boxed_slice()))
        }
    }

    /// `src` must fit the inline capacity.
    #[inline]
    fn inline_le(src: &[u8]) -> Self {
        let mut bytes = [0; INLINE_CAPACITY];
        bytes[..src.len()].copy_from_slice(src);
        Data(Repr::Inline {
            bytes,
            len: src.len() as u8,
        })
    }

    /// Read-only view of the payload regardless of storage mode.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match &self.0 {
            Repr::Inline { bytes, len } => &bytes[..*len as usize],
            Repr::Heap(b) => b,
        }
    }

    /// Payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        match &self.0 {
            Repr::Inline { len, .. } => *len as usize,
            Repr::Heap(b) => b.len(),
        }
    }

    /// Whether the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the payload lives in inline storage.
    #[inline]
    pub fn is_inline(&self) -> bool {
        matches!(self.0, Repr::Inline { .. })
    }

    /// Move the payload out, leaving an empty inline value in `self`.
    #[inline]
    pub fn take(&mut self) -> Data {
        core::mem::take(self)
    }

    /// Copy the payload into a `Vec`.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    #[inline]
    fn inline_exact(&self, width: usize) -> Option<&[u8]> {
        match &self.0 {
            Repr::Inline { bytes, len } if *len as usize == width => Some(&bytes[..width]),
            _ => None,
        }
    }

    /// Inline and exactly one byte wide.
    pub fn is_u8(&self) -> bool {
        self.inline_exact(1).is_some()
    }

    /// Inline and exactly two bytes wide.
    pub fn is_u16(&self) -> bool {
        self.inline_exact(2).is_some()
    }

    /// Inline and exactly four bytes wide.
    pub fn is_u32(&self) -> bool {
        self.inline_exact(4).is_some()
    }

    /// Inline and exactly eight bytes wide.
    pub fn is_u64(&self) -> bool {
        self.inline_exact(8).is_some()
    }

    /// The value as `u8` when [`is_u8`](Self::is_u8) holds.
    pub fn as_u8(&self) -> Option<u8> {
        self.inline_exact(1).map(|b| b[0])
    }

    /// The value as little-endian `u16` when [`is_u16`](Self::is_u16) holds.
    pub fn as_u16(&self) -> Option<u16> {
        self.inline_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    /// The value as little-endian `u32` when [`is_u32`](Self::is_u32) holds.
    pub fn as_u32(&self) -> Option<u32> {
        self.inline_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// The value as little-endian `u64` when [`is_u64`](Self::is_u64) holds.
    pub fn as_u64(&self) -> Option<u64> {
        self.inline_exact(8).map(|b| {
            u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
        })
    }
}

impl Default for Data {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl From<u8> for Data {
    fn from(v: u8) -> Self {
        Data::inline_le(&[v])
    }
}

impl From<u16> for Data {
    fn from(v: u16) -> Self {
        Data::inline_le(&v.to_le_bytes())
    }
}

impl From<u32> for Data {
    fn from(v: u32) -> Self {
        Data::inline_le(&v.to_le_bytes())
    }
}

impl From<u64> for Data {
    fn from(v: u64) -> Self {
        Data::inline_le(&v.to_le_bytes())
    }
}

impl From<&[u8]> for Data {
    fn from(src: &[u8]) -> Self {
        Data::from_slice(src)
    }
}

impl From<Vec<u8>> for Data {
    fn from(v: Vec<u8>) -> Self {
        if v.len() <= INLINE_CAPACITY {
            Data::from_slice(&v)
        } else {
            Data(Repr::Heap(v.into_boxed_slice()))
        }
    }
}

impl From<Data> for Vec<u8> {
    fn from(data: Data) -> Self {
        match data.0 {
            Repr::Inline { bytes, len } => bytes[..len as usize].to_vec(),
            Repr::Heap(b) => b.into_vec(),
        }
    }
}

impl core::ops::Deref for Data {
    type Target = [u8];
    #[inline]
    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for Data {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl core::fmt::Debug for Data {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mode = if self.is_inline() { "Inline" } else { "Heap" };
        write!(f, "Data::{}({:02X?})", mode, self.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_constructors_are_inline() {
        let d = Data::from(0xABu8);
        assert!(d.is_inline());
        assert!(d.is_u8());
        assert!(!d.is_u16());
        assert_eq!(d.as_u8(), Some(0xAB));

        let d = Data::from(0xBEEFu16);
        assert!(d.is_u16());
        assert_eq!(d.as_u16(), Some(0xBEEF));
        assert_eq!(d.as_bytes(), &[0xEF, 0xBE]);

        let d = Data::from(0xDEAD_BEEFu32);
        assert!(d.is_u32());
        assert_eq!(d.as_u32(), Some(0xDEAD_BEEF));

        let d = Data::from(0x123C_312F_2132_9F31u64);
        assert!(d.is_u64());
        assert_eq!(d.as_u64(), Some(0x123C_312F_2132_9F31));
        assert_eq!(d.len(), 8);
    }

    #[test]
    fn width_accessors_reject_mismatch() {
        let d = Data::from(7u32);
        assert_eq!(d.as_u8(), None);
        assert_eq!(d.as_u64(), None);
        assert!(!d.is_u64());
    }

    #[test]
    fn slice_up_to_eight_is_inline() {
        let d = Data::from_slice(&[1, 2, 3]);
        assert!(d.is_inline());
        assert_eq!(d.as_bytes(), &[1, 2, 3]);

        let d = Data::from_slice(&[0; 8]);
        assert!(d.is_inline());
        assert!(d.is_u64());
    }

    #[test]
    fn large_slice_is_heap_and_detached() {
        let mut src = vec![0x11u8; 32];
        let d = Data::from_slice(&src);
        src[0] = 0xFF;
        assert!(!d.is_inline());
        assert!(!d.is_u64());
        assert_eq!(d.len(), 32);
        assert_eq!(d[0], 0x11);
    }

    #[test]
    fn clone_of_heap_is_deep() {
        let source = Data::from(vec![0x22u8; 16]);
        let copy = source.clone();
        let mut bytes = Vec::from(copy);
        bytes[3] = 0x99;
        assert_eq!(source[3], 0x22);
        assert_eq!(bytes[3], 0x99);
        assert_eq!(source.len(), 16);
    }

    #[test]
    fn take_leaves_empty_source() {
        let mut src = Data::from(vec![5u8; 12]);
        let moved = src.take();
        assert_eq!(moved.len(), 12);
        assert!(src.is_empty());
        assert!(src.is_inline());
        src = Data::from(1u16);
        assert_eq!(src.as_u16(), Some(1));
    }

    #[test]
    fn filled_small_and_large() {
        assert_eq!(Data::filled(0xCC, 3).as_bytes(), &[0xCC; 3]);
        let big = Data::filled(0x90, 20);
        assert!(!big.is_inline());
        assert!(big.iter().all(|&b| b == 0x90));
    }

    #[test]
    fn into_vec_matches_bytes() {
        assert_eq!(Vec::from(Data::from(0x0102u16)), vec![0x02, 0x01]);
        assert_eq!(Vec::from(Data::filled(3, 9)), vec![3; 9]);
        assert_eq!(Vec::from(Data::new()), Vec::<u8>::new());
    }

    #[test]
    fn empty_default() {
        let d = Data::default();
        assert!(d.is_empty());
        assert!(!d.is_u8());
    }
}
