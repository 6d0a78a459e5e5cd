use std::sync::Arc;

/// An immutable, shareable view over the raw bytes of one loaded container.
///
/// Cloning a `ByteSource` only bumps a reference count; the bytes themselves are
/// never mutated. All corruption happens on a separate working copy obtained
/// through [`ByteSource::to_working_copy`].
#[derive(Clone, PartialEq, Eq)]
pub struct ByteSource {
    bytes: Arc<[u8]>,
}

impl ByteSource {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn starts_with(&self, signature: &[u8]) -> bool {
        self.bytes.starts_with(signature)
    }

    /// Returns the byte at `index`, or `None` past the end.
    pub fn byte_at(&self, index: usize) -> Option<u8> {
        self.bytes.get(index).copied()
    }

    /// Reads a big-endian `u16` starting at `index`.
    pub fn u16_be_at(&self, index: usize) -> Option<u16> {
        let hi = self.byte_at(index)?;
        let lo = self.byte_at(index.checked_add(1)?)?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    /// Returns `len` bytes starting at `offset` if the whole span is in bounds.
    pub fn slice(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        self.bytes.get(offset..end)
    }

    /// Allocates a fresh, writable copy of the bytes.
    ///
    /// The copy never shares storage with the source or with any earlier copy.
    pub fn to_working_copy(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

impl From<Vec<u8>> for ByteSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for ByteSource {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteSource")
            .field("len", &self.bytes.len())
            .finish()
    }
}
