// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

use std::ops::Deref;

use bytes::Bytes;

/// A copy-on-write byte buffer.
///
/// Page payloads arrive as zero-copy slices of the file mapping
/// ("borrowed") but become owned vectors once a codec has run.  Decoders
/// accept either without caring which.
#[derive(Debug)]
pub enum StrataBuffer {
    Borrowed(Bytes),
    Owned(Vec<u8>),
}

impl StrataBuffer {
    /// Convert into a mutable vector.  Borrowed buffers are copied.
    pub fn into_owned(self) -> Vec<u8> {
        match self {
            Self::Borrowed(bytes) => bytes.to_vec(),
            Self::Owned(vec) => vec,
        }
    }

    /// Convert into [`Bytes`].  Never copies data.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Borrowed(bytes) => bytes,
            Self::Owned(vec) => Bytes::from(vec),
        }
    }

    pub fn len(&self) -> usize {
        self.as_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_ref().is_empty()
    }
}

impl AsRef<[u8]> for StrataBuffer {
    fn as_ref(&self) -> &[u8] {
        match self {
            Self::Borrowed(bytes) => bytes.as_ref(),
            Self::Owned(vec) => vec.as_slice(),
        }
    }
}

impl Deref for StrataBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

impl From<Vec<u8>> for StrataBuffer {
    fn from(vec: Vec<u8>) -> Self {
        Self::Owned(vec)
    }
}

impl From<Bytes> for StrataBuffer {
    fn from(bytes: Bytes) -> Self {
        Self::Borrowed(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_borrowed_into_bytes_is_zero_copy() {
        let bytes = Bytes::from_static(b"page payload");
        let ptr = bytes.as_ptr();
        let buffer = StrataBuffer::from(bytes);
        assert_eq!(buffer.into_bytes().as_ptr(), ptr);
    }

    #[test]
    fn test_owned_roundtrip() {
        let buffer = StrataBuffer::from(vec![1u8, 2, 3]);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.into_owned(), vec![1, 2, 3]);
    }
}
