// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! The file trailer: `... [metadata][metadata_len: i32 le][magic]`.

use bytes::Bytes;
use snafu::location;
use strata_core::{Error, Result};

pub const MAGIC: &[u8; 4] = b"PAR1";
/// Magic of files with encrypted footers.  Recognized, not decrypted.
pub const ENCRYPTED_MAGIC: &[u8; 4] = b"PARE";

const TRAILER_LEN: usize = 8;

/// Locate the footer metadata bytes within a mapped file.
pub fn metadata_bytes(file: &Bytes, path: &str) -> Result<Bytes> {
    if file.len() < MAGIC.len() + TRAILER_LEN {
        return Err(Error::corrupt(
            path,
            format!("file of {} bytes is too short to hold a footer", file.len()),
            location!(),
        ));
    }
    let trailer = &file[file.len() - TRAILER_LEN..];
    let magic = &trailer[4..];
    if magic == ENCRYPTED_MAGIC {
        return Err(Error::unsupported(
            format!("file {path} has an encrypted footer"),
            location!(),
        ));
    }
    if magic != MAGIC {
        return Err(Error::corrupt(
            path,
            format!("bad trailing magic {magic:?}"),
            location!(),
        ));
    }
    let metadata_len = i32::from_le_bytes(trailer[..4].try_into().unwrap());
    let metadata_len = usize::try_from(metadata_len).map_err(|_| {
        Error::corrupt(
            path,
            format!("negative footer metadata length {metadata_len}"),
            location!(),
        )
    })?;
    let metadata_end = file.len() - TRAILER_LEN;
    let metadata_start = metadata_end.checked_sub(metadata_len).ok_or_else(|| {
        Error::corrupt(
            path,
            format!(
                "footer metadata length {metadata_len} exceeds file length {}",
                file.len()
            ),
            location!(),
        )
    })?;
    Ok(file.slice(metadata_start..metadata_end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_with_footer(metadata: &[u8], magic: &[u8; 4]) -> Bytes {
        let mut out = MAGIC.to_vec(); // leading magic
        out.extend_from_slice(metadata);
        out.extend_from_slice(&(metadata.len() as i32).to_le_bytes());
        out.extend_from_slice(magic);
        Bytes::from(out)
    }

    #[test]
    fn test_locates_metadata() {
        let file = file_with_footer(b"thrift bytes here", MAGIC);
        let metadata = metadata_bytes(&file, "f.parquet").unwrap();
        assert_eq!(metadata.as_ref(), b"thrift bytes here");
    }

    #[test]
    fn test_encrypted_footer_is_unsupported() {
        let file = file_with_footer(b"ciphertext", ENCRYPTED_MAGIC);
        assert!(matches!(
            metadata_bytes(&file, "f.parquet"),
            Err(Error::Unsupported { .. })
        ));
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let file = file_with_footer(b"meta", b"NOPE");
        assert!(matches!(
            metadata_bytes(&file, "f.parquet"),
            Err(Error::Corrupt { .. })
        ));
    }

    #[test]
    fn test_oversized_length_is_corrupt() {
        let mut out = b"PAR1".to_vec();
        out.extend_from_slice(&1000i32.to_le_bytes());
        out.extend_from_slice(MAGIC);
        assert!(matches!(
            metadata_bytes(&Bytes::from(out), "f.parquet"),
            Err(Error::Corrupt { .. })
        ));
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        assert!(matches!(
            metadata_bytes(&Bytes::from_static(b"PAR1"), "f.parquet"),
            Err(Error::Corrupt { .. })
        ));
    }
}
