// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! Decompressors for page payloads.
//!
//! The format names the codec per column chunk; a page hands its
//! compressed payload and the expected uncompressed length to the
//! decompressor looked up from the registry.  Hosts may override or
//! extend the registry when they carry their own codec builds.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use snafu::location;
use strata_core::{Error, Result};

use crate::format::Codec;

/// A single-method codec interface.  `uncompressed_len` is the exact
/// output size the page header promised.
pub trait Decompressor: std::fmt::Debug + Send + Sync {
    fn decompress(&self, src: &[u8], uncompressed_len: usize) -> Result<Vec<u8>>;
}

#[derive(Debug, Default)]
pub struct SnappyDecompressor;

impl Decompressor for SnappyDecompressor {
    fn decompress(&self, src: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; uncompressed_len];
        let written = snap::raw::Decoder::new()
            .decompress(src, &mut out)
            .map_err(|e| Error::io(format!("snappy decompression failed: {e}"), location!()))?;
        out.truncate(written);
        Ok(out)
    }
}

#[derive(Debug, Default)]
pub struct GzipDecompressor;

impl Decompressor for GzipDecompressor {
    fn decompress(&self, src: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        let mut decoder = flate2::read::GzDecoder::new(src);
        let mut out = Vec::with_capacity(uncompressed_len);
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::io(format!("gzip decompression failed: {e}"), location!()))?;
        Ok(out)
    }
}

#[derive(Debug, Default)]
pub struct ZstdDecompressor;

impl Decompressor for ZstdDecompressor {
    fn decompress(&self, src: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        zstd::bulk::decompress(src, uncompressed_len)
            .map_err(|e| Error::io(format!("zstd decompression failed: {e}"), location!()))
    }
}

/// The raw (unframed) lz4 block codec.
#[derive(Debug, Default)]
pub struct Lz4RawDecompressor;

impl Decompressor for Lz4RawDecompressor {
    fn decompress(&self, src: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        lz4_flex::block::decompress(src, uncompressed_len)
            .map_err(|e| Error::io(format!("lz4 raw decompression failed: {e}"), location!()))
    }
}

/// The legacy `LZ4` codec.  Most writers emit the Hadoop framing
/// (`[uncompressed_len: u32 be][compressed_len: u32 be][block]` repeated);
/// a few emit the lz4 frame format.  Both are accepted.
#[derive(Debug, Default)]
pub struct Lz4HadoopDecompressor;

impl Lz4HadoopDecompressor {
    fn try_hadoop(src: &[u8], uncompressed_len: usize) -> Option<Vec<u8>> {
        let mut out = Vec::with_capacity(uncompressed_len);
        let mut rest = src;
        while !rest.is_empty() {
            if rest.len() < 8 {
                return None;
            }
            let block_uncompressed = u32::from_be_bytes(rest[0..4].try_into().unwrap()) as usize;
            let block_compressed = u32::from_be_bytes(rest[4..8].try_into().unwrap()) as usize;
            rest = &rest[8..];
            if block_compressed > rest.len() || out.len() + block_uncompressed > uncompressed_len {
                return None;
            }
            let block =
                lz4_flex::block::decompress(&rest[..block_compressed], block_uncompressed).ok()?;
            out.extend_from_slice(&block);
            rest = &rest[block_compressed..];
        }
        (out.len() == uncompressed_len).then_some(out)
    }
}

impl Decompressor for Lz4HadoopDecompressor {
    fn decompress(&self, src: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        if let Some(out) = Self::try_hadoop(src, uncompressed_len) {
            return Ok(out);
        }
        let mut decoder = lz4_flex::frame::FrameDecoder::new(src);
        let mut out = Vec::with_capacity(uncompressed_len);
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::io(format!("lz4 decompression failed: {e}"), location!()))?;
        Ok(out)
    }
}

/// Codec lookup, a static table keyed by [`Codec`].
#[derive(Debug)]
pub struct DecompressorRegistry {
    codecs: HashMap<Codec, Arc<dyn Decompressor>>,
}

impl Default for DecompressorRegistry {
    fn default() -> Self {
        let mut codecs: HashMap<Codec, Arc<dyn Decompressor>> = HashMap::new();
        codecs.insert(Codec::Snappy, Arc::new(SnappyDecompressor));
        codecs.insert(Codec::Gzip, Arc::new(GzipDecompressor));
        codecs.insert(Codec::Zstd, Arc::new(ZstdDecompressor));
        codecs.insert(Codec::Lz4Raw, Arc::new(Lz4RawDecompressor));
        codecs.insert(Codec::Lz4, Arc::new(Lz4HadoopDecompressor));
        Self { codecs }
    }
}

impl DecompressorRegistry {
    /// Register (or replace) a codec implementation.
    pub fn with_decompressor(mut self, codec: Codec, decompressor: Arc<dyn Decompressor>) -> Self {
        self.codecs.insert(codec, decompressor);
        self
    }

    pub fn get(&self, codec: Codec) -> Result<&dyn Decompressor> {
        match self.codecs.get(&codec) {
            Some(decompressor) => Ok(decompressor.as_ref()),
            None => Err(Error::unsupported(
                format!("no decompressor registered for codec {codec}"),
                location!(),
            )),
        }
    }
}
