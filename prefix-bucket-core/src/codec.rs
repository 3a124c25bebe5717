//! Payload serialization and compression.
//!
//! [`encode`] turns a [`ResponseBundle`] into protobuf bytes using the
//! messages in [`crate::schema`]; [`BrotliCompressor`] shrinks those bytes.
//! Both are deterministic: the same bundle always produces the same bytes.

use std::io;

use brotli::enc::BrotliEncoderParams;
use prost::Message;
use thiserror::Error;

use crate::entry::ResponseBundle;
use crate::schema::ChannelResponseList;

/// Brotli quality used for published buckets.
pub const DEFAULT_QUALITY: i32 = 11;
/// Brotli window size (log2) used for published buckets.
pub const DEFAULT_LGWIN: i32 = 22;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload is not a valid channel response list: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("payload carries unknown wallet state {0}")]
    UnknownWalletState(i32),
    #[error("compression failed: {0}")]
    Compress(#[source] io::Error),
    #[error("decompression failed: {0}")]
    Decompress(#[source] io::Error),
}

/// Serialize a bundle. Entry order is kept as-is.
pub fn encode(bundle: &ResponseBundle) -> Vec<u8> {
    ChannelResponseList::from(bundle).encode_to_vec()
}

/// Parse bytes produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<ResponseBundle, CodecError> {
    let list = ChannelResponseList::decode(bytes)?;
    ResponseBundle::try_from(list).map_err(|e| CodecError::UnknownWalletState(e.0))
}

/// Brotli with fixed parameters.
#[derive(Debug, Clone, Copy)]
pub struct BrotliCompressor {
    quality: i32,
    lgwin: i32,
}

impl BrotliCompressor {
    pub fn new(quality: i32, lgwin: i32) -> Self {
        Self { quality, lgwin }
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let params = BrotliEncoderParams {
            quality: self.quality,
            lgwin: self.lgwin,
            ..Default::default()
        };
        let mut input = data;
        let mut out = Vec::with_capacity(data.len() / 2 + 64);
        brotli::BrotliCompress(&mut input, &mut out, &params).map_err(CodecError::Compress)?;
        Ok(out)
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut input = data;
        let mut out = Vec::with_capacity(data.len() * 4);
        brotli::BrotliDecompress(&mut input, &mut out).map_err(CodecError::Decompress)?;
        Ok(out)
    }
}

impl Default for BrotliCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY, DEFAULT_LGWIN)
    }
}
