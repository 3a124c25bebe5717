//! Length framing and size padding for published blobs.
//!
//! Wire layout:
//!
//! ```text
//! [u32 BE: N][N bytes: compressed payload][P bytes of FILLER_BYTE]
//! ```
//!
//! The total length is the next multiple of [`PADDING_BLOCK_SIZE`] strictly
//! above the framed length, so padding is always between 1 and
//! `PADDING_BLOCK_SIZE` bytes. Readers take exactly `N` payload bytes and
//! ignore the rest.

use std::num::NonZeroUsize;

use thiserror::Error;

/// Size of the length header.
pub const HEADER_LEN: usize = 4;

/// Granularity of published blob sizes.
pub const PADDING_BLOCK_SIZE: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(n) => n,
    None => unreachable!(),
};

/// Filler appended after the payload.
pub const FILLER_BYTE: u8 = b'P';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload of {0} bytes does not fit a 4-byte length header")]
    PayloadTooLarge(usize),
    #[error("blob is {0} bytes, shorter than the length header")]
    MissingHeader(usize),
    #[error("header declares {declared} payload bytes but only {available} follow")]
    Truncated { declared: usize, available: usize },
}

/// Prefix `payload` with its big-endian `u32` length.
pub fn frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge(payload.len()))?;
    let mut framed = Vec::with_capacity(HEADER_LEN + payload.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(payload);
    Ok(framed)
}

/// Read the header and return exactly the declared payload; trailing bytes are padding.
pub fn unframe(blob: &[u8]) -> Result<&[u8], FrameError> {
    let Some((header, rest)) = blob.split_first_chunk::<HEADER_LEN>() else {
        return Err(FrameError::MissingHeader(blob.len()));
    };
    let declared = u32::from_be_bytes(*header) as usize;
    rest.get(..declared).ok_or(FrameError::Truncated {
        declared,
        available: rest.len(),
    })
}

/// Reader-side name for [`unframe`]: drop the header and padding.
pub fn strip_padding(blob: &[u8]) -> Result<&[u8], FrameError> {
    unframe(blob)
}

/// Pad to the published block size.
pub fn pad(framed: Vec<u8>) -> Vec<u8> {
    pad_to(framed, PADDING_BLOCK_SIZE)
}

/// Pad up to the next multiple of `block_size` above `framed.len()`.
///
/// An exact multiple still gains a full block.
pub fn pad_to(mut framed: Vec<u8>, block_size: NonZeroUsize) -> Vec<u8> {
    let block = block_size.get();
    let target = (framed.len() / block + 1) * block;
    framed.resize(target, FILLER_BYTE);
    framed
}
