// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the uncompressed, LZ4, and snappy frame body compression.

use anyhow::anyhow;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    convert::TryInto,
    str::FromStr,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("Failed to compress the frame: {0}")]
    BadCompression(anyhow::Error),
    #[error("Failed to decompress the frame: {0}")]
    BadDecompression(anyhow::Error),
    #[error("Buffer is too small")]
    SmallBuffer,
}

/// The frame body compression negotiated at startup.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Lz4,
    Snappy,
}

impl Default for Compression {
    fn default() -> Self {
        Self::None
    }
}

impl Compression {
    /// The name sent in the STARTUP `COMPRESSION` option.
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Lz4 => Some("lz4"),
            Self::Snappy => Some("snappy"),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.kind().is_some()
    }

    /// Compress a frame body. LZ4 bodies are prefixed with their uncompressed length.
    pub(crate) fn compress_body(&self, body: &[u8]) -> Result<Vec<u8>, CompressionError> {
        match self {
            Self::None => Ok(body.to_vec()),
            Self::Lz4 => {
                let mut compressed = (body.len() as i32).to_be_bytes().to_vec();
                compressed.extend(lz4_flex::block::compress(body));
                Ok(compressed)
            }
            Self::Snappy => snap::raw::Encoder::new()
                .compress_vec(body)
                .map_err(|e| CompressionError::BadCompression(e.into())),
        }
    }

    /// Decompress a frame body.
    pub(crate) fn decompress_body(&self, body: &[u8]) -> Result<Vec<u8>, CompressionError> {
        match self {
            Self::None => Ok(body.to_vec()),
            Self::Lz4 => {
                if body.len() < 4 {
                    return Err(CompressionError::SmallBuffer);
                }
                let size = i32::from_be_bytes(
                    body[0..4]
                        .try_into()
                        .map_err(|e| CompressionError::BadDecompression(anyhow!("{}", e)))?,
                );
                // lz4 fails on a zero-sized body
                if size <= 0 {
                    return Ok(Vec::new());
                }
                lz4_flex::block::decompress(&body[4..], size as usize)
                    .map_err(|e| CompressionError::BadDecompression(anyhow!("{:?}", e)))
            }
            Self::Snappy => snap::raw::Decoder::new()
                .decompress_vec(body)
                .map_err(|e| CompressionError::BadDecompression(e.into())),
        }
    }
}

impl FromStr for Compression {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "lz4" => Ok(Self::Lz4),
            "snappy" => Ok(Self::Snappy),
            other => Err(anyhow!("Unknown compression: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodies_round_trip() {
        let body = b"SELECT keyname FROM cf_test WHERE t1bValue = ? AND t1iValue = ?".repeat(8);
        for compression in [Compression::None, Compression::Lz4, Compression::Snappy] {
            let compressed = compression.compress_body(&body).unwrap();
            assert_eq!(compression.decompress_body(&compressed).unwrap(), body, "{:?}", compression);
        }
    }

    #[test]
    fn lz4_bodies_carry_the_uncompressed_length() {
        let compressed = Compression::Lz4.compress_body(&[7; 100]).unwrap();
        assert_eq!(&compressed[..4], &[0, 0, 0, 100]);
        assert!(compressed.len() < 100);
        assert!(matches!(
            Compression::Lz4.decompress_body(&[0, 0]),
            Err(CompressionError::SmallBuffer)
        ));
        assert!(Compression::Lz4.decompress_body(&[0, 0, 0, 0]).unwrap().is_empty());
    }

    #[test]
    fn parses_configuration_names() {
        assert_eq!("LZ4".parse::<Compression>().unwrap(), Compression::Lz4);
        assert_eq!("none".parse::<Compression>().unwrap(), Compression::None);
        assert!("zstd".parse::<Compression>().is_err());
        assert_eq!(Compression::Snappy.kind(), Some("snappy"));
    }
}
