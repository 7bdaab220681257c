//! Payload compression.
//!
//! A compressed payload is the marker byte `z` followed by a zstd frame.
//! Compression is only kept when it strictly shrinks the payload.

use crate::core::{
    CodecError, COMPRESSION_MARKER, MAX_COMPRESSION_LEVEL, MAX_DECOMPRESSED_SIZE, MIN_COMPRESS_SIZE,
};

/// Thresholds and level for [`Compressor`].
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Payloads of this size or smaller are left alone
    pub min_size: usize,
    /// Compression level (1-9)
    pub level: u8,
    /// Decompression stops with an error past this many bytes
    pub max_decompressed_size: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            min_size: MIN_COMPRESS_SIZE,
            level: MAX_COMPRESSION_LEVEL,
            max_decompressed_size: MAX_DECOMPRESSED_SIZE,
        }
    }
}

/// zstd compressor for message payloads.
#[derive(Debug, Clone)]
pub struct Compressor {
    config: CompressionConfig,
}

impl Compressor {
    /// Create a compressor with the given level (clamped to 1-9)
    pub fn new(level: u8) -> Self {
        let mut compressor = Self::with_config(CompressionConfig::default());
        compressor.set_level(level);
        compressor
    }

    /// Create a compressor from explicit settings.
    pub fn with_config(config: CompressionConfig) -> Self {
        Self { config }
    }

    /// Whether a compression backend was compiled in
    pub const fn is_available() -> bool {
        cfg!(feature = "compression")
    }

    /// Change the level, clamped to 1-9.
    pub fn set_level(&mut self, level: u8) {
        self.config.level = level.clamp(1, MAX_COMPRESSION_LEVEL);
    }

    /// Level in effect.
    pub fn level(&self) -> u8 {
        self.config.level
    }

    /// Compress data if it is above the size threshold and compression pays off.
    ///
    /// A `Compressed` result already carries the marker byte.
    pub fn compress(&self, data: &[u8]) -> Result<CompressResult, CodecError> {
        if data.len() <= self.config.min_size || !Self::is_available() {
            return Ok(CompressResult::Uncompressed(data.to_vec()));
        }

        let mut out = Vec::with_capacity(data.len());
        out.push(COMPRESSION_MARKER);
        out.extend_from_slice(&self.encode(data)?);

        tracing::debug!(original = data.len(), compressed = out.len(), "compressed payload");

        if out.len() >= data.len() {
            return Ok(CompressResult::NoGain(data.to_vec()));
        }

        Ok(CompressResult::Compressed(out))
    }

    /// Decompress a payload that starts with the marker byte.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.decompress_with_limit(data, self.config.max_decompressed_size)
    }

    /// Decompress with an explicit size limit
    pub fn decompress_with_limit(&self, data: &[u8], max_size: usize) -> Result<Vec<u8>, CodecError> {
        match data.split_first() {
            Some((&COMPRESSION_MARKER, body)) => self.decode(body, max_size),
            _ => Err(CodecError::DecompressionFailed("missing compression marker".into())),
        }
    }

    #[cfg(feature = "compression")]
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::encode_all(data, i32::from(self.config.level))
            .map_err(|e| CodecError::CompressionFailed(e.to_string()))
    }

    #[cfg(not(feature = "compression"))]
    fn encode(&self, _data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::CompressionFailed("compression support not built".into()))
    }

    #[cfg(feature = "compression")]
    fn decode(&self, body: &[u8], max_size: usize) -> Result<Vec<u8>, CodecError> {
        use std::io::Read;

        let decoder = zstd::Decoder::new(body)
            .map_err(|e| CodecError::DecompressionFailed(e.to_string()))?;

        // Read one byte past the limit to detect overflow without unbounded growth
        let mut output = Vec::new();
        decoder
            .take(max_size as u64 + 1)
            .read_to_end(&mut output)
            .map_err(|e| CodecError::DecompressionFailed(e.to_string()))?;

        if output.len() > max_size {
            return Err(CodecError::SizeExceeded {
                size: output.len(),
                limit: max_size,
            });
        }

        Ok(output)
    }

    #[cfg(not(feature = "compression"))]
    fn decode(&self, _body: &[u8], _max_size: usize) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::DecompressionFailed("compression support not built".into()))
    }
}

/// What [`Compressor::compress`] decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressResult {
    /// Marker byte followed by compressed data
    Compressed(Vec<u8>),
    /// Too small to bother
    Uncompressed(Vec<u8>),
    /// Compressed form was not smaller; original kept
    NoGain(Vec<u8>),
}

impl CompressResult {
    /// Bytes to put on the wire.
    pub fn data(&self) -> &[u8] {
        match self {
            CompressResult::Compressed(data)
            | CompressResult::Uncompressed(data)
            | CompressResult::NoGain(data) => data,
        }
    }

    /// True for the marker-prefixed form.
    pub fn is_compressed(&self) -> bool {
        matches!(self, CompressResult::Compressed(_))
    }

    /// Take the wire bytes.
    pub fn into_data(self) -> Vec<u8> {
        match self {
            CompressResult::Compressed(data)
            | CompressResult::Uncompressed(data)
            | CompressResult::NoGain(data) => data,
        }
    }
}

/// Running totals of compression decisions for one destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressionStats {
    /// Payload bytes seen
    pub total_uncompressed: u64,
    /// Bytes emitted, marker included
    pub total_compressed: u64,
    /// Payloads sent compressed
    pub compressed_count: u64,
    /// Number of payloads skipped (too small, no benefit, or failure)
    pub skipped_count: u64,
}

impl CompressionStats {
    /// Emitted bytes over payload bytes; 1.0 before anything is recorded.
    pub fn ratio(&self) -> f64 {
        if self.total_uncompressed == 0 {
            1.0
        } else {
            self.total_compressed as f64 / self.total_uncompressed as f64
        }
    }

    /// Payload bytes minus emitted bytes.
    pub fn bytes_saved(&self) -> u64 {
        self.total_uncompressed.saturating_sub(self.total_compressed)
    }

    /// Add one decision.
    pub fn record(&mut self, original_size: usize, result: &CompressResult) {
        self.total_uncompressed += original_size as u64;
        self.total_compressed += result.data().len() as u64;
        if result.is_compressed() {
            self.compressed_count += 1;
        } else {
            self.skipped_count += 1;
        }
    }
}
