//! Wire codec: truncate, compress, frame.
//!
//! ```text
//! message ──truncate(max)──► payload ──compress?──► [z]payload ──frame──► bytes
//! ```
//!
//! Pure data transformation, no I/O. Compression is an optimization only:
//! any failure or lack of gain falls back to the plain payload.

mod compression;
mod framing;

pub use compression::*;
pub use framing::*;

use crate::core::{CodecError, COMPRESSION_MARKER, MAX_LINE};

/// Encoder/decoder for one destination's wire format.
#[derive(Debug, Clone)]
pub struct WireCodec {
    framing: Framing,
    compressor: Option<Compressor>,
    max_message_size: usize,
}

impl WireCodec {
    /// Create a codec. A level of 0 disables compression.
    pub fn new(framing: Framing, compression_level: u8) -> Self {
        let compressor = if compression_level == 0 {
            None
        } else if !Compressor::is_available() {
            tracing::warn!(
                level = compression_level,
                "compression requested but not built in, request ignored"
            );
            None
        } else {
            Some(Compressor::new(compression_level))
        };

        Self {
            framing,
            compressor,
            max_message_size: MAX_LINE,
        }
    }

    /// Override the truncation limit.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size.max(1);
        self
    }

    /// Framing in use.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Whether payloads may be compressed.
    pub fn compresses(&self) -> bool {
        self.compressor.is_some()
    }

    /// Encode a message for the wire.
    pub fn encode(&self, message: &[u8]) -> Vec<u8> {
        self.encode_with_stats(message, None)
    }

    /// Encode a message, recording the compression decision.
    pub fn encode_with_stats(&self, message: &[u8], stats: Option<&mut CompressionStats>) -> Vec<u8> {
        let payload = &message[..message.len().min(self.max_message_size)];

        let result = match &self.compressor {
            None => CompressResult::Uncompressed(payload.to_vec()),
            Some(compressor) => match compressor.compress(payload) {
                Ok(CompressResult::NoGain(data)) => {
                    tracing::info!(len = data.len(), "no gain from compression, sending uncompressed");
                    CompressResult::NoGain(data)
                }
                Ok(CompressResult::Compressed(data)) if !self.framing.carries(&data) => {
                    tracing::info!(
                        len = payload.len(),
                        "compressed form contains the frame delimiter, sending uncompressed"
                    );
                    CompressResult::NoGain(payload.to_vec())
                }
                Ok(result) => result,
                Err(e) => {
                    tracing::info!(error = %e, "compression failed, sending uncompressed");
                    CompressResult::NoGain(payload.to_vec())
                }
            },
        };

        if let Some(stats) = stats {
            stats.record(payload.len(), &result);
        }

        self.framing.frame(result.data())
    }

    /// Decode the first frame in `buf`.
    ///
    /// Returns the original message and the bytes following the frame.
    pub fn decode<'a>(&self, buf: &'a [u8]) -> Result<(Vec<u8>, &'a [u8]), CodecError> {
        let (payload, rest) = self.framing.split(buf)?;
        let message = match (payload.first(), &self.compressor) {
            (Some(&COMPRESSION_MARKER), Some(compressor)) => compressor.decompress(payload)?,
            // Decoding does not depend on the sender's level
            (Some(&COMPRESSION_MARKER), None) => Compressor::new(1).decompress(payload)?,
            _ => payload.to_vec(),
        };
        Ok((message, rest))
    }
}
