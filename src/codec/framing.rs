//! Message framing on the TCP stream.
//!
//! Two schemes:
//!
//! ```text
//! Traditional:     <payload> LF
//! Octet-counting:  <decimal length> SP <payload>
//! ```

use crate::core::CodecError;

/// Longest decimal length prefix we accept when parsing.
const MAX_LENGTH_DIGITS: usize = 10;

/// Framing scheme for one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Newline-delimited.
    #[default]
    Traditional,
    /// Length-prefixed (`"5 hello"`).
    OctetCounting,
}

impl Framing {
    /// Frame a payload for transmission.
    ///
    /// Traditional framing adds the newline only when the payload does not
    /// already end with one.
    pub fn frame(self, payload: &[u8]) -> Vec<u8> {
        match self {
            Framing::Traditional => {
                let mut out = Vec::with_capacity(payload.len() + 1);
                out.extend_from_slice(payload);
                if payload.last() != Some(&b'\n') {
                    out.push(b'\n');
                }
                out
            }
            Framing::OctetCounting => {
                let prefix = format!("{} ", payload.len());
                let mut out = Vec::with_capacity(prefix.len() + payload.len());
                out.extend_from_slice(prefix.as_bytes());
                out.extend_from_slice(payload);
                out
            }
        }
    }

    /// Check if `payload` can be framed without being cut short on receipt.
    ///
    /// Only traditional framing is affected: a newline inside the payload
    /// would end the frame early.
    pub fn carries(self, payload: &[u8]) -> bool {
        match self {
            Framing::Traditional => !payload.contains(&b'\n'),
            Framing::OctetCounting => true,
        }
    }

    /// Split the first frame off a buffer.
    ///
    /// Returns the payload (without delimiter or prefix) and the remaining
    /// bytes.
    pub fn split(self, buf: &[u8]) -> Result<(&[u8], &[u8]), CodecError> {
        match self {
            Framing::Traditional => match buf.iter().position(|&b| b == b'\n') {
                Some(end) => Ok((&buf[..end], &buf[end + 1..])),
                None => Err(CodecError::Incomplete {
                    expected: buf.len() + 1,
                    actual: buf.len(),
                }),
            },
            Framing::OctetCounting => {
                let space = buf
                    .iter()
                    .take(MAX_LENGTH_DIGITS + 1)
                    .position(|&b| b == b' ')
                    .ok_or(CodecError::InvalidLengthPrefix)?;
                let digits = &buf[..space];
                if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
                    return Err(CodecError::InvalidLengthPrefix);
                }
                let len: usize = std::str::from_utf8(digits)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or(CodecError::InvalidLengthPrefix)?;

                let body = &buf[space + 1..];
                if body.len() < len {
                    return Err(CodecError::Incomplete {
                        expected: len,
                        actual: body.len(),
                    });
                }
                Ok(body.split_at(len))
            }
        }
    }
}
