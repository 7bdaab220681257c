//! Length-prefixed token exchange.
//!
//! Wire format (symmetric, both directions):
//! ```text
//! +------------------+--------------------+
//! | LENGTH (4B BE)   | TOKEN (N bytes)    |
//! +------------------+--------------------+
//! ```
//! Zero-length tokens are valid.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::{SecurityError, MAX_TOKEN_SIZE, TOKEN_LENGTH_PREFIX};

/// Encode a token with its length prefix.
pub fn encode_token(token: &[u8]) -> Result<Vec<u8>, SecurityError> {
    let len = u32::try_from(token.len()).map_err(|_| SecurityError::TokenTooLarge {
        size: token.len(),
        limit: u32::MAX as usize,
    })?;
    let mut buf = Vec::with_capacity(TOKEN_LENGTH_PREFIX + token.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(token);
    Ok(buf)
}

/// Write one token and flush.
pub async fn send_token<W>(writer: &mut W, token: &[u8]) -> Result<(), SecurityError>
where
    W: AsyncWrite + Unpin,
{
    let buf = encode_token(token)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one token, rejecting anything larger than `MAX_TOKEN_SIZE`.
pub async fn recv_token<R>(reader: &mut R) -> Result<Vec<u8>, SecurityError>
where
    R: AsyncRead + Unpin,
{
    recv_token_with_limit(reader, MAX_TOKEN_SIZE).await
}

/// Read one token with an explicit size limit.
pub async fn recv_token_with_limit<R>(reader: &mut R, limit: usize) -> Result<Vec<u8>, SecurityError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; TOKEN_LENGTH_PREFIX];
    reader.read_exact(&mut prefix).await?;

    let len = u32::from_be_bytes(prefix) as usize;
    if len > limit {
        return Err(SecurityError::TokenTooLarge { size: len, limit });
    }

    let mut token = vec![0u8; len];
    reader.read_exact(&mut token).await?;
    Ok(token)
}
