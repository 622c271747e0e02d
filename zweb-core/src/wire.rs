//! Framing: one JSON document per line, `\n` terminated.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Longest request line a server buffers before treating it as complete.
pub const MAX_LINE_LEN: usize = 64 * 1024;
/// Longest response line an encoder produces or a client buffers.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024; // 16 MiB

/// Encode `msg` as a single line: compact JSON + `\n`.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<Vec<u8>, LineEncodeError> {
    let mut out = serde_json::to_vec(msg)?;
    if out.len() >= MAX_FRAME_LEN {
        return Err(LineEncodeError::TooLarge);
    }
    out.push(b'\n');
    Ok(out)
}

/// Error encoding a message into a line (serde_json or size limit).
#[derive(Debug, thiserror::Error)]
pub enum LineEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("line too large")]
    TooLarge,
}

/// Position just past the first `\n` in `bytes`, if any.
pub fn line_end(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|&b| b == b'\n').map(|i| i + 1)
}

/// Strip one trailing `\n` (and a preceding `\r`).
pub fn trim_line(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}

/// Decode the first line of what was buffered when the peer closed its side.
/// A missing `\n` is accepted; bytes after the first line are ignored.
pub fn decode_last_line<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LineDecodeError> {
    if bytes.is_empty() {
        return Err(LineDecodeError::Empty);
    }
    let end = line_end(bytes).unwrap_or(bytes.len());
    Ok(serde_json::from_slice(trim_line(&bytes[..end]))?)
}

#[derive(Debug, thiserror::Error)]
pub enum LineDecodeError {
    #[error("no data")]
    Empty,
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
