//! Length-prefixed message framing.
//!
//! Each on-wire binary message is one frame:
//!
//! ```text
//! [flags:1][length:4 big-endian][payload:length]
//! ```
//!
//! Bit 0 of the flags byte marks a compressed payload. Unary calls carry
//! exactly one frame per direction.

use bytes::Bytes;

use crate::codec::BoxedCodec;

/// Frame flags.
pub mod frame_flags {
    /// Regular message (uncompressed).
    pub const MESSAGE: u8 = 0x00;
    /// Compressed message.
    pub const COMPRESSED: u8 = 0x01;
}

/// Frame header size (flags + length).
pub const FRAME_HEADER_LEN: usize = 5;

/// Framing errors.
#[derive(Clone, Debug, thiserror::Error)]
pub enum FrameError {
    /// Incomplete frame header.
    #[error("incomplete frame header: expected {expected} bytes, got {actual}")]
    IncompleteHeader { expected: usize, actual: usize },

    /// Flags byte carries bits the protocol does not define.
    #[error("invalid frame flags: 0x{0:02x}")]
    InvalidFlags(u8),

    /// Compressed flag set without a declared message encoding.
    #[error("frame is compressed but no message encoding was declared")]
    UnexpectedCompression,

    /// Decompression failed.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// Compression failed.
    #[error("compression failed: {0}")]
    Compression(String),
}

/// Parse a frame header from bytes.
///
/// Returns `(flags, length)` if successful.
pub fn parse_frame_header(data: &[u8]) -> Result<(u8, u32), FrameError> {
    if data.len() < FRAME_HEADER_LEN {
        return Err(FrameError::IncompleteHeader {
            expected: FRAME_HEADER_LEN,
            actual: data.len(),
        });
    }

    let flags = data[0];
    let length = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    Ok((flags, length))
}

/// Recover the message payload from a frame's flags and payload bytes,
/// decompressing when the compressed flag is set.
///
/// # Errors
/// - [`FrameError::UnexpectedCompression`] if the compressed flag is set
///   but `codec` is `None`
/// - [`FrameError::InvalidFlags`] for undefined flag bits
/// - [`FrameError::Decompression`] if the codec rejects the payload
pub fn decode_frame_payload(
    flags: u8,
    payload: Bytes,
    codec: Option<&BoxedCodec>,
) -> Result<Bytes, FrameError> {
    match flags {
        frame_flags::MESSAGE => Ok(payload),
        frame_flags::COMPRESSED => {
            let codec = codec.ok_or(FrameError::UnexpectedCompression)?;
            codec
                .decompress(&payload)
                .map_err(|e| FrameError::Decompression(e.to_string()))
        }
        other => Err(FrameError::InvalidFlags(other)),
    }
}

/// Encode a message payload as a single frame.
///
/// When a codec is supplied the payload is compressed and the frame flag
/// set, but only if compression actually shrinks the payload; otherwise
/// the message goes out uncompressed with the flag cleared.
pub fn encode_frame(payload: &[u8], codec: Option<&BoxedCodec>) -> Result<Bytes, FrameError> {
    if let Some(codec) = codec {
        let compressed = codec
            .compress(payload)
            .map_err(|e| FrameError::Compression(e.to_string()))?;
        if compressed.len() < payload.len() {
            return Ok(build_frame(frame_flags::COMPRESSED, &compressed));
        }
    }
    Ok(build_frame(frame_flags::MESSAGE, payload))
}

fn build_frame(flags: u8, payload: &[u8]) -> Bytes {
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.push(flags);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Bytes::from(frame)
}
