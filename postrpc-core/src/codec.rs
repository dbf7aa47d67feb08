//! Compression codec trait and implementations.
//!
//! Message payloads may be compressed on the wire. The [`Codec`] trait
//! abstracts over the supported algorithms; [`GzipCodec`] is the only
//! non-identity codec the protocol accepts. Identity is represented as the
//! absence of a codec (`Option<BoxedCodec>` with `None`).

use bytes::Bytes;
use std::io;
use std::io::{Read, Write};
use std::sync::Arc;

use flate2::Compression as GzipLevel;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

/// Codec trait for per-message compression.
pub trait Codec: Send + Sync + 'static {
    /// The encoding name for HTTP headers (e.g., "gzip").
    fn name(&self) -> &'static str;

    /// Compress data.
    fn compress(&self, data: &[u8]) -> io::Result<Bytes>;

    /// Decompress data.
    fn decompress(&self, data: &[u8]) -> io::Result<Bytes>;
}

/// A boxed codec for type-erased storage.
///
/// Use `Option<BoxedCodec>` where `None` represents identity (no
/// compression).
#[derive(Clone)]
pub struct BoxedCodec(Arc<dyn Codec>);

impl BoxedCodec {
    /// Create a new boxed codec.
    pub fn new<C: Codec>(codec: C) -> Self {
        BoxedCodec(Arc::new(codec))
    }

    /// Get the codec name for HTTP headers.
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Compress data.
    pub fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        self.0.compress(data)
    }

    /// Decompress data.
    pub fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        self.0.decompress(data)
    }
}

impl std::fmt::Debug for BoxedCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BoxedCodec").field(&self.name()).finish()
    }
}

/// Gzip codec using flate2.
///
/// Encoders and decoders are constructed per call; ownership scopes their
/// release to the call itself.
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    /// Compression level (0-9). Default is 6.
    pub level: u32,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl GzipCodec {
    /// Create a new GzipCodec with the specified compression level.
    ///
    /// Level ranges from 0 (no compression) to 9 (best compression).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl GzipCodec {
    /// Decompress, bounding the inflated output at `max_bytes`.
    ///
    /// The decoder stops reading once the bound is crossed, so a small
    /// input that inflates to an enormous output is never fully
    /// materialised. Returns `Ok(None)` when the output exceeds the bound.
    pub fn decompress_bounded(&self, data: &[u8], max_bytes: usize) -> io::Result<Option<Bytes>> {
        let limit = (max_bytes as u64).saturating_add(1);
        let mut decoder = GzDecoder::new(data).take(limit);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        if decompressed.len() > max_bytes {
            return Ok(None);
        }
        Ok(Some(Bytes::from(decompressed)))
    }
}

impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        let mut encoder = GzEncoder::new(Vec::new(), GzipLevel::new(self.level));
        encoder.write_all(data)?;
        Ok(Bytes::from(encoder.finish()?))
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(Bytes::from(decompressed))
    }
}

/// Identity codec (no compression).
///
/// This codec passes data through unchanged. Prefer `None` in
/// `Option<BoxedCodec>` positions; this type exists for callers that need
/// a concrete `Codec` value.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl Codec for IdentityCodec {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_codec_compress_decompress() {
        let codec = GzipCodec::default();
        assert_eq!(codec.name(), "gzip");

        let original = b"Hello, World! This is a test message.";
        let compressed = codec.compress(original).unwrap();
        assert_ne!(&compressed[..], &original[..]);

        let decompressed = codec.decompress(&compressed).unwrap();
        assert_eq!(&decompressed[..], &original[..]);
    }

    #[test]
    fn test_gzip_codec_with_level() {
        let codec = GzipCodec::with_level(9);
        assert_eq!(codec.level, 9);

        let original = b"Hello, World! This is a test message.";
        let compressed = codec.compress(original).unwrap();
        let decompressed = codec.decompress(&compressed).unwrap();
        assert_eq!(&decompressed[..], &original[..]);
    }

    #[test]
    fn test_identity_codec() {
        let codec = IdentityCodec;
        assert_eq!(codec.name(), "identity");

        let original = b"Hello, World!";
        assert_eq!(&codec.compress(original).unwrap()[..], &original[..]);
        assert_eq!(&codec.decompress(original).unwrap()[..], &original[..]);
    }

    #[test]
    fn test_boxed_codec() {
        let codec = BoxedCodec::new(GzipCodec::default());
        assert_eq!(codec.name(), "gzip");

        let original = b"Hello, World! This is a test message.";
        let compressed = codec.compress(original).unwrap();
        let decompressed = codec.decompress(&compressed).unwrap();
        assert_eq!(&decompressed[..], &original[..]);
    }

    #[test]
    fn test_decompress_invalid_gzip() {
        let codec = GzipCodec::default();
        assert!(codec.decompress(b"not valid gzip data").is_err());
    }

    #[test]
    fn test_decompress_bounded_within_limit() {
        let codec = GzipCodec::default();
        let original = b"Hello, World! This is a test message.";
        let compressed = codec.compress(original).unwrap();

        let decompressed = codec.decompress_bounded(&compressed, 1024).unwrap().unwrap();
        assert_eq!(&decompressed[..], &original[..]);

        // An exact-size bound is still within the limit.
        let decompressed = codec
            .decompress_bounded(&compressed, original.len())
            .unwrap()
            .unwrap();
        assert_eq!(&decompressed[..], &original[..]);
    }

    #[test]
    fn test_decompress_bounded_rejects_oversize_output() {
        // A tiny compressed input that inflates far past the bound.
        let codec = GzipCodec::default();
        let original = vec![b'a'; 1024 * 1024];
        let compressed = codec.compress(&original).unwrap();
        assert!(compressed.len() < 1024);

        assert!(codec.decompress_bounded(&compressed, 1024).unwrap().is_none());
    }

    #[test]
    fn test_decompress_bounded_invalid_gzip() {
        let codec = GzipCodec::default();
        assert!(codec.decompress_bounded(b"not valid gzip data", 1024).is_err());
    }
}
