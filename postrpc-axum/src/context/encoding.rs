//! Compression negotiation.
//!
//! Binary mode negotiates per-message compression through the
//! `grpc-encoding` / `grpc-accept-encoding` headers; JSON mode uses the
//! standard HTTP `Accept-Encoding` header at whole-body granularity.

use postrpc_core::{BoxedCodec, GzipCodec, StatusError};

/// The compression names this server accepts, advertised in
/// `grpc-accept-encoding` on every binary-mode response.
pub const ACCEPTED_ENCODINGS: &str = "gzip, identity";

/// Supported message compressions.
///
/// The set is closed: identity and gzip. Unknown names fail negotiation
/// with `Unimplemented`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    Identity,
    Gzip,
}

impl Compression {
    /// Parse a single encoding token. Returns `None` for unsupported names.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "" | "identity" => Some(Self::Identity),
            "gzip" => Some(Self::Gzip),
            _ => None,
        }
    }

    /// The header value string for this compression.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
        }
    }

    /// Returns true if this compression is identity.
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    /// Get the codec for this compression.
    ///
    /// Returns `None` for identity, `Some(BoxedCodec)` for gzip.
    pub fn codec(&self) -> Option<BoxedCodec> {
        match self {
            Self::Identity => None,
            Self::Gzip => Some(BoxedCodec::new(GzipCodec::default())),
        }
    }
}

/// Resolve the request message compression from the `grpc-encoding` header.
///
/// An absent header or `identity` means uncompressed. Unknown names fail
/// with `Unimplemented`, naming the accepted set.
pub fn negotiate_request_encoding(value: Option<&str>) -> Result<Compression, StatusError> {
    let value = value.unwrap_or("");
    Compression::from_token(value).ok_or_else(|| {
        StatusError::unimplemented(format!(
            "unknown compression {value:?}: accepted grpc-encoding values are {ACCEPTED_ENCODINGS}"
        ))
    })
}

/// Choose the response message compression for binary mode.
///
/// By default the response mirrors the request encoding. When the client
/// sends `grpc-accept-encoding` (comma/space-separated), gzip is preferred
/// whenever it appears in the list, identity otherwise. A handler that has
/// gzip responses disabled always answers with identity.
pub fn negotiate_response_encoding(
    request: Compression,
    accept: Option<&str>,
    gzip_responses: bool,
) -> Compression {
    let mut response = request;
    if let Some(accept) = accept {
        let mut tokens = accept
            .split([',', ' '])
            .filter(|token| !token.is_empty())
            .peekable();
        if tokens.peek().is_some() {
            response = if tokens.any(|token| token == "gzip") {
                Compression::Gzip
            } else {
                Compression::Identity
            };
        }
    }
    if !gzip_responses {
        response = Compression::Identity;
    }
    response
}

/// Whether a standard HTTP `Accept-Encoding` header admits gzip.
///
/// Respects `q=0`, which means "not acceptable" per RFC 7231. Used by the
/// JSON wire format only.
pub fn accepts_gzip(accept: Option<&str>) -> bool {
    let Some(accept) = accept else {
        return false;
    };

    for token in accept.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        let (encoding, q_value) = match token.split_once(';') {
            Some((enc, params)) => {
                let q = params.split(';').find_map(|p| p.trim().strip_prefix("q="));
                (enc.trim(), q)
            }
            None => (token, None),
        };

        if encoding != "gzip" {
            continue;
        }
        if let Some(q) = q_value {
            let q = q.trim();
            if q == "0" || q == "0.0" || q == "0.00" || q == "0.000" {
                return false;
            }
        }
        return true;
    }

    false
}
