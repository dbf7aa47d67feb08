//! Wire-format detection from the request content type.
//!
//! Two wire formats hide behind one handler: gRPC-style length-prefixed
//! protobuf framing with trailer metadata, and a plain JSON
//! request/response. The set is closed; everything else is rejected with
//! 415 and an `Accept-Post` advertisement.

/// Content type for binary framing without an explicit codec suffix.
pub const CONTENT_TYPE_GRPC: &str = "application/grpc";
/// Content type for binary framing with protobuf payloads.
pub const CONTENT_TYPE_GRPC_PROTO: &str = "application/grpc+proto";
/// Content type for the JSON wire format.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// `Accept-Post` value when JSON is enabled.
const ACCEPT_POST_DEFAULT: &str = "application/grpc, application/grpc+proto, application/json";
/// `Accept-Post` value when JSON is administratively disabled.
const ACCEPT_POST_WITHOUT_JSON: &str = "application/grpc, application/grpc+proto";

/// Wire format selected by content negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// Length-prefixed protobuf frames, status carried in HTTP trailers.
    Binary,
    /// One JSON object per body, status carried in the response body.
    Json,
}

impl WireFormat {
    /// Detect the wire format from a Content-Type header value.
    ///
    /// The match is exact; parameters are not stripped.
    pub fn from_content_type(value: &str) -> Option<Self> {
        match value {
            CONTENT_TYPE_GRPC | CONTENT_TYPE_GRPC_PROTO => Some(Self::Binary),
            CONTENT_TYPE_JSON => Some(Self::Json),
            _ => None,
        }
    }

    /// The `Accept-Post` advertisement for the supported content types.
    pub fn accept_post(support_json: bool) -> &'static str {
        if support_json {
            ACCEPT_POST_DEFAULT
        } else {
            ACCEPT_POST_WITHOUT_JSON
        }
    }
}
