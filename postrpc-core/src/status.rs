//! RPC status codes and the rich error type.
//!
//! This module provides the canonical status model:
//! - [`Code`]: the closed set of RPC status codes
//! - [`StatusError`]: a code plus message, detail envelopes, and an
//!   optional wrapped source error
//! - [`Status`] / [`StatusDetail`]: the binary status envelope carried in
//!   `grpc-status-details-bin`, wire-compatible with `google.rpc.Status`

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use serde::{Serialize, Serializer};

/// RPC status codes, mirroring the canonical gRPC code set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Code {
    Ok = 0,
    Canceled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Get the string representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }

    /// Parse a code from its numeric wire representation.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Code::Ok),
            1 => Some(Code::Canceled),
            2 => Some(Code::Unknown),
            3 => Some(Code::InvalidArgument),
            4 => Some(Code::DeadlineExceeded),
            5 => Some(Code::NotFound),
            6 => Some(Code::AlreadyExists),
            7 => Some(Code::PermissionDenied),
            8 => Some(Code::ResourceExhausted),
            9 => Some(Code::FailedPrecondition),
            10 => Some(Code::Aborted),
            11 => Some(Code::OutOfRange),
            12 => Some(Code::Unimplemented),
            13 => Some(Code::Internal),
            14 => Some(Code::Unavailable),
            15 => Some(Code::DataLoss),
            16 => Some(Code::Unauthenticated),
            _ => None,
        }
    }

    /// The canonical HTTP status projection of this code.
    ///
    /// Only the JSON wire format uses this mapping; binary-mode responses
    /// always return HTTP 200 and carry the code in trailers.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Code::Ok => StatusCode::OK,
            // 499 (client closed request) has no named constant.
            Code::Canceled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            Code::InvalidArgument => StatusCode::BAD_REQUEST,
            Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Code::NotFound => StatusCode::NOT_FOUND,
            Code::AlreadyExists => StatusCode::CONFLICT,
            Code::PermissionDenied => StatusCode::FORBIDDEN,
            Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            Code::FailedPrecondition => StatusCode::BAD_REQUEST,
            Code::Aborted => StatusCode::CONFLICT,
            Code::OutOfRange => StatusCode::BAD_REQUEST,
            Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
            Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }
}

impl Serialize for Code {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i32(*self as i32)
    }
}

/// Binary status envelope, wire-compatible with `google.rpc.Status`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Status {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<StatusDetail>,
}

/// A typed error detail attached to a status, shaped like
/// `google.protobuf.Any`: a fully-qualified type name plus the
/// protobuf-encoded message bytes.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatusDetail {
    #[prost(string, tag = "1")]
    pub type_url: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

impl StatusDetail {
    /// Create a new detail with a type URL and protobuf-encoded bytes.
    pub fn new<S: Into<String>>(type_url: S, value: Vec<u8>) -> Self {
        Self {
            type_url: type_url.into(),
            value,
        }
    }
}

impl Serialize for StatusDetail {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use base64::Engine;
        use serde::ser::SerializeStruct;

        let mut s = serializer.serialize_struct("StatusDetail", 2)?;

        // Short type names on the JSON side, matching the header convention.
        let type_name = self
            .type_url
            .strip_prefix("type.googleapis.com/")
            .unwrap_or(&self.type_url);
        s.serialize_field("type", type_name)?;

        let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(&self.value);
        s.serialize_field("value", &encoded)?;

        s.end()
    }
}

/// A rich RPC error: a status code, a human-readable message, optional
/// typed detail envelopes, and an optional wrapped source error.
///
/// Errors returned by handler implementations pass through to the client
/// with their code intact. Arbitrary errors that are not `StatusError`s
/// project to [`Code::Unknown`] with the error's display string as the
/// status message.
#[derive(Clone, Debug)]
pub struct StatusError {
    code: Code,
    message: Option<String>,
    details: Vec<StatusDetail>,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl StatusError {
    /// Create a new error with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self {
            code,
            message: Some(message.into()),
            details: vec![],
            source: None,
        }
    }

    /// Create a new error with just a code.
    pub fn from_code(code: Code) -> Self {
        Self {
            code,
            message: None,
            details: vec![],
            source: None,
        }
    }

    /// Wrap an underlying error with a status code. The source's display
    /// string becomes the status message.
    pub fn wrap<E>(code: Code, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            code,
            message: Some(source.to_string()),
            details: vec![],
            source: Some(Arc::new(source)),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// Create a deadline exceeded error.
    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    /// Create a resource exhausted error.
    pub fn resource_exhausted<S: Into<String>>(message: S) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    /// Create an unimplemented error.
    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Create an unknown error.
    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unknown, message)
    }

    /// Attach a typed detail envelope.
    pub fn with_detail(mut self, detail: StatusDetail) -> Self {
        self.details.push(detail);
        self
    }

    /// Get the status code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Get the status message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Get the attached detail envelopes.
    pub fn details(&self) -> &[StatusDetail] {
        &self.details
    }

    /// Build the binary status envelope for this error.
    pub fn to_proto(&self) -> Status {
        Status {
            code: self.code as i32,
            message: self.message.clone().unwrap_or_default(),
            details: self.details.clone(),
        }
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code.as_str(), message),
            None => f.write_str(self.code.as_str()),
        }
    }
}

impl StdError for StatusError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<Box<dyn StdError + Send + Sync>> for StatusError {
    /// Project an arbitrary error into the status space: rich errors pass
    /// through unchanged, anything else becomes `Unknown`.
    fn from(err: Box<dyn StdError + Send + Sync>) -> Self {
        match err.downcast::<StatusError>() {
            Ok(status) => *status,
            Err(err) => Self {
                code: Code::Unknown,
                message: Some(err.to_string()),
                details: vec![],
                source: Some(Arc::from(err)),
            },
        }
    }
}

impl Serialize for StatusError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let len = 1 + self.message.is_some() as usize + !self.details.is_empty() as usize;
        let mut s = serializer.serialize_struct("Status", len)?;
        s.serialize_field("code", &self.code)?;
        if let Some(message) = &self.message {
            s.serialize_field("message", message)?;
        }
        if !self.details.is_empty() {
            s.serialize_field("details", &self.details)?;
        }
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_code_from_i32_round_trip() {
        for value in 0..=16 {
            let code = Code::from_i32(value).unwrap();
            assert_eq!(code as i32, value);
        }
        assert_eq!(Code::from_i32(17), None);
        assert_eq!(Code::from_i32(-1), None);
    }

    #[test]
    fn test_http_status_projection() {
        assert_eq!(Code::Ok.http_status(), StatusCode::OK);
        assert_eq!(Code::Canceled.http_status().as_u16(), 499);
        assert_eq!(Code::InvalidArgument.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Code::DeadlineExceeded.http_status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(Code::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(Code::AlreadyExists.http_status(), StatusCode::CONFLICT);
        assert_eq!(
            Code::PermissionDenied.http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Code::ResourceExhausted.http_status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            Code::Unimplemented.http_status(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            Code::Unavailable.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Code::Unauthenticated.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Code::DataLoss.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_wrap_uses_source_message() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let status = StatusError::wrap(Code::Internal, io_err);
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), Some("disk on fire"));
        assert!(std::error::Error::source(&status).is_some());
    }

    #[test]
    fn test_non_rich_error_projects_to_unknown() {
        let err: Box<dyn StdError + Send + Sync> = "something odd".into();
        let status = StatusError::from(err);
        assert_eq!(status.code(), Code::Unknown);
        assert_eq!(status.message(), Some("something odd"));
    }

    #[test]
    fn test_rich_error_passes_through_projection() {
        let err: Box<dyn StdError + Send + Sync> =
            Box::new(StatusError::new(Code::NotFound, "no such thing"));
        let status = StatusError::from(err);
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), Some("no such thing"));
    }

    #[test]
    fn test_serialize_json_body() {
        let status = StatusError::new(Code::InvalidArgument, "bad")
            .with_detail(StatusDetail::new("example.com/Detail", vec![1, 2, 3]));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["code"], 3);
        assert_eq!(json["message"], "bad");
        assert_eq!(json["details"][0]["type"], "example.com/Detail");
        assert_eq!(json["details"][0]["value"], "AQID");
    }

    #[test]
    fn test_serialize_omits_empty_fields() {
        let status = StatusError::from_code(Code::Internal);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["code"], 13);
        assert!(json.get("message").is_none());
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_status_envelope_round_trip() {
        let status = StatusError::new(Code::InvalidArgument, "bad")
            .with_detail(StatusDetail::new("example.com/Detail", vec![9, 8, 7]));
        let encoded = status.to_proto().encode_to_vec();
        let decoded = Status::decode(&encoded[..]).unwrap();
        assert_eq!(decoded.code, 3);
        assert_eq!(decoded.message, "bad");
        assert_eq!(decoded.details.len(), 1);
        assert_eq!(decoded.details[0].type_url, "example.com/Detail");
        assert_eq!(decoded.details[0].value, vec![9, 8, 7]);
    }
}
