//! Server-side unary RPC dispatch engine for axum.
//!
//! For one fully-qualified RPC method, an [`RpcHandler`] accepts an HTTP
//! POST, decodes the request under the wire format its content type
//! selects — gRPC-compatible length-prefixed protobuf framing, or plain
//! JSON — invokes the typed implementation, and encodes the reply under
//! the same wire format. The runtime owns content-type negotiation,
//! compression negotiation, deadline propagation, size limits, and the
//! status model carried in HTTP trailers (binary) or the response body
//! (JSON).
//!
//! ```rust,ignore
//! use postrpc_axum::{HandlerConfig, RpcHandler};
//!
//! let handler = RpcHandler::new(
//!     "ping.v1.PingService/Ping",
//!     HandlerConfig::default().max_request_bytes(4 * 1024 * 1024),
//!     |_ctx, req: PingRequest| async move {
//!         Ok(PingResponse { number: req.number })
//!     },
//! );
//! let app = axum::Router::new()
//!     .route("/ping.v1.PingService/Ping", handler.into_method_router());
//! ```
//!
//! Request and response types carry the full marshal capability set:
//! `prost::Message` for the binary format, `serde` for JSON. Generated
//! JSON types should use camelCase field names and reject unknown fields
//! (`#[serde(rename_all = "camelCase", deny_unknown_fields)]`).

pub mod context;
mod dispatch;
pub mod handler;
pub mod headers;

// Re-export key types at the crate root for convenience
pub use context::{
    Compression, HandlerConfig, RpcContext, TimeoutGrant, WireFormat,
};
pub use context::encoding::{
    accepts_gzip, negotiate_request_encoding, negotiate_response_encoding, ACCEPTED_ENCODINGS,
};
pub use context::timeout::{derive_deadline, parse_grpc_timeout};
pub use handler::{RawBinaryFn, Registrar, RpcHandler};
pub use headers::{encode_bin_header, percent_encode, USER_AGENT_VALUE};
pub use postrpc_core::{
    BoxedCodec, Code, Codec, FrameError, GzipCodec, IdentityCodec, Status, StatusDetail,
    StatusError, FRAME_HEADER_LEN, frame_flags,
};

// Re-export the crates user message types are built from
pub use prost;
pub use serde;

pub mod prelude {
    //! The most common types for writing postrpc handlers.
    pub use crate::context::{Compression, HandlerConfig, RpcContext, WireFormat};
    pub use crate::handler::{Registrar, RpcHandler};
    pub use postrpc_core::{Code, StatusDetail, StatusError};
}
