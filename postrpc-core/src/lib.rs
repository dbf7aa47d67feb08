//! Core protocol types for postrpc.
//!
//! This crate provides the transport-independent pieces of the postrpc
//! runtime, shared by the server crate (`postrpc-axum`) and any future
//! client:
//!
//! - [`status`]: RPC status codes and the rich [`StatusError`] type
//! - [`codec`]: Compression codec trait and implementations
//! - [`envelope`]: Length-prefixed message framing

mod codec;
mod envelope;
mod status;

pub use codec::*;
pub use envelope::*;
pub use status::*;
