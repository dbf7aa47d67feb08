//! Per-request context types for RPC handling.
//!
//! This module groups the pieces a request is judged against before the
//! user implementation runs: wire-format detection, compression
//! negotiation, deadline derivation, and handler configuration.

pub mod config;
pub mod encoding;
pub mod protocol;
pub mod timeout;

pub use config::HandlerConfig;
pub use encoding::Compression;
pub use protocol::WireFormat;
pub use timeout::TimeoutGrant;

use http::HeaderMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The deadline-bearing context handed to every handler invocation.
///
/// Carries the inbound request headers, the effective deadline computed by
/// the timeout controller, and the request's cancellation token. The token
/// is cancelled when the request finishes on any path; long-running
/// implementations should observe it.
#[derive(Clone, Debug)]
pub struct RpcContext {
    headers: HeaderMap,
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl RpcContext {
    pub(crate) fn new(
        headers: HeaderMap,
        deadline: Option<Instant>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            headers,
            deadline,
            cancellation,
        }
    }

    /// The inbound request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The effective request deadline, if one was derived.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time remaining until the deadline, if one was derived.
    pub fn time_remaining(&self) -> Option<std::time::Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// The request's cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}
