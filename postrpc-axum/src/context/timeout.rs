//! Deadline derivation from the `grpc-timeout` header.
//!
//! The client's deadline header is parsed and clamped by handler policy:
//! a request below the configured minimum fails immediately with
//! `DeadlineExceeded`; a request above the configured maximum (or with no
//! deadline at all) is capped at the maximum. The resulting
//! [`TimeoutGrant`] owns the request's cancellation trigger and fires it
//! on drop, so every exit path releases it.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use postrpc_core::StatusError;

/// The `grpc-timeout` grammar allows at most eight digits.
const TIMEOUT_MAX_DIGITS: usize = 8;

/// Parse a `grpc-timeout` header value: 1-8 ASCII digits followed by a
/// unit in `{H, M, S, m, u, n}`.
pub fn parse_grpc_timeout(value: &str) -> Result<Duration, StatusError> {
    let malformed = || StatusError::invalid_argument(format!("invalid grpc-timeout value {value:?}"));

    if value.len() < 2 || !value.is_ascii() {
        return Err(malformed());
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > TIMEOUT_MAX_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let amount: u64 = digits.parse().map_err(|_| malformed())?;

    let duration = match unit {
        "H" => Duration::from_secs(amount * 3600),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return Err(malformed()),
    };
    Ok(duration)
}

/// A request-scoped deadline plus its cancellation trigger.
///
/// The cancellation token is cancelled when the grant drops, which happens
/// on every exit path of the dispatch engine.
#[derive(Debug)]
pub struct TimeoutGrant {
    deadline: Option<Instant>,
    token: CancellationToken,
    _guard: DropGuard,
}

impl TimeoutGrant {
    fn new(deadline: Option<Instant>) -> Self {
        let token = CancellationToken::new();
        let guard = token.clone().drop_guard();
        Self {
            deadline,
            token,
            _guard: guard,
        }
    }

    /// The effective deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// A clone of the cancellation token, for the request context.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Derive the request deadline from the client's `grpc-timeout` header,
/// clamped by handler policy.
///
/// - Malformed header: `InvalidArgument`.
/// - Client timeout strictly below a positive `min`: immediate
///   `DeadlineExceeded`.
/// - Client timeout above a positive `max`, or absent while `max` is set:
///   capped at `max`.
/// - No header and no `max`: no deadline is installed.
pub fn derive_deadline(
    header: Option<&str>,
    min: Option<Duration>,
    max: Option<Duration>,
) -> Result<TimeoutGrant, StatusError> {
    let client = match header {
        Some(value) => Some(parse_grpc_timeout(value)?),
        None => None,
    };

    if let (Some(min), Some(requested)) = (min, client) {
        if requested < min {
            return Err(StatusError::deadline_exceeded(format!(
                "timeout {requested:?} is below the server minimum of {min:?}"
            )));
        }
    }

    let effective = match (client, max) {
        (Some(requested), Some(max)) => Some(requested.min(max)),
        (Some(requested), None) => Some(requested),
        (None, Some(max)) => Some(max),
        (None, None) => None,
    };

    Ok(TimeoutGrant::new(
        effective.map(|d| Instant::now() + d),
    ))
}
