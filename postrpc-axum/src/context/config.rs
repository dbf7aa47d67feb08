//! Handler configuration.
//!
//! Set once at handler construction, immutable afterwards and shared
//! read-only across requests.

use std::sync::Arc;
use std::time::Duration;

use crate::handler::Registrar;

/// Per-handler policy knobs, applied by the dispatch engine.
///
/// Built with the chained setters and frozen when the handler is
/// constructed.
///
/// # Example
///
/// ```rust,ignore
/// let config = HandlerConfig::default()
///     .min_timeout(Duration::from_millis(20))
///     .max_request_bytes(4 * 1024 * 1024);
/// ```
#[derive(Clone, Debug)]
pub struct HandlerConfig {
    min_timeout: Option<Duration>,
    max_timeout: Option<Duration>,
    gzip_responses: bool,
    support_json: bool,
    max_request_bytes: Option<usize>,
    registrar: Option<Arc<Registrar>>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            min_timeout: None,
            max_timeout: None,
            gzip_responses: true,
            support_json: true,
            max_request_bytes: None,
            registrar: None,
        }
    }
}

impl HandlerConfig {
    /// Set the minimum allowable timeout. Requests with less than the
    /// minimum timeout fail immediately with `DeadlineExceeded`.
    ///
    /// By default, any positive timeout is allowed.
    pub fn min_timeout(mut self, d: Duration) -> Self {
        self.min_timeout = Some(d);
        self
    }

    /// Set the maximum allowable timeout. Requests with timeouts greater
    /// than the maximum (including requests with no timeout) are clamped
    /// to it.
    ///
    /// By default, there's no enforced maximum.
    pub fn max_timeout(mut self, d: Duration) -> Self {
        self.max_timeout = Some(d);
        self
    }

    /// Enable or disable gzip compression of response messages. Even when
    /// enabled, gzip is only used if the client accepts it.
    ///
    /// By default, responses are gzipped whenever possible.
    pub fn gzip_responses(mut self, enable: bool) -> Self {
        self.gzip_responses = enable;
        self
    }

    /// Enable or disable support for JSON requests and responses.
    ///
    /// By default, handlers support JSON.
    pub fn support_json(mut self, enable: bool) -> Self {
        self.support_json = enable;
        self
    }

    /// Set the maximum allowable request size (after compression, if
    /// applicable). Oversize requests fail early with `ResourceExhausted`
    /// and the payload is never read into memory.
    ///
    /// By default, any request size is allowed.
    pub fn max_request_bytes(mut self, n: usize) -> Self {
        self.max_request_bytes = Some(n);
        self
    }

    /// Supply a registrar; the handler's method name is registered with it
    /// at construction time.
    pub fn registrar(mut self, registrar: Arc<Registrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    pub(crate) fn min_timeout_value(&self) -> Option<Duration> {
        self.min_timeout
    }

    pub(crate) fn max_timeout_value(&self) -> Option<Duration> {
        self.max_timeout
    }

    pub(crate) fn gzip_responses_value(&self) -> bool {
        self.gzip_responses
    }

    pub(crate) fn support_json_value(&self) -> bool {
        self.support_json
    }

    pub(crate) fn max_request_bytes_value(&self) -> Option<usize> {
        self.max_request_bytes
    }

    pub(crate) fn registrar_value(&self) -> Option<&Arc<Registrar>> {
        self.registrar.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HandlerConfig::default();
        assert_eq!(config.min_timeout_value(), None);
        assert_eq!(config.max_timeout_value(), None);
        assert!(config.gzip_responses_value());
        assert!(config.support_json_value());
        assert_eq!(config.max_request_bytes_value(), None);
        assert!(config.registrar_value().is_none());
    }

    #[test]
    fn test_builder_chain() {
        let config = HandlerConfig::default()
            .min_timeout(Duration::from_millis(10))
            .max_timeout(Duration::from_secs(30))
            .gzip_responses(false)
            .support_json(false)
            .max_request_bytes(1024);
        assert_eq!(config.min_timeout_value(), Some(Duration::from_millis(10)));
        assert_eq!(config.max_timeout_value(), Some(Duration::from_secs(30)));
        assert!(!config.gzip_responses_value());
        assert!(!config.support_json_value());
        assert_eq!(config.max_request_bytes_value(), Some(1024));
    }
}
