//! gRPC header and trailer protocol.
//!
//! Binary-mode responses carry their final status in HTTP trailers. The
//! three reserved trailer slots are present on every response, success
//! included. Status messages are percent-encoded per the gRPC convention
//! and the binary status envelope travels base64-encoded in
//! `grpc-status-details-bin`.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use prost::Message;
use postrpc_core::StatusError;

/// Request message compression, single token.
pub const GRPC_ENCODING: HeaderName = HeaderName::from_static("grpc-encoding");
/// Compressions the peer accepts, comma/space-separated.
pub const GRPC_ACCEPT_ENCODING: HeaderName = HeaderName::from_static("grpc-accept-encoding");
/// Client deadline, ASCII digits plus a unit suffix.
pub const GRPC_TIMEOUT: HeaderName = HeaderName::from_static("grpc-timeout");
/// Trailer: numeric status code.
pub const GRPC_STATUS: HeaderName = HeaderName::from_static("grpc-status");
/// Trailer: percent-encoded status message.
pub const GRPC_MESSAGE: HeaderName = HeaderName::from_static("grpc-message");
/// Trailer: base64-encoded binary status envelope.
pub const GRPC_STATUS_DETAILS_BIN: HeaderName =
    HeaderName::from_static("grpc-status-details-bin");
/// Advertises the supported content types on 415 responses.
pub const ACCEPT_POST: HeaderName = HeaderName::from_static("accept-post");

/// Identifies this library in binary-mode responses.
pub const USER_AGENT_VALUE: &str = concat!("postrpc-axum/", env!("CARGO_PKG_VERSION"));

/// Percent-encode a status message per the gRPC convention: octets outside
/// printable ASCII, plus `%` itself, become `%XX` with uppercase hex.
pub fn percent_encode(message: &str) -> String {
    fn passes(b: u8) -> bool {
        (0x20..=0x7E).contains(&b) && b != b'%'
    }

    if message.bytes().all(passes) {
        return message.to_string();
    }

    let mut out = String::with_capacity(message.len() * 3);
    for b in message.bytes() {
        if passes(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Encode bytes for a `-bin` header: unpadded standard base64.
pub fn encode_bin_header(value: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD_NO_PAD.encode(value)
}

/// Build the three reserved trailers for a binary-mode response.
///
/// `None` is the success sentinel: code 0, empty message, empty details.
pub(crate) fn grpc_trailers(error: Option<&StatusError>) -> HeaderMap {
    let mut trailers = HeaderMap::with_capacity(3);
    match error {
        None => {
            trailers.insert(GRPC_STATUS, HeaderValue::from_static("0"));
            trailers.insert(GRPC_MESSAGE, HeaderValue::from_static(""));
            trailers.insert(GRPC_STATUS_DETAILS_BIN, HeaderValue::from_static(""));
        }
        Some(status) => {
            let code = (status.code() as i32).to_string();
            trailers.insert(GRPC_STATUS, trailer_value(&code));
            trailers.insert(
                GRPC_MESSAGE,
                trailer_value(&percent_encode(status.message().unwrap_or(""))),
            );
            let envelope = status.to_proto().encode_to_vec();
            trailers.insert(
                GRPC_STATUS_DETAILS_BIN,
                trailer_value(&encode_bin_header(&envelope)),
            );
        }
    }
    trailers
}

// Percent-encoding and base64 both produce visible ASCII, so conversion
// cannot fail; the empty fallback keeps this total.
fn trailer_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use postrpc_core::{Code, Status, StatusDetail};

    #[test]
    fn test_percent_encode_passthrough() {
        assert_eq!(percent_encode("plain ascii message"), "plain ascii message");
        assert_eq!(percent_encode(""), "");
    }

    #[test]
    fn test_percent_encode_reserved_octets() {
        assert_eq!(percent_encode("50%"), "50%25");
        assert_eq!(percent_encode("line\nbreak"), "line%0Abreak");
        assert_eq!(percent_encode("caf\u{e9}"), "caf%C3%A9");
    }

    #[test]
    fn test_encode_bin_header_unpadded() {
        assert_eq!(encode_bin_header(&[1, 2, 3]), "AQID");
        // 4 input bytes would need padding under standard base64
        assert_eq!(encode_bin_header(&[1, 2, 3, 4]), "AQIDBA");
    }

    #[test]
    fn test_trailers_success_sentinel() {
        let trailers = grpc_trailers(None);
        assert_eq!(trailers.get(&GRPC_STATUS).unwrap(), "0");
        assert_eq!(trailers.get(&GRPC_MESSAGE).unwrap(), "");
        assert_eq!(trailers.get(&GRPC_STATUS_DETAILS_BIN).unwrap(), "");
    }

    #[test]
    fn test_trailers_error_carries_envelope() {
        use base64::Engine;
        use prost::Message;

        let status = StatusError::new(Code::InvalidArgument, "bad request\n")
            .with_detail(StatusDetail::new("example.com/Detail", vec![7]));
        let trailers = grpc_trailers(Some(&status));

        assert_eq!(trailers.get(&GRPC_STATUS).unwrap(), "3");
        assert_eq!(trailers.get(&GRPC_MESSAGE).unwrap(), "bad request%0A");

        let bin = trailers.get(&GRPC_STATUS_DETAILS_BIN).unwrap();
        let envelope = base64::engine::general_purpose::STANDARD_NO_PAD
            .decode(bin.as_bytes())
            .unwrap();
        let decoded = Status::decode(&envelope[..]).unwrap();
        assert_eq!(decoded.code, 3);
        assert_eq!(decoded.message, "bad request\n");
        assert_eq!(decoded.details[0].type_url, "example.com/Detail");
    }
}
