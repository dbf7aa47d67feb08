//! The per-request dispatch state machine.
//!
//! Dispatch runs in a fixed order: method check, content negotiation,
//! then the wire-format branch. The binary branch sets up headers and
//! trailer declarations, negotiates compression, derives the deadline,
//! decodes one length-prefixed frame, invokes the implementation, and
//! emits the response frame plus trailers. The JSON branch negotiates
//! whole-body compression, derives the deadline, decodes the body as one
//! JSON object, invokes, and writes the body last. Any stage failure
//! transitions to error emission: trailer-carried status for binary, an
//! HTTP-projected status body for JSON. The remaining request body is
//! consumed on every terminal path so the connection can be reused.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::Request;
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use futures::stream;
use http::header::{
    ACCEPT_ENCODING, ALLOW, CONTENT_ENCODING, CONTENT_TYPE, TRAILER, USER_AGENT,
};
use http::request::Parts;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use http_body::Frame;
use http_body_util::{BodyExt, StreamBody};
use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;
use postrpc_core::{
    Code, Codec, FrameError, GzipCodec, StatusError, decode_frame_payload, encode_frame,
    parse_frame_header, FRAME_HEADER_LEN,
};

use crate::context::RpcContext;
use crate::context::encoding::{self, ACCEPTED_ENCODINGS, Compression};
use crate::context::protocol::{CONTENT_TYPE_GRPC, CONTENT_TYPE_JSON, WireFormat};
use crate::context::timeout::derive_deadline;
use crate::handler::RpcHandler;
use crate::headers::{
    GRPC_ACCEPT_ENCODING, GRPC_ENCODING, GRPC_TIMEOUT, ACCEPT_POST, USER_AGENT_VALUE,
    grpc_trailers,
};

impl<Req, Resp> RpcHandler<Req, Resp>
where
    Req: Message + DeserializeOwned + Default + Send + Sync + 'static,
    Resp: Message + Serialize + Send + Sync + 'static,
{
    /// Serve one HTTP request with this handler.
    ///
    /// Accepts POST only; anything else is answered with 405 and
    /// `Allow: POST`. Unsupported content types get 415 plus an
    /// `Accept-Post` advertisement. Supported requests are dispatched
    /// under the wire format their content type selects, and the response
    /// always mirrors the request content type.
    pub async fn serve(&self, req: Request) -> Response {
        let (parts, body) = req.into_parts();

        if parts.method != Method::POST {
            // Interoperability with plain HTTP clients is better with an
            // explicit 405 than a transport-level failure.
            drain_body(body).await;
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("POST"));
            return response;
        }

        let content_type = header_str(&parts.headers, &CONTENT_TYPE).unwrap_or("");
        let format = match WireFormat::from_content_type(content_type) {
            Some(WireFormat::Json) if !self.config.support_json_value() => None,
            other => other,
        };
        let Some(format) = format else {
            drain_body(body).await;
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::UNSUPPORTED_MEDIA_TYPE;
            response.headers_mut().insert(
                ACCEPT_POST,
                HeaderValue::from_static(WireFormat::accept_post(
                    self.config.support_json_value(),
                )),
            );
            return response;
        };

        match format {
            WireFormat::Binary => self.serve_binary(parts, body).await,
            WireFormat::Json => self.serve_json(parts, body).await,
        }
    }

    async fn serve_binary(&self, parts: Parts, body: Body) -> Response {
        let mut headers = HeaderMap::new();
        // The response mirrors the request content type, set before any
        // other mode-dependent header.
        let mirror = parts
            .headers
            .get(CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(CONTENT_TYPE_GRPC));
        headers.insert(CONTENT_TYPE, mirror);
        headers.insert(
            GRPC_ACCEPT_ENCODING,
            HeaderValue::from_static(ACCEPTED_ENCODINGS),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        // Trailer names must be declared before any body byte flows;
        // once bytes are written no new trailer names can be added.
        headers.append(TRAILER, HeaderValue::from_static("grpc-status"));
        headers.append(TRAILER, HeaderValue::from_static("grpc-message"));
        headers.append(TRAILER, HeaderValue::from_static("grpc-status-details-bin"));

        let request_encoding =
            match encoding::negotiate_request_encoding(header_str(&parts.headers, &GRPC_ENCODING))
            {
                Ok(encoding) => encoding,
                Err(status) => {
                    drain_body(body).await;
                    return binary_error(headers, &status);
                }
            };
        let response_encoding = encoding::negotiate_response_encoding(
            request_encoding,
            header_str(&parts.headers, &GRPC_ACCEPT_ENCODING),
            self.config.gzip_responses_value(),
        );
        headers.insert(
            GRPC_ENCODING,
            HeaderValue::from_static(response_encoding.as_str()),
        );

        let grant = match derive_deadline(
            header_str(&parts.headers, &GRPC_TIMEOUT),
            self.config.min_timeout_value(),
            self.config.max_timeout_value(),
        ) {
            Ok(grant) => grant,
            Err(status) => {
                drain_body(body).await;
                return binary_error(headers, &status);
            }
        };

        if let Some(raw) = &self.raw_binary {
            let ctx = RpcContext::new(parts.headers.clone(), grant.deadline(), grant.token());
            let mut request = Request::from_parts(parts, body);
            request.extensions_mut().insert(ctx);
            return raw(request, request_encoding, response_encoding).await;
        }

        let ctx = RpcContext::new(parts.headers.clone(), grant.deadline(), grant.token());

        let mut reader = BodyReader::new(body);
        let payload = match read_unary_frame(
            &mut reader,
            request_encoding,
            self.config.max_request_bytes_value(),
        )
        .await
        {
            Ok(payload) => payload,
            Err(status) => {
                reader.drain().await;
                return binary_error(headers, &status);
            }
        };

        let message = match Req::decode(&payload[..]) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(method = %self.method, error = %err, "failed to decode protobuf request");
                return binary_error(
                    headers,
                    &StatusError::invalid_argument("can't unmarshal protobuf request"),
                );
            }
        };

        match self.invoke(ctx, message).await {
            Err(status) => binary_error(headers, &status),
            Ok(reply) => {
                match encode_frame(&reply.encode_to_vec(), response_encoding.codec().as_ref()) {
                    Ok(frame) => binary_ok(headers, frame),
                    Err(err) => {
                        tracing::warn!(method = %self.method, error = %err, "failed to encode response frame");
                        binary_error(
                            headers,
                            &StatusError::unknown("can't marshal protobuf response"),
                        )
                    }
                }
            }
        }
    }

    async fn serve_json(&self, parts: Parts, body: Body) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));

        let gzip_response = self.config.gzip_responses_value()
            && encoding::accepts_gzip(header_str(&parts.headers, &ACCEPT_ENCODING));

        let grant = match derive_deadline(
            header_str(&parts.headers, &GRPC_TIMEOUT),
            self.config.min_timeout_value(),
            self.config.max_timeout_value(),
        ) {
            Ok(grant) => grant,
            Err(status) => {
                drain_body(body).await;
                return json_error(headers, &status, gzip_response);
            }
        };

        let mut reader = BodyReader::new(body);
        let raw = match reader
            .read_to_end(self.config.max_request_bytes_value())
            .await
        {
            Ok(raw) => raw,
            Err(status) => {
                reader.drain().await;
                return json_error(headers, &status, gzip_response);
            }
        };

        // Whole-body compression per Content-Encoding; unrecognised
        // encodings pass through untouched. The size limit is enforced
        // again on the inflated output, so a small body cannot decompress
        // past the cap.
        let raw = if header_str(&parts.headers, &CONTENT_ENCODING) == Some("gzip") {
            let max = self.config.max_request_bytes_value().unwrap_or(usize::MAX);
            match GzipCodec::default().decompress_bounded(&raw, max) {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    return json_error(
                        headers,
                        &StatusError::resource_exhausted(format!(
                            "message size exceeds maximum allowed size of {max} bytes"
                        )),
                        gzip_response,
                    );
                }
                Err(err) => {
                    tracing::debug!(method = %self.method, error = %err, "failed to decompress request body");
                    return json_error(
                        headers,
                        &StatusError::unknown("can't read gzipped body"),
                        gzip_response,
                    );
                }
            }
        } else {
            raw
        };

        let message: Req = match serde_json::from_slice(&raw) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(method = %self.method, error = %err, "failed to decode JSON request");
                return json_error(
                    headers,
                    &StatusError::invalid_argument("can't unmarshal JSON body"),
                    gzip_response,
                );
            }
        };

        let ctx = RpcContext::new(parts.headers.clone(), grant.deadline(), grant.token());
        match self.invoke(ctx, message).await {
            Err(status) => json_error(headers, &status, gzip_response),
            Ok(reply) => match serde_json::to_vec(&reply) {
                // Body writes happen last: a committed JSON body cannot be
                // followed by a status correction.
                Ok(body) => json_body_response(headers, StatusCode::OK, body, gzip_response),
                Err(err) => {
                    tracing::warn!(method = %self.method, error = %err, "failed to encode JSON response");
                    json_error(
                        headers,
                        &StatusError::internal("can't marshal JSON response"),
                        gzip_response,
                    )
                }
            },
        }
    }

    async fn invoke(&self, ctx: RpcContext, request: Req) -> Result<Resp, StatusError> {
        let deadline = ctx.deadline();
        let fut = (self.implementation)(ctx, request);
        match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, fut).await {
                Ok(result) => result,
                Err(_) => Err(StatusError::deadline_exceeded("request deadline exceeded")),
            },
            None => fut.await,
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Consume and discard whatever remains of a request body.
async fn drain_body(mut body: Body) {
    while let Some(frame) = body.frame().await {
        if frame.is_err() {
            break;
        }
    }
}

// ============================================================================
// Binary framing over the request body
// ============================================================================

/// Buffered reader over the request body's data frames.
struct BodyReader {
    body: Body,
    buf: BytesMut,
    eof: bool,
}

impl BodyReader {
    fn new(body: Body) -> Self {
        Self {
            body,
            buf: BytesMut::new(),
            eof: false,
        }
    }

    /// Buffer at least `n` bytes. Returns false if the body ends first.
    async fn fill(&mut self, n: usize) -> Result<bool, StatusError> {
        while self.buf.len() < n && !self.eof {
            match self.body.frame().await {
                Some(Ok(frame)) => {
                    // Trailer frames on the request side are ignored.
                    if let Ok(data) = frame.into_data() {
                        self.buf.extend_from_slice(&data);
                    }
                }
                Some(Err(err)) => {
                    return Err(StatusError::internal(format!(
                        "failed to read request body: {err}"
                    )));
                }
                None => self.eof = true,
            }
        }
        Ok(self.buf.len() >= n)
    }

    /// True when buffered bytes remain or the body has more to give.
    async fn has_remaining(&mut self) -> Result<bool, StatusError> {
        if !self.buf.is_empty() {
            return Ok(true);
        }
        self.fill(1).await
    }

    fn split_to(&mut self, n: usize) -> Bytes {
        self.buf.split_to(n).freeze()
    }

    /// Read the whole body, enforcing the size limit as bytes arrive.
    async fn read_to_end(&mut self, max_bytes: Option<usize>) -> Result<Bytes, StatusError> {
        let max = max_bytes.unwrap_or(usize::MAX);
        loop {
            if self.buf.len() > max {
                return Err(StatusError::resource_exhausted(format!(
                    "message size exceeds maximum allowed size of {max} bytes"
                )));
            }
            if self.eof {
                let len = self.buf.len();
                return Ok(self.buf.split_to(len).freeze());
            }
            match self.body.frame().await {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        self.buf.extend_from_slice(&data);
                    }
                }
                Some(Err(err)) => {
                    return Err(StatusError::internal(format!(
                        "failed to read request body: {err}"
                    )));
                }
                None => self.eof = true,
            }
        }
    }

    /// Consume whatever is left so the connection can be reused.
    async fn drain(&mut self) {
        self.buf.clear();
        while !self.eof {
            match self.body.frame().await {
                Some(Ok(_)) => {}
                Some(Err(_)) | None => self.eof = true,
            }
        }
    }
}

/// Read exactly one length-prefixed frame and recover its payload.
///
/// An oversize length declaration fails before the payload is pulled off
/// the wire. Unary semantics: bytes after the frame are a protocol error.
async fn read_unary_frame(
    reader: &mut BodyReader,
    encoding: Compression,
    max_bytes: Option<usize>,
) -> Result<Bytes, StatusError> {
    if !reader.fill(FRAME_HEADER_LEN).await? {
        return Err(StatusError::invalid_argument(
            "protocol error: incomplete frame header",
        ));
    }
    let header = reader.split_to(FRAME_HEADER_LEN);
    let (flags, declared) = parse_frame_header(&header).map_err(frame_status)?;
    let declared = declared as usize;

    if let Some(max) = max_bytes {
        if declared > max {
            return Err(StatusError::resource_exhausted(format!(
                "message size {declared} bytes exceeds maximum allowed size of {max} bytes"
            )));
        }
    }

    if !reader.fill(declared).await? {
        return Err(StatusError::invalid_argument(
            "protocol error: truncated frame payload",
        ));
    }
    let payload = reader.split_to(declared);

    if reader.has_remaining().await? {
        return Err(StatusError::invalid_argument(
            "protocol error: unexpected bytes after frame",
        ));
    }

    decode_frame_payload(flags, payload, encoding.codec().as_ref()).map_err(frame_status)
}

fn frame_status(err: FrameError) -> StatusError {
    StatusError::wrap(Code::InvalidArgument, err)
}

// ============================================================================
// Response construction
// ============================================================================

fn binary_ok(headers: HeaderMap, frame: Bytes) -> Response {
    binary_response(headers, Some(frame), None)
}

fn binary_error(headers: HeaderMap, status: &StatusError) -> Response {
    binary_response(headers, None, Some(status))
}

/// Build a binary-mode response: optional data frame, then the reserved
/// trailers. Always HTTP 200; the status travels in the trailers.
fn binary_response(
    headers: HeaderMap,
    frame: Option<Bytes>,
    error: Option<&StatusError>,
) -> Response {
    let trailers = grpc_trailers(error);
    let mut frames: Vec<Result<Frame<Bytes>, Infallible>> = Vec::with_capacity(2);
    if let Some(data) = frame {
        frames.push(Ok(Frame::data(data)));
    }
    frames.push(Ok(Frame::trailers(trailers)));

    let mut response = Response::new(Body::new(StreamBody::new(stream::iter(frames))));
    *response.headers_mut() = headers;
    response
}

/// Build a JSON-mode error response: HTTP projection of the code plus the
/// serialised status body.
fn json_error(headers: HeaderMap, status: &StatusError, gzip: bool) -> Response {
    let http_status = status.code().http_status();
    match serde_json::to_vec(status) {
        Ok(body) => json_body_response(headers, http_status, body, gzip),
        Err(err) => {
            tracing::warn!(error = %err, "failed to encode JSON status body");
            internal_error_response()
        }
    }
}

fn json_body_response(
    mut headers: HeaderMap,
    status: StatusCode,
    body: Vec<u8>,
    gzip: bool,
) -> Response {
    let mut payload = Bytes::from(body);
    if gzip {
        match GzipCodec::default().compress(&payload) {
            Ok(compressed) => {
                headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                payload = compressed;
            }
            Err(err) => {
                tracing::warn!(error = %err, "gzip compression failed, sending identity");
            }
        }
    }

    let mut response = Response::new(Body::from(payload));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Safe fallback when the status body itself fails to serialise. The body
/// is a hardcoded JSON string that cannot fail.
fn internal_error_response() -> Response {
    const ERROR_BODY: &[u8] = br#"{"code":13,"message":"error marshaling status"}"#;

    let mut response = Response::new(Body::from(ERROR_BODY));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
    response
}
