//! HTTP request decoder implementation
//!
//! This module decodes HTTP requests from raw bytes into complete
//! `http::Request<Bytes>` values. It operates in two phases:
//!
//! 1. Header parsing: the header section is parsed with `httparse` using
//!    zero-copy header-index recording
//! 2. Body accumulation: exactly `Content-Length` bytes are collected and
//!    attached as the request body
//!
//! A request without a `Content-Length` header is treated as having no
//! body, so the decoder yields it as soon as the header section is
//! complete. Chunked request bodies are not supported.

use std::mem::MaybeUninit;

use bytes::{Bytes, BytesMut};
use http::{HeaderName, HeaderValue, Request};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, RequestHeader};

/// Maximum number of headers allowed in a request
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// A decoder for HTTP requests that yields one complete request per frame.
///
/// # State Machine
///
/// The decoder maintains its state through the `pending` field:
/// - `None`: currently parsing the header section
/// - `Some((header, need))`: header parsed, waiting for `need` body bytes
pub struct RequestDecoder {
    pending: Option<(RequestHeader, usize)>,
}

impl RequestDecoder {
    /// Creates a new `RequestDecoder` instance
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl Decoder for RequestDecoder {
    type Item = Request<Bytes>;
    type Error = ParseError;

    /// Attempts to decode a complete HTTP request from the provided buffer
    ///
    /// # Returns
    ///
    /// - `Ok(Some(request))`: a full request (header and body) was decoded
    /// - `Ok(None)`: need more data to proceed
    /// - `Err(_)`: encountered a parsing error
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // finish collecting the body of a previously parsed header
        if let Some((_, need)) = &self.pending {
            if src.len() < *need {
                return Ok(None);
            }
            // unwrap is safe: the branch above proved pending is Some
            let (header, need) = self.pending.take().unwrap();
            let body = src.split_to(need).freeze();
            return Ok(Some(header.body(body)));
        }

        let header = match parse_header(src)? {
            Some(header) => header,
            None => return Ok(None),
        };

        let need = content_length(&header)?;
        trace!(body_size = need, "parsed request header, expecting body");

        if src.len() < need {
            src.reserve(need - src.len());
            self.pending = Some((header, need));
            return Ok(None);
        }

        let body = src.split_to(need).freeze();
        Ok(Some(header.body(body)))
    }
}

/// Parses the header section at the front of `src`, consuming it on success.
fn parse_header(src: &mut BytesMut) -> Result<Option<RequestHeader>, ParseError> {
    // Fast path: minimum valid request is "GET / HTTP/1.1\r\n\r\n"
    if src.len() < 14 {
        return Ok(None);
    }

    // Create an empty HTTP request parser and uninitialized headers array
    let mut req = httparse::Request::new(&mut []);
    let mut headers: [MaybeUninit<httparse::Header>; MAX_HEADER_NUM] = unsafe { MaybeUninit::uninit().assume_init() };

    let parsed_result = req.parse_with_uninit_headers(src, &mut headers).map_err(|e| match e {
        Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
        e => ParseError::invalid_header(e.to_string()),
    });

    match parsed_result? {
        Status::Complete(body_offset) => {
            ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

            let header_count = req.headers.len();
            ensure!(header_count <= MAX_HEADER_NUM, ParseError::too_many_headers(header_count));

            // Record byte range indices for each header before the borrow
            // of src ends
            let mut header_index: [HeaderIndex; MAX_HEADER_NUM] = EMPTY_HEADER_INDEX_ARRAY;
            HeaderIndex::record(src, req.headers, &mut header_index);

            let version = match req.version {
                Some(0) => http::Version::HTTP_10,
                Some(1) => http::Version::HTTP_11,
                // HTTP/2 and HTTP/3 not supported
                _ => return Err(ParseError::InvalidVersion(req.version)),
            };

            let mut header_builder = Request::builder()
                .method(req.method.ok_or(ParseError::InvalidMethod)?)
                .uri(req.path.ok_or(ParseError::InvalidUri)?)
                .version(version);

            // unwrap is safe: the builder has no error at this point
            let headers = header_builder.headers_mut().unwrap();
            headers.reserve(header_count);

            // Split header portion from source buffer and build each header
            // from the recorded ranges
            let header_bytes = src.split_to(body_offset).freeze();
            for index in &header_index[..header_count] {
                // Safe to unwrap since httparse verified header name is valid ASCII
                let name = HeaderName::from_bytes(&header_bytes[index.name.0..index.name.1]).unwrap();

                // Safe to use from_maybe_shared_unchecked since httparse verified
                // header value contains only visible ASCII chars
                let value =
                    unsafe { HeaderValue::from_maybe_shared_unchecked(header_bytes.slice(index.value.0..index.value.1)) };

                headers.append(name, value);
            }

            // unwrap is safe: method, uri and version have been validated above
            Ok(Some(RequestHeader::from(header_builder.body(()).unwrap())))
        }
        Status::Partial => {
            ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
            Ok(None)
        }
    }
}

/// Reads the declared body length; a missing header means "no body".
fn content_length(header: &RequestHeader) -> Result<usize, ParseError> {
    let value = match header.headers().get(http::header::CONTENT_LENGTH) {
        Some(value) => value,
        None => return Ok(0),
    };

    value
        .to_str()
        .map_err(|e| ParseError::invalid_content_length(e.to_string()))?
        .trim()
        .parse::<usize>()
        .map_err(|e| ParseError::invalid_content_length(e.to_string()))
}

/// Stores the byte range positions of a header's name and value within the
/// original buffer, so header data is indexed rather than copied.
#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

const EMPTY_HEADER_INDEX: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

const EMPTY_HEADER_INDEX_ARRAY: [HeaderIndex; MAX_HEADER_NUM] = [EMPTY_HEADER_INDEX; MAX_HEADER_NUM];

impl HeaderIndex {
    /// Records the byte positions of header names and values relative to
    /// the start of `bytes`.
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for (header, index) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            index.name = (name_start, name_start + header.name.len());
            index.value = (value_start, value_start + header.value.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use http::Method;
    use indoc::indoc;

    use super::*;

    #[test]
    fn decode_without_body() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##};

        let mut decoder = RequestDecoder::new();
        let mut buffer = BytesMut::from(str);

        let request = decoder.decode(&mut buffer).unwrap().unwrap();

        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.uri().path(), "/index.html");
        assert_eq!(request.headers().len(), 3);
        assert!(request.body().is_empty());
    }

    #[test]
    fn decode_with_content_length_body() {
        let str = indoc! {r##"
        POST /submit HTTP/1.1
        Host: 127.0.0.1:8080
        Content-Length: 5

        hello"##};

        let mut decoder = RequestDecoder::new();
        let mut buffer = BytesMut::from(str);

        let request = decoder.decode(&mut buffer).unwrap().unwrap();

        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.body(), &Bytes::from_static(b"hello"));
    }

    #[test]
    fn decode_waits_for_full_body() {
        let str = indoc! {r##"
        POST /submit HTTP/1.1
        Host: 127.0.0.1:8080
        Content-Length: 11

        hel"##};

        let mut decoder = RequestDecoder::new();
        let mut buffer = BytesMut::from(str);

        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"lo world");
        let request = decoder.decode(&mut buffer).unwrap().unwrap();

        assert_eq!(request.body(), &Bytes::from_static(b"hello world"));
    }

    #[test]
    fn decode_partial_header() {
        let mut decoder = RequestDecoder::new();
        let mut buffer = BytesMut::from("GET /index.html HTTP/1.1\r\nHost: 127.0");

        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b".0.1:8080\r\n\r\n");
        let request = decoder.decode(&mut buffer).unwrap().unwrap();

        assert_eq!(request.uri().path(), "/index.html");
    }

    #[test]
    fn decode_rejects_bad_content_length() {
        let str = indoc! {r##"
        POST /submit HTTP/1.1
        Content-Length: banana

        "##};

        let mut decoder = RequestDecoder::new();
        let mut buffer = BytesMut::from(str);

        let err = decoder.decode(&mut buffer).unwrap_err();
        assert!(matches!(err, ParseError::InvalidContentLength { .. }));
    }

    #[test]
    fn decode_pipelined_requests() {
        let mut decoder = RequestDecoder::new();
        let mut buffer = BytesMut::from(
            "GET /first HTTP/1.1\r\nHost: a\r\n\r\nGET /second HTTP/1.1\r\nHost: b\r\n\r\n",
        );

        let first = decoder.decode(&mut buffer).unwrap().unwrap();
        let second = decoder.decode(&mut buffer).unwrap().unwrap();

        assert_eq!(first.uri().path(), "/first");
        assert_eq!(second.uri().path(), "/second");
        assert!(buffer.is_empty());
    }
}
