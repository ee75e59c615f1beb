//! HTTP request header handling implementation.
//!
//! This module provides the core abstraction for handling HTTP request
//! headers. It wraps the standard `http::Request` type so the codec can
//! parse a header section first and attach the body bytes later.

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

/// Represents an HTTP request header.
///
/// This struct wraps a `http::Request<()>` to provide:
/// - Access to standard HTTP header fields
/// - Conversion from different request formats
/// - Body attachment capabilities
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl RequestHeader {
    /// Consumes the header and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body to this header, converting it into a full `Request<T>`.
    ///
    /// This is typically used after header parsing to attach the parsed body.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|_| body)
    }

    /// Returns a reference to the request's HTTP method.
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    /// Returns a reference to the request's URI.
    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    /// Returns the request's HTTP version.
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Returns a reference to the request's headers.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }
}

impl From<Request<()>> for RequestHeader {
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

impl From<Parts> for RequestHeader {
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, Request, Version};

    use super::*;

    fn header() -> RequestHeader {
        let request = Request::builder()
            .method(Method::GET)
            .uri("/index?a=1")
            .version(Version::HTTP_11)
            .header(http::header::HOST, "127.0.0.1:8080")
            .body(())
            .unwrap();
        RequestHeader::from(request)
    }

    #[test]
    fn accessors_expose_the_request_line() {
        let header = header();
        assert_eq!(header.method(), &Method::GET);
        assert_eq!(header.uri().path(), "/index");
        assert_eq!(header.uri().query(), Some("a=1"));
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.headers().len(), 1);
    }

    #[test]
    fn body_attaches() {
        let request = header().body("payload");
        assert_eq!(*request.body(), "payload");
        assert_eq!(request.method(), &Method::GET);
    }

    #[test]
    fn from_parts_round_trips() {
        let (parts, ()) = header().into_inner().into_parts();
        let rebuilt = RequestHeader::from(parts);
        assert_eq!(rebuilt.uri().path(), "/index");
    }
}
