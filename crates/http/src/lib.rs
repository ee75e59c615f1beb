//! An asynchronous http substrate for the wisp runtime
//!
//! This crate provides the small HTTP/1.1 server core that the wisp runtime
//! layer builds on. It reads requests from an async stream, hands a complete
//! `http::Request<Bytes>` to a [`handler::Handler`], and writes the
//! handler's response back to the stream.
//!
//! # Features
//!
//! - HTTP/1.1 request parsing built on `httparse`
//! - Asynchronous I/O using tokio and tokio-util codecs
//! - Keep-alive connections
//! - Clean error handling via typed parse/send errors
//!
//! # Design
//!
//! Unlike a fully streaming server, requests are framed whole: the decoder
//! parses the header section, then accumulates exactly `Content-Length`
//! bytes of body before yielding the request. A request without a
//! `Content-Length` header is treated as having no body. This matches the
//! runtime layer above, which decodes bodies as complete JSON or form
//! payloads and never consumes them incrementally.
//!
//! # Example
//!
//! ```no_run
//! use std::error::Error;
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use http::{Request, Response, StatusCode};
//! use tokio::net::TcpListener;
//! use wisp_http::connection::HttpConnection;
//! use wisp_http::handler::make_handler;
//!
//! #[tokio::main]
//! async fn main() {
//!     let tcp_listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let handler = Arc::new(make_handler(hello_world));
//!
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(_) => continue,
//!         };
//!
//!         let handler = Arc::clone(&handler);
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             let connection = HttpConnection::new(reader, writer);
//!             let _ = connection.process(handler).await;
//!         });
//!     }
//! }
//!
//! async fn hello_world(_request: Request<Bytes>) -> Result<Response<Bytes>, Box<dyn Error + Send + Sync>> {
//!     let response = Response::builder()
//!         .status(StatusCode::OK)
//!         .body(Bytes::from_static(b"Hello World!\r\n"))
//!         .unwrap();
//!     Ok(response)
//! }
//! ```
//!
//! # Limitations
//!
//! - HTTP/1.1 only (no HTTP/2 or HTTP/3)
//! - No TLS support (use a reverse proxy for HTTPS)
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64
//! - No chunked request bodies

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
