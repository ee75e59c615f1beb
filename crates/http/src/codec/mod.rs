//! HTTP codec implementation for the substrate.
//!
//! This module provides the framing layer between raw byte streams and
//! typed request/response values:
//!
//! - [`RequestDecoder`]: decodes complete `http::Request<Bytes>` frames
//! - [`ResponseEncoder`]: encodes `http::Response<Bytes>` frames

mod request_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
