//! Response envelope construction and the terminal write operation.
//!
//! Every payload leaves the runtime wrapped in the standard envelope
//! `{data, status, message}`, serialized as JSON and optionally
//! compressed. A payload type may instead shape its own envelope by
//! implementing [`WireSender`]; [`Request::write`] is the fallback branch
//! that synthesizes the default shape.
//!
//! In batch mode the envelope is handed to the request's pipe (tagged
//! with the request's index) instead of being turned into wire bytes; a
//! downstream aggregator reassembles out-of-order completions by index.

use bytes::Bytes;
use http::{Response, StatusCode, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::encoding;
use crate::params::ParamError;
use crate::request::Request;

/// Server identification header value.
pub const SERVER_UA: &str = concat!("wisp/", env!("CARGO_PKG_VERSION"));

/// The envelope mapping as it travels to the wire or onto a batch pipe.
pub type Wire = serde_json::Map<String, Value>;

/// Capability contract for payloads that produce their own envelope
/// mapping instead of the default `{data, status, message}` shape.
pub trait WireSender {
    fn send_over_wire(&self) -> Wire;
}

/// The standard response envelope.
///
/// This is the shape clients decode; handlers rarely construct it
/// directly, since [`Request::write`] synthesizes it around any
/// serializable payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<T> {
    pub data: T,
    pub status: u16,
    pub message: String,
}

/// An error payload that flows through the same envelope pipeline as
/// success data, carrying a non-200 status and a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub status: StatusCode,
    pub message: String,
}

impl Fault {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl WireSender for Fault {
    fn send_over_wire(&self) -> Wire {
        let mut wire = Wire::new();
        wire.insert("data".to_string(), Value::Null);
        wire.insert("status".to_string(), Value::from(self.status.as_u16()));
        wire.insert("message".to_string(), Value::from(self.message.clone()));
        wire
    }
}

impl From<ParamError> for Fault {
    fn from(error: ParamError) -> Self {
        Fault::bad_request(error.to_string())
    }
}

/// Where a reply went.
#[derive(Debug)]
pub enum Reply {
    /// Direct mode: the finished HTTP response, ready for the wire.
    Direct(Response<Bytes>),
    /// Batch mode: the envelope was handed to the aggregator's pipe.
    Piped,
}

impl Reply {
    /// The wire response, if this reply produced one.
    pub fn into_response(self) -> Option<Response<Bytes>> {
        match self {
            Reply::Direct(response) => Some(response),
            Reply::Piped => None,
        }
    }
}

/// Errors raised by the terminal write operation.
#[derive(Error, Debug)]
pub enum ReplyError {
    #[error("response has already been written for this request")]
    AlreadyReplied,

    #[error("batch pipe is closed, aggregator is gone")]
    PipeClosed,

    #[error("can't serialize envelope: {source}")]
    Serialize {
        #[from]
        source: serde_json::Error,
    },

    #[error("can't compress envelope: {source}")]
    Compress {
        #[from]
        source: std::io::Error,
    },

    #[error("can't build response: {source}")]
    Http {
        #[from]
        source: http::Error,
    },
}

impl Request {
    /// Wraps `data` in the default envelope and terminates the request.
    ///
    /// This is the terminal, at-most-once operation: in direct mode it
    /// produces the complete HTTP response (headers, serialized envelope,
    /// negotiated compression); in batch mode it performs exactly one
    /// channel send and produces no wire bytes.
    pub async fn write<T: Serialize>(&mut self, data: &T) -> Result<Reply, ReplyError> {
        let data = serde_json::to_value(data)?;

        let mut wire = Wire::new();
        wire.insert("data".to_string(), data);
        wire.insert("status".to_string(), Value::from(StatusCode::OK.as_u16()));
        wire.insert("message".to_string(), Value::from(""));

        self.finish(wire).await
    }

    /// Terminates the request with a payload that shapes its own
    /// envelope.
    pub async fn write_wire<W: WireSender>(&mut self, payload: &W) -> Result<Reply, ReplyError> {
        self.finish(payload.send_over_wire()).await
    }

    /// Reports an error through the regular envelope pipeline.
    ///
    /// This is not a distinct error path: the fault flows through the
    /// exact same envelope/compression/batch logic as success payloads,
    /// so clients always receive a well-formed JSON envelope.
    pub async fn raise(&mut self, fault: &Fault) -> Result<Reply, ReplyError> {
        self.write_wire(fault).await
    }

    /// Sends the client elsewhere; no envelope involved.
    pub fn redirect(&mut self, url: &str, status: StatusCode) -> Result<Reply, ReplyError> {
        if self.replied {
            return Err(ReplyError::AlreadyReplied);
        }
        self.replied = true;

        info!("redirecting to {}", url);
        let response = Response::builder()
            .status(status)
            .header(header::LOCATION, url)
            .body(Bytes::new())?;
        Ok(Reply::Direct(response))
    }

    async fn finish(&mut self, mut wire: Wire) -> Result<Reply, ReplyError> {
        if self.replied {
            return Err(ReplyError::AlreadyReplied);
        }
        self.replied = true;

        // batch mode: tag with the externally assigned index and hand the
        // envelope to the aggregator, leaving the wire untouched
        if let Some(pipe) = &self.pipe {
            wire.insert("index".to_string(), Value::from(pipe.index as u64));
            pipe.tx.send(wire).await.map_err(|_| ReplyError::PipeClosed)?;
            return Ok(Reply::Piped);
        }

        let json = serde_json::to_vec(&Value::Object(wire))?;

        let accept_encodings = self
            .header
            .headers()
            .get(header::ACCEPT_ENCODING)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        let (content_encoding, body) = encoding::encode(accept_encodings, &json)?;

        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::SERVER, SERVER_UA)
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .header(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref());
        if let Some(name) = content_encoding {
            builder = builder.header(header::CONTENT_ENCODING, name);
        }

        Ok(Reply::Direct(builder.body(body)?))
    }
}
