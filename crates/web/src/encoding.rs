//! Response body compression.
//!
//! Envelopes are compressed whole according to the request's
//! `Accept-Encoding` header. Deflate (zlib) is checked and preferred
//! before gzip; anything else passes through uncompressed.
//!
//! The implementation is inspired by the actix-http crate's encoding
//! functionality.

use std::io;
use std::io::Write;

use bytes::{Bytes, BytesMut};
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};

/// Internal buffer collecting encoded output.
pub(crate) struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Represents the content encodings this runtime negotiates.
pub(crate) enum Encoder {
    /// Deflate (zlib) encoding.
    Deflate(ZlibEncoder<Writer>),
    /// Gzip encoding.
    Gzip(GzEncoder<Writer>),
}

impl Encoder {
    fn deflate() -> Self {
        Self::Deflate(ZlibEncoder::new(Writer::new(), Compression::best()))
    }

    fn gzip() -> Self {
        Self::Gzip(GzEncoder::new(Writer::new(), Compression::best()))
    }

    /// Selects an encoder based on the `Accept-Encoding` header value.
    ///
    /// Deflate is checked before gzip.
    pub(crate) fn select(accept_encodings: &str) -> Option<Self> {
        if accept_encodings.contains("deflate") {
            Some(Self::deflate())
        } else if accept_encodings.contains("gzip") {
            Some(Self::gzip())
        } else {
            None
        }
    }

    /// Returns the name of the encoding, as sent in `Content-Encoding`.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Encoder::Deflate(_) => "deflate",
            Encoder::Gzip(_) => "gzip",
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), io::Error> {
        match self {
            Self::Deflate(encoder) => encoder.write_all(data),
            Self::Gzip(encoder) => encoder.write_all(data),
        }
    }

    /// Finishes the encoding process and returns the encoded data.
    ///
    /// The underlying compressor is always driven to completion here, so
    /// no buffered trailing bytes are lost.
    fn finish(self) -> Result<Bytes, io::Error> {
        match self {
            Self::Deflate(encoder) => encoder.finish().map(|writer| writer.buf.freeze()),
            Self::Gzip(encoder) => encoder.finish().map(|writer| writer.buf.freeze()),
        }
    }
}

/// Compresses `payload` per the `Accept-Encoding` header value.
///
/// Returns the negotiated encoding name (to be set as `Content-Encoding`)
/// and the body bytes; `None` means the payload passes through untouched.
pub(crate) fn encode(accept_encodings: &str, payload: &[u8]) -> Result<(Option<&'static str>, Bytes), io::Error> {
    match Encoder::select(accept_encodings) {
        Some(mut encoder) => {
            encoder.write(payload)?;
            let name = encoder.name();
            Ok((Some(name), encoder.finish()?))
        }
        None => Ok((None, Bytes::copy_from_slice(payload))),
    }
}
