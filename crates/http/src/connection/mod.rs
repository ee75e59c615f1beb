//! Core connection handling for the substrate.
//!
//! [`HttpConnection`] manages the lifecycle of one accepted connection:
//! decoding requests, invoking the handler and writing responses back,
//! honoring keep-alive.

use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::{Request, Response, StatusCode, Version};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{error, info};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::handler::Handler;
use crate::protocol::HttpError;

/// An HTTP connection that processes requests one at a time
///
/// `HttpConnection` handles the full lifecycle of an HTTP connection:
/// - Reading and decoding complete requests
/// - Invoking the request handler
/// - Writing responses back to the peer
/// - Keep-alive handling
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), 8 * 1024),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
        }
    }

    /// Processes requests from this connection until the peer closes it,
    /// a request asks for close, or an error occurs.
    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
    {
        loop {
            match self.framed_read.next().await {
                Some(Ok(request)) => {
                    let keep_alive = wants_keep_alive(&request);

                    let response = match handler.call(request).await {
                        Ok(response) => response,
                        Err(e) => {
                            error!("handler error, cause: {}", e.into());
                            build_error_response(StatusCode::INTERNAL_SERVER_ERROR)
                        }
                    };

                    self.framed_write.send(response).await?;

                    if !keep_alive {
                        info!("connection close requested by peer");
                        return Ok(());
                    }
                }

                Some(Err(e)) => {
                    error!("can't decode next request, cause: {}", e);
                    let error_response = build_error_response(StatusCode::BAD_REQUEST);
                    self.framed_write.send(error_response).await?;
                    return Err(e.into());
                }

                None => {
                    info!("no more requests, connection shutdown");
                    return Ok(());
                }
            }
        }
    }
}

fn wants_keep_alive(request: &Request<Bytes>) -> bool {
    let connection = request
        .headers()
        .get(http::header::CONNECTION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    match request.version() {
        Version::HTTP_10 => connection.eq_ignore_ascii_case("keep-alive"),
        _ => !connection.eq_ignore_ascii_case("close"),
    }
}

fn build_error_response(status_code: StatusCode) -> Response<Bytes> {
    // unwrap is safe: a status-only builder cannot fail
    Response::builder().status(status_code).body(Bytes::new()).unwrap()
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;
    use crate::handler::make_handler;

    async fn echo(request: Request<Bytes>) -> Result<Response<Bytes>, Infallible> {
        let body = request.into_body();
        Ok(Response::builder().status(StatusCode::OK).body(body).unwrap())
    }

    #[tokio::test]
    async fn process_single_request() {
        let (client, server) = tokio::io::duplex(4 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (mut client_read, mut client_write) = tokio::io::split(client);

        let connection = HttpConnection::new(server_read, server_write);
        let join = tokio::spawn(async move { connection.process(Arc::new(make_handler(echo))).await });

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        client_write
            .write_all(b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 4\r\nConnection: close\r\n\r\nping")
            .await
            .unwrap();

        let mut buffer = Vec::new();
        client_read.read_to_end(&mut buffer).await.unwrap();
        let response = String::from_utf8(buffer).unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("\r\n\r\nping"));

        join.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn process_keeps_alive_between_requests() {
        let (client, server) = tokio::io::duplex(4 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (mut client_read, mut client_write) = tokio::io::split(client);

        let connection = HttpConnection::new(server_read, server_write);
        tokio::spawn(async move { connection.process(Arc::new(make_handler(echo))).await });

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        client_write
            .write_all(b"POST /1 HTTP/1.1\r\nContent-Length: 1\r\n\r\na")
            .await
            .unwrap();
        client_write
            .write_all(b"POST /2 HTTP/1.1\r\nContent-Length: 1\r\nConnection: close\r\n\r\nb")
            .await
            .unwrap();

        let mut buffer = Vec::new();
        client_read.read_to_end(&mut buffer).await.unwrap();
        let responses = String::from_utf8(buffer).unwrap();

        assert_eq!(responses.matches("HTTP/1.1 200 OK").count(), 2);
    }
}
