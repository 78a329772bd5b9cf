//! Framed connection to a Mensago server.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use mg_proto::{Request, Response};

use crate::error::ClientError;

/// One request/response channel to a server. Exchanges are strictly
/// sequential; there is no pipelining.
pub struct ServerConnection<S> {
    stream: S,
}

impl ServerConnection<TcpStream> {
    /// Opens a plain TCP connection. TLS wrapping, when used, happens
    /// before the stream is handed to `from_stream`.
    pub async fn connect(addr: &str, port: u16) -> Result<Self, ClientError> {
        debug!(addr, port, "connecting");
        let stream = TcpStream::connect((addr, port)).await?;
        Ok(Self { stream })
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> ServerConnection<S> {
    /// Wraps an already-established stream.
    pub fn from_stream(stream: S) -> Self {
        Self { stream }
    }

    /// Sends one request and waits for its response.
    pub async fn transact(&mut self, request: &Request) -> Result<Response, ClientError> {
        request.send(&mut self.stream).await?;
        let response = Response::receive(&mut self.stream).await?;
        debug!(action = %request.action, code = response.code, "transaction");
        Ok(response)
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// Fails unless `response` carries `expected`, converting a refusal into a
/// typed protocol error that keeps the server's info string.
pub fn expect_code(response: &Response, expected: u16) -> Result<(), ClientError> {
    if response.code != expected {
        return Err(ClientError::Protocol(response.code, response.info.clone()));
    }
    Ok(())
}
