//! Textual request/response protocol spoken over the daemon's local socket.
//!
//! One request per connection: the client writes a single line (`ping`,
//! `refresh` or `reset`), the daemon answers with a single line (`pong`, `ok`
//! or `error`) and closes the connection.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Longest accepted request line, newline included.
pub const MAX_REQUEST_BYTES: u64 = 64;

pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("Unknown request: {0:?}")]
    UnknownRequest(String),

    #[error("Unknown response: {0:?}")]
    UnknownResponse(String),

    #[error("Request line too long")]
    RequestTooLong,

    #[error("Connection closed before a full line was received")]
    UnexpectedEof,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcRequest {
    /// Liveness check; does not trigger a cycle
    Ping,
    /// Run one evaluate-apply cycle soon
    Refresh,
    /// Remove blocking unconditionally, bypassing the schedule
    Reset,
}

impl IpcRequest {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpcRequest::Ping => "ping",
            IpcRequest::Refresh => "refresh",
            IpcRequest::Reset => "reset",
        }
    }

    /// The answer the daemon gives once the request has been accepted.
    pub fn success_response(&self) -> IpcResponse {
        match self {
            IpcRequest::Ping => IpcResponse::Pong,
            IpcRequest::Refresh | IpcRequest::Reset => IpcResponse::Ok,
        }
    }
}

impl fmt::Display for IpcRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpcRequest {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ping" => Ok(IpcRequest::Ping),
            "refresh" => Ok(IpcRequest::Refresh),
            "reset" => Ok(IpcRequest::Reset),
            other => Err(ProtoError::UnknownRequest(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcResponse {
    Pong,
    Ok,
    Error,
}

impl IpcResponse {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpcResponse::Pong => "pong",
            IpcResponse::Ok => "ok",
            IpcResponse::Error => "error",
        }
    }
}

impl fmt::Display for IpcResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpcResponse {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pong" => Ok(IpcResponse::Pong),
            "ok" => Ok(IpcResponse::Ok),
            "error" => Ok(IpcResponse::Error),
            other => Err(ProtoError::UnknownResponse(other.to_string())),
        }
    }
}

/// Read one bounded line. A missing trailing newline is accepted at EOF.
pub async fn read_line<R>(reader: R) -> Result<String, ProtoError>
where
    R: AsyncRead + Unpin,
{
    let mut limited = BufReader::new(reader.take(MAX_REQUEST_BYTES + 1));
    let mut line = String::new();
    let read = limited.read_line(&mut line).await?;

    if read == 0 {
        return Err(ProtoError::UnexpectedEof);
    }
    if read as u64 > MAX_REQUEST_BYTES {
        return Err(ProtoError::RequestTooLong);
    }

    Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
}

/// Read and parse a request from a client.
pub async fn read_request<R>(reader: R) -> Result<IpcRequest, ProtoError>
where
    R: AsyncRead + Unpin,
{
    read_line(reader).await?.parse()
}

pub async fn write_line<W>(writer: &mut W, line: &str) -> Result<(), ProtoError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Send one request to the daemon and wait for its answer.
pub async fn send_request(
    socket_path: &Path,
    request: IpcRequest,
    timeout: Duration,
) -> Result<IpcResponse, ProtoError> {
    let exchange = async {
        let mut stream = UnixStream::connect(socket_path).await?;
        write_line(&mut stream, request.as_str()).await?;
        stream.shutdown().await?;
        read_line(&mut stream).await?.parse()
    };

    tokio::time::timeout(timeout, exchange).await.map_err(|_| ProtoError::Timeout(timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parsing() {
        assert_eq!("ping".parse::<IpcRequest>().unwrap(), IpcRequest::Ping);
        assert_eq!("refresh\n".parse::<IpcRequest>().unwrap(), IpcRequest::Refresh);
        assert_eq!("  reset ".parse::<IpcRequest>().unwrap(), IpcRequest::Reset);
        assert!(matches!("REFRESH".parse::<IpcRequest>(), Err(ProtoError::UnknownRequest(_))));
        assert!(matches!("".parse::<IpcRequest>(), Err(ProtoError::UnknownRequest(_))));
    }

    #[test]
    fn test_success_responses() {
        assert_eq!(IpcRequest::Ping.success_response(), IpcResponse::Pong);
        assert_eq!(IpcRequest::Refresh.success_response(), IpcResponse::Ok);
        assert_eq!(IpcRequest::Reset.success_response(), IpcResponse::Ok);
    }

    #[tokio::test]
    async fn test_read_request_handles_crlf_and_eof() {
        assert_eq!(read_request(&b"ping\r\n"[..]).await.unwrap(), IpcRequest::Ping);
        assert_eq!(read_request(&b"refresh"[..]).await.unwrap(), IpcRequest::Refresh);
        assert!(matches!(read_request(&b""[..]).await, Err(ProtoError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn test_oversized_request_is_rejected() {
        let flood = vec![b'a'; 4096];
        assert!(matches!(read_request(&flood[..]).await, Err(ProtoError::RequestTooLong)));
    }

    #[tokio::test]
    async fn test_round_trip_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("test.sock");
        let listener = tokio::net::UnixListener::bind(&socket).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.split();
            let request = read_request(reader).await.unwrap();
            write_line(&mut writer, request.success_response().as_str()).await.unwrap();
            request
        });

        let response =
            send_request(&socket, IpcRequest::Refresh, DEFAULT_CLIENT_TIMEOUT).await.unwrap();
        assert_eq!(response, IpcResponse::Ok);
        assert_eq!(server.await.unwrap(), IpcRequest::Refresh);
    }

    #[tokio::test]
    async fn test_connect_to_missing_socket_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            send_request(&dir.path().join("absent.sock"), IpcRequest::Ping, DEFAULT_CLIENT_TIMEOUT)
                .await;
        assert!(matches!(result, Err(ProtoError::Io(_))));
    }
}
