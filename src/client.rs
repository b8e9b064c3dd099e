//! Minimal RESP Client
//!
//! Sends one command frame at a time and reads back exactly one reply.
//! Used by the `respkv-cli` binary and by the server's own tests.

use crate::protocol::{parse_reply, Frame, ProtocolError, Reply};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

/// Errors a client call can run into.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server closed the connection before a full reply arrived
    #[error("connection closed by server")]
    ConnectionClosed,
}

/// A connection to a server.
///
/// # Example
///
/// ```ignore
/// use respkv::client::Client;
///
/// let mut client = Client::connect("127.0.0.1:6379").await?;
/// client.set("name", "Ariz").await?;
/// println!("{}", client.get("name").await?);
/// ```
#[derive(Debug)]
pub struct Client {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Client {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
        })
    }

    /// Sends one command and waits for its reply.
    pub async fn send<I, T>(&mut self, parts: I) -> Result<Reply, ClientError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let frame = Frame::from_parts(parts);
        self.stream.write_all(&frame.serialize()).await?;
        self.read_reply().await
    }

    /// Reads the next reply off the connection.
    ///
    /// Cancel-safe: bytes already read stay buffered for the next call.
    pub async fn read_reply(&mut self) -> Result<Reply, ClientError> {
        loop {
            if let Some((reply, consumed)) = parse_reply(&self.buffer)? {
                self.buffer.advance(consumed);
                return Ok(reply);
            }

            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(ClientError::ConnectionClosed);
            }
        }
    }

    pub async fn get(&mut self, key: impl AsRef<[u8]>) -> Result<Reply, ClientError> {
        self.send([b"GET".as_slice(), key.as_ref()]).await
    }

    pub async fn set(
        &mut self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Result<Reply, ClientError> {
        self.send([b"SET".as_slice(), key.as_ref(), value.as_ref()])
            .await
    }

    pub async fn set_ex(
        &mut self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        seconds: u64,
    ) -> Result<Reply, ClientError> {
        let seconds = seconds.to_string();
        self.send([
            b"SET".as_slice(),
            key.as_ref(),
            value.as_ref(),
            b"EX",
            seconds.as_bytes(),
        ])
        .await
    }

    pub async fn expire(
        &mut self,
        key: impl AsRef<[u8]>,
        seconds: u64,
    ) -> Result<Reply, ClientError> {
        let seconds = seconds.to_string();
        self.send([b"EXPIRE".as_slice(), key.as_ref(), seconds.as_bytes()])
            .await
    }
}

/// Splits a line of user input into command arguments.
///
/// Whitespace separates arguments; a double-quoted argument may contain
/// spaces. Returns `None` for blank lines.
pub fn split_command_line(line: &str) -> Option<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }

    if args.is_empty() {
        None
    } else {
        Some(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandHandler;
    use crate::connection::{handle_connection, ConnectionStats, DEFAULT_MAX_BUFFER};
    use crate::storage::Store;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn spawn_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(Store::new());
        let stats = Arc::new(ConnectionStats::new());

        tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                let handler = CommandHandler::new(Arc::clone(&store));
                tokio::spawn(handle_connection(
                    stream,
                    peer,
                    handler,
                    Arc::clone(&stats),
                    DEFAULT_MAX_BUFFER,
                ));
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_helpers_roundtrip() {
        let addr = spawn_server().await;
        let mut client = Client::connect(addr).await.unwrap();

        assert_eq!(client.get("missing").await.unwrap(), Reply::Nil);
        assert_eq!(client.set_ex("k", "v", 100).await.unwrap(), Reply::Ok);
        assert_eq!(client.get("k").await.unwrap(), Reply::bulk("v"));
        assert_eq!(client.expire("k", 50).await.unwrap(), Reply::Ok);
        assert_eq!(client.expire("missing", 50).await.unwrap(), Reply::Nil);
    }

    #[tokio::test]
    async fn test_value_with_crlf() {
        let addr = spawn_server().await;
        let mut client = Client::connect(addr).await.unwrap();

        assert_eq!(client.set("k", "a\r\nb").await.unwrap(), Reply::Ok);
        assert_eq!(client.get("k").await.unwrap(), Reply::bulk("a\r\nb"));
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut client = Client::connect(addr).await.unwrap();
        assert!(matches!(
            client.read_reply().await,
            Err(ClientError::ConnectionClosed) | Err(ClientError::Io(_))
        ));
    }

    #[test]
    fn test_split_command_line() {
        assert_eq!(
            split_command_line("SET name Ariz"),
            Some(vec!["SET".to_string(), "name".to_string(), "Ariz".to_string()])
        );
        assert_eq!(
            split_command_line("  SET  greeting \"hello world\" EX 10 "),
            Some(vec![
                "SET".to_string(),
                "greeting".to_string(),
                "hello world".to_string(),
                "EX".to_string(),
                "10".to_string(),
            ])
        );
        assert_eq!(
            split_command_line("SET empty \"\""),
            Some(vec!["SET".to_string(), "empty".to_string(), String::new()])
        );
        assert_eq!(split_command_line("   "), None);
    }
}
