//! TCP Listener and Acceptor
//!
//! Binds, accepts, and hands every accepted socket to a
//! [`ConnectionHandler`](crate::connection::ConnectionHandler) under one of
//! two scheduling policies, chosen once at startup:
//!
//! - **Sequential**: the accept loop awaits each connection to completion
//!   before accepting the next. Only one handler is ever active; other
//!   clients wait in the OS listen backlog.
//! - **Concurrent**: every accepted connection runs as its own Tokio task,
//!   in parallel with the others.
//!
//! Under both policies all handlers share one [`Store`].

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats, DEFAULT_MAX_BUFFER};
use crate::storage::Store;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{error, info};

/// How accepted connections are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingPolicy {
    /// One connection at a time
    Sequential,
    /// One task per connection
    Concurrent,
}

/// Errors that prevent the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// The listener plus everything each connection needs.
pub struct Server {
    listener: TcpListener,
    store: Arc<Store>,
    stats: Arc<ConnectionStats>,
    policy: SchedulingPolicy,
    max_buffer: usize,
}

impl Server {
    /// Binds a listener on `addr`.
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        store: Arc<Store>,
        policy: SchedulingPolicy,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(ServerError::Bind)?;
        Ok(Self::from_listener(listener, store, policy))
    }

    /// Wraps an already bound listener.
    pub fn from_listener(listener: TcpListener, store: Arc<Store>, policy: SchedulingPolicy) -> Self {
        Self {
            listener,
            store,
            stats: Arc::new(ConnectionStats::new()),
            policy,
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }

    /// Overrides the per-connection input buffer cap.
    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::LocalAddr)
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Accepts connections until the future is dropped.
    ///
    /// A failed accept is logged and the loop continues; it never takes
    /// down the listener.
    pub async fn run(self) {
        info!(policy = ?self.policy, "Accepting connections");

        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            info!(client = %addr, "Client connected");
            let handler = CommandHandler::new(Arc::clone(&self.store));
            let stats = Arc::clone(&self.stats);

            match self.policy {
                SchedulingPolicy::Sequential => {
                    handle_connection(stream, addr, handler, stats, self.max_buffer).await;
                }
                SchedulingPolicy::Concurrent => {
                    tokio::spawn(handle_connection(
                        stream,
                        addr,
                        handler,
                        stats,
                        self.max_buffer,
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::protocol::Reply;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    async fn create_test_server(
        policy: SchedulingPolicy,
    ) -> (SocketAddr, Arc<Store>, Arc<ConnectionStats>) {
        let store = Arc::new(Store::new());
        let server = Server::bind("127.0.0.1:0", Arc::clone(&store), policy)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let stats = server.stats();

        tokio::spawn(server.run());
        (addr, store, stats)
    }

    #[tokio::test]
    async fn test_set_get_over_tcp() {
        let (addr, _, _) = create_test_server(SchedulingPolicy::Concurrent).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n")
            .await
            .unwrap();
        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+OK\r\n");

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n")
            .await
            .unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"$3\r\nbar\r\n");
    }

    #[tokio::test]
    async fn test_concurrent_clients_disjoint_keys() {
        let (addr, store, _) = create_test_server(SchedulingPolicy::Concurrent).await;

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                tokio::spawn(async move {
                    let mut client = Client::connect(addr).await.unwrap();
                    for j in 0..20 {
                        let key = format!("client{}:key{}", i, j);
                        let value = format!("value{}:{}", i, j);
                        assert_eq!(client.set(&key, &value).await.unwrap(), Reply::Ok);
                        assert_eq!(client.get(&key).await.unwrap(), Reply::bulk(value));
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.len(), 16 * 20);
    }

    #[tokio::test]
    async fn test_concurrent_serves_two_open_connections() {
        let (addr, _, stats) = create_test_server(SchedulingPolicy::Concurrent).await;

        let mut first = Client::connect(addr).await.unwrap();
        let mut second = Client::connect(addr).await.unwrap();

        assert_eq!(first.set("k", "v").await.unwrap(), Reply::Ok);
        let reply = timeout(Duration::from_secs(2), second.get("k"))
            .await
            .expect("second connection should be served while first is open")
            .unwrap();
        assert_eq!(reply, Reply::bulk("v"));
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_sequential_queues_second_connection() {
        let (addr, _, stats) = create_test_server(SchedulingPolicy::Sequential).await;

        let mut first = Client::connect(addr).await.unwrap();
        assert_eq!(first.set("k", "v").await.unwrap(), Reply::Ok);

        // Connects through the backlog, but is not served yet.
        let mut second = Client::connect(addr).await.unwrap();
        let pending = timeout(Duration::from_millis(200), second.get("k")).await;
        assert!(pending.is_err());
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        drop(first);

        let reply = timeout(Duration::from_secs(2), second.read_reply())
            .await
            .expect("second connection should be served after first closes")
            .unwrap();
        assert_eq!(reply, Reply::bulk("v"));
    }

    #[tokio::test]
    async fn test_protocol_error_isolated_to_one_connection() {
        let (addr, _, _) = create_test_server(SchedulingPolicy::Concurrent).await;

        let mut healthy = Client::connect(addr).await.unwrap();
        assert_eq!(healthy.set("k", "v").await.unwrap(), Reply::Ok);

        let mut broken = TcpStream::connect(addr).await.unwrap();
        broken.write_all(b"*1\r\n$x\r\n").await.unwrap();
        let mut buf = Vec::new();
        timeout(Duration::from_secs(2), broken.read_to_end(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert!(buf.starts_with(b"-ERR Protocol error"));

        assert_eq!(healthy.get("k").await.unwrap(), Reply::bulk("v"));
    }

    #[tokio::test]
    async fn test_unknown_command_then_valid_command() {
        let (addr, _, _) = create_test_server(SchedulingPolicy::Concurrent).await;
        let mut client = Client::connect(addr).await.unwrap();

        assert_eq!(
            client.send(["FOO", "bar"]).await.unwrap(),
            Reply::error("ERR unknown command 'FOO'")
        );
        assert_eq!(client.set("foo", "bar").await.unwrap(), Reply::Ok);
        assert_eq!(client.get("foo").await.unwrap(), Reply::bulk("bar"));
    }
}
