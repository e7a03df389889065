//! Daemon Server
//!
//! TCP front end of a [`Daemon`]. Each connection carries a sequence of
//! framed request/response pairs.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use super::Daemon;
use crate::error::{Error, Result};
use crate::rpc::{read_message, write_message, Request, Response};

/// TCP server for one storage daemon
pub struct DaemonServer {
    /// Bind address
    bind_address: String,
    /// Request handler
    daemon: Arc<Daemon>,
    /// Compress replies
    compression: bool,
    /// Shutdown signal
    shutdown: watch::Sender<bool>,
}

impl DaemonServer {
    /// Create a new daemon server
    pub fn new(bind_address: String, daemon: Arc<Daemon>, compression: bool) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            bind_address,
            daemon,
            compression,
            shutdown,
        }
    }

    /// Bind the listening socket
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(&self.bind_address).await?;
        tracing::info!(
            "Daemon {} listening on {}",
            self.daemon.node_id(),
            listener.local_addr()?
        );
        Ok(listener)
    }

    /// Bind and serve until [`stop`](Self::stop) is called
    pub async fn start(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve connections on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            let daemon = Arc::clone(&self.daemon);
                            let compression = self.compression;

                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(socket, addr, daemon, compression).await {
                                    tracing::warn!("Connection error from {}: {}", addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Daemon server stopped");
        Ok(())
    }

    /// Stop the server
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Handle a single client connection
async fn handle_connection(
    socket: TcpStream,
    peer: SocketAddr,
    daemon: Arc<Daemon>,
    compression: bool,
) -> Result<()> {
    socket.set_nodelay(true)?;
    let (mut reader, mut writer) = socket.into_split();

    loop {
        let request: Request = match read_message(&mut reader).await {
            Ok(request) => request,
            Err(Error::Io(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // Connection closed
                break;
            }
            Err(e) => {
                tracing::warn!("Error reading request from {}: {}", peer, e);
                break;
            }
        };

        tracing::trace!("Received {} from {}", request.type_name(), peer);

        let handler = Arc::clone(&daemon);
        let response = tokio::task::spawn_blocking(move || handler.handle(request))
            .await
            .unwrap_or_else(|e| Response::from_error(&Error::RemoteIo(format!("handler panicked: {}", e))));

        write_message(&mut writer, &response, compression).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::ChunkStorage;
    use crate::metadata::MemoryStore;
    use crate::rpc::{TcpTransport, Transport};
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_serve_ping_and_stop() {
        let dir = tempdir().unwrap();
        let chunks = ChunkStorage::new(dir.path().join("chunks"), 4096, 0).unwrap();
        let daemon = Arc::new(Daemon::new("d0".into(), Arc::new(MemoryStore::new()), chunks).unwrap());

        let server = Arc::new(DaemonServer::new("127.0.0.1:0".into(), daemon, false));
        let listener = server.bind().await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let serving = Arc::clone(&server);
        let handle = tokio::spawn(async move { serving.serve(listener).await });

        let transport = TcpTransport::new(
            vec![address],
            Duration::from_secs(1),
            Duration::from_secs(5),
            false,
        );
        match transport.call(0, Request::Ping).await.unwrap() {
            Response::Pong { node_id } => assert_eq!(node_id, "d0"),
            other => panic!("unexpected {}", other.type_name()),
        }

        server.stop();
        handle.await.unwrap().unwrap();
    }
}
