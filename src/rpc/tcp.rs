//! TCP Transport
//!
//! Client side of the daemon protocol over TCP, with a small pool of idle
//! connections per daemon.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::{read_message, write_message, Request, Response, Transport};
use crate::config::BurstConfig;
use crate::error::{Error, Result};
use crate::placement::DaemonId;

/// Idle connections kept per daemon
const MAX_IDLE_PER_DAEMON: usize = 8;

/// Transport reaching daemons over TCP
pub struct TcpTransport {
    /// Daemon addresses, indexed by daemon id
    addresses: Vec<String>,
    /// Idle connections: address -> streams
    pool: Mutex<HashMap<String, Vec<TcpStream>>>,
    /// Connection timeout
    connect_timeout: Duration,
    /// Request timeout
    request_timeout: Duration,
    /// Compress request bodies
    compression: bool,
}

impl TcpTransport {
    /// Create a new transport
    pub fn new(
        addresses: Vec<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
        compression: bool,
    ) -> Self {
        Self {
            addresses,
            pool: Mutex::new(HashMap::new()),
            connect_timeout,
            request_timeout,
            compression,
        }
    }

    /// Create a transport for the daemons listed in the configuration
    pub fn from_config(config: &BurstConfig) -> Self {
        Self::new(
            config.cluster.daemons.clone(),
            config.connect_timeout(),
            config.request_timeout(),
            config.transport.compression,
        )
    }

    fn address(&self, target: DaemonId) -> Result<&str> {
        self.addresses
            .get(target)
            .map(String::as_str)
            .ok_or_else(|| Error::Network(format!("Unknown daemon id {}", target)))
    }

    /// Send on a pooled connection if one is idle, else on a fresh one.
    ///
    /// Only a request that could not be written is sent again. Once it is
    /// on the wire the daemon may have applied it, so a lost reply is an
    /// error.
    async fn send_inner(&self, address: &str, request: &Request) -> Result<Response> {
        let mut stream = match self.checkout(address).await {
            Some(mut stream) => match write_message(&mut stream, request, self.compression).await {
                Ok(()) => stream,
                Err(e) => {
                    tracing::debug!("Dropping pooled connection to {}: {}", address, e);
                    self.send_fresh(address, request).await?
                }
            },
            None => self.send_fresh(address, request).await?,
        };

        let response = read_message(&mut stream).await.map_err(|e| match e {
            Error::Io(io) => Error::ConnectionFailed {
                address: address.to_string(),
                reason: format!("no reply: {}", io),
            },
            other => other,
        })?;
        self.checkin(address, stream).await;
        Ok(response)
    }

    /// Write `request` on a new connection
    async fn send_fresh(&self, address: &str, request: &Request) -> Result<TcpStream> {
        let mut stream = self.connect(address).await?;
        write_message(&mut stream, request, self.compression).await?;
        Ok(stream)
    }

    /// Connect to an address
    async fn connect(&self, address: &str) -> Result<TcpStream> {
        let result = timeout(self.connect_timeout, TcpStream::connect(address)).await;

        match result {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Ok(Err(e)) => Err(Error::ConnectionFailed {
                address: address.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::ConnectionTimeout(address.to_string())),
        }
    }

    /// Take an idle connection the daemon has not closed
    async fn checkout(&self, address: &str) -> Option<TcpStream> {
        let mut pool = self.pool.lock().await;
        let idle = pool.get_mut(address)?;
        while let Some(stream) = idle.pop() {
            if is_idle_open(&stream) {
                return Some(stream);
            }
        }
        None
    }

    async fn checkin(&self, address: &str, stream: TcpStream) {
        let mut pool = self.pool.lock().await;
        let idle = pool.entry(address.to_string()).or_default();
        if idle.len() < MAX_IDLE_PER_DAEMON {
            idle.push(stream);
        }
    }

    /// Get idle connection count
    pub async fn connection_count(&self) -> usize {
        self.pool.lock().await.values().map(Vec::len).sum()
    }
}

/// An idle connection is usable while a read would block; EOF or unsolicited
/// bytes mean the daemon side is gone or out of step
fn is_idle_open(stream: &TcpStream) -> bool {
    let mut byte = [0u8; 1];
    matches!(stream.try_read(&mut byte), Err(e) if e.kind() == std::io::ErrorKind::WouldBlock)
}

#[async_trait]
impl Transport for TcpTransport {
    fn num_daemons(&self) -> usize {
        self.addresses.len()
    }

    async fn call(&self, target: DaemonId, request: Request) -> Result<Response> {
        let address = self.address(target)?;
        match timeout(self.request_timeout, self.send_inner(address, &request)).await {
            Ok(inner_result) => inner_result,
            Err(_) => Err(Error::ConnectionTimeout(address.to_string())),
        }
    }
}
