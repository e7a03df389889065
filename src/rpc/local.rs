//! In-process transport
//!
//! Runs every daemon inside the client process. Used for single-node
//! deployments and tests; individual daemons can be taken offline to
//! exercise replica handling.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::{Request, Response, Transport};
use crate::daemon::{ChunkStorage, Daemon};
use crate::error::{Error, Result};
use crate::metadata::{MemoryStore, MetadataStore};
use crate::placement::DaemonId;

/// Transport calling daemons in the same process
pub struct LocalTransport {
    daemons: Vec<Arc<Daemon>>,
    offline: Vec<AtomicBool>,
}

impl LocalTransport {
    /// Wrap existing daemons; the position in `daemons` is the daemon id
    pub fn new(daemons: Vec<Arc<Daemon>>) -> Self {
        let offline = daemons.iter().map(|_| AtomicBool::new(false)).collect();
        Self { daemons, offline }
    }

    /// Spawn `count` daemons with in-memory metadata and chunk
    /// directories under `base_dir`
    pub fn spawn(base_dir: &Path, count: usize, chunk_size: u64) -> Result<Self> {
        let mut daemons = Vec::with_capacity(count);
        for i in 0..count {
            let store: Arc<dyn MetadataStore> = Arc::new(MemoryStore::new());
            let chunks = ChunkStorage::new(base_dir.join(format!("daemon-{}", i)), chunk_size, 0)?;
            daemons.push(Arc::new(Daemon::new(format!("local-{}", i), store, chunks)?));
        }
        Ok(Self::new(daemons))
    }

    /// Make calls to `target` fail as if the daemon were unreachable
    pub fn set_offline(&self, target: DaemonId, offline: bool) {
        if let Some(flag) = self.offline.get(target) {
            flag.store(offline, Ordering::SeqCst);
        }
    }

    pub fn daemon(&self, target: DaemonId) -> Option<&Arc<Daemon>> {
        self.daemons.get(target)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn num_daemons(&self) -> usize {
        self.daemons.len()
    }

    async fn call(&self, target: DaemonId, request: Request) -> Result<Response> {
        let daemon = self
            .daemons
            .get(target)
            .cloned()
            .ok_or_else(|| Error::Network(format!("Unknown daemon id {}", target)))?;

        if self.offline[target].load(Ordering::SeqCst) {
            return Err(Error::ConnectionFailed {
                address: daemon.node_id().to_string(),
                reason: "daemon offline".into(),
            });
        }

        tokio::task::spawn_blocking(move || daemon.handle(request))
            .await
            .map_err(|e| Error::Network(format!("daemon task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_offline_daemon_fails_retryably() {
        let dir = tempdir().unwrap();
        let transport = LocalTransport::spawn(dir.path(), 2, 4096).unwrap();
        assert!(matches!(transport.call(1, Request::Ping).await, Ok(Response::Pong { .. })));

        transport.set_offline(1, true);
        let err = transport.call(1, Request::Ping).await.unwrap_err();
        assert!(err.is_retryable());

        transport.set_offline(1, false);
        assert!(transport.call(1, Request::Ping).await.is_ok());
    }
}
