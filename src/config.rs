//! BurstFS Configuration
//!
//! This module provides configuration structures shared by the storage
//! daemons and the client coordinator. Every process in a deployment must
//! load the same `[cluster]` and `[layout]` sections, otherwise clients
//! disagree on where chunks and metadata live.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::layout::{ChunkLayout, PflComponent};

/// Main BurstFS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurstConfig {
    /// Node-specific configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// Cluster configuration
    pub cluster: ClusterConfig,

    /// Chunk layout configuration
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Optional file system behaviour
    #[serde(default)]
    pub features: FeatureConfig,

    /// Metadata backend configuration
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Daemon transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Client-side configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identifier (defaults to the hostname)
    #[serde(default = "default_node_id")]
    pub id: String,

    /// Address the daemon listens on
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Data directory for chunk files and the metadata database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Number of chunks this daemon advertises as its capacity (0 = unlimited)
    #[serde(default)]
    pub capacity_chunks: u64,
}

/// Cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Ordered daemon addresses. The position of an address is its daemon id.
    pub daemons: Vec<String>,

    /// Number of additional copies kept for data and metadata
    #[serde(default)]
    pub replicas: u32,
}

/// Chunk layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Flat chunk size in bytes (power of two)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Use the progressive file layout instead of flat chunking
    #[serde(default)]
    pub use_pfl: bool,

    /// Progressive layout components, ordered by start offset
    #[serde(default = "default_pfl_components")]
    pub components: Vec<ComponentConfig>,
}

/// One progressive layout component
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentConfig {
    /// First byte offset covered by this component
    pub start: u64,

    /// Stripe size inside this component (power of two)
    pub stripe_size: u64,
}

/// Optional file system behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Support symbolic links
    #[serde(default = "default_true")]
    pub symlinks: bool,

    /// Support rename through forwarding entries
    #[serde(default = "default_true")]
    pub rename: bool,

    /// Require the parent directory to exist on create
    #[serde(default)]
    pub create_check_parents: bool,

    /// Zero the caller's buffer before every read (sparse files)
    #[serde(default)]
    pub zero_buffer_before_read: bool,
}

/// Metadata backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackend {
    /// In-process map, lost on restart
    #[default]
    Memory,
    /// SQLite database under the data directory
    Sqlite,
}

/// Metadata configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetadataConfig {
    /// Backend used by the daemon
    #[serde(default)]
    pub backend: MetadataBackend,
}

/// Daemon transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Enable LZ4 compression of message bodies
    #[serde(default)]
    pub compression: bool,
}

/// Client-side configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// First descriptor number handed out by the descriptor table
    #[serde(default = "default_fd_base")]
    pub fd_base: i32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "burstfs-node".to_string())
}

fn default_bind_address() -> String {
    "0.0.0.0:7070".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/burstfs")
}

fn default_chunk_size() -> u64 {
    512 * 1024
}

fn default_pfl_components() -> Vec<ComponentConfig> {
    const MB: u64 = 1024 * 1024;
    [
        (0, 512 * 1024),
        (4 * MB, MB),
        (8 * MB, 2 * MB),
        (16 * MB, 4 * MB),
        (32 * MB, 8 * MB),
        (64 * MB, 16 * MB),
    ]
    .into_iter()
    .map(|(start, stripe_size)| ComponentConfig { start, stripe_size })
    .collect()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_request_timeout_ms() -> u64 {
    30000
}

fn default_fd_base() -> i32 {
    100_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: default_node_id(),
            bind_address: default_bind_address(),
            data_dir: default_data_dir(),
            capacity_chunks: 0,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            use_pfl: false,
            components: default_pfl_components(),
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            symlinks: true,
            rename: true,
            create_check_parents: false,
            zero_buffer_before_read: false,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            compression: false,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            fd_base: default_fd_base(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl BurstConfig {
    /// Configuration for an in-process cluster of `num_daemons` daemons
    pub fn local(num_daemons: usize, replicas: u32) -> Self {
        Self {
            node: NodeConfig::default(),
            cluster: ClusterConfig {
                daemons: (0..num_daemons).map(|i| format!("local-{}", i)).collect(),
                replicas,
            },
            layout: LayoutConfig::default(),
            features: FeatureConfig::default(),
            metadata: MetadataConfig::default(),
            transport: TransportConfig::default(),
            client: ClientConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: BurstConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration to a TOML file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.cluster.daemons.is_empty() {
            return Err(crate::Error::Config("cluster.daemons cannot be empty".into()));
        }

        if self.cluster.replicas as usize >= self.cluster.daemons.len() {
            return Err(crate::Error::Config(format!(
                "cluster.replicas ({}) must be smaller than the number of daemons ({})",
                self.cluster.replicas,
                self.cluster.daemons.len()
            )));
        }

        if !self.layout.chunk_size.is_power_of_two() {
            return Err(crate::Error::Config(format!(
                "layout.chunk_size {} is not a power of two",
                self.layout.chunk_size
            )));
        }

        if self.layout.use_pfl {
            self.validate_components()?;
        }

        if self.client.fd_base < 3 {
            return Err(crate::Error::Config("client.fd_base must be at least 3".into()));
        }

        Ok(())
    }

    fn validate_components(&self) -> crate::Result<()> {
        let components = &self.layout.components;
        let first = components
            .first()
            .ok_or_else(|| crate::Error::Config("layout.components cannot be empty".into()))?;

        if first.start != 0 {
            return Err(crate::Error::Config("first layout component must start at 0".into()));
        }

        for component in components {
            if !component.stripe_size.is_power_of_two() {
                return Err(crate::Error::Config(format!(
                    "stripe size {} at offset {} is not a power of two",
                    component.stripe_size, component.start
                )));
            }
        }

        for pair in components.windows(2) {
            if pair[1].start <= pair[0].start {
                return Err(crate::Error::Config(
                    "layout component start offsets must strictly increase".into(),
                ));
            }
            if (pair[1].start - pair[0].start) % pair[0].stripe_size != 0 {
                return Err(crate::Error::Config(format!(
                    "component at {} is not a whole number of {}-byte stripes",
                    pair[0].start, pair[0].stripe_size
                )));
            }
        }

        Ok(())
    }

    /// Number of configured daemons
    pub fn num_daemons(&self) -> usize {
        self.cluster.daemons.len()
    }

    /// Build the chunk layout described by this configuration
    pub fn chunk_layout(&self) -> ChunkLayout {
        if self.layout.use_pfl {
            let components: Vec<PflComponent> = self
                .layout
                .components
                .iter()
                .map(|c| PflComponent::new(c.start, c.stripe_size))
                .collect();
            ChunkLayout::progressive(&components)
        } else {
            ChunkLayout::flat(self.layout.chunk_size)
        }
    }

    /// Get the chunk directory path
    pub fn chunk_dir(&self) -> PathBuf {
        self.node.data_dir.join("chunks")
    }

    /// Get the metadata database path
    pub fn metadata_path(&self) -> PathBuf {
        self.node.data_dir.join("metadata.db")
    }

    /// Get connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.transport.connect_timeout_ms)
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.transport.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
            [node]
            id = "burst-1"
            bind_address = "0.0.0.0:7070"
            data_dir = "/tmp/burstfs"

            [cluster]
            daemons = ["10.0.0.1:7070", "10.0.0.2:7070", "10.0.0.3:7070"]
            replicas = 1

            [layout]
            chunk_size = 1048576

            [features]
            create_check_parents = true

            [metadata]
            backend = "sqlite"
        "#;

        let config = BurstConfig::from_str(toml).unwrap();
        assert_eq!(config.node.id, "burst-1");
        assert_eq!(config.num_daemons(), 3);
        assert_eq!(config.cluster.replicas, 1);
        assert_eq!(config.layout.chunk_size, 1048576);
        assert!(config.features.create_check_parents);
        assert!(config.features.rename);
        assert_eq!(config.metadata.backend, MetadataBackend::Sqlite);
        assert_eq!(config.client.fd_base, 100_000);
    }

    #[test]
    fn test_rejects_non_power_of_two_chunk() {
        let toml = r#"
            [cluster]
            daemons = ["a:1"]

            [layout]
            chunk_size = 1000
        "#;
        assert!(BurstConfig::from_str(toml).is_err());
    }

    #[test]
    fn test_rejects_too_many_replicas() {
        let toml = r#"
            [cluster]
            daemons = ["a:1", "b:1"]
            replicas = 2
        "#;
        assert!(BurstConfig::from_str(toml).is_err());
    }

    #[test]
    fn test_pfl_components_validated() {
        let toml = r#"
            [cluster]
            daemons = ["a:1"]

            [layout]
            use_pfl = true
            components = [
                { start = 0, stripe_size = 4096 },
                { start = 10000, stripe_size = 8192 },
            ]
        "#;
        assert!(BurstConfig::from_str(toml).is_err());

        let mut config = BurstConfig::local(2, 0);
        config.layout.use_pfl = true;
        assert!(config.validate().is_ok());
        assert!(matches!(config.chunk_layout(), ChunkLayout::Progressive(_)));
    }
}
