//! burstctl - Command line client for BurstFS
//!
//! Usage:
//!   burstctl ls /dir              - List a directory
//!   burstctl put local /remote    - Copy a local file in
//!   burstctl get /remote local    - Copy a file out
//!   burstctl df                   - Show capacity
//!   burstctl locate /file 0 4096  - Show where chunks of a range live

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burstfs::client::Coordinator;
use burstfs::config::BurstConfig;
use burstfs::rpc::TcpTransport;

/// Transfer buffer size for put/get/cat
const COPY_BUFFER: usize = 4 * 1024 * 1024;

/// BurstFS control tool
#[derive(Parser)]
#[command(name = "burstctl")]
#[command(about = "Access and inspect a BurstFS deployment", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "burstfs.toml")]
    config: PathBuf,

    /// Print machine-readable JSON
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// List only the entries stored on this daemon, with sizes
        #[arg(long)]
        daemon: Option<usize>,
    },
    /// Show file attributes
    Stat { path: String },
    /// Print a file to stdout
    Cat { path: String },
    /// Copy a local file into BurstFS
    Put { local: PathBuf, path: String },
    /// Copy a file out of BurstFS
    Get { path: String, local: PathBuf },
    /// Remove a file
    Rm { path: String },
    /// Rename a file
    Mv { from: String, to: String },
    /// Create a directory
    Mkdir { path: String },
    /// Remove an empty directory
    Rmdir { path: String },
    /// Set the size of a file
    Truncate { path: String, size: i64 },
    /// Show capacity
    Df,
    /// Show which daemons hold the metadata and chunks of a byte range
    Locate {
        path: String,
        #[arg(default_value_t = 0)]
        offset: u64,
        #[arg(default_value_t = 0)]
        len: u64,
    },
}

#[derive(Serialize)]
struct ChunkLocation {
    chunk_id: u64,
    chunk_offset: u64,
    len: u64,
    daemons: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.as_str().into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = BurstConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let transport = Arc::new(TcpTransport::from_config(&config));
    let fs = Coordinator::with_transport(&config, transport)?;

    match cli.command {
        Commands::Ls { path, daemon } => match daemon {
            Some(daemon) => {
                let entries = fs.get_single_server_dir(&path, daemon).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                } else {
                    for entry in entries {
                        println!("{:>12}  {:?}  {}", entry.size, entry.file_type, entry.name);
                    }
                }
            }
            None => {
                let entries = fs.list_dir(&path).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                } else {
                    for entry in entries {
                        let suffix = match entry.file_type {
                            burstfs::metadata::FileType::Directory => "/",
                            burstfs::metadata::FileType::Symlink => "@",
                            burstfs::metadata::FileType::Regular => "",
                        };
                        println!("{}{}", entry.name, suffix);
                    }
                }
            }
        },

        Commands::Stat { path } => {
            let st = fs.stat(&path, true).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&st)?);
            } else {
                println!("  File: {}", path);
                println!("  Size: {:<12} Blocks: {:<8} IO Block: {}", st.size, st.blocks, st.blksize);
                println!(" Inode: {:<20} Links: {}", st.ino, st.nlink);
                println!("  Mode: {:o}  Uid: {}  Gid: {}", st.mode, st.uid, st.gid);
                println!("Access: {}", format_time(st.atime));
                println!("Modify: {}", format_time(st.mtime));
                println!("Change: {}", format_time(st.ctime));
            }
        }

        Commands::Cat { path } => {
            let fd = fs.open(&path, 0, libc::O_RDONLY).await?;
            let mut stdout = tokio::io::stdout();
            let mut buf = vec![0u8; COPY_BUFFER];
            loop {
                let n = fs.read(fd, &mut buf).await?;
                if n == 0 {
                    break;
                }
                stdout.write_all(&buf[..n]).await?;
            }
            stdout.flush().await?;
            fs.close(fd)?;
        }

        Commands::Put { local, path } => {
            let mut input = tokio::fs::File::open(&local)
                .await
                .with_context(|| format!("opening {}", local.display()))?;
            let fd = fs
                .open(&path, 0o644, libc::O_CREAT | libc::O_WRONLY | libc::O_TRUNC)
                .await?;
            let mut buf = vec![0u8; COPY_BUFFER];
            let mut total = 0u64;
            loop {
                let n = input.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                let written = fs.write(fd, &buf[..n]).await?;
                if written != n {
                    bail!("short write to {}: {} of {} bytes", path, written, n);
                }
                total += n as u64;
            }
            fs.close(fd)?;
            println!("{} bytes written to {}", total, path);
        }

        Commands::Get { path, local } => {
            let fd = fs.open(&path, 0, libc::O_RDONLY).await?;
            let mut output = tokio::fs::File::create(&local)
                .await
                .with_context(|| format!("creating {}", local.display()))?;
            let mut buf = vec![0u8; COPY_BUFFER];
            let mut total = 0u64;
            loop {
                let n = fs.read(fd, &mut buf).await?;
                if n == 0 {
                    break;
                }
                output.write_all(&buf[..n]).await?;
                total += n as u64;
            }
            output.flush().await?;
            fs.close(fd)?;
            println!("{} bytes read from {}", total, path);
        }

        Commands::Rm { path } => fs.remove(&path).await?,
        Commands::Mv { from, to } => fs.rename(&from, &to).await?,
        Commands::Mkdir { path } => fs.mkdir(&path, 0o755).await?,
        Commands::Rmdir { path } => fs.rmdir(&path).await?,
        Commands::Truncate { path, size } => fs.truncate(&path, size).await?,

        Commands::Df => {
            let st = fs.statfs().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&st)?);
            } else {
                let used = st.blocks.saturating_sub(st.bfree);
                println!("{:>14} {:>14} {:>14} {:>10}", "Chunks", "Used", "Free", "ChunkSize");
                println!("{:>14} {:>14} {:>14} {:>10}", st.blocks, used, st.bfree, st.bsize);
            }
        }

        Commands::Locate { path, offset, len } => {
            let forwarder = fs.context().forwarder();
            let placement = forwarder.placement();
            let replicas = forwarder.replicas();
            let name = |id: usize| config.cluster.daemons.get(id).cloned().unwrap_or_default();

            let metadata: Vec<String> = (0..=replicas)
                .map(|copy| name(placement.locate_metadata(&path, copy)))
                .collect();
            let chunks: Vec<ChunkLocation> = forwarder
                .layout()
                .chunk_spans(offset, len)
                .map(|span| ChunkLocation {
                    chunk_id: span.chunk_id,
                    chunk_offset: span.chunk_offset,
                    len: span.len,
                    daemons: (0..=replicas)
                        .map(|copy| name(placement.locate_data(&path, span.chunk_id, copy)))
                        .collect(),
                })
                .collect();

            if cli.json {
                let report = serde_json::json!({ "metadata": metadata, "chunks": chunks });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("metadata: {}", metadata.join(", "));
                for chunk in chunks {
                    println!(
                        "chunk {:>8}  +{:<10} {:>10} bytes  {}",
                        chunk.chunk_id,
                        chunk.chunk_offset,
                        chunk.len,
                        chunk.daemons.join(", ")
                    );
                }
            }
        }
    }

    Ok(())
}

fn format_time(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
