//! End-to-end tests against multi-daemon clusters

use std::path::Path;
use std::sync::Arc;

use burstfs::client::Coordinator;
use burstfs::config::{BurstConfig, ComponentConfig};
use burstfs::daemon::{ChunkStorage, Daemon, DaemonServer};
use burstfs::error::{Error, ErrorKind};
use burstfs::metadata::{MemoryStore, MetadataStore, SqliteStore, S_IFREG};
use burstfs::rpc::{LocalTransport, TcpTransport};
use tempfile::tempdir;

const RDWR_CREATE: i32 = libc::O_CREAT | libc::O_RDWR;

fn cluster_with(dir: &Path, config: BurstConfig, chunk_size: u64) -> (Arc<LocalTransport>, Coordinator) {
    let transport = Arc::new(LocalTransport::spawn(dir, config.num_daemons(), chunk_size).unwrap());
    let fs = Coordinator::with_transport(&config, transport.clone()).unwrap();
    (transport, fs)
}

fn cluster(dir: &Path, daemons: usize, replicas: u32) -> (Arc<LocalTransport>, Coordinator) {
    let mut config = BurstConfig::local(daemons, replicas);
    config.layout.chunk_size = 16;
    cluster_with(dir, config, 16)
}

async fn write_file(fs: &Coordinator, path: &str, data: &[u8]) {
    let fd = fs.open(path, S_IFREG | 0o644, RDWR_CREATE).await.unwrap();
    assert_eq!(fs.pwrite(fd, data, 0).await.unwrap(), data.len());
    fs.close(fd).unwrap();
}

async fn read_file(fs: &Coordinator, path: &str, len: usize) -> Vec<u8> {
    let fd = fs.open(path, 0, libc::O_RDONLY).await.unwrap();
    let mut buf = vec![0xEEu8; len];
    let n = fs.pread(fd, &mut buf, 0).await.unwrap();
    fs.close(fd).unwrap();
    buf.truncate(n);
    buf
}

#[tokio::test]
async fn test_write_read_rename() {
    let dir = tempdir().unwrap();
    let (_transport, fs) = cluster(dir.path(), 4, 0);

    fs.create("/a", S_IFREG | 0o644).await.unwrap();
    let fd = fs.open("/a", 0, libc::O_RDWR).await.unwrap();
    assert_eq!(fs.pwrite(fd, b"hi", 0).await.unwrap(), 2);

    let mut buf = [0u8; 2];
    assert_eq!(fs.pread(fd, &mut buf, 0).await.unwrap(), 2);
    assert_eq!(&buf, b"hi");
    assert_eq!(fs.stat("/a", true).await.unwrap().size, 2);
    fs.close(fd).unwrap();

    fs.rename("/a", "/b").await.unwrap();
    assert!(matches!(fs.open("/a", 0, libc::O_RDONLY).await, Err(Error::NotFound(_))));
    assert_eq!(read_file(&fs, "/b", 16).await, b"hi");
    assert_eq!(fs.stat("/b", true).await.unwrap().size, 2);

    let names: Vec<String> = fs.list_dir("/").await.unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["b".to_string()]);
}

#[tokio::test]
async fn test_rename_chain_and_writes_through_it() {
    let dir = tempdir().unwrap();
    let (_transport, fs) = cluster(dir.path(), 3, 0);

    write_file(&fs, "/x", b"0123456789").await;
    fs.rename("/x", "/y").await.unwrap();
    fs.rename("/y", "/z").await.unwrap();

    let fd = fs.open("/z", 0, libc::O_WRONLY | libc::O_APPEND).await.unwrap();
    assert_eq!(fs.write(fd, b"ab").await.unwrap(), 2);
    fs.close(fd).unwrap();

    assert_eq!(read_file(&fs, "/z", 64).await, b"0123456789ab");
    assert_eq!(fs.stat("/z", true).await.unwrap().size, 12);
    assert!(matches!(fs.stat("/y", true).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_rename_onto_existing_file_fails() {
    let dir = tempdir().unwrap();
    let (_transport, fs) = cluster(dir.path(), 2, 0);
    write_file(&fs, "/one", b"1").await;
    write_file(&fs, "/two", b"2").await;

    assert!(matches!(fs.rename("/one", "/two").await, Err(Error::AlreadyExists(_))));
    fs.mkdir("/dir", 0o755).await.unwrap();
    assert!(matches!(fs.rename("/dir", "/dir2").await, Err(Error::NotSupported(_))));
}

#[tokio::test]
async fn test_rename_back_collapses() {
    let dir = tempdir().unwrap();
    let (_transport, fs) = cluster(dir.path(), 3, 0);

    write_file(&fs, "/a", b"payload").await;
    fs.rename("/a", "/b").await.unwrap();
    fs.rename("/b", "/a").await.unwrap();

    assert_eq!(read_file(&fs, "/a", 32).await, b"payload");
    assert!(matches!(fs.stat("/b", true).await, Err(Error::NotFound(_))));

    let names: Vec<String> = fs.list_dir("/").await.unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["a".to_string()]);

    // The revived entry behaves like a never-renamed file
    fs.rename("/a", "/c").await.unwrap();
    assert_eq!(read_file(&fs, "/c", 32).await, b"payload");
}

#[tokio::test]
async fn test_remove_renamed_file_drops_data() {
    let dir = tempdir().unwrap();
    let (_transport, fs) = cluster(dir.path(), 3, 0);

    write_file(&fs, "/old", &[7u8; 50]).await;
    fs.rename("/old", "/new").await.unwrap();
    fs.remove("/new").await.unwrap();

    assert!(matches!(fs.stat("/new", true).await, Err(Error::NotFound(_))));
    assert!(matches!(fs.stat("/old", true).await, Err(Error::NotFound(_))));

    // The original name is free again and holds no stale chunks
    fs.create("/old", S_IFREG | 0o644).await.unwrap();
    assert!(read_file(&fs, "/old", 50).await.is_empty());
}

#[tokio::test]
async fn test_truncate_shrink_then_grow() {
    let dir = tempdir().unwrap();
    let (_transport, fs) = cluster(dir.path(), 4, 0);
    let data: Vec<u8> = (1..=100u8).collect();
    write_file(&fs, "/t", &data).await;

    fs.truncate("/t", 40).await.unwrap();
    assert_eq!(fs.stat("/t", true).await.unwrap().size, 40);
    assert_eq!(read_file(&fs, "/t", 100).await, &data[..40]);

    fs.truncate("/t", 100).await.unwrap();
    assert_eq!(fs.stat("/t", true).await.unwrap().size, 100);
    let grown = read_file(&fs, "/t", 100).await;
    assert_eq!(grown.len(), 100);
    assert_eq!(&grown[..40], &data[..40]);
    assert!(grown[40..].iter().all(|&b| b == 0));

    assert!(matches!(fs.truncate("/t", -1).await, Err(Error::InvalidArgument(_))));
}

#[tokio::test]
async fn test_open_with_o_trunc() {
    let dir = tempdir().unwrap();
    let (_transport, fs) = cluster(dir.path(), 2, 0);
    write_file(&fs, "/f", b"some old content").await;

    let fd = fs.open("/f", 0, libc::O_WRONLY | libc::O_TRUNC).await.unwrap();
    fs.close(fd).unwrap();
    assert_eq!(fs.stat("/f", true).await.unwrap().size, 0);
    assert!(read_file(&fs, "/f", 32).await.is_empty());
}

#[tokio::test]
async fn test_open_flags() {
    let dir = tempdir().unwrap();
    let (_transport, fs) = cluster(dir.path(), 2, 0);
    write_file(&fs, "/f", b"x").await;

    assert!(matches!(fs.open("/f", 0, libc::O_PATH).await, Err(Error::NotSupported(_))));
    assert!(matches!(
        fs.open("/f", 0o644, libc::O_CREAT | libc::O_EXCL | libc::O_WRONLY).await,
        Err(Error::AlreadyExists(_))
    ));
    // Without O_EXCL the existing file is opened
    let fd = fs.open("/f", 0o644, libc::O_CREAT | libc::O_RDONLY).await.unwrap();
    fs.close(fd).unwrap();

    assert!(matches!(
        fs.create("/fifo", libc::S_IFIFO as u32 | 0o644).await,
        Err(Error::NotSupported(_))
    ));
    assert!(matches!(fs.open("/f", 0, libc::O_DIRECTORY).await, Err(Error::NotADirectory(_))));
}

#[tokio::test]
async fn test_open_create_always_makes_regular_file() {
    let dir = tempdir().unwrap();
    let (_transport, fs) = cluster(dir.path(), 2, 0);

    let mode = libc::S_IFDIR as u32 | 0o755;
    let fd = fs.open("/not-a-dir", mode, libc::O_CREAT | libc::O_RDWR).await.unwrap();
    assert_eq!(fs.pwrite(fd, b"data", 0).await.unwrap(), 4);
    fs.close(fd).unwrap();

    let st = fs.stat("/not-a-dir", true).await.unwrap();
    assert_eq!(st.mode & libc::S_IFMT as u32, libc::S_IFREG as u32);
    assert_eq!(st.mode & 0o777, 0o755);
    assert!(matches!(fs.opendir("/not-a-dir").await, Err(Error::NotADirectory(_))));
}

#[tokio::test]
async fn test_lseek() {
    let dir = tempdir().unwrap();
    let (_transport, fs) = cluster(dir.path(), 2, 0);
    write_file(&fs, "/s", &[1u8; 30]).await;

    let fd = fs.open("/s", 0, libc::O_RDWR).await.unwrap();
    assert_eq!(fs.lseek(fd, 10, libc::SEEK_SET).await.unwrap(), 10);
    assert_eq!(fs.lseek(fd, 5, libc::SEEK_CUR).await.unwrap(), 15);
    assert_eq!(fs.lseek(fd, -5, libc::SEEK_END).await.unwrap(), 25);
    assert!(matches!(fs.lseek(fd, -1, libc::SEEK_SET).await, Err(Error::InvalidArgument(_))));
    assert!(matches!(fs.lseek(fd, -31, libc::SEEK_END).await, Err(Error::InvalidArgument(_))));
    assert!(matches!(fs.lseek(fd, 0, libc::SEEK_DATA).await, Err(Error::InvalidArgument(_))));

    let mut buf = [0u8; 10];
    assert_eq!(fs.read(fd, &mut buf).await.unwrap(), 5);
    assert_eq!(fs.lseek(fd, 0, libc::SEEK_CUR).await.unwrap(), 30);

    let copy = fs.dup(fd).unwrap();
    fs.lseek(copy, 3, libc::SEEK_SET).await.unwrap();
    assert_eq!(fs.lseek(fd, 0, libc::SEEK_CUR).await.unwrap(), 3);
    fs.close(fd).unwrap();
    fs.close(copy).unwrap();
    assert!(matches!(fs.close(copy), Err(Error::BadDescriptor(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_get_distinct_ranges() {
    let dir = tempdir().unwrap();
    let (_transport, fs) = cluster(dir.path(), 4, 0);
    fs.create("/log", S_IFREG | 0o644).await.unwrap();

    let writers = 8u8;
    let rounds = 5;
    let mut tasks = Vec::new();
    for id in 0..writers {
        let fs = fs.clone();
        tasks.push(tokio::spawn(async move {
            let fd = fs.open("/log", 0, libc::O_WRONLY | libc::O_APPEND).await.unwrap();
            for _ in 0..rounds {
                assert_eq!(fs.write(fd, &[id; 10]).await.unwrap(), 10);
            }
            fs.close(fd).unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let total = writers as usize * rounds * 10;
    assert_eq!(fs.stat("/log", true).await.unwrap().size, total as u64);

    let data = read_file(&fs, "/log", total).await;
    assert_eq!(data.len(), total);
    let mut counts = vec![0; writers as usize];
    for record in data.chunks(10) {
        assert!(record.iter().all(|&b| b == record[0]), "interleaved record {:?}", record);
        counts[record[0] as usize] += 1;
    }
    assert!(counts.iter().all(|&c| c == rounds));
}

#[tokio::test]
async fn test_replicas_survive_offline_daemon() {
    let dir = tempdir().unwrap();
    let (transport, fs) = cluster(dir.path(), 3, 1);
    let data: Vec<u8> = (0..64u8).collect();
    write_file(&fs, "/r", &data).await;

    for down in 0..3 {
        transport.set_offline(down, true);
        assert_eq!(read_file(&fs, "/r", 64).await, data, "daemon {} offline", down);
        assert_eq!(fs.stat("/r", true).await.unwrap().size, 64);
        transport.set_offline(down, false);
    }
}

#[tokio::test]
async fn test_replica_write_covers_failed_primary() {
    let dir = tempdir().unwrap();
    let (transport, fs) = cluster(dir.path(), 3, 1);
    fs.create("/w", S_IFREG | 0o644).await.unwrap();

    let primary = fs.context().forwarder().placement().locate_data("/w", 0, 0);
    transport.set_offline(primary, true);

    let fd = fs.open("/w", 0, libc::O_RDWR).await.unwrap();
    assert_eq!(fs.pwrite(fd, b"replicated", 0).await.unwrap(), 10);

    let mut buf = [0u8; 10];
    assert_eq!(fs.pread(fd, &mut buf, 0).await.unwrap(), 10);
    assert_eq!(&buf, b"replicated");
    fs.close(fd).unwrap();
}

#[tokio::test]
async fn test_read_fails_when_every_copy_is_down() {
    let dir = tempdir().unwrap();
    let (transport, fs) = cluster(dir.path(), 2, 0);
    write_file(&fs, "/gone", b"abc").await;

    let fd = fs.open("/gone", 0, libc::O_RDONLY).await.unwrap();
    let target = fs.context().forwarder().placement().locate_data("/gone", 0, 0);
    transport.set_offline(target, true);

    let mut buf = [0u8; 3];
    let err = fs.pread(fd, &mut buf, 0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[tokio::test]
async fn test_remove_reports_unreachable_metadata_copy() {
    let dir = tempdir().unwrap();
    let (transport, fs) = cluster(dir.path(), 3, 1);
    write_file(&fs, "/r", b"0123456789").await;

    let replica = fs.context().forwarder().placement().locate_metadata("/r", 1);
    transport.set_offline(replica, true);
    let err = fs.remove("/r").await.unwrap_err();
    assert!(err.is_retryable());
    transport.set_offline(replica, false);
}

#[tokio::test]
async fn test_truncate_fails_when_size_copy_is_down() {
    let dir = tempdir().unwrap();
    let (transport, fs) = cluster(dir.path(), 3, 1);
    write_file(&fs, "/t", b"0123456789").await;

    let primary = fs.context().forwarder().placement().locate_metadata("/t", 0);
    transport.set_offline(primary, true);
    assert!(fs.truncate("/t", 4).await.is_err());
    transport.set_offline(primary, false);

    // No data was dropped, so the size readers see still matches the bytes
    assert_eq!(fs.stat("/t", true).await.unwrap().size, 10);
    assert_eq!(read_file(&fs, "/t", 16).await, b"0123456789");
}

#[tokio::test]
async fn test_vectored_io() {
    let dir = tempdir().unwrap();
    let (_transport, fs) = cluster(dir.path(), 3, 0);
    let fd = fs.open("/v", 0o644, RDWR_CREATE).await.unwrap();

    let parts: [&[u8]; 3] = [b"hello ", b"", b"vectored world"];
    assert_eq!(fs.writev(fd, &parts).await.unwrap(), 20);
    assert_eq!(fs.pwritev(fd, &[&b"HELLO"[..]], 0).await.unwrap(), 5);

    let mut first = [0u8; 6];
    let mut second = [0u8; 32];
    let n = {
        let mut iov: [&mut [u8]; 2] = [&mut first, &mut second];
        fs.preadv(fd, &mut iov, 0).await.unwrap()
    };
    assert_eq!(n, 20);
    assert_eq!(&first, b"HELLO ");
    assert_eq!(&second[..14], b"vectored world");
    fs.close(fd).unwrap();
}

fn parse_dirent64(buf: &[u8]) -> Vec<(String, u8, i64)> {
    let mut records = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        let off = i64::from_ne_bytes(buf[pos + 8..pos + 16].try_into().unwrap());
        let reclen = u16::from_ne_bytes(buf[pos + 16..pos + 18].try_into().unwrap()) as usize;
        let d_type = buf[pos + 18];
        let name_bytes = &buf[pos + 19..pos + reclen];
        let end = name_bytes.iter().position(|&b| b == 0).unwrap();
        records.push((String::from_utf8(name_bytes[..end].to_vec()).unwrap(), d_type, off));
        pos += reclen;
    }
    records
}

#[tokio::test]
async fn test_getdents64_pages_through_snapshot() {
    let dir = tempdir().unwrap();
    let (_transport, fs) = cluster(dir.path(), 3, 0);
    fs.mkdir("/d", 0o755).await.unwrap();
    write_file(&fs, "/d/f1", b"1").await;
    write_file(&fs, "/d/file-two", b"2").await;
    fs.mkdir("/d/sub", 0o755).await.unwrap();
    write_file(&fs, "/d/sub/deep", b"3").await;

    let fd = fs.opendir("/d").await.unwrap();
    let mut small = [0u8; 16];
    assert!(matches!(fs.getdents64(fd, &mut small), Err(Error::InvalidArgument(_))));

    let mut buf = [0u8; 64];
    let mut seen = Vec::new();
    loop {
        let n = fs.getdents64(fd, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        seen.extend(parse_dirent64(&buf[..n]));
    }

    let names: Vec<&str> = seen.iter().map(|(name, _, _)| name.as_str()).collect();
    assert_eq!(names, vec![".", "..", "f1", "file-two", "sub"]);
    assert_eq!(seen[4].1, libc::DT_DIR);
    assert_eq!(seen[2].1, libc::DT_REG);
    let offsets: Vec<i64> = seen.iter().map(|(_, _, off)| *off).collect();
    assert_eq!(offsets, vec![1, 2, 3, 4, 5]);

    assert_eq!(fs.getdents64(fd, &mut buf).unwrap(), 0);
    fs.close(fd).unwrap();
}

#[tokio::test]
async fn test_directory_errors() {
    let dir = tempdir().unwrap();
    let (_transport, fs) = cluster(dir.path(), 2, 0);
    fs.mkdir("/d", 0o755).await.unwrap();
    write_file(&fs, "/d/f", b"x").await;

    assert!(matches!(fs.remove("/d").await, Err(Error::IsADirectory(_))));
    assert!(matches!(fs.rmdir("/d").await, Err(Error::NotEmpty(_))));
    assert!(matches!(fs.rmdir("/d/f").await, Err(Error::NotADirectory(_))));

    let fd = fs.open("/d", 0, libc::O_RDONLY).await.unwrap();
    let mut buf = [0u8; 4];
    assert!(matches!(fs.read(fd, &mut buf).await, Err(Error::IsADirectory(_))));
    fs.close(fd).unwrap();

    fs.remove("/d/f").await.unwrap();
    fs.rmdir("/d").await.unwrap();
    assert!(matches!(fs.access("/d", true).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_parent_checks() {
    let dir = tempdir().unwrap();
    let mut config = BurstConfig::local(2, 0);
    config.features.create_check_parents = true;
    let (_transport, fs) = cluster_with(dir.path(), config, 512 * 1024);

    assert!(matches!(fs.create("/missing/f", S_IFREG | 0o644).await, Err(Error::NotFound(_))));
    write_file(&fs, "/plain", b"x").await;
    assert!(matches!(fs.create("/plain/f", S_IFREG | 0o644).await, Err(Error::NotADirectory(_))));
    fs.mkdir("/ok", 0o755).await.unwrap();
    fs.create("/ok/f", S_IFREG | 0o644).await.unwrap();
}

#[tokio::test]
async fn test_symlinks() {
    let dir = tempdir().unwrap();
    let (_transport, fs) = cluster(dir.path(), 2, 0);
    write_file(&fs, "/target", b"linked").await;
    fs.mk_symlink("/link", "/target").await.unwrap();

    assert_eq!(read_file(&fs, "/link", 16).await, b"linked");
    assert_eq!(fs.readlink("/link", 64).await.unwrap(), "/target");
    assert!(matches!(fs.open("/link", 0, libc::O_RDONLY | libc::O_NOFOLLOW).await, Err(Error::SymlinkLoop(_))));

    let st = fs.stat("/link", false).await.unwrap();
    assert_eq!(st.mode & libc::S_IFMT as u32, libc::S_IFLNK as u32);

    fs.remove("/link").await.unwrap();
    assert_eq!(read_file(&fs, "/target", 16).await, b"linked");
}

#[tokio::test]
async fn test_statx_and_statfs() {
    let dir = tempdir().unwrap();
    let (_transport, fs) = cluster(dir.path(), 3, 0);
    write_file(&fs, "/s", &[0u8; 33]).await;

    let stx = fs.statx("/s", true).await.unwrap();
    assert_eq!(stx.mask, 0);
    assert_eq!(stx.attributes_mask, 0);
    assert_eq!(stx.size, 33);
    assert_eq!(stx.btime, stx.atime);

    let st = fs.statfs().await.unwrap();
    assert_eq!(st.bsize, 16);
    assert!(st.blocks >= st.bfree);
}

#[tokio::test]
async fn test_single_server_listing() {
    let dir = tempdir().unwrap();
    let (_transport, fs) = cluster(dir.path(), 3, 0);
    for i in 0..12 {
        write_file(&fs, &format!("/f{}", i), b"abc").await;
    }

    let mut total = 0;
    for daemon in 0..3 {
        let entries = fs.get_single_server_dir("/", daemon).await.unwrap();
        assert!(entries.iter().all(|e| e.size == 3));
        total += entries.len();
    }
    assert_eq!(total, 12);
    assert!(matches!(fs.get_single_server_dir("/", 3).await, Err(Error::InvalidArgument(_))));
}

#[tokio::test]
async fn test_progressive_layout_round_trip() {
    let dir = tempdir().unwrap();
    let mut config = BurstConfig::local(3, 0);
    config.layout.use_pfl = true;
    config.layout.components = vec![
        ComponentConfig { start: 0, stripe_size: 16 },
        ComponentConfig { start: 64, stripe_size: 32 },
        ComponentConfig { start: 128, stripe_size: 64 },
    ];
    config.validate().unwrap();
    let (_transport, fs) = cluster_with(dir.path(), config, 16);

    let data: Vec<u8> = (0..=255u8).cycle().take(300).collect();
    let fd = fs.open("/pfl", 0o644, RDWR_CREATE).await.unwrap();
    assert_eq!(fs.pwrite(fd, &data[10..], 10).await.unwrap(), 290);
    assert_eq!(fs.pwrite(fd, &data[..10], 0).await.unwrap(), 10);

    let mut buf = vec![0u8; 300];
    assert_eq!(fs.pread(fd, &mut buf, 0).await.unwrap(), 300);
    assert_eq!(buf, data);

    fs.close(fd).unwrap();
    fs.truncate("/pfl", 100).await.unwrap();
    assert_eq!(read_file(&fs, "/pfl", 300).await, &data[..100]);
}

async fn spawn_daemon(dir: &Path, id: usize, store: Arc<dyn MetadataStore>) -> (Arc<DaemonServer>, String) {
    let chunks = ChunkStorage::new(dir.join(format!("chunks-{}", id)), 16, 0).unwrap();
    let daemon = Arc::new(Daemon::new(format!("tcp-{}", id), store, chunks).unwrap());
    let server = Arc::new(DaemonServer::new("127.0.0.1:0".into(), daemon, true));
    let listener = server.bind().await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let serving = Arc::clone(&server);
    tokio::spawn(async move { serving.serve(listener).await });
    (server, address)
}

#[tokio::test]
async fn test_tcp_cluster_end_to_end() {
    let dir = tempdir().unwrap();
    let sqlite = Arc::new(SqliteStore::open(&dir.path().join("meta.db")).unwrap());
    let (first, a) = spawn_daemon(dir.path(), 0, Arc::new(MemoryStore::new())).await;
    let (second, b) = spawn_daemon(dir.path(), 1, sqlite).await;

    let mut config = BurstConfig::local(2, 1);
    config.cluster.daemons = vec![a, b];
    config.layout.chunk_size = 16;
    config.transport.compression = true;
    let fs = Coordinator::with_transport(&config, Arc::new(TcpTransport::from_config(&config))).unwrap();

    let data: Vec<u8> = b"burst buffer ".iter().copied().cycle().take(10_000).collect();
    write_file(&fs, "/net", &data).await;
    assert_eq!(read_file(&fs, "/net", 10_000).await, data);

    fs.rename("/net", "/moved").await.unwrap();
    assert_eq!(fs.stat("/moved", true).await.unwrap().size, 10_000);
    let st = fs.statfs().await.unwrap();
    assert_eq!(st.bsize, 16);

    first.stop();
    second.stop();
}
