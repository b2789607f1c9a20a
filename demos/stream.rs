//! Walks a projected tree and streams the head of a package file the way a
//! media player would, printing the engine traffic with `RUST_LOG=debug`.

use std::path::Path;
use std::sync::Arc;

use torrentfs::{FetchMode, FsConfig, FsHandles, FsStats, MemoryEngine, MemoryPackage, TorrentFs};
use tracing_subscriber::EnvFilter;

const CHUNK: usize = 128 * 1024;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let root = tempfile::tempdir()?;
    std::fs::write(root.path().join("notes.txt"), b"plain files pass through")?;
    std::fs::write(root.path().join("demo.torrent"), b"demo descriptor")?;

    let engine = Arc::new(MemoryEngine::new(FetchMode::OnDeadline));
    engine.register(
        b"demo descriptor".to_vec(),
        MemoryPackage::new("Demo", 16 * 1024)
            .with_sparse_file("Demo/video.mkv", 50_000_000)
            .with_file("Demo/subs/en.srt", b"1\n00:00:01,000 --> 00:00:02,000\nhello\n".to_vec()),
    );

    let fs = TorrentFs::new(root.path(), engine, FsConfig::default());

    for dir in ["/", "/demo", "/demo/subs"] {
        println!("{dir}: {}", fs.list_directory(Path::new(dir))?.join("  "));
    }

    let video = Path::new("/demo/video.mkv");
    println!("video.mkv: {} bytes", fs.get_attributes(video)?.size);

    let handle = fs.open(video)?;
    let mut offset = 0;
    for _ in 0..4 {
        let chunk = fs.read(handle, CHUNK, offset)?;
        println!("read {} bytes at {offset}", chunk.len());
        offset += chunk.len() as u64;
    }
    println!("{:.3}% of video.mkv local", fs.completed_percent(video)?);
    fs.release(handle)?;

    let stats = fs.statfs(Path::new("/"))?;
    println!("backing filesystem: {} of {} bytes free", stats.available_bytes, stats.total_bytes);

    fs.shutdown();
    Ok(())
}
