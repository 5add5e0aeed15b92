//! Shard archive transfer.
//!
//! A shard archive is a single compressed stream. It is decompressed on the
//! fly and the raw shard bytes are streamed to the server.

use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::progress::format_bytes;
use super::progress_stream::{ProgressCallback, ProgressStream};
use crate::client::{ByteStream, RestoreService};
use crate::manifest::ManifestEntry;
use crate::utils::{RestoreError, Result};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];

/// Compression of a shard archive, detected from its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveCodec {
    Gzip,
    Zstd,
}

impl ArchiveCodec {
    pub fn detect(header: &[u8]) -> Option<Self> {
        if header.starts_with(GZIP_MAGIC) {
            Some(ArchiveCodec::Gzip)
        } else if header.starts_with(ZSTD_MAGIC) {
            Some(ArchiveCodec::Zstd)
        } else {
            None
        }
    }
}

/// Open an uncompressed file, such as the metadata snapshot, as a stream.
pub async fn open_file(path: &Path) -> Result<ByteStream> {
    let file = tokio::fs::File::open(path).await?;
    Ok(Box::pin(ReaderStream::new(file)))
}

/// Open a shard archive as a stream of decompressed bytes.
pub async fn open_archive(path: &Path) -> Result<ByteStream> {
    let file = tokio::fs::File::open(path).await?;
    let mut reader = BufReader::new(file);

    let codec = ArchiveCodec::detect(reader.fill_buf().await?)
        .ok_or_else(|| RestoreError::UnsupportedArchive(path.to_path_buf()))?;
    debug!(path = %path.display(), ?codec, "Opened shard archive");

    // Concatenated members are one archive; anything after the last member
    // that is not another member is a decode error.
    let stream: ByteStream = match codec {
        ArchiveCodec::Gzip => {
            let mut decoder = GzipDecoder::new(reader);
            decoder.multiple_members(true);
            Box::pin(ReaderStream::new(decoder))
        }
        ArchiveCodec::Zstd => {
            let mut decoder = ZstdDecoder::new(reader);
            decoder.multiple_members(true);
            Box::pin(ReaderStream::new(decoder))
        }
    };
    Ok(stream)
}

/// Send one shard archive from `dir` to the server as `shard_id`.
///
/// Returns the number of decompressed bytes sent.
pub async fn restore_shard<R>(
    service: &R,
    dir: &Path,
    shard_id: u64,
    entry: &ManifestEntry,
) -> Result<u64>
where
    R: RestoreService + ?Sized,
{
    info!(
        shard_id,
        backup_shard_id = entry.shard_id,
        file = %entry.file_name,
        "Restoring shard live from backup"
    );

    let archive = open_archive(&dir.join(&entry.file_name)).await?;

    let counter = Arc::new(AtomicU64::new(0));
    let callback: ProgressCallback = Arc::new(move |bytes| {
        debug!(shard_id, sent = %format_bytes(bytes), "Shard transfer progress");
    });
    let body: ByteStream = Box::pin(ProgressStream::new(archive, Arc::clone(&counter), callback));

    service.restore_shard(shard_id, body).await?;

    let sent = counter.load(Ordering::Relaxed);
    info!(shard_id, size = %format_bytes(sent), "Shard restored");
    Ok(sent)
}
