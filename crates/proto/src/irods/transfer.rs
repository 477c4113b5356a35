//! Chunked multi-connection upload and download.
//!
//! A transfer negotiates a portal on one control connection, opens a fresh
//! TCP connection per chunk against the server-advertised endpoints, streams
//! the chunk bytes prefixed by the endpoint cookie, and completes the
//! operation back on the control connection. Chunks may finish in any
//! order; each one writes its assigned byte range, so the final layout is
//! deterministic. One shared cancel token aborts every sibling worker on the
//! first failure.

use crate::irods::cancel::CancelToken;
use crate::irods::common::{DATA_SIZE_KW, GET_OPR, PUT_OPR};
use crate::irods::connection::Connection;
use crate::irods::messages::data_object::{DataObjRequest, OpenMode, OperationComplete};
use crate::irods::messages::portal::{PortalEndpoint, PortalReply};
use crate::irods::messages::EmptyResponse;
use crate::irods::ops::data_object;
use rods_platform::{RodsError, RodsResult};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Buffer size for streaming file and socket I/O.
const STREAM_BUF_SIZE: usize = 256 * 1024;

/// Invoked with (bytes done, bytes total) as chunks progress. May be called
/// from any worker; the library serializes invocations.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Transfer tuning knobs.
#[derive(Clone)]
pub struct TransferOptions {
    /// Desired stream count; below 2 every transfer is single-stream.
    pub num_streams: usize,
    /// Objects smaller than this go single-stream regardless.
    pub parallel_threshold: u64,
    /// Optional progress callback.
    pub progress: Option<ProgressCallback>,
    /// Shared cancellation signal.
    pub cancel: CancelToken,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            num_streams: 4,
            parallel_threshold: 32 * 1024 * 1024,
            progress: None,
            cancel: CancelToken::new(),
        }
    }
}

impl std::fmt::Debug for TransferOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferOptions")
            .field("num_streams", &self.num_streams)
            .field("parallel_threshold", &self.parallel_threshold)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl TransferOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the desired stream count.
    pub fn with_streams(mut self, streams: usize) -> Self {
        self.num_streams = streams;
        self
    }

    /// Sets the parallel threshold in bytes.
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Sets the progress callback.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Shares an external cancel token with the transfer.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// One chunk of a negotiated transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Byte offset within the object and the local file.
    pub offset: u64,
    /// Chunk length in bytes.
    pub length: u64,
    /// Data connection endpoint for this chunk.
    pub endpoint: PortalEndpoint,
}

/// The negotiated transfer layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    /// Portal descriptor on the control connection.
    pub descriptor: i32,
    /// Chunks covering the whole object, offsets ascending.
    pub chunks: Vec<ChunkPlan>,
}

/// Splits `size` bytes across the granted stream count, pairing each chunk
/// with an advertised endpoint. Servers that advertise fewer endpoints than
/// streams serve several chunks per endpoint.
pub fn build_plan(size: u64, reply: &PortalReply) -> RodsResult<TransferPlan> {
    if reply.num_threads < 1 {
        return Err(RodsError::Malformed(format!(
            "portal granted {} streams",
            reply.num_threads
        )));
    }
    let streams = reply.num_threads as u64;
    let base = size / streams;
    let remainder = size % streams;

    let mut chunks = Vec::with_capacity(streams as usize);
    let mut offset = 0u64;
    for index in 0..streams {
        let length = base + u64::from(index < remainder);
        if length == 0 {
            continue;
        }
        chunks.push(ChunkPlan {
            offset,
            length,
            endpoint: reply.endpoints[index as usize % reply.endpoints.len()].clone(),
        });
        offset += length;
    }
    Ok(TransferPlan {
        descriptor: reply.descriptor,
        chunks,
    })
}

struct ProgressReporter {
    total: u64,
    done: AtomicU64,
    callback: Option<ProgressCallback>,
    // Serializes callback invocations across workers.
    gate: Mutex<()>,
}

impl ProgressReporter {
    fn new(total: u64, callback: Option<ProgressCallback>) -> Arc<Self> {
        Arc::new(Self {
            total,
            done: AtomicU64::new(0),
            callback,
            gate: Mutex::new(()),
        })
    }

    fn report(&self, bytes: u64) {
        let done = self.done.fetch_add(bytes, Ordering::SeqCst) + bytes;
        if let Some(callback) = &self.callback {
            let _serialized = self.gate.lock().unwrap_or_else(|e| e.into_inner());
            callback(done, self.total);
        }
    }
}

/// Uploads a local file to `remote`, going parallel when the object size,
/// the stream count, and the server version all allow it.
pub async fn upload(
    conn: &Connection,
    local: &Path,
    remote: &str,
    options: &TransferOptions,
) -> RodsResult<()> {
    let size = tokio::fs::metadata(local)
        .await
        .map_err(RodsError::from)?
        .len();

    if use_parallel(conn, size, options).await {
        upload_parallel(conn, local, remote, size, options).await
    } else {
        upload_single(conn, local, remote, size, options).await
    }
}

/// Downloads `remote` into a local file; parallel under the same conditions
/// as [`upload`].
pub async fn download(
    conn: &Connection,
    remote: &str,
    local: &Path,
    options: &TransferOptions,
) -> RodsResult<()> {
    let size = data_object::stat(conn, remote).await?.size as u64;

    if use_parallel(conn, size, options).await {
        download_parallel(conn, remote, local, size, options).await
    } else {
        download_single(conn, remote, local, size, options).await
    }
}

async fn use_parallel(conn: &Connection, size: u64, options: &TransferOptions) -> bool {
    options.num_streams >= 2
        && size >= options.parallel_threshold
        && conn
            .server_version()
            .await
            .is_some_and(|v| v.supports_parallel_transfer())
}

async fn upload_single(
    conn: &Connection,
    local: &Path,
    remote: &str,
    size: u64,
    options: &TransferOptions,
) -> RodsResult<()> {
    debug!(remote, size, "single-stream upload");
    let progress = ProgressReporter::new(size, options.progress.clone());
    let mut file = File::open(local).await.map_err(RodsError::from)?;
    let handle = data_object::create(conn, remote, None, true).await?;

    let mut buf = vec![0u8; STREAM_BUF_SIZE];
    loop {
        if options.cancel.is_cancelled() {
            handle.close().await.ok();
            return Err(RodsError::Cancelled);
        }
        let n = file.read(&mut buf).await.map_err(RodsError::from)?;
        if n == 0 {
            break;
        }
        handle.write(&buf[..n]).await?;
        progress.report(n as u64);
    }
    handle.close().await
}

async fn download_single(
    conn: &Connection,
    remote: &str,
    local: &Path,
    size: u64,
    options: &TransferOptions,
) -> RodsResult<()> {
    debug!(remote, size, "single-stream download");
    let progress = ProgressReporter::new(size, options.progress.clone());
    let mut file = File::create(local).await.map_err(RodsError::from)?;
    let handle = data_object::open(conn, remote, OpenMode::Read).await?;

    loop {
        if options.cancel.is_cancelled() {
            handle.close().await.ok();
            return Err(RodsError::Cancelled);
        }
        let data = handle.read(STREAM_BUF_SIZE).await?;
        if data.is_empty() {
            break;
        }
        file.write_all(&data).await.map_err(RodsError::from)?;
        progress.report(data.len() as u64);
    }
    file.flush().await.map_err(RodsError::from)?;
    handle.close().await
}

async fn upload_parallel(
    conn: &Connection,
    local: &Path,
    remote: &str,
    size: u64,
    options: &TransferOptions,
) -> RodsResult<()> {
    let mut request = DataObjRequest::put(remote, size as i64, options.num_streams as i32, PUT_OPR);
    request.kvp.set(DATA_SIZE_KW, &size.to_string());
    let reply: PortalReply = conn.request(&request).await?;
    let plan = build_plan(size, &reply)?;
    info!(remote, size, streams = plan.chunks.len(), "parallel upload");

    let outcome = run_workers(Direction::Upload, local.to_path_buf(), &plan, size, options).await;
    finish_portal(conn, plan.descriptor, outcome).await
}

async fn download_parallel(
    conn: &Connection,
    remote: &str,
    local: &Path,
    size: u64,
    options: &TransferOptions,
) -> RodsResult<()> {
    let request = DataObjRequest::get(remote, options.num_streams as i32, GET_OPR);
    let reply: PortalReply = conn.request(&request).await?;
    let plan = build_plan(size, &reply)?;
    info!(remote, size, streams = plan.chunks.len(), "parallel download");

    // Size the destination up front so workers can write at their offsets.
    let file = File::create(local).await.map_err(RodsError::from)?;
    file.set_len(size).await.map_err(RodsError::from)?;
    drop(file);

    let outcome = run_workers(Direction::Download, local.to_path_buf(), &plan, size, options).await;
    finish_portal(conn, plan.descriptor, outcome).await
}

/// Completes the portal operation on the control connection whether or not
/// the workers succeeded, so no descriptor is left open; the transfer error
/// wins over a completion error.
async fn finish_portal(
    conn: &Connection,
    descriptor: i32,
    outcome: RodsResult<()>,
) -> RodsResult<()> {
    let completion = conn
        .request::<EmptyResponse>(&OperationComplete::new(descriptor))
        .await;
    match (outcome, completion) {
        (Ok(()), Ok(_)) => Ok(()),
        (Err(e), _) => Err(e),
        (Ok(()), Err(e)) => Err(e),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Upload,
    Download,
}

async fn run_workers(
    direction: Direction,
    local: PathBuf,
    plan: &TransferPlan,
    size: u64,
    options: &TransferOptions,
) -> RodsResult<()> {
    let progress = ProgressReporter::new(size, options.progress.clone());
    let timeout = Duration::from_secs(60);

    let mut workers = Vec::with_capacity(plan.chunks.len());
    for chunk in plan.chunks.iter().cloned() {
        let local = local.clone();
        let cancel = options.cancel.clone();
        let progress = Arc::clone(&progress);
        workers.push(tokio::spawn(async move {
            let work = transfer_chunk(direction, local, chunk, progress, timeout);
            tokio::pin!(work);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(RodsError::Cancelled),
                result = &mut work => result,
            };
            if let Err(e) = &result {
                // First failure aborts every sibling.
                warn!(error = %e, "transfer worker failed");
                cancel.cancel();
            }
            result
        }));
    }

    let mut first_error = None;
    for worker in workers {
        let result = worker.await.unwrap_or_else(|e| {
            Err(RodsError::Transport(std::io::Error::other(format!(
                "transfer worker panicked: {}",
                e
            ))))
        });
        if let Err(e) = result {
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        None => Ok(()),
        Some(e) => Err(e),
    }
}

async fn transfer_chunk(
    direction: Direction,
    local: PathBuf,
    chunk: ChunkPlan,
    progress: Arc<ProgressReporter>,
    timeout: Duration,
) -> RodsResult<()> {
    let endpoint = &chunk.endpoint;
    let mut socket = tokio::time::timeout(
        timeout,
        TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
    )
    .await
    .map_err(|_| RodsError::Timeout(format!("dialing {}:{}", endpoint.host, endpoint.port)))?
    .map_err(RodsError::from)?;

    // The cookie authenticates the data connection against the portal.
    socket
        .write_all(&endpoint.cookie.to_be_bytes())
        .await
        .map_err(RodsError::from)?;

    match direction {
        Direction::Upload => {
            let mut file = File::open(&local).await.map_err(RodsError::from)?;
            file.seek(SeekFrom::Start(chunk.offset))
                .await
                .map_err(RodsError::from)?;

            let mut buf = vec![0u8; STREAM_BUF_SIZE];
            let mut remaining = chunk.length;
            while remaining > 0 {
                let n = remaining.min(buf.len() as u64) as usize;
                file.read_exact(&mut buf[..n]).await.map_err(RodsError::from)?;
                socket.write_all(&buf[..n]).await.map_err(RodsError::from)?;
                remaining -= n as u64;
                progress.report(n as u64);
            }
            socket.shutdown().await.map_err(RodsError::from)?;
        }
        Direction::Download => {
            let mut file = OpenOptions::new()
                .write(true)
                .open(&local)
                .await
                .map_err(RodsError::from)?;
            file.seek(SeekFrom::Start(chunk.offset))
                .await
                .map_err(RodsError::from)?;

            let mut buf = vec![0u8; STREAM_BUF_SIZE];
            let mut remaining = chunk.length;
            while remaining > 0 {
                let n = remaining.min(buf.len() as u64) as usize;
                socket.read_exact(&mut buf[..n]).await.map_err(RodsError::from)?;
                file.write_all(&buf[..n]).await.map_err(RodsError::from)?;
                remaining -= n as u64;
                progress.report(n as u64);
            }
            file.flush().await.map_err(RodsError::from)?;
        }
    }
    Ok(())
}
