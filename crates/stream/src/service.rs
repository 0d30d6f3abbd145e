use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tessera_common::{Chunk, ChunkXz};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ChunkError;

/// Request queue depth for a chunk service.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// One source of chunk data.
///
/// Implementations may block (disk reads); they run on a dedicated blocking
/// thread owned by their service.
pub trait ChunkSource: Send + 'static {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// `Ok(None)` means this source has no chunk at `loc`.
    fn load_chunk(&mut self, loc: ChunkXz) -> Result<Option<Chunk>, ChunkError>;
}

pub(crate) type ChunkReply = oneshot::Sender<Result<Option<Chunk>, ChunkError>>;

pub(crate) enum ChunkRequest {
    Load { loc: ChunkXz, reply: ChunkReply },
    Shutdown { done: oneshot::Sender<()> },
}

/// Cloneable request side of a running chunk service.
#[derive(Debug, Clone)]
pub struct ChunkServiceHandle {
    name: Arc<str>,
    tx: mpsc::Sender<ChunkRequest>,
}

impl std::fmt::Debug for ChunkRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkRequest::Load { loc, .. } => write!(f, "Load({loc})"),
            ChunkRequest::Shutdown { .. } => write!(f, "Shutdown"),
        }
    }
}

impl ChunkServiceHandle {
    pub(crate) fn channel(name: &str, capacity: usize) -> (Self, mpsc::Receiver<ChunkRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                name: Arc::from(name),
                tx,
            },
            rx,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the service for the chunk at `loc`, suspending until it answers.
    pub async fn load_chunk(&self, loc: ChunkXz) -> Result<Option<Chunk>, ChunkError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ChunkRequest::Load { loc, reply })
            .await
            .map_err(|_| ChunkError::ServiceStopped)?;
        rx.await.map_err(|_| ChunkError::ServiceStopped)?
    }

    /// Stop the service after it has answered every request queued before
    /// this one. Requests queued afterwards fail with
    /// [`ChunkError::ServiceStopped`]. Stopping a stopped service is a no-op.
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        if self.tx.send(ChunkRequest::Shutdown { done }).await.is_err() {
            debug!(service = %self.name, "shutdown of stopped chunk service");
            return;
        }
        let _ = rx.await;
    }

    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Fail everything still buffered after a shutdown request.
pub(crate) fn reject_pending(rx: &mut mpsc::Receiver<ChunkRequest>) -> Vec<oneshot::Sender<()>> {
    rx.close();
    let mut waiters = Vec::new();
    while let Ok(request) = rx.try_recv() {
        match request {
            ChunkRequest::Load { reply, .. } => {
                let _ = reply.send(Err(ChunkError::ServiceStopped));
            }
            ChunkRequest::Shutdown { done } => waiters.push(done),
        }
    }
    waiters
}

/// Run `source` as a chunk service on its own blocking thread.
pub fn spawn_service<S: ChunkSource>(mut source: S, capacity: usize) -> (ChunkServiceHandle, JoinHandle<()>) {
    let (handle, mut rx) = ChunkServiceHandle::channel(source.name(), capacity);
    let name = handle.name.clone();
    let task = tokio::task::spawn_blocking(move || {
        let _span = tracing::info_span!("chunk_tier", tier = %name).entered();
        info!("chunk service started");
        while let Some(request) = rx.blocking_recv() {
            match request {
                ChunkRequest::Load { loc, reply } => {
                    // A panicking source fails this request only.
                    let result = catch_unwind(AssertUnwindSafe(|| source.load_chunk(loc)))
                        .unwrap_or(Err(ChunkError::SourcePanicked { loc }));
                    match &result {
                        Ok(Some(_)) => debug!(%loc, "chunk hit"),
                        Ok(None) => debug!(%loc, "chunk miss"),
                        Err(err) => warn!(%loc, %err, "chunk load failed"),
                    }
                    if reply.send(result).is_err() {
                        debug!(%loc, "chunk requester went away");
                    }
                }
                ChunkRequest::Shutdown { done } => {
                    let waiters = reject_pending(&mut rx);
                    info!("chunk service stopped");
                    let _ = done.send(());
                    for waiter in waiters {
                        let _ = waiter.send(());
                    }
                    return;
                }
            }
        }
        info!("chunk service handles dropped; stopping");
    });
    (handle, task)
}
