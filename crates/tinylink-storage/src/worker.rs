//! Background deletion worker.
//!
//! Deletion requests are queued to a single consumer task which applies them
//! to the store one at a time, in arrival order. Each request carries its own
//! reply channel, so concurrent callers only ever observe the outcome of
//! their own batch.

use std::sync::Arc;
use tinylink_core::{LinkStore, Result, StorageError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

struct DeleteRequest {
    aliases: Vec<String>,
    owner_id: String,
    reply: oneshot::Sender<Result<()>>,
}

/// Cloneable producer side of the deletion queue.
#[derive(Debug, Clone)]
pub struct DeletionHandle {
    tx: mpsc::Sender<DeleteRequest>,
}

impl std::fmt::Debug for DeleteRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeleteRequest")
            .field("aliases", &self.aliases)
            .field("owner_id", &self.owner_id)
            .finish_non_exhaustive()
    }
}

impl DeletionHandle {
    /// Queues a soft delete of `aliases` on behalf of `owner_id` and waits
    /// for the worker to apply it.
    ///
    /// Waits for queue space when the queue is full.
    pub async fn delete(&self, aliases: Vec<String>, owner_id: impl Into<String>) -> Result<()> {
        let (reply, outcome) = oneshot::channel();
        let request = DeleteRequest {
            aliases,
            owner_id: owner_id.into(),
            reply,
        };

        self.tx.send(request).await.map_err(|_| stopped())?;
        outcome.await.map_err(|_| stopped())?
    }
}

fn stopped() -> StorageError {
    StorageError::Unavailable("deletion worker has stopped".to_string())
}

/// The single consumer of the deletion queue.
#[derive(Debug)]
pub struct DeletionWorker {
    handle: DeletionHandle,
    task: JoinHandle<()>,
}

impl DeletionWorker {
    /// Spawns the worker task on the current tokio runtime.
    pub fn spawn(store: Arc<dyn LinkStore>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(run(store, rx));

        Self {
            handle: DeletionHandle { tx },
            task,
        }
    }

    pub fn handle(&self) -> DeletionHandle {
        self.handle.clone()
    }

    /// Stops accepting requests from this worker's own handle, drains what is
    /// already queued and waits for the task to finish.
    ///
    /// The task only exits once every cloned handle is dropped as well.
    pub async fn shutdown(self) {
        let Self { handle, task } = self;
        drop(handle);

        if let Err(err) = task.await {
            warn!(error = %err, "deletion worker terminated abnormally");
        }
    }
}

async fn run(store: Arc<dyn LinkStore>, mut rx: mpsc::Receiver<DeleteRequest>) {
    info!("deletion worker started");

    while let Some(request) = rx.recv().await {
        let DeleteRequest {
            aliases,
            owner_id,
            reply,
        } = request;

        let outcome = if aliases.is_empty() {
            Ok(())
        } else {
            store.delete_batch(&aliases, &owner_id).await
        };

        match &outcome {
            Ok(()) => debug!(count = aliases.len(), owner_id = %owner_id, "deleted batch"),
            Err(err) => warn!(error = %err, owner_id = %owner_id, "delete batch failed"),
        }

        // The caller may have given up waiting.
        let _ = reply.send(outcome);
    }

    info!("deletion worker stopped");
}
