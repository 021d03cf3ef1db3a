use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::index::IndexError;

type Job = Pin<Box<dyn Future<Output = Result<(), IndexError>> + Send + 'static>>;

type Lanes = Mutex<HashMap<PathBuf, mpsc::UnboundedSender<Envelope>>>;

struct Envelope {
    job: Job,
    done: oneshot::Sender<()>,
}

/// Completion handle for an enqueued scan.
#[derive(Debug)]
pub struct ScanHandle {
    done: oneshot::Receiver<()>,
}

impl ScanHandle {
    /// Wait for the scan to finish. Resolves whether it succeeded or not.
    pub async fn wait(self) {
        let _ = self.done.await;
    }
}

/// Serializes work per document path.
///
/// Each path gets a lane: a channel drained by one consumer task, so jobs
/// for the same path run one at a time in the order they were enqueued.
/// Lanes for different paths run independently. A lane retires once its
/// channel drains and is started again by the next `enqueue`.
#[derive(Default)]
pub struct ScanQueue {
    lanes: Arc<Lanes>,
}

impl ScanQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain `job` behind everything already queued for `path`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue<F>(&self, path: &Path, job: F) -> ScanHandle
    where
        F: Future<Output = Result<(), IndexError>> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let mut envelope = Envelope {
            job: Box::pin(job),
            done: done_tx,
        };

        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let lane = lanes
                .entry(path.to_path_buf())
                .or_insert_with(|| spawn_lane(path.to_path_buf(), Arc::downgrade(&self.lanes)));
            match lane.send(envelope) {
                Ok(()) => break,
                Err(mpsc::error::SendError(returned)) => {
                    // The consumer is gone; start a fresh lane
                    envelope = returned;
                    lanes.remove(path);
                }
            }
        }

        ScanHandle { done: done_rx }
    }

    /// Resolves once every job enqueued so far for `path` has finished.
    pub async fn wait_idle(&self, path: &Path) {
        let has_lane = self
            .lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path);
        if has_lane {
            self.enqueue(path, async { Ok::<(), IndexError>(()) })
                .wait()
                .await;
        }
    }

    #[cfg(test)]
    fn lane_count(&self) -> usize {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn spawn_lane(path: PathBuf, lanes: Weak<Lanes>) -> mpsc::UnboundedSender<Envelope> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
    tokio::spawn(async move {
        debug!(path = %path.display(), "scan lane started");
        while let Some(Envelope { job, done }) = rx.recv().await {
            // Run each job in its own task so a panic is contained here
            match tokio::spawn(job).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(path = %path.display(), error = %e, "scan failed"),
                Err(e) => error!(path = %path.display(), error = %e, "scan panicked"),
            }
            let _ = done.send(());
            if rx.is_empty() && retire(&lanes, &path, &rx) {
                break;
            }
        }
        debug!(path = %path.display(), "scan lane retired");
    });
    tx
}

/// Drop the lane's sender if nothing was queued meanwhile. Senders only send
/// while holding the lanes lock, so the emptiness check under it is final.
fn retire(lanes: &Weak<Lanes>, path: &Path, rx: &mpsc::UnboundedReceiver<Envelope>) -> bool {
    let Some(lanes) = lanes.upgrade() else {
        // Queue dropped: the channel closes once the backlog drains
        return false;
    };
    let mut lanes = lanes.lock().unwrap_or_else(PoisonError::into_inner);
    if !rx.is_empty() {
        return false;
    }
    lanes.remove(path);
    true
}
