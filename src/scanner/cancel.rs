//! Cooperative cancellation for running scans.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

/// Observed by the scanner at batch boundaries and progress checkpoints.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_handle, token) = cancel_pair();
        token
    }
}

/// Held by whoever may stop the scan.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Cancel handles for scans running in this process.
#[derive(Default)]
pub struct ScanRegistry {
    running: Mutex<HashMap<Uuid, CancelHandle>>,
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scan and return the token it should observe.
    pub fn register(&self, job_id: Uuid) -> CancelToken {
        let (handle, token) = cancel_pair();
        self.lock().insert(job_id, handle);
        token
    }

    /// Signal a running scan. Returns `false` when the job is not running here.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        match self.lock().get(&job_id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn finish(&self, job_id: Uuid) {
        self.lock().remove(&job_id);
    }

    pub fn running_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, CancelHandle>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
