//! Cancellable handles for background warming work

use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Handle to a spawned warming task.
///
/// Dropping the handle detaches the task; call [`TaskHandle::cancel`] to stop
/// it, e.g. when the host tears down its data layer.
#[derive(Debug)]
pub struct TaskHandle<T = ()> {
    name: &'static str,
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> TaskHandle<T> {
    /// Spawn `fut` on the current tokio runtime.
    pub(crate) fn spawn<F>(name: &'static str, fut: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        debug!(task = name, "Spawning background task");
        Self {
            name,
            handle: tokio::spawn(fut),
        }
    }
}

impl<T> TaskHandle<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Abort the task. In-flight origin fetches are abandoned.
    pub fn cancel(&self) {
        debug!(task = self.name, "Cancelling background task");
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task, returning None if it was cancelled or panicked.
    pub async fn join(self) -> Option<T> {
        match self.handle.await {
            Ok(value) => Some(value),
            Err(e) if e.is_cancelled() => None,
            Err(e) => {
                error!(task = self.name, error = %e, "Background task panicked");
                None
            }
        }
    }
}
