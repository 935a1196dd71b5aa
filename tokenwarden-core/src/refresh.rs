//! Proactive background token refresh.
//!
//! Spawns a periodic task that checks whether the cached token has entered
//! its refresh window and renews it before foreground callers notice. The
//! task polls rather than sleeping until an exact deadline, so the refresh
//! buffer must exceed the poll interval for renewal to land before expiry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::token_manager::ManagerInner;

/// Handle to a running refresh task.
pub(crate) struct RefreshHandle {
    shutdown: Mutex<Option<mpsc::Sender<()>>>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Spawn the refresh task for a manager.
///
/// The shutdown signal interrupts the idle wait between polls but never an
/// exchange already in progress. Dropping the handle also ends the task.
pub(crate) fn spawn(inner: Arc<ManagerInner>, interval: Duration) -> RefreshHandle {
    let (tx, mut rx) = mpsc::channel::<()>(1);

    let join_handle = tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "token refresh task started");

        loop {
            tokio::select! {
                _ = rx.recv() => {
                    debug!("token refresh task shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }

            match inner.refresh_if_due().await {
                Ok(true) => info!("background token refresh succeeded"),
                Ok(false) => debug!("token not due for refresh"),
                Err(e) => {
                    warn!(error = %e, "background token refresh failed, will retry next cycle");
                }
            }
        }

        info!("token refresh task stopped");
    });

    RefreshHandle {
        shutdown: Mutex::new(Some(tx)),
        join_handle: Mutex::new(Some(join_handle)),
    }
}

impl RefreshHandle {
    /// Signal the task and wait up to `timeout` for it to exit.
    ///
    /// Subsequent calls return immediately. If the task does not finish in
    /// time it is aborted.
    pub(crate) async fn stop(&self, timeout: Duration) {
        if let Some(tx) = self.shutdown.lock().await.take() {
            // Fails only if the task already exited.
            let _ = tx.send(()).await;
        }

        let Some(mut handle) = self.join_handle.lock().await.take() else {
            return;
        };

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => debug!("token refresh task joined"),
            Ok(Err(e)) => warn!(error = %e, "token refresh task ended abnormally"),
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "token refresh task did not stop in time, aborting"
                );
                handle.abort();
            }
        }
    }

    pub(crate) async fn is_running(&self) -> bool {
        self.join_handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}
