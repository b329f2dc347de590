//! Saksflyt Pipeline: Worker Pool
//!
//! A bounded set of tokio tasks consuming the queue FIFO. Workers sleep on
//! a notify handle and fall back to polling with jittered backoff so a
//! missed wake-up never strands a queued case. A sweeper task reclaims
//! stale locks.
//!
//! Shutdown: flip the watch channel; each worker finishes its current
//! document, the in-flight case rolls back to DocumentsUploaded, and the
//! task exits.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::orchestrator::Orchestrator;

/// Poll backoff when the queue is empty.
const POLL_BACKOFF_BASE_MS: u64 = 200;
/// Poll backoff cap.
const POLL_BACKOFF_MAX_MS: u64 = 2_000;
/// Jitter cap added to each backoff sleep.
const POLL_BACKOFF_JITTER_MS: u64 = 50;
/// How often the stale-lock sweeper runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Handle over the running workers and sweeper.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    sweeper: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerPool {
    /// Spawn `size` workers plus the recovery sweeper.
    pub fn start(orchestrator: Arc<Orchestrator>, size: usize) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let notify = orchestrator.notify();

        let workers = (0..size.max(1))
            .map(|index| {
                let orchestrator = Arc::clone(&orchestrator);
                let notify = Arc::clone(&notify);
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    let worker_id = Uuid::new_v4();
                    info!(worker = index, worker_id = %worker_id, "worker started");
                    worker_loop(orchestrator, notify, shutdown_rx, worker_id).await;
                    info!(worker = index, worker_id = %worker_id, "worker stopped");
                })
            })
            .collect();

        let sweeper = {
            let orchestrator = Arc::clone(&orchestrator);
            let mut shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                            match orchestrator.recover_stale_locks().await {
                                Ok(0) => {}
                                Ok(n) => info!(recovered = n, "stale locks reclaimed"),
                                Err(e) => error!(error = %e, "stale lock sweep failed"),
                            }
                        }
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            })
        };

        Self {
            workers,
            sweeper,
            shutdown_tx,
        }
    }

    /// Signal shutdown and wait for every task to drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.workers {
            let _ = handle.await;
        }
        self.sweeper.abort();
        let _ = self.sweeper.await;
    }
}

async fn worker_loop(
    orchestrator: Arc<Orchestrator>,
    notify: Arc<tokio::sync::Notify>,
    mut shutdown_rx: watch::Receiver<bool>,
    worker_id: Uuid,
) {
    let mut backoff_ms = POLL_BACKOFF_BASE_MS;
    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        match orchestrator.execute_next(worker_id, &shutdown_rx).await {
            Ok(Some(case_id)) => {
                debug!(worker_id = %worker_id, case_id = %case_id, "case processed");
                backoff_ms = POLL_BACKOFF_BASE_MS;
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                // Job failures were already audited; keep the worker alive.
                error!(worker_id = %worker_id, error = %e, "processing error");
            }
        }

        let jitter = rand::rng().random_range(0..=POLL_BACKOFF_JITTER_MS);
        let sleep = Duration::from_millis(backoff_ms + jitter);
        backoff_ms = (backoff_ms * 2).min(POLL_BACKOFF_MAX_MS);

        tokio::select! {
            _ = notify.notified() => {
                backoff_ms = POLL_BACKOFF_BASE_MS;
            }
            _ = tokio::time::sleep(sleep) => {}
            _ = shutdown_rx.changed() => {}
        }
    }
}
