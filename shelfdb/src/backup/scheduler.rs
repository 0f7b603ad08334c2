use super::{BackupManager, BackupSnapshot, CleanupReport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Where the scheduler thread currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Result of one snapshot + retention pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub finished_at: DateTime<Utc>,
    pub snapshot: Option<BackupSnapshot>,
    pub cleanup: Option<CleanupReport>,
    pub errors: Vec<String>,
}

struct Shared {
    state: Mutex<SchedulerState>,
    last_run: Mutex<Option<PassReport>>,
    runs: AtomicU64,
}

/// Runs a backup pass immediately and then every `interval` on a
/// background thread, until stopped or dropped.
pub struct BackupScheduler {
    shutdown_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl BackupScheduler {
    pub fn start(manager: Arc<BackupManager>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let shared = Arc::new(Shared {
            state: Mutex::new(SchedulerState::Idle),
            last_run: Mutex::new(None),
            runs: AtomicU64::new(0),
        });

        let thread = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || {
                log::info!("Backup scheduler started (every {interval:?})");
                loop {
                    set(&shared.state, SchedulerState::Running);
                    let report = run_pass(&manager);
                    set(&shared.last_run, Some(report));
                    shared.runs.fetch_add(1, Ordering::SeqCst);
                    set(&shared.state, SchedulerState::Idle);

                    match shutdown_rx.recv_timeout(interval) {
                        Err(mpsc::RecvTimeoutError::Timeout) => continue,
                        // Explicit stop, or the handle was dropped
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
                set(&shared.state, SchedulerState::Stopped);
                log::info!("Backup scheduler stopped");
            })
        };

        BackupScheduler {
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
            shared,
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Report of the most recent finished pass
    pub fn last_run(&self) -> Option<PassReport> {
        self.shared
            .last_run
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of finished passes
    pub fn runs(&self) -> u64 {
        self.shared.runs.load(Ordering::SeqCst)
    }

    /// Signal the thread and wait for any in-flight pass to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Backup scheduler thread panicked");
            }
        }
    }
}

impl Drop for BackupScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Snapshot, then prune. Neither step's failure stops the other.
fn run_pass(manager: &BackupManager) -> PassReport {
    let mut errors = Vec::new();

    let snapshot = match manager.create_backup() {
        Ok(s) => Some(s),
        Err(e) => {
            log::error!("Scheduled backup failed: {e}");
            errors.push(format!("backup: {e}"));
            None
        }
    };

    let cleanup = match manager.cleanup_old_backups() {
        Ok(r) => {
            if r.deleted > 0 {
                log::info!("Pruned {} expired backups, {} remain", r.deleted, r.remaining);
            }
            Some(r)
        }
        Err(e) => {
            log::error!("Backup cleanup failed: {e}");
            errors.push(format!("cleanup: {e}"));
            None
        }
    };

    PassReport {
        finished_at: Utc::now(),
        snapshot,
        cleanup,
        errors,
    }
}

fn set<T>(slot: &Mutex<T>, value: T) {
    *slot.lock().unwrap_or_else(|e| e.into_inner()) = value;
}
