//! Lifecycle control for the background indexing job.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use fileindex_core::{
    ControlError, IndexStore, JobState, JobStatus, ScanConfig, ScanMetadata, ScanOutcome,
};

use crate::job::ScanJob;

/// Runs at most one [`ScanJob`] at a time and exposes its progress.
///
/// State transitions happen under a mutex, so two concurrent `start` calls
/// can never both launch a job. Status is published through a watch channel
/// whose value is always replaced whole: readers see either the previous
/// snapshot or the next one, never a mix.
#[derive(Clone)]
pub struct JobController {
    shared: Arc<Shared>,
}

struct Shared {
    store: Arc<dyn IndexStore>,
    control: Mutex<Control>,
    status_tx: watch::Sender<JobStatus>,
}

#[derive(Default)]
struct Control {
    cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for JobController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobController")
            .field("state", &self.shared.status_tx.borrow().state)
            .finish_non_exhaustive()
    }
}

impl JobController {
    /// Create an idle controller writing into `store`.
    pub fn new(store: Arc<dyn IndexStore>) -> Self {
        let (status_tx, _) = watch::channel(JobStatus::default());
        Self {
            shared: Arc::new(Shared {
                store,
                control: Mutex::new(Control::default()),
                status_tx,
            }),
        }
    }

    /// The store jobs write into.
    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.shared.store
    }

    /// Start indexing `root`, optionally capped at the demo limit.
    ///
    /// See [`start_with_config`](Self::start_with_config).
    pub fn start(&self, root: impl Into<PathBuf>, cap_enabled: bool) -> Result<(), ControlError> {
        self.start_with_config(ScanConfig::new(root).with_cap(cap_enabled))
    }

    /// Launch a job on the blocking thread pool and return immediately.
    ///
    /// Rejected with [`ControlError::AlreadyRunning`] while a job is in
    /// flight (including one that is winding down after a stop request), and
    /// with [`ControlError::Scan`] if the configuration is invalid. Must be
    /// called from within a Tokio runtime.
    pub fn start_with_config(&self, config: ScanConfig) -> Result<(), ControlError> {
        let runtime = Handle::try_current().map_err(|_| ControlError::NoRuntime)?;

        let mut control = self.shared.lock_control();
        if self.shared.status_tx.borrow().state.is_active() {
            tracing::warn!(root = %config.root.display(), "start ignored, a job is already running");
            return Err(ControlError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let job = ScanJob::new(config, Arc::clone(&self.shared.store))?.with_cancel(cancel.clone());
        let initial = ScanMetadata::begin(&job.config().root);

        control.cancel = Some(cancel);
        self.shared.status_tx.send_modify(|status| {
            status.state = JobState::Running;
            status.metadata = Some(Arc::new(initial));
        });

        // Dropped with the closure, so a task discarded by a shutting-down
        // runtime still returns the controller to `Idle`.
        let idle = IdleOnDrop(Arc::clone(&self.shared));
        drop(control);
        runtime.spawn_blocking(move || {
            let shared = &idle.0;
            // Failures are logged by the job and recorded in its final snapshot.
            let _ = job.run(|snapshot| shared.publish(snapshot));
        });

        Ok(())
    }

    /// Ask the running job to stop at its next file checkpoint.
    ///
    /// Returns `true` if a running job was signalled.
    pub fn request_stop(&self) -> bool {
        let control = self.shared.lock_control();
        let Some(cancel) = control.cancel.as_ref() else {
            return false;
        };
        if self.shared.status_tx.borrow().state != JobState::Running {
            return false;
        }

        cancel.cancel();
        self.shared
            .status_tx
            .send_modify(|status| status.state = JobState::StopRequested);
        tracing::info!("stop requested");
        true
    }

    /// Current state and the latest metadata snapshot.
    pub fn status(&self) -> JobStatus {
        self.shared.status_tx.borrow().clone()
    }

    /// Receive every status change.
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Wait until no job is in flight and return the status at that moment.
    pub async fn wait_until_idle(&self) -> JobStatus {
        let mut rx = self.subscribe();
        match rx.wait_for(|status| !status.is_active()).await {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        }
    }

    /// Make sure the schema exists and, if `wipe` is set, empty the index.
    ///
    /// Rejected while a job is in flight. Wiping also discards the previous
    /// job's metadata.
    pub fn clear_and_reinitialize(&self, wipe: bool) -> Result<(), ControlError> {
        let _control = self.shared.lock_control();
        if self.shared.status_tx.borrow().state.is_active() {
            tracing::warn!(wipe, "reinitialize rejected, a job is running");
            return Err(ControlError::JobActive {
                operation: "reinitialize the index",
            });
        }

        self.shared.store.ensure_schema()?;
        if wipe {
            self.shared.store.clear_all()?;
            self.shared
                .status_tx
                .send_modify(|status| status.metadata = None);
        }
        Ok(())
    }
}

impl Shared {
    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, snapshot: ScanMetadata) {
        let snapshot = Arc::new(snapshot);
        self.status_tx
            .send_modify(|status| status.metadata = Some(snapshot));
    }
}

/// Returns the controller to `Idle` when the worker exits, even by panic or
/// when the task is discarded before it runs.
struct IdleOnDrop(Arc<Shared>);

impl Drop for IdleOnDrop {
    fn drop(&mut self) {
        let message = if std::thread::panicking() {
            "indexing job panicked"
        } else {
            "indexing job ended without a final snapshot"
        };
        let mut control = self.0.lock_control();
        control.cancel = None;
        let mut unfinished = false;
        self.0.status_tx.send_modify(|status| {
            if let Some(meta) = status.metadata.as_deref().filter(|m| !m.is_finished()) {
                let mut meta = meta.clone();
                meta.end_time = Some(Utc::now());
                meta.outcome = Some(ScanOutcome::Failed {
                    message: message.to_string(),
                });
                status.metadata = Some(Arc::new(meta));
                unfinished = true;
            }
            status.state = JobState::Idle;
        });
        if unfinished {
            tracing::error!("{message}");
        }
    }
}
