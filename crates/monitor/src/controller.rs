use std::time::Duration;

use relay_db::Store;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::MonitorConfig;
use crate::status::{RunState, StatusHandle};
use crate::supervisor::Supervisor;

const RESTART_PAUSE: Duration = Duration::from_millis(500);

#[derive(Default)]
struct ActiveRun {
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

/// Owns the lifecycle of at most one supervisor task per process.
/// Control actions are serialized through one lock, and restart waits for
/// the previous run to tear down completely before launching the next
/// one, so two checkers for the same account never run concurrently.
pub struct MonitorController {
    config: MonitorConfig,
    store: Store,
    status: StatusHandle,
    active: Mutex<ActiveRun>,
}

impl MonitorController {
    pub fn new(config: MonitorConfig, store: Store) -> Self {
        Self {
            config,
            store,
            status: StatusHandle::default(),
            active: Mutex::new(ActiveRun::default()),
        }
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn status(&self) -> RunState {
        self.status.snapshot()
    }

    /// Starts a supervisor run unless one is already active. Returns
    /// whether a new run was launched.
    pub async fn start(&self) -> bool {
        let mut active = self.active.lock().await;
        self.start_locked(&mut active)
    }

    fn start_locked(&self, active: &mut ActiveRun) -> bool {
        if let Some(task) = &active.task
            && !task.is_finished()
        {
            info!("monitor already running, ignoring start");
            return false;
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        let supervisor = Supervisor::new(
            self.config.clone(),
            self.store.clone(),
            self.status.clone(),
            stop_rx,
        );
        active.stop_tx = Some(stop_tx);
        active.task = Some(tokio::spawn(supervisor.run()));
        true
    }

    /// Signals the active run to stop. Returns without waiting for
    /// teardown; the flag is observed by the supervisor loop. Safe to
    /// call any number of times.
    pub async fn stop(&self) {
        let active = self.active.lock().await;
        if let Some(stop_tx) = &active.stop_tx {
            let _ = stop_tx.send(true);
        }
    }

    /// Stop-then-start. The old run is awaited to completion (child
    /// confirmed gone) before the replacement launches.
    pub async fn restart(&self) {
        let mut active = self.active.lock().await;
        if let Some(stop_tx) = active.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(task) = active.task.take()
            && let Err(err) = task.await
        {
            warn!("monitor task ended abnormally: {}", err);
        }
        tokio::time::sleep(RESTART_PAUSE).await;
        self.start_locked(&mut active);
    }

    /// Signals stop and waits for the run to finish. Used at process
    /// shutdown.
    pub async fn shutdown(&self) {
        let mut active = self.active.lock().await;
        if let Some(stop_tx) = active.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(task) = active.task.take() {
            let _ = task.await;
        }
    }
}
