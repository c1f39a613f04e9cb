use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPhase {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
    Crashed,
    Completed,
}

/// In-memory run state, one instance for the life of the hosting process.
/// Written by the supervisor, read by the status endpoints.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunState {
    pub phase: MonitorPhase,
    pub running: bool,
    pub started_at: Option<String>,
    pub last_ping: Option<String>,
    pub last_error: Option<String>,
    pub child_pid: Option<u32>,
    pub lines_seen: u64,
    pub posts_recorded: u64,
}

/// Lock-guarded accessor for the shared [`RunState`].
#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<Mutex<RunState>>,
}

impl StatusHandle {
    pub fn snapshot(&self) -> RunState {
        self.inner.lock().unwrap().clone()
    }

    pub fn update(&self, op: impl FnOnce(&mut RunState)) {
        let mut state = self.inner.lock().unwrap();
        op(&mut state);
    }

    pub fn mark_ping(&self) {
        self.update(|state| state.last_ping = Some(now_utc()));
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.update(|state| state.last_error = Some(message.into()));
    }
}

pub(crate) fn now_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
