use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use relay_db::Store;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::Result;
use crate::command::{CheckerCommand, build_checker_command};
use crate::config::MonitorConfig;
use crate::parser::{LineClassifier, LineEvent};
use crate::status::{MonitorPhase, StatusHandle, now_utc};

/// Ceiling on consumed output lines per run, guarding against a looping
/// or runaway checker. Reaching it ends the run as if stop was requested.
pub const MAX_OUTPUT_LINES: u64 = 1000;

const TERMINATE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEnd {
    StopRequested,
    LineCeiling,
    OutputClosed,
}

/// Supervises one checker invocation for one account: builds the argument
/// list, streams combined stdout/stderr line by line, applies dedup and
/// persistence side effects, and tears the child down on stop or exit.
pub struct Supervisor {
    config: MonitorConfig,
    store: Store,
    status: StatusHandle,
    stop_rx: watch::Receiver<bool>,
}

impl Supervisor {
    pub fn new(
        config: MonitorConfig,
        store: Store,
        status: StatusHandle,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            store,
            status,
            stop_rx,
        }
    }

    /// One full run: validate, launch, consume output, tear down. Always
    /// leaves the run state back at `Idle` with `running = false` except
    /// when configuration is incomplete, which is fatal to starting and
    /// parks the state at `Crashed` until the next start.
    pub async fn run(self) {
        self.status.update(|state| {
            state.phase = MonitorPhase::Starting;
            state.running = true;
            state.started_at = Some(now_utc());
            state.last_error = None;
            state.child_pid = None;
            state.lines_seen = 0;
            state.posts_recorded = 0;
        });

        if let Err(err) = self.config.validate() {
            warn!("not starting checker: {}", err);
            self.status.update(|state| {
                state.phase = MonitorPhase::Crashed;
                state.running = false;
                state.last_error = Some(err.to_string());
            });
            return;
        }

        let last_seen = self.store.last_seen_shortcode(&self.config.username);
        if last_seen.is_none() {
            info!(
                "no recorded posts for {}, requesting catch-up",
                self.config.username
            );
        }
        let command = build_checker_command(&self.config, last_seen.as_deref());

        if let Err(err) = self.run_checker(command).await {
            warn!("checker launch failed: {}", err);
            self.status.record_error(err.to_string());
        }

        self.status.update(|state| {
            state.phase = MonitorPhase::Idle;
            state.running = false;
            state.child_pid = None;
        });
    }

    pub(crate) async fn run_checker(&self, command: CheckerCommand) -> Result<()> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let child_pid = child.id();
        info!(
            "checker started for {} (pid {:?})",
            self.config.username, child_pid
        );
        self.status.update(|state| {
            state.phase = MonitorPhase::Running;
            state.child_pid = child_pid;
        });

        let (line_tx, mut line_rx) = mpsc::channel::<String>(256);
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, line_tx.clone());
        }
        drop(line_tx);

        let classifier = LineClassifier::new(&self.config.username);
        let mut stop_rx = self.stop_rx.clone();
        let mut lines_seen = 0u64;

        let end = loop {
            if *stop_rx.borrow_and_update() {
                break LoopEnd::StopRequested;
            }
            if lines_seen >= MAX_OUTPUT_LINES {
                break LoopEnd::LineCeiling;
            }
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break LoopEnd::StopRequested;
                    }
                }
                line = line_rx.recv() => match line {
                    Some(line) => {
                        lines_seen += 1;
                        self.status.update(|state| state.lines_seen = lines_seen);
                        self.handle_line(&classifier, &line);
                    }
                    None => break LoopEnd::OutputClosed,
                },
            }
        };

        match end {
            LoopEnd::StopRequested => info!("stop requested, terminating checker"),
            LoopEnd::LineCeiling => warn!(
                "output ceiling of {} lines reached, terminating checker",
                MAX_OUTPUT_LINES
            ),
            LoopEnd::OutputClosed => debug!("checker output closed"),
        }
        self.status.update(|state| state.phase = MonitorPhase::Stopping);

        let exit = terminate_child(&mut child).await;

        while let Ok(line) = line_rx.try_recv() {
            debug!("checker (final): {}", line);
        }

        let phase = match (end, &exit) {
            (LoopEnd::OutputClosed, Ok(exit_status)) if exit_status.success() => {
                info!("checker completed");
                MonitorPhase::Completed
            }
            (LoopEnd::OutputClosed, Ok(exit_status)) => {
                self.status
                    .record_error(format!("checker exited with {}", exit_status));
                MonitorPhase::Crashed
            }
            (LoopEnd::OutputClosed, Err(err)) => {
                self.status
                    .record_error(format!("waiting for checker failed: {}", err));
                MonitorPhase::Crashed
            }
            (_, exit) => {
                if let Ok(exit_status) = exit {
                    debug!("checker exited with {}", exit_status);
                }
                MonitorPhase::Stopping
            }
        };
        self.status.update(|state| state.phase = phase);
        Ok(())
    }

    /// Classifies one output line and applies its side effects. A single
    /// malformed or noisy line never ends the run.
    fn handle_line(&self, classifier: &LineClassifier, line: &str) {
        debug!("checker: {}", line);
        match classifier.classify(line) {
            LineEvent::PostSent(post) => {
                if !self.store.is_post_sent(&post.shortcode) {
                    if self.store.save_post(&post) {
                        info!("recorded forwarded post {}", post.shortcode);
                        self.status
                            .update(|state| state.posts_recorded += 1);
                    }
                    self.store
                        .update_cursor(&self.config.username, Some(&post.shortcode));
                }
            }
            LineEvent::Heartbeat => {
                self.store.update_cursor(&self.config.username, None);
                self.status.mark_ping();
            }
            LineEvent::Failure(message) => {
                warn!("checker reported: {}", message);
                self.status.record_error(message);
            }
            LineEvent::Ignored => {}
        }
    }
}

fn spawn_line_reader(reader: impl AsyncRead + Unpin + Send + 'static, tx: mpsc::Sender<String>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
}

/// Asks the child to terminate, waits out the grace period, and escalates
/// to SIGKILL if it is still alive.
async fn terminate_child(child: &mut Child) -> std::io::Result<std::process::ExitStatus> {
    if let Some(pid) = child.id() {
        let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
        Ok(result) => result,
        Err(_) => {
            warn!("checker ignored SIGTERM, killing");
            child.kill().await?;
            child.wait().await
        }
    }
}
