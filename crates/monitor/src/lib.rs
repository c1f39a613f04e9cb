pub mod command;
pub mod config;
pub mod controller;
pub mod parser;
pub mod status;
pub mod supervisor;
pub mod webhook;

pub use command::{CheckerCommand, build_checker_command};
pub use config::MonitorConfig;
pub use controller::MonitorController;
pub use parser::{LineClassifier, LineEvent};
pub use status::{MonitorPhase, RunState, StatusHandle};
pub use supervisor::Supervisor;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("missing required configuration: {0}")]
    MissingConfig(String),
    #[error("failed to launch checker: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("webhook request failed: {0}")]
    Webhook(#[from] reqwest::Error),
    #[error("webhook responded with status {0}")]
    WebhookStatus(u16),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
