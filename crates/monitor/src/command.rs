use crate::config::MonitorConfig;

/// Flag names below are a stable contract with the external checker
/// (`python -m instawebhooks`); do not rename them.
pub const CHECKER_MODULE: &str = "instawebhooks";

#[derive(Debug, Clone, PartialEq)]
pub struct CheckerCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Builds the checker invocation for one run. Catch-up mode (`-p 1`) is
/// requested only when no shortcode has been seen for the account yet, so
/// a first run establishes a baseline without replaying history.
pub fn build_checker_command(
    config: &MonitorConfig,
    last_seen_shortcode: Option<&str>,
) -> CheckerCommand {
    let mut args = vec![
        "-m".to_string(),
        CHECKER_MODULE.to_string(),
        config.username.clone(),
        config.webhook_url.clone(),
        "-i".to_string(),
        config.refresh_interval_secs.to_string(),
        "-v".to_string(),
    ];
    if last_seen_shortcode.is_none() {
        args.push("-p".to_string());
        args.push("1".to_string());
    }
    args.push("-c".to_string());
    args.push(config.resolve_template());
    if let Some(credentials) = &config.credentials {
        args.push("-l".to_string());
        args.push(credentials.login.clone());
        args.push(credentials.password.clone());
    }
    CheckerCommand {
        program: config.checker_program.clone(),
        args,
    }
}
