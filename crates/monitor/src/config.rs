use crate::{MonitorError, Result};

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_CHECKER_PROGRAM: &str = "python3";

/// Template handed to the checker when `MESSAGE_CONTENT` is unset. The
/// `{owner_name}` / `{post_url}` placeholders are part of the checker's
/// argument contract.
pub const DEFAULT_MESSAGE_TEMPLATE: &str =
    "{owner_name} posted on Instagram\\n{post_url}\\n@everyone";

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

/// Environment-driven monitor configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub username: String,
    pub webhook_url: String,
    pub refresh_interval_secs: u64,
    pub message_template: Option<String>,
    pub credentials: Option<Credentials>,
    pub checker_program: String,
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let login = lookup("INSTAGRAM_LOGIN").filter(|value| !value.is_empty());
        let password = lookup("INSTAGRAM_PASSWORD").filter(|value| !value.is_empty());
        let credentials = match (login, password) {
            (Some(login), Some(password)) => Some(Credentials { login, password }),
            _ => None,
        };
        Self {
            username: lookup("INSTAGRAM_USERNAME").unwrap_or_default(),
            webhook_url: lookup("DISCORD_WEBHOOK_URL").unwrap_or_default(),
            refresh_interval_secs: lookup("REFRESH_INTERVAL")
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS),
            message_template: lookup("MESSAGE_CONTENT").filter(|value| !value.is_empty()),
            credentials,
            checker_program: lookup("CHECKER_PROGRAM")
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_CHECKER_PROGRAM.to_string()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.username.trim().is_empty() {
            missing.push("INSTAGRAM_USERNAME");
        }
        if self.webhook_url.trim().is_empty() {
            missing.push("DISCORD_WEBHOOK_URL");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(MonitorError::MissingConfig(missing.join(", ")))
        }
    }

    /// Resolves the message template passed to the checker: strips the
    /// legacy `MESSAGE_CONTENT:` prefix, falls back to the default when
    /// unset, and turns escaped `\n` markers into literal line breaks.
    pub fn resolve_template(&self) -> String {
        let mut template = self.message_template.clone().unwrap_or_default();
        if let Some(rest) = template.strip_prefix("MESSAGE_CONTENT:") {
            template = rest.trim().to_string();
        }
        if template.is_empty() {
            template = DEFAULT_MESSAGE_TEMPLATE.to_string();
        }
        template.replace("\\n", "\n")
    }
}
