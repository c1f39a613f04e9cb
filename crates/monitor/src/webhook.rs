use std::time::Duration;

use serde_json::json;
use tracing::info;

use crate::{MonitorError, Result};

/// Request-level timeout for direct webhook calls. Delivery of real posts
/// belongs to the checker; this path only verifies the target answers.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts a test message to the delivery target. Network failures and
/// non-success responses come back as structured errors; nothing here may
/// take down the hosting process.
pub async fn send_test_message(webhook_url: &str, content: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(WEBHOOK_TIMEOUT)
        .build()?;
    let response = client
        .post(webhook_url)
        .json(&json!({ "content": content }))
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(MonitorError::WebhookStatus(response.status().as_u16()));
    }
    info!("webhook test delivered to target");
    Ok(())
}
