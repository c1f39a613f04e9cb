use serde::{Deserialize, Serialize};

/// One post observed as forwarded by the external checker, as extracted
/// from a single log line. Timestamps are RFC 3339 strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservedPost {
    pub username: String,
    pub shortcode: String,
    pub url: String,
    pub owner_name: Option<String>,
    pub owner_username: Option<String>,
    pub caption: Option<String>,
    pub image_url: Option<String>,
    pub posted_at: Option<String>,
}

/// A persisted post row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub username: String,
    pub shortcode: String,
    pub url: String,
    pub owner_name: Option<String>,
    pub owner_username: Option<String>,
    pub caption: Option<String>,
    pub image_url: Option<String>,
    pub posted_at: Option<String>,
    pub sent_to_webhook: bool,
    pub sent_at: Option<String>,
    pub recorded_at: String,
}

/// Per-account monitoring cursor. At most one row per username.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringCursor {
    pub username: String,
    pub last_seen_shortcode: Option<String>,
    pub last_checked_at: Option<String>,
    pub is_active: bool,
    pub updated_at: String,
}

/// Aggregate counts surfaced by the status endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorStats {
    pub total_posts: u64,
    pub sent_posts: u64,
    pub last_checked_at: Option<String>,
    pub last_seen_shortcode: Option<String>,
}

pub fn post_url(shortcode: &str) -> String {
    format!("https://www.instagram.com/p/{}/", shortcode)
}

/// Truncates a caption for display, appending an ellipsis when the text
/// was cut. Splits on a char boundary so multi-byte captions stay valid.
pub fn truncate_caption(caption: &str, max_chars: usize) -> String {
    if caption.chars().count() <= max_chars {
        return caption.to_string();
    }
    let truncated: String = caption.chars().take(max_chars).collect();
    format!("{}...", truncated)
}
