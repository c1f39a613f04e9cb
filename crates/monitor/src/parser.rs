use regex::Regex;
use relay_core::{ObservedPost, post_url};

/// Substrings marking a line as a "post forwarded" confirmation. These are
/// a compatibility contract with the checker's log format.
pub const SENT_MARKERS: &[&str] = &["Sending post", "sent to Discord"];

/// Substring marking a polling-cycle heartbeat with no new content.
pub const HEARTBEAT_MARKER: &str = "Checking for new posts";

/// Case-insensitive keywords that flag a line as a checker failure.
pub const ERROR_KEYWORDS: &[&str] = &["error", "failed", "exception"];

#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    PostSent(ObservedPost),
    Heartbeat,
    Failure(String),
    Ignored,
}

/// Ordered first-match-wins classifier for checker output lines.
pub struct LineClassifier {
    username: String,
    permalink: Regex,
}

impl LineClassifier {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            permalink: Regex::new(r"https://www\.instagram\.com/p/([A-Za-z0-9_-]+)/")
                .expect("permalink pattern"),
        }
    }

    pub fn classify(&self, line: &str) -> LineEvent {
        if SENT_MARKERS.iter().any(|marker| line.contains(marker))
            && let Some(post) = self.extract_post(line)
        {
            return LineEvent::PostSent(post);
        }
        if line.contains(HEARTBEAT_MARKER) {
            return LineEvent::Heartbeat;
        }
        let lowered = line.to_ascii_lowercase();
        if ERROR_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
            return LineEvent::Failure(line.to_string());
        }
        LineEvent::Ignored
    }

    fn extract_post(&self, line: &str) -> Option<ObservedPost> {
        let captures = self.permalink.captures(line)?;
        let shortcode = captures.get(1)?.as_str().to_string();
        Some(ObservedPost {
            username: self.username.clone(),
            url: post_url(&shortcode),
            shortcode,
            ..ObservedPost::default()
        })
    }
}
