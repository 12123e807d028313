use std::time::Duration;

use serde::Deserialize;

fn default_base_url() -> String {
    "https://api.postmarkapp.com".to_string()
}

fn default_message_stream() -> String {
    "outbound".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

/// Connection settings for the transactional email provider
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Server API token sent with every request
    pub server_token: String,

    #[serde(default = "default_message_stream")]
    pub message_stream: String,

    /// Sender used when the session does not configure one
    #[serde(default)]
    pub default_from: Option<String>,

    /// Per-request timeout; the dispatch loop has no timeout of its own
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    #[must_use]
    pub fn new(server_token: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            server_token: server_token.into(),
            message_stream: default_message_stream(),
            default_from: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub(crate) fn endpoint(&self) -> String {
        format!("{}/email/withTemplate", self.base_url.trim_end_matches('/'))
    }
}
