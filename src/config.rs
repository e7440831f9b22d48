use std::time::Duration;

use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};

pub const DEFAULT_BASE_URL: &str = "https://sdk.split.io/api";
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_ERROR_CHANNEL_CAPACITY: usize = 16;

/// Settings for a [crate::Poller] and the [crate::SplitioBinding] it talks to.
///
/// Deserializable so hosts can load it from whatever format they already use; durations are
/// given in whole seconds there.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PollerConfig {
    pub api_key: String,
    pub base_url: String,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "pollingRateSeconds")]
    pub polling_interval: Duration,
    pub serialize_segments: bool,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "requestTimeoutSeconds")]
    pub request_timeout: Duration,
    pub error_channel_capacity: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            polling_interval: DEFAULT_POLLING_INTERVAL,
            serialize_segments: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            error_channel_capacity: DEFAULT_ERROR_CHANNEL_CAPACITY,
        }
    }
}

impl PollerConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn serialize_segments(mut self, serialize_segments: bool) -> Self {
        self.serialize_segments = serialize_segments;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The polling interval to actually use; zero means "not set".
    pub fn effective_polling_interval(&self) -> Duration {
        if self.polling_interval.is_zero() {
            DEFAULT_POLLING_INTERVAL
        } else {
            self.polling_interval
        }
    }

    /// The base URL to actually use; empty means "not set".
    pub fn effective_base_url(&self) -> &str {
        let trimmed = self.base_url.trim_end_matches('/');
        if trimmed.is_empty() {
            DEFAULT_BASE_URL
        } else {
            trimmed
        }
    }
}
