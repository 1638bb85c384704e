//! Listener configuration surface.
//!
//! The embedding server owns configuration loading; this module only defines
//! the shape it consumes and the startup normalization the service applies.

use std::time::Duration;

use serde::Deserialize;

/// Default maximum request body size (512 MB), applied when unset or zero.
pub const DEFAULT_MAX_BODY_SIZE: u64 = 512_000_000;

/// Default read/write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeouts below this floor fall back to [`DEFAULT_TIMEOUT`].
const MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration consumed by the embedding listener.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ListenerConfig {
    /// Address and port to host the listener on.
    pub service_address: String,
    /// Maximum duration before timing out a request read.
    pub read_timeout: Duration,
    /// Maximum duration before timing out a response write.
    pub write_timeout: Duration,
    /// Maximum allowed request body size in bytes; zero selects the default.
    pub max_body_size: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            service_address: ":8186".to_string(),
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl ListenerConfig {
    /// Apply startup normalization: sub-second timeouts and a zero body
    /// limit fall back to their defaults.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.read_timeout < MIN_TIMEOUT {
            self.read_timeout = DEFAULT_TIMEOUT;
        }
        if self.write_timeout < MIN_TIMEOUT {
            self.write_timeout = DEFAULT_TIMEOUT;
        }
        if self.max_body_size == 0 {
            self.max_body_size = DEFAULT_MAX_BODY_SIZE;
        }
        self
    }
}
