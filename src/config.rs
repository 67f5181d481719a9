//! Process configuration, taken from `SIOT_*` environment variables.
//!
//! Loading flow:
//! 1. Start with compiled [`FeedConfig::default()`]
//! 2. Merge `SIOT_`-prefixed environment variables over it
//!
//! There is no configuration file and there are no command-line flags.

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};

use std::time::Duration;

use crate::core::{DEFAULT_CONNECT_TIMEOUT, FeedError, FeedResult};
use crate::identity::PageLocation;

pub const ENV_PREFIX: &str = "SIOT_";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Host of the streaming endpoint (`SIOT_HOST`).
    pub host: String,
    /// Port of the streaming endpoint (`SIOT_PORT`).
    pub port: u16,
    /// Page location the channel id is derived from (`SIOT_LOCATION`).
    pub location: String,
    /// Static authorization token (`SIOT_TOKEN`).
    pub token: String,
    /// Default tracing filter; `RUST_LOG` still wins (`SIOT_LOG_LEVEL`).
    pub log_level: String,
    /// Upper bound on one websocket handshake (`SIOT_CONNECT_TIMEOUT_MS`).
    pub connect_timeout_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8000,
            location: "http://localhost:8000/".to_string(),
            token: "abc123".to_string(),
            log_level: "info".to_string(),
            connect_timeout_ms: duration_ms(DEFAULT_CONNECT_TIMEOUT),
        }
    }
}

impl FeedConfig {
    /// Load defaults overlaid with the process environment.
    pub fn load() -> FeedResult<Self> {
        Self::figment()
            .extract()
            .map_err(|err| FeedError::Config(err.to_string()))
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(FeedConfig::default())).merge(Env::prefixed(ENV_PREFIX))
    }

    /// `host:port` as it appears in the endpoint URL.
    pub fn endpoint_host(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn page_location(&self) -> PageLocation {
        PageLocation::new(self.location.clone(), self.token.clone())
    }
}

fn duration_ms(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}
