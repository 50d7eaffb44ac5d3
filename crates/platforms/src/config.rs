use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::http::DEFAULT_UA;

/// Library-level settings shared by every adapter built from one registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Overrides the built-in desktop browser user agent.
    pub user_agent: Option<String>,
    pub request_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    /// User cookies keyed by platform id. These win over fetched device identity.
    pub cookies: FxHashMap<String, String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            request_timeout_secs: 30,
            handshake_timeout_secs: 5,
            cookies: FxHashMap::default(),
        }
    }
}

impl PlatformConfig {
    pub fn with_cookie(mut self, platform_id: impl Into<String>, cookie: impl Into<String>) -> Self {
        self.cookies.insert(platform_id.into(), cookie.into());
        self
    }

    pub fn cookie(&self, platform_id: &str) -> Option<&str> {
        self.cookies
            .get(platform_id)
            .map(String::as_str)
            .filter(|c| !c.trim().is_empty())
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_UA)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}
