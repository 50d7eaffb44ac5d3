//! Registry of platform adapters, keyed by platform id.

use std::sync::Arc;

use tracing::debug;

use crate::adapter::PlatformAdapter;
use crate::config::PlatformConfig;
use crate::error::{PlatformError, Result};
use crate::http::default_client;
use crate::model::{RoomReference, Site};
use crate::platforms::{bilibili, douyin, douyu, huya};

/// Owns one adapter per platform for the life of the process.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Registry with every built-in platform, sharing one HTTP client.
    pub fn with_config(config: &PlatformConfig) -> Result<Self> {
        let client = default_client(config)?;
        let mut registry = Self::new();
        registry.register(Arc::new(bilibili::BilibiliAdapter::new(client.clone(), config)));
        registry.register(Arc::new(douyu::DouyuAdapter::new(client.clone(), config)));
        registry.register(Arc::new(huya::HuyaAdapter::new(client.clone(), config)));
        registry.register(Arc::new(douyin::DouyinAdapter::new(client, config)));
        Ok(registry)
    }

    /// Register an adapter, replacing any earlier one with the same id.
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        if let Some(slot) = self.adapters.iter_mut().find(|a| a.id() == adapter.id()) {
            debug!(platform = adapter.id(), "Replacing registered adapter");
            *slot = adapter;
        } else {
            self.adapters.push(adapter);
        }
    }

    /// Adapter for a platform id. Ids are matched case-insensitively.
    pub fn get(&self, platform_id: &str) -> Result<Arc<dyn PlatformAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.id().eq_ignore_ascii_case(platform_id))
            .cloned()
            .ok_or_else(|| PlatformError::UnknownPlatform(platform_id.to_string()))
    }

    /// Adapter and room reference for a room URL.
    pub fn resolve(&self, url: &str) -> Result<(Arc<dyn PlatformAdapter>, RoomReference)> {
        let url = url.trim();
        for adapter in &self.adapters {
            if let Some(room_id) = adapter.extract_room_id(url) {
                let reference = RoomReference::new(adapter.id(), room_id);
                return Ok((adapter.clone(), reference));
            }
        }
        Err(PlatformError::UnknownPlatform(url.to_string()))
    }

    /// Registered platforms, in registration order.
    pub fn sites(&self) -> Vec<Site> {
        self.adapters
            .iter()
            .map(|a| Site {
                id: a.id().to_string(),
                name: a.name().to_string(),
            })
            .collect()
    }
}
