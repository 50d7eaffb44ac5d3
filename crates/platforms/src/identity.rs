//! Lazily fetched per-adapter device identity (fingerprint cookies, device ids).
//!
//! The first caller performs the fetch; concurrent callers await the same
//! attempt instead of issuing their own. A failed fetch is not cached: that
//! caller proceeds with the empty identity and a later call retries.
//! Values never expire.

use std::future::Future;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug)]
pub struct DeviceIdentityCache<T> {
    label: &'static str,
    cell: OnceCell<T>,
}

impl<T> DeviceIdentityCache<T>
where
    T: Clone + Default,
{
    pub const fn new(label: &'static str) -> Self {
        Self {
            label,
            cell: OnceCell::const_new(),
        }
    }

    /// Cached identity, fetching it on first use.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.cell.get_or_try_init(fetch).await {
            Ok(identity) => identity.clone(),
            Err(e) => {
                warn!(identity = self.label, error = %e, "Device identity fetch failed; continuing without it");
                T::default()
            }
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Seed the cache, e.g. from a user-supplied cookie. No-op once populated.
    pub fn seed(&self, identity: T) {
        if self.cell.set(identity).is_err() {
            debug!(identity = self.label, "Device identity already cached; seed ignored");
        }
    }
}
