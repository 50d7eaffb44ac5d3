//! The uniform per-platform contract.

use async_trait::async_trait;
use regex::Regex;

use crate::danmaku::ChatClient;
use crate::error::{PlatformError, Result};
use crate::model::{
    AnchorPage, Category, PlayQuality, PlayUrl, RoomDetail, RoomPage, SubCategory,
    SuperChatMessage,
};

/// One streaming platform behind a uniform async API.
///
/// Pages are 1-based. A search with no matches is an empty page, not an error.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Stable platform id, e.g. `"bilibili"`.
    fn id(&self) -> &'static str;

    /// Display name.
    fn name(&self) -> &'static str;

    /// Pattern matching room URLs; the first capture group is the room id.
    fn url_pattern(&self) -> &Regex;

    fn supports_url(&self, url: &str) -> bool {
        self.url_pattern().is_match(url)
    }

    fn extract_room_id(&self, url: &str) -> Option<String> {
        self.url_pattern()
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    async fn categories(&self) -> Result<Vec<Category>>;

    async fn category_rooms(&self, category: &SubCategory, page: u32) -> Result<RoomPage>;

    async fn recommend_rooms(&self, page: u32) -> Result<RoomPage>;

    async fn search_rooms(&self, keyword: &str, page: u32) -> Result<RoomPage>;

    /// Platforms without anchor search return an empty page.
    async fn search_anchors(&self, _keyword: &str, _page: u32) -> Result<AnchorPage> {
        Ok(AnchorPage::empty())
    }

    /// Fails with `RoomNotFound` for unknown rooms.
    async fn room_detail(&self, room_id: &str) -> Result<RoomDetail>;

    async fn play_qualities(&self, detail: &RoomDetail) -> Result<Vec<PlayQuality>>;

    /// URLs for one quality, best first.
    async fn play_urls(&self, detail: &RoomDetail, quality: &PlayQuality) -> Result<PlayUrl>;

    /// Offline or nonexistent rooms are `Ok(false)`; other failures propagate.
    async fn live_status(&self, room_id: &str) -> Result<bool> {
        match self.room_detail(room_id).await {
            Ok(detail) => Ok(detail.status),
            Err(PlatformError::RoomNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn super_chat_messages(&self, _room_id: &str) -> Result<Vec<SuperChatMessage>> {
        Ok(vec![])
    }

    /// A fresh, unconnected chat client for one room.
    fn chat_client(&self) -> Box<dyn ChatClient>;
}

/// Reject room details produced by another adapter.
pub(crate) fn ensure_platform(adapter_id: &str, detail: &RoomDetail) -> Result<()> {
    if detail.platform_id == adapter_id {
        Ok(())
    } else {
        Err(PlatformError::invalid_argument(format!(
            "room detail belongs to {}, not {adapter_id}",
            detail.platform_id
        )))
    }
}

/// Reject page 0.
pub(crate) fn ensure_page(page: u32) -> Result<()> {
    if page == 0 {
        Err(PlatformError::invalid_argument("pages start at 1"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_platform() {
        let detail = RoomDetail::new("huya", "1");
        assert!(ensure_platform("huya", &detail).is_ok());
        assert!(matches!(
            ensure_platform("bilibili", &detail),
            Err(PlatformError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_ensure_page() {
        assert!(ensure_page(1).is_ok());
        assert!(ensure_page(0).is_err());
    }
}
