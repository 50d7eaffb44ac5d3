use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifies a room on a platform. Opaque to the core except as a lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomReference {
    pub platform_id: String,
    pub room_id: String,
}

impl RoomReference {
    pub fn new(platform_id: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            platform_id: platform_id.into(),
            room_id: room_id.into(),
        }
    }
}

impl fmt::Display for RoomReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform_id, self.room_id)
    }
}

/// A registered platform, as listed by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub name: String,
}

/// A room entry in listings and search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomItem {
    pub room_id: String,
    pub title: String,
    pub cover: String,
    pub user_name: String,
    pub online: u64,
}

/// One page of rooms.
///
/// `has_more` is a per-platform policy flag, not necessarily derived from upstream totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPage {
    pub items: Vec<RoomItem>,
    pub has_more: bool,
}

impl RoomPage {
    pub fn new(items: Vec<RoomItem>, has_more: bool) -> Self {
        Self { items, has_more }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorItem {
    pub room_id: String,
    pub user_name: String,
    pub avatar: String,
    pub followers: u64,
    pub is_live: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorPage {
    pub items: Vec<AnchorItem>,
    pub has_more: bool,
}

impl AnchorPage {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Full room information as returned by an adapter.
///
/// `data` and `danmaku_data` are opaque blobs the producing adapter uses to
/// re-enter its own API; nothing else interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDetail {
    pub platform_id: String,
    pub room_id: String,
    pub title: String,
    pub cover: String,
    pub user_name: String,
    pub user_avatar: String,
    pub online: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introduction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    /// Whether the room is live.
    pub status: bool,
    pub url: String,
    #[serde(default)]
    pub is_record: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_time: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub danmaku_data: Value,
}

impl RoomDetail {
    pub fn new(platform_id: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            platform_id: platform_id.into(),
            room_id: room_id.into(),
            title: String::new(),
            cover: String::new(),
            user_name: String::new(),
            user_avatar: String::new(),
            online: 0,
            introduction: None,
            notice: None,
            status: false,
            url: String::new(),
            is_record: false,
            show_time: None,
            data: Value::Null,
            danmaku_data: Value::Null,
        }
    }

    pub fn reference(&self) -> RoomReference {
        RoomReference::new(&self.platform_id, &self.room_id)
    }
}
