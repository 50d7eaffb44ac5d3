//! Chat message types.
//!
//! Every platform's wire messages are normalized into [`ChatMessage`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Regular chat message
    Chat,
    /// Gift notification
    Gift,
    /// Viewer-count update
    Online,
    /// Super chat (paid highlighted message)
    SuperChat,
}

/// Normalized RGB color. No alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl MessageColor {
    pub const WHITE: Self = Self::new(0xff, 0xff, 0xff);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build from a `0xRRGGBB` value; bits above 24 are ignored.
    pub const fn from_rgb(value: u32) -> Self {
        Self::new((value >> 16) as u8, (value >> 8) as u8, value as u8)
    }

    /// Render as `#RRGGBB`.
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    pub fn is_white(&self) -> bool {
        *self == Self::WHITE
    }
}

impl Default for MessageColor {
    fn default() -> Self {
        Self::WHITE
    }
}

/// A single platform-agnostic chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub kind: MessageKind,
    pub user_name: String,
    pub message: String,
    /// Platform-specific payload (gift details, super chat price, viewer count, ...).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    pub color: MessageColor,
}

impl ChatMessage {
    pub fn chat(user_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Chat,
            user_name: user_name.into(),
            message: message.into(),
            data: Value::Null,
            color: MessageColor::WHITE,
        }
    }

    pub fn gift(user_name: impl Into<String>, gift_name: impl Into<String>, count: u64) -> Self {
        let gift_name = gift_name.into();
        Self {
            kind: MessageKind::Gift,
            user_name: user_name.into(),
            message: format!("{gift_name} x{count}"),
            data: serde_json::json!({ "gift_name": gift_name, "count": count }),
            color: MessageColor::WHITE,
        }
    }

    /// Viewer-count update. The count is carried as text and as a number in `data`.
    pub fn online(count: u64) -> Self {
        Self {
            kind: MessageKind::Online,
            user_name: String::new(),
            message: count.to_string(),
            data: Value::from(count),
            color: MessageColor::WHITE,
        }
    }

    pub fn super_chat(user_name: impl Into<String>, message: impl Into<String>, data: Value) -> Self {
        Self {
            kind: MessageKind::SuperChat,
            user_name: user_name.into(),
            message: message.into(),
            data,
            color: MessageColor::WHITE,
        }
    }

    pub fn with_color(mut self, color: MessageColor) -> Self {
        self.color = color;
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// A super chat, either live or from the platform's history endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperChatMessage {
    pub user_name: String,
    pub face: String,
    pub message: String,
    pub price: u64,
    /// Unix seconds.
    pub start_time: i64,
    /// Unix seconds.
    pub end_time: i64,
    pub background_color: String,
    pub background_bottom_color: String,
}
