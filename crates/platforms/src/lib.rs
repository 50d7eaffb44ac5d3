//! Live platforms: one uniform API over BiliBili, Douyu, Huya and Douyin.
//!
//! ## Core Types
//!
//! - [`PlatformAdapter`] - Browse, search, resolve rooms and playback URLs
//! - [`AdapterRegistry`] - Dispatch by platform id or room URL
//! - [`ChatClient`] - Live chat feed for one room
//! - [`DeviceIdentityCache`] - Lazily fetched per-adapter fingerprint
//!
//! ## Danmaku
//!
//! - [`danmaku::packet`] - BiliBili binary frame codec
//! - [`danmaku::connection`] - Connection lifecycle shared by WebSocket chat clients
//! - [`danmaku::normalize`] - Color and CDN helpers shared by decoders
//!
//! ## Platforms
//!
//! - [`platforms::bilibili`], [`platforms::douyu`], [`platforms::huya`], [`platforms::douyin`]

pub mod adapter;
pub mod config;
pub mod danmaku;
pub mod error;
pub mod http;
pub mod identity;
pub mod model;
pub mod platforms;
pub mod registry;

pub use adapter::PlatformAdapter;
pub use config::PlatformConfig;
pub use danmaku::{ChatClient, ChatStream, ConnectionState};
pub use error::{PlatformError, Result};
pub use identity::DeviceIdentityCache;
pub use model::{
    AnchorItem, AnchorPage, Category, ChatMessage, MessageColor, MessageKind, PlayQuality,
    PlayUrl, RoomDetail, RoomItem, RoomPage, RoomReference, Site, SubCategory, SuperChatMessage,
};
pub use registry::AdapterRegistry;
