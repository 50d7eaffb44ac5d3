//! Platform-agnostic data model.

pub mod category;
pub mod message;
pub mod play;
pub mod room;

pub use category::{Category, SubCategory};
pub use message::{ChatMessage, MessageColor, MessageKind, SuperChatMessage};
pub use play::{PlayQuality, PlayUrl};
pub use room::{AnchorItem, AnchorPage, RoomDetail, RoomItem, RoomPage, RoomReference, Site};
