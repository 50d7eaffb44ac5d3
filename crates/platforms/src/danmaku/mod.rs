pub mod connection;
pub mod normalize;
pub mod packet;

pub use connection::{
    ChatClient, ChatStream, ConnectionState, DanmuProtocol, ProtocolEvent, UnsupportedChatClient,
    WebSocketChatClient,
};
pub use normalize::{color_from_hex, color_from_packed, sort_mcdn_last};
