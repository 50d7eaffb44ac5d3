mod danmu;
mod models;
mod site;

pub use danmu::{BilibiliChatClient, BilibiliDanmuProtocol, create_bilibili_chat_client};
pub use site::{BilibiliAdapter, Buvid, URL_REGEX};

pub const PLATFORM_ID: &str = "bilibili";
pub const PLATFORM_NAME: &str = "哔哩哔哩直播";
