mod danmu;
mod models;
mod site;
pub mod stt;

pub use danmu::{DOUYU_WS_URL, DouyuChatClient, DouyuDanmuProtocol, create_douyu_chat_client};
pub use models::EncryptionData;
pub use site::{DOUYU_DEFAULT_DID, DouyuAdapter, DouyuIdentity, URL_REGEX, fallback_sign};

pub const PLATFORM_ID: &str = "douyu";
pub const PLATFORM_NAME: &str = "斗鱼直播";
