#![allow(dead_code)]

use serde::Deserialize;

use crate::error::{PlatformError, Result};

/// Envelope of every `api.live.bilibili.com` response.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Unwrap `data`, failing fast on a non-zero code.
    pub fn into_data(self) -> Result<T> {
        if self.code != 0 {
            let message = self
                .message
                .filter(|m| !m.is_empty())
                .or(self.msg)
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(PlatformError::upstream(self.code, message));
        }
        self.data
            .ok_or_else(|| PlatformError::upstream(-1, "response has no data"))
    }
}

#[derive(Debug, Deserialize)]
pub struct AreaParent {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub list: Vec<AreaChild>,
}

#[derive(Debug, Deserialize)]
pub struct AreaChild {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub parent_id: String,
    #[serde(default)]
    pub pic: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoomList {
    #[serde(default)]
    pub list: Vec<RoomListItem>,
    #[serde(default)]
    pub has_more: i64,
}

#[derive(Debug, Deserialize)]
pub struct RoomListItem {
    pub roomid: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub uname: String,
    #[serde(default)]
    pub online: u64,
}

#[derive(Debug, Deserialize)]
pub struct SearchData {
    #[serde(default)]
    pub result: Option<SearchResult>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub live_room: Option<Vec<RoomListItem>>,
}

#[derive(Debug, Deserialize)]
pub struct RoomInfoData {
    pub room_info: RoomInfo,
    #[serde(default)]
    pub anchor_info: Option<AnchorInfo>,
}

#[derive(Debug, Deserialize)]
pub struct RoomInfo {
    pub room_id: u64,
    #[serde(default)]
    pub short_id: u64,
    #[serde(default)]
    pub uid: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub cover: String,
    pub live_status: i64,
    #[serde(default)]
    pub online: u64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub live_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnchorInfo {
    pub base_info: AnchorBaseInfo,
}

#[derive(Debug, Deserialize)]
pub struct AnchorBaseInfo {
    #[serde(default)]
    pub uname: String,
    #[serde(default)]
    pub face: String,
}

#[derive(Debug, Deserialize)]
pub struct PlayInfoData {
    pub playurl_info: Option<PlayUrlInfo>,
}

#[derive(Debug, Deserialize)]
pub struct PlayUrlInfo {
    pub playurl: PlayUrlDetail,
}

#[derive(Debug, Deserialize)]
pub struct PlayUrlDetail {
    #[serde(default)]
    pub g_qn_desc: Vec<QualityDesc>,
    #[serde(default)]
    pub stream: Vec<PlayStream>,
}

#[derive(Debug, Deserialize)]
pub struct QualityDesc {
    pub qn: i64,
    pub desc: String,
}

#[derive(Debug, Deserialize)]
pub struct PlayStream {
    pub protocol_name: Option<String>,
    #[serde(default)]
    pub format: Vec<PlayFormat>,
}

#[derive(Debug, Deserialize)]
pub struct PlayFormat {
    pub format_name: Option<String>,
    #[serde(default)]
    pub codec: Vec<PlayCodec>,
}

#[derive(Debug, Deserialize)]
pub struct PlayCodec {
    pub codec_name: Option<String>,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub url_info: Vec<UrlInfo>,
    #[serde(default)]
    pub accept_qn: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UrlInfo {
    pub host: String,
    #[serde(default)]
    pub extra: String,
}

#[derive(Debug, Deserialize)]
pub struct DanmuInfoData {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub host_list: Vec<DanmuHost>,
}

#[derive(Debug, Deserialize)]
pub struct DanmuHost {
    pub host: String,
    #[serde(default)]
    pub wss_port: u16,
}

/// `x/frontend/finger/spi`
#[derive(Debug, Deserialize)]
pub struct BuvidData {
    #[serde(default)]
    pub b_3: Option<String>,
    #[serde(default)]
    pub b_4: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuperChatListData {
    #[serde(default)]
    pub list: Option<Vec<SuperChatItem>>,
}

#[derive(Debug, Deserialize)]
pub struct SuperChatItem {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub price: u64,
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub end_time: i64,
    #[serde(default)]
    pub background_color: String,
    #[serde(default)]
    pub background_bottom_color: String,
    pub user_info: SuperChatUser,
}

#[derive(Debug, Deserialize)]
pub struct SuperChatUser {
    #[serde(default)]
    pub uname: String,
    #[serde(default)]
    pub face: String,
}

/// Area ids come back as numbers from some endpoints and strings from others.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}
