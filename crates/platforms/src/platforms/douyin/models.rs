#![allow(dead_code)]

use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// `webcast/room/web/enter`
#[derive(Debug, Deserialize)]
pub struct WebEnterResponse {
    #[serde(default)]
    pub status_code: i64,
    #[serde(default)]
    pub data: Option<WebEnterData>,
}

#[derive(Debug, Deserialize)]
pub struct WebEnterData {
    #[serde(default)]
    pub prompts: Option<String>,
    #[serde(default)]
    pub data: Vec<RoomData>,
    #[serde(default)]
    pub user: Option<UserInfo>,
}

#[derive(Debug, Deserialize)]
pub struct RoomData {
    #[serde(default)]
    pub id_str: String,
    /// 2 while live
    pub status: i32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub cover: Option<UrlList>,
    #[serde(default)]
    pub user_count_str: Option<String>,
    #[serde(default)]
    pub owner: Option<UserInfo>,
    /// Kept raw; parsed as [`StreamUrl`] when qualities are requested.
    #[serde(default)]
    pub stream_url: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub avatar_thumb: Option<UrlList>,
}

impl UserInfo {
    /// Deactivated accounts keep their room but show a placeholder profile.
    pub fn is_cancelled(&self) -> bool {
        self.nickname == "账号已注销"
            && self
                .avatar_thumb
                .as_ref()
                .is_some_and(|a| a.url_list.iter().any(|u| u.contains("aweme_default_avatar.png")))
    }

    pub fn avatar(&self) -> String {
        self.avatar_thumb
            .as_ref()
            .and_then(UrlList::first)
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UrlList {
    #[serde(default)]
    pub url_list: Vec<String>,
}

impl UrlList {
    pub fn first(&self) -> Option<String> {
        self.url_list.first().cloned()
    }
}

#[derive(Debug, Deserialize)]
pub struct StreamUrl {
    #[serde(default)]
    pub flv_pull_url: FxHashMap<String, String>,
    #[serde(default)]
    pub hls_pull_url_map: FxHashMap<String, String>,
    #[serde(default)]
    pub live_core_sdk_data: Option<LiveCoreSdkData>,
}

#[derive(Debug, Deserialize)]
pub struct LiveCoreSdkData {
    pub pull_data: SdkPullData,
}

#[derive(Debug, Deserialize)]
pub struct SdkPullData {
    #[serde(default)]
    pub options: StreamOptions,
    #[serde(default, deserialize_with = "embedded_stream_data")]
    pub stream_data: FxHashMap<String, StreamDataMain>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamOptions {
    #[serde(default)]
    pub qualities: Vec<SdkQuality>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SdkQuality {
    pub name: String,
    pub sdk_key: String,
    #[serde(default)]
    pub level: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamDataMain {
    #[serde(default)]
    pub flv: String,
    #[serde(default)]
    pub hls: String,
}

/// `stream_data` is a JSON document inside a string:
/// `{"common": {...}, "data": {"origin": {"main": {"flv": ...}}}}`.
/// Entries that fail to parse are skipped.
fn embedded_stream_data<'de, D>(
    deserializer: D,
) -> std::result::Result<FxHashMap<String, StreamDataMain>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let Ok(Value::Object(mut doc)) = serde_json::from_str::<Value>(&raw) else {
        return Ok(FxHashMap::default());
    };
    let Some(Value::Object(data)) = doc.remove("data") else {
        return Ok(FxHashMap::default());
    };

    Ok(data
        .into_iter()
        .filter_map(|(key, mut quality)| {
            let main = serde_json::from_value(quality.get_mut("main")?.take()).ok()?;
            Some((key, main))
        })
        .collect())
}
