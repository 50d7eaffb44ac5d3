#![allow(dead_code)]

use serde::{Deserialize, Serialize};

use crate::error::{PlatformError, Result};

/// Envelope used by the `japi`/`gapi`/`lapi` endpoints. Some report the
/// status as `code`, others as `error`.
#[derive(Debug, Deserialize)]
pub struct DouyuResponse<T> {
    #[serde(alias = "code")]
    pub error: i64,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
}

impl<T> DouyuResponse<T> {
    pub fn into_data(self) -> Result<T> {
        if self.error != 0 {
            let message = self
                .msg
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(PlatformError::upstream(self.error, message));
        }
        self.data
            .ok_or_else(|| PlatformError::upstream(-1, "response has no data"))
    }
}

/// `m.douyu.com/api/cate/list`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CateListData {
    #[serde(default)]
    pub cate1_info: Vec<Cate1>,
    #[serde(default)]
    pub cate2_info: Vec<Cate2>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cate1 {
    pub cate1_id: i64,
    pub cate1_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cate2 {
    pub cate1_id: i64,
    pub cate2_id: i64,
    pub cate2_name: String,
    #[serde(default)]
    pub icon: String,
}

/// Directory listings (`mixList`, `allpage`).
#[derive(Debug, Deserialize)]
pub struct DirectoryData {
    #[serde(default)]
    pub rl: Vec<DirectoryRoom>,
    #[serde(default)]
    pub pgcnt: u32,
}

#[derive(Debug, Deserialize)]
pub struct DirectoryRoom {
    /// 1 for live rooms; other entries are ads and topic cards.
    #[serde(rename = "type", default)]
    pub kind: i64,
    #[serde(default)]
    pub rid: u64,
    #[serde(default)]
    pub rn: String,
    #[serde(default)]
    pub rs16: String,
    #[serde(default)]
    pub nn: String,
    #[serde(default)]
    pub ol: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchShowData {
    #[serde(default)]
    pub relate_show: Vec<SearchRoom>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRoom {
    pub rid: u64,
    #[serde(default)]
    pub room_name: String,
    #[serde(default)]
    pub room_src: String,
    #[serde(default)]
    pub nick_name: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub hot: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchUserData {
    #[serde(default)]
    pub relate_user: Vec<RelateUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelateUser {
    pub anchor_info: SearchAnchor,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAnchor {
    pub rid: u64,
    #[serde(default)]
    pub nick_name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub is_live: i64,
    #[serde(default, deserialize_with = "string_or_number")]
    pub fans_num_str: String,
}

/// Response from the betard API (`www.douyu.com/betard/{rid}`).
#[derive(Debug, Deserialize)]
pub struct BetardResponse {
    pub room: BetardRoom,
}

#[derive(Debug, Deserialize)]
pub struct BetardRoom {
    pub room_id: u64,
    #[serde(default, deserialize_with = "string_or_number")]
    pub room_name: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub owner_name: String,
    #[serde(default)]
    pub room_pic: String,
    #[serde(default)]
    pub avatar: Option<BetardAvatar>,
    pub show_status: u64,
    #[serde(rename = "videoLoop", default)]
    pub video_loop: u64,
    /// Unix seconds.
    #[serde(default)]
    pub show_time: i64,
    #[serde(default, deserialize_with = "string_or_number")]
    pub show_details: String,
    #[serde(default)]
    pub room_biz_all: Option<RoomBiz>,
}

#[derive(Debug, Deserialize)]
pub struct BetardAvatar {
    #[serde(default)]
    pub big: String,
}

#[derive(Debug, Deserialize)]
pub struct RoomBiz {
    #[serde(default, deserialize_with = "string_or_number")]
    pub hot: String,
}

/// `lapi/live/getH5PlayV1/{rid}`
#[derive(Debug, Deserialize)]
pub struct H5PlayData {
    pub room_id: u64,
    #[serde(default)]
    pub rtmp_url: String,
    #[serde(default)]
    pub rtmp_live: String,
    #[serde(rename = "cdnsWithName", default)]
    pub cdns: Vec<CdnWithName>,
    #[serde(default)]
    pub multirates: Vec<Multirate>,
}

#[derive(Debug, Deserialize)]
pub struct CdnWithName {
    pub name: String,
    pub cdn: String,
}

#[derive(Debug, Deserialize)]
pub struct Multirate {
    pub name: String,
    pub rate: i64,
}

/// Key material from `wgapi/livenc/liveweb/websec/getEncryption`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EncryptionData {
    pub rand_str: String,
    /// Number of MD5 iterations
    pub enc_time: u32,
    pub key: String,
    /// Special keys sign without the room/time salt
    #[serde(deserialize_with = "bool_or_int")]
    pub is_special: bool,
    pub enc_data: String,
}

/// Opaque quality token: the rate plus the CDNs that serve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityToken {
    pub rate: i64,
    pub cdns: Vec<String>,
}

/// Scalars become strings; objects and arrays become empty.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

fn bool_or_int<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_accepts_code_or_error() {
        let resp: DouyuResponse<DirectoryData> =
            serde_json::from_value(json!({"code": 0, "msg": "", "data": {"rl": [], "pgcnt": 3}}))
                .unwrap();
        assert_eq!(resp.into_data().unwrap().pgcnt, 3);

        let resp: DouyuResponse<DirectoryData> =
            serde_json::from_value(json!({"error": 101, "msg": "房间未开播"})).unwrap();
        match resp.into_data() {
            Err(PlatformError::Upstream { code, message }) => {
                assert_eq!(code, 101);
                assert_eq!(message, "房间未开播");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_betard_tolerates_odd_types() {
        let resp: BetardResponse = serde_json::from_value(json!({
            "room": {
                "room_id": 9999,
                "room_name": "Title",
                "owner_name": 12345,
                "room_pic": "https://rpic.douyucdn.cn/a.jpg",
                "avatar": {"big": "https://apic.douyucdn.cn/big.jpg"},
                "show_status": 1,
                "videoLoop": 0,
                "show_time": 1700000000,
                "show_details": [],
                "room_biz_all": {"hot": 523412}
            }
        }))
        .unwrap();
        assert_eq!(resp.room.owner_name, "12345");
        assert_eq!(resp.room.show_details, "");
        assert_eq!(resp.room.room_biz_all.unwrap().hot, "523412");
    }

    #[test]
    fn test_encryption_is_special_accepts_int() {
        let data: EncryptionData = serde_json::from_value(json!({
            "rand_str": "abc",
            "enc_time": 2,
            "key": "k",
            "is_special": 1,
            "enc_data": "e"
        }))
        .unwrap();
        assert!(data.is_special);
    }
}
