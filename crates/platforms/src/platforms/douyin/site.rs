use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use reqwest::header::{COOKIE, REFERER, USER_AGENT};
use serde_json::{Value, json};
use std::sync::LazyLock;
use tracing::debug;

use super::models::{RoomData, SdkQuality, StreamUrl, WebEnterResponse};
use super::{PLATFORM_ID, PLATFORM_NAME};
use crate::adapter::{PlatformAdapter, ensure_platform};
use crate::config::PlatformConfig;
use crate::danmaku::{ChatClient, UnsupportedChatClient};
use crate::error::{PlatformError, Result};
use crate::http::{cookie_value, merge_cookie_headers, send_json, set_cookie_value};
use crate::identity::DeviceIdentityCache;
use crate::model::{Category, PlayQuality, PlayUrl, RoomDetail, RoomPage, SubCategory};
use crate::platforms::parse_count;

pub static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?live\.douyin\.com/([A-Za-z0-9_\-]+)").unwrap()
});

const LIVE_DOUYIN_URL: &str = "https://live.douyin.com/";
const WEBCAST_ENTER_URL: &str = "https://live.douyin.com/webcast/room/web/enter/";

const COMMON_PARAMS: [(&str, &str); 13] = [
    ("aid", "6383"),
    ("app_name", "douyin_web"),
    ("live_id", "1"),
    ("device_platform", "web"),
    ("language", "zh-CN"),
    ("enter_from", "web_live"),
    ("cookie_enabled", "true"),
    ("screen_width", "1920"),
    ("screen_height", "1080"),
    ("browser_language", "zh-CN"),
    ("browser_platform", "Win32"),
    ("browser_name", "Edge"),
    ("browser_version", "126.0.0.0"),
];

const MS_TOKEN_CHARS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const MS_TOKEN_LEN: usize = 107;

/// Legacy pull-URL keys, best first.
const LEGACY_QUALITIES: [(&str, &str); 4] = [
    ("FULL_HD1", "蓝光"),
    ("HD1", "超清"),
    ("SD1", "高清"),
    ("SD2", "标清"),
];

pub struct DouyinAdapter {
    client: Client,
    user_agent: String,
    cookie: Option<String>,
    ttwid: DeviceIdentityCache<String>,
}

impl DouyinAdapter {
    pub fn new(client: Client, config: &PlatformConfig) -> Self {
        let cookie = config.cookie(PLATFORM_ID).map(str::to_string);
        let ttwid = DeviceIdentityCache::new("douyin ttwid");
        // A user cookie that already carries ttwid makes the homepage fetch redundant.
        if let Some(value) = cookie.as_deref().and_then(|c| cookie_value(c, "ttwid")) {
            ttwid.seed(value);
        }
        Self {
            client,
            user_agent: config.user_agent().to_string(),
            cookie,
            ttwid,
        }
    }

    /// The live homepage hands out a `ttwid` cookie to anonymous visitors.
    async fn fetch_ttwid(&self) -> Result<String> {
        let response = self
            .client
            .get(LIVE_DOUYIN_URL)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?;
        let ttwid = set_cookie_value(response.headers(), "ttwid")
            .ok_or_else(|| PlatformError::upstream(-1, "douyin did not set a ttwid cookie"))?;
        debug!("Fetched douyin ttwid");
        Ok(ttwid)
    }

    async fn cookie_header(&self) -> Option<String> {
        let ttwid = self.ttwid.get_or_fetch(|| self.fetch_ttwid()).await;
        let identity = (!ttwid.is_empty()).then(|| format!("ttwid={ttwid}"));
        merge_cookie_headers(self.cookie.as_deref(), identity.as_deref())
    }

    /// The user's `msToken` when the cookie has one, else a random one.
    fn ms_token(&self) -> String {
        self.cookie
            .as_deref()
            .and_then(|c| cookie_value(c, "msToken"))
            .unwrap_or_else(random_ms_token)
    }

    async fn web_enter(&self, web_rid: &str) -> Result<RoomData> {
        let ms_token = self.ms_token();
        let mut request = self
            .client
            .get(WEBCAST_ENTER_URL)
            .query(&COMMON_PARAMS)
            .query(&[("web_rid", web_rid), ("msToken", ms_token.as_str())])
            .header(USER_AGENT, &self.user_agent)
            .header(REFERER, LIVE_DOUYIN_URL);
        if let Some(cookie) = self.cookie_header().await {
            request = request.header(COOKIE, cookie);
        }

        let resp: WebEnterResponse = send_json(request).await?;
        room_from(web_rid, resp)
    }
}

fn random_ms_token() -> String {
    (0..MS_TOKEN_LEN)
        .map(|_| MS_TOKEN_CHARS[rand::random::<u8>() as usize % MS_TOKEN_CHARS.len()] as char)
        .collect()
}

fn room_from(web_rid: &str, resp: WebEnterResponse) -> Result<RoomData> {
    let data = resp.data.ok_or_else(|| {
        PlatformError::upstream(resp.status_code, "douyin response has no data")
    })?;
    if resp.status_code != 0 {
        let message = data.prompts.unwrap_or_else(|| "unknown error".to_string());
        return Err(PlatformError::upstream(resp.status_code, message));
    }
    if let Some(prompts) = &data.prompts {
        debug!(web_rid, %prompts, "Douyin room unavailable");
        return Err(PlatformError::room_not_found(web_rid));
    }

    let mut room = data
        .data
        .into_iter()
        .next()
        .ok_or_else(|| PlatformError::room_not_found(web_rid))?;
    // The anchor profile sits next to the room list
    if room.owner.is_none() {
        room.owner = data.user;
    }
    if room.owner.as_ref().is_some_and(|o| o.is_cancelled()) {
        return Err(PlatformError::room_not_found(web_rid));
    }
    Ok(room)
}

fn detail_from(web_rid: &str, room: RoomData) -> RoomDetail {
    let mut detail = RoomDetail::new(PLATFORM_ID, web_rid);
    detail.title = room.title;
    detail.cover = room
        .cover
        .as_ref()
        .and_then(|c| c.first())
        .unwrap_or_default();
    if let Some(owner) = &room.owner {
        detail.user_name = owner.nickname.clone();
        detail.user_avatar = owner.avatar();
    }
    detail.online = room
        .user_count_str
        .as_deref()
        .map(parse_count)
        .unwrap_or_default();
    detail.status = room.status == 2;
    detail.url = format!("{LIVE_DOUYIN_URL}{web_rid}");
    detail.data = json!({
        "room_id": room.id_str,
        "stream_url": room.stream_url.unwrap_or(Value::Null),
    });
    detail
}

fn stream_url_of(detail: &RoomDetail) -> Result<Option<StreamUrl>> {
    match &detail.data["stream_url"] {
        Value::Null => Ok(None),
        value => Ok(Some(serde_json::from_value(value.clone())?)),
    }
}

fn sdk_qualities(stream: &StreamUrl) -> Vec<SdkQuality> {
    stream
        .live_core_sdk_data
        .as_ref()
        .map(|sdk| sdk.pull_data.options.qualities.clone())
        .unwrap_or_default()
}

fn qualities_from(stream: &StreamUrl) -> Vec<PlayQuality> {
    let mut qualities: Vec<PlayQuality> = sdk_qualities(stream)
        .into_iter()
        .map(|q| PlayQuality::new(q.name, q.sdk_key, q.level))
        .collect();

    if qualities.is_empty() {
        let count = LEGACY_QUALITIES.len() as i64;
        qualities = LEGACY_QUALITIES
            .iter()
            .enumerate()
            .filter(|(_, (key, _))| stream.flv_pull_url.contains_key(*key))
            .map(|(index, (key, label))| PlayQuality::new(*label, *key, count - index as i64))
            .collect();
    }

    qualities.sort_by(|a, b| b.sort.cmp(&a.sort));
    qualities
}

/// FLV before HLS. SDK stream data wins over the legacy maps.
fn urls_from(stream: &StreamUrl, key: &str) -> Vec<String> {
    let sdk = stream
        .live_core_sdk_data
        .as_ref()
        .and_then(|sdk| sdk.pull_data.stream_data.get(key));
    let (flv, hls) = match sdk {
        Some(main) => (Some(main.flv.clone()), Some(main.hls.clone())),
        None => (
            stream.flv_pull_url.get(key).cloned(),
            stream.hls_pull_url_map.get(key).cloned(),
        ),
    };

    [flv, hls]
        .into_iter()
        .flatten()
        .filter(|url| !url.is_empty())
        .collect()
}

#[async_trait]
impl PlatformAdapter for DouyinAdapter {
    fn id(&self) -> &'static str {
        PLATFORM_ID
    }

    fn name(&self) -> &'static str {
        PLATFORM_NAME
    }

    fn url_pattern(&self) -> &Regex {
        &URL_REGEX
    }

    async fn categories(&self) -> Result<Vec<Category>> {
        Err(PlatformError::unsupported("douyin categories"))
    }

    async fn category_rooms(&self, _category: &SubCategory, _page: u32) -> Result<RoomPage> {
        Err(PlatformError::unsupported("douyin category rooms"))
    }

    async fn recommend_rooms(&self, _page: u32) -> Result<RoomPage> {
        Err(PlatformError::unsupported("douyin recommended rooms"))
    }

    async fn search_rooms(&self, _keyword: &str, _page: u32) -> Result<RoomPage> {
        Err(PlatformError::unsupported("douyin room search"))
    }

    async fn room_detail(&self, room_id: &str) -> Result<RoomDetail> {
        let room = self.web_enter(room_id).await?;
        Ok(detail_from(room_id, room))
    }

    async fn play_qualities(&self, detail: &RoomDetail) -> Result<Vec<PlayQuality>> {
        ensure_platform(PLATFORM_ID, detail)?;
        Ok(stream_url_of(detail)?
            .map(|stream| qualities_from(&stream))
            .unwrap_or_default())
    }

    async fn play_urls(&self, detail: &RoomDetail, quality: &PlayQuality) -> Result<PlayUrl> {
        ensure_platform(PLATFORM_ID, detail)?;
        let urls = stream_url_of(detail)?
            .map(|stream| urls_from(&stream, &quality.data))
            .unwrap_or_default();
        Ok(PlayUrl::new(urls)
            .with_header("referer", LIVE_DOUYIN_URL)
            .with_header("user-agent", self.user_agent.clone()))
    }

    fn chat_client(&self) -> Box<dyn ChatClient> {
        Box::new(UnsupportedChatClient::new(PLATFORM_ID))
    }
}
