use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use reqwest::header::{COOKIE, REFERER, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::LazyLock;
use tracing::debug;

use super::{PLATFORM_ID, PLATFORM_NAME};
use crate::adapter::{PlatformAdapter, ensure_page, ensure_platform};
use crate::config::PlatformConfig;
use crate::danmaku::{ChatClient, UnsupportedChatClient};
use crate::error::{PlatformError, Result};
use crate::http::{send_json, send_text};
use crate::model::{
    Category, PlayQuality, PlayUrl, RoomDetail, RoomItem, RoomPage, SubCategory,
};

pub static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.|m\.)?huya\.com/([A-Za-z0-9_]+)").unwrap()
});

static ROOM_DATA_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"var TT_ROOM_DATA = (\{.*?\});\s*var ").unwrap());
static PROFILE_INFO_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"var TT_PROFILE_INFO = (\{.*?\});\s*var ").unwrap());
static STREAM_DATA_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"stream: (\{.+)\n.*?};").unwrap());

const BASE_URL: &str = "https://www.huya.com/";
const CACHE_URL: &str = "https://www.huya.com/cache.php";
const BUSS_LIVE_URL: &str = "https://live.cdn.huya.com/liveconfig/game/bussLive";

/// Business types listed as top-level categories.
const BUSINESS_TYPES: [(u32, &str); 4] = [(1, "网游"), (2, "单机"), (8, "娱乐"), (3, "手游")];

const ORIGINAL_QUALITY: &str = "原画";
/// Bitrate 0 is the untranscoded stream.
const ORIGINAL_SORT: i64 = 100_000;

#[derive(Debug, Deserialize)]
struct HuyaResponse<T> {
    status: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

impl<T> HuyaResponse<T> {
    fn into_data(self) -> Result<T> {
        if self.status != 200 {
            let message = self
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(PlatformError::upstream(self.status, message));
        }
        self.data
            .ok_or_else(|| PlatformError::upstream(-1, "response has no data"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveListData {
    #[serde(default)]
    total_page: u32,
    #[serde(default)]
    datas: Vec<Value>,
}

pub struct HuyaAdapter {
    client: Client,
    user_agent: String,
    cookie: Option<String>,
}

impl HuyaAdapter {
    pub fn new(client: Client, config: &PlatformConfig) -> Self {
        Self {
            client,
            user_agent: config.user_agent().to_string(),
            cookie: config.cookie(PLATFORM_ID).map(str::to_string),
        }
    }

    async fn get_api<T: DeserializeOwned>(&self, url: &str, params: &[(&str, String)]) -> Result<T> {
        let resp: HuyaResponse<T> = send_json(
            self.client
                .get(url)
                .query(params)
                .header(USER_AGENT, &self.user_agent)
                .header(REFERER, BASE_URL),
        )
        .await?;
        resp.into_data()
    }

    async fn live_list(&self, game_id: Option<&str>, page: u32) -> Result<RoomPage> {
        let mut params = vec![
            ("m", "LiveList".to_string()),
            ("do", "getLiveListByPage".to_string()),
            ("tagAll", "0".to_string()),
            ("page", page.to_string()),
        ];
        if let Some(game_id) = game_id {
            params.push(("gameId", game_id.to_string()));
        }
        let data: LiveListData = self.get_api(CACHE_URL, &params).await?;
        Ok(live_page(data, page))
    }

    async fn fetch_room_page(&self, room_id: &str) -> Result<String> {
        let mut request = self
            .client
            .get(format!("{BASE_URL}{room_id}"))
            .header(USER_AGENT, &self.user_agent)
            .header(REFERER, BASE_URL);
        if let Some(cookie) = &self.cookie {
            request = request.header(COOKIE, cookie);
        }
        send_text(request).await
    }
}

/// Scalars as strings; Huya mixes numbers, numeric strings and `{"value": n}` wrappers.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Object(map) => map.get("value").map(text).unwrap_or_default(),
        _ => String::new(),
    }
}

fn count(value: &Value) -> u64 {
    text(value).parse().unwrap_or(0)
}

fn capture_json(regex: &Regex, html: &str) -> Option<Value> {
    let raw = regex.captures(html)?.get(1)?.as_str();
    serde_json::from_str(raw).ok()
}

fn live_page(data: LiveListData, page: u32) -> RoomPage {
    let items = data
        .datas
        .iter()
        .map(|room| {
            let introduction = text(&room["introduction"]);
            RoomItem {
                room_id: text(&room["profileRoom"]),
                title: if introduction.is_empty() {
                    text(&room["roomName"])
                } else {
                    introduction
                },
                cover: text(&room["screenshot"]),
                user_name: text(&room["nick"]),
                online: count(&room["totalCount"]),
            }
        })
        .filter(|item| !item.room_id.is_empty())
        .collect();
    RoomPage::new(items, page < data.total_page)
}

fn category_from(business_type: u32, name: &str, games: &[Value]) -> Category {
    let parent_id = business_type.to_string();
    Category {
        id: parent_id.clone(),
        name: name.to_string(),
        children: games
            .iter()
            .filter_map(|game| {
                let gid = text(&game["gid"]);
                (!gid.is_empty()).then(|| {
                    let pic = format!("https://huyaimg.msstatic.com/cdnimage/game/{gid}-MS.jpg");
                    SubCategory::new(gid, text(&game["gameFullName"]), &parent_id).with_pic(pic)
                })
            })
            .collect(),
    }
}

/// Build a detail from the room page HTML.
///
/// The stream list and bitrate table are kept in `data` for the play calls.
fn parse_room_page(room_id: &str, html: &str) -> Result<RoomDetail> {
    if html.contains("找不到这个主播") {
        return Err(PlatformError::room_not_found(room_id));
    }
    if html.contains("该主播涉嫌违规，正在整改中") {
        return Err(PlatformError::upstream(-1, "room is suspended"));
    }

    let room = capture_json(&ROOM_DATA_REGEX, html)
        .ok_or_else(|| PlatformError::other("huya room data not found in page"))?;
    let profile = capture_json(&PROFILE_INFO_REGEX, html).unwrap_or(Value::Null);
    let stream = capture_json(&STREAM_DATA_REGEX, html).unwrap_or(Value::Null);
    let live_info = &stream["data"][0]["gameLiveInfo"];

    let introduction = text(&room["introduction"]);
    let is_record = introduction.contains("【回放】");
    let profile_room = text(&room["profileRoom"]);
    let room_id = if profile_room.is_empty() {
        room_id.to_string()
    } else {
        profile_room
    };

    let mut detail = RoomDetail::new(PLATFORM_ID, &room_id);
    detail.title = Some(text(&live_info["roomName"]))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| introduction.clone());
    detail.cover = text(&live_info["screenshot"]);
    detail.user_name = Some(text(&profile["nick"]))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| text(&live_info["nick"]));
    detail.user_avatar = Some(text(&profile["avatar"]))
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| text(&live_info["avatar180"]));
    detail.online = count(&live_info["totalCount"]);
    detail.introduction = Some(introduction).filter(|i| !i.is_empty());
    detail.status = text(&room["state"]) == "ON" && !is_record;
    detail.is_record = is_record;
    detail.url = format!("{BASE_URL}{room_id}");
    detail.data = json!({
        "streams": stream["data"][0]["gameStreamInfoList"],
        "bitrates": stream["vMultiStreamInfo"],
    });
    Ok(detail)
}

fn qualities_from(detail: &RoomDetail) -> Vec<PlayQuality> {
    let mut qualities: Vec<PlayQuality> = detail.data["bitrates"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|rate| {
            let bitrate = count(&rate["iBitRate"]);
            let label = text(&rate["sDisplayName"]);
            let sort = if bitrate == 0 {
                ORIGINAL_SORT
            } else {
                bitrate as i64
            };
            PlayQuality::new(label, bitrate.to_string(), sort)
        })
        .collect();

    if qualities.is_empty() && detail.data["streams"].as_array().is_some_and(|s| !s.is_empty()) {
        qualities.push(PlayQuality::new(ORIGINAL_QUALITY, "0", ORIGINAL_SORT));
    }
    qualities.sort_by(|a, b| b.sort.cmp(&a.sort));
    qualities
}

/// FLV URL per CDN line, highest web priority first.
fn urls_from(detail: &RoomDetail, bitrate: &str) -> Vec<String> {
    let mut streams: Vec<&Value> = detail.data["streams"]
        .as_array()
        .map(|s| s.iter().collect())
        .unwrap_or_default();
    streams.sort_by_key(|s| std::cmp::Reverse(count(&s["iWebPriorityRate"])));

    streams
        .into_iter()
        .filter_map(|stream| {
            let name = text(&stream["sStreamName"]);
            let base = text(&stream["sFlvUrl"]);
            if name.is_empty() || base.is_empty() {
                return None;
            }
            let suffix = Some(text(&stream["sFlvUrlSuffix"]))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "flv".to_string());
            let anti_code = text(&stream["sFlvAntiCode"]).replace("&amp;", "&");

            let mut url = format!("{base}/{name}.{suffix}?{anti_code}");
            if bitrate != "0" {
                url.push_str(&format!("&ratio={bitrate}"));
            }
            Some(url)
        })
        .collect()
}

#[async_trait]
impl PlatformAdapter for HuyaAdapter {
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
        let mut categories = Vec::with_capacity(BUSINESS_TYPES.len());
        for (business_type, name) in BUSINESS_TYPES {
            let games: Vec<Value> = self
                .get_api(BUSS_LIVE_URL, &[("bussType", business_type.to_string())])
                .await?;
            categories.push(category_from(business_type, name, &games));
        }
        Ok(categories)
    }

    async fn category_rooms(&self, category: &SubCategory, page: u32) -> Result<RoomPage> {
        ensure_page(page)?;
        self.live_list(Some(&category.id), page).await
    }

    async fn recommend_rooms(&self, page: u32) -> Result<RoomPage> {
        ensure_page(page)?;
        self.live_list(None, page).await
    }

    async fn search_rooms(&self, _keyword: &str, _page: u32) -> Result<RoomPage> {
        Err(PlatformError::unsupported("huya room search"))
    }

    async fn room_detail(&self, room_id: &str) -> Result<RoomDetail> {
        let html = self.fetch_room_page(room_id).await?;
        let detail = parse_room_page(room_id, &html)?;
        debug!(room_id, live = detail.status, "Parsed huya room page");
        Ok(detail)
    }

    async fn play_qualities(&self, detail: &RoomDetail) -> Result<Vec<PlayQuality>> {
        ensure_platform(PLATFORM_ID, detail)?;
        Ok(qualities_from(detail))
    }

    async fn play_urls(&self, detail: &RoomDetail, quality: &PlayQuality) -> Result<PlayUrl> {
        ensure_platform(PLATFORM_ID, detail)?;
        Ok(PlayUrl::new(urls_from(detail, &quality.data))
            .with_header("referer", BASE_URL)
            .with_header("user-agent", self.user_agent.clone()))
    }

    fn chat_client(&self) -> Box<dyn ChatClient> {
        Box::new(UnsupportedChatClient::new(PLATFORM_ID))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::default_client;

    fn adapter() -> HuyaAdapter {
        let config = PlatformConfig::default();
        HuyaAdapter::new(default_client(&config).unwrap(), &config)
    }

    fn room_page(state: &str, introduction: &str) -> String {
        let room = json!({"state": state, "introduction": introduction, "profileRoom": "660000"});
        let profile = json!({"nick": "Anchor", "avatar": "https://huyaimg.msstatic.com/avatar.jpg", "lp": 1346609715});
        let stream = json!({
            "data": [{
                "gameLiveInfo": {
                    "roomName": "Title",
                    "nick": "Anchor",
                    "screenshot": "https://live-cover.msstatic.com/cover.jpg",
                    "totalCount": 4567,
                    "uid": 1346609715
                },
                "gameStreamInfoList": [
                    {"sCdnType": "AL", "iWebPriorityRate": 10, "sStreamName": "name-AL", "sFlvUrl": "https://al.flv.huya.com/src", "sFlvUrlSuffix": "flv", "sFlvAntiCode": "wsSecret=a&amp;wsTime=b"},
                    {"sCdnType": "HW", "iWebPriorityRate": 20, "sStreamName": "name-HW", "sFlvUrl": "https://hw.flv.huya.com/src", "sFlvUrlSuffix": "flv", "sFlvAntiCode": "wsSecret=c"},
                    {"sCdnType": "TX", "iWebPriorityRate": 5, "sStreamName": "", "sFlvUrl": "https://tx.flv.huya.com/src"}
                ]
            }],
            "vMultiStreamInfo": [
                {"sDisplayName": "蓝光4M", "iBitRate": 4000},
                {"sDisplayName": "原画", "iBitRate": 0},
                {"sDisplayName": "超清", "iBitRate": 2000}
            ]
        });
        format!(
            "<script>var TT_ROOM_DATA = {room};var TT_PROFILE_INFO = {profile};var TT_PLAYER_CFG = {{}};</script>\n\
             <script>window.hyPlayerConfig = {{\nstream: {stream}\n}};</script>"
        )
    }

    #[test]
    fn test_url_pattern() {
        let adapter = adapter();
        assert_eq!(
            adapter.extract_room_id("https://www.huya.com/660000").as_deref(),
            Some("660000")
        );
        assert_eq!(
            adapter.extract_room_id("https://www.huya.com/lpl").as_deref(),
            Some("lpl")
        );
        assert!(!adapter.supports_url("https://www.douyu.com/9999"));
    }

    #[test]
    fn test_parse_live_room_page() {
        let detail = parse_room_page("660000", &room_page("ON", "Intro")).unwrap();
        assert_eq!(detail.room_id, "660000");
        assert_eq!(detail.title, "Title");
        assert_eq!(detail.user_name, "Anchor");
        assert_eq!(detail.online, 4567);
        assert!(detail.status);
        assert!(!detail.is_record);
        assert_eq!(detail.data["streams"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_replay_is_not_live() {
        let detail = parse_room_page("660000", &room_page("ON", "【回放】Yesterday")).unwrap();
        assert!(!detail.status);
        assert!(detail.is_record);
    }

    #[test]
    fn test_missing_room_page() {
        assert!(matches!(
            parse_room_page("1", "<html>找不到这个主播</html>"),
            Err(PlatformError::RoomNotFound(_))
        ));
        assert!(matches!(
            parse_room_page("1", "<html></html>"),
            Err(PlatformError::Other(_))
        ));
    }

    #[test]
    fn test_qualities_and_urls() {
        let detail = parse_room_page("660000", &room_page("ON", "")).unwrap();
        let qualities = qualities_from(&detail);
        let labels: Vec<_> = qualities.iter().map(|q| q.label.as_str()).collect();
        assert_eq!(labels, vec!["原画", "蓝光4M", "超清"]);

        let urls = urls_from(&detail, &qualities[0].data);
        assert_eq!(
            urls,
            vec![
                "https://hw.flv.huya.com/src/name-HW.flv?wsSecret=c",
                "https://al.flv.huya.com/src/name-AL.flv?wsSecret=a&wsTime=b",
            ]
        );
        assert!(urls_from(&detail, "4000")[0].ends_with("&ratio=4000"));
    }

    #[test]
    fn test_live_page_and_categories() {
        let data: LiveListData = serde_json::from_value(json!({
            "page": 1,
            "totalPage": 3,
            "datas": [
                {"profileRoom": "660000", "introduction": "", "roomName": "Room", "screenshot": "c.jpg", "nick": "n", "totalCount": "1234"},
                {"profileRoom": "", "nick": "broken"}
            ]
        }))
        .unwrap();
        let page = live_page(data, 1);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].title, "Room");
        assert_eq!(page.items[0].online, 1234);
        assert!(page.has_more);

        let games = vec![json!({"gid": 1, "gameFullName": "英雄联盟"}), json!({"gid": {"value": 2336}, "gameFullName": "王者荣耀"})];
        let category = category_from(1, "网游", &games);
        assert_eq!(category.children[1].id, "2336");
        assert_eq!(category.children[0].parent_id, "1");
    }

    #[tokio::test]
    async fn test_search_and_chat_unsupported() {
        let adapter = adapter();
        assert!(adapter.search_rooms("lol", 1).await.unwrap_err().is_unsupported());
        let detail = RoomDetail::new(PLATFORM_ID, "660000");
        let client = adapter.chat_client();
        assert!(client.start(&detail).await.unwrap_err().is_unsupported());
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_room_detail() {
        let adapter = adapter();
        let detail = adapter.room_detail("660000").await.unwrap();
        println!("{detail:?}");
        let qualities = adapter.play_qualities(&detail).await.unwrap();
        println!("{qualities:?}");
    }
}
