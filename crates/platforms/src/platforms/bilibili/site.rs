use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use reqwest::header::{COOKIE, REFERER, USER_AGENT};
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

use super::danmu::create_bilibili_chat_client;
use super::models::{
    ApiResponse, AreaParent, BuvidData, DanmuInfoData, PlayInfoData, RoomInfoData, RoomList,
    RoomListItem, SearchData, SuperChatListData,
};
use super::{PLATFORM_ID, PLATFORM_NAME};
use crate::adapter::{PlatformAdapter, ensure_page, ensure_platform};
use crate::config::PlatformConfig;
use crate::danmaku::{ChatClient, sort_mcdn_last};
use crate::error::{PlatformError, Result};
use crate::http::{cookie_value, merge_cookie_headers, send_json};
use crate::identity::DeviceIdentityCache;
use crate::model::{
    Category, PlayQuality, PlayUrl, RoomDetail, RoomItem, RoomPage, SubCategory,
    SuperChatMessage,
};

pub static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.)?live\.bilibili\.com/(?:h5/)?(\d+)").unwrap()
});

const API_BASE: &str = "https://api.live.bilibili.com/";
const FINGER_SPI_URL: &str = "https://api.bilibili.com/x/frontend/finger/spi";
const REFERER_URL: &str = "https://live.bilibili.com/";
const UNKNOWN_QUALITY: &str = "未知清晰度";

/// Codes the room endpoints use for rooms that do not exist.
const ROOM_NOT_FOUND_CODES: [i64; 3] = [1, 60004, 19002000];

/// `buvid3`/`buvid4` device fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buvid {
    pub buvid3: String,
    pub buvid4: String,
}

impl Buvid {
    /// Fingerprint already present in a user cookie, if it has `buvid3`.
    fn from_cookie(cookie: &str) -> Option<Self> {
        let buvid3 = cookie_value(cookie, "buvid3").filter(|v| !v.is_empty())?;
        Some(Self {
            buvid3,
            buvid4: cookie_value(cookie, "buvid4").unwrap_or_default(),
        })
    }

    fn cookie(&self) -> Option<String> {
        (!self.buvid3.is_empty()).then(|| format!("buvid3={};buvid4={};", self.buvid3, self.buvid4))
    }
}

pub struct BilibiliAdapter {
    client: Client,
    user_agent: String,
    cookie: Option<String>,
    handshake_timeout: Duration,
    buvid: DeviceIdentityCache<Buvid>,
}

impl BilibiliAdapter {
    pub fn new(client: Client, config: &PlatformConfig) -> Self {
        let cookie = config.cookie(PLATFORM_ID).map(str::to_string);
        let buvid = DeviceIdentityCache::new("bilibili buvid");
        if let Some(seeded) = cookie.as_deref().and_then(Buvid::from_cookie) {
            debug!("Using buvid from configured cookie");
            buvid.seed(seeded);
        }
        Self {
            client,
            user_agent: config.user_agent().to_string(),
            cookie,
            handshake_timeout: config.handshake_timeout(),
            buvid,
        }
    }

    async fn fetch_buvid(&self) -> Result<Buvid> {
        let resp: ApiResponse<BuvidData> = send_json(
            self.client
                .get(FINGER_SPI_URL)
                .header(USER_AGENT, &self.user_agent)
                .header(REFERER, REFERER_URL),
        )
        .await?;
        let data = resp.into_data()?;
        debug!("Fetched bilibili buvid");
        Ok(Buvid {
            buvid3: data.b_3.unwrap_or_default(),
            buvid4: data.b_4.unwrap_or_default(),
        })
    }

    async fn buvid(&self) -> Buvid {
        self.buvid.get_or_fetch(|| self.fetch_buvid()).await
    }

    /// User cookie with the device fingerprint filling in missing keys.
    async fn cookie_header(&self) -> Option<String> {
        let buvid = self.buvid().await;
        merge_cookie_headers(self.cookie.as_deref(), buvid.cookie().as_deref())
    }

    async fn get_api<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let mut request = self
            .client
            .get(format!("{API_BASE}{path}"))
            .query(params)
            .header(USER_AGENT, &self.user_agent)
            .header(REFERER, REFERER_URL);
        if let Some(cookie) = self.cookie_header().await {
            request = request.header(COOKIE, cookie);
        }

        let resp: ApiResponse<T> = send_json(request).await?;
        resp.into_data()
    }

    async fn fetch_room_info(&self, room_id: &str) -> Result<RoomInfoData> {
        let params = [("room_id", room_id.to_string())];
        match self
            .get_api::<RoomInfoData>("xlive/web-room/v1/index/getInfoByRoom", &params)
            .await
        {
            Err(PlatformError::Upstream { code, message }) if ROOM_NOT_FOUND_CODES.contains(&code) => {
                debug!(room_id, code, %message, "Bilibili room not found");
                Err(PlatformError::room_not_found(room_id))
            }
            other => other,
        }
    }

    /// Chat server and token. Best effort: failures leave only the fingerprint.
    async fn fetch_danmaku_data(&self, real_room_id: u64) -> serde_json::Value {
        let buvid = self.buvid().await;
        let params = [("id", real_room_id.to_string()), ("type", "0".to_string())];
        match self
            .get_api::<DanmuInfoData>("xlive/web-room/v1/index/getDanmuInfo", &params)
            .await
        {
            Ok(info) => {
                let host = info.host_list.first();
                json!({
                    "host": host.map(|h| h.host.as_str()),
                    "wss_port": host.map(|h| h.wss_port),
                    "token": info.token,
                    "buvid": buvid.buvid3,
                })
            }
            Err(e) => {
                debug!(room_id = real_room_id, error = %e, "getDanmuInfo failed; using default chat server");
                json!({ "buvid": buvid.buvid3 })
            }
        }
    }

    async fn fetch_play_info(&self, detail: &RoomDetail, extra: &[(&str, &str)]) -> Result<PlayInfoData> {
        let mut params = vec![
            ("room_id", detail.room_id.clone()),
            ("platform", "web".to_string()),
        ];
        params.extend(extra.iter().map(|(k, v)| (*k, v.to_string())));
        self.get_api("xlive/web-room/v2/index/getRoomPlayInfo", &params)
            .await
    }
}

fn room_item(item: RoomListItem) -> RoomItem {
    RoomItem {
        room_id: item.roomid.to_string(),
        title: item.title,
        cover: format!("{}@400w.jpg", item.cover),
        user_name: item.uname,
        online: item.online,
    }
}

fn category_from(area: AreaParent) -> Category {
    Category {
        id: area.id,
        name: area.name,
        children: area
            .list
            .into_iter()
            .map(|sub| {
                let category = SubCategory::new(sub.id, sub.name, sub.parent_id);
                match sub.pic.filter(|p| !p.is_empty()) {
                    Some(pic) => category.with_pic(format!("{pic}@100w.png")),
                    None => category,
                }
            })
            .collect(),
    }
}

fn detail_from(room_id: &str, data: RoomInfoData) -> RoomDetail {
    let info = data.room_info;
    let (user_name, user_avatar) = data
        .anchor_info
        .map(|a| (a.base_info.uname, a.base_info.face))
        .unwrap_or_default();

    let mut detail = RoomDetail::new(PLATFORM_ID, info.room_id.to_string());
    detail.title = info.title;
    detail.cover = info.cover;
    detail.user_name = user_name;
    detail.user_avatar = user_avatar;
    detail.online = info.online;
    detail.introduction = info.description.filter(|d| !d.is_empty());
    detail.status = info.live_status == 1;
    detail.url = format!("https://live.bilibili.com/{room_id}");
    detail.show_time = info.live_time.filter(|t| !t.is_empty() && t != "0000-00-00 00:00:00");
    // Real room id for the chat handshake
    detail.data = json!(info.room_id.to_string());
    detail
}

fn qualities_from(data: PlayInfoData) -> Vec<PlayQuality> {
    let Some(info) = data.playurl_info else {
        return vec![];
    };
    let playurl = info.playurl;

    let names: FxHashMap<i64, String> = playurl
        .g_qn_desc
        .into_iter()
        .map(|q| (q.qn, q.desc))
        .collect();

    let accept_qn = playurl
        .stream
        .first()
        .and_then(|s| s.format.first())
        .and_then(|f| f.codec.first())
        .map(|c| c.accept_qn.clone())
        .unwrap_or_default();

    let mut qualities: Vec<PlayQuality> = accept_qn
        .into_iter()
        .map(|qn| {
            let label = names.get(&qn).map(String::as_str).unwrap_or(UNKNOWN_QUALITY);
            PlayQuality::new(label, qn.to_string(), qn)
        })
        .collect();
    qualities.sort_by(|a, b| b.sort.cmp(&a.sort));
    qualities
}

fn urls_from(data: PlayInfoData) -> Vec<String> {
    let Some(info) = data.playurl_info else {
        return vec![];
    };

    let mut urls: Vec<String> = info
        .playurl
        .stream
        .iter()
        .flat_map(|s| &s.format)
        .flat_map(|f| &f.codec)
        .flat_map(|c| {
            c.url_info
                .iter()
                .map(move |u| format!("{}{}{}", u.host, c.base_url, u.extra))
        })
        .collect();
    sort_mcdn_last(&mut urls);
    urls
}

#[async_trait]
impl PlatformAdapter for BilibiliAdapter {
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
        let params = [("need_entrance", "1".to_string()), ("parent_id", "0".to_string())];
        let areas: Vec<AreaParent> = self.get_api("room/v1/Area/getList", &params).await?;
        Ok(areas.into_iter().map(category_from).collect())
    }

    async fn category_rooms(&self, category: &SubCategory, page: u32) -> Result<RoomPage> {
        ensure_page(page)?;
        let params = [
            ("platform", "web".to_string()),
            ("parent_area_id", category.parent_id.clone()),
            ("area_id", category.id.clone()),
            ("sort_type", String::new()),
            ("page", page.to_string()),
        ];
        let list: RoomList = self
            .get_api("xlive/web-interface/v1/second/getList", &params)
            .await?;
        let has_more = list.has_more == 1;
        Ok(RoomPage::new(
            list.list.into_iter().map(room_item).collect(),
            has_more,
        ))
    }

    async fn recommend_rooms(&self, page: u32) -> Result<RoomPage> {
        ensure_page(page)?;
        let params = [
            ("platform", "web".to_string()),
            ("sort", "online".to_string()),
            ("page_size", "30".to_string()),
            ("page", page.to_string()),
        ];
        let list: RoomList = self
            .get_api("xlive/web-interface/v1/second/getListByArea", &params)
            .await?;
        let items: Vec<RoomItem> = list.list.into_iter().map(room_item).collect();
        let has_more = !items.is_empty();
        Ok(RoomPage::new(items, has_more))
    }

    async fn search_rooms(&self, keyword: &str, page: u32) -> Result<RoomPage> {
        ensure_page(page)?;
        let params = [
            ("keyword", keyword.to_string()),
            ("page", page.to_string()),
            ("page_size", "20".to_string()),
        ];
        let data: SearchData = self
            .get_api("xlive/web-interface/v1/search/searchRoom", &params)
            .await?;
        let items: Vec<RoomItem> = data
            .result
            .and_then(|r| r.live_room)
            .unwrap_or_default()
            .into_iter()
            .map(room_item)
            .collect();
        let has_more = !items.is_empty();
        Ok(RoomPage::new(items, has_more))
    }

    async fn room_detail(&self, room_id: &str) -> Result<RoomDetail> {
        let info = self.fetch_room_info(room_id).await?;
        let real_room_id = info.room_info.room_id;
        let mut detail = detail_from(room_id, info);
        detail.danmaku_data = self.fetch_danmaku_data(real_room_id).await;
        Ok(detail)
    }

    async fn play_qualities(&self, detail: &RoomDetail) -> Result<Vec<PlayQuality>> {
        ensure_platform(PLATFORM_ID, detail)?;
        let data = self
            .fetch_play_info(
                detail,
                &[("protocol", "0,1"), ("format", "0,1,2"), ("codec", "0,1")],
            )
            .await?;
        Ok(qualities_from(data))
    }

    async fn play_urls(&self, detail: &RoomDetail, quality: &PlayQuality) -> Result<PlayUrl> {
        ensure_platform(PLATFORM_ID, detail)?;
        let data = self
            .fetch_play_info(
                detail,
                &[
                    ("protocol", "0,1"),
                    ("format", "0,2"),
                    ("codec", "0"),
                    ("qn", quality.data.as_str()),
                ],
            )
            .await?;

        Ok(PlayUrl::new(urls_from(data))
            .with_header("referer", "https://live.bilibili.com")
            .with_header("user-agent", self.user_agent.clone()))
    }

    async fn live_status(&self, room_id: &str) -> Result<bool> {
        match self.fetch_room_info(room_id).await {
            Ok(info) => Ok(info.room_info.live_status == 1),
            Err(PlatformError::RoomNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn super_chat_messages(&self, room_id: &str) -> Result<Vec<SuperChatMessage>> {
        let params = [("room_id", room_id.to_string())];
        let data: SuperChatListData = self
            .get_api("av/v1/SuperChat/getMessageList", &params)
            .await?;

        Ok(data
            .list
            .unwrap_or_default()
            .into_iter()
            .map(|item| SuperChatMessage {
                user_name: item.user_info.uname,
                face: item.user_info.face,
                message: item.message,
                price: item.price,
                start_time: item.start_time,
                end_time: item.end_time,
                background_color: item.background_color,
                background_bottom_color: item.background_bottom_color,
            })
            .collect())
    }

    fn chat_client(&self) -> Box<dyn ChatClient> {
        Box::new(create_bilibili_chat_client(self.handshake_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::default_client;
    use serde_json::json;

    fn adapter() -> BilibiliAdapter {
        let config = PlatformConfig::default();
        BilibiliAdapter::new(default_client(&config).unwrap(), &config)
    }

    fn play_info() -> PlayInfoData {
        serde_json::from_value(json!({
            "playurl_info": {
                "playurl": {
                    "g_qn_desc": [
                        {"qn": 10000, "desc": "原画"},
                        {"qn": 400, "desc": "蓝光"},
                        {"qn": 150, "desc": "高清"}
                    ],
                    "stream": [{
                        "protocol_name": "http_stream",
                        "format": [{
                            "format_name": "flv",
                            "codec": [{
                                "codec_name": "avc",
                                "base_url": "/live-bvc/123.flv",
                                "accept_qn": [150, 10000, 250],
                                "url_info": [
                                    {"host": "https://xy1x2x3x4xy.mcdn.bilivideo.cn:486", "extra": "?a=1"},
                                    {"host": "https://cn-gddg-ct-01-01.bilivideo.com", "extra": "?b=2"}
                                ]
                            }]
                        }]
                    }]
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_url_pattern() {
        let adapter = adapter();
        assert!(adapter.supports_url("https://live.bilibili.com/6"));
        assert_eq!(
            adapter.extract_room_id("https://live.bilibili.com/h5/21452505?x=1").as_deref(),
            Some("21452505")
        );
        assert!(!adapter.supports_url("https://www.douyu.com/6"));
    }

    #[test]
    fn test_qualities_sorted_descending_with_unknown_label() {
        let qualities = qualities_from(play_info());
        let labels: Vec<_> = qualities.iter().map(|q| q.label.as_str()).collect();
        assert_eq!(labels, vec!["原画", UNKNOWN_QUALITY, "高清"]);
        assert_eq!(qualities[0].data, "10000");
        assert_eq!(qualities[1].sort, 250);
    }

    #[test]
    fn test_urls_concatenated_and_mcdn_last() {
        let urls = urls_from(play_info());
        assert_eq!(
            urls,
            vec![
                "https://cn-gddg-ct-01-01.bilivideo.com/live-bvc/123.flv?b=2",
                "https://xy1x2x3x4xy.mcdn.bilivideo.cn:486/live-bvc/123.flv?a=1",
            ]
        );
    }

    #[test]
    fn test_offline_room_has_no_qualities() {
        let data: PlayInfoData = serde_json::from_value(json!({"playurl_info": null})).unwrap();
        assert!(qualities_from(data).is_empty());
    }

    #[test]
    fn test_detail_from_room_info() {
        let data: RoomInfoData = serde_json::from_value(json!({
            "room_info": {
                "room_id": 7734200,
                "short_id": 6,
                "uid": 9617619,
                "title": "Title",
                "cover": "https://i0.hdslb.com/cover.jpg",
                "live_status": 1,
                "online": 1234,
                "description": "",
                "live_time": "2024-01-01 10:00:00"
            },
            "anchor_info": {"base_info": {"uname": "Anchor", "face": "https://i0.hdslb.com/face.jpg"}}
        }))
        .unwrap();

        let detail = detail_from("6", data);
        assert_eq!(detail.room_id, "7734200");
        assert_eq!(detail.user_name, "Anchor");
        assert!(detail.status);
        assert_eq!(detail.introduction, None);
        assert_eq!(detail.url, "https://live.bilibili.com/6");
        assert_eq!(detail.data, json!("7734200"));
    }

    #[test]
    fn test_category_pics_get_size_suffix() {
        let area: AreaParent = serde_json::from_value(json!({
            "id": 2,
            "name": "网游",
            "list": [
                {"id": "86", "name": "英雄联盟", "parent_id": "2", "pic": "https://i0.hdslb.com/lol.png"},
                {"id": "87", "name": "其他", "parent_id": "2", "pic": ""}
            ]
        }))
        .unwrap();

        let category = category_from(area);
        assert_eq!(
            category.children[0].pic.as_deref(),
            Some("https://i0.hdslb.com/lol.png@100w.png")
        );
        assert_eq!(category.children[1].pic, None);
    }

    #[test]
    fn test_buvid_cookie() {
        assert_eq!(Buvid::default().cookie(), None);
        let buvid = Buvid {
            buvid3: "B3".into(),
            buvid4: "B4".into(),
        };
        assert_eq!(buvid.cookie().as_deref(), Some("buvid3=B3;buvid4=B4;"));
        assert_eq!(
            merge_cookie_headers(Some("SESSDATA=s"), buvid.cookie().as_deref()).as_deref(),
            Some("SESSDATA=s; buvid3=B3; buvid4=B4")
        );
        assert_eq!(
            merge_cookie_headers(Some("buvid3=mine"), buvid.cookie().as_deref()).as_deref(),
            Some("buvid3=mine; buvid4=B4")
        );
    }

    #[tokio::test]
    async fn test_buvid_seeded_from_user_cookie() {
        let config = PlatformConfig::default()
            .with_cookie(PLATFORM_ID, "SESSDATA=s; buvid3=B3; buvid4=B4");
        let adapter = BilibiliAdapter::new(default_client(&config).unwrap(), &config);
        let expected = Buvid {
            buvid3: "B3".into(),
            buvid4: "B4".into(),
        };
        assert_eq!(adapter.buvid.get(), Some(&expected));
        // Served from the cache, finger/spi is never called.
        assert_eq!(adapter.buvid().await, expected);

        assert_eq!(Buvid::from_cookie("SESSDATA=s"), None);
        assert_eq!(Buvid::from_cookie("buvid3=; buvid4=x"), None);

        let anonymous = PlatformConfig::default();
        let adapter = BilibiliAdapter::new(default_client(&anonymous).unwrap(), &anonymous);
        assert!(adapter.buvid.get().is_none());
    }

    #[tokio::test]
    async fn test_play_urls_rejects_foreign_detail() {
        let adapter = adapter();
        let detail = RoomDetail::new("douyu", "1");
        let quality = PlayQuality::new("原画", "10000", 10000);
        assert!(matches!(
            adapter.play_urls(&detail, &quality).await,
            Err(PlatformError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_room_detail() {
        let adapter = adapter();
        let detail = adapter.room_detail("6").await.unwrap();
        println!("{detail:?}");
        let qualities = adapter.play_qualities(&detail).await.unwrap();
        println!("{qualities:?}");
    }
}
