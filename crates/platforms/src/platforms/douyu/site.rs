use async_trait::async_trait;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use regex::Regex;
use reqwest::header::{COOKIE, REFERER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

use super::danmu::create_douyu_chat_client;
use super::models::{
    BetardResponse, BetardRoom, CateListData, DirectoryData, DirectoryRoom, DouyuResponse,
    EncryptionData, H5PlayData, QualityToken, SearchShowData, SearchUserData,
};
use super::{PLATFORM_ID, PLATFORM_NAME};
use crate::adapter::{PlatformAdapter, ensure_page, ensure_platform};
use crate::config::PlatformConfig;
use crate::danmaku::ChatClient;
use crate::error::{PlatformError, Result};
use crate::http::{merge_cookie_headers, send_json};
use crate::identity::DeviceIdentityCache;
use crate::model::{
    AnchorItem, AnchorPage, Category, PlayQuality, PlayUrl, RoomDetail, RoomItem, RoomPage,
    SubCategory,
};
use crate::platforms::parse_count;

pub static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.|m\.)?douyu\.com/(\d+)").unwrap()
});

const BASE_URL: &str = "https://www.douyu.com/";
const CATE_LIST_URL: &str = "https://m.douyu.com/api/cate/list";
const ENCRYPTION_URL: &str = "https://www.douyu.com/wgapi/livenc/liveweb/websec/getEncryption";
const SEARCH_REFERER: &str = "https://www.douyu.com/search/";
const PLAYER_VERSION: &str = "219032101";
const SEARCH_PAGE_SIZE: &str = "20";

pub const DOUYU_DEFAULT_DID: &str = "10000000000000000000000000001501";

/// Device id plus the key material used to sign play requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DouyuIdentity {
    pub did: String,
    pub encryption: EncryptionData,
}

impl DouyuIdentity {
    fn did(&self) -> &str {
        if self.did.is_empty() {
            DOUYU_DEFAULT_DID
        } else {
            &self.did
        }
    }

    fn cookie(&self) -> String {
        format!("dy_did={0}; acf_did={0}", self.did())
    }
}

/// Sign a play request without a JS engine.
///
/// The secret is `rand_str` hashed `enc_time` times with the key appended,
/// then the auth is `md5(secret + key + salt)` where the salt is `rid + ts`
/// unless the key is special.
pub fn fallback_sign(enc: &EncryptionData, rid: u64, ts: i64) -> String {
    let mut secret = enc.rand_str.clone();
    for _ in 0..enc.enc_time {
        let mut hasher = Md5::new();
        hasher.update(format!("{}{}", secret, enc.key).as_bytes());
        secret = format!("{:x}", hasher.finalize());
    }

    let salt = if enc.is_special {
        String::new()
    } else {
        format!("{rid}{ts}")
    };

    let mut hasher = Md5::new();
    hasher.update(format!("{}{}{}", secret, enc.key, salt).as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct DouyuAdapter {
    client: Client,
    user_agent: String,
    cookie: Option<String>,
    handshake_timeout: Duration,
    identity: DeviceIdentityCache<DouyuIdentity>,
}

impl DouyuAdapter {
    pub fn new(client: Client, config: &PlatformConfig) -> Self {
        Self {
            client,
            user_agent: config.user_agent().to_string(),
            cookie: config.cookie(PLATFORM_ID).map(str::to_string),
            handshake_timeout: config.handshake_timeout(),
            identity: DeviceIdentityCache::new("douyu encryption key"),
        }
    }

    async fn fetch_identity(&self) -> Result<DouyuIdentity> {
        let resp: DouyuResponse<EncryptionData> = send_json(
            self.client
                .get(ENCRYPTION_URL)
                .query(&[("did", DOUYU_DEFAULT_DID)])
                .header(USER_AGENT, &self.user_agent)
                .header(REFERER, BASE_URL),
        )
        .await?;
        let encryption = resp.into_data()?;
        debug!(enc_time = encryption.enc_time, "Fetched douyu encryption key");
        Ok(DouyuIdentity {
            did: DOUYU_DEFAULT_DID.to_string(),
            encryption,
        })
    }

    async fn identity(&self) -> DouyuIdentity {
        self.identity.get_or_fetch(|| self.fetch_identity()).await
    }

    async fn get_api<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
        referer: &str,
        cookie: Option<String>,
    ) -> Result<T> {
        let mut request = self
            .client
            .get(url)
            .query(params)
            .header(USER_AGENT, &self.user_agent)
            .header(REFERER, referer);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        let resp: DouyuResponse<T> = send_json(request).await?;
        resp.into_data()
    }

    /// Search endpoints reject requests without a device id cookie.
    async fn search_cookie(&self) -> Option<String> {
        let identity = self.identity().await;
        merge_cookie_headers(self.cookie.as_deref(), Some(&identity.cookie()))
    }

    async fn directory(&self, url: String, page: u32) -> Result<RoomPage> {
        let data: DirectoryData = self.get_api(&url, &[], BASE_URL, None).await?;
        Ok(directory_page(data, page))
    }

    async fn fetch_betard(&self, room_id: &str) -> Result<BetardRoom> {
        let rid: u64 = room_id
            .parse()
            .map_err(|_| PlatformError::room_not_found(room_id))?;

        let response = self
            .client
            .get(format!("{BASE_URL}betard/{rid}"))
            .header(USER_AGENT, &self.user_agent)
            .header(REFERER, BASE_URL)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(PlatformError::room_not_found(room_id));
        }

        let body = response.error_for_status()?.text().await?;
        let value: Value = serde_json::from_str(&body)?;
        if value.get("room").is_none_or(Value::is_null) {
            debug!(room_id, "Douyu betard returned no room");
            return Err(PlatformError::room_not_found(room_id));
        }
        let resp: BetardResponse = serde_json::from_value(value)?;
        Ok(resp.room)
    }

    async fn fetch_play_info(&self, rid: u64, cdn: &str, rate: i64) -> Result<H5PlayData> {
        let identity = self.identity().await;
        if identity.encryption.key.is_empty() {
            return Err(PlatformError::other("douyu encryption key unavailable"));
        }

        let ts = Utc::now().timestamp();
        let form = [
            ("enc_data", identity.encryption.enc_data.clone()),
            ("tt", ts.to_string()),
            ("did", identity.did().to_string()),
            ("auth", fallback_sign(&identity.encryption, rid, ts)),
            ("cdn", cdn.to_string()),
            ("rate", rate.to_string()),
            ("ver", PLAYER_VERSION.to_string()),
            ("iar", "0".to_string()),
            ("ive", "0".to_string()),
            ("rid", rid.to_string()),
            ("hevc", "0".to_string()),
            ("fa", "0".to_string()),
            ("sov", "0".to_string()),
        ];

        let resp: DouyuResponse<H5PlayData> = send_json(
            self.client
                .post(format!("{BASE_URL}lapi/live/getH5PlayV1/{rid}"))
                .header(USER_AGENT, &self.user_agent)
                .header(REFERER, BASE_URL)
                .form(&form),
        )
        .await?;
        resp.into_data()
    }
}

fn room_id_of(detail: &RoomDetail) -> Result<u64> {
    detail.room_id.parse().map_err(|_| {
        PlatformError::invalid_argument(format!("invalid douyu room id: {}", detail.room_id))
    })
}

fn room_item(room: DirectoryRoom) -> RoomItem {
    RoomItem {
        room_id: room.rid.to_string(),
        title: room.rn,
        cover: room.rs16,
        user_name: room.nn,
        online: room.ol,
    }
}

fn directory_page(data: DirectoryData, page: u32) -> RoomPage {
    let items = data
        .rl
        .into_iter()
        .filter(|room| room.kind == 1)
        .map(room_item)
        .collect();
    RoomPage::new(items, page < data.pgcnt)
}

fn categories_from(data: CateListData) -> Vec<Category> {
    data.cate1_info
        .into_iter()
        .map(|parent| {
            let parent_id = parent.cate1_id.to_string();
            let children = data
                .cate2_info
                .iter()
                .filter(|sub| sub.cate1_id == parent.cate1_id)
                .map(|sub| {
                    let category =
                        SubCategory::new(sub.cate2_id.to_string(), &sub.cate2_name, &parent_id);
                    if sub.icon.is_empty() {
                        category
                    } else {
                        category.with_pic(&sub.icon)
                    }
                })
                .collect();
            Category {
                id: parent_id,
                name: parent.cate1_name,
                children,
            }
        })
        .collect()
}

fn detail_from(room: BetardRoom) -> RoomDetail {
    let room_id = room.room_id.to_string();
    let mut detail = RoomDetail::new(PLATFORM_ID, &room_id);
    detail.title = room.room_name;
    detail.cover = room.room_pic;
    detail.user_name = room.owner_name;
    detail.user_avatar = room.avatar.map(|a| a.big).unwrap_or_default();
    detail.online = room
        .room_biz_all
        .map(|biz| parse_count(&biz.hot))
        .unwrap_or_default();
    detail.introduction = Some(room.show_details).filter(|d| !d.trim().is_empty());
    // videoLoop rooms replay recordings while show_status stays 1
    detail.status = room.show_status == 1 && room.video_loop == 0;
    detail.is_record = room.video_loop == 1;
    detail.url = format!("https://www.douyu.com/{room_id}");
    detail.show_time = (room.show_time > 0)
        .then(|| DateTime::from_timestamp(room.show_time, 0))
        .flatten()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string());
    detail.data = json!(room_id);
    detail
}

/// One quality per rate, best first. Every quality lists all CDNs, `scdn` last.
fn qualities_from(data: &H5PlayData) -> Result<Vec<PlayQuality>> {
    let mut cdns: Vec<String> = data.cdns.iter().map(|c| c.cdn.clone()).collect();
    cdns.sort_by_key(|cdn| cdn.contains("scdn"));

    let count = data.multirates.len() as i64;
    data.multirates
        .iter()
        .enumerate()
        .map(|(index, rate)| {
            let token = QualityToken {
                rate: rate.rate,
                cdns: cdns.clone(),
            };
            Ok(PlayQuality::new(
                &rate.name,
                serde_json::to_string(&token)?,
                count - index as i64,
            ))
        })
        .collect()
}

fn stream_url(data: &H5PlayData) -> Option<String> {
    if data.rtmp_url.is_empty() || data.rtmp_live.is_empty() {
        return None;
    }
    Some(format!(
        "{}/{}",
        data.rtmp_url,
        data.rtmp_live.replace("&amp;", "&")
    ))
}

#[async_trait]
impl PlatformAdapter for DouyuAdapter {
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
        let data: CateListData = self
            .get_api(CATE_LIST_URL, &[], "https://m.douyu.com/", None)
            .await?;
        Ok(categories_from(data))
    }

    async fn category_rooms(&self, category: &SubCategory, page: u32) -> Result<RoomPage> {
        ensure_page(page)?;
        self.directory(
            format!("{BASE_URL}gapi/rkc/directory/mixList/2_{}/{page}", category.id),
            page,
        )
        .await
    }

    async fn recommend_rooms(&self, page: u32) -> Result<RoomPage> {
        ensure_page(page)?;
        self.directory(format!("{BASE_URL}japi/weblist/apinc/allpage/6/{page}"), page)
            .await
    }

    async fn search_rooms(&self, keyword: &str, page: u32) -> Result<RoomPage> {
        ensure_page(page)?;
        let params = [
            ("kw", keyword.to_string()),
            ("page", page.to_string()),
            ("pageSize", SEARCH_PAGE_SIZE.to_string()),
        ];
        let cookie = self.search_cookie().await;
        let data: SearchShowData = self
            .get_api(
                &format!("{BASE_URL}japi/search/api/searchShow"),
                &params,
                SEARCH_REFERER,
                cookie,
            )
            .await?;

        let items: Vec<RoomItem> = data
            .relate_show
            .into_iter()
            .map(|room| RoomItem {
                room_id: room.rid.to_string(),
                title: room.room_name,
                cover: room.room_src,
                user_name: room.nick_name,
                online: parse_count(&room.hot),
            })
            .collect();
        let has_more = !items.is_empty();
        Ok(RoomPage::new(items, has_more))
    }

    async fn search_anchors(&self, keyword: &str, page: u32) -> Result<AnchorPage> {
        ensure_page(page)?;
        let params = [
            ("kw", keyword.to_string()),
            ("page", page.to_string()),
            ("pageSize", SEARCH_PAGE_SIZE.to_string()),
            ("filterType", "0".to_string()),
        ];
        let cookie = self.search_cookie().await;
        let data: SearchUserData = self
            .get_api(
                &format!("{BASE_URL}japi/search/api/searchUser"),
                &params,
                SEARCH_REFERER,
                cookie,
            )
            .await?;

        let items: Vec<AnchorItem> = data
            .relate_user
            .into_iter()
            .map(|user| AnchorItem {
                room_id: user.anchor_info.rid.to_string(),
                user_name: user.anchor_info.nick_name,
                avatar: user.anchor_info.avatar,
                followers: parse_count(&user.anchor_info.fans_num_str),
                is_live: user.anchor_info.is_live == 1,
            })
            .collect();
        let has_more = !items.is_empty();
        Ok(AnchorPage { items, has_more })
    }

    async fn room_detail(&self, room_id: &str) -> Result<RoomDetail> {
        let room = self.fetch_betard(room_id).await?;
        Ok(detail_from(room))
    }

    async fn play_qualities(&self, detail: &RoomDetail) -> Result<Vec<PlayQuality>> {
        ensure_platform(PLATFORM_ID, detail)?;
        let data = self.fetch_play_info(room_id_of(detail)?, "", 0).await?;
        qualities_from(&data)
    }

    async fn play_urls(&self, detail: &RoomDetail, quality: &PlayQuality) -> Result<PlayUrl> {
        ensure_platform(PLATFORM_ID, detail)?;
        let rid = room_id_of(detail)?;
        let token: QualityToken = serde_json::from_str(&quality.data).map_err(|e| {
            PlatformError::invalid_argument(format!("invalid douyu quality token: {e}"))
        })?;

        let mut urls = Vec::with_capacity(token.cdns.len());
        let mut last_error = None;
        for cdn in &token.cdns {
            match self.fetch_play_info(rid, cdn, token.rate).await {
                Ok(data) => urls.extend(stream_url(&data)),
                Err(e) => {
                    debug!(room_id = rid, cdn, error = %e, "Douyu CDN play info failed");
                    last_error = Some(e);
                }
            }
        }

        if urls.is_empty()
            && let Some(e) = last_error
        {
            return Err(e);
        }

        Ok(PlayUrl::new(urls)
            .with_header("referer", BASE_URL)
            .with_header("user-agent", self.user_agent.clone()))
    }

    fn chat_client(&self) -> Box<dyn ChatClient> {
        Box::new(create_douyu_chat_client(self.handshake_timeout))
    }
}
