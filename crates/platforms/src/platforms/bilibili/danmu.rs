//! Bilibili (哔哩哔哩) danmu protocol.
//!
//! Binary framing lives in [`crate::danmaku::packet`]; this module builds the
//! handshake and maps decoded packets into [`ChatMessage`]s.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, trace};

use crate::danmaku::packet::{self, op};
use crate::danmaku::{DanmuProtocol, ProtocolEvent, WebSocketChatClient, color_from_packed};
use crate::error::{PlatformError, Result};
use crate::http::DEFAULT_UA;
use crate::model::{ChatMessage, RoomDetail, SuperChatMessage};

use super::PLATFORM_ID;

/// Default WebSocket URL
pub const DEFAULT_WS_URL: &str = "wss://broadcastlv.chat.bilibili.com/sub";

const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Body of the handshake (op 7) packet.
#[derive(Debug, Serialize)]
struct HandshakeBody<'a> {
    roomid: u64,
    uid: u64,
    protover: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    buvid: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct BilibiliDanmuProtocol;

impl BilibiliDanmuProtocol {
    pub fn new() -> Self {
        Self
    }

    /// Real (long) room id: `detail.data` when the adapter stored one, else the room id.
    fn real_room_id(detail: &RoomDetail) -> Result<u64> {
        let id = match &detail.data {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        };
        id.or_else(|| detail.room_id.parse().ok()).ok_or_else(|| {
            PlatformError::invalid_argument(format!("invalid bilibili room id: {}", detail.room_id))
        })
    }

    fn handshake_body(detail: &RoomDetail) -> Result<Vec<u8>> {
        let token = detail.danmaku_data["token"].as_str().filter(|s| !s.is_empty());
        let buvid = detail.danmaku_data["buvid"].as_str().filter(|s| !s.is_empty());
        // The server only accepts key/buvid together
        let (key, buvid) = match (token, buvid) {
            (Some(token), Some(buvid)) => (Some(token), Some(buvid)),
            _ => (None, None),
        };

        let body = HandshakeBody {
            roomid: Self::real_room_id(detail)?,
            uid: 0,
            protover: 2,
            key,
            buvid,
        };
        Ok(serde_json::to_vec(&body)?)
    }

    /// Parse one `op 5` JSON body. Unknown commands are dropped.
    pub(crate) fn parse_notification(body: &[u8]) -> Option<ChatMessage> {
        let json: Value = serde_json::from_slice(body).ok()?;
        let cmd = json.get("cmd")?.as_str()?;

        // e.g. "DANMU_MSG:4:0:2:2:2:0"
        let cmd_base = cmd.split(':').next().unwrap_or(cmd);
        match cmd_base {
            "DANMU_MSG" => Self::parse_danmu_msg(&json),
            "SEND_GIFT" => Self::parse_gift(&json),
            "SUPER_CHAT_MESSAGE" => Self::parse_super_chat(&json),
            _ => {
                trace!(cmd, "Ignoring bilibili command");
                None
            }
        }
    }

    fn parse_danmu_msg(json: &Value) -> Option<ChatMessage> {
        let info = json.get("info")?.as_array()?;

        // info[1] = content, info[2][1] = name, info[0][3] = color
        let content = info.get(1)?.as_str()?;
        let name = info.get(2)?.get(1)?.as_str().unwrap_or_default();
        let color = info
            .first()
            .and_then(|meta| meta.get(3))
            .and_then(Value::as_u64)
            .map(color_from_packed)
            .unwrap_or_default();

        Some(ChatMessage::chat(name, content).with_color(color))
    }

    fn parse_gift(json: &Value) -> Option<ChatMessage> {
        let data = json.get("data")?;
        let name = data.get("uname")?.as_str()?;
        let gift_name = data.get("giftName")?.as_str()?;
        let num = data.get("num").and_then(Value::as_u64).unwrap_or(1);
        Some(ChatMessage::gift(name, gift_name, num))
    }

    fn parse_super_chat(json: &Value) -> Option<ChatMessage> {
        let data = json.get("data")?;
        let user_info = data.get("user_info")?;

        let super_chat = SuperChatMessage {
            user_name: user_info.get("uname")?.as_str()?.to_string(),
            face: str_field(user_info, "face"),
            message: data.get("message")?.as_str()?.to_string(),
            price: data
                .get("price")
                .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
                .unwrap_or(0),
            start_time: data.get("start_time").and_then(Value::as_i64).unwrap_or(0),
            end_time: data.get("end_time").and_then(Value::as_i64).unwrap_or(0),
            background_color: str_field(data, "background_color"),
            background_bottom_color: str_field(data, "background_bottom_color"),
        };

        let payload = serde_json::to_value(&super_chat).ok()?;
        Some(ChatMessage::super_chat(
            super_chat.user_name,
            super_chat.message,
            payload,
        ))
    }

    fn decode_binary(data: &[u8]) -> Vec<ProtocolEvent> {
        let outcome = packet::decode(data);
        if let Some(e) = outcome.error() {
            debug!(
                error = %e,
                truncated = outcome.truncated,
                malformed = outcome.malformed,
                decompression_failures = outcome.decompression_failures,
                "Bilibili frame partially decoded"
            );
        }

        outcome
            .packets
            .into_iter()
            .filter_map(|packet| match packet.operation {
                op::HANDSHAKE_REPLY => Some(ProtocolEvent::HandshakeAck),
                op::HEARTBEAT_REPLY => packet::viewer_count(&packet.body)
                    .map(|count| ProtocolEvent::Message(ChatMessage::online(u64::from(count)))),
                op::MESSAGE => Self::parse_notification(&packet.body).map(ProtocolEvent::Message),
                other => {
                    trace!(operation = other, "Ignoring bilibili packet");
                    None
                }
            })
            .collect()
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl DanmuProtocol for BilibiliDanmuProtocol {
    fn platform(&self) -> &str {
        PLATFORM_ID
    }

    async fn websocket_url(&self, detail: &RoomDetail) -> Result<String> {
        let danmaku = &detail.danmaku_data;
        if let Some(url) = danmaku["url"].as_str().filter(|s| !s.is_empty()) {
            return Ok(url.to_string());
        }
        if let Some(host) = danmaku["host"].as_str().filter(|s| !s.is_empty()) {
            let port = danmaku["wss_port"].as_u64().unwrap_or(443);
            return Ok(format!("wss://{host}:{port}/sub"));
        }
        Ok(DEFAULT_WS_URL.to_string())
    }

    fn headers(&self, _detail: &RoomDetail) -> Vec<(String, String)> {
        vec![
            ("User-Agent".to_string(), DEFAULT_UA.to_string()),
            ("Origin".to_string(), "https://live.bilibili.com".to_string()),
            ("Referer".to_string(), "https://live.bilibili.com".to_string()),
        ]
    }

    async fn handshake_messages(&self, detail: &RoomDetail) -> Result<Vec<Message>> {
        let body = Self::handshake_body(detail)?;
        Ok(vec![Message::Binary(packet::encode_handshake(&body))])
    }

    fn heartbeat_message(&self) -> Option<Message> {
        Some(Message::Binary(packet::encode_heartbeat()))
    }

    fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(HEARTBEAT_INTERVAL_SECS)
    }

    fn decode_message(&self, message: &Message) -> Result<Vec<ProtocolEvent>> {
        match message {
            Message::Binary(data) => Ok(Self::decode_binary(data)),
            _ => Ok(vec![]),
        }
    }
}

pub type BilibiliChatClient = WebSocketChatClient<BilibiliDanmuProtocol>;

pub fn create_bilibili_chat_client(handshake_timeout: Duration) -> BilibiliChatClient {
    WebSocketChatClient::new(BilibiliDanmuProtocol::new()).with_handshake_timeout(handshake_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::danmaku::ChatClient;
    use crate::danmaku::packet::tests::{deflate, server_packet};
    use crate::danmaku::packet::ver;
    use crate::model::{MessageColor, MessageKind};
    use futures::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn danmu_msg(name: &str, text: &str, color: u64) -> Value {
        json!({
            "cmd": "DANMU_MSG",
            "info": [
                [0, 1, 25, color, 0, 0, 0, "", 0, 0, 0, "", 0, "{}", "{}", {"extra": "{}"}],
                text,
                [12345, name, 0, 0, 0, 0, 0, ""]
            ]
        })
    }

    #[test]
    fn test_handshake_body_minimal() {
        let detail = RoomDetail::new(PLATFORM_ID, "6");
        let body = BilibiliDanmuProtocol::handshake_body(&detail).unwrap();
        assert_eq!(body, br#"{"roomid":6,"uid":0,"protover":2}"#);
    }

    #[test]
    fn test_handshake_body_prefers_real_room_id_and_adds_key() {
        let mut detail = RoomDetail::new(PLATFORM_ID, "6");
        detail.data = json!("7734200");
        detail.danmaku_data = json!({"token": "tok", "buvid": "B3"});

        let body = BilibiliDanmuProtocol::handshake_body(&detail).unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["roomid"], 7734200);
        assert_eq!(json["key"], "tok");
        assert_eq!(json["buvid"], "B3");
    }

    #[test]
    fn test_handshake_body_rejects_non_numeric_room() {
        let detail = RoomDetail::new(PLATFORM_ID, "abc");
        assert!(matches!(
            BilibiliDanmuProtocol::handshake_body(&detail),
            Err(PlatformError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_parse_danmu_msg() {
        let body = serde_json::to_vec(&danmu_msg("TestUser", "Hello World", 0x336699)).unwrap();
        let msg = BilibiliDanmuProtocol::parse_notification(&body).unwrap();
        assert_eq!(msg.kind, MessageKind::Chat);
        assert_eq!(msg.user_name, "TestUser");
        assert_eq!(msg.message, "Hello World");
        assert_eq!(msg.color, MessageColor::new(0x33, 0x66, 0x99));
    }

    #[test]
    fn test_parse_danmu_msg_variant_cmd() {
        let mut json = danmu_msg("u", "hi", 16777215);
        json["cmd"] = json!("DANMU_MSG:4:0:2:2:2:0");
        let body = serde_json::to_vec(&json).unwrap();
        let msg = BilibiliDanmuProtocol::parse_notification(&body).unwrap();
        assert_eq!(msg.message, "hi");
        assert!(msg.color.is_white());
    }

    #[test]
    fn test_parse_send_gift() {
        let body = serde_json::to_vec(&json!({
            "cmd": "SEND_GIFT",
            "data": {"uname": "GiftUser", "uid": 42, "giftName": "Rocket", "num": 5}
        }))
        .unwrap();
        let msg = BilibiliDanmuProtocol::parse_notification(&body).unwrap();
        assert_eq!(msg.kind, MessageKind::Gift);
        assert_eq!(msg.user_name, "GiftUser");
        assert_eq!(msg.data["gift_name"], "Rocket");
        assert_eq!(msg.data["count"], 5);
    }

    #[test]
    fn test_parse_super_chat() {
        let body = serde_json::to_vec(&json!({
            "cmd": "SUPER_CHAT_MESSAGE",
            "data": {
                "price": 30,
                "message": "Hello",
                "start_time": 1700000000,
                "end_time": 1700000060,
                "background_color": "#EDF5FF",
                "background_bottom_color": "#2A60B2",
                "user_info": {"uname": "SCUser", "face": "https://i0.hdslb.com/face.jpg"}
            }
        }))
        .unwrap();

        let msg = BilibiliDanmuProtocol::parse_notification(&body).unwrap();
        assert_eq!(msg.kind, MessageKind::SuperChat);
        assert_eq!(msg.user_name, "SCUser");
        assert_eq!(msg.message, "Hello");

        let sc: SuperChatMessage = serde_json::from_value(msg.data).unwrap();
        assert_eq!(sc.price, 30);
        assert_eq!(sc.end_time - sc.start_time, 60);
        assert_eq!(sc.background_bottom_color, "#2A60B2");
    }

    #[test]
    fn test_unknown_cmd_dropped() {
        let body = serde_json::to_vec(&json!({"cmd": "INTERACT_WORD", "data": {}})).unwrap();
        assert!(BilibiliDanmuProtocol::parse_notification(&body).is_none());
        assert!(BilibiliDanmuProtocol::parse_notification(b"not json").is_none());
    }

    #[test]
    fn test_decode_compressed_batch() {
        let chat = serde_json::to_vec(&danmu_msg("a", "one", 0xffffff)).unwrap();
        let ignored = serde_json::to_vec(&json!({"cmd": "ONLINE_RANK_COUNT"})).unwrap();
        let mut inner = server_packet(ver::PLAIN, op::MESSAGE, &chat);
        inner.extend(server_packet(ver::PLAIN, op::MESSAGE, &ignored));
        inner.extend(server_packet(ver::PLAIN, op::MESSAGE, &chat));

        let mut frame = server_packet(ver::HEARTBEAT_REPLY, op::HANDSHAKE_REPLY, br#"{"code":0}"#);
        frame.extend(server_packet(ver::DEFLATE, op::MESSAGE, &deflate(&inner)));
        frame.extend(server_packet(ver::HEARTBEAT_REPLY, op::HEARTBEAT_REPLY, &[0, 0, 0x04, 0xd2]));

        let events = BilibiliDanmuProtocol::decode_binary(&frame);
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], ProtocolEvent::HandshakeAck);
        assert!(matches!(&events[1], ProtocolEvent::Message(m) if m.message == "one"));
        assert!(matches!(&events[2], ProtocolEvent::Message(m) if m.message == "one"));
        match &events[3] {
            ProtocolEvent::Message(m) => {
                assert_eq!(m.kind, MessageKind::Online);
                assert_eq!(m.message, "1234");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_websocket_url_resolution() {
        let protocol = BilibiliDanmuProtocol::new();
        let mut detail = RoomDetail::new(PLATFORM_ID, "6");
        assert_eq!(protocol.websocket_url(&detail).await.unwrap(), DEFAULT_WS_URL);

        detail.danmaku_data = json!({"host": "zj-cn-live-comet.chat.bilibili.com", "wss_port": 2245});
        assert_eq!(
            protocol.websocket_url(&detail).await.unwrap(),
            "wss://zj-cn-live-comet.chat.bilibili.com:2245/sub"
        );
    }

    #[tokio::test]
    async fn test_chat_client_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();

            let Some(Ok(Message::Binary(handshake))) = ws.next().await else {
                panic!("expected binary handshake");
            };
            let outcome = packet::decode(&handshake);
            assert_eq!(outcome.packets[0].operation, op::HANDSHAKE);
            let body: Value = serde_json::from_slice(&outcome.packets[0].body).unwrap();
            assert_eq!(body["roomid"], 6);

            let reply = server_packet(ver::HEARTBEAT_REPLY, op::HANDSHAKE_REPLY, br#"{"code":0}"#);
            ws.send(Message::Binary(reply.into())).await.unwrap();

            let chat = serde_json::to_vec(&danmu_msg("viewer", "hello", 0xf0f)).unwrap();
            let batch = deflate(&server_packet(ver::PLAIN, op::MESSAGE, &chat));
            ws.send(Message::Binary(
                server_packet(ver::DEFLATE, op::MESSAGE, &batch).into(),
            ))
            .await
            .unwrap();

            // Heartbeat arrives once streaming starts
            loop {
                match ws.next().await {
                    Some(Ok(Message::Binary(frame))) => {
                        let outcome = packet::decode(&frame);
                        if outcome.packets[0].operation == op::HEARTBEAT {
                            break;
                        }
                    }
                    Some(Ok(_)) => continue,
                    _ => panic!("client went away before heartbeat"),
                }
            }
            let online = server_packet(ver::HEARTBEAT_REPLY, op::HEARTBEAT_REPLY, &[0, 0, 0, 42]);
            ws.send(Message::Binary(online.into())).await.unwrap();

            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut detail = RoomDetail::new(PLATFORM_ID, "6");
        detail.danmaku_data = json!({"url": format!("ws://{addr}")});

        let client = create_bilibili_chat_client(Duration::from_secs(5));
        let mut stream = client.start(&detail).await.unwrap();

        let chat = stream.next().await.unwrap().unwrap();
        assert_eq!(chat.user_name, "viewer");
        assert_eq!(chat.message, "hello");
        assert_eq!(chat.color, MessageColor::new(0x00, 0x0f, 0x0f));

        let online = stream.next().await.unwrap().unwrap();
        assert_eq!(online.kind, MessageKind::Online);
        assert_eq!(online.data, json!(42));

        assert!(client.send_message("hi").await.unwrap_err().is_unsupported());

        client.stop().await;
        server.await.unwrap();
    }
}
