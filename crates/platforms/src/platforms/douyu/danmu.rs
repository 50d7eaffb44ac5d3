//! Douyu (斗鱼) danmu protocol over the STT codec.

use async_trait::async_trait;
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::trace;

use super::PLATFORM_ID;
use super::stt::{self, SttMessage};
use crate::danmaku::{DanmuProtocol, ProtocolEvent, WebSocketChatClient};
use crate::error::Result;
use crate::http::DEFAULT_UA;
use crate::model::{ChatMessage, MessageColor, RoomDetail};

/// Douyu WebSocket server URL
pub const DOUYU_WS_URL: &str = "wss://danmuproxy.douyu.com:8502/";

/// Douyu drops clients that stay silent for longer than this
const HEARTBEAT_INTERVAL_SECS: u64 = 45;

/// Main danmu group
const DEFAULT_GROUP_ID: i32 = -9999;

#[derive(Debug, Clone, Default)]
pub struct DouyuDanmuProtocol;

impl DouyuDanmuProtocol {
    pub fn new() -> Self {
        Self
    }

    /// `col` is a palette index; large values are raw RGB.
    fn palette_color(col: Option<&str>) -> MessageColor {
        match col.and_then(|c| c.parse::<u32>().ok()) {
            Some(1) => MessageColor::from_rgb(0xFF0000),
            Some(2) => MessageColor::from_rgb(0x1E90FF),
            Some(3) => MessageColor::from_rgb(0x00FF00),
            Some(4) => MessageColor::from_rgb(0xFF7F00),
            Some(5) => MessageColor::from_rgb(0xFF00FF),
            Some(6) => MessageColor::from_rgb(0x00FFFF),
            Some(c) if c > 0xFFFF => MessageColor::from_rgb(c),
            _ => MessageColor::WHITE,
        }
    }

    fn parse_chat(msg: &SttMessage) -> Option<ChatMessage> {
        let name = msg.get("nn")?;
        let text = msg.get("txt")?;
        Some(ChatMessage::chat(name, text).with_color(Self::palette_color(msg.get("col"))))
    }

    fn parse_gift(msg: &SttMessage) -> Option<ChatMessage> {
        let name = msg.get("nn")?;
        let gift_id = msg.get("gfid")?;
        let gift_name = msg.get("gfname").unwrap_or(gift_id);
        let count = msg.get("gfcnt").and_then(|c| c.parse().ok()).unwrap_or(1);
        Some(ChatMessage::gift(name, gift_name, count))
    }

    /// Map one STT payload to a protocol event.
    pub(crate) fn parse_payload(payload: &str) -> Option<ProtocolEvent> {
        let msg = SttMessage::decode(payload);
        match msg.msg_type() {
            // No explicit ack exists; the login reply stands in for one
            "loginres" => Some(ProtocolEvent::HandshakeAck),
            "chatmsg" => Self::parse_chat(&msg).map(ProtocolEvent::Message),
            "dgb" => Self::parse_gift(&msg).map(ProtocolEvent::Message),
            other => {
                trace!(msg_type = other, "Ignoring douyu message");
                None
            }
        }
    }
}

#[async_trait]
impl DanmuProtocol for DouyuDanmuProtocol {
    fn platform(&self) -> &str {
        PLATFORM_ID
    }

    async fn websocket_url(&self, detail: &RoomDetail) -> Result<String> {
        Ok(detail.danmaku_data["url"]
            .as_str()
            .filter(|s| !s.is_empty())
            .unwrap_or(DOUYU_WS_URL)
            .to_string())
    }

    fn headers(&self, _detail: &RoomDetail) -> Vec<(String, String)> {
        vec![
            ("Origin".to_string(), "https://www.douyu.com".to_string()),
            ("Referer".to_string(), "https://www.douyu.com".to_string()),
            ("User-Agent".to_string(), DEFAULT_UA.to_string()),
        ]
    }

    async fn handshake_messages(&self, detail: &RoomDetail) -> Result<Vec<Message>> {
        let room_id = detail.room_id.as_str();
        Ok(vec![
            Message::Binary(stt::create_packet(&stt::login_message(room_id))),
            Message::Binary(stt::create_packet(&stt::join_group_message(
                room_id,
                DEFAULT_GROUP_ID,
            ))),
        ])
    }

    fn heartbeat_message(&self) -> Option<Message> {
        Some(Message::Binary(stt::create_packet(&stt::heartbeat_message())))
    }

    fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(HEARTBEAT_INTERVAL_SECS)
    }

    fn decode_message(&self, message: &Message) -> Result<Vec<ProtocolEvent>> {
        let Message::Binary(data) = message else {
            return Ok(vec![]);
        };
        Ok(stt::parse_packets(data)
            .iter()
            .filter_map(|payload| Self::parse_payload(payload))
            .collect())
    }
}

pub type DouyuChatClient = WebSocketChatClient<DouyuDanmuProtocol>;

pub fn create_douyu_chat_client(handshake_timeout: Duration) -> DouyuChatClient {
    WebSocketChatClient::new(DouyuDanmuProtocol::new()).with_handshake_timeout(handshake_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::danmaku::{ChatClient, ConnectionState};
    use crate::model::MessageKind;
    use futures::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn message(event: Option<ProtocolEvent>) -> ChatMessage {
        match event {
            Some(ProtocolEvent::Message(msg)) => msg,
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_chatmsg() {
        let msg = message(DouyuDanmuProtocol::parse_payload(
            "type@=chatmsg/rid@=9999/uid@=1/nn@=TestUser/txt@=Hello@AWorld/level@=10/col@=2/",
        ));
        assert_eq!(msg.kind, MessageKind::Chat);
        assert_eq!(msg.user_name, "TestUser");
        assert_eq!(msg.message, "Hello@World");
        assert_eq!(msg.color, MessageColor::new(0x1E, 0x90, 0xFF));
    }

    #[test]
    fn test_chatmsg_without_col_is_white() {
        let msg = message(DouyuDanmuProtocol::parse_payload(
            "type@=chatmsg/nn@=u/txt@=hi/",
        ));
        assert!(msg.color.is_white());
    }

    #[test]
    fn test_palette_colors() {
        assert_eq!(
            DouyuDanmuProtocol::palette_color(Some("1")),
            MessageColor::new(0xFF, 0, 0)
        );
        assert_eq!(
            DouyuDanmuProtocol::palette_color(Some("16711935")),
            MessageColor::new(0xFF, 0x00, 0xFF)
        );
        assert!(DouyuDanmuProtocol::palette_color(Some("9")).is_white());
        assert!(DouyuDanmuProtocol::palette_color(Some("red")).is_white());
    }

    #[test]
    fn test_parse_dgb() {
        let msg = message(DouyuDanmuProtocol::parse_payload(
            "type@=dgb/rid@=123456/uid@=user123/nn@=GiftUser/gfid@=824/gfcnt@=5/hits@=10/",
        ));
        assert_eq!(msg.kind, MessageKind::Gift);
        assert_eq!(msg.user_name, "GiftUser");
        assert_eq!(msg.data["gift_name"], "824");
        assert_eq!(msg.data["count"], 5);
    }

    #[test]
    fn test_loginres_is_ack_and_others_dropped() {
        assert_eq!(
            DouyuDanmuProtocol::parse_payload("type@=loginres/userid@=0/"),
            Some(ProtocolEvent::HandshakeAck)
        );
        assert_eq!(DouyuDanmuProtocol::parse_payload("type@=uenter/nn@=x/"), None);
        assert_eq!(DouyuDanmuProtocol::parse_payload("type@=chatmsg/nn@=x/"), None);
        assert_eq!(DouyuDanmuProtocol::parse_payload(""), None);
    }

    #[test]
    fn test_decode_batched_frame() {
        let mut frame = stt::create_packet("type@=loginres/").to_vec();
        frame.extend_from_slice(&stt::create_packet("type@=chatmsg/nn@=a/txt@=one/"));
        frame.extend_from_slice(&stt::create_packet("type@=keeplive/"));

        let events = DouyuDanmuProtocol::new()
            .decode_message(&Message::Binary(frame.into()))
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ProtocolEvent::HandshakeAck);
        assert!(matches!(&events[1], ProtocolEvent::Message(m) if m.message == "one"));
    }

    #[tokio::test]
    async fn test_chat_client_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();

            let mut handshake = Vec::new();
            for _ in 0..2 {
                let Some(Ok(Message::Binary(frame))) = ws.next().await else {
                    panic!("expected binary handshake");
                };
                handshake.extend(stt::parse_packets(&frame));
            }
            assert_eq!(
                handshake,
                vec![
                    "type@=loginreq/roomid@=9999/",
                    "type@=joingroup/rid@=9999/gid@=-9999/",
                ]
            );

            ws.send(Message::Binary(stt::create_packet("type@=loginres/")))
                .await
                .unwrap();

            loop {
                match ws.next().await {
                    Some(Ok(Message::Binary(frame)))
                        if stt::parse_packets(&frame) == vec!["type@=mrkl/"] =>
                    {
                        break;
                    }
                    Some(Ok(_)) => continue,
                    _ => panic!("client went away before heartbeat"),
                }
            }

            ws.send(Message::Binary(stt::create_packet(
                "type@=chatmsg/nn@=viewer/txt@=hello/col@=1/",
            )))
            .await
            .unwrap();

            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut detail = RoomDetail::new(PLATFORM_ID, "9999");
        detail.danmaku_data = json!({"url": format!("ws://{addr}")});

        let client = create_douyu_chat_client(Duration::from_secs(5));
        let mut stream = client.start(&detail).await.unwrap();

        let chat = stream.next().await.unwrap().unwrap();
        assert_eq!(chat.user_name, "viewer");
        assert_eq!(chat.message, "hello");
        assert_eq!(chat.color, MessageColor::new(0xFF, 0, 0));
        assert_eq!(client.state(), ConnectionState::Streaming);

        client.stop().await;
        assert_eq!(client.state(), ConnectionState::Closed);
        server.await.unwrap();
    }
}
