//! Douyu STT (Serialized Text Transport) codec.
//!
//! Payloads are `key@=value/` pairs. Inside keys and values `@` is escaped
//! as `@A` and `/` as `@S`. Each payload is framed as
//!
//! ```text
//! | Length (4 bytes LE) | Length (4 bytes LE) | Magic (4 bytes) | STT Payload | Null byte |
//! ```
//!
//! where the length counts everything after the first length field.

use bytes::{BufMut, Bytes, BytesMut};
use rustc_hash::FxHashMap;

/// Magic number for client messages (689)
const CLIENT_MAGIC: [u8; 4] = [0xb1, 0x02, 0x00, 0x00];

/// Length field + length field + magic + null terminator.
const FRAME_OVERHEAD: usize = 13;

pub fn stt_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '@' => result.push_str("@A"),
            '/' => result.push_str("@S"),
            _ => result.push(c),
        }
    }
    result
}

pub fn stt_unescape(s: &str) -> String {
    s.replace("@S", "/").replace("@A", "@")
}

/// Encode pairs in the given order. Douyu expects `type` first.
pub fn stt_encode(pairs: &[(&str, &str)]) -> String {
    let mut result = String::new();
    for (key, value) in pairs {
        result.push_str(&stt_escape(key));
        result.push_str("@=");
        result.push_str(&stt_escape(value));
        result.push('/');
    }
    result
}

/// A decoded STT payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SttMessage {
    fields: FxHashMap<String, String>,
}

impl SttMessage {
    pub fn decode(data: &str) -> Self {
        let fields = data
            .split('/')
            .filter(|part| !part.is_empty())
            .filter_map(|part| part.split_once("@="))
            .map(|(key, value)| (stt_unescape(key), stt_unescape(value)))
            .collect();
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn msg_type(&self) -> &str {
        self.get("type").unwrap_or_default()
    }
}

pub fn create_packet(message: &str) -> Bytes {
    let payload = message.as_bytes();
    let length = (payload.len() + FRAME_OVERHEAD - 4) as u32;

    let mut buf = BytesMut::with_capacity(payload.len() + FRAME_OVERHEAD);
    buf.put_u32_le(length);
    buf.put_u32_le(length);
    buf.put_slice(&CLIENT_MAGIC);
    buf.put_slice(payload);
    buf.put_u8(0x00);
    buf.freeze()
}

/// Parse one framed packet. Returns the payload and the bytes consumed, or
/// `None` when the buffer holds an incomplete packet.
pub fn parse_packet(data: &[u8]) -> Option<(String, usize)> {
    if data.len() < FRAME_OVERHEAD {
        return None;
    }

    let length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let total_size = length + 4;
    if total_size < FRAME_OVERHEAD || data.len() < total_size {
        return None;
    }

    // len1(4) + len2(4) + magic(4)
    let payload = &data[12..total_size - 1];
    Some((String::from_utf8_lossy(payload).into_owned(), total_size))
}

/// Parse every complete packet in a buffer.
pub fn parse_packets(data: &[u8]) -> Vec<String> {
    let mut packets = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let Some((payload, consumed)) = parse_packet(&data[offset..]) else {
            break;
        };
        if !payload.is_empty() {
            packets.push(payload);
        }
        offset += consumed;
    }

    packets
}

pub fn login_message(room_id: &str) -> String {
    stt_encode(&[("type", "loginreq"), ("roomid", room_id)])
}

pub fn join_group_message(room_id: &str, group_id: i32) -> String {
    let gid = group_id.to_string();
    stt_encode(&[("type", "joingroup"), ("rid", room_id), ("gid", &gid)])
}

pub fn heartbeat_message() -> String {
    stt_encode(&[("type", "mrkl")])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stt_escape() {
        assert_eq!(stt_escape("hello"), "hello");
        assert_eq!(stt_escape("hello@world"), "hello@Aworld");
        assert_eq!(stt_escape("hello/world"), "hello@Sworld");
        assert_eq!(stt_escape("@/"), "@A@S");
    }

    #[test]
    fn test_stt_unescape() {
        assert_eq!(stt_unescape("hello@Aworld"), "hello@world");
        assert_eq!(stt_unescape("hello@Sworld"), "hello/world");
        assert_eq!(stt_unescape("@A@S"), "@/");
        // "@AS" is an escaped "@" followed by "S"
        assert_eq!(stt_unescape("@AS"), "@S");
    }

    #[test]
    fn test_handshake_messages_keep_type_first() {
        assert_eq!(login_message("9999"), "type@=loginreq/roomid@=9999/");
        assert_eq!(
            join_group_message("9999", -9999),
            "type@=joingroup/rid@=9999/gid@=-9999/"
        );
        assert_eq!(heartbeat_message(), "type@=mrkl/");
    }

    #[test]
    fn test_decode_with_escaping() {
        let msg = SttMessage::decode("type@=chatmsg/txt@=a@Ab@Sc/nn@=x/");
        assert_eq!(msg.msg_type(), "chatmsg");
        assert_eq!(msg.get("txt"), Some("a@b/c"));
        assert_eq!(msg.get("missing"), None);
    }

    #[test]
    fn test_heartbeat_frame_bytes() {
        let frame = create_packet(&heartbeat_message());
        assert_eq!(
            frame.as_ref(),
            &[
                0x14, 0x00, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00, 0xb1, 0x02, 0x00, 0x00, b't',
                b'y', b'p', b'e', b'@', b'=', b'm', b'r', b'k', b'l', b'/', 0x00,
            ][..]
        );
    }

    #[test]
    fn test_parse_packets_multiple() {
        let mut combined = create_packet("type@=first/").to_vec();
        combined.extend_from_slice(&create_packet("type@=second/"));
        assert_eq!(parse_packets(&combined), vec!["type@=first/", "type@=second/"]);
    }

    #[test]
    fn test_parse_packet_incomplete() {
        assert!(parse_packet(&[0x00, 0x01, 0x02]).is_none());
        let packet = create_packet("type@=test/");
        assert!(parse_packet(&packet[..packet.len() - 5]).is_none());
        assert_eq!(parse_packets(&packet[..packet.len() - 1]), Vec::<String>::new());
    }

    #[test]
    fn test_bogus_length_does_not_panic() {
        let mut frame = create_packet("type@=x/").to_vec();
        frame[0..4].copy_from_slice(&3u32.to_le_bytes());
        assert!(parse_packet(&frame).is_none());
    }
}
