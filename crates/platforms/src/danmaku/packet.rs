//! BiliBili danmaku packet framing.
//!
//! Every packet is a 16-byte big-endian header followed by a body:
//!
//! ```text
//! | total_len u32 | header_len u16 | version u16 | operation u32 | sequence u32 | body |
//! ```
//!
//! A single WebSocket frame may carry several concatenated packets, and a
//! deflate-compressed `message` packet carries a further packet stream once
//! inflated. Decoding walks these with an explicit work-list instead of
//! recursion so nesting depth never grows the call stack.

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use std::io::Read;
use tracing::{debug, trace};

use crate::error::{PlatformError, Result};

/// Header length written by this client. Decoders read it from each packet.
pub const HEADER_LEN: usize = 16;

/// Literal body of every heartbeat.
pub const HEARTBEAT_BODY: &[u8] = b"[object Object]";

/// Inflated payloads nested deeper than this are dropped.
const MAX_NESTING: usize = 8;

/// Total bytes one call to [`decode`] may inflate, across all nesting levels.
pub const MAX_INFLATED: usize = 16 * 1024 * 1024;

/// Operation codes
pub mod op {
    pub const HEARTBEAT: u32 = 2;
    pub const HEARTBEAT_REPLY: u32 = 3;
    pub const MESSAGE: u32 = 5;
    pub const HANDSHAKE: u32 = 7;
    pub const HANDSHAKE_REPLY: u32 = 8;
}

/// Protocol versions
pub mod ver {
    pub const PLAIN: u16 = 0;
    pub const HEARTBEAT_REPLY: u16 = 1;
    pub const DEFLATE: u16 = 2;
}

/// One decoded, uncompressed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub version: u16,
    pub operation: u32,
    pub sequence: u32,
    pub body: Bytes,
}

/// Result of decoding one buffer.
///
/// Framing problems never abort decoding: they stop the affected buffer and
/// are counted here, while packets decoded before them are kept.
#[derive(Debug, Default)]
pub struct DecodeOutcome {
    pub packets: Vec<Packet>,
    /// A buffer ended in the middle of a packet.
    pub truncated: bool,
    /// Buffers abandoned because of inconsistent framing.
    pub malformed: usize,
    /// Compressed frames dropped because they did not inflate or inflated
    /// past [`MAX_INFLATED`].
    pub decompression_failures: usize,
}

impl DecodeOutcome {
    /// The framing problem hit while decoding, if any.
    ///
    /// Bad framing takes precedence over compression failures.
    pub fn error(&self) -> Option<PlatformError> {
        if self.malformed > 0 || self.truncated {
            Some(PlatformError::MalformedPacket(format!(
                "{} malformed, truncated: {}",
                self.malformed, self.truncated
            )))
        } else if self.decompression_failures > 0 {
            Some(PlatformError::Decompression(format!(
                "{} compressed frame(s) dropped",
                self.decompression_failures
            )))
        } else {
            None
        }
    }
}

/// Encode a client packet.
///
/// The deflate version is advertised even though client bodies are plain;
/// servers expect it.
pub fn encode(operation: u32, body: &[u8]) -> Bytes {
    let total_len = HEADER_LEN + body.len();
    let mut buf = BytesMut::with_capacity(total_len);

    buf.put_u32(total_len as u32);
    buf.put_u16(HEADER_LEN as u16);
    buf.put_u16(ver::DEFLATE);
    buf.put_u32(operation);
    buf.put_u32(1);
    buf.put_slice(body);

    buf.freeze()
}

/// Encode the handshake packet carrying a JSON body.
pub fn encode_handshake(body: &[u8]) -> Bytes {
    encode(op::HANDSHAKE, body)
}

/// Encode the heartbeat packet.
pub fn encode_heartbeat() -> Bytes {
    encode(op::HEARTBEAT, HEARTBEAT_BODY)
}

/// Decode every packet in `data`, inflating compressed message batches in place.
///
/// Output order matches wire order, with the sub-packets of a compressed
/// frame appearing where that frame was.
pub fn decode(data: &[u8]) -> DecodeOutcome {
    let mut outcome = DecodeOutcome::default();
    let mut inflated_total = 0usize;

    // Each entry is a buffer and the offset of its next unread packet. The
    // last entry is always processed first, which keeps inflated sub-packets
    // ahead of the siblings that follow their parent frame.
    let mut stack: Vec<(Bytes, usize)> = vec![(Bytes::copy_from_slice(data), 0)];

    while let Some((buf, offset)) = stack.last_mut() {
        let remaining = buf.len() - *offset;
        if remaining == 0 {
            stack.pop();
            continue;
        }

        if remaining < HEADER_LEN {
            trace!(remaining, "Incomplete packet header");
            outcome.truncated = true;
            stack.pop();
            continue;
        }

        let start = *offset;
        let header = &buf[start..start + HEADER_LEN];
        let total_len = BigEndian::read_u32(&header[0..4]) as usize;
        let header_len = BigEndian::read_u16(&header[4..6]) as usize;
        let version = BigEndian::read_u16(&header[6..8]);
        let operation = BigEndian::read_u32(&header[8..12]);
        let sequence = BigEndian::read_u32(&header[12..16]);

        if header_len < HEADER_LEN || total_len <= header_len {
            debug!(total_len, header_len, "Malformed packet header, dropping rest of buffer");
            outcome.malformed += 1;
            stack.pop();
            continue;
        }

        if start + total_len > buf.len() {
            trace!(total_len, remaining, "Truncated packet");
            outcome.truncated = true;
            stack.pop();
            continue;
        }

        let body = buf.slice(start + header_len..start + total_len);
        *offset += total_len;

        if operation == op::MESSAGE && version == ver::DEFLATE {
            if stack.len() > MAX_NESTING {
                debug!("Compressed payload nested too deeply, dropping frame");
                outcome.malformed += 1;
                continue;
            }
            match inflate(&body, MAX_INFLATED - inflated_total) {
                Ok(inflated) => {
                    inflated_total += inflated.len();
                    stack.push((Bytes::from(inflated), 0));
                }
                Err(e) => {
                    debug!(error = %e, "Dropping compressed frame");
                    outcome.decompression_failures += 1;
                }
            }
            continue;
        }

        outcome.packets.push(Packet {
            version,
            operation,
            sequence,
            body,
        });
    }

    outcome
}

/// Inflate at most `limit` bytes. Anything larger is an error.
fn inflate(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut inflated = Vec::new();
    ZlibDecoder::new(data)
        .take(limit as u64 + 1)
        .read_to_end(&mut inflated)
        .map_err(|e| PlatformError::Decompression(format!("zlib: {e}")))?;
    if inflated.len() > limit {
        return Err(PlatformError::Decompression(format!(
            "inflated payload exceeds {limit} bytes"
        )));
    }
    Ok(inflated)
}

/// Read the viewer count carried by a heartbeat reply.
pub fn viewer_count(body: &[u8]) -> Option<u32> {
    (body.len() >= 4).then(|| BigEndian::read_u32(&body[..4]))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    /// Build a server-style packet with an explicit version.
    pub(crate) fn server_packet(version: u16, operation: u32, body: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u32((HEADER_LEN + body.len()) as u32);
        buf.put_u16(HEADER_LEN as u16);
        buf.put_u16(version);
        buf.put_u32(operation);
        buf.put_u32(0);
        buf.put_slice(body);
        buf.to_vec()
    }

    pub(crate) fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_encode_header() {
        let packet = encode(op::HANDSHAKE, b"test");

        assert_eq!(BigEndian::read_u32(&packet[0..4]), 20);
        assert_eq!(BigEndian::read_u16(&packet[4..6]), 16);
        assert_eq!(BigEndian::read_u16(&packet[6..8]), ver::DEFLATE);
        assert_eq!(BigEndian::read_u32(&packet[8..12]), op::HANDSHAKE);
        assert_eq!(BigEndian::read_u32(&packet[12..16]), 1);
        assert_eq!(&packet[16..], b"test");
    }

    #[test]
    fn test_handshake_roundtrip() {
        let body = br#"{"roomid":6,"uid":0,"protover":2}"#;
        let packet = encode_handshake(body);

        let outcome = decode(&packet);
        assert_eq!(outcome.packets.len(), 1);
        let decoded = &outcome.packets[0];
        assert_eq!(decoded.operation, op::HANDSHAKE);

        let json: serde_json::Value = serde_json::from_slice(&decoded.body).unwrap();
        assert_eq!(json["roomid"], 6);
        assert_eq!(json["uid"], 0);
        assert_eq!(json["protover"], 2);
    }

    #[test]
    fn test_heartbeat_packet() {
        let packet = encode_heartbeat();
        assert_eq!(packet.len(), 31);
        assert_eq!(&packet[16..], b"[object Object]");
    }

    #[test]
    fn test_concatenated_packets_keep_order() {
        let mut data = Vec::new();
        for i in 0..5u32 {
            data.extend(server_packet(ver::PLAIN, op::MESSAGE, format!("{{\"n\":{i}}}").as_bytes()));
        }

        let outcome = decode(&data);
        assert_eq!(outcome.packets.len(), 5);
        for (i, packet) in outcome.packets.iter().enumerate() {
            assert_eq!(packet.body, format!("{{\"n\":{i}}}").as_bytes());
        }
        assert!(!outcome.truncated);
    }

    #[test]
    fn test_compressed_batch_expands_in_place() {
        let mut inner = Vec::new();
        for i in 0..3u32 {
            inner.extend(server_packet(ver::PLAIN, op::MESSAGE, format!("inner{i}").as_bytes()));
        }

        let mut data = server_packet(ver::PLAIN, op::MESSAGE, b"before");
        data.extend(server_packet(ver::DEFLATE, op::MESSAGE, &deflate(&inner)));
        data.extend(server_packet(ver::PLAIN, op::MESSAGE, b"after"));

        let bodies: Vec<Bytes> = decode(&data).packets.into_iter().map(|p| p.body).collect();
        assert_eq!(
            bodies,
            vec!["before", "inner0", "inner1", "inner2", "after"]
        );
    }

    #[test]
    fn test_nested_compression() {
        let innermost = server_packet(ver::PLAIN, op::MESSAGE, b"deep");
        let middle = server_packet(ver::DEFLATE, op::MESSAGE, &deflate(&innermost));
        let outer = server_packet(ver::DEFLATE, op::MESSAGE, &deflate(&middle));

        let outcome = decode(&outer);
        assert_eq!(outcome.packets.len(), 1);
        assert_eq!(outcome.packets[0].body, "deep");
    }

    #[test]
    fn test_truncated_buffer_keeps_earlier_packets() {
        let mut data = server_packet(ver::PLAIN, op::MESSAGE, b"whole");
        let partial = server_packet(ver::PLAIN, op::MESSAGE, b"cut short");
        data.extend_from_slice(&partial[..partial.len() - 3]);

        let outcome = decode(&data);
        assert_eq!(outcome.packets.len(), 1);
        assert!(outcome.truncated);
        assert_eq!(outcome.malformed, 0);
    }

    #[test]
    fn test_length_beyond_buffer_yields_nothing() {
        let mut data = server_packet(ver::PLAIN, op::MESSAGE, b"abc");
        data[0..4].copy_from_slice(&1000u32.to_be_bytes());

        let outcome = decode(&data);
        assert!(outcome.packets.is_empty());
        assert!(outcome.truncated);
    }

    #[test]
    fn test_zero_length_packet_is_malformed() {
        let mut data = server_packet(ver::PLAIN, op::MESSAGE, b"ok");
        let mut bad = server_packet(ver::PLAIN, op::MESSAGE, b"");
        bad[0..4].copy_from_slice(&16u32.to_be_bytes());
        data.extend(bad);
        data.extend(server_packet(ver::PLAIN, op::MESSAGE, b"never reached"));

        let outcome = decode(&data);
        assert_eq!(outcome.packets.len(), 1);
        assert_eq!(outcome.malformed, 1);
    }

    #[test]
    fn test_corrupt_compressed_frame_is_dropped() {
        let mut data = server_packet(ver::DEFLATE, op::MESSAGE, b"not zlib at all");
        data.extend(server_packet(ver::PLAIN, op::MESSAGE, b"sibling"));

        let outcome = decode(&data);
        assert_eq!(outcome.decompression_failures, 1);
        assert_eq!(outcome.packets.len(), 1);
        assert_eq!(outcome.packets[0].body, "sibling");
    }

    #[test]
    fn test_oversized_compressed_frame_is_dropped() {
        let bomb = deflate(&vec![0u8; MAX_INFLATED + 1]);
        let mut data = server_packet(ver::DEFLATE, op::MESSAGE, &bomb);
        data.extend(server_packet(ver::PLAIN, op::MESSAGE, b"sibling"));

        let outcome = decode(&data);
        assert_eq!(outcome.decompression_failures, 1);
        assert_eq!(outcome.packets.len(), 1);
        assert_eq!(outcome.packets[0].body, "sibling");
        assert!(matches!(outcome.error(), Some(PlatformError::Decompression(_))));
    }

    #[test]
    fn test_inflate_budget_is_shared_by_siblings() {
        // Each frame fits alone, but together they exceed the budget.
        let half = MAX_INFLATED / 2 + 1;
        let mut inner = Vec::new();
        inner.extend(server_packet(ver::PLAIN, op::MESSAGE, &vec![b'a'; half - HEADER_LEN]));
        let frame = server_packet(ver::DEFLATE, op::MESSAGE, &deflate(&inner));

        let mut data = frame.clone();
        data.extend(frame);
        let outcome = decode(&data);
        assert_eq!(outcome.packets.len(), 1);
        assert_eq!(outcome.decompression_failures, 1);
    }

    #[test]
    fn test_outcome_error_kind() {
        assert!(decode(&encode_heartbeat()).error().is_none());

        let mut data = server_packet(ver::PLAIN, op::MESSAGE, b"ok");
        data.extend_from_slice(&[0, 0, 0]);
        assert!(matches!(
            decode(&data).error(),
            Some(PlatformError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_header_len_read_from_packet() {
        // 20-byte header with 4 bytes of padding before the body
        let body = b"payload";
        let mut buf = BytesMut::new();
        buf.put_u32((20 + body.len()) as u32);
        buf.put_u16(20);
        buf.put_u16(ver::PLAIN);
        buf.put_u32(op::MESSAGE);
        buf.put_u32(0);
        buf.put_u32(0);
        buf.put_slice(body);

        let outcome = decode(&buf);
        assert_eq!(outcome.packets.len(), 1);
        assert_eq!(outcome.packets[0].body, "payload");
    }

    #[test]
    fn test_viewer_count() {
        assert_eq!(viewer_count(&1234u32.to_be_bytes()), Some(1234));
        assert_eq!(viewer_count(&[0, 1]), None);
    }
}
