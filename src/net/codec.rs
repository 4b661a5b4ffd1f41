//! Length-prefixed codec for broker framing
//!
//! All messages are framed as:
//! ```text
//! [ 4 bytes: frame length (u32, big-endian) ]
//! [ 2 bytes: topic length (u16, big-endian) ][ topic bytes ][ payload bytes ]
//! ```
//!
//! This preserves message boundaries over TCP streams.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Maximum frame size to prevent memory exhaustion
pub const MAX_FRAME_SIZE: u32 = 64 * 1024;

/// A topic-tagged message as it travels over the broker link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub topic: String,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("invalid frame length prefix: {0}")]
    InvalidLength(u32),

    #[error("topic of {0} bytes exceeds u16 length field")]
    TopicTooLong(usize),

    #[error("frame body shorter than its declared topic length")]
    TruncatedTopic,

    #[error("topic is not valid UTF-8")]
    InvalidTopic(#[from] std::str::Utf8Error),
}

/// Encode a frame into a length-prefixed byte buffer
pub fn encode(frame: &Frame) -> Result<Bytes, CodecError> {
    let topic_len = frame.topic.len();
    if topic_len > u16::MAX as usize {
        return Err(CodecError::TopicTooLong(topic_len));
    }

    let body_len = 2 + topic_len + frame.payload.len();
    if body_len > MAX_FRAME_SIZE as usize {
        return Err(CodecError::FrameTooLarge(body_len));
    }

    let mut buf = BytesMut::with_capacity(4 + body_len);
    buf.put_u32(body_len as u32);
    buf.put_u16(topic_len as u16);
    buf.put_slice(frame.topic.as_bytes());
    buf.put_slice(&frame.payload);

    Ok(buf.freeze())
}

/// Try to decode a length-prefixed frame from a buffer
///
/// Returns:
/// - `Ok(Some(frame))` if a complete frame was decoded
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the data is invalid
pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
    // Need at least the 4-byte length prefix
    if buf.len() < 4 {
        return Ok(None);
    }

    // Peek at the length prefix without consuming
    let body_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);

    if body_len > MAX_FRAME_SIZE || body_len < 2 {
        return Err(CodecError::InvalidLength(body_len));
    }

    let total_len = 4 + body_len as usize;
    if buf.len() < total_len {
        return Ok(None);
    }

    buf.advance(4);
    let mut body = buf.split_to(body_len as usize);

    let topic_len = body.get_u16() as usize;
    if body.len() < topic_len {
        return Err(CodecError::TruncatedTopic);
    }
    let topic_bytes = body.split_to(topic_len);
    let topic = std::str::from_utf8(&topic_bytes)?.to_owned();

    Ok(Some(Frame {
        topic,
        payload: body.freeze(),
    }))
}

/// Decoder state machine for streaming decoding
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Partial frame data being accumulated
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all
    /// complete frames
    pub fn decode_next(&mut self) -> Result<Option<Frame>, CodecError> {
        decode(&mut self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame() -> Frame {
        Frame::new("0/pinscript/code/run", Bytes::from_static(b"pin_set(2, 1)"))
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let original = test_frame();

        let encoded = encode(&original).expect("encode failed");

        // Verify length prefix
        let len_prefix = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(len_prefix as usize, encoded.len() - 4);

        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = decode(&mut buf).expect("decode failed").expect("no frame");

        assert_eq!(decoded, original);
        assert!(buf.is_empty(), "buffer should be empty after decode");
    }

    #[test]
    fn test_partial_decode_consumes_nothing() {
        let encoded = encode(&test_frame()).expect("encode failed");

        let mut buf = BytesMut::from(&encoded[..5]);
        let result = decode(&mut buf).expect("decode should not fail on partial data");
        assert!(result.is_none(), "should return None for partial data");
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_frame_decoder_across_chunks() {
        let encoded = encode(&test_frame()).expect("encode failed");

        let mut decoder = FrameDecoder::new();
        decoder.extend(&encoded[..5]);
        assert!(decoder.decode_next().expect("decode error").is_none());

        decoder.extend(&encoded[5..]);
        let decoded = decoder
            .decode_next()
            .expect("decode error")
            .expect("should have frame");
        assert_eq!(decoded, test_frame());
    }

    #[test]
    fn test_multiple_frames_drain_in_order() {
        let frame1 = Frame::new("a", Bytes::from_static(b"one"));
        let frame2 = Frame::new("b", Bytes::from_static(b"two"));

        let mut decoder = FrameDecoder::new();
        decoder.extend(&encode(&frame1).expect("encode failed"));
        decoder.extend(&encode(&frame2).expect("encode failed"));

        assert_eq!(decoder.decode_next().expect("decode error"), Some(frame1));
        assert_eq!(decoder.decode_next().expect("decode error"), Some(frame2));
        assert!(decoder.decode_next().expect("decode error").is_none());
    }

    #[test]
    fn test_empty_payload_frame() {
        let frame = Frame::new("ping", Bytes::new());
        let encoded = encode(&frame).expect("encode failed");

        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = decode(&mut buf).expect("decode failed").expect("no frame");
        assert_eq!(decoded.topic, "ping");
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_oversized_length_prefix_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_SIZE + 1);
        buf.put_bytes(0, 100);

        let result = decode(&mut buf);
        assert!(matches!(result, Err(CodecError::InvalidLength(_))));
    }

    #[test]
    fn test_oversized_frame_is_rejected_at_encode() {
        let frame = Frame::new("t", Bytes::from(vec![0u8; MAX_FRAME_SIZE as usize]));
        assert!(matches!(encode(&frame), Err(CodecError::FrameTooLarge(_))));
    }
}
