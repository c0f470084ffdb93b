//! Lumberjack protocol, version 2.
//!
//! Frames start with a version byte and a type byte:
//!
//! ```text
//! '2' 'W' <u32 window>                         window size
//! '2' 'J' <u32 seq> <u32 len> <len bytes json> JSON event
//! '2' 'D' <u32 seq> <u32 pairs> (<u32 len> key <u32 len> value)*  key/value event
//! '2' 'C' <u32 len> <len bytes zlib>           compressed nested frames
//! '2' 'A' <u32 seq>                            ack (server → client)
//! ```
//!
//! Integers are big-endian. Version 1 framing is rejected. A window is
//! complete once `window` events were read; it is then yielded as one
//! [`Window`] and acknowledged with the sequence of its last event.
//!
//! A `C` block holds plain frames only; nesting is rejected. Every frame
//! is capped by the max frame size and every window by the max window
//! size, so a peer cannot make the decoder buffer without bound.

use std::collections::VecDeque;
use std::io::Read;

use bytes::{Buf, BufMut, BytesMut};
use flate2::read::ZlibDecoder;
use serde_json::{Map, Value};
use tokio_util::codec::{Decoder, Encoder};

const VERSION_V2: u8 = b'2';

const FRAME_WINDOW: u8 = b'W';
const FRAME_JSON: u8 = b'J';
const FRAME_DATA: u8 = b'D';
const FRAME_COMPRESSED: u8 = b'C';
const FRAME_ACK: u8 = b'A';

/// Default cap on a single frame payload and on inflated data.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Default cap on the summed event bytes of one window.
pub const DEFAULT_MAX_WINDOW_SIZE: usize = 128 * 1024 * 1024;

/// Malformed or unsupported input from a peer.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported protocol version {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("unknown frame type {0:#04x}")]
    UnknownFrame(u8),

    #[error("event received before a window size")]
    MissingWindow,

    #[error("window size must be greater than 0")]
    EmptyWindow,

    #[error("frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("window of {size} bytes exceeds limit of {limit}")]
    WindowTooLarge { size: usize, limit: usize },

    #[error("truncated frame inside compressed block")]
    TruncatedCompressed,

    #[error("compressed block nested inside a compressed block")]
    NestedCompressed,

    #[error("invalid JSON event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("data frame field is not valid UTF-8")]
    Utf8,

    #[error("decompression failed: {0}")]
    Decompress(std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A completed window of events.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// Sequence number of the last event, used for the ACK.
    pub last_sequence: u32,
    /// Events in arrival order.
    pub events: Vec<Value>,
}

/// Acknowledgment frame sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack(pub u32);

impl Ack {
    /// Keepalive sent while a window is still being processed.
    pub const KEEPALIVE: Ack = Ack(0);
}

#[derive(Debug)]
enum Frame {
    Window(u32),
    /// `size` is the encoded event length, counted against the window cap.
    Event { sequence: u32, event: Value, size: usize },
    Compressed(Vec<u8>),
}

/// Stateful decoder turning a byte stream into windows.
#[derive(Debug)]
pub struct LumberjackCodec {
    max_frame_size: usize,
    max_window_size: usize,
    window: Option<u32>,
    pending: Vec<Value>,
    pending_bytes: usize,
    last_sequence: u32,
    ready: VecDeque<Window>,
}

impl LumberjackCodec {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            max_window_size: DEFAULT_MAX_WINDOW_SIZE,
            window: None,
            pending: Vec::new(),
            pending_bytes: 0,
            last_sequence: 0,
            ready: VecDeque::new(),
        }
    }

    /// Cap the summed event bytes buffered for one window.
    pub fn with_max_window_size(mut self, max_window_size: usize) -> Self {
        self.max_window_size = max_window_size;
        self
    }

    fn apply(&mut self, frame: Frame) -> Result<(), DecodeError> {
        let Frame::Compressed(compressed) = frame else {
            return self.apply_plain(frame);
        };
        let inflated = self.inflate(&compressed)?;
        let mut cursor = inflated.as_slice();
        while !cursor.is_empty() {
            let (frame, used) = parse_frame(cursor, self.max_frame_size)?
                .ok_or(DecodeError::TruncatedCompressed)?;
            cursor = &cursor[used..];
            self.apply_plain(frame)?;
        }
        Ok(())
    }

    fn apply_plain(&mut self, frame: Frame) -> Result<(), DecodeError> {
        match frame {
            Frame::Window(0) => return Err(DecodeError::EmptyWindow),
            Frame::Window(size) => {
                // A new window header discards a partially received one.
                self.window = Some(size);
                self.pending.clear();
                self.pending_bytes = 0;
            }
            Frame::Event { sequence, event, size } => {
                let window = self.window.ok_or(DecodeError::MissingWindow)?;
                self.pending_bytes = self.pending_bytes.saturating_add(size);
                if self.pending_bytes > self.max_window_size {
                    return Err(DecodeError::WindowTooLarge {
                        size: self.pending_bytes,
                        limit: self.max_window_size,
                    });
                }
                self.pending.push(event);
                self.last_sequence = sequence;
                if self.pending.len() >= window as usize {
                    self.window = None;
                    self.pending_bytes = 0;
                    self.ready.push_back(Window {
                        last_sequence: self.last_sequence,
                        events: std::mem::take(&mut self.pending),
                    });
                }
            }
            Frame::Compressed(_) => return Err(DecodeError::NestedCompressed),
        }
        Ok(())
    }

    fn inflate(&self, compressed: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let limit = self.max_frame_size as u64;
        let mut inflated = Vec::new();
        ZlibDecoder::new(compressed)
            .take(limit + 1)
            .read_to_end(&mut inflated)
            .map_err(DecodeError::Decompress)?;
        if inflated.len() as u64 > limit {
            return Err(DecodeError::FrameTooLarge {
                size: inflated.len(),
                limit: self.max_frame_size,
            });
        }
        Ok(inflated)
    }
}

impl Default for LumberjackCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LumberjackCodec {
    type Item = Window;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Window>, DecodeError> {
        loop {
            if let Some(window) = self.ready.pop_front() {
                return Ok(Some(window));
            }
            let Some((frame, used)) = parse_frame(src, self.max_frame_size)? else {
                return Ok(None);
            };
            src.advance(used);
            self.apply(frame)?;
        }
    }
}

impl Encoder<Ack> for LumberjackCodec {
    type Error = DecodeError;

    fn encode(&mut self, ack: Ack, dst: &mut BytesMut) -> Result<(), DecodeError> {
        dst.reserve(6);
        dst.put_u8(VERSION_V2);
        dst.put_u8(FRAME_ACK);
        dst.put_u32(ack.0);
        Ok(())
    }
}

/// Parse one frame from the front of `buf`.
///
/// Returns the frame and the bytes it used, or `None` if more input is needed.
fn parse_frame(buf: &[u8], limit: usize) -> Result<Option<(Frame, usize)>, DecodeError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    if buf[0] != VERSION_V2 {
        return Err(DecodeError::UnsupportedVersion(buf[0]));
    }

    let body = &buf[2..];
    let parsed = match buf[1] {
        FRAME_WINDOW => read_u32(body, 0).map(|size| (Frame::Window(size), 4)),
        FRAME_JSON => parse_json(body, limit)?,
        FRAME_DATA => parse_data(body, limit)?,
        FRAME_COMPRESSED => {
            let Some(len) = read_u32(body, 0) else {
                return Ok(None);
            };
            let len = checked_len(len, limit)?;
            body.get(4..4 + len)
                .map(|payload| (Frame::Compressed(payload.to_vec()), 4 + len))
        }
        other => return Err(DecodeError::UnknownFrame(other)),
    };

    Ok(parsed.map(|(frame, used)| (frame, used + 2)))
}

fn parse_json(body: &[u8], limit: usize) -> Result<Option<(Frame, usize)>, DecodeError> {
    let (Some(sequence), Some(len)) = (read_u32(body, 0), read_u32(body, 4)) else {
        return Ok(None);
    };
    let len = checked_len(len, limit)?;
    let Some(payload) = body.get(8..8 + len) else {
        return Ok(None);
    };
    let event = serde_json::from_slice(payload)?;
    Ok(Some((
        Frame::Event {
            sequence,
            event,
            size: len,
        },
        8 + len,
    )))
}

fn parse_data(body: &[u8], limit: usize) -> Result<Option<(Frame, usize)>, DecodeError> {
    let (Some(sequence), Some(pairs)) = (read_u32(body, 0), read_u32(body, 4)) else {
        return Ok(None);
    };

    let mut offset = 8;
    let mut fields = Map::new();
    for _ in 0..pairs {
        let Some(key) = read_string(body, &mut offset, limit)? else {
            return Ok(None);
        };
        let Some(value) = read_string(body, &mut offset, limit)? else {
            return Ok(None);
        };
        fields.insert(key, Value::String(value));
        // `pairs` is untrusted; cap the frame as a whole, not just each string.
        if offset - 8 > limit {
            return Err(DecodeError::FrameTooLarge { size: offset - 8, limit });
        }
    }
    Ok(Some((
        Frame::Event {
            sequence,
            event: Value::Object(fields),
            size: offset - 8,
        },
        offset,
    )))
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_string(buf: &[u8], offset: &mut usize, limit: usize) -> Result<Option<String>, DecodeError> {
    let Some(len) = read_u32(buf, *offset) else {
        return Ok(None);
    };
    let len = checked_len(len, limit)?;
    let start = *offset + 4;
    let Some(bytes) = buf.get(start..start + len) else {
        return Ok(None);
    };
    let value = std::str::from_utf8(bytes).map_err(|_| DecodeError::Utf8)?;
    *offset = start + len;
    Ok(Some(value.to_string()))
}

fn checked_len(len: u32, limit: usize) -> Result<usize, DecodeError> {
    let len = len as usize;
    if len > limit {
        return Err(DecodeError::FrameTooLarge { size: len, limit });
    }
    Ok(len)
}

/// Client-side frame builders, used to drive the decoder in tests.
pub mod frames {
    use std::io::Write;

    use bytes::{BufMut, BytesMut};
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use serde_json::Value;

    /// `'2' 'W'` window header.
    pub fn window(size: u32) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(6);
        buf.put_slice(b"2W");
        buf.put_u32(size);
        buf.to_vec()
    }

    /// `'2' 'J'` JSON event.
    pub fn json(sequence: u32, event: &Value) -> Vec<u8> {
        let payload = event.to_string();
        let mut buf = BytesMut::with_capacity(10 + payload.len());
        buf.put_slice(b"2J");
        buf.put_u32(sequence);
        buf.put_u32(payload.len() as u32);
        buf.put_slice(payload.as_bytes());
        buf.to_vec()
    }

    /// `'2' 'D'` key/value event.
    pub fn data(sequence: u32, pairs: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_slice(b"2D");
        buf.put_u32(sequence);
        buf.put_u32(pairs.len() as u32);
        for (key, value) in pairs {
            buf.put_u32(key.len() as u32);
            buf.put_slice(key.as_bytes());
            buf.put_u32(value.len() as u32);
            buf.put_slice(value.as_bytes());
        }
        buf.to_vec()
    }

    /// `'2' 'C'` block wrapping already encoded frames.
    pub fn compressed(inner: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(inner)?;
        let payload = encoder.finish()?;
        let mut buf = BytesMut::with_capacity(6 + payload.len());
        buf.put_slice(b"2C");
        buf.put_u32(payload.len() as u32);
        buf.put_slice(&payload);
        Ok(buf.to_vec())
    }

    /// A full window of JSON events numbered from 1.
    pub fn json_window(events: &[Value]) -> Vec<u8> {
        let mut out = window(events.len() as u32);
        for (i, event) in events.iter().enumerate() {
            out.extend(json(i as u32 + 1, event));
        }
        out
    }
}
