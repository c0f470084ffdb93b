//! Syslog message framing over stream transports.
//!
//! Two framings exist on TCP: non-transparent (one message per line) and
//! octet-counting (`<len> <msg>`, RFC6587 §3.4.1). Datagram transports
//! carry exactly one message per packet.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::config::SyslogFormat;

/// An octet count never needs more digits than this.
const MAX_LEN_DIGITS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("message of {size} bytes exceeds limit of {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("expected an octet count")]
    MissingOctetCount,

    #[error("stream ended inside a message")]
    Truncated,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Newline,
    OctetCounting,
    /// Octet-counting when the frame starts with `<digits> `, else newline.
    Detect,
}

impl From<SyslogFormat> for Framing {
    fn from(format: SyslogFormat) -> Self {
        match format {
            SyslogFormat::Rfc3164 | SyslogFormat::Rfc5424 => Framing::Newline,
            SyslogFormat::Rfc6587 => Framing::OctetCounting,
            SyslogFormat::Automatic => Framing::Detect,
        }
    }
}

/// Splits a TCP byte stream into syslog messages.
#[derive(Debug)]
pub struct SyslogFramer {
    framing: Framing,
    max_message_size: usize,
}

impl SyslogFramer {
    pub fn new(format: SyslogFormat, max_message_size: usize) -> Self {
        Self {
            framing: format.into(),
            max_message_size,
        }
    }

    fn next_octet_counted(&self, src: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        let Some((len, prefix)) = octet_prefix(src) else {
            if src.len() > MAX_LEN_DIGITS && !src.iter().take(MAX_LEN_DIGITS + 1).any(|&b| b == b' ') {
                return Err(FramingError::MissingOctetCount);
            }
            if src.first().is_some_and(|b| !b.is_ascii_digit()) {
                return Err(FramingError::MissingOctetCount);
            }
            return Ok(None);
        };
        if len > self.max_message_size {
            return Err(FramingError::TooLarge {
                size: len,
                limit: self.max_message_size,
            });
        }
        if src.len() < prefix + len {
            src.reserve(prefix + len - src.len());
            return Ok(None);
        }
        src.advance(prefix);
        let message = src.split_to(len).freeze();
        // Some senders terminate octet-counted frames with a newline as well.
        while src.first().is_some_and(|&b| b == b'\n' || b == b'\r') {
            src.advance(1);
        }
        Ok(Some(message))
    }

    fn next_line(&self, src: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        let Some(newline) = src.iter().position(|&b| b == b'\n') else {
            if src.len() > self.max_message_size {
                return Err(FramingError::TooLarge {
                    size: src.len(),
                    limit: self.max_message_size,
                });
            }
            return Ok(None);
        };
        if newline > self.max_message_size {
            return Err(FramingError::TooLarge {
                size: newline,
                limit: self.max_message_size,
            });
        }
        let mut line = src.split_to(newline + 1);
        line.truncate(trim_line_end(&line));
        Ok(Some(line.freeze()))
    }
}

impl Decoder for SyslogFramer {
    type Item = Bytes;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        loop {
            let frame = match self.framing {
                Framing::Newline => self.next_line(src)?,
                Framing::OctetCounting => self.next_octet_counted(src)?,
                Framing::Detect => {
                    if src.first().is_some_and(u8::is_ascii_digit) {
                        self.next_octet_counted(src)?
                    } else {
                        self.next_line(src)?
                    }
                }
            };
            match frame {
                // Blank lines between messages carry nothing.
                Some(frame) if frame.is_empty() => continue,
                other => return Ok(other),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.iter().all(u8::is_ascii_whitespace) {
            src.clear();
            return Ok(None);
        }
        let line_framed = match self.framing {
            Framing::Newline => true,
            Framing::OctetCounting => false,
            Framing::Detect => octet_prefix(src).is_none(),
        };
        if !line_framed {
            return Err(FramingError::Truncated);
        }
        // A final line without a trailing newline is still a message.
        let mut line = src.split();
        line.truncate(trim_line_end(&line));
        Ok(Some(line.freeze()))
    }
}

/// Strip an octet-count prefix from a datagram, if it carries one.
pub fn strip_octet_prefix(datagram: &[u8]) -> &[u8] {
    match octet_prefix(datagram) {
        Some((len, prefix)) if datagram.len() >= prefix + len => &datagram[prefix..prefix + len],
        _ => datagram,
    }
}

/// Parse `<digits> ` at the start of `buf`: the message length and the
/// prefix length including the space.
fn octet_prefix(buf: &[u8]) -> Option<(usize, usize)> {
    let digits = buf
        .iter()
        .take(MAX_LEN_DIGITS)
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 || buf.get(digits) != Some(&b' ') {
        return None;
    }
    let len = std::str::from_utf8(&buf[..digits]).ok()?.parse::<usize>().ok()?;
    (len > 0).then_some((len, digits + 1))
}

fn trim_line_end(line: &[u8]) -> usize {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(format: SyslogFormat, input: &[u8]) -> Vec<Bytes> {
        let mut framer = SyslogFramer::new(format, 1024);
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(frame) = framer.decode_eof(&mut buf).unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn newline_framing_splits_lines() {
        let out = frames(SyslogFormat::Rfc3164, b"<13>one\r\n\n<13>two\n<13>three");
        assert_eq!(out, vec!["<13>one", "<13>two", "<13>three"]);
    }

    #[test]
    fn octet_counting_allows_embedded_newlines() {
        let out = frames(SyslogFormat::Rfc6587, b"9 <13>a\nb c5 <13>d");
        assert_eq!(out, vec!["<13>a\nb c", "<13>d"]);
    }

    #[test]
    fn octet_counting_waits_for_whole_frame() {
        let mut framer = SyslogFramer::new(SyslogFormat::Rfc6587, 1024);
        let mut buf = BytesMut::from(&b"11 <13>hel"[..]);
        assert!(framer.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"lo w");
        assert_eq!(framer.decode(&mut buf).unwrap().unwrap(), "<13>hello w");
    }

    #[test]
    fn detect_mixes_framings() {
        let out = frames(SyslogFormat::Automatic, b"<13>line one\n6 <13>ab<13>line two\n");
        assert_eq!(out, vec!["<13>line one", "<13>ab", "<13>line two"]);
    }

    #[test]
    fn octet_counting_rejects_plain_lines() {
        let mut framer = SyslogFramer::new(SyslogFormat::Rfc6587, 1024);
        let mut buf = BytesMut::from(&b"<13>no count\n"[..]);
        assert!(matches!(
            framer.decode(&mut buf).unwrap_err(),
            FramingError::MissingOctetCount
        ));
    }

    #[test]
    fn oversized_messages_are_errors() {
        let mut framer = SyslogFramer::new(SyslogFormat::Rfc5424, 8);
        let mut buf = BytesMut::from(&b"<13>0123456789"[..]);
        assert!(matches!(
            framer.decode(&mut buf).unwrap_err(),
            FramingError::TooLarge { limit: 8, .. }
        ));

        let mut framer = SyslogFramer::new(SyslogFormat::Rfc6587, 8);
        let mut buf = BytesMut::from(&b"100 <13>"[..]);
        assert!(matches!(
            framer.decode(&mut buf).unwrap_err(),
            FramingError::TooLarge { size: 100, .. }
        ));
    }

    #[test]
    fn truncated_octet_frame_at_eof() {
        let mut framer = SyslogFramer::new(SyslogFormat::Rfc6587, 1024);
        let mut buf = BytesMut::from(&b"20 <13>short"[..]);
        assert!(matches!(
            framer.decode_eof(&mut buf).unwrap_err(),
            FramingError::Truncated
        ));
    }

    #[test]
    fn datagram_prefix_is_stripped() {
        assert_eq!(strip_octet_prefix(b"7 <13>abc"), b"<13>abc");
        assert_eq!(strip_octet_prefix(b"<13>abc"), b"<13>abc");
        // A count longer than the datagram leaves it untouched.
        assert_eq!(strip_octet_prefix(b"99 <13>abc"), b"99 <13>abc");
    }
}
