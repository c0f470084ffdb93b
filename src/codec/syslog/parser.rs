//! RFC3164 and RFC5424 message parsing.
//!
//! Parsed messages are JSON objects whose keys mirror the classic syslog
//! "log parts": RFC3164 yields `priority, facility, severity, timestamp,
//! hostname, tag, content`; RFC5424 yields `priority, facility, severity,
//! version, timestamp, hostname, app_name, proc_id, msg_id,
//! structured_data, message`. The caller adds `client`.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::config::SyslogFormat;

/// Highest valid PRI value (facility 23, severity 7).
const MAX_PRIORITY: u16 = 191;

/// UTF-8 byte order mark allowed before an RFC5424 MSG.
const BOM: &str = "\u{feff}";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("message is empty")]
    Empty,

    #[error("missing or malformed <PRI> header")]
    MissingPriority,

    #[error("priority {0} out of range")]
    PriorityOutOfRange(u16),

    #[error("malformed RFC5424 header: {0}")]
    Header(&'static str),

    #[error("invalid RFC5424 timestamp {0:?}")]
    Timestamp(String),
}

/// Parse one framed message according to `format`.
///
/// RFC6587 frames carry RFC5424 messages. `Automatic` chooses RFC5424 when
/// the PRI is followed by a version digit and a space.
pub fn parse(format: SyslogFormat, raw: &[u8]) -> Result<Map<String, Value>, ParseError> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches(['\r', '\n', '\0']);
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let (priority, rest) = split_priority(text)?;
    match format {
        SyslogFormat::Rfc3164 => Ok(parse_rfc3164(priority, rest)),
        SyslogFormat::Rfc5424 | SyslogFormat::Rfc6587 => parse_rfc5424(priority, rest),
        SyslogFormat::Automatic if looks_like_rfc5424(rest) => parse_rfc5424(priority, rest),
        SyslogFormat::Automatic => Ok(parse_rfc3164(priority, rest)),
    }
}

fn split_priority(text: &str) -> Result<(u16, &str), ParseError> {
    let inner = text.strip_prefix('<').ok_or(ParseError::MissingPriority)?;
    let close = inner.find('>').ok_or(ParseError::MissingPriority)?;
    let digits = &inner[..close];
    if digits.is_empty() || digits.len() > 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::MissingPriority);
    }
    let priority: u16 = digits.parse().map_err(|_| ParseError::MissingPriority)?;
    if priority > MAX_PRIORITY {
        return Err(ParseError::PriorityOutOfRange(priority));
    }
    Ok((priority, &inner[close + 1..]))
}

fn looks_like_rfc5424(rest: &str) -> bool {
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    (1..=2).contains(&digits) && rest.as_bytes().get(digits) == Some(&b' ')
}

fn header(priority: u16) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("priority".into(), priority.into());
    fields.insert("facility".into(), (priority / 8).into());
    fields.insert("severity".into(), (priority % 8).into());
    fields
}

/// `-` is the RFC5424 nil value.
fn nil_or(token: &str) -> Value {
    if token == "-" {
        Value::Null
    } else {
        Value::String(token.to_string())
    }
}

fn parse_rfc5424(priority: u16, rest: &str) -> Result<Map<String, Value>, ParseError> {
    let mut fields = header(priority);
    let mut tokens = rest.splitn(7, ' ');
    let mut next = |name: &'static str| tokens.next().filter(|t| !t.is_empty()).ok_or(ParseError::Header(name));

    let version: u8 = next("version")?
        .parse()
        .map_err(|_| ParseError::Header("version"))?;
    let timestamp = next("timestamp")?;
    let hostname = next("hostname")?;
    let app_name = next("app_name")?;
    let proc_id = next("proc_id")?;
    let msg_id = next("msg_id")?;
    let remainder = tokens.next().unwrap_or_default();

    let timestamp = match timestamp {
        "-" => Value::Null,
        ts => DateTime::parse_from_rfc3339(ts)
            .map(|dt| Value::String(dt.to_rfc3339()))
            .map_err(|_| ParseError::Timestamp(ts.to_string()))?,
    };
    let (structured_data, message) = split_structured_data(remainder)?;

    fields.insert("version".into(), version.into());
    fields.insert("timestamp".into(), timestamp);
    fields.insert("hostname".into(), nil_or(hostname));
    fields.insert("app_name".into(), nil_or(app_name));
    fields.insert("proc_id".into(), nil_or(proc_id));
    fields.insert("msg_id".into(), nil_or(msg_id));
    fields.insert("structured_data".into(), nil_or(structured_data));
    fields.insert(
        "message".into(),
        Value::String(message.strip_prefix(BOM).unwrap_or(message).to_string()),
    );
    Ok(fields)
}

/// Split `STRUCTURED-DATA [SP MSG]`, honouring escaped `]` inside values.
fn split_structured_data(rest: &str) -> Result<(&str, &str), ParseError> {
    if rest.is_empty() {
        return Ok(("-", ""));
    }
    if let Some(message) = rest.strip_prefix('-') {
        return Ok(("-", message.strip_prefix(' ').unwrap_or(message)));
    }
    if !rest.starts_with('[') {
        return Err(ParseError::Header("structured_data"));
    }

    let bytes = rest.as_bytes();
    let mut i = 0;
    let mut in_quotes = false;
    let mut in_element = false;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if in_quotes => i += 1,
            b'"' if in_element => in_quotes = !in_quotes,
            b'[' if !in_quotes => in_element = true,
            b']' if !in_quotes => {
                in_element = false;
                if bytes.get(i + 1) != Some(&b'[') {
                    let (data, message) = rest.split_at(i + 1);
                    return Ok((data, message.strip_prefix(' ').unwrap_or(message)));
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(ParseError::Header("structured_data"))
}

/// RFC3164 is best-effort: anything after the PRI that does not parse as a
/// header becomes content, stamped with the receive time.
fn parse_rfc3164(priority: u16, rest: &str) -> Map<String, Value> {
    let now = Utc::now();
    let mut fields = header(priority);

    let (timestamp, rest) = match parse_bsd_timestamp(rest, now) {
        Some((timestamp, rest)) => (timestamp, rest),
        None => (now, rest),
    };

    let (hostname, rest) = match rest.split_once(' ') {
        Some((host, tail)) if !host.is_empty() && !host.ends_with(':') && !host.contains('[') => {
            (host.to_string(), tail)
        }
        _ => (String::new(), rest),
    };

    let (tag, content) = split_tag(rest);

    fields.insert("timestamp".into(), Value::String(timestamp.to_rfc3339()));
    fields.insert("hostname".into(), Value::String(hostname));
    fields.insert("tag".into(), Value::String(tag.to_string()));
    fields.insert("content".into(), Value::String(content.to_string()));
    fields
}

/// `Mmm dd hh:mm:ss` with the year taken from `now`.
fn parse_bsd_timestamp(rest: &str, now: DateTime<Utc>) -> Option<(DateTime<Utc>, &str)> {
    // Day-of-month is space padded, so "Oct  5" has two spaces.
    let stamp = rest.get(..15)?;
    let tail = rest.get(15..)?;
    let with_year = format!("{} {}", now.year(), stamp);
    let parsed = NaiveDateTime::parse_from_str(&with_year, "%Y %b %e %H:%M:%S").ok()?;
    Some((parsed.and_utc(), tail.strip_prefix(' ').unwrap_or(tail)))
}

/// `tag[pid]: content` or `tag: content`. Without a tag terminator the whole
/// text is content.
fn split_tag(rest: &str) -> (&str, &str) {
    let end = rest
        .find(|c: char| c == '[' || c == ':' || c == ' ')
        .unwrap_or(rest.len());
    let tag = &rest[..end];
    let after = &rest[end..];

    let after = match after.strip_prefix('[') {
        Some(pid) => match pid.find(']') {
            Some(close) => &pid[close + 1..],
            None => return ("", rest),
        },
        None => after,
    };
    match after.strip_prefix(':') {
        Some(content) if !tag.is_empty() => (tag, content.strip_prefix(' ').unwrap_or(content)),
        _ => ("", rest),
    }
}
