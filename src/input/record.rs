//! The structured unit handed to callers.

use serde::Serialize;
use serde_json::Value;

/// One decoded event.
///
/// The payload is the protocol's structured content, unchanged: a
/// lumberjack event as the shipper sent it, or the parsed fields of a
/// syslog message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    payload: Value,
}

impl Record {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// Look up a top-level field of an object payload.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }

    /// Serialized JSON form of the payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.payload)
    }
}

impl From<Value> for Record {
    fn from(payload: Value) -> Self {
        Self::new(payload)
    }
}

/// Convert a batch of events into records, one per event, in order.
pub fn adapt_batch(events: Vec<Value>) -> Vec<Record> {
    events.into_iter().map(Record::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_keeps_order_and_content() {
        let events = vec![json!({"a": 1}), json!({"b": 2}), json!({"c": 3})];
        let records = adapt_batch(events.clone());
        let payloads: Vec<_> = records.into_iter().map(Record::into_payload).collect();
        assert_eq!(payloads, events);
    }

    #[test]
    fn serializes_as_payload() {
        let record = Record::new(json!({"message": "hi", "severity": 6}));
        assert_eq!(record.get("severity"), Some(&json!(6)));
        assert_eq!(record.to_bytes().unwrap(), br#"{"message":"hi","severity":6}"#);
        assert_eq!(serde_json::to_value(&record).unwrap(), *record.payload());
    }
}
