//! Wire format of streamed batches.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which entity a stream follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Logs,
    Metrics,
    Traces,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logs => "logs",
            Self::Metrics => "metrics",
            Self::Traces => "traces",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "logs" => Ok(Self::Logs),
            "metrics" => Ok(Self::Metrics),
            "traces" => Ok(Self::Traces),
            other => Err(format!("unknown stream `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeType {
    Logs,
    Metrics,
    Traces,
    Error,
}

impl From<StreamKind> for EnvelopeType {
    fn from(kind: StreamKind) -> Self {
        match kind {
            StreamKind::Logs => Self::Logs,
            StreamKind::Metrics => Self::Metrics,
            StreamKind::Traces => Self::Traces,
        }
    }
}

/// One pushed frame: `{"type": ..., "payload": ..., "initial": bool}`.
///
/// Data envelopes carry a JSON array of records. Error envelopes carry
/// `{"message": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    pub payload: Value,
    #[serde(default)]
    pub initial: bool,
}

impl Envelope {
    pub fn batch(kind: StreamKind, payload: Value, initial: bool) -> Self {
        Self {
            kind: kind.into(),
            payload,
            initial,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeType::Error,
            payload: serde_json::json!({ "message": message.into() }),
            initial: false,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == EnvelopeType::Error
    }

    /// Number of records carried; zero for error envelopes.
    pub fn record_count(&self) -> usize {
        self.payload.as_array().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let env = Envelope::batch(StreamKind::Logs, serde_json::json!([{"id": "a"}]), true);
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["type"], "logs");
        assert_eq!(value["initial"], true);
        assert_eq!(value["payload"][0]["id"], "a");
        assert_eq!(env.record_count(), 1);
    }

    #[test]
    fn test_error_envelope() {
        let env = Envelope::error("store is closed");
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["payload"]["message"], "store is closed");
        assert_eq!(env.record_count(), 0);
        assert!(env.is_error());
    }

    #[test]
    fn test_stream_kind_parse() {
        assert_eq!("traces".parse::<StreamKind>(), Ok(StreamKind::Traces));
        assert!("spans".parse::<StreamKind>().is_err());
    }
}
