use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::event::Event;

pub type CorrelationId = String;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a json object")]
    NotAnObject,
    #[error("unrecognised frame shape (keys: {0})")]
    UnrecognisedFrame(String),
    #[error("malformed {kind} frame: {source}")]
    Malformed {
        kind: &'static str,
        source: serde_json::Error,
    },
}

/// Request half of a correlated pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: CorrelationId,
    pub action: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Response half of a correlated pair. Exactly one of `result` / `error` is meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: CorrelationId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    pub fn ok(id: impl Into<CorrelationId>, result: Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: impl Into<CorrelationId>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Frames sent from the client to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// One-way command; any effect is observed through later events.
    Action {
        action: String,
        #[serde(default)]
        payload: Map<String, Value>,
    },
    Request(RequestEnvelope),
}

impl OutboundFrame {
    pub fn action(action: impl Into<String>, payload: Map<String, Value>) -> Self {
        OutboundFrame::Action {
            action: action.into(),
            payload,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            OutboundFrame::Request(req) => Some(&req.id),
            OutboundFrame::Action { .. } => None,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Frames received from the host.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Response(ResponseEnvelope),
    Event(Event),
    /// Full-state snapshot used for hydration.
    State(Value),
}

impl InboundFrame {
    /// Classify a raw frame.
    ///
    /// Responses carry an `id` plus `result` or `error`; events carry `event`;
    /// snapshots are tagged `"type": "state"`.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(obj) = &value else {
            return Err(ProtocolError::NotAnObject);
        };

        if obj.contains_key("id") && (obj.contains_key("result") || obj.contains_key("error")) {
            return serde_json::from_value(value)
                .map(InboundFrame::Response)
                .map_err(|source| ProtocolError::Malformed {
                    kind: "response",
                    source,
                });
        }

        if obj.contains_key("event") {
            return serde_json::from_value::<Event>(value)
                .map(|ev| InboundFrame::Event(ev.normalized()))
                .map_err(|source| ProtocolError::Malformed {
                    kind: "event",
                    source,
                });
        }

        if obj.get("type").and_then(Value::as_str) == Some("state") {
            let data = obj.get("data").cloned().unwrap_or(Value::Null);
            return Ok(InboundFrame::State(data));
        }

        let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        Err(ProtocolError::UnrecognisedFrame(keys.join(", ")))
    }
}
