//! Wire messages exchanged with clients

use serde::Deserialize;
use serde_json::{json, Value};

use signals_core::{Snapshot, TransportError, TransportResult};

/// Server to client
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Sent once per connect: the client may now send `start`
    Start,
    Update(Box<Snapshot>),
    /// Failed cycle; the stream continues with the next one
    UpdateError(String),
}

impl OutboundMessage {
    pub fn update(snapshot: Snapshot) -> Self {
        OutboundMessage::Update(Box::new(snapshot))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Start => "start",
            OutboundMessage::Update(_) | OutboundMessage::UpdateError(_) => "update",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OutboundMessage::UpdateError(_))
    }

    pub fn to_json(&self) -> TransportResult<Value> {
        match self {
            OutboundMessage::Start => Ok(json!({ "type": "start" })),
            OutboundMessage::UpdateError(error) => Ok(json!({ "type": "update", "error": error })),
            OutboundMessage::Update(snapshot) => {
                let mut value = serde_json::to_value(snapshot.as_ref())
                    .map_err(|e| TransportError::Serialization(e.to_string()))?;
                match value.as_object_mut() {
                    Some(fields) => {
                        fields.insert("type".to_string(), json!("update"));
                        Ok(value)
                    }
                    None => Err(TransportError::Serialization(
                        "snapshot did not serialize to an object".to_string(),
                    )),
                }
            }
        }
    }

    pub fn encode(&self) -> TransportResult<String> {
        Ok(self.to_json()?.to_string())
    }
}

/// Client to server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientCommand {
    Start,
    Stop,
}

impl ClientCommand {
    /// Accepts `{"type":"start"}` style frames and bare `start` / `stop` text
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(command) = serde_json::from_str(text) {
            return Some(command);
        }
        match text.to_ascii_lowercase().as_str() {
            "start" => Some(ClientCommand::Start),
            "stop" => Some(ClientCommand::Stop),
            _ => None,
        }
    }
}
