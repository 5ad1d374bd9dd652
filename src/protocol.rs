/// Wire protocol for WebSocket clients.
/// Inbound requests and outbound events are JSON objects discriminated by `type`.
use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientRequest {
    /// Explicit join by group name; creates the group on first use
    Join { name: String, group: String },
    /// Auto-match into any open group
    FindGroup { name: String },
    /// Relay a message to every member of a group
    Send {
        name: String,
        message: String,
        group: String,
    },
}

impl ClientRequest {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Display name the client attached to this request
    pub fn display_name(&self) -> &str {
        match self {
            ClientRequest::Join { name, .. }
            | ClientRequest::FindGroup { name }
            | ClientRequest::Send { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Reply to `findGroup`; empty when no open group exists
    FoundGroup { group: String },
    JoinMessage { name: String, message: String },
    LeaveMessage { name: String },
    AddMessage { name: String, message: String },
    Error { message: String },
}

impl ServerEvent {
    pub fn joined(name: &str) -> Self {
        ServerEvent::JoinMessage {
            name: name.to_string(),
            message: format!("Join : {}", name),
        }
    }

    pub fn left(name: &str) -> Self {
        ServerEvent::LeaveMessage {
            name: name.to_string(),
        }
    }

    pub fn found_group(group: Option<&str>) -> Self {
        ServerEvent::FoundGroup {
            group: group.unwrap_or_default().to_string(),
        }
    }

    pub fn message(name: &str, message: &str) -> Self {
        ServerEvent::AddMessage {
            name: name.to_string(),
            message: message.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // Plain string fields only; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
