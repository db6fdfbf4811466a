/// Wire-level events exchanged with connected clients.
/// The transport serializes these as JSON with a `type` tag; the Router
/// only ever sees the typed values.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Presence status of a user as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Offline,
}

/// Events a client may send over its connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Register {
        username: String,
        #[serde(default)]
        avatar: Option<String>,
    },
    UpdateAvatar {
        username: String,
        avatar: String,
    },
    CreateGroup {
        group_name: String,
        creator: String,
    },
    JoinGroup {
        group_name: String,
        username: String,
    },
    SendDirect {
        sender: String,
        receiver: String,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        attachment: Option<String>,
    },
    SendGroup {
        sender: String,
        group_name: String,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        attachment: Option<String>,
    },
    Typing {
        sender: String,
        receiver: String,
    },
    TypingGroup {
        sender: String,
        group_name: String,
    },
    StopTyping {
        sender: String,
        receiver: String,
    },
    StopTypingGroup {
        sender: String,
        group_name: String,
    },
}

/// Events the server delivers to connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    UserStatus {
        username: String,
        status: Status,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        avatar: Option<String>,
    },
    AllStatuses {
        statuses: BTreeMap<String, Status>,
    },
    AllAvatars {
        avatars: BTreeMap<String, String>,
    },
    AllGroups {
        groups: Vec<String>,
    },
    AvatarUpdated {
        username: String,
        avatar: String,
    },
    GroupCreated {
        group_name: String,
        members: Vec<String>,
    },
    GroupMembers {
        group_name: String,
        members: Vec<String>,
    },
    UserJoinedGroup {
        group_name: String,
        username: String,
    },
    DirectMessage {
        sender: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachment: Option<String>,
        timestamp: String,
    },
    GroupMessage {
        group_name: String,
        sender: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachment: Option<String>,
        timestamp: String,
    },
    MessageSent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        receiver: Option<String>,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachment: Option<String>,
        timestamp: String,
    },
    Notification {
        sender: String,
        preview: String,
    },
    UserTyping {
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_name: Option<String>,
    },
    UserStopTyping {
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_name: Option<String>,
    },
    Error {
        code: String,
        message: String,
    },
}

impl OutboundEvent {
    /// Wire form of a routing error, sent to the originating connection only.
    pub fn error(err: &RelayError) -> Self {
        OutboundEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn validation_error(message: &str) -> Self {
        OutboundEvent::Error {
            code: "validation".to_string(),
            message: message.to_string(),
        }
    }
}
