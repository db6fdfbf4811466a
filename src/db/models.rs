/// Message models for the store.
use serde::{Deserialize, Serialize};

/// A message in transit: constructed by the router at acceptance and
/// handed off to the store and to live connections. Exactly one of
/// `receiver` / `group_name` is set, enforced by the constructors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub sender: String,
    pub receiver: Option<String>,
    pub group_name: Option<String>,
    pub text: String,
    pub attachment: Option<String>,
    pub timestamp: String,
}

impl Message {
    pub fn direct(
        sender: &str,
        receiver: &str,
        text: String,
        attachment: Option<String>,
        timestamp: String,
    ) -> Self {
        Message {
            sender: sender.to_string(),
            receiver: Some(receiver.to_string()),
            group_name: None,
            text,
            attachment,
            timestamp,
        }
    }

    pub fn group(
        sender: &str,
        group_name: &str,
        text: String,
        attachment: Option<String>,
        timestamp: String,
    ) -> Self {
        Message {
            sender: sender.to_string(),
            receiver: None,
            group_name: Some(group_name.to_string()),
            text,
            attachment,
            timestamp,
        }
    }

    /// Key the store indexes conversations by.
    pub fn conversation_key(&self) -> String {
        match (&self.receiver, &self.group_name) {
            (Some(receiver), _) => direct_key(&self.sender, receiver),
            (None, Some(group_name)) => group_key(group_name),
            (None, None) => unreachable!("message without receiver or group"),
        }
    }
}

/// Canonical key for a direct conversation: the identity pair is
/// unordered, so both directions land on the same key.
pub fn direct_key(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("dm:{}:{}", first, second)
}

pub fn group_key(group_name: &str) -> String {
    format!("group:{}", group_name)
}

/// A persisted message row as returned from history queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredMessage {
    pub id: i64,
    pub sender: String,
    pub receiver: Option<String>,
    pub group_name: Option<String>,
    pub text: String,
    pub attachment: Option<String>,
    pub timestamp: String,
}
