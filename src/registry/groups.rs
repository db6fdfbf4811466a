/// Group registry: group name -> member list plus creation metadata.
/// Membership is independent of connection liveness; members can be
/// offline. Membership is additive only: there is no leave or delete
/// operation in this design.
use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{RelayError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct GroupInfo {
    pub creator: String,
    pub created_at: String,
    /// Insertion order is preserved for UI display; duplicates are
    /// impossible by construction.
    pub members: Vec<String>,
}

/// Exclusive owner of the group map; every operation is one critical
/// section.
#[derive(Default)]
pub struct GroupRegistry {
    inner: RwLock<HashMap<String, GroupInfo>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a group on first use. A second creation request for an
    /// existing name is a no-op, not an error, and returns `None`.
    pub async fn create(&self, name: &str, creator: &str) -> Option<GroupInfo> {
        let mut inner = self.inner.write().await;
        if inner.contains_key(name) {
            return None;
        }
        let info = GroupInfo {
            creator: creator.to_string(),
            created_at: Utc::now().to_rfc3339(),
            members: vec![creator.to_string()],
        };
        inner.insert(name.to_string(), info.clone());
        Some(info)
    }

    /// Add a member to an existing group. Rejoining is a no-op. Returns
    /// the resulting member list, or `GroupNotFound` without mutation.
    pub async fn join(&self, name: &str, username: &str) -> Result<Vec<String>> {
        let mut inner = self.inner.write().await;
        let info = inner
            .get_mut(name)
            .ok_or_else(|| RelayError::GroupNotFound(name.to_string()))?;
        if !info.members.iter().any(|m| m == username) {
            info.members.push(username.to_string());
        }
        Ok(info.members.clone())
    }

    pub async fn members(&self, name: &str) -> Option<Vec<String>> {
        let inner = self.inner.read().await;
        inner.get(name).map(|info| info.members.clone())
    }

    /// Every group name, sorted, for UI bootstrap.
    pub async fn group_names(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut names: Vec<String> = inner.keys().cloned().collect();
        names.sort();
        names
    }
}
