/// Connection registry: maps user identities to their live transport
/// handle and is the source of truth for online/offline status.
///
/// A connection is either unregistered or bound to exactly one user. The
/// reference behavior keeps at most one live connection per user: a second
/// registration under the same identity supersedes the first, and the
/// displaced handle is returned so the router can tear it down.
use std::collections::{BTreeMap, HashMap};

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::events::{OutboundEvent, Status};

pub type ConnectionId = Uuid;

/// Commands a session actor accepts from the routing side of the server.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Deliver(OutboundEvent),
    Shutdown,
}

/// Opaque handle to one live bidirectional connection. Cloning shares the
/// underlying channel; equality is by connection id.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::UnboundedSender<SessionCommand>) -> Self {
        ConnectionHandle {
            id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Best-effort delivery; returns false if the session is gone.
    pub fn deliver(&self, event: OutboundEvent) -> bool {
        self.tx.send(SessionCommand::Deliver(event)).is_ok()
    }

    /// Ask the owning session to close. Used on superseded connections.
    pub fn shutdown(&self) {
        let _ = self.tx.send(SessionCommand::Shutdown);
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

/// A presence transition produced by a registry mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub username: String,
    pub status: Status,
    pub avatar: Option<String>,
}

/// Result of a registration: the change to publish plus the handle this
/// registration displaced, if any.
#[derive(Debug)]
pub struct RegisterOutcome {
    pub previous: Option<ConnectionHandle>,
    pub change: StatusChange,
}

#[derive(Default)]
struct PresenceEntry {
    handle: Option<ConnectionHandle>,
    avatar: Option<String>,
}

#[derive(Default)]
struct Inner {
    by_user: HashMap<String, PresenceEntry>,
    by_conn: HashMap<ConnectionId, String>,
}

/// Exclusive owner of the identity -> handle map. Every operation is a
/// single critical section over both indexes.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `username` to `handle`, replacing any existing binding. The
    /// avatar is updated only when one is supplied, so a reconnect without
    /// metadata keeps the stored reference.
    pub async fn register(
        &self,
        username: &str,
        handle: ConnectionHandle,
        avatar: Option<String>,
    ) -> RegisterOutcome {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let entry = inner.by_user.entry(username.to_string()).or_default();
        let previous = entry.handle.replace(handle.clone());
        if let Some(prev) = &previous {
            inner.by_conn.remove(&prev.id());
        }
        if avatar.is_some() {
            entry.avatar = avatar;
        }
        let change = StatusChange {
            username: username.to_string(),
            status: Status::Online,
            avatar: entry.avatar.clone(),
        };
        inner.by_conn.insert(handle.id(), username.to_string());

        RegisterOutcome { previous, change }
    }

    /// Remove the binding for `conn` if it is still the live handle of its
    /// user. A stale unregister (the binding was already superseded) is a
    /// silent no-op and returns `None`. The presence entry itself survives
    /// with status offline so snapshots keep listing the user.
    pub async fn unregister(&self, conn: ConnectionId) -> Option<StatusChange> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let username = inner.by_conn.remove(&conn)?;
        let entry = inner.by_user.get_mut(&username)?;
        if entry.handle.as_ref().map(ConnectionHandle::id) != Some(conn) {
            return None;
        }
        entry.handle = None;
        Some(StatusChange {
            username,
            status: Status::Offline,
            avatar: entry.avatar.clone(),
        })
    }

    pub async fn lookup(&self, username: &str) -> Option<ConnectionHandle> {
        let inner = self.inner.read().await;
        inner.by_user.get(username)?.handle.clone()
    }

    /// Point-in-time status snapshot, offline entries included.
    pub async fn statuses(&self) -> BTreeMap<String, Status> {
        let inner = self.inner.read().await;
        inner
            .by_user
            .iter()
            .map(|(name, entry)| {
                let status = if entry.handle.is_some() {
                    Status::Online
                } else {
                    Status::Offline
                };
                (name.clone(), status)
            })
            .collect()
    }

    /// Avatar references for every user that supplied one.
    pub async fn avatars(&self) -> BTreeMap<String, String> {
        let inner = self.inner.read().await;
        inner
            .by_user
            .iter()
            .filter_map(|(name, entry)| Some((name.clone(), entry.avatar.clone()?)))
            .collect()
    }

    /// Replace a user's avatar reference. Returns whether the user was
    /// already known to the registry.
    pub async fn set_avatar(&self, username: &str, avatar: &str) -> bool {
        let mut inner = self.inner.write().await;
        let known = inner.by_user.contains_key(username);
        let entry = inner.by_user.entry(username.to_string()).or_default();
        entry.avatar = Some(avatar.to_string());
        known
    }

    /// Handles of every currently-online connection, for broadcasts.
    pub async fn online_handles(&self) -> Vec<ConnectionHandle> {
        let inner = self.inner.read().await;
        inner
            .by_user
            .values()
            .filter_map(|entry| entry.handle.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<SessionCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(tx), rx)
    }

    #[tokio::test]
    async fn test_register_marks_online() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = handle();

        let outcome = registry.register("alice", conn.clone(), None).await;
        assert!(outcome.previous.is_none());
        assert_eq!(outcome.change.status, Status::Online);
        assert_eq!(registry.lookup("alice").await, Some(conn));
        assert_eq!(registry.statuses().await.get("alice"), Some(&Status::Online));
    }

    #[tokio::test]
    async fn test_unregister_marks_offline_but_keeps_entry() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = handle();

        registry.register("alice", conn.clone(), None).await;
        let change = registry.unregister(conn.id()).await.expect("should remove");
        assert_eq!(change.status, Status::Offline);
        assert_eq!(change.username, "alice");

        assert!(registry.lookup("alice").await.is_none());
        assert_eq!(
            registry.statuses().await.get("alice"),
            Some(&Status::Offline)
        );
    }

    #[tokio::test]
    async fn test_second_registration_supersedes_first() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = handle();
        let (second, _rx2) = handle();

        registry.register("alice", first.clone(), None).await;
        let outcome = registry.register("alice", second.clone(), None).await;

        assert_eq!(outcome.previous, Some(first));
        assert_eq!(registry.lookup("alice").await, Some(second));
    }

    #[tokio::test]
    async fn test_stale_unregister_is_noop() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = handle();
        let (second, _rx2) = handle();

        registry.register("alice", first.clone(), None).await;
        registry.register("alice", second.clone(), None).await;

        // The first connection closes after being superseded.
        assert!(registry.unregister(first.id()).await.is_none());
        assert_eq!(registry.lookup("alice").await, Some(second));
        assert_eq!(registry.statuses().await.get("alice"), Some(&Status::Online));
    }

    #[tokio::test]
    async fn test_avatar_kept_across_reconnect() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = handle();
        let (second, _rx2) = handle();

        registry
            .register("alice", first, Some("/profiles/alice.png".to_string()))
            .await;
        let outcome = registry.register("alice", second, None).await;

        assert_eq!(
            outcome.change.avatar.as_deref(),
            Some("/profiles/alice.png")
        );
        assert_eq!(
            registry.avatars().await.get("alice").map(String::as_str),
            Some("/profiles/alice.png")
        );
    }

    #[tokio::test]
    async fn test_set_avatar_for_unknown_user() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.set_avatar("ghost", "/profiles/ghost.png").await);
        assert_eq!(
            registry.avatars().await.get("ghost").map(String::as_str),
            Some("/profiles/ghost.png")
        );
    }

    #[tokio::test]
    async fn test_online_handles_excludes_offline() {
        let registry = ConnectionRegistry::new();
        let (alice, _rx1) = handle();
        let (bob, _rx2) = handle();

        registry.register("alice", alice.clone(), None).await;
        registry.register("bob", bob.clone(), None).await;
        registry.unregister(bob.id()).await;

        let online = registry.online_handles().await;
        assert_eq!(online, vec![alice]);
    }

    #[tokio::test]
    async fn test_lookup_unknown_user() {
        let registry = ConnectionRegistry::new();
        assert!(registry.lookup("nobody").await.is_none());
    }
}
