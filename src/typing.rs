/// Typing coordinator: per (sender, target) state machine
/// idle -> typing -> idle with an inactivity timeout.
///
/// Each typing signal stores a fresh generation for its key and spawns a
/// timer carrying that generation. A timer that wakes up and finds a newer
/// generation (the session was refreshed) or no entry at all (explicit
/// stop) does nothing, so the target sees exactly one stop per
/// typing -> idle transition, whether by timeout or explicit stop, and
/// never both.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

/// Inactivity window after which a typing session expires.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypingTarget {
    Direct(String),
    Group(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypingKey {
    pub sender: String,
    pub target: TypingTarget,
}

impl TypingKey {
    pub fn direct(sender: &str, receiver: &str) -> Self {
        TypingKey {
            sender: sender.to_string(),
            target: TypingTarget::Direct(receiver.to_string()),
        }
    }

    pub fn group(sender: &str, group_name: &str) -> Self {
        TypingKey {
            sender: sender.to_string(),
            target: TypingTarget::Group(group_name.to_string()),
        }
    }
}

/// Exclusive owner of the per-pair timer state. Expired keys are pushed on
/// the channel handed to `new`; the consumer routes them exactly like an
/// explicit stop signal.
pub struct TypingCoordinator {
    sessions: Arc<Mutex<HashMap<TypingKey, u64>>>,
    next_generation: AtomicU64,
    timeout: Duration,
    expiry_tx: mpsc::UnboundedSender<TypingKey>,
}

impl TypingCoordinator {
    pub fn new(timeout: Duration, expiry_tx: mpsc::UnboundedSender<TypingKey>) -> Self {
        TypingCoordinator {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            timeout,
            expiry_tx,
        }
    }

    /// Record a typing signal. Returns true only on the idle -> typing
    /// transition; a refresh resets the timer and returns false.
    pub async fn signal_typing(&self, key: TypingKey) -> bool {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let started = {
            let mut sessions = self.sessions.lock().await;
            sessions.insert(key.clone(), generation).is_none()
        };

        let sessions = Arc::clone(&self.sessions);
        let expiry_tx = self.expiry_tx.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut sessions = sessions.lock().await;
            if sessions.get(&key) == Some(&generation) {
                sessions.remove(&key);
                let _ = expiry_tx.send(key);
            }
        });

        started
    }

    /// Explicit stop. Returns true iff a session existed; removal
    /// invalidates any pending timer for the key. Idempotent.
    pub async fn signal_stop(&self, key: &TypingKey) -> bool {
        self.sessions.lock().await.remove(key).is_some()
    }

    pub async fn is_typing(&self, key: &TypingKey) -> bool {
        self.sessions.lock().await.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator(
        timeout_ms: u64,
    ) -> (TypingCoordinator, mpsc::UnboundedReceiver<TypingKey>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TypingCoordinator::new(Duration::from_millis(timeout_ms), tx), rx)
    }

    #[tokio::test]
    async fn test_first_signal_starts_session() {
        let (coord, _rx) = coordinator(1000);
        let key = TypingKey::direct("alice", "bob");

        assert!(coord.signal_typing(key.clone()).await);
        assert!(coord.is_typing(&key).await);
        // refresh, not a new start
        assert!(!coord.signal_typing(key.clone()).await);
    }

    #[tokio::test]
    async fn test_explicit_stop_cancels_timer() {
        let (coord, mut rx) = coordinator(50);
        let key = TypingKey::direct("alice", "bob");

        coord.signal_typing(key.clone()).await;
        assert!(coord.signal_stop(&key).await);
        assert!(!coord.is_typing(&key).await);
        // second stop is idempotent
        assert!(!coord.signal_stop(&key).await);

        // the cancelled timer must not fire an expiry afterwards
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_timeout_expires_session() {
        let (coord, mut rx) = coordinator(50);
        let key = TypingKey::direct("alice", "bob");

        coord.signal_typing(key.clone()).await;
        let expired = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("expiry not delivered")
            .expect("channel closed");
        assert_eq!(expired, key);
        assert!(!coord.is_typing(&key).await);
    }

    #[tokio::test]
    async fn test_refresh_resets_timer() {
        let (coord, mut rx) = coordinator(80);
        let key = TypingKey::direct("alice", "bob");

        coord.signal_typing(key.clone()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        coord.signal_typing(key.clone()).await;

        // the first timer fires here but must be a no-op
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert!(coord.is_typing(&key).await);

        // exactly one expiry once the refreshed window elapses
        let expired = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("expiry not delivered")
            .expect("channel closed");
        assert_eq!(expired, key);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_direct_and_group_keys_are_distinct() {
        let (coord, _rx) = coordinator(1000);
        assert!(coord.signal_typing(TypingKey::direct("alice", "devs")).await);
        assert!(coord.signal_typing(TypingKey::group("alice", "devs")).await);
    }
}
