/// Presence publisher: turns connection-registry transitions into
/// `user_status` fan-out, one delivery per currently-online connection.
use crate::events::OutboundEvent;
use crate::registry::connections::{ConnectionHandle, StatusChange};
use crate::router::Delivery;

#[derive(Default)]
pub struct PresencePublisher;

impl PresencePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(
        &self,
        change: &StatusChange,
        recipients: &[ConnectionHandle],
    ) -> Vec<Delivery> {
        recipients
            .iter()
            .map(|handle| Delivery {
                to: handle.clone(),
                event: OutboundEvent::UserStatus {
                    username: change.username.clone(),
                    status: change.status,
                    avatar: change.avatar.clone(),
                },
            })
            .collect()
    }
}
