/// Router: the orchestration layer. Consumes inbound events from the
/// transport, consults the registries and the typing coordinator, and
/// returns the outbound fan-out as an explicit list of deliveries so it
/// can be tested without a live transport.
///
/// The router owns none of the maps itself; each registry guards its own
/// state, which keeps locking local rather than one global lock.
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::db::models::Message;
use crate::db::{Database, DbPool};
use crate::error::{RelayError, Result};
use crate::events::{InboundEvent, OutboundEvent};
use crate::presence::PresencePublisher;
use crate::registry::connections::{ConnectionHandle, ConnectionId, ConnectionRegistry};
use crate::registry::groups::GroupRegistry;
use crate::typing::{TypingCoordinator, TypingKey, TypingTarget};

/// One outbound event addressed to one live connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: ConnectionHandle,
    pub event: OutboundEvent,
}

/// Push a batch of deliveries into their sessions. Sends are best-effort;
/// a connection that raced shutdown simply drops the frame.
pub fn dispatch(deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        if !delivery.to.deliver(delivery.event) {
            log::debug!("dropped frame for closed connection {}", delivery.to.id());
        }
    }
}

/// Consume typing expiries and route each one exactly like an explicit
/// stop signal. Spawned once at server startup.
pub fn spawn_typing_pump(router: Arc<Router>, mut expiry_rx: mpsc::UnboundedReceiver<TypingKey>) {
    tokio::spawn(async move {
        while let Some(key) = expiry_rx.recv().await {
            dispatch(router.typing_expired(key).await);
        }
    });
}

pub struct Router {
    connections: ConnectionRegistry,
    groups: GroupRegistry,
    typing: TypingCoordinator,
    presence: PresencePublisher,
    pool: DbPool,
}

impl Router {
    /// Build a router and the receiving end of its typing-expiry channel.
    /// The caller is responsible for pumping the receiver (see
    /// [`spawn_typing_pump`]).
    pub fn new(pool: DbPool, typing_timeout: Duration) -> (Self, mpsc::UnboundedReceiver<TypingKey>) {
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        let router = Router {
            connections: ConnectionRegistry::new(),
            groups: GroupRegistry::new(),
            typing: TypingCoordinator::new(typing_timeout, expiry_tx),
            presence: PresencePublisher::new(),
            pool,
        };
        (router, expiry_rx)
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    /// Process one inbound event from `origin`. Errors are returned to the
    /// transport, which reports them to the originating connection only.
    pub async fn handle(
        &self,
        origin: &ConnectionHandle,
        event: InboundEvent,
    ) -> Result<Vec<Delivery>> {
        match event {
            InboundEvent::Register { username, avatar } => {
                self.register(origin, username, avatar).await
            }
            InboundEvent::UpdateAvatar { username, avatar } => {
                self.update_avatar(username, avatar).await
            }
            InboundEvent::CreateGroup {
                group_name,
                creator,
            } => self.create_group(group_name, creator).await,
            InboundEvent::JoinGroup {
                group_name,
                username,
            } => self.join_group(origin, group_name, username).await,
            InboundEvent::SendDirect {
                sender,
                receiver,
                text,
                attachment,
            } => self.send_direct(origin, sender, receiver, text, attachment).await,
            InboundEvent::SendGroup {
                sender,
                group_name,
                text,
                attachment,
            } => self.send_group(sender, group_name, text, attachment).await,
            InboundEvent::Typing { sender, receiver } => {
                self.typing_signal(TypingKey::direct(&sender, &receiver)).await
            }
            InboundEvent::TypingGroup { sender, group_name } => {
                self.typing_signal(TypingKey::group(&sender, &group_name)).await
            }
            InboundEvent::StopTyping { sender, receiver } => {
                self.typing_stop(TypingKey::direct(&sender, &receiver)).await
            }
            InboundEvent::StopTypingGroup { sender, group_name } => {
                self.typing_stop(TypingKey::group(&sender, &group_name)).await
            }
        }
    }

    /// Transport-close entry point. A stale close (the binding was already
    /// superseded by a newer registration) publishes nothing.
    pub async fn connection_closed(&self, conn: ConnectionId) -> Vec<Delivery> {
        match self.connections.unregister(conn).await {
            Some(change) => {
                log::info!("{} is offline", change.username);
                let recipients = self.connections.online_handles().await;
                self.presence.publish(&change, &recipients)
            }
            None => Vec::new(),
        }
    }

    /// Timer-expiry entry point; the coordinator already removed the
    /// session, so this only fans out the stop signal.
    pub async fn typing_expired(&self, key: TypingKey) -> Vec<Delivery> {
        self.typing_stop_deliveries(&key).await
    }

    async fn register(
        &self,
        origin: &ConnectionHandle,
        username: String,
        avatar: Option<String>,
    ) -> Result<Vec<Delivery>> {
        let username = required(username, "username")?;
        let outcome = self.connections.register(&username, origin.clone(), avatar).await;
        if let Some(previous) = outcome.previous {
            if previous.id() != origin.id() {
                log::info!("superseding connection {} for {}", previous.id(), username);
                previous.shutdown();
            }
        }
        log::info!("{} is online", username);

        let recipients = self.connections.online_handles().await;
        let mut out = self.presence.publish(&outcome.change, &recipients);
        out.push(Delivery {
            to: origin.clone(),
            event: OutboundEvent::AllStatuses {
                statuses: self.connections.statuses().await,
            },
        });
        out.push(Delivery {
            to: origin.clone(),
            event: OutboundEvent::AllAvatars {
                avatars: self.connections.avatars().await,
            },
        });
        out.push(Delivery {
            to: origin.clone(),
            event: OutboundEvent::AllGroups {
                groups: self.groups.group_names().await,
            },
        });
        Ok(out)
    }

    async fn update_avatar(&self, username: String, avatar: String) -> Result<Vec<Delivery>> {
        let username = required(username, "username")?;
        let avatar = required(avatar, "avatar")?;
        if !self.connections.set_avatar(&username, &avatar).await {
            log::debug!("avatar set for not-yet-registered user {}", username);
        }
        let event = OutboundEvent::AvatarUpdated {
            username,
            avatar,
        };
        Ok(self.broadcast(event).await)
    }

    async fn create_group(&self, group_name: String, creator: String) -> Result<Vec<Delivery>> {
        let group_name = required(group_name, "group_name")?;
        let creator = required(creator, "creator")?;

        let Some(info) = self.groups.create(&group_name, &creator).await else {
            // second creation request for an existing name: no-op
            return Ok(Vec::new());
        };
        log::info!("group {} created by {}", group_name, creator);

        let recipients = self.connections.online_handles().await;
        let group_names = self.groups.group_names().await;
        let mut out = Vec::with_capacity(recipients.len() * 2);
        for handle in recipients {
            out.push(Delivery {
                to: handle.clone(),
                event: OutboundEvent::GroupCreated {
                    group_name: group_name.clone(),
                    members: info.members.clone(),
                },
            });
            out.push(Delivery {
                to: handle,
                event: OutboundEvent::AllGroups {
                    groups: group_names.clone(),
                },
            });
        }
        Ok(out)
    }

    async fn join_group(
        &self,
        origin: &ConnectionHandle,
        group_name: String,
        username: String,
    ) -> Result<Vec<Delivery>> {
        let group_name = required(group_name, "group_name")?;
        let username = required(username, "username")?;

        let members = self.groups.join(&group_name, &username).await?;

        let mut out = Vec::new();
        for handle in self.member_handles(&members, None).await {
            out.push(Delivery {
                to: handle,
                event: OutboundEvent::UserJoinedGroup {
                    group_name: group_name.clone(),
                    username: username.clone(),
                },
            });
        }
        out.push(Delivery {
            to: origin.clone(),
            event: OutboundEvent::GroupMembers {
                group_name,
                members,
            },
        });
        Ok(out)
    }

    async fn send_direct(
        &self,
        origin: &ConnectionHandle,
        sender: String,
        receiver: String,
        text: Option<String>,
        attachment: Option<String>,
    ) -> Result<Vec<Delivery>> {
        let sender = required(sender, "sender")?;
        let receiver = required(receiver, "receiver")?;
        let (text, attachment) = message_body(text, attachment)?;

        let message = Message::direct(
            &sender,
            &receiver,
            text.clone(),
            attachment.clone(),
            Utc::now().to_rfc3339(),
        );
        let timestamp = message.timestamp.clone();
        self.persist(message);

        let mut out = Vec::new();
        if let Some(handle) = self.connections.lookup(&receiver).await {
            out.push(Delivery {
                to: handle.clone(),
                event: OutboundEvent::DirectMessage {
                    sender: sender.clone(),
                    text: text.clone(),
                    attachment: attachment.clone(),
                    timestamp: timestamp.clone(),
                },
            });
            out.push(Delivery {
                to: handle,
                event: OutboundEvent::Notification {
                    sender: sender.clone(),
                    preview: preview(&text),
                },
            });
        }
        out.push(Delivery {
            to: origin.clone(),
            event: OutboundEvent::MessageSent {
                receiver: Some(receiver),
                text,
                attachment,
                timestamp,
            },
        });
        Ok(out)
    }

    async fn send_group(
        &self,
        sender: String,
        group_name: String,
        text: Option<String>,
        attachment: Option<String>,
    ) -> Result<Vec<Delivery>> {
        let sender = required(sender, "sender")?;
        let group_name = required(group_name, "group_name")?;
        let (text, attachment) = message_body(text, attachment)?;

        let members = self
            .groups
            .members(&group_name)
            .await
            .ok_or_else(|| RelayError::GroupNotFound(group_name.clone()))?;

        let message = Message::group(
            &sender,
            &group_name,
            text.clone(),
            attachment.clone(),
            Utc::now().to_rfc3339(),
        );
        let timestamp = message.timestamp.clone();
        self.persist(message);

        let mut out = Vec::new();
        for handle in self.member_handles(&members, None).await {
            out.push(Delivery {
                to: handle,
                event: OutboundEvent::GroupMessage {
                    group_name: group_name.clone(),
                    sender: sender.clone(),
                    text: text.clone(),
                    attachment: attachment.clone(),
                    timestamp: timestamp.clone(),
                },
            });
        }
        Ok(out)
    }

    async fn typing_signal(&self, key: TypingKey) -> Result<Vec<Delivery>> {
        let started = self.typing.signal_typing(key.clone()).await;
        if !started {
            return Ok(Vec::new());
        }
        let recipients = self.typing_recipients(&key).await;
        Ok(recipients
            .into_iter()
            .map(|handle| Delivery {
                to: handle,
                event: OutboundEvent::UserTyping {
                    username: key.sender.clone(),
                    group_name: typing_group_name(&key),
                },
            })
            .collect())
    }

    async fn typing_stop(&self, key: TypingKey) -> Result<Vec<Delivery>> {
        if !self.typing.signal_stop(&key).await {
            return Ok(Vec::new());
        }
        Ok(self.typing_stop_deliveries(&key).await)
    }

    async fn typing_stop_deliveries(&self, key: &TypingKey) -> Vec<Delivery> {
        self.typing_recipients(key)
            .await
            .into_iter()
            .map(|handle| Delivery {
                to: handle,
                event: OutboundEvent::UserStopTyping {
                    username: key.sender.clone(),
                    group_name: typing_group_name(key),
                },
            })
            .collect()
    }

    /// Typing signals go to the addressed recipient(s) only, never back to
    /// the sender.
    async fn typing_recipients(&self, key: &TypingKey) -> Vec<ConnectionHandle> {
        match &key.target {
            TypingTarget::Direct(receiver) => {
                self.connections.lookup(receiver).await.into_iter().collect()
            }
            TypingTarget::Group(group_name) => match self.groups.members(group_name).await {
                Some(members) => self.member_handles(&members, Some(&key.sender)).await,
                None => Vec::new(),
            },
        }
    }

    /// Live handles of the given members, optionally excluding one user.
    async fn member_handles(
        &self,
        members: &[String],
        exclude: Option<&str>,
    ) -> Vec<ConnectionHandle> {
        let mut handles = Vec::new();
        for member in members {
            if exclude == Some(member.as_str()) {
                continue;
            }
            if let Some(handle) = self.connections.lookup(member).await {
                handles.push(handle);
            }
        }
        handles
    }

    async fn broadcast(&self, event: OutboundEvent) -> Vec<Delivery> {
        self.connections
            .online_handles()
            .await
            .into_iter()
            .map(|handle| Delivery {
                to: handle,
                event: event.clone(),
            })
            .collect()
    }

    /// Hand the message to the store without awaiting durability; delivery
    /// and the sender ack must not wait on the disk.
    fn persist(&self, message: Message) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(e) = Database::append_message(&pool, &message).await {
                log::error!("failed to persist message: {}", e);
            }
        });
    }
}

fn required(value: String, field: &str) -> Result<String> {
    if value.trim().is_empty() {
        return Err(RelayError::Validation(format!("{} required", field)));
    }
    Ok(value)
}

/// At least one of text/attachment must be present; empty text is allowed
/// only alongside an attachment.
fn message_body(
    text: Option<String>,
    attachment: Option<String>,
) -> Result<(String, Option<String>)> {
    let text = text.unwrap_or_default();
    if text.is_empty() && attachment.is_none() {
        return Err(RelayError::Validation(
            "text or attachment required".to_string(),
        ));
    }
    Ok((text, attachment))
}

fn preview(text: &str) -> String {
    if text.is_empty() {
        "Sent an attachment".to_string()
    } else {
        text.to_string()
    }
}

fn typing_group_name(key: &TypingKey) -> Option<String> {
    match &key.target {
        TypingTarget::Direct(_) => None,
        TypingTarget::Group(name) => Some(name.clone()),
    }
}
