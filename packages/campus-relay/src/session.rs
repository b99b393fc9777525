//! Per-connection session state machine.
//!
//! A session starts `Unauthenticated`. An `auth` frame binds it to a user
//! and registers its socket; from then on it may send direct and group
//! messages. Every failure is answered with an `error` frame and the
//! connection stays open.
//!
//! The session only talks to its socket through its outbound channel, so
//! it runs the same way under the WebSocket handler and in tests.

use campus_core::{Error, GroupId, Result, UserId};
use uuid::Uuid;

use crate::protocol::{ClientFrame, ServerFrame};
use crate::registry::{ClientHandle, ClientSender};
use crate::state::RelayState;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(UserId),
}

/// One socket's session.
pub struct Session {
    relay: RelayState,
    handle: ClientHandle,
    state: SessionState,
}

impl Session {
    pub fn new(relay: RelayState, sender: ClientSender) -> Self {
        Self {
            relay,
            handle: ClientHandle::new(sender),
            state: SessionState::Unauthenticated,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection_id(&self) -> Uuid {
        self.handle.connection_id
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self.state {
            SessionState::Authenticated(user_id) => Some(user_id),
            SessionState::Unauthenticated => None,
        }
    }

    /// Process one inbound text frame.
    pub async fn handle_text(&mut self, text: &str) {
        let result = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => self.dispatch(frame).await,
            Err(e) => Err(Error::MalformedFrame(e.to_string())),
        };

        if let Err(err) = result {
            self.reject(err);
        }
    }

    /// Binary frames are not part of the protocol.
    pub fn handle_binary(&mut self, len: usize) {
        self.reject(Error::MalformedFrame(format!("binary frame ({} bytes)", len)));
    }

    /// Release the registry entry, if it still belongs to this connection.
    pub fn close(&mut self) {
        if let SessionState::Authenticated(user_id) = self.state {
            self.relay
                .registry
                .unregister_connection(user_id, self.handle.connection_id);
        }
    }

    async fn dispatch(&mut self, frame: ClientFrame) -> Result<()> {
        match (self.state, frame) {
            (SessionState::Unauthenticated, ClientFrame::Auth { user_id }) => {
                self.authenticate(user_id)
            }
            (SessionState::Unauthenticated, _) => Err(Error::NotAuthenticated),
            (SessionState::Authenticated(_), ClientFrame::Auth { .. }) => {
                Err(Error::AlreadyAuthenticated)
            }
            (
                SessionState::Authenticated(sender_id),
                ClientFrame::DirectMessage {
                    recipient_id,
                    content,
                },
            ) => {
                let recipient_id = recipient_id.ok_or(Error::MissingField("recipientId"))?;
                let content = self.validate_content(content)?;
                self.send_direct(sender_id, recipient_id, content).await
            }
            (
                SessionState::Authenticated(sender_id),
                ClientFrame::GroupMessage { group_id, content },
            ) => {
                let group_id = group_id.ok_or(Error::MissingField("groupId"))?;
                let content = self.validate_content(content)?;
                self.send_group(sender_id, group_id, content).await
            }
        }
    }

    fn authenticate(&mut self, user_id: Option<UserId>) -> Result<()> {
        let user_id = user_id.ok_or(Error::MissingField("userId"))?;

        self.relay.registry.register(user_id, self.handle.clone());
        self.state = SessionState::Authenticated(user_id);
        self.reply(ServerFrame::Authenticated { user_id });

        Ok(())
    }

    fn validate_content(&self, content: Option<String>) -> Result<String> {
        let content = content.ok_or(Error::MissingField("content"))?;
        if content.trim().is_empty() {
            return Err(Error::EmptyContent);
        }

        let max = self.relay.config.max_message_length;
        if content.chars().count() > max {
            return Err(Error::ContentTooLong { max });
        }

        Ok(content)
    }

    async fn send_direct(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        content: String,
    ) -> Result<()> {
        let message = self
            .relay
            .with_store(move |store| {
                store.insert_direct_message(sender_id, recipient_id, &content, campus_core::time::now())
            })
            .await?;

        let frame = ServerFrame::DirectMessage { message };

        // Echo on this socket, even if a newer one now owns the user id
        self.reply(frame.clone());

        if recipient_id != sender_id {
            let delivered = self.relay.registry.send_to(recipient_id, frame);
            tracing::debug!(
                sender_id = sender_id,
                recipient_id = recipient_id,
                delivered = delivered,
                "Direct message routed"
            );
        }

        Ok(())
    }

    async fn send_group(&self, sender_id: UserId, group_id: GroupId, content: String) -> Result<()> {
        let posted = self
            .relay
            .with_store(move |store| {
                store.post_group_message(group_id, sender_id, &content, campus_core::time::now())
            })
            .await?;

        let frame = ServerFrame::GroupMessage {
            message: posted.message,
        };

        self.reply(frame.clone());

        let mut delivered = 0usize;
        for member in posted.members.iter().filter(|&&m| m != sender_id) {
            if self.relay.registry.send_to(*member, frame.clone()) {
                delivered += 1;
            }
        }

        tracing::debug!(
            sender_id = sender_id,
            group_id = group_id,
            members = posted.members.len(),
            delivered = delivered,
            "Group message fanned out"
        );

        Ok(())
    }

    fn reject(&self, err: Error) {
        let user_id = self.user_id();

        match &err {
            Error::MalformedFrame(detail) => tracing::warn!(
                user_id = ?user_id,
                error = %detail,
                "Failed to parse client frame"
            ),
            e if e.is_internal() => tracing::error!(
                user_id = ?user_id,
                code = e.code(),
                error = %e,
                "Failed to process client frame"
            ),
            e => tracing::debug!(
                user_id = ?user_id,
                code = e.code(),
                error = %e,
                "Rejected client frame"
            ),
        }

        self.reply(ServerFrame::error(err.client_message()));
    }

    fn reply(&self, frame: ServerFrame) {
        if !self.handle.send(frame) {
            tracing::debug!(
                connection_id = %self.handle.connection_id,
                "Dropped frame for closed connection"
            );
        }
    }
}
