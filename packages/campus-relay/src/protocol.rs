//! Socket protocol frame definitions.
//!
//! Clients and the relay exchange JSON text frames tagged by `type`.
//! Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use campus_core::{DirectMessage, GroupId, GroupMessage, UserId};

// ── Client → Relay ────────────────────────────────────────────────────────────

/// Frames sent from a client to the relay.
///
/// Payload fields are optional at the parsing layer so that a frame with a
/// recognized `type` but a missing field gets a precise validation error
/// instead of the generic "Invalid message format".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// Bind this connection to a user. Must be sent first after connecting.
    #[serde(rename_all = "camelCase")]
    Auth {
        #[serde(default)]
        user_id: Option<UserId>,
    },

    /// Send a one-to-one message.
    #[serde(rename_all = "camelCase")]
    DirectMessage {
        #[serde(default)]
        recipient_id: Option<UserId>,
        #[serde(default)]
        content: Option<String>,
    },

    /// Post to a chat group the sender belongs to.
    #[serde(rename_all = "camelCase")]
    GroupMessage {
        #[serde(default)]
        group_id: Option<GroupId>,
        #[serde(default)]
        content: Option<String>,
    },
}

// ── Relay → Client ────────────────────────────────────────────────────────────

/// Frames sent from the relay to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame {
    /// Acknowledgement of a successful `auth`.
    #[serde(rename_all = "camelCase")]
    Authenticated { user_id: UserId },

    /// A persisted direct message (echo to the sender, push to the recipient).
    DirectMessage { message: DirectMessage },

    /// A persisted group message (echo to the sender, push to other members).
    GroupMessage { message: GroupMessage },

    /// Something went wrong processing the last frame. The connection stays open.
    Error { message: String },
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
        }
    }
}
