//! Messaging domain models.
//!
//! These are both the rows the store returns and the payloads the relay
//! pushes over the socket, so they serialize in camelCase.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of an application user.
pub type UserId = i64;

/// Identifier of a chat group.
pub type GroupId = i64;

/// Identifier of a direct or group message.
pub type MessageId = i64;

/// A one-to-one message.
///
/// Only `read` ever changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

/// A message posted to a chat group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    pub id: MessageId,
    pub group_id: GroupId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Users who have read this message. Starts as the sender, only grows.
    pub read_by: BTreeSet<UserId>,
}

/// A named chat group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatGroup {
    pub id: GroupId,
    pub name: String,
    pub creator_id: UserId,
    pub members: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
}

impl ChatGroup {
    pub fn is_member(&self, user_id: UserId) -> bool {
        self.members.contains(&user_id)
    }
}

/// Result of posting to a group: the stored message and the member set it
/// was posted under. Delivery fans out to exactly these members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedGroupMessage {
    pub message: GroupMessage,
    pub members: BTreeSet<UserId>,
}

/// Unread counters for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadSummary {
    /// Sender → number of unread direct messages from them.
    pub direct: BTreeMap<UserId, u64>,
    /// Group → number of messages by others not yet read.
    pub groups: BTreeMap<GroupId, u64>,
    pub total: u64,
}

/// Row counts, for the stats endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub direct_messages: u64,
    pub group_messages: u64,
    pub chat_groups: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_message_wire_format() {
        let msg = DirectMessage {
            id: 1,
            sender_id: 1,
            recipient_id: 2,
            content: "hi".to_string(),
            created_at: crate::time::from_millis(1_700_000_000_000).unwrap(),
            read: false,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["senderId"], 1);
        assert_eq!(json["recipientId"], 2);
        assert_eq!(json["read"], false);
        assert!(json["createdAt"].as_str().unwrap().starts_with("2023-11-14T"));
    }

    #[test]
    fn test_group_message_read_by_serializes_sorted() {
        let msg = GroupMessage {
            id: 3,
            group_id: 9,
            sender_id: 2,
            content: "standup in 5".to_string(),
            created_at: crate::time::now(),
            read_by: [3, 1, 2].into_iter().collect(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["readBy"], serde_json::json!([1, 2, 3]));
        assert_eq!(json["groupId"], 9);
    }

    #[test]
    fn test_is_member() {
        let group = ChatGroup {
            id: 1,
            name: "Capstone".to_string(),
            creator_id: 1,
            members: [1, 2, 3].into_iter().collect(),
            created_at: crate::time::now(),
        };
        assert!(group.is_member(2));
        assert!(!group.is_member(4));
    }
}
