//! # Error Handling
//!
//! Error types shared by the message store and the relay.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                      │
//! │  │                                                                      │
//! │  ├── Frame Errors (socket input the relay could not understand)         │
//! │  │   └── MalformedFrame        - Non-JSON or unrecognized frame         │
//! │  │                                                                      │
//! │  ├── Validation Errors                                                  │
//! │  │   ├── MissingField          - Required field absent                  │
//! │  │   ├── EmptyContent          - Message body empty or whitespace       │
//! │  │   ├── ContentTooLong        - Message body over the limit            │
//! │  │   └── InvalidRequest        - Any other bad input                    │
//! │  │                                                                      │
//! │  ├── Session Errors                                                     │
//! │  │   ├── NotAuthenticated      - Frame sent before "auth"               │
//! │  │   └── AlreadyAuthenticated  - Second "auth" on one connection        │
//! │  │                                                                      │
//! │  ├── Group Errors                                                       │
//! │  │   ├── GroupNotFound         - No such chat group                     │
//! │  │   ├── NotGroupMember        - User is not in the member set          │
//! │  │   └── CannotRemoveCreator   - Creator is pinned to the group         │
//! │  │                                                                      │
//! │  ├── Message Errors                                                     │
//! │  │   └── MessageNotFound       - No such message                        │
//! │  │                                                                      │
//! │  └── Storage / Internal Errors                                          │
//! │      ├── DatabaseError         - SQLite failure                         │
//! │      ├── StorageCorrupted      - Row could not be decoded               │
//! │      └── Internal              - Should not happen                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant is recoverable from the connection's point of view: the
//! relay turns it into an error frame and keeps the socket open.

use thiserror::Error;

use crate::models::{GroupId, MessageId, UserId};

/// Result type alias for Campus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Campus messaging
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ========================================================================
    // Frame Errors (100-199)
    // ========================================================================

    /// The frame was not JSON, was binary, or had an unknown shape.
    /// The detail is for logs only.
    #[error("Invalid message format")]
    MalformedFrame(String),

    // ========================================================================
    // Validation Errors (200-299)
    // ========================================================================

    /// A required field was absent
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Message content was empty or whitespace only
    #[error("Message content must not be empty")]
    EmptyContent,

    /// Message content exceeded the configured maximum
    #[error("Message content exceeds {max} characters")]
    ContentTooLong { max: usize },

    /// Request rejected for another reason
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ========================================================================
    // Session Errors (300-399)
    // ========================================================================

    #[error("Must authenticate before sending messages")]
    NotAuthenticated,

    #[error("Connection is already authenticated")]
    AlreadyAuthenticated,

    // ========================================================================
    // Group Errors (400-499)
    // ========================================================================

    #[error("Chat group {0} not found")]
    GroupNotFound(GroupId),

    #[error("User {user_id} is not a member of chat group {group_id}")]
    NotGroupMember { group_id: GroupId, user_id: UserId },

    #[error("The creator of chat group {0} cannot be removed")]
    CannotRemoveCreator(GroupId),

    // ========================================================================
    // Message Errors (500-599)
    // ========================================================================

    #[error("Message {0} not found")]
    MessageNotFound(MessageId),

    // ========================================================================
    // Storage / Internal Errors (900-999)
    // ========================================================================

    /// SQLite returned an error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stored row could not be decoded
    #[error("Storage corrupted: {0}")]
    StorageCorrupted(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the numeric error code.
    ///
    /// Codes are organized by category:
    /// - 100-199: Frames
    /// - 200-299: Validation
    /// - 300-399: Session
    /// - 400-499: Groups
    /// - 500-599: Messages
    /// - 900-999: Storage / internal
    pub fn code(&self) -> i32 {
        match self {
            Error::MalformedFrame(_) => 100,

            Error::MissingField(_) => 200,
            Error::EmptyContent => 201,
            Error::ContentTooLong { .. } => 202,
            Error::InvalidRequest(_) => 203,

            Error::NotAuthenticated => 300,
            Error::AlreadyAuthenticated => 301,

            Error::GroupNotFound(_) => 400,
            Error::NotGroupMember { .. } => 401,
            Error::CannotRemoveCreator(_) => 402,

            Error::MessageNotFound(_) => 500,

            Error::DatabaseError(_) => 900,
            Error::StorageCorrupted(_) => 901,
            Error::Internal(_) => 902,
        }
    }

    /// True for failures on the server side rather than bad client input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Error::DatabaseError(_) | Error::StorageCorrupted(_) | Error::Internal(_)
        )
    }

    /// Message safe to show a client.
    ///
    /// Server-side failures are reported generically; their detail stays in
    /// the logs.
    pub fn client_message(&self) -> String {
        if self.is_internal() {
            "Failed to store message".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::DatabaseError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_by_category() {
        assert_eq!(Error::MalformedFrame("x".into()).code(), 100);
        assert_eq!(Error::EmptyContent.code(), 201);
        assert_eq!(Error::NotAuthenticated.code(), 300);
        assert_eq!(
            Error::NotGroupMember {
                group_id: 1,
                user_id: 4
            }
            .code(),
            401
        );
        assert_eq!(Error::DatabaseError("locked".into()).code(), 900);
    }

    #[test]
    fn test_malformed_frame_hides_detail() {
        let err = Error::MalformedFrame("expected value at line 1 column 1".into());
        assert_eq!(err.to_string(), "Invalid message format");
    }

    #[test]
    fn test_client_message_hides_storage_detail() {
        let err = Error::DatabaseError("disk I/O error".into());
        assert!(err.is_internal());
        assert_eq!(err.client_message(), "Failed to store message");

        let err = Error::NotGroupMember {
            group_id: 7,
            user_id: 4,
        };
        assert!(!err.is_internal());
        assert_eq!(
            err.client_message(),
            "User 4 is not a member of chat group 7"
        );
    }

    #[test]
    fn test_sqlite_errors_map_to_database_error() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::DatabaseError(_)));
        assert_eq!(err.code(), 900);
    }
}
