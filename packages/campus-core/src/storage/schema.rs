//! # Database Schema
//!
//! SQL schema definitions for the Campus message store.
//!
//! ## Schema Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐    ┌─────────────────┐    ┌──────────────────┐     │
//! │  │ direct_messages │    │   chat_groups   │    │ chat_group_      │     │
//! │  ├─────────────────┤    ├─────────────────┤    │ members          │     │
//! │  │ id              │    │ id              │◄───├──────────────────┤     │
//! │  │ sender_id       │    │ name            │    │ group_id         │     │
//! │  │ recipient_id    │    │ creator_id      │    │ user_id          │     │
//! │  │ content         │    │ created_at      │    │ joined_at        │     │
//! │  │ created_at      │    └─────────────────┘    └──────────────────┘     │
//! │  │ read            │             ▲                                      │
//! │  └─────────────────┘             │                                      │
//! │                         ┌─────────────────┐    ┌──────────────────┐     │
//! │                         │ group_messages  │    │ group_message_   │     │
//! │                         ├─────────────────┤    │ reads            │     │
//! │                         │ id              │◄───├──────────────────┤     │
//! │                         │ group_id        │    │ message_id       │     │
//! │                         │ sender_id       │    │ user_id          │     │
//! │                         │ content         │    │ read_at          │     │
//! │                         │ created_at      │    └──────────────────┘     │
//! │                         └─────────────────┘                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All timestamps are Unix milliseconds.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- One-to-one messages
CREATE TABLE IF NOT EXISTS direct_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id INTEGER NOT NULL,
    recipient_id INTEGER NOT NULL,
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    -- Flipped to 1 when the recipient reads it; never flipped back
    read INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_direct_messages_pair
    ON direct_messages(sender_id, recipient_id, created_at);
CREATE INDEX IF NOT EXISTS idx_direct_messages_unread
    ON direct_messages(recipient_id, read);

-- Chat groups; creator is fixed at creation
CREATE TABLE IF NOT EXISTS chat_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    creator_id INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

-- Current member set of each group
CREATE TABLE IF NOT EXISTS chat_group_members (
    group_id INTEGER NOT NULL REFERENCES chat_groups(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL,
    joined_at INTEGER NOT NULL,
    PRIMARY KEY (group_id, user_id)
);
CREATE INDEX IF NOT EXISTS idx_chat_group_members_user
    ON chat_group_members(user_id);

-- Messages posted to a group
CREATE TABLE IF NOT EXISTS group_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL REFERENCES chat_groups(id) ON DELETE CASCADE,
    sender_id INTEGER NOT NULL,
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_group_messages_group
    ON group_messages(group_id, created_at);

-- readBy set of each group message (rows are only ever inserted)
CREATE TABLE IF NOT EXISTS group_message_reads (
    message_id INTEGER NOT NULL REFERENCES group_messages(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL,
    read_at INTEGER NOT NULL,
    PRIMARY KEY (message_id, user_id)
);
"#;
