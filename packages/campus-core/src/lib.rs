//! # Campus Core
//!
//! Messaging domain library for the Campus student network: the models
//! that cross the wire, the error taxonomy, and the SQLite message store.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CAMPUS CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐    │
//! │  │   Models    │  │    Error    │  │    Time     │  │   Storage    │    │
//! │  │             │  │             │  │             │  │              │    │
//! │  │ - Direct    │  │ - Codes     │  │ - Millis    │  │ - Trait      │    │
//! │  │ - Group     │  │ - Client    │  │   precision │  │ - SQLite     │    │
//! │  │ - Unread    │  │   messages  │  │             │  │ - Schema     │    │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └──────────────┘    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`models`] - Direct messages, chat groups, group messages
//! - [`storage`] - `MessageStore` trait and its SQLite implementation
//! - [`time`] - Millisecond timestamps
//!
//! The relay (`campus-relay`) depends on this crate and owns everything
//! connection-related.

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{Error, Result};
pub use models::{
    ChatGroup, DirectMessage, GroupId, GroupMessage, MessageId, PostedGroupMessage, StoreStats,
    UnreadSummary, UserId,
};
pub use storage::{Database, MessageStore};
