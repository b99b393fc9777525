//! # Database
//!
//! SQLite implementation of [`MessageStore`].
//!
//! ## Database Operations
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DATABASE OPERATIONS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                                                    │
//! │  │  Relay session  │                                                    │
//! │  │  / REST API     │                                                    │
//! │  └────────┬────────┘                                                    │
//! │           │  (spawn_blocking)                                           │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                    │
//! │  │    Database     │  High-level API                                    │
//! │  │   (this file)   │  - Direct messages + read flags                    │
//! │  │                 │  - Chat groups + membership                        │
//! │  │                 │  - Group messages + readBy                         │
//! │  └────────┬────────┘                                                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                    │
//! │  │    rusqlite     │  One connection behind a mutex                     │
//! │  └────────┬────────┘                                                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                    │
//! │  │   SQLite DB     │  - In-memory for tests                             │
//! │  │                 │  - File for production                             │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::schema;
use super::MessageStore;
use crate::error::{Error, Result};
use crate::models::{
    ChatGroup, DirectMessage, GroupId, GroupMessage, MessageId, PostedGroupMessage, StoreStats,
    UnreadSummary, UserId,
};
use crate::time;

/// The main database handle
///
/// Cloning shares the underlying connection.
#[derive(Clone)]
pub struct Database {
    /// The underlying SQLite connection
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::DatabaseError(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::DatabaseError(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| Error::DatabaseError(format!("Failed to enable foreign keys: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        // Missing table reads as "fresh database"
        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::DatabaseError(format!("Failed to create tables: {}", e)))?;

                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| {
                    Error::DatabaseError(format!("Failed to set schema version: {}", e))
                })?;

                tracing::info!(
                    version = schema::SCHEMA_VERSION,
                    "Database schema created"
                );
            }
            Some(v) if v == schema::SCHEMA_VERSION => {
                tracing::debug!(version = v, "Database schema up to date");
            }
            Some(v) => {
                return Err(Error::StorageCorrupted(format!(
                    "Unsupported schema version {} (expected {})",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
        }

        Ok(())
    }
}

// ============================================================================
// ROW HELPERS
// ============================================================================

fn limit_param(limit: Option<usize>) -> i64 {
    // SQLite treats a negative LIMIT as "no limit"
    limit
        .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
        .unwrap_or(-1)
}

fn millis_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    time::from_millis(millis).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn direct_from_row(row: &Row<'_>) -> rusqlite::Result<DirectMessage> {
    Ok(DirectMessage {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        recipient_id: row.get(2)?,
        content: row.get(3)?,
        created_at: millis_column(row, 4)?,
        read: row.get(5)?,
    })
}

const DIRECT_COLUMNS: &str = "id, sender_id, recipient_id, content, created_at, read";

fn load_direct_message(conn: &Connection, id: MessageId) -> Result<Option<DirectMessage>> {
    conn.query_row(
        &format!("SELECT {} FROM direct_messages WHERE id = ?", DIRECT_COLUMNS),
        params![id],
        direct_from_row,
    )
    .optional()
    .map_err(|e| Error::DatabaseError(format!("Failed to read message: {}", e)))
}

fn conversation_page(
    conn: &Connection,
    a: UserId,
    b: UserId,
    limit: Option<usize>,
) -> Result<Vec<DirectMessage>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM direct_messages
             WHERE (sender_id = ?1 AND recipient_id = ?2)
                OR (sender_id = ?2 AND recipient_id = ?1)
             ORDER BY created_at DESC, id DESC LIMIT ?3",
            DIRECT_COLUMNS
        ))
        .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

    let mut messages = stmt
        .query_map(params![a, b, limit_param(limit)], direct_from_row)
        .map_err(|e| Error::DatabaseError(format!("Failed to query messages: {}", e)))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::DatabaseError(format!("Failed to read message: {}", e)))?;

    // Reverse to get chronological order
    messages.reverse();

    Ok(messages)
}

fn load_group(conn: &Connection, group_id: GroupId) -> Result<Option<ChatGroup>> {
    let header = conn
        .query_row(
            "SELECT id, name, creator_id, created_at FROM chat_groups WHERE id = ?",
            params![group_id],
            |row| {
                Ok((
                    row.get::<_, GroupId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, UserId>(2)?,
                    millis_column(row, 3)?,
                ))
            },
        )
        .optional()
        .map_err(|e| Error::DatabaseError(format!("Failed to read group: {}", e)))?;

    let (id, name, creator_id, created_at) = match header {
        Some(h) => h,
        None => return Ok(None),
    };

    let mut stmt = conn
        .prepare("SELECT user_id FROM chat_group_members WHERE group_id = ?")
        .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;
    let members = stmt
        .query_map(params![group_id], |row| row.get::<_, UserId>(0))
        .map_err(|e| Error::DatabaseError(format!("Failed to query members: {}", e)))?
        .collect::<rusqlite::Result<BTreeSet<UserId>>>()
        .map_err(|e| Error::DatabaseError(format!("Failed to read member: {}", e)))?;

    Ok(Some(ChatGroup {
        id,
        name,
        creator_id,
        members,
        created_at,
    }))
}

fn require_group(conn: &Connection, group_id: GroupId) -> Result<ChatGroup> {
    load_group(conn, group_id)?.ok_or(Error::GroupNotFound(group_id))
}

fn require_member(group: &ChatGroup, user_id: UserId) -> Result<()> {
    if group.is_member(user_id) {
        Ok(())
    } else {
        Err(Error::NotGroupMember {
            group_id: group.id,
            user_id,
        })
    }
}

fn count(conn: &Connection, sql: &str) -> Result<u64> {
    let n: i64 = conn
        .query_row(sql, [], |row| row.get(0))
        .map_err(|e| Error::DatabaseError(format!("Failed to count rows: {}", e)))?;
    Ok(n.max(0) as u64)
}

// ============================================================================
// MESSAGE STORE
// ============================================================================

impl MessageStore for Database {
    // ========================================================================
    // DIRECT MESSAGES
    // ========================================================================

    fn insert_direct_message(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<DirectMessage> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO direct_messages (sender_id, recipient_id, content, created_at, read)
             VALUES (?, ?, ?, ?, 0)",
            params![
                sender_id,
                recipient_id,
                content,
                created_at.timestamp_millis()
            ],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to store message: {}", e)))?;

        let id = conn.last_insert_rowid();
        tracing::debug!(
            message_id = id,
            sender_id = sender_id,
            recipient_id = recipient_id,
            "Stored direct message"
        );

        load_direct_message(&conn, id)?
            .ok_or_else(|| Error::Internal(format!("Inserted message {} vanished", id)))
    }

    fn get_messages_between_users(
        &self,
        a: UserId,
        b: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<DirectMessage>> {
        let conn = self.conn.lock();
        conversation_page(&conn, a, b, limit)
    }

    fn read_conversation(
        &self,
        reader: UserId,
        peer: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<DirectMessage>> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        let messages = conversation_page(&tx, reader, peer, limit)?;

        // Only what this page showed the reader
        let mut marked = 0usize;
        {
            let mut stmt = tx
                .prepare("UPDATE direct_messages SET read = 1 WHERE id = ? AND read = 0")
                .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;
            for message in messages
                .iter()
                .filter(|m| m.sender_id == peer && m.recipient_id == reader && !m.read)
            {
                marked += stmt
                    .execute(params![message.id])
                    .map_err(|e| Error::DatabaseError(format!("Failed to mark read: {}", e)))?;
            }
        }

        tx.commit()
            .map_err(|e| Error::DatabaseError(format!("Failed to commit read marks: {}", e)))?;

        if marked > 0 {
            tracing::debug!(reader = reader, peer = peer, count = marked, "Marked page read");
        }

        Ok(messages)
    }

    fn mark_message_as_read(&self, message_id: MessageId) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE direct_messages SET read = 1 WHERE id = ? AND read = 0",
                params![message_id],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to mark read: {}", e)))?;

        if rows > 0 {
            return Ok(true);
        }

        match load_direct_message(&conn, message_id)? {
            Some(_) => Ok(false),
            None => Err(Error::MessageNotFound(message_id)),
        }
    }

    fn mark_conversation_read(&self, reader: UserId, peer: UserId) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE direct_messages SET read = 1
                 WHERE sender_id = ? AND recipient_id = ? AND read = 0",
                params![peer, reader],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to mark messages read: {}", e)))?;

        if rows > 0 {
            tracing::debug!(reader = reader, peer = peer, count = rows, "Marked conversation read");
        }

        Ok(rows)
    }

    fn unread_summary(&self, user_id: UserId) -> Result<UnreadSummary> {
        let conn = self.conn.lock();
        let mut summary = UnreadSummary::default();

        let mut stmt = conn
            .prepare(
                "SELECT sender_id, COUNT(*) FROM direct_messages
                 WHERE recipient_id = ? AND read = 0
                 GROUP BY sender_id",
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;
        let direct = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get::<_, UserId>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| Error::DatabaseError(format!("Failed to count unread: {}", e)))?;
        for entry in direct {
            let (sender, n) =
                entry.map_err(|e| Error::DatabaseError(format!("Failed to read count: {}", e)))?;
            summary.direct.insert(sender, n.max(0) as u64);
        }

        let mut stmt = conn
            .prepare(
                "SELECT m.group_id, COUNT(*) FROM group_messages m
                 JOIN chat_group_members gm ON gm.group_id = m.group_id AND gm.user_id = ?1
                 WHERE m.sender_id != ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM group_message_reads r
                       WHERE r.message_id = m.id AND r.user_id = ?1
                   )
                 GROUP BY m.group_id",
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;
        let groups = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get::<_, GroupId>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| Error::DatabaseError(format!("Failed to count unread: {}", e)))?;
        for entry in groups {
            let (group, n) =
                entry.map_err(|e| Error::DatabaseError(format!("Failed to read count: {}", e)))?;
            summary.groups.insert(group, n.max(0) as u64);
        }

        summary.total = summary.direct.values().sum::<u64>() + summary.groups.values().sum::<u64>();
        Ok(summary)
    }

    // ========================================================================
    // GROUP OPERATIONS
    // ========================================================================

    fn create_chat_group(
        &self,
        name: &str,
        creator_id: UserId,
        members: &BTreeSet<UserId>,
        created_at: DateTime<Utc>,
    ) -> Result<ChatGroup> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidRequest("group name must not be empty".to_string()));
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "INSERT INTO chat_groups (name, creator_id, created_at) VALUES (?, ?, ?)",
            params![name, creator_id, created_at.timestamp_millis()],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to create group: {}", e)))?;
        let group_id = tx.last_insert_rowid();

        for user_id in members.iter().chain(std::iter::once(&creator_id)) {
            tx.execute(
                "INSERT OR IGNORE INTO chat_group_members (group_id, user_id, joined_at)
                 VALUES (?, ?, ?)",
                params![group_id, *user_id, created_at.timestamp_millis()],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to add member: {}", e)))?;
        }

        let group = require_group(&tx, group_id)?;
        tx.commit()
            .map_err(|e| Error::DatabaseError(format!("Failed to commit group: {}", e)))?;

        tracing::info!(
            group_id = group_id,
            creator_id = creator_id,
            members = group.members.len(),
            "Created chat group"
        );
        Ok(group)
    }

    fn get_chat_group(&self, group_id: GroupId) -> Result<Option<ChatGroup>> {
        let conn = self.conn.lock();
        load_group(&conn, group_id)
    }

    fn groups_for_user(&self, user_id: UserId) -> Result<Vec<ChatGroup>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT group_id FROM chat_group_members WHERE user_id = ? ORDER BY group_id",
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get::<_, GroupId>(0))
            .map_err(|e| Error::DatabaseError(format!("Failed to query groups: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::DatabaseError(format!("Failed to read group id: {}", e)))?;

        let mut groups = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(group) = load_group(&conn, id)? {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    fn add_group_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> Result<ChatGroup> {
        let conn = self.conn.lock();
        require_group(&conn, group_id)?;

        let added = conn
            .execute(
                "INSERT OR IGNORE INTO chat_group_members (group_id, user_id, joined_at)
                 VALUES (?, ?, ?)",
                params![group_id, user_id, joined_at.timestamp_millis()],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to add member: {}", e)))?;

        if added > 0 {
            tracing::info!(group_id = group_id, user_id = user_id, "Added group member");
        }

        require_group(&conn, group_id)
    }

    fn remove_group_member(&self, group_id: GroupId, user_id: UserId) -> Result<ChatGroup> {
        let conn = self.conn.lock();
        let group = require_group(&conn, group_id)?;

        if group.creator_id == user_id {
            return Err(Error::CannotRemoveCreator(group_id));
        }
        require_member(&group, user_id)?;

        conn.execute(
            "DELETE FROM chat_group_members WHERE group_id = ? AND user_id = ?",
            params![group_id, user_id],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to remove member: {}", e)))?;

        tracing::info!(group_id = group_id, user_id = user_id, "Removed group member");
        require_group(&conn, group_id)
    }

    // ========================================================================
    // GROUP MESSAGES
    // ========================================================================

    fn post_group_message(
        &self,
        group_id: GroupId,
        sender_id: UserId,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<PostedGroupMessage> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        let group = require_group(&tx, group_id)?;
        require_member(&group, sender_id)?;

        let at = created_at.timestamp_millis();
        tx.execute(
            "INSERT INTO group_messages (group_id, sender_id, content, created_at)
             VALUES (?, ?, ?, ?)",
            params![group_id, sender_id, content, at],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to store group message: {}", e)))?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO group_message_reads (message_id, user_id, read_at) VALUES (?, ?, ?)",
            params![id, sender_id, at],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to store read receipt: {}", e)))?;

        tx.commit()
            .map_err(|e| Error::DatabaseError(format!("Failed to commit group message: {}", e)))?;

        tracing::debug!(
            message_id = id,
            group_id = group_id,
            sender_id = sender_id,
            "Stored group message"
        );

        let created_at = time::from_millis(at)
            .ok_or_else(|| Error::Internal(format!("Timestamp {} out of range", at)))?;

        Ok(PostedGroupMessage {
            message: GroupMessage {
                id,
                group_id,
                sender_id,
                content: content.to_string(),
                created_at,
                read_by: BTreeSet::from([sender_id]),
            },
            members: group.members,
        })
    }

    fn get_messages_by_chat_group(
        &self,
        group_id: GroupId,
        limit: Option<usize>,
    ) -> Result<Vec<GroupMessage>> {
        let conn = self.conn.lock();
        require_group(&conn, group_id)?;

        // Receipts for the returned page only
        let mut reads: HashMap<MessageId, BTreeSet<UserId>> = HashMap::new();
        let mut stmt = conn
            .prepare(
                "SELECT message_id, user_id FROM group_message_reads
                 WHERE message_id IN (
                     SELECT id FROM group_messages
                     WHERE group_id = ?1
                     ORDER BY created_at DESC, id DESC LIMIT ?2
                 )",
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map(params![group_id, limit_param(limit)], |row| {
                Ok((row.get::<_, MessageId>(0)?, row.get::<_, UserId>(1)?))
            })
            .map_err(|e| Error::DatabaseError(format!("Failed to query read receipts: {}", e)))?;
        for row in rows {
            let (message_id, user_id) = row
                .map_err(|e| Error::DatabaseError(format!("Failed to read receipt: {}", e)))?;
            reads.entry(message_id).or_default().insert(user_id);
        }

        let mut stmt = conn
            .prepare(
                "SELECT id, group_id, sender_id, content, created_at FROM group_messages
                 WHERE group_id = ?
                 ORDER BY created_at DESC, id DESC LIMIT ?",
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;
        let mut messages = stmt
            .query_map(params![group_id, limit_param(limit)], |row| {
                Ok(GroupMessage {
                    id: row.get(0)?,
                    group_id: row.get(1)?,
                    sender_id: row.get(2)?,
                    content: row.get(3)?,
                    created_at: millis_column(row, 4)?,
                    read_by: BTreeSet::new(),
                })
            })
            .map_err(|e| Error::DatabaseError(format!("Failed to query group messages: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::DatabaseError(format!("Failed to read group message: {}", e)))?;

        for message in &mut messages {
            if let Some(read_by) = reads.remove(&message.id) {
                message.read_by = read_by;
            }
        }

        // Reverse to get chronological order
        messages.reverse();

        Ok(messages)
    }

    fn mark_group_read(
        &self,
        group_id: GroupId,
        user_id: UserId,
        read_at: DateTime<Utc>,
    ) -> Result<usize> {
        let conn = self.conn.lock();
        let group = require_group(&conn, group_id)?;
        require_member(&group, user_id)?;

        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO group_message_reads (message_id, user_id, read_at)
                 SELECT id, ?, ? FROM group_messages WHERE group_id = ?",
                params![user_id, read_at.timestamp_millis(), group_id],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to mark group read: {}", e)))?;

        Ok(rows)
    }

    fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        Ok(StoreStats {
            direct_messages: count(&conn, "SELECT COUNT(*) FROM direct_messages")?,
            group_messages: count(&conn, "SELECT COUNT(*) FROM group_messages")?,
            chat_groups: count(&conn, "SELECT COUNT(*) FROM chat_groups")?,
        })
    }
}
