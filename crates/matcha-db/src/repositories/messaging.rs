use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use matcha_types::models::NotificationKind;

use crate::codec;
use crate::filter::Filter;
use crate::models::{Message, Notification};
use crate::{Result, StoreError};

// -- Messages --

const MESSAGE_COLUMNS: &str =
    "SELECT id, sender_id, recipient_id, content, sent_at, is_read FROM messages";

fn message_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        sender_id: codec::uuid_at(row, 1)?,
        recipient_id: codec::uuid_at(row, 2)?,
        content: row.get(3)?,
        sent_at: codec::ts_at(row, 4)?,
        is_read: row.get(5)?,
    })
}

/// Structured message lookup. `conversation` matches both directions.
#[derive(Debug, Default, Clone)]
pub struct MessageQuery {
    pub conversation: Option<(Uuid, Uuid)>,
    pub sender: Option<Uuid>,
    pub recipient: Option<Uuid>,
    pub is_read: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub struct MessageRepository<'c> {
    conn: &'c Connection,
}

impl<'c> MessageRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn create(
        &self,
        sender: Uuid,
        recipient: Uuid,
        content: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<Message> {
        self.conn.execute(
            "INSERT INTO messages (sender_id, recipient_id, content, sent_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                sender.to_string(),
                recipient.to_string(),
                content,
                codec::ts(&sent_at),
            ],
        )?;
        Ok(Message {
            id: self.conn.last_insert_rowid(),
            sender_id: sender,
            recipient_id: recipient,
            content: content.to_string(),
            sent_at,
            is_read: false,
        })
    }

    pub fn find(&self, id: i64) -> Result<Option<Message>> {
        let mut rows = Filter::new()
            .key("id", Some(id))
            .select(self.conn, MESSAGE_COLUMNS, message_row)?;
        Ok(rows.pop())
    }

    /// Newest first (`sent_at DESC, id DESC`).
    pub fn query(&self, q: &MessageQuery) -> Result<Vec<Message>> {
        Filter::new()
            .between("sender_id", "recipient_id", q.conversation)
            .id("sender_id", q.sender)
            .id("recipient_id", q.recipient)
            .flag("is_read", q.is_read)
            .order_by("sent_at DESC, id DESC")
            .page(q.limit, q.offset)
            .select(self.conn, MESSAGE_COLUMNS, message_row)
    }

    pub fn latest_between(&self, a: Uuid, b: Uuid) -> Result<Option<Message>> {
        let mut rows = self.query(&MessageQuery {
            conversation: Some((a, b)),
            limit: Some(1),
            ..Default::default()
        })?;
        Ok(rows.pop())
    }

    pub fn mark_read(&self, id: i64) -> Result<()> {
        let updated = self
            .conn
            .execute("UPDATE messages SET is_read = 1 WHERE id = ?1", [id])?;
        if updated == 0 {
            return Err(StoreError::not_found("message", id));
        }
        Ok(())
    }
}

// -- Notifications --

const NOTIFICATION_COLUMNS: &str =
    "SELECT id, recipient_id, sender_id, type, is_read, created_at FROM notifications";

fn notification_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        recipient_id: codec::uuid_at(row, 1)?,
        sender_id: codec::opt_uuid_at(row, 2)?,
        kind: codec::enum_at(row, 3)?,
        is_read: row.get(4)?,
        created_at: codec::ts_at(row, 5)?,
    })
}

#[derive(Debug, Default, Clone)]
pub struct NotificationQuery {
    pub recipient: Option<Uuid>,
    pub is_read: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub struct NotificationRepository<'c> {
    conn: &'c Connection,
}

impl<'c> NotificationRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn create(
        &self,
        recipient: Uuid,
        sender: Option<Uuid>,
        kind: NotificationKind,
    ) -> Result<Notification> {
        let created_at = Utc::now();
        self.conn.execute(
            "INSERT INTO notifications (recipient_id, sender_id, type, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                recipient.to_string(),
                sender.map(|s| s.to_string()),
                kind.as_str(),
                codec::ts(&created_at),
            ],
        )?;
        Ok(Notification {
            id: self.conn.last_insert_rowid(),
            recipient_id: recipient,
            sender_id: sender,
            kind,
            is_read: false,
            created_at,
        })
    }

    pub fn find(&self, id: i64) -> Result<Option<Notification>> {
        let mut rows = Filter::new()
            .key("id", Some(id))
            .select(self.conn, NOTIFICATION_COLUMNS, notification_row)?;
        Ok(rows.pop())
    }

    /// Newest first.
    pub fn query(&self, q: &NotificationQuery) -> Result<Vec<Notification>> {
        Filter::new()
            .id("recipient_id", q.recipient)
            .flag("is_read", q.is_read)
            .order_by("created_at DESC, id DESC")
            .page(q.limit, q.offset)
            .select(self.conn, NOTIFICATION_COLUMNS, notification_row)
    }

    pub fn mark_read(&self, id: i64) -> Result<()> {
        let updated = self
            .conn
            .execute("UPDATE notifications SET is_read = 1 WHERE id = ?1", [id])?;
        if updated == 0 {
            return Err(StoreError::not_found("notification", id));
        }
        Ok(())
    }

    /// Returns how many unread rows were flipped.
    pub fn mark_all_read(&self, recipient: Uuid) -> Result<usize> {
        Filter::new()
            .id("recipient_id", Some(recipient))
            .flag("is_read", Some(false))
            .execute(self.conn, "UPDATE notifications SET is_read = 1")
    }
}
