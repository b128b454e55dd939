use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::codec;
use crate::filter::Filter;
use crate::models::{self, Block, Like, Report, View, ordered_pair};
use crate::Result;

// -- Likes --

pub struct LikeRepository<'c> {
    conn: &'c Connection,
}

impl<'c> LikeRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn find(&self, liker: Uuid, liked: Uuid) -> Result<Option<Like>> {
        let like = self
            .conn
            .query_row(
                "SELECT liker_id, liked_id, created_at FROM likes
                 WHERE liker_id = ?1 AND liked_id = ?2",
                [liker.to_string(), liked.to_string()],
                |row| {
                    Ok(Like {
                        liker_id: codec::uuid_at(row, 0)?,
                        liked_id: codec::uuid_at(row, 1)?,
                        created_at: codec::ts_at(row, 2)?,
                    })
                },
            )
            .optional()?;
        Ok(like)
    }

    /// Idempotent. Returns whether a new row was inserted.
    pub fn create(&self, liker: Uuid, liked: Uuid) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO likes (liker_id, liked_id, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT DO NOTHING",
            params![liker.to_string(), liked.to_string(), codec::ts(&Utc::now())],
        )?;
        Ok(inserted > 0)
    }

    pub fn delete(&self, liker: Uuid, liked: Uuid) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM likes WHERE liker_id = ?1 AND liked_id = ?2",
            [liker.to_string(), liked.to_string()],
        )?;
        Ok(deleted > 0)
    }

    /// Removes likes in both directions.
    pub fn delete_between(&self, a: Uuid, b: Uuid) -> Result<usize> {
        Filter::new()
            .between("liker_id", "liked_id", Some((a, b)))
            .execute(self.conn, "DELETE FROM likes")
    }
}

// -- Connections --

const CONNECTION_COLUMNS: &str = "SELECT user1_id, user2_id, created_at FROM connections";

fn connection_row(row: &Row<'_>) -> rusqlite::Result<models::Connection> {
    Ok(models::Connection {
        user1_id: codec::uuid_at(row, 0)?,
        user2_id: codec::uuid_at(row, 1)?,
        created_at: codec::ts_at(row, 2)?,
    })
}

pub struct ConnectionRepository<'c> {
    conn: &'c Connection,
}

impl<'c> ConnectionRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Looks up the match between `a` and `b` in either argument order.
    pub fn find(&self, a: Uuid, b: Uuid) -> Result<Option<models::Connection>> {
        let (user1, user2) = ordered_pair(a, b);
        let mut rows = Filter::new()
            .id("user1_id", Some(user1))
            .id("user2_id", Some(user2))
            .select(self.conn, CONNECTION_COLUMNS, connection_row)?;
        Ok(rows.pop())
    }

    /// Idempotent. Stores the pair ordered and returns the stored row.
    pub fn create(&self, a: Uuid, b: Uuid) -> Result<models::Connection> {
        let (user1, user2) = ordered_pair(a, b);
        self.conn.execute(
            "INSERT INTO connections (user1_id, user2_id, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT DO NOTHING",
            params![user1.to_string(), user2.to_string(), codec::ts(&Utc::now())],
        )?;
        let mut rows = Filter::new()
            .id("user1_id", Some(user1))
            .id("user2_id", Some(user2))
            .select(self.conn, CONNECTION_COLUMNS, connection_row)?;
        rows.pop()
            .ok_or_else(|| crate::StoreError::not_found("connection", format!("{user1}/{user2}")))
    }

    pub fn delete(&self, a: Uuid, b: Uuid) -> Result<bool> {
        let (user1, user2) = ordered_pair(a, b);
        let deleted = self.conn.execute(
            "DELETE FROM connections WHERE user1_id = ?1 AND user2_id = ?2",
            [user1.to_string(), user2.to_string()],
        )?;
        Ok(deleted > 0)
    }

    /// Every match `user_id` takes part in, newest first.
    pub fn list_for(&self, user_id: Uuid) -> Result<Vec<models::Connection>> {
        Filter::new()
            .involving("user1_id", "user2_id", Some(user_id))
            .order_by("created_at DESC")
            .select(self.conn, CONNECTION_COLUMNS, connection_row)
    }
}

// -- Blocks --

pub struct BlockRepository<'c> {
    conn: &'c Connection,
}

impl<'c> BlockRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn find(&self, blocker: Uuid, blocked: Uuid) -> Result<Option<Block>> {
        let block = self
            .conn
            .query_row(
                "SELECT blocker_id, blocked_id FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
                [blocker.to_string(), blocked.to_string()],
                |row| {
                    Ok(Block {
                        blocker_id: codec::uuid_at(row, 0)?,
                        blocked_id: codec::uuid_at(row, 1)?,
                    })
                },
            )
            .optional()?;
        Ok(block)
    }

    /// True when either user blocked the other.
    pub fn exists_between(&self, a: Uuid, b: Uuid) -> Result<bool> {
        let rows = Filter::new()
            .between("blocker_id", "blocked_id", Some((a, b)))
            .select(self.conn, "SELECT 1 FROM blocks", |row| row.get::<_, i64>(0))?;
        Ok(!rows.is_empty())
    }

    /// Idempotent. Returns whether a new row was inserted.
    pub fn create(&self, blocker: Uuid, blocked: Uuid) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO blocks (blocker_id, blocked_id) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
            [blocker.to_string(), blocked.to_string()],
        )?;
        Ok(inserted > 0)
    }

    pub fn delete(&self, blocker: Uuid, blocked: Uuid) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
            [blocker.to_string(), blocked.to_string()],
        )?;
        Ok(deleted > 0)
    }
}

// -- Views --

#[derive(Debug, Default, Clone)]
pub struct ViewQuery {
    pub viewer: Option<Uuid>,
    pub viewed: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
}

pub struct ViewRepository<'c> {
    conn: &'c Connection,
}

impl<'c> ViewRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn create(&self, viewer: Uuid, viewed: Uuid, at: DateTime<Utc>) -> Result<View> {
        self.conn.execute(
            "INSERT INTO views (viewer_id, viewed_id, viewed_at) VALUES (?1, ?2, ?3)
             ON CONFLICT DO NOTHING",
            params![viewer.to_string(), viewed.to_string(), codec::ts(&at)],
        )?;
        Ok(View {
            viewer_id: viewer,
            viewed_id: viewed,
            viewed_at: at,
        })
    }

    /// Newest first.
    pub fn query(&self, q: &ViewQuery) -> Result<Vec<View>> {
        Filter::new()
            .id("viewer_id", q.viewer)
            .id("viewed_id", q.viewed)
            .since("viewed_at", q.since)
            .order_by("viewed_at DESC")
            .select(
                self.conn,
                "SELECT viewer_id, viewed_id, viewed_at FROM views",
                |row| {
                    Ok(View {
                        viewer_id: codec::uuid_at(row, 0)?,
                        viewed_id: codec::uuid_at(row, 1)?,
                        viewed_at: codec::ts_at(row, 2)?,
                    })
                },
            )
    }

    /// Removes views in both directions.
    pub fn delete_between(&self, a: Uuid, b: Uuid) -> Result<usize> {
        Filter::new()
            .between("viewer_id", "viewed_id", Some((a, b)))
            .execute(self.conn, "DELETE FROM views")
    }
}

// -- Reports --

pub struct ReportRepository<'c> {
    conn: &'c Connection,
}

impl<'c> ReportRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Append-only.
    pub fn create(&self, reporter: Uuid, reported: Uuid, reason: &str) -> Result<Report> {
        let created_at = Utc::now();
        self.conn.execute(
            "INSERT INTO reports (reporter_id, reported_id, reason, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                reporter.to_string(),
                reported.to_string(),
                reason,
                codec::ts(&created_at),
            ],
        )?;
        Ok(Report {
            id: self.conn.last_insert_rowid(),
            reporter_id: reporter,
            reported_id: reported,
            reason: reason.to_string(),
            created_at,
        })
    }

    pub fn list_against(&self, reported: Uuid) -> Result<Vec<Report>> {
        Filter::new()
            .id("reported_id", Some(reported))
            .order_by("created_at DESC")
            .select(
                self.conn,
                "SELECT id, reporter_id, reported_id, reason, created_at FROM reports",
                |row| {
                    Ok(Report {
                        id: row.get(0)?,
                        reporter_id: codec::uuid_at(row, 1)?,
                        reported_id: codec::uuid_at(row, 2)?,
                        reason: row.get(3)?,
                        created_at: codec::ts_at(row, 4)?,
                    })
                },
            )
    }
}
