use uuid::Uuid;

use matcha_db::Database;
use matcha_db::models::{Connection, Report};
use matcha_types::models::NotificationKind;

use crate::error::{ApiError, Result};
use crate::services::NotificationService;

pub const MAX_REPORT_REASON: usize = 1000;

#[derive(Clone)]
pub struct UserService {
    db: Database,
    notifications: NotificationService,
}

/// Result of a like. `connection` is set when the like completed a match.
#[derive(Debug, Clone, PartialEq)]
pub struct LikeOutcome {
    pub connection: Option<Connection>,
}

impl LikeOutcome {
    pub fn is_match(&self) -> bool {
        self.connection.is_some()
    }
}

fn distinct(actor: Uuid, target: Uuid) -> Result<()> {
    if actor == target {
        return Err(ApiError::invalid("cannot target yourself"));
    }
    Ok(())
}

impl UserService {
    pub fn new(db: Database, notifications: NotificationService) -> Self {
        Self { db, notifications }
    }

    /// Records the like and, when the reverse like exists, the match. Both
    /// writes share one transaction; notifications follow the commit.
    pub async fn like(&self, liker: Uuid, liked: Uuid) -> Result<LikeOutcome> {
        distinct(liker, liked)?;

        let connection = self
            .db
            .transaction(move |repos| {
                repos
                    .users()
                    .find(liked)?
                    .ok_or_else(|| ApiError::NotFound("user".into()))?;

                let is_match = repos.likes().find(liked, liker)?.is_some();
                repos.likes().create(liker, liked)?;
                if is_match {
                    return Ok(Some(repos.connections().create(liker, liked)?));
                }
                Ok::<_, ApiError>(None)
            })
            .await?;

        self.notifications
            .notify(Some(liker), liked, NotificationKind::Like)
            .await;
        if connection.is_some() {
            self.notifications
                .notify(Some(liker), liked, NotificationKind::Match)
                .await;
            self.notifications
                .notify(Some(liked), liker, NotificationKind::Match)
                .await;
        }

        Ok(LikeOutcome { connection })
    }

    /// Drops the like and any match it held up.
    pub async fn unlike(&self, liker: Uuid, liked: Uuid) -> Result<()> {
        distinct(liker, liked)?;

        self.db
            .transaction(move |repos| {
                repos
                    .users()
                    .find(liked)?
                    .ok_or_else(|| ApiError::NotFound("user".into()))?;
                repos.likes().delete(liker, liked)?;
                repos.connections().delete(liker, liked)?;
                Ok::<_, ApiError>(())
            })
            .await?;

        self.notifications
            .notify(Some(liker), liked, NotificationKind::Unlike)
            .await;
        Ok(())
    }

    /// Removes everything tying the pair together, then records the block.
    /// Returns `false` if the block already existed.
    pub async fn block(&self, blocker: Uuid, blocked: Uuid) -> Result<bool> {
        distinct(blocker, blocked)?;

        self.db
            .transaction(move |repos| {
                repos
                    .users()
                    .find(blocked)?
                    .ok_or_else(|| ApiError::NotFound("user".into()))?;
                repos.connections().delete(blocker, blocked)?;
                repos.likes().delete_between(blocker, blocked)?;
                repos.views().delete_between(blocker, blocked)?;
                Ok(repos.blocks().create(blocker, blocked)?)
            })
            .await
    }

    /// Returns whether a block was removed.
    pub async fn unblock(&self, blocker: Uuid, blocked: Uuid) -> Result<bool> {
        distinct(blocker, blocked)?;
        let removed = self
            .db
            .transaction(move |repos| repos.blocks().delete(blocker, blocked))
            .await?;
        Ok(removed)
    }

    pub async fn report(&self, reporter: Uuid, reported: Uuid, reason: String) -> Result<Report> {
        distinct(reporter, reported)?;
        let reason = reason.trim().to_string();
        if reason.is_empty() || reason.chars().count() > MAX_REPORT_REASON {
            return Err(ApiError::invalid(format!(
                "reason must be 1 to {MAX_REPORT_REASON} characters"
            )));
        }

        self.db
            .transaction(move |repos| {
                repos
                    .users()
                    .find(reported)?
                    .ok_or_else(|| ApiError::NotFound("user".into()))?;
                Ok(repos.reports().create(reporter, reported, &reason)?)
            })
            .await
    }
}
