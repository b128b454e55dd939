use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use matcha_bus::{Bus, channels};
use matcha_db::Database;
use matcha_db::models::Notification;
use matcha_db::repositories::NotificationQuery;
use matcha_types::api::{NotificationView, PageQuery};
use matcha_types::events::NotificationPayload;
use matcha_types::models::NotificationKind;

use crate::counters::DeliveryCounters;
use crate::error::{ApiError, Result};

#[derive(Clone)]
pub struct NotificationService {
    db: Database,
    bus: Bus,
    counters: Arc<DeliveryCounters>,
}

impl NotificationService {
    pub fn new(db: Database, bus: Bus, counters: Arc<DeliveryCounters>) -> Self {
        Self { db, bus, counters }
    }

    /// Persists the notification, then publishes it on `notification`. The
    /// row stands whether or not the publish succeeds.
    pub async fn create_and_send(
        &self,
        sender: Option<Uuid>,
        recipient: Uuid,
        kind: NotificationKind,
    ) -> Result<Notification> {
        let notification = self
            .db
            .transaction(move |repos| repos.notifications().create(recipient, sender, kind))
            .await?;

        let payload = NotificationPayload {
            id: notification.id,
            recipient_id: notification.recipient_id,
            sender_id: sender.map(|s| s.to_string()).unwrap_or_default(),
            kind,
            created_at: notification.created_at,
        };
        self.counters
            .publish(&self.bus, channels::NOTIFICATION, &payload)
            .await;

        Ok(notification)
    }

    /// [`NotificationService::create_and_send`] for side effects of an
    /// already committed action: failures are logged, not returned.
    pub async fn notify(&self, sender: Option<Uuid>, recipient: Uuid, kind: NotificationKind) {
        if let Err(e) = self.create_and_send(sender, recipient, kind).await {
            warn!("Failed to create {} notification for {}: {}", kind, recipient, e);
        }
    }

    /// Only the recipient may mark a notification read. Idempotent.
    pub async fn mark_read(&self, id: i64, caller: Uuid) -> Result<()> {
        self.db
            .transaction(move |repos| {
                let notifications = repos.notifications();
                let notification = notifications
                    .find(id)?
                    .ok_or_else(|| ApiError::NotFound("notification".into()))?;
                if notification.recipient_id != caller {
                    return Err(ApiError::Unauthorized);
                }
                notifications.mark_read(id)?;
                Ok(())
            })
            .await
    }

    pub async fn mark_all_read(&self, recipient: Uuid) -> Result<usize> {
        let updated = self
            .db
            .transaction(move |repos| repos.notifications().mark_all_read(recipient))
            .await?;
        Ok(updated)
    }

    /// Newest first.
    pub async fn list(&self, recipient: Uuid, page: PageQuery) -> Result<Vec<NotificationView>> {
        let rows = self
            .db
            .read(move |repos| {
                repos.notifications().query(&NotificationQuery {
                    recipient: Some(recipient),
                    limit: Some(page.limit.min(super::MAX_PAGE)),
                    offset: Some(page.offset),
                    ..Default::default()
                })
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|n| NotificationView {
                id: n.id,
                sender_id: n.sender_id,
                kind: n.kind,
                is_read: n.is_read,
                created_at: n.created_at,
            })
            .collect())
    }
}
