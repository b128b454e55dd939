use chrono::{Duration, Utc};
use uuid::Uuid;

use matcha_db::Database;
use matcha_db::repositories::ViewQuery;
use matcha_types::api::{PictureView, ProfileDetails};
use matcha_types::models::NotificationKind;

use crate::error::{ApiError, Result};
use crate::services::{NotificationService, profile_view};

/// Repeat views of the same profile inside this window are not recorded.
pub const VIEW_DEDUP_WINDOW_SECS: i64 = 60 * 60;

#[derive(Clone)]
pub struct ProfileService {
    db: Database,
    notifications: NotificationService,
}

impl ProfileService {
    pub fn new(db: Database, notifications: NotificationService) -> Self {
        Self { db, notifications }
    }

    /// Returns the profile of `viewed` as seen by `viewer`, recording a view
    /// (and notifying) unless one was recorded within the last hour.
    /// Blocked pairs see nothing.
    pub async fn view(&self, viewer: Uuid, viewed: Uuid) -> Result<ProfileDetails> {
        let (details, recorded) = self
            .db
            .transaction(move |repos| {
                if viewer != viewed && repos.blocks().exists_between(viewer, viewed)? {
                    return Err(ApiError::NotFound("profile".into()));
                }
                let profile = repos
                    .profiles()
                    .find(viewed)?
                    .ok_or_else(|| ApiError::NotFound("profile".into()))?;
                let pictures = repos.pictures().list_for(viewed)?;
                let tags = repos.user_tags().list_for(viewed)?;

                let mut recorded = false;
                if viewer != viewed {
                    let now = Utc::now();
                    let recent = repos.views().query(&ViewQuery {
                        viewer: Some(viewer),
                        viewed: Some(viewed),
                        since: Some(now - Duration::seconds(VIEW_DEDUP_WINDOW_SECS)),
                    })?;
                    if recent.is_empty() {
                        repos.views().create(viewer, viewed, now)?;
                        recorded = true;
                    }
                }

                let details = ProfileDetails {
                    profile: profile_view(profile),
                    pictures: pictures
                        .into_iter()
                        .map(|p| PictureView {
                            id: p.id,
                            url: p.url,
                            is_profile_pic: p.is_profile_pic,
                        })
                        .collect(),
                    tags: tags.into_iter().map(|t| t.name).collect(),
                };
                Ok((details, recorded))
            })
            .await?;

        if recorded {
            self.notifications
                .notify(Some(viewer), viewed, NotificationKind::View)
                .await;
        }
        Ok(details)
    }

    /// Makes `picture_id` the user's only profile picture.
    pub async fn set_profile_picture(&self, user: Uuid, picture_id: i64) -> Result<()> {
        self.db
            .transaction(move |repos| repos.pictures().set_profile_picture(user, picture_id))
            .await?;
        Ok(())
    }
}
