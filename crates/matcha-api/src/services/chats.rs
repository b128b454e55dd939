use uuid::Uuid;

use matcha_db::Database;
use matcha_db::models::Message;
use matcha_db::repositories::MessageQuery;
use matcha_types::api::{ChatMessage, ChatSummary, PageQuery};
use matcha_types::events::MessagePayload;

use crate::error::{ApiError, Result};
use crate::services::profile_view;

#[derive(Clone)]
pub struct ChatService {
    db: Database,
}

fn payload(m: Message) -> MessagePayload {
    MessagePayload {
        id: m.id,
        sender_id: m.sender_id,
        recipient_id: m.recipient_id,
        content: m.content,
        sent_at: m.sent_at,
    }
}

impl ChatService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// One entry per match: the peer's profile and the latest message
    /// between the two, if any. Peers without a profile are skipped.
    pub async fn list_chats(&self, user: Uuid) -> Result<Vec<ChatSummary>> {
        self.db
            .read(move |repos| {
                let mut chats = Vec::new();
                for connection in repos.connections().list_for(user)? {
                    let peer = connection.peer_of(user);
                    let Some(profile) = repos.profiles().find(peer)? else {
                        continue;
                    };
                    let last_message = repos.messages().latest_between(user, peer)?;
                    chats.push(ChatSummary {
                        peer: profile_view(profile),
                        last_message: last_message.map(payload),
                    });
                }
                Ok::<_, ApiError>(chats)
            })
            .await
    }

    /// Both directions of the conversation, newest first.
    pub async fn list_messages(
        &self,
        user: Uuid,
        peer: Uuid,
        page: PageQuery,
    ) -> Result<Vec<ChatMessage>> {
        let messages = self
            .db
            .read(move |repos| {
                repos.messages().query(&MessageQuery {
                    conversation: Some((user, peer)),
                    limit: Some(page.limit.min(super::MAX_PAGE)),
                    offset: Some(page.offset),
                    ..Default::default()
                })
            })
            .await?;

        Ok(messages
            .into_iter()
            .map(|m| ChatMessage {
                id: m.id,
                sender_id: m.sender_id,
                recipient_id: m.recipient_id,
                content: m.content,
                sent_at: m.sent_at,
                is_read: m.is_read,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn chats_list_matches_with_latest_message() {
        let ctx = test_support::context();
        let a = test_support::user(&ctx, "a");
        let b = test_support::user(&ctx, "b");
        let c = test_support::user(&ctx, "c");
        let t0 = Utc::now();

        ctx.db
            .unit_of_work(|repos| {
                repos.connections().create(a, b)?;
                repos.connections().create(a, c)?;
                repos.messages().create(a, b, "first", t0)?;
                repos.messages().create(b, a, "latest", t0 + Duration::seconds(1))
            })
            .unwrap();

        let mut chats = ctx.state.chats.list_chats(a).await.unwrap();
        chats.sort_by(|x, y| x.peer.username.cmp(&y.peer.username));

        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].peer.user_id, b);
        assert_eq!(chats[0].last_message.as_ref().unwrap().content, "latest");
        assert_eq!(chats[1].peer.user_id, c);
        assert!(chats[1].last_message.is_none());
    }

    #[tokio::test]
    async fn peer_without_profile_is_skipped() {
        let ctx = test_support::context();
        let a = test_support::user(&ctx, "a");
        let bare = uuid::Uuid::new_v4();
        ctx.db
            .unit_of_work(|repos| {
                repos.users().create(bare)?;
                repos.connections().create(a, bare)
            })
            .unwrap();

        assert!(ctx.state.chats.list_chats(a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn messages_page_newest_first() {
        let ctx = test_support::context();
        let a = test_support::user(&ctx, "a");
        let b = test_support::user(&ctx, "b");
        let t0 = Utc::now();
        ctx.db
            .unit_of_work(|repos| {
                for i in 0..5 {
                    let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
                    repos
                        .messages()
                        .create(from, to, &format!("m{i}"), t0 + Duration::seconds(i))?;
                }
                Ok::<_, matcha_db::StoreError>(())
            })
            .unwrap();

        let page = ctx
            .state
            .chats
            .list_messages(b, a, PageQuery { limit: 2, offset: 1 })
            .await
            .unwrap();
        let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m2"]);
    }
}
