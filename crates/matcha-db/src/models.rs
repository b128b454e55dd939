//! Database row types. Distinct from the `matcha-types` API views to keep the
//! store independent of the wire format.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use matcha_types::models::{AuthProvider, Gender, NotificationKind, Preference};

/// Orders a user pair the way `connections` stores it (`user1 < user2`).
pub fn ordered_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_connection: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Auth {
    pub user_id: Uuid,
    pub provider: AuthProvider,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub provider_uid: Option<String>,
    pub is_verified: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationToken {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshToken {
    pub token_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PasswordReset {
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub gender: Option<Gender>,
    pub preference: Option<Preference>,
    pub biography: String,
    pub fame_rating: f64,
    pub location_name: Option<String>,
    pub birthday: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserData {
    pub user_id: Uuid,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub internal_score: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    pub id: i64,
    pub user_id: Uuid,
    pub url: String,
    pub is_profile_pic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Like {
    pub liker_id: Uuid,
    pub liked_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A match. Always stored with `user1_id < user2_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub user1_id: Uuid,
    pub user2_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Connection {
    /// The participant that is not `user_id`.
    pub fn peer_of(&self, user_id: Uuid) -> Uuid {
        if self.user1_id == user_id { self.user2_id } else { self.user1_id }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub blocker_id: Uuid,
    pub blocked_id: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub viewer_id: Uuid,
    pub viewed_id: Uuid,
    pub viewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: i64,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub id: i64,
    pub reporter_id: Uuid,
    pub reported_id: Uuid,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
