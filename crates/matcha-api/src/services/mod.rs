mod auth;
mod chats;
mod notifications;
mod profiles;
mod users;

pub use auth::AuthService;
pub use chats::ChatService;
pub use notifications::NotificationService;
pub use profiles::ProfileService;
pub use users::{LikeOutcome, UserService};

use matcha_db::models::Profile;
use matcha_types::api::ProfileView;

/// Upper bound on any page size requested by a client.
pub const MAX_PAGE: u32 = 100;

pub(crate) fn profile_view(p: Profile) -> ProfileView {
    ProfileView {
        user_id: p.user_id,
        username: p.username,
        first_name: p.first_name,
        last_name: p.last_name,
        gender: p.gender,
        preference: p.preference,
        biography: p.biography,
        fame_rating: p.fame_rating,
        location_name: p.location_name,
        birthday: p.birthday,
    }
}
