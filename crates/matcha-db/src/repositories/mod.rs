//! One repository per entity. Each borrows the connection handed out by the
//! [`RepositoryManager`](crate::RepositoryManager), so everything obtained from
//! the same manager shares its transaction.

mod accounts;
mod credentials;
mod messaging;
mod social;

pub use accounts::{
    AuthQuery, AuthRepository, PictureRepository, ProfileRepository, UserDataRepository,
    UserRepository, UserTagRepository,
};
pub use credentials::{PasswordResetRepository, RefreshTokenRepository, VerificationTokenRepository};
pub use messaging::{MessageQuery, MessageRepository, NotificationQuery, NotificationRepository};
pub use social::{
    BlockRepository, ConnectionRepository, LikeRepository, ReportRepository, ViewQuery,
    ViewRepository,
};
