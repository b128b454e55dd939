use rusqlite::Connection;

use crate::repositories::{
    AuthRepository, BlockRepository, ConnectionRepository, LikeRepository, MessageRepository,
    NotificationRepository, PasswordResetRepository, PictureRepository, ProfileRepository,
    RefreshTokenRepository, ReportRepository, UserDataRepository, UserRepository,
    UserTagRepository, VerificationTokenRepository, ViewRepository,
};

/// Typed repositories bound to one connection (usually an open transaction).
pub struct RepositoryManager<'c> {
    conn: &'c Connection,
}

impl<'c> RepositoryManager<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    #[cfg(test)]
    pub(crate) fn conn_for_tests(&self) -> &'c Connection {
        self.conn
    }

    pub fn users(&self) -> UserRepository<'c> {
        UserRepository::new(self.conn)
    }

    pub fn auths(&self) -> AuthRepository<'c> {
        AuthRepository::new(self.conn)
    }

    pub fn connections(&self) -> ConnectionRepository<'c> {
        ConnectionRepository::new(self.conn)
    }

    pub fn messages(&self) -> MessageRepository<'c> {
        MessageRepository::new(self.conn)
    }

    pub fn notifications(&self) -> NotificationRepository<'c> {
        NotificationRepository::new(self.conn)
    }

    pub fn refresh_tokens(&self) -> RefreshTokenRepository<'c> {
        RefreshTokenRepository::new(self.conn)
    }

    pub fn password_resets(&self) -> PasswordResetRepository<'c> {
        PasswordResetRepository::new(self.conn)
    }

    pub fn verification_tokens(&self) -> VerificationTokenRepository<'c> {
        VerificationTokenRepository::new(self.conn)
    }

    pub fn profiles(&self) -> ProfileRepository<'c> {
        ProfileRepository::new(self.conn)
    }

    pub fn pictures(&self) -> PictureRepository<'c> {
        PictureRepository::new(self.conn)
    }

    pub fn user_tags(&self) -> UserTagRepository<'c> {
        UserTagRepository::new(self.conn)
    }

    pub fn views(&self) -> ViewRepository<'c> {
        ViewRepository::new(self.conn)
    }

    pub fn likes(&self) -> LikeRepository<'c> {
        LikeRepository::new(self.conn)
    }

    pub fn blocks(&self) -> BlockRepository<'c> {
        BlockRepository::new(self.conn)
    }

    pub fn user_data(&self) -> UserDataRepository<'c> {
        UserDataRepository::new(self.conn)
    }

    pub fn reports(&self) -> ReportRepository<'c> {
        ReportRepository::new(self.conn)
    }
}
