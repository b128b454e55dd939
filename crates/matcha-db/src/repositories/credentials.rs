use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::codec;
use crate::models::{PasswordReset, RefreshToken, VerificationToken};
use crate::{Result, StoreError};

// -- Refresh tokens --

pub struct RefreshTokenRepository<'c> {
    conn: &'c Connection,
}

impl<'c> RefreshTokenRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Only the hash is ever stored; the plaintext never reaches this layer.
    pub fn create(&self, token: &RefreshToken) -> Result<()> {
        self.conn.execute(
            "INSERT INTO refresh_tokens (token_hash, user_id, expires_at, created_at, revoked)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                token.token_hash,
                token.user_id.to_string(),
                codec::ts(&token.expires_at),
                codec::ts(&token.created_at),
                token.revoked,
            ],
        )?;
        Ok(())
    }

    pub fn find(&self, token_hash: &str) -> Result<Option<RefreshToken>> {
        let token = self
            .conn
            .query_row(
                "SELECT token_hash, user_id, expires_at, created_at, revoked
                 FROM refresh_tokens WHERE token_hash = ?1",
                [token_hash],
                |row| {
                    Ok(RefreshToken {
                        token_hash: row.get(0)?,
                        user_id: codec::uuid_at(row, 1)?,
                        expires_at: codec::ts_at(row, 2)?,
                        created_at: codec::ts_at(row, 3)?,
                        revoked: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(token)
    }

    /// Revokes one token owned by `user_id`.
    pub fn revoke(&self, user_id: Uuid, token_hash: &str) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE refresh_tokens SET revoked = 1 WHERE token_hash = ?1 AND user_id = ?2",
            params![token_hash, user_id.to_string()],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found("refresh token", user_id));
        }
        Ok(())
    }
}

// -- Password resets --

pub struct PasswordResetRepository<'c> {
    conn: &'c Connection,
}

impl<'c> PasswordResetRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// At most one outstanding reset per user: a new one replaces the old.
    pub fn upsert(&self, reset: &PasswordReset) -> Result<()> {
        self.conn.execute(
            "INSERT INTO password_resets (user_id, token, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                token = excluded.token,
                expires_at = excluded.expires_at",
            params![
                reset.user_id.to_string(),
                reset.token,
                codec::ts(&reset.expires_at),
            ],
        )?;
        Ok(())
    }

    pub fn find_by_token(&self, token: &str) -> Result<Option<PasswordReset>> {
        let reset = self
            .conn
            .query_row(
                "SELECT user_id, token, expires_at FROM password_resets WHERE token = ?1",
                [token],
                |row| {
                    Ok(PasswordReset {
                        user_id: codec::uuid_at(row, 0)?,
                        token: row.get(1)?,
                        expires_at: codec::ts_at(row, 2)?,
                    })
                },
            )
            .optional()?;
        Ok(reset)
    }

    pub fn delete(&self, user_id: Uuid) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM password_resets WHERE user_id = ?1",
            [user_id.to_string()],
        )?;
        Ok(deleted > 0)
    }
}

// -- Verification tokens --

pub struct VerificationTokenRepository<'c> {
    conn: &'c Connection,
}

impl<'c> VerificationTokenRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// At most one outstanding token per user: a new one replaces the old.
    pub fn upsert(&self, token: &VerificationToken) -> Result<()> {
        self.conn.execute(
            "INSERT INTO verification_tokens (token, user_id, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                token = excluded.token,
                expires_at = excluded.expires_at",
            params![
                token.token,
                token.user_id.to_string(),
                codec::ts(&token.expires_at),
            ],
        )?;
        Ok(())
    }

    pub fn find(&self, token: &str) -> Result<Option<VerificationToken>> {
        let found = self
            .conn
            .query_row(
                "SELECT token, user_id, expires_at FROM verification_tokens WHERE token = ?1",
                [token],
                |row| {
                    Ok(VerificationToken {
                        token: row.get(0)?,
                        user_id: codec::uuid_at(row, 1)?,
                        expires_at: codec::ts_at(row, 2)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }

    pub fn delete(&self, token: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM verification_tokens WHERE token = ?1", [token])?;
        Ok(deleted > 0)
    }
}
