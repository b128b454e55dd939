use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use matcha_types::models::AuthProvider;

use crate::codec;
use crate::filter::Filter;
use crate::models::{Auth, Picture, Profile, Tag, User, UserData};
use crate::{Result, StoreError};

// -- Users --

pub struct UserRepository<'c> {
    conn: &'c Connection,
}

impl<'c> UserRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn create(&self, id: Uuid) -> Result<User> {
        let user = User {
            id,
            created_at: Utc::now(),
            last_connection: None,
        };
        self.conn.execute(
            "INSERT INTO users (id, created_at) VALUES (?1, ?2)",
            params![id.to_string(), codec::ts(&user.created_at)],
        )?;
        Ok(user)
    }

    pub fn find(&self, id: Uuid) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, created_at, last_connection FROM users WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(User {
                        id: codec::uuid_at(row, 0)?,
                        created_at: codec::ts_at(row, 1)?,
                        last_connection: codec::opt_ts_at(row, 2)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    pub fn touch_last_connection(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE users SET last_connection = ?1 WHERE id = ?2",
            params![codec::ts(&at), id.to_string()],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found("user", id));
        }
        Ok(())
    }

    /// Deleting a user cascades to every row that references it.
    pub fn delete(&self, id: Uuid) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
        Ok(deleted > 0)
    }
}

// -- Auths --

const AUTH_COLUMNS: &str =
    "SELECT user_id, provider, email, password_hash, provider_uid, is_verified FROM auths";

fn auth_row(row: &Row<'_>) -> rusqlite::Result<Auth> {
    Ok(Auth {
        user_id: codec::uuid_at(row, 0)?,
        provider: codec::enum_at(row, 1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        provider_uid: row.get(4)?,
        is_verified: row.get(5)?,
    })
}

/// Structured lookup over `auths`.
#[derive(Debug, Default, Clone)]
pub struct AuthQuery<'a> {
    pub user_id: Option<Uuid>,
    pub provider: Option<AuthProvider>,
    pub email: Option<&'a str>,
    pub provider_uid: Option<&'a str>,
}

pub struct AuthRepository<'c> {
    conn: &'c Connection,
}

impl<'c> AuthRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn create(&self, auth: &Auth) -> Result<()> {
        self.conn.execute(
            "INSERT INTO auths (user_id, provider, email, password_hash, provider_uid, is_verified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                auth.user_id.to_string(),
                auth.provider.as_str(),
                auth.email,
                auth.password_hash,
                auth.provider_uid,
                auth.is_verified,
            ],
        )?;
        Ok(())
    }

    pub fn find(&self, user_id: Uuid, provider: AuthProvider) -> Result<Option<Auth>> {
        let mut rows = self.query(&AuthQuery {
            user_id: Some(user_id),
            provider: Some(provider),
            ..Default::default()
        })?;
        Ok(rows.pop())
    }

    pub fn query(&self, q: &AuthQuery<'_>) -> Result<Vec<Auth>> {
        Filter::new()
            .id("user_id", q.user_id)
            .text("provider", q.provider.as_ref().map(AuthProvider::as_str))
            .text("email", q.email)
            .text("provider_uid", q.provider_uid)
            .select(self.conn, AUTH_COLUMNS, auth_row)
    }

    pub fn find_local_by_email(&self, email: &str) -> Result<Option<Auth>> {
        let mut rows = self.query(&AuthQuery {
            provider: Some(AuthProvider::Local),
            email: Some(email),
            ..Default::default()
        })?;
        Ok(rows.pop())
    }

    pub fn find_by_provider_uid(
        &self,
        provider: AuthProvider,
        provider_uid: &str,
    ) -> Result<Option<Auth>> {
        let mut rows = self.query(&AuthQuery {
            provider: Some(provider),
            provider_uid: Some(provider_uid),
            ..Default::default()
        })?;
        Ok(rows.pop())
    }

    pub fn mark_verified(&self, user_id: Uuid, provider: AuthProvider) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE auths SET is_verified = 1 WHERE user_id = ?1 AND provider = ?2",
            params![user_id.to_string(), provider.as_str()],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found("auth", user_id));
        }
        Ok(())
    }

    pub fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE auths SET password_hash = ?1 WHERE user_id = ?2 AND provider = 'local'",
            params![password_hash, user_id.to_string()],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found("auth", user_id));
        }
        Ok(())
    }
}

// -- Profiles --

const PROFILE_COLUMNS: &str = "SELECT user_id, first_name, last_name, username, gender, preference,
    biography, fame_rating, location_name, birthday FROM profiles";

fn profile_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        user_id: codec::uuid_at(row, 0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        username: row.get(3)?,
        gender: codec::opt_enum_at(row, 4)?,
        preference: codec::opt_enum_at(row, 5)?,
        biography: row.get(6)?,
        fame_rating: row.get(7)?,
        location_name: row.get(8)?,
        birthday: codec::opt_date_at(row, 9)?,
    })
}

pub struct ProfileRepository<'c> {
    conn: &'c Connection,
}

impl<'c> ProfileRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn find(&self, user_id: Uuid) -> Result<Option<Profile>> {
        let mut rows = Filter::new()
            .id("user_id", Some(user_id))
            .select(self.conn, PROFILE_COLUMNS, profile_row)?;
        Ok(rows.pop())
    }

    pub fn find_by_username(&self, username: &str) -> Result<Option<Profile>> {
        let mut rows = Filter::new()
            .text("username", Some(username))
            .select(self.conn, PROFILE_COLUMNS, profile_row)?;
        Ok(rows.pop())
    }

    pub fn upsert(&self, profile: &Profile) -> Result<()> {
        self.conn.execute(
            "INSERT INTO profiles (user_id, first_name, last_name, username, gender, preference,
                biography, fame_rating, location_name, birthday)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(user_id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                username = excluded.username,
                gender = excluded.gender,
                preference = excluded.preference,
                biography = excluded.biography,
                fame_rating = excluded.fame_rating,
                location_name = excluded.location_name,
                birthday = excluded.birthday",
            params![
                profile.user_id.to_string(),
                profile.first_name,
                profile.last_name,
                profile.username,
                profile.gender.map(|g| g.as_str()),
                profile.preference.map(|p| p.as_str()),
                profile.biography,
                profile.fame_rating,
                profile.location_name,
                profile.birthday.as_ref().map(codec::date),
            ],
        )?;
        Ok(())
    }
}

// -- User data --

pub struct UserDataRepository<'c> {
    conn: &'c Connection,
}

impl<'c> UserDataRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn find(&self, user_id: Uuid) -> Result<Option<UserData>> {
        let data = self
            .conn
            .query_row(
                "SELECT user_id, latitude, longitude, internal_score FROM user_data WHERE user_id = ?1",
                [user_id.to_string()],
                |row| {
                    Ok(UserData {
                        user_id: codec::uuid_at(row, 0)?,
                        latitude: row.get(1)?,
                        longitude: row.get(2)?,
                        internal_score: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(data)
    }

    pub fn upsert(&self, data: &UserData) -> Result<()> {
        self.conn.execute(
            "INSERT INTO user_data (user_id, latitude, longitude, internal_score)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                internal_score = excluded.internal_score",
            params![
                data.user_id.to_string(),
                data.latitude,
                data.longitude,
                data.internal_score,
            ],
        )?;
        Ok(())
    }
}

// -- Pictures --

const PICTURE_COLUMNS: &str = "SELECT id, user_id, url, is_profile_pic FROM pictures";

fn picture_row(row: &Row<'_>) -> rusqlite::Result<Picture> {
    Ok(Picture {
        id: row.get(0)?,
        user_id: codec::uuid_at(row, 1)?,
        url: row.get(2)?,
        is_profile_pic: row.get(3)?,
    })
}

pub struct PictureRepository<'c> {
    conn: &'c Connection,
}

impl<'c> PictureRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn create(&self, user_id: Uuid, url: &str) -> Result<Picture> {
        self.conn.execute(
            "INSERT INTO pictures (user_id, url) VALUES (?1, ?2)",
            params![user_id.to_string(), url],
        )?;
        Ok(Picture {
            id: self.conn.last_insert_rowid(),
            user_id,
            url: url.to_string(),
            is_profile_pic: false,
        })
    }

    pub fn find(&self, id: i64) -> Result<Option<Picture>> {
        let mut rows = Filter::new()
            .key("id", Some(id))
            .select(self.conn, PICTURE_COLUMNS, picture_row)?;
        Ok(rows.pop())
    }

    pub fn list_for(&self, user_id: Uuid) -> Result<Vec<Picture>> {
        Filter::new()
            .id("user_id", Some(user_id))
            .order_by("is_profile_pic DESC, id ASC")
            .select(self.conn, PICTURE_COLUMNS, picture_row)
    }

    /// Makes `picture_id` the profile picture and clears the flag on every
    /// sibling. Both statements must run in the same transaction.
    pub fn set_profile_picture(&self, user_id: Uuid, picture_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE pictures SET is_profile_pic = 0 WHERE user_id = ?1 AND id != ?2",
            params![user_id.to_string(), picture_id],
        )?;
        let updated = self.conn.execute(
            "UPDATE pictures SET is_profile_pic = 1 WHERE user_id = ?1 AND id = ?2",
            params![user_id.to_string(), picture_id],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found("picture", picture_id));
        }
        Ok(())
    }

    pub fn delete(&self, user_id: Uuid, id: i64) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM pictures WHERE id = ?1 AND user_id = ?2",
            params![id, user_id.to_string()],
        )?;
        Ok(deleted > 0)
    }
}

// -- User tags --

pub struct UserTagRepository<'c> {
    conn: &'c Connection,
}

impl<'c> UserTagRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn list_for(&self, user_id: Uuid) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.name FROM tags t
             INNER JOIN user_tags ut ON ut.tag_id = t.id
             WHERE ut.user_id = ?1
             ORDER BY t.name",
        )?;
        let tags = stmt
            .query_map([user_id.to_string()], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    /// Attaches a tag from the dictionary by name. Unknown names are `NotFound`.
    pub fn add(&self, user_id: Uuid, tag_name: &str) -> Result<()> {
        let tag_id: Option<i64> = self
            .conn
            .query_row("SELECT id FROM tags WHERE name = ?1", [tag_name], |row| row.get(0))
            .optional()?;
        let tag_id = tag_id.ok_or_else(|| StoreError::not_found("tag", tag_name))?;

        self.conn.execute(
            "INSERT INTO user_tags (user_id, tag_id) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
            params![user_id.to_string(), tag_id],
        )?;
        Ok(())
    }

    pub fn remove(&self, user_id: Uuid, tag_id: i64) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM user_tags WHERE user_id = ?1 AND tag_id = ?2",
            params![user_id.to_string(), tag_id],
        )?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::models::Auth;
    use crate::test_support;

    use super::*;

    #[test]
    fn local_auth_is_found_by_email() {
        let db = test_support::db();
        let user = test_support::user(&db);

        db.unit_of_work(|repos| {
            repos.auths().create(&Auth {
                user_id: user,
                provider: AuthProvider::Local,
                email: Some("a@example.com".into()),
                password_hash: Some("hash".into()),
                provider_uid: None,
                is_verified: false,
            })
        })
        .unwrap();

        let auth = db
            .with_repos(|repos| repos.auths().find_local_by_email("a@example.com"))
            .unwrap()
            .unwrap();
        assert_eq!(auth.user_id, user);
        assert!(!auth.is_verified);

        db.unit_of_work(|repos| repos.auths().mark_verified(user, AuthProvider::Local))
            .unwrap();
        let auth = db
            .with_repos(|repos| repos.auths().find(user, AuthProvider::Local))
            .unwrap()
            .unwrap();
        assert!(auth.is_verified);
    }

    #[test]
    fn one_profile_picture_per_user() {
        let db = test_support::db();
        let user = test_support::user(&db);

        let (first, second) = db
            .unit_of_work(|repos| {
                let first = repos.pictures().create(user, "https://img/1.png")?;
                let second = repos.pictures().create(user, "https://img/2.png")?;
                repos.pictures().set_profile_picture(user, first.id)?;
                repos.pictures().set_profile_picture(user, second.id)?;
                Ok::<_, StoreError>((first.id, second.id))
            })
            .unwrap();

        let pictures = db.with_repos(|repos| repos.pictures().list_for(user)).unwrap();
        let flagged: Vec<i64> = pictures
            .iter()
            .filter(|p| p.is_profile_pic)
            .map(|p| p.id)
            .collect();
        assert_eq!(flagged, vec![second]);
        assert_ne!(first, second);
    }

    #[test]
    fn tags_come_from_the_dictionary() {
        let db = test_support::db();
        let user = test_support::user(&db);

        db.unit_of_work(|repos| repos.user_tags().add(user, "music")).unwrap();
        let missing = db.unit_of_work(|repos| repos.user_tags().add(user, "not-a-tag"));
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));

        let tags = db.with_repos(|repos| repos.user_tags().list_for(user)).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "music");
    }
}
