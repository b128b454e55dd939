use rusqlite::Connection;
use tracing::info;

use crate::Result;

const DEFAULT_TAGS: &[&str] = &[
    "travel", "music", "sport", "cooking", "gaming", "reading", "art", "movies", "hiking",
    "photography", "dancing", "vegan", "geek", "piercing", "yoga",
];

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                created_at      TEXT NOT NULL,
                last_connection TEXT
            );

            CREATE TABLE auths (
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                provider        TEXT NOT NULL,
                email           TEXT,
                password_hash   TEXT,
                provider_uid    TEXT,
                is_verified     INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, provider)
            );

            CREATE UNIQUE INDEX idx_auths_local_email
                ON auths(email) WHERE provider = 'local';
            CREATE UNIQUE INDEX idx_auths_provider_uid
                ON auths(provider, provider_uid) WHERE provider_uid IS NOT NULL;

            CREATE TABLE verification_tokens (
                token       TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                expires_at  TEXT NOT NULL
            );

            CREATE TABLE refresh_tokens (
                token_hash  TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at  TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                revoked     INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE password_resets (
                user_id     TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                token       TEXT NOT NULL UNIQUE,
                expires_at  TEXT NOT NULL
            );

            CREATE TABLE profiles (
                user_id         TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                first_name      TEXT NOT NULL DEFAULT '',
                last_name       TEXT NOT NULL DEFAULT '',
                username        TEXT NOT NULL UNIQUE,
                gender          TEXT CHECK (gender IN ('male', 'female', 'other')),
                preference      TEXT CHECK (preference IN ('heterosexual', 'homosexual', 'bisexual')),
                biography       TEXT NOT NULL DEFAULT '',
                fame_rating     REAL NOT NULL DEFAULT 0,
                location_name   TEXT,
                birthday        TEXT
            );

            CREATE TABLE user_data (
                user_id         TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                latitude        REAL,
                longitude       REAL,
                internal_score  INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE pictures (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                url             TEXT NOT NULL,
                is_profile_pic  INTEGER NOT NULL DEFAULT 0
            );

            CREATE UNIQUE INDEX idx_pictures_one_profile
                ON pictures(user_id) WHERE is_profile_pic = 1;

            CREATE TABLE tags (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                name    TEXT NOT NULL UNIQUE
            );

            CREATE TABLE user_tags (
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                tag_id  INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, tag_id)
            );

            CREATE TABLE likes (
                liker_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                liked_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (liker_id, liked_id)
            );

            CREATE TABLE connections (
                user1_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                user2_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (user1_id, user2_id),
                CHECK (user1_id < user2_id)
            );

            CREATE INDEX idx_connections_user2 ON connections(user2_id);

            CREATE TABLE blocks (
                blocker_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                blocked_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (blocker_id, blocked_id)
            );

            CREATE TABLE views (
                viewer_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                viewed_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                viewed_at   TEXT NOT NULL,
                PRIMARY KEY (viewer_id, viewed_id, viewed_at)
            );

            CREATE TABLE messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                recipient_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content         TEXT NOT NULL,
                sent_at         TEXT NOT NULL,
                is_read         INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_messages_conversation
                ON messages(sender_id, recipient_id, sent_at);

            CREATE TABLE notifications (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                sender_id       TEXT REFERENCES users(id) ON DELETE SET NULL,
                type            TEXT NOT NULL
                    CHECK (type IN ('like', 'view', 'match', 'unlike', 'message')),
                is_read         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_recipient
                ON notifications(recipient_id, created_at);

            CREATE TABLE reports (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                reporter_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                reported_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                reason          TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;

        let mut stmt = conn.prepare("INSERT OR IGNORE INTO tags (name) VALUES (?1)")?;
        for tag in DEFAULT_TAGS {
            stmt.execute([tag])?;
        }
    }

    info!("database migrations complete");
    Ok(())
}
