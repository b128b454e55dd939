//! SQLite persistence layer for Matcha.
//!
//! All writes that must be atomic go through [`Database::unit_of_work`] (or its
//! async wrapper [`Database::transaction`]): the callback receives a
//! [`RepositoryManager`] bound to an open transaction, and the transaction
//! commits on `Ok` and rolls back on `Err`.

mod codec;
pub mod error;
pub mod filter;
pub mod migrations;
pub mod models;
pub mod repositories;
mod uow;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::info;

pub use error::{Result, StoreError};
pub use filter::Filter;
pub use uow::RepositoryManager;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let db = Self::init(conn)?;

        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Runs `f` against repositories outside of any explicit transaction.
    /// Meant for reads.
    pub fn with_repos<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&RepositoryManager<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let conn = self.lock()?;
        f(&RepositoryManager::new(&conn))
    }

    /// Runs `f` inside a transaction. Commits when `f` returns `Ok`, rolls
    /// back otherwise. A failed rollback is reported instead of `f`'s error.
    pub fn unit_of_work<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&RepositoryManager<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StoreError::from)?;

        let outcome = f(&RepositoryManager::new(&tx));
        match outcome {
            Ok(value) => {
                tx.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(err) => {
                tx.rollback().map_err(StoreError::from)?;
                Err(err)
            }
        }
    }

    /// [`Database::with_repos`] off the async runtime.
    pub async fn read<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&RepositoryManager<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_repos(f))
            .await
            .map_err(|e| StoreError::Blocking(e.to_string()))?
    }

    /// [`Database::unit_of_work`] off the async runtime.
    pub async fn transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&RepositoryManager<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.unit_of_work(f))
            .await
            .map_err(|e| StoreError::Blocking(e.to_string()))?
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use uuid::Uuid;

    use crate::Database;

    pub fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    pub fn user(db: &Database) -> Uuid {
        let id = Uuid::new_v4();
        db.unit_of_work(|repos| repos.users().create(id).map(|_| ()))
            .unwrap();
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn unit_of_work_commits_on_ok() {
        let db = test_support::db();
        let a = test_support::user(&db);
        let b = test_support::user(&db);

        db.unit_of_work(|repos| repos.likes().create(a, b))
            .unwrap();

        let like = db.with_repos(|repos| repos.likes().find(a, b)).unwrap();
        assert!(like.is_some());
    }

    #[test]
    fn unit_of_work_rolls_back_on_err() {
        let db = test_support::db();
        let a = test_support::user(&db);
        let b = test_support::user(&db);

        let result: Result<()> = db.unit_of_work(|repos| {
            repos.likes().create(a, b)?;
            Err(StoreError::not_found("user", b))
        });
        assert!(matches!(result, Err(StoreError::NotFound { .. })));

        let like = db.with_repos(|repos| repos.likes().find(a, b)).unwrap();
        assert!(like.is_none());
    }

    #[tokio::test]
    async fn async_transaction_runs_off_runtime() {
        let db = test_support::db();
        let a = test_support::user(&db);

        let user = db
            .read(move |repos| repos.users().find(a))
            .await
            .unwrap();
        assert_eq!(user.map(|u| u.id), Some(a));
    }
}
