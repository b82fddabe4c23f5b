use anyhow::{Context, Result, anyhow};
use chrono::DateTime;
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::{Mutex, MutexGuard};

use crate::domain::account::ProtectedAccount;
use crate::store::repo::AccountRepository;

pub struct SqliteRepo {
    conn: Mutex<Connection>,
}

impl SqliteRepo {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create store directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open account store {}", path.display()))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.migrate()?;
        Ok(repo)
    }

    pub fn open_in_memory() -> Result<Self> {
        let repo = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        repo.migrate()?;
        Ok(repo)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("account store connection poisoned"))
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                email          TEXT PRIMARY KEY,
                password_hash  TEXT NOT NULL,
                created_at     INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl AccountRepository for SqliteRepo {
    fn find(&self, email: &str) -> Result<Option<ProtectedAccount>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT email, password_hash, created_at FROM users WHERE email=?1"#,
        )?;

        let row = stmt
            .query_row(params![email], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, i64>(2)?,
                ))
            })
            .optional()?;

        let Some((email, password_hash, created_ms)) = row else {
            return Ok(None);
        };
        let created_at = DateTime::from_timestamp_millis(created_ms)
            .ok_or_else(|| anyhow!("bad created_at {created_ms} for {email}"))?;

        Ok(Some(ProtectedAccount {
            email,
            password_hash,
            created_at,
        }))
    }

    fn create_if_absent(&self, account: &ProtectedAccount) -> Result<bool> {
        let inserted = self.conn()?.execute(
            r#"
            INSERT INTO users (email, password_hash, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(email) DO NOTHING
            "#,
            params![
                account.email,
                account.password_hash,
                account.created_at.timestamp_millis()
            ],
        )?;
        Ok(inserted == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_missing_email_is_none() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        assert!(repo.find("nobody@x.com").unwrap().is_none());
    }

    #[test]
    fn second_create_keeps_first_record() {
        let repo = SqliteRepo::open_in_memory().unwrap();

        let first = ProtectedAccount::new("a@x.com", "hash-1");
        assert!(repo.create_if_absent(&first).unwrap());

        let second = ProtectedAccount::new("a@x.com", "hash-2");
        assert!(!repo.create_if_absent(&second).unwrap());

        let stored = repo.find("a@x.com").unwrap().unwrap();
        assert_eq!(stored.password_hash, "hash-1");
        assert_eq!(
            stored.created_at.timestamp_millis(),
            first.created_at.timestamp_millis()
        );
    }

    #[test]
    fn emails_are_independent_keys() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        assert!(repo.create_if_absent(&ProtectedAccount::new("a@x.com", "h")).unwrap());
        assert!(repo.create_if_absent(&ProtectedAccount::new("b@x.com", "h")).unwrap());
        assert!(repo.find("a@x.com").unwrap().is_some());
        assert!(repo.find("b@x.com").unwrap().is_some());
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("accounts.db");
        {
            let repo = SqliteRepo::open(&path).unwrap();
            repo.create_if_absent(&ProtectedAccount::new("a@x.com", "h"))
                .unwrap();
        }
        let repo = SqliteRepo::open(&path).unwrap();
        assert_eq!(repo.find("a@x.com").unwrap().unwrap().password_hash, "h");
    }
}
