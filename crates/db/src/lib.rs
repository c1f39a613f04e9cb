use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use relay_core::{MonitorStats, MonitoringCursor, ObservedPost, PostRecord};
use rusqlite::OptionalExtension;
use rusqlite::{Connection, Row, params};
use tracing::warn;

pub const MIGRATION_0001: &str = include_str!("../migrations/0001_init.sql");

pub const MIGRATIONS: &[(&str, &str)] = &[("0001_init", MIGRATION_0001)];

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    pub fn migrate(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        for (_name, sql) in MIGRATIONS {
            tx.execute_batch(sql)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Upserts a post by shortcode. The first sighting inserts the full
    /// row with `recorded_at` set once; later sightings only mark the post
    /// sent and refresh `sent_at`.
    pub fn upsert_post(&self, post: &ObservedPost) -> Result<()> {
        let now = now_utc();
        self.conn.execute(
            r#"
            INSERT INTO post (
              username, shortcode, url, owner_name, owner_username, caption,
              image_url, posted_at, sent_to_webhook, sent_at, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10)
            ON CONFLICT(shortcode) DO UPDATE SET
              sent_to_webhook = 1,
              sent_at = excluded.sent_at
            "#,
            params![
                post.username,
                post.shortcode,
                post.url,
                post.owner_name,
                post.owner_username,
                post.caption,
                post.image_url,
                post.posted_at,
                now,
                now,
            ],
        )?;
        Ok(())
    }

    pub fn post_sent(&self, shortcode: &str) -> Result<bool> {
        let sent = self
            .conn
            .query_row(
                "SELECT 1 FROM post WHERE shortcode = ?1 AND sent_to_webhook = 1",
                params![shortcode],
                |_| Ok(()),
            )
            .optional()?;
        Ok(sent.is_some())
    }

    /// Upserts the per-account cursor. `last_checked_at` is always
    /// refreshed; `last_seen_shortcode` is only overwritten when a new
    /// value is supplied.
    pub fn update_cursor(&self, username: &str, last_shortcode: Option<&str>) -> Result<()> {
        let now = now_utc();
        self.conn.execute(
            r#"
            INSERT INTO monitoring_cursor (
              username, last_seen_shortcode, last_checked_at, is_active, updated_at
            ) VALUES (?1, ?2, ?3, 1, ?3)
            ON CONFLICT(username) DO UPDATE SET
              last_seen_shortcode = COALESCE(excluded.last_seen_shortcode, monitoring_cursor.last_seen_shortcode),
              last_checked_at = excluded.last_checked_at,
              updated_at = excluded.updated_at
            "#,
            params![username, last_shortcode, now],
        )?;
        Ok(())
    }

    pub fn last_seen_shortcode(&self, username: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT last_seen_shortcode FROM monitoring_cursor WHERE username = ?1",
                params![username],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map(|value| value.flatten())
            .map_err(DbError::from)
    }

    pub fn cursor(&self, username: &str) -> Result<Option<MonitoringCursor>> {
        self.conn
            .query_row(
                r#"
                SELECT username, last_seen_shortcode, last_checked_at, is_active, updated_at
                FROM monitoring_cursor
                WHERE username = ?1
                "#,
                params![username],
                row_to_cursor,
            )
            .optional()
            .map_err(DbError::from)
    }

    pub fn stats(&self, username: &str) -> Result<MonitorStats> {
        let total_posts: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM post WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )?;
        let sent_posts: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM post WHERE username = ?1 AND sent_to_webhook = 1",
            params![username],
            |row| row.get(0),
        )?;
        let cursor = self.cursor(username)?;
        Ok(MonitorStats {
            total_posts: total_posts.max(0) as u64,
            sent_posts: sent_posts.max(0) as u64,
            last_checked_at: cursor.as_ref().and_then(|c| c.last_checked_at.clone()),
            last_seen_shortcode: cursor.and_then(|c| c.last_seen_shortcode),
        })
    }

    pub fn recent_posts(&self, username: &str, limit: u32) -> Result<Vec<PostRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT username, shortcode, url, owner_name, owner_username, caption,
                   image_url, posted_at, sent_to_webhook, sent_at, recorded_at
            FROM post
            WHERE username = ?1
            ORDER BY recorded_at DESC, id DESC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt
            .query_map(params![username, limit], row_to_post)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn row_to_post(row: &Row<'_>) -> std::result::Result<PostRecord, rusqlite::Error> {
    Ok(PostRecord {
        username: row.get(0)?,
        shortcode: row.get(1)?,
        url: row.get(2)?,
        owner_name: row.get(3)?,
        owner_username: row.get(4)?,
        caption: row.get(5)?,
        image_url: row.get(6)?,
        posted_at: row.get(7)?,
        sent_to_webhook: row.get::<_, i64>(8)? != 0,
        sent_at: row.get(9)?,
        recorded_at: row.get(10)?,
    })
}

fn row_to_cursor(row: &Row<'_>) -> std::result::Result<MonitoringCursor, rusqlite::Error> {
    Ok(MonitoringCursor {
        username: row.get(0)?,
        last_seen_shortcode: row.get(1)?,
        last_checked_at: row.get(2)?,
        is_active: row.get::<_, i64>(3)? != 0,
        updated_at: row.get(4)?,
    })
}

fn now_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Availability-policy wrapper around [`Db`]. Each call opens a fresh
/// connection, performs one unit of work and releases it. When no backing
/// database is configured, or it cannot be opened, every write degrades to
/// a no-op failure indicator and every read to an empty default; callers
/// never see an error.
#[derive(Clone)]
pub struct Store {
    db_path: Option<PathBuf>,
}

impl Store {
    /// Opens (and migrates) the database at `path`. Falls back to the
    /// degraded no-op store when the database cannot be reached.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Db::open(&path).and_then(|mut db| db.migrate().map(|_| db)) {
            Ok(_) => Self {
                db_path: Some(path),
            },
            Err(err) => {
                warn!("database unavailable, running without persistence: {}", err);
                Self::degraded()
            }
        }
    }

    pub fn degraded() -> Self {
        Self { db_path: None }
    }

    pub fn available(&self) -> bool {
        self.db_path.is_some()
    }

    fn with_db<T>(&self, default: T, op: impl FnOnce(&Db) -> Result<T>) -> T {
        let Some(path) = &self.db_path else {
            return default;
        };
        match Db::open(path).and_then(|db| op(&db)) {
            Ok(value) => value,
            Err(err) => {
                warn!("store operation failed: {}", err);
                default
            }
        }
    }

    pub fn is_post_sent(&self, shortcode: &str) -> bool {
        self.with_db(false, |db| db.post_sent(shortcode))
    }

    pub fn save_post(&self, post: &ObservedPost) -> bool {
        self.with_db(false, |db| db.upsert_post(post).map(|_| true))
    }

    pub fn update_cursor(&self, username: &str, last_shortcode: Option<&str>) {
        self.with_db((), |db| db.update_cursor(username, last_shortcode));
    }

    pub fn last_seen_shortcode(&self, username: &str) -> Option<String> {
        self.with_db(None, |db| db.last_seen_shortcode(username))
    }

    pub fn stats(&self, username: &str) -> MonitorStats {
        self.with_db(MonitorStats::default(), |db| db.stats(username))
    }

    pub fn recent_posts(&self, username: &str, limit: u32) -> Vec<PostRecord> {
        self.with_db(Vec::new(), |db| db.recent_posts(username, limit))
    }
}
