use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};

use crate::Database;
use crate::models::{CommentRow, PostRow, UserRow};

const USER_COLUMNS: &str = "id, username, email, password_hash, avatar, created_at";

const POST_SELECT: &str = "
    SELECT p.id, p.title, p.content, p.author_id, u.username,
           (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id),
           p.created_at
    FROM posts p
    JOIN users u ON p.author_id = u.id";

const COMMENT_SELECT: &str = "
    SELECT c.id, c.post_id, p.author_id, c.author_id, u.username, c.content, c.created_at
    FROM comments c
    JOIN posts p ON c.post_id = p.id
    JOIN users u ON c.author_id = u.id";

/// Matches the layout SQLite's `datetime('now')` produces, so stored
/// expiries compare correctly as text.
const SQLITE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl Database {
    // -- Users --

    /// Inserts a user. Returns `None` when the username or email is taken.
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, email, password_hash) VALUES (?1, ?2, ?3)",
                (username, email, password_hash),
            );
            match inserted {
                Ok(_) => Ok(Some(conn.last_insert_rowid())),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// True if any user already has this username or this email.
    pub fn username_or_email_taken(&self, username: &str, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let taken = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1 OR email = ?2)",
                (username, email),
                |row| row.get(0),
            )?;
            Ok(taken)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", username))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    /// Points the user at a new avatar and returns the one it replaced.
    pub fn replace_user_avatar(&self, user_id: i64, avatar: &str) -> Result<Option<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let previous: Option<String> = tx
                .query_row("SELECT avatar FROM users WHERE id = ?1", [user_id], |row| row.get(0))
                .optional()?
                .flatten();
            let updated = tx.execute(
                "UPDATE users SET avatar = ?1 WHERE id = ?2",
                (avatar, user_id),
            )?;
            if updated == 0 {
                anyhow::bail!("No user {} to attach avatar to", user_id);
            }
            tx.commit()?;
            Ok(previous)
        })
    }

    // -- Posts --

    pub fn create_post(&self, author_id: i64, title: &str, content: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (title, content, author_id) VALUES (?1, ?2, ?3)",
                (title, content, author_id),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_post(&self, id: i64) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("{POST_SELECT} WHERE p.id = ?1");
            let row = conn.query_row(&sql, [id], map_post).optional()?;
            Ok(row)
        })
    }

    /// All posts, newest first.
    pub fn list_posts(&self) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("{POST_SELECT} ORDER BY p.created_at DESC, p.id DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_post)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_posts_by_author(&self, author_id: i64) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{POST_SELECT} WHERE p.author_id = ?1 ORDER BY p.created_at DESC, p.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([author_id], map_post)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false if the post does not exist.
    pub fn update_post(&self, id: i64, title: &str, content: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE posts SET title = ?1, content = ?2 WHERE id = ?3",
                (title, content, id),
            )?;
            Ok(changed > 0)
        })
    }

    /// Deletes a post. Its comments go with it via `ON DELETE CASCADE`.
    pub fn delete_post(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    // -- Comments --

    pub fn create_comment(&self, post_id: i64, author_id: i64, content: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (content, post_id, author_id) VALUES (?1, ?2, ?3)",
                (content, post_id, author_id),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            let sql = format!("{COMMENT_SELECT} WHERE c.id = ?1");
            let row = conn.query_row(&sql, [id], map_comment).optional()?;
            Ok(row)
        })
    }

    /// Comments on a post, oldest first.
    pub fn list_comments(&self, post_id: i64) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let sql = format!("{COMMENT_SELECT} WHERE c.post_id = ?1 ORDER BY c.created_at, c.id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([post_id], map_comment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_comment(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    // -- Sessions --

    pub fn create_session(&self, id: &str, user_id: i64, expires_at: DateTime<Utc>) -> Result<()> {
        let expires_at = expires_at.format(SQLITE_TIME_FORMAT).to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, expires_at) VALUES (?1, ?2, ?3)",
                (id, user_id, expires_at),
            )?;
            Ok(())
        })
    }

    /// Resolves a live session to its user. Expired sessions resolve to `None`.
    pub fn get_session_user(&self, session_id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT u.id, u.username, u.email, u.password_hash, u.avatar, u.created_at
                     FROM sessions s
                     JOIN users u ON s.user_id = u.id
                     WHERE s.id = ?1 AND s.expires_at > datetime('now')",
                    [session_id],
                    map_user,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", [session_id])?;
            Ok(())
        })
    }

    /// Removes expired sessions, returning how many were deleted.
    pub fn purge_expired_sessions(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let removed =
                conn.execute("DELETE FROM sessions WHERE expires_at <= datetime('now')", [])?;
            Ok(removed)
        })
    }
}

fn query_user<P: rusqlite::ToSql>(
    conn: &Connection,
    filter: &str,
    value: P,
) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {filter}");
    let row = conn.query_row(&sql, [value], map_user).optional()?;
    Ok(row)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        avatar: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_post(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        author_id: row.get(3)?,
        author_username: row.get(4)?,
        comment_count: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_comment(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        post_author_id: row.get(2)?,
        author_id: row.get(3)?,
        author_username: row.get(4)?,
        content: row.get(5)?,
        created_at: row.get(6)?,
    })
}
