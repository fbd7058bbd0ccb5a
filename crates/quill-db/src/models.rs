//! Database row types. These map directly to SQLite rows and carry
//! timestamps exactly as SQLite stores them.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: Option<String>,
    pub created_at: String,
}

/// A post joined with its author's username and comment count.
pub struct PostRow {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub author_username: String,
    pub comment_count: i64,
    pub created_at: String,
}

/// A comment joined with its author's username and the parent post's author,
/// which is everything a delete check needs.
pub struct CommentRow {
    pub id: i64,
    pub post_id: i64,
    pub post_author_id: i64,
    pub author_id: i64,
    pub author_username: String,
    pub content: String,
    pub created_at: String,
}
