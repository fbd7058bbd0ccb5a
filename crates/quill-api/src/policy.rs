//! Ownership rules for mutating posts and comments.

use quill_db::models::{CommentRow, PostRow};

/// Only the author may edit or delete a post.
pub fn can_modify_post(user_id: i64, post: &PostRow) -> bool {
    post.author_id == user_id
}

/// A comment may be removed by whoever wrote it or by the author of the
/// post it sits under.
pub fn can_delete_comment(user_id: i64, comment: &CommentRow) -> bool {
    comment.author_id == user_id || comment.post_author_id == user_id
}
