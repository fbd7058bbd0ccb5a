use axum::{
    Extension, Form,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use tracing::{info, warn};

use quill_types::forms::CommentForm;
use quill_types::models::{CurrentUser, Flash};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::flash;
use crate::policy::can_delete_comment;

/// POST /post/{id} — add a comment to a post.
pub async fn add_comment(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
    Form(form): Form<CommentForm>,
) -> Result<Response, ApiError> {
    let back = format!("/post/{}", post_id);
    let exists = state
        .query(move |db| Ok(db.get_post(post_id)?.is_some()))
        .await?;
    if !exists {
        return Err(ApiError::NotFound);
    }

    if let Err(msg) = form.validate() {
        return Ok(flash::redirect(jar, &back, Flash::error(msg)).into_response());
    }

    let author_id = user.id;
    let comment_id = state
        .query(move |db| db.create_comment(post_id, author_id, form.content.trim()))
        .await?;

    info!("Comment {} added to post {} by {}", comment_id, post_id, user.username);
    Ok(flash::redirect(jar, &back, Flash::success("Comment added.")).into_response())
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<i64>,
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let comment = state
        .query(move |db| db.get_comment(comment_id))
        .await?
        .ok_or(ApiError::NotFound)?;

    let back = format!("/post/{}", comment.post_id);
    if !can_delete_comment(user.id, &comment) {
        warn!("User {} tried to delete comment {} by {}", user.username, comment.id, comment.author_username);
        return Ok(flash::redirect(jar, &back, Flash::error("You do not have permission to delete this comment.")).into_response());
    }

    state.query(move |db| db.delete_comment(comment_id)).await?;

    info!("Comment {} deleted by {}", comment_id, user.username);
    Ok(flash::redirect(jar, &back, Flash::success("Comment deleted.")).into_response())
}
