use axum::{
    Extension, Form,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use tracing::{info, warn};

use quill_types::forms::PostForm;
use quill_types::models::{CurrentUser, Flash, Viewer};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::flash;
use crate::policy::can_modify_post;
use crate::views;

pub async fn index(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let posts = state.query(|db| db.list_posts()).await?;
    Ok(flash::render(jar, |flash| views::index(&viewer, flash, &posts)))
}

/// GET /post/{id} — a post with its comments.
pub async fn show(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Extension(viewer): Extension<Viewer>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let (post, comments) = state
        .query(move |db| {
            let Some(post) = db.get_post(post_id)? else {
                return Ok(None);
            };
            let comments = db.list_comments(post_id)?;
            Ok(Some((post, comments)))
        })
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(flash::render(jar, |flash| views::post_detail(&viewer, flash, &post, &comments)))
}

pub async fn create_form(Extension(viewer): Extension<Viewer>, jar: CookieJar) -> impl IntoResponse {
    flash::render(jar, |flash| views::post_form(&viewer, flash, "/create", None))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
    Form(form): Form<PostForm>,
) -> Result<Response, ApiError> {
    if let Err(msg) = form.validate() {
        return Ok(flash::redirect(jar, "/create", Flash::error(msg)).into_response());
    }

    let author_id = user.id;
    let post_id = state
        .query(move |db| db.create_post(author_id, form.title.trim(), &form.content))
        .await?;

    info!("Post {} created by {}", post_id, user.username);
    Ok(flash::redirect(jar, "/", Flash::success("Post created.")).into_response())
}

pub async fn edit_form(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Extension(viewer): Extension<Viewer>,
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let post = state
        .query(move |db| db.get_post(post_id))
        .await?
        .ok_or(ApiError::NotFound)?;

    if !can_modify_post(user.id, &post) {
        return Ok(flash::redirect(jar, "/", Flash::error("You do not have permission to edit this post.")).into_response());
    }

    let action = format!("/edit/{}", post.id);
    Ok(flash::render(jar, |flash| views::post_form(&viewer, flash, &action, Some(&post))).into_response())
}

pub async fn edit(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
    Form(form): Form<PostForm>,
) -> Result<Response, ApiError> {
    let post = state
        .query(move |db| db.get_post(post_id))
        .await?
        .ok_or(ApiError::NotFound)?;

    if !can_modify_post(user.id, &post) {
        warn!("User {} tried to edit post {} owned by {}", user.username, post.id, post.author_username);
        return Ok(flash::redirect(jar, "/", Flash::error("You do not have permission to edit this post.")).into_response());
    }

    let back = format!("/edit/{}", post_id);
    if let Err(msg) = form.validate() {
        return Ok(flash::redirect(jar, &back, Flash::error(msg)).into_response());
    }

    let updated = state
        .query(move |db| db.update_post(post_id, form.title.trim(), &form.content))
        .await?;
    if !updated {
        return Err(ApiError::NotFound);
    }

    info!("Post {} updated by {}", post_id, user.username);
    let to = format!("/post/{}", post_id);
    Ok(flash::redirect(jar, &to, Flash::success("Post updated.")).into_response())
}

pub async fn delete(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let post = state
        .query(move |db| db.get_post(post_id))
        .await?
        .ok_or(ApiError::NotFound)?;

    if !can_modify_post(user.id, &post) {
        warn!("User {} tried to delete post {} owned by {}", user.username, post.id, post.author_username);
        return Ok(flash::redirect(jar, "/", Flash::error("You do not have permission to delete this post.")).into_response());
    }

    state.query(move |db| db.delete_post(post_id)).await?;

    info!("Post {} deleted by {}", post_id, user.username);
    Ok(flash::redirect(jar, "/", Flash::success("Post deleted.")).into_response())
}
