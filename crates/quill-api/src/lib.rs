pub mod auth;
pub mod comments;
pub mod error;
pub mod flash;
pub mod middleware;
pub mod policy;
pub mod posts;
pub mod profile;
pub mod storage;
pub mod views;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use crate::auth::{AppState, AppStateInner};
use crate::middleware::{load_viewer, require_login};

/// Multipart bodies carry some framing on top of the largest avatar.
const MAX_BODY_SIZE: usize = 2 * profile::MAX_AVATAR_SIZE;

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(posts::index).post(posts::index))
        .route("/login", get(auth::login_form).post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/register", get(auth::register_form).post(auth::register))
        .route(
            "/post/{post_id}",
            get(posts::show).merge(post(comments::add_comment).layer(from_fn(require_login))),
        );

    let protected_routes = Router::new()
        .route("/create", get(posts::create_form).post(posts::create))
        .route("/edit/{post_id}", get(posts::edit_form).post(posts::edit))
        .route("/delete/{post_id}", post(posts::delete))
        .route("/comment/delete/{comment_id}", post(comments::delete_comment))
        .route("/profile", get(profile::show).post(profile::upload_avatar))
        .layer(from_fn(require_login));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(from_fn_with_state(state.clone(), load_viewer))
        .nest_service("/static", ServeDir::new(state.avatars.static_dir()))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
