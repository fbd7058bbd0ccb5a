use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;

use quill_types::models::{CurrentUser, Flash, Viewer};

use crate::auth::{AppState, session_id};
use crate::error::ApiError;
use crate::flash;

pub const SESSION_COOKIE: &str = "quill_session";

/// Resolve the session cookie to a [`Viewer`] and attach it to the request.
/// Unknown or expired sessions leave the viewer anonymous.
pub async fn load_viewer(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let viewer = match jar.get(SESSION_COOKIE) {
        Some(cookie) => {
            let sid = session_id(cookie.value());
            let user = state.query(move |db| db.get_session_user(&sid)).await?;
            Viewer(user.map(|u| CurrentUser {
                id: u.id,
                username: u.username,
                avatar: u.avatar,
            }))
        }
        None => Viewer::default(),
    };

    req.extensions_mut().insert(viewer);
    Ok(next.run(req).await)
}

/// Gate for routes that need a logged-in user. Anonymous requests are sent
/// to the login form; everyone else gets a [`CurrentUser`] extension.
pub async fn require_login(jar: CookieJar, mut req: Request, next: Next) -> Response {
    let user = req
        .extensions()
        .get::<Viewer>()
        .and_then(|viewer| viewer.user().cloned());

    match user {
        Some(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        None => flash::redirect(jar, "/login", Flash::info("Please log in to continue.")).into_response(),
    }
}
