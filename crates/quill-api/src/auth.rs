use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{
    Extension, Form,
    extract::State,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::Engine;
use chrono::TimeDelta;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use quill_db::Database;
use quill_types::forms::{LoginForm, RegisterForm};
use quill_types::models::{Flash, Viewer};

use crate::error::ApiError;
use crate::flash;
use crate::middleware::SESSION_COOKIE;
use crate::storage::AvatarStore;
use crate::views;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub avatars: AvatarStore,
    pub session_days: i64,
    pub cookie_secure: bool,
}

impl AppStateInner {
    /// Runs blocking database work off the async runtime.
    pub async fn query<F, T>(self: &Arc<Self>, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&state.db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(e.into())
            })?
            .map_err(ApiError::Internal)
    }
}

pub async fn register_form(Extension(viewer): Extension<Viewer>, jar: CookieJar) -> impl IntoResponse {
    flash::render(jar, |flash| views::register(&viewer, flash))
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(mut form): Form<RegisterForm>,
) -> Result<Response, ApiError> {
    if let Err(msg) = form.normalize() {
        return Ok(flash::redirect(jar, "/register", Flash::error(msg)).into_response());
    }

    let RegisterForm { username, email, password } = form;
    let name = username.clone();
    let created = state
        .query(move |db| {
            if db.username_or_email_taken(&username, &email)? {
                return Ok(None);
            }
            let password_hash = hash_password(&password)?;
            db.create_user(&username, &email, &password_hash)
        })
        .await?;

    match created {
        Some(user_id) => {
            info!("Registered user {} ({})", name, user_id);
            Ok(flash::redirect(jar, "/login", Flash::success("Registration successful, please log in.")).into_response())
        }
        None => {
            debug!("Registration refused for {}: username or email taken", name);
            Ok(flash::redirect(jar, "/register", Flash::error("Username or email already exists, please choose another.")).into_response())
        }
    }
}

pub async fn login_form(Extension(viewer): Extension<Viewer>, jar: CookieJar) -> impl IntoResponse {
    flash::render(jar, |flash| views::login(&viewer, flash))
}

pub async fn login(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let username = form.username.trim().to_string();
    let password = form.password;

    let user = state
        .query(move |db| {
            let Some(user) = db.get_user_by_username(&username)? else {
                return Ok(None);
            };
            Ok(verify_password(&password, &user.password_hash).then_some(user))
        })
        .await?;

    let Some(user) = user else {
        warn!("Failed login attempt for {}", form.username.trim());
        let failure = Flash::error("Invalid username or password.");
        return Ok(Html(views::login(&viewer, Some(&failure))).into_response());
    };

    let token = new_session_token();
    let sid = session_id(&token);
    let lifetime = session_lifetime(state.session_days)?;
    let expires_at = chrono::Utc::now()
        .checked_add_signed(lifetime)
        .ok_or_else(|| anyhow::anyhow!("Session expiry overflows for {} days", state.session_days))?;
    let user_id = user.id;

    state
        .query(move |db| {
            let purged = db.purge_expired_sessions()?;
            if purged > 0 {
                debug!("Purged {} expired sessions", purged);
            }
            db.create_session(&sid, user_id, expires_at)
        })
        .await?;

    info!("User {} logged in", user.username);

    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.cookie_secure)
        .max_age(time::Duration::seconds(lifetime.num_seconds()));

    Ok(flash::redirect(jar.add(cookie), "/", Flash::success("Logged in.")).into_response())
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Result<Response, ApiError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let sid = session_id(cookie.value());
        state.query(move |db| db.delete_session(&sid)).await?;
    }

    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/"));
    Ok(flash::redirect(jar, "/login", Flash::info("Logged out.")).into_response())
}

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash) else {
        warn!("Stored password hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn session_lifetime(days: i64) -> anyhow::Result<TimeDelta> {
    TimeDelta::try_days(days).ok_or_else(|| anyhow::anyhow!("Session lifetime of {} days is out of range", days))
}

/// Opaque cookie value handed to the browser.
fn new_session_token() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>())
}

/// Only the digest of a session token is ever stored.
pub fn session_id(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
