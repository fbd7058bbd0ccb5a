use axum::response::{Html, Redirect};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tracing::warn;

use quill_types::models::Flash;

pub const FLASH_COOKIE: &str = "quill_flash";

/// Queue a flash for the next rendered page.
pub fn push(jar: CookieJar, flash: &Flash) -> CookieJar {
    let value = match serde_json::to_vec(flash) {
        Ok(json) => URL_SAFE_NO_PAD.encode(json),
        Err(e) => {
            warn!("Dropping unserializable flash: {}", e);
            return jar;
        }
    };

    jar.add(
        Cookie::build((FLASH_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

/// Remove the pending flash from the jar and return it.
/// A cookie that fails to decode is discarded.
pub fn take(jar: CookieJar) -> (CookieJar, Option<Flash>) {
    let Some(cookie) = jar.get(FLASH_COOKIE) else {
        return (jar, None);
    };

    let flash = URL_SAFE_NO_PAD
        .decode(cookie.value())
        .ok()
        .and_then(|raw| serde_json::from_slice::<Flash>(&raw).ok());

    let jar = jar.remove(Cookie::build((FLASH_COOKIE, "")).path("/"));
    (jar, flash)
}

pub fn redirect(jar: CookieJar, to: &str, flash: Flash) -> (CookieJar, Redirect) {
    (push(jar, &flash), Redirect::to(to))
}

/// Consume any pending flash and render a page with it.
pub fn render<F>(jar: CookieJar, page: F) -> (CookieJar, Html<String>)
where
    F: FnOnce(Option<&Flash>) -> String,
{
    let (jar, flash) = take(jar);
    let html = page(flash.as_ref());
    (jar, Html(html))
}
