use axum::{
    Extension,
    extract::{Multipart, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use tracing::{error, info, warn};

use quill_types::models::{CurrentUser, Flash, Viewer};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::flash;
use crate::views;

/// 2 MB upload limit for avatars
pub const MAX_AVATAR_SIZE: usize = 2 * 1024 * 1024;

/// Extensions accepted for avatar uploads, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Returns the normalized extension if the file name carries an allowed one.
pub fn allowed_extension(file_name: &str) -> Option<&'static str> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.iter().copied().find(|allowed| *allowed == ext)
}

pub async fn show(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let (account, posts) = state
        .query(move |db| {
            let Some(account) = db.get_user_by_id(user_id)? else {
                return Ok(None);
            };
            let posts = db.list_posts_by_author(user_id)?;
            Ok(Some((account, posts)))
        })
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(flash::render(jar, |flash| views::profile(&viewer, flash, &account, &posts)))
}

/// POST /profile — multipart avatar upload in the `avatar` field.
pub async fn upload_avatar(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut upload = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed avatar upload from {}: {}", user.username, e);
                return Ok(reject(jar, "Upload failed, please try again."));
            }
        };

        if field.name() != Some("avatar") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Ok(reject(jar, "No file selected."));
        }
        let Some(ext) = allowed_extension(&file_name) else {
            info!("Rejected avatar {:?} from {}: extension not allowed", file_name, user.username);
            return Ok(reject(jar, "File type not allowed."));
        };

        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to read avatar from {}: {}", user.username, e);
                return Ok(reject(jar, "Upload failed, please try again."));
            }
        };
        upload = Some((ext, data));
        break;
    }

    let Some((ext, data)) = upload else {
        return Ok(reject(jar, "No file selected."));
    };
    if data.is_empty() {
        return Ok(reject(jar, "No file selected."));
    }
    if data.len() > MAX_AVATAR_SIZE {
        return Ok(reject(jar, "Avatar must be at most 2 MB."));
    }

    let relative = state.avatars.save(ext, &data).await.map_err(|e| {
        error!("Failed to store avatar for {}: {}", user.username, e);
        ApiError::Internal(e)
    })?;

    let user_id = user.id;
    let stored = relative.clone();
    let swapped = state
        .query(move |db| db.replace_user_avatar(user_id, &stored))
        .await;

    let previous = match swapped {
        Ok(previous) => previous,
        Err(e) => {
            if let Err(cleanup) = state.avatars.delete(&relative).await {
                warn!("Could not remove orphaned avatar {}: {}", relative, cleanup);
            }
            return Err(e);
        }
    };

    if let Some(previous) = previous.as_deref() {
        if let Err(e) = state.avatars.delete(previous).await {
            warn!("Could not remove old avatar {}: {}", previous, e);
        }
    }

    info!("User {} uploaded avatar {}", user.username, relative);
    Ok(flash::redirect(jar, "/profile", Flash::success("Avatar updated.")).into_response())
}

fn reject(jar: CookieJar, message: &str) -> Response {
    flash::redirect(jar, "/profile", Flash::error(message)).into_response()
}
