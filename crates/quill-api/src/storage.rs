use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

/// Subdirectory of the static root that holds avatars.
const AVATAR_DIR: &str = "avatars";

/// Manages avatar files under the static directory.
///
/// Each avatar is stored as `{static_dir}/avatars/{uuid}.{ext}`; the user
/// record keeps the path relative to `static_dir`.
pub struct AvatarStore {
    static_dir: PathBuf,
}

impl AvatarStore {
    pub async fn new(static_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(static_dir.join(AVATAR_DIR)).await?;
        info!("Static directory: {}", static_dir.display());
        Ok(Self { static_dir })
    }

    pub fn static_dir(&self) -> &Path {
        &self.static_dir
    }

    /// Write an avatar and return its path relative to the static directory.
    pub async fn save(&self, ext: &str, data: &[u8]) -> Result<String> {
        let relative = format!("{}/{}.{}", AVATAR_DIR, Uuid::new_v4(), ext);
        fs::write(self.static_dir.join(&relative), data).await?;
        Ok(relative)
    }

    /// Delete a previously stored avatar. Missing files are not an error.
    pub async fn delete(&self, relative: &str) -> Result<()> {
        let Some(name) = relative.strip_prefix("avatars/") else {
            bail!("Refusing to delete {} outside the avatar directory", relative);
        };
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            bail!("Refusing to delete suspicious avatar path {}", relative);
        }

        match fs::remove_file(self.static_dir.join(relative)).await {
            Ok(()) => {
                info!("Deleted avatar {}", relative);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Avatar {} already gone", relative);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
