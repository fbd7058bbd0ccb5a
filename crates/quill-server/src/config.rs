use std::path::PathBuf;

use anyhow::{Context, Result};

/// Longest session lifetime accepted from `QUILL_SESSION_DAYS`.
pub const MAX_SESSION_DAYS: i64 = 3650;

/// Runtime settings, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub session_days: i64,
    pub cookie_secure: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port: u16 = var("QUILL_PORT", "5000")
            .parse()
            .context("QUILL_PORT must be a port number")?;
        let session_days: i64 = var("QUILL_SESSION_DAYS", "30")
            .parse()
            .context("QUILL_SESSION_DAYS must be a whole number of days")?;
        if session_days <= 0 {
            anyhow::bail!("QUILL_SESSION_DAYS must be positive");
        }
        if session_days > MAX_SESSION_DAYS {
            anyhow::bail!("QUILL_SESSION_DAYS must be at most {}, got {}", MAX_SESSION_DAYS, session_days);
        }
        let cookie_secure = match var("QUILL_COOKIE_SECURE", "false").to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            other => anyhow::bail!("QUILL_COOKIE_SECURE must be true or false, got {:?}", other),
        };

        Ok(Self {
            db_path: var("QUILL_DB_PATH", "data.db").into(),
            host: var("QUILL_HOST", "127.0.0.1"),
            port,
            static_dir: var("QUILL_STATIC_DIR", "./static").into(),
            session_days,
            cookie_secure,
        })
    }
}
