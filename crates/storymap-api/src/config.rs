//! Server configuration from environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DATABASE_URL` | unset: static fallback store |
//! | `RUN_MIGRATIONS` | `true` |
//! | `FALLBACK_DATA_PATH` | unset: built-in seed pins |
//! | `KEYWORD_TABLE_PATH` | unset: built-in keyword table |
//! | `ADMIN_TOKEN` | unset: admin routes reject every request |
//! | `ALLOWED_ORIGINS` | `http://localhost:3000` |
//! | `HOST` / `PORT` | `0.0.0.0` / `3000` |

use std::path::PathBuf;

use axum::http::HeaderValue;
use tracing::warn;

use storymap_core::defaults;

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub database_url: Option<String>,
    pub run_migrations: bool,
    pub fallback_data_path: Option<PathBuf>,
    pub keyword_table_path: Option<PathBuf>,
    pub admin_token: Option<String>,
    pub allowed_origins: Vec<HeaderValue>,
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(subsystem = "api", port = %raw, "Invalid PORT, using default");
                defaults::SERVER_PORT
            }),
            None => defaults::SERVER_PORT,
        };

        Self {
            database_url: get("DATABASE_URL"),
            run_migrations: get("RUN_MIGRATIONS")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
            fallback_data_path: get("FALLBACK_DATA_PATH").map(PathBuf::from),
            keyword_table_path: get("KEYWORD_TABLE_PATH").map(PathBuf::from),
            admin_token: get("ADMIN_TOKEN").map(|t| t.trim().to_string()),
            allowed_origins: parse_allowed_origins(
                get("ALLOWED_ORIGINS").as_deref().unwrap_or(DEFAULT_ALLOWED_ORIGINS),
            ),
            host: get("HOST").unwrap_or_else(|| defaults::SERVER_HOST.to_string()),
            port,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Comma-separated origin list; unparseable entries are skipped.
pub fn parse_allowed_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(subsystem = "api", origin = trimmed, "Ignoring invalid CORS origin");
                    None
                }
            }
        })
        .collect()
}
