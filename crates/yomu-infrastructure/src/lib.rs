// SPDX-License-Identifier: GPL-3.0-or-later
pub mod repositories;
pub mod sqlite_adapters;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;
use yomu_config::AppConfig;

pub use repositories::{CategoryRepository, DelayedTrackingStore, TrackRepository};
pub use sqlite_adapters::{
    SqliteCategoryRepository, SqliteDelayedTrackingStore, SqliteTrackRepository,
};

/// Turn a configured `sqlite://` URL into one SQLite can open on any platform,
/// creating the parent directory of file databases.
pub fn normalize_database_url(url: &str) -> Result<String> {
    if !url.starts_with("sqlite://") || url.starts_with("sqlite://:memory:") {
        return Ok(url.to_string());
    }

    let db_path = url.trim_start_matches("sqlite://");
    let path = Path::new(db_path);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
            info!(target: "infrastructure", path = %parent.display(), "created database directory");
        }
    }

    let absolute_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    // Forward slashes work for SQLite on every platform
    let path_str = absolute_path.to_string_lossy().replace('\\', "/");

    Ok(format!("sqlite://{}?mode=rwc", path_str))
}

/// Open the connection pool and bring the schema up to date.
pub async fn init_database(config: &AppConfig) -> Result<SqlitePool> {
    info!(target: "infrastructure", "initializing database");

    let db_url = normalize_database_url(&config.database.url)?;
    info!(target: "infrastructure", db_url = %db_url, "connecting to database");

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.pool_max_size)
        .connect(&db_url)
        .await?;

    info!(target: "infrastructure", db_url = %config.database.url, "running migrations");
    sqlx::migrate!("../../migrations").run(&pool).await?;

    info!(target: "infrastructure", "database initialized successfully");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_and_foreign_urls_are_untouched() {
        assert_eq!(
            normalize_database_url("sqlite://:memory:").unwrap(),
            "sqlite://:memory:"
        );
        assert_eq!(
            normalize_database_url("sqlite::memory:").unwrap(),
            "sqlite::memory:"
        );
    }

    #[test]
    fn file_url_becomes_absolute_and_creates_parent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = dir.path().join("nested").join("yomu.db");
        let url = format!("sqlite://{}", db.display());

        let normalized = normalize_database_url(&url).expect("normalize");

        assert!(normalized.starts_with("sqlite://"));
        assert!(normalized.ends_with("yomu.db?mode=rwc"));
        assert!(!normalized.contains('\\'));
        assert!(dir.path().join("nested").is_dir());
    }

    #[tokio::test]
    async fn init_database_runs_migrations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::default();
        config.database.url = format!("sqlite://{}", dir.path().join("yomu.db").display());

        let pool = init_database(&config).await.expect("init");
        let repo = SqliteCategoryRepository::new(pool, yomu_domain::MediaKind::Manga);
        let all = repo.get_all().await.expect("list");
        assert_eq!(all.len(), 1);
        assert!(all[0].is_system_category());
    }
}
