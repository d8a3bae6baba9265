// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Result;
use sqlx::Row;
use sqlx::SqlitePool;
use tracing::debug;
use yomu_domain::{
    Category, CategoryId, CategoryUpdate, DelayedTrackingItem, MediaKind, Track, TrackId,
    TrackerId,
};

use crate::repositories::{CategoryRepository, DelayedTrackingStore, TrackRepository};

/// Table names for one side of the library.
#[derive(Debug, Clone, Copy)]
struct Tables {
    categories: &'static str,
    tracks: &'static str,
    delayed_tracking: &'static str,
}

fn tables(kind: MediaKind) -> Tables {
    match kind {
        MediaKind::Manga => Tables {
            categories: "manga_categories",
            tracks: "manga_tracks",
            delayed_tracking: "manga_delayed_tracking",
        },
        MediaKind::Anime => Tables {
            categories: "anime_categories",
            tracks: "anime_tracks",
            delayed_tracking: "anime_delayed_tracking",
        },
    }
}

/// SQLx-backed Category repository
pub struct SqliteCategoryRepository {
    pool: SqlitePool,
    kind: MediaKind,
}

impl SqliteCategoryRepository {
    pub fn new(pool: SqlitePool, kind: MediaKind) -> Self {
        Self { pool, kind }
    }

    fn table(&self) -> &'static str {
        tables(self.kind).categories
    }
}

#[async_trait::async_trait]
impl CategoryRepository for SqliteCategoryRepository {
    async fn get_all(&self) -> Result<Vec<Category>> {
        debug!(target: "repository", kind = %self.kind, "listing categories");
        let q = format!("SELECT * FROM {} ORDER BY sort_order, id", self.table());
        let rows = sqlx::query(&q).fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(row_to_category(&r)?);
        }
        Ok(out)
    }

    async fn get_all_non_system(&self) -> Result<Vec<Category>> {
        debug!(target: "repository", kind = %self.kind, "listing non-system categories");
        let q = format!(
            "SELECT * FROM {} WHERE id != ? ORDER BY sort_order, id",
            self.table()
        );
        let rows = sqlx::query(&q)
            .bind(CategoryId::UNCATEGORIZED.0)
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(row_to_category(&r)?);
        }
        Ok(out)
    }

    async fn insert(&self, name: &str, order: i64, flags: i64) -> Result<Category> {
        debug!(target: "repository", kind = %self.kind, name, order, "creating category");
        let q = format!(
            "INSERT INTO {} (name, sort_order, flags) VALUES (?, ?, ?)",
            self.table()
        );
        let done = sqlx::query(&q)
            .bind(name)
            .bind(order)
            .bind(flags)
            .execute(&self.pool)
            .await?;
        Ok(Category {
            id: CategoryId(done.last_insert_rowid()),
            name: name.to_string(),
            order,
            flags,
        })
    }

    async fn delete(&self, id: CategoryId) -> Result<()> {
        debug!(target: "repository", kind = %self.kind, %id, "deleting category");
        let q = format!("DELETE FROM {} WHERE id = ?", self.table());
        sqlx::query(&q).bind(id.0).execute(&self.pool).await?;
        Ok(())
    }

    async fn update_partial(&self, updates: &[CategoryUpdate]) -> Result<()> {
        debug!(target: "repository", kind = %self.kind, count = updates.len(), "updating categories");
        let q = format!(
            r#"
            UPDATE {} SET
                name = coalesce(?, name),
                sort_order = coalesce(?, sort_order),
                flags = coalesce(?, flags)
            WHERE id = ?
            "#,
            self.table()
        );

        let mut tx = self.pool.begin().await?;
        for update in updates.iter().filter(|u| !u.is_empty()) {
            sqlx::query(&q)
                .bind(update.name.clone())
                .bind(update.order)
                .bind(update.flags)
                .bind(update.id.0)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

// ============================================================================

/// SQLx-backed Track repository
pub struct SqliteTrackRepository {
    pool: SqlitePool,
    kind: MediaKind,
}

impl SqliteTrackRepository {
    pub fn new(pool: SqlitePool, kind: MediaKind) -> Self {
        Self { pool, kind }
    }
}

#[async_trait::async_trait]
impl TrackRepository for SqliteTrackRepository {
    async fn get_one(&self, id: TrackId) -> Result<Option<Track>> {
        debug!(target: "repository", kind = %self.kind, %id, "fetching track by id");
        let q = format!("SELECT * FROM {} WHERE id = ? LIMIT 1", tables(self.kind).tracks);
        let row = sqlx::query(&q).bind(id.0).fetch_optional(&self.pool).await?;
        row.map(|r| row_to_track(&r)).transpose()
    }

    async fn upsert(&self, track: &Track) -> Result<()> {
        debug!(target: "repository", kind = %self.kind, track_id = %track.id, "upserting track");
        let q = format!(
            r#"
            INSERT INTO {} (
                id, media_id, tracker_id, remote_id, title, last_chapter_read,
                total_chapters, status, score, remote_url
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                media_id = excluded.media_id,
                tracker_id = excluded.tracker_id,
                remote_id = excluded.remote_id,
                title = excluded.title,
                last_chapter_read = excluded.last_chapter_read,
                total_chapters = excluded.total_chapters,
                status = excluded.status,
                score = excluded.score,
                remote_url = excluded.remote_url
            "#,
            tables(self.kind).tracks
        );
        sqlx::query(&q)
            .bind(track.id.0)
            .bind(track.media_id)
            .bind(track.tracker_id.0)
            .bind(track.remote_id)
            .bind(track.title.clone())
            .bind(track.last_chapter_read)
            .bind(track.total_chapters)
            .bind(track.status)
            .bind(track.score)
            .bind(track.remote_url.clone())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ============================================================================

/// SQLx-backed queue of delayed tracker updates
pub struct SqliteDelayedTrackingStore {
    pool: SqlitePool,
    kind: MediaKind,
}

impl SqliteDelayedTrackingStore {
    pub fn new(pool: SqlitePool, kind: MediaKind) -> Self {
        Self { pool, kind }
    }
}

#[async_trait::async_trait]
impl DelayedTrackingStore for SqliteDelayedTrackingStore {
    async fn add(&self, track_id: TrackId, last_chapter_read: f64) -> Result<()> {
        debug!(target: "repository", kind = %self.kind, %track_id, last_chapter_read, "queueing delayed tracking update");
        let q = format!(
            r#"
            INSERT INTO {} (track_id, last_chapter_read) VALUES (?, ?)
            ON CONFLICT(track_id) DO UPDATE SET
                last_chapter_read = max(last_chapter_read, excluded.last_chapter_read)
            "#,
            tables(self.kind).delayed_tracking
        );
        sqlx::query(&q)
            .bind(track_id.0)
            .bind(last_chapter_read)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove(&self, track_id: TrackId) -> Result<()> {
        debug!(target: "repository", kind = %self.kind, %track_id, "removing delayed tracking update");
        let q = format!(
            "DELETE FROM {} WHERE track_id = ?",
            tables(self.kind).delayed_tracking
        );
        sqlx::query(&q).bind(track_id.0).execute(&self.pool).await?;
        Ok(())
    }

    async fn items(&self) -> Result<Vec<DelayedTrackingItem>> {
        let q = format!(
            "SELECT track_id, last_chapter_read FROM {} ORDER BY track_id",
            tables(self.kind).delayed_tracking
        );
        let rows = sqlx::query(&q).fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(DelayedTrackingItem {
                track_id: TrackId(r.try_get("track_id")?),
                last_chapter_read: r.try_get("last_chapter_read")?,
            });
        }
        Ok(out)
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn row_to_category(row: &sqlx::sqlite::SqliteRow) -> Result<Category> {
    Ok(Category {
        id: CategoryId(row.try_get("id")?),
        name: row.try_get("name")?,
        order: row.try_get("sort_order")?,
        flags: row.try_get("flags")?,
    })
}

fn row_to_track(row: &sqlx::sqlite::SqliteRow) -> Result<Track> {
    Ok(Track {
        id: TrackId(row.try_get("id")?),
        media_id: row.try_get("media_id")?,
        tracker_id: TrackerId(row.try_get("tracker_id")?),
        remote_id: row.try_get("remote_id")?,
        title: row.try_get("title")?,
        last_chapter_read: row.try_get("last_chapter_read")?,
        total_chapters: row.try_get("total_chapters")?,
        status: row.try_get("status")?,
        score: row.try_get("score")?,
        remote_url: row.try_get("remote_url")?,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect in-memory sqlite");

        sqlx::migrate!("../../migrations").run(&pool).await.expect("migrate");
        pool
    }

    #[tokio::test]
    async fn system_category_is_seeded_and_filtered() {
        let pool = setup_pool().await;
        let repo = SqliteCategoryRepository::new(pool, MediaKind::Manga);

        repo.insert("Reading", 1, 0).await.expect("insert");

        let all = repo.get_all().await.expect("all");
        assert_eq!(all.len(), 2);
        assert!(all[0].is_system_category());

        let user = repo.get_all_non_system().await.expect("non-system");
        assert_eq!(user.len(), 1);
        assert_eq!(user[0].name, "Reading");
        assert!(user[0].id.0 > 0);
    }

    #[tokio::test]
    async fn manga_and_anime_categories_are_separate() {
        let pool = setup_pool().await;
        let manga = SqliteCategoryRepository::new(pool.clone(), MediaKind::Manga);
        let anime = SqliteCategoryRepository::new(pool, MediaKind::Anime);

        manga.insert("Reading", 0, 0).await.expect("insert manga");
        anime.insert("Watching", 0, 0).await.expect("insert anime");
        anime.insert("Dropped", 1, 0).await.expect("insert anime");

        assert_eq!(manga.get_all_non_system().await.unwrap().len(), 1);
        assert_eq!(anime.get_all_non_system().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_partial_only_writes_given_fields() {
        let pool = setup_pool().await;
        let repo = SqliteCategoryRepository::new(pool, MediaKind::Manga);
        let a = repo.insert("A", 0, 7).await.expect("insert a");
        let b = repo.insert("B", 1, 0).await.expect("insert b");

        repo.update_partial(&[
            CategoryUpdate::order(a.id, 1),
            CategoryUpdate::order(b.id, 0),
            CategoryUpdate {
                id: b.id,
                name: Some("Bee".to_string()),
                ..CategoryUpdate::default()
            },
        ])
        .await
        .expect("update");

        let cats = repo.get_all_non_system().await.expect("list");
        assert_eq!(cats[0].id, b.id);
        assert_eq!(cats[0].name, "Bee");
        assert_eq!(cats[0].order, 0);
        assert_eq!(cats[1].id, a.id);
        assert_eq!(cats[1].order, 1);
        assert_eq!(cats[1].flags, 7);
    }

    #[tokio::test]
    async fn update_partial_rolls_back_whole_batch() {
        let pool = setup_pool().await;
        sqlx::query(
            r#"
            CREATE TRIGGER reject_bad_name BEFORE UPDATE ON manga_categories
            WHEN NEW.name = 'bad'
            BEGIN SELECT RAISE(ABORT, 'rejected'); END
            "#,
        )
        .execute(&pool)
        .await
        .expect("create trigger");
        let repo = SqliteCategoryRepository::new(pool, MediaKind::Manga);
        let a = repo.insert("A", 0, 0).await.expect("insert a");
        let b = repo.insert("B", 1, 0).await.expect("insert b");

        let result = repo
            .update_partial(&[
                CategoryUpdate::order(a.id, 5),
                CategoryUpdate {
                    id: b.id,
                    name: Some("bad".to_string()),
                    ..CategoryUpdate::default()
                },
            ])
            .await;

        assert!(result.is_err());
        let cats = repo.get_all_non_system().await.expect("list");
        assert_eq!(cats[0].id, a.id);
        assert_eq!(cats[0].order, 0);
        assert_eq!(cats[1].name, "B");
    }

    #[tokio::test]
    async fn delete_removes_category() {
        let pool = setup_pool().await;
        let repo = SqliteCategoryRepository::new(pool, MediaKind::Anime);
        let cat = repo.insert("Plan to watch", 0, 0).await.expect("insert");

        repo.delete(cat.id).await.expect("delete");
        assert!(repo.get_all_non_system().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn track_upsert_and_get_round_trip() {
        let pool = setup_pool().await;
        let repo = SqliteTrackRepository::new(pool, MediaKind::Manga);

        let mut track = Track::new(TrackId(10), 3, TrackerId(2), "Some Series");
        repo.upsert(&track).await.expect("insert");

        track.last_chapter_read = 12.5;
        repo.upsert(&track).await.expect("update");

        let fetched = repo
            .get_one(TrackId(10))
            .await
            .expect("fetch")
            .expect("track exists");
        assert_eq!(fetched, track);
        assert!(repo.get_one(TrackId(11)).await.expect("fetch").is_none());
    }

    #[tokio::test]
    async fn delayed_store_keeps_furthest_chapter() {
        let pool = setup_pool().await;
        let store = SqliteDelayedTrackingStore::new(pool, MediaKind::Manga);

        store.add(TrackId(1), 5.0).await.expect("add");
        store.add(TrackId(1), 3.0).await.expect("add lower");
        store.add(TrackId(2), 1.0).await.expect("add other");

        let items = store.items().await.expect("items");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].track_id, TrackId(1));
        assert_eq!(items[0].last_chapter_read, 5.0);

        store.remove(TrackId(1)).await.expect("remove");
        let items = store.items().await.expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].track_id, TrackId(2));
    }
}
