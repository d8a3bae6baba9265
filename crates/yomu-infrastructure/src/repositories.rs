// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Result;
use yomu_domain::{Category, CategoryId, CategoryUpdate, DelayedTrackingItem, Track, TrackId};

// ============================================================================
// Repository Traits
// ============================================================================
//
// Every adapter instance is bound to one `MediaKind`; manga and anime data never
// share a repository.

/// Category repository
#[async_trait::async_trait]
pub trait CategoryRepository: Send + Sync {
    /// All categories, system categories included, ordered by ordinal.
    async fn get_all(&self) -> Result<Vec<Category>>;

    /// Categories the user may reorder, ordered by ordinal.
    async fn get_all_non_system(&self) -> Result<Vec<Category>>;

    async fn insert(&self, name: &str, order: i64, flags: i64) -> Result<Category>;

    async fn delete(&self, id: CategoryId) -> Result<()>;

    /// Apply a batch of partial updates. Either every update is written or none is.
    async fn update_partial(&self, updates: &[CategoryUpdate]) -> Result<()>;
}

/// Tracker link repository
#[async_trait::async_trait]
pub trait TrackRepository: Send + Sync {
    async fn get_one(&self, id: TrackId) -> Result<Option<Track>>;
    async fn upsert(&self, track: &Track) -> Result<()>;
}

/// Queue of tracker updates that could not be sent yet
#[async_trait::async_trait]
pub trait DelayedTrackingStore: Send + Sync {
    /// Record an update. An existing entry keeps the furthest chapter.
    async fn add(&self, track_id: TrackId, last_chapter_read: f64) -> Result<()>;
    async fn remove(&self, track_id: TrackId) -> Result<()>;
    async fn items(&self) -> Result<Vec<DelayedTrackingItem>>;
}
