// SPDX-License-Identifier: GPL-3.0-or-later

//! Tracker seam and the flush of delayed tracker updates.
//!
//! When a progress update cannot reach a tracking service (offline, service
//! down) it is parked in a [`DelayedTrackingStore`]. [`DelayedTrackingSync`]
//! later replays the parked updates:
//! 1. Items whose track no longer exists are dropped
//! 2. Items for a logged-in tracker are sent, saved locally, then dropped
//! 3. Items for an unknown or logged-out tracker are dropped unsent
//! 4. Items whose update failed stay parked for the next run

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, error, info};
use yomu_domain::{DelayedTrackingItem, Track, TrackerId};
use yomu_infrastructure::{DelayedTrackingStore, TrackRepository};

/// Errors reported by a tracking service.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Tracker request failed: {0}")]
    Request(String),
}

/// A remote tracking service (MyAnimeList, AniList, Shikimori, ...).
#[async_trait::async_trait]
pub trait Tracker: Send + Sync {
    fn id(&self) -> TrackerId;

    fn name(&self) -> &str;

    fn is_logged_in(&self) -> bool;

    /// Push local progress to the service. Returns the entry as the service
    /// now reports it.
    async fn update(&self, track: &Track, did_read_chapter: bool) -> Result<Track, TrackerError>;
}

/// Trackers known to the application, keyed by id.
#[derive(Default)]
pub struct TrackerManager {
    trackers: HashMap<TrackerId, Arc<dyn Tracker>>,
}

impl TrackerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tracker: Arc<dyn Tracker>) {
        debug!(target: "application", tracker_id = %tracker.id(), name = tracker.name(), "registering tracker");
        self.trackers.insert(tracker.id(), tracker);
    }

    pub fn get(&self, id: TrackerId) -> Option<Arc<dyn Tracker>> {
        self.trackers.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}

/// Counts from one flush of the delayed queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub updated: usize,
    pub discarded: usize,
    pub failed: usize,
    /// Items still parked after the flush.
    pub remaining: usize,
}

#[derive(Clone)]
pub struct DelayedTrackingSync {
    tracks: Arc<dyn TrackRepository>,
    store: Arc<dyn DelayedTrackingStore>,
    trackers: Arc<TrackerManager>,
}

impl DelayedTrackingSync {
    pub fn new(
        tracks: Arc<dyn TrackRepository>,
        store: Arc<dyn DelayedTrackingStore>,
        trackers: Arc<TrackerManager>,
    ) -> Self {
        Self {
            tracks,
            store,
            trackers,
        }
    }

    /// Replay every parked update once.
    ///
    /// Only listing the queue can fail the whole flush; per-item failures are
    /// logged, counted, and leave the item parked.
    pub async fn run(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for item in self.store.items().await? {
            match self.flush_item(item).await {
                Ok(ItemOutcome::Updated) => report.updated += 1,
                Ok(ItemOutcome::Discarded) => report.discarded += 1,
                Err(err) => {
                    error!(target: "application", track_id = %item.track_id, error = %err, "delayed tracking update failed");
                    report.failed += 1;
                }
            }
        }

        report.remaining = self.store.items().await?.len();
        info!(
            target: "application",
            updated = report.updated,
            discarded = report.discarded,
            failed = report.failed,
            remaining = report.remaining,
            "delayed tracking flush finished"
        );
        Ok(report)
    }

    async fn flush_item(&self, item: DelayedTrackingItem) -> Result<ItemOutcome> {
        let Some(mut track) = self.tracks.get_one(item.track_id).await? else {
            debug!(target: "application", track_id = %item.track_id, "track is gone, dropping delayed update");
            self.store.remove(item.track_id).await?;
            return Ok(ItemOutcome::Discarded);
        };
        track.last_chapter_read = item.last_chapter_read;

        let outcome = match self.trackers.get(track.tracker_id) {
            Some(tracker) if tracker.is_logged_in() => {
                debug!(
                    target: "application",
                    track_id = %track.id,
                    last_chapter_read = track.last_chapter_read,
                    tracker = tracker.name(),
                    "updating delayed track item"
                );
                let remote = tracker.update(&track, true).await?;
                self.tracks.upsert(&remote).await?;
                ItemOutcome::Updated
            }
            _ => ItemOutcome::Discarded,
        };

        self.store.remove(track.id).await?;
        Ok(outcome)
    }
}

enum ItemOutcome {
    Updated,
    Discarded,
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use yomu_domain::TrackId;

    #[derive(Default)]
    pub struct FakeTracks {
        pub tracks: Mutex<HashMap<TrackId, Track>>,
    }

    impl FakeTracks {
        pub fn with(tracks: Vec<Track>) -> Self {
            Self {
                tracks: Mutex::new(tracks.into_iter().map(|t| (t.id, t)).collect()),
            }
        }
    }

    #[async_trait::async_trait]
    impl TrackRepository for FakeTracks {
        async fn get_one(&self, id: TrackId) -> Result<Option<Track>> {
            Ok(self.tracks.lock().unwrap().get(&id).cloned())
        }

        async fn upsert(&self, track: &Track) -> Result<()> {
            self.tracks.lock().unwrap().insert(track.id, track.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeStore {
        pub items: Mutex<Vec<DelayedTrackingItem>>,
    }

    impl FakeStore {
        pub fn with(items: &[(i64, f64)]) -> Self {
            Self {
                items: Mutex::new(
                    items
                        .iter()
                        .map(|&(id, chapter)| DelayedTrackingItem {
                            track_id: TrackId(id),
                            last_chapter_read: chapter,
                        })
                        .collect(),
                ),
            }
        }

        pub fn ids(&self) -> Vec<i64> {
            self.items.lock().unwrap().iter().map(|i| i.track_id.0).collect()
        }
    }

    #[async_trait::async_trait]
    impl DelayedTrackingStore for FakeStore {
        async fn add(&self, track_id: TrackId, last_chapter_read: f64) -> Result<()> {
            self.items.lock().unwrap().push(DelayedTrackingItem {
                track_id,
                last_chapter_read,
            });
            Ok(())
        }

        async fn remove(&self, track_id: TrackId) -> Result<()> {
            self.items.lock().unwrap().retain(|i| i.track_id != track_id);
            Ok(())
        }

        async fn items(&self) -> Result<Vec<DelayedTrackingItem>> {
            Ok(self.items.lock().unwrap().clone())
        }
    }

    pub struct FakeTracker {
        pub id: TrackerId,
        pub logged_in: bool,
        pub failing: AtomicBool,
        pub calls: AtomicUsize,
    }

    impl FakeTracker {
        pub fn new(id: i64, logged_in: bool) -> Self {
            Self {
                id: TrackerId(id),
                logged_in,
                failing: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl Tracker for FakeTracker {
        fn id(&self) -> TrackerId {
            self.id
        }

        fn name(&self) -> &str {
            "fake"
        }

        fn is_logged_in(&self) -> bool {
            self.logged_in
        }

        async fn update(&self, track: &Track, _did_read_chapter: bool) -> Result<Track, TrackerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(TrackerError::Request("503 Service Unavailable".to_string()));
            }
            let mut remote = track.clone();
            remote.status = 1;
            Ok(remote)
        }
    }
}
