// SPDX-License-Identifier: GPL-3.0-or-later
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Value Objects & IDs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

impl CategoryId {
    /// The reserved "uncategorized" shelf.
    pub const UNCATEGORIZED: CategoryId = CategoryId(0);
}

impl Default for CategoryId {
    fn default() -> Self {
        Self::UNCATEGORIZED
    }
}

impl std::fmt::Display for CategoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub i64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a tracking service (MyAnimeList, AniList, Shikimori, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackerId(pub i64);

impl std::fmt::Display for TrackerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a content source provided by an installed extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub i64);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Library side a category or track belongs to. Both sides keep their own ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Manga,
    Anime,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manga => write!(f, "manga"),
            Self::Anime => write!(f, "anime"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown media kind: {0}")]
pub struct UnknownMediaKind(pub String);

impl FromStr for MediaKind {
    type Err = UnknownMediaKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manga" => Ok(Self::Manga),
            "anime" => Ok(Self::Anime),
            other => Err(UnknownMediaKind(other.to_string())),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    /// Ordinal position among sibling categories.
    pub order: i64,
    /// Display flags (sort mode, display mode); opaque to this crate.
    pub flags: i64,
}

impl Category {
    pub fn new(id: CategoryId, name: impl Into<String>, order: i64) -> Self {
        Self {
            id,
            name: name.into(),
            order,
            flags: 0,
        }
    }

    /// System categories are reserved and never reordered by the user.
    pub fn is_system_category(&self) -> bool {
        self.id == CategoryId::UNCATEGORIZED
    }
}

/// Partial update of a category. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoryUpdate {
    pub id: CategoryId,
    pub name: Option<String>,
    pub order: Option<i64>,
    pub flags: Option<i64>,
}

impl CategoryUpdate {
    pub fn order(id: CategoryId, order: i64) -> Self {
        Self {
            id,
            order: Some(order),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.order.is_none() && self.flags.is_none()
    }
}

/// Link between a library entry and a remote tracking service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub media_id: i64,
    pub tracker_id: TrackerId,
    pub remote_id: i64,
    pub title: String,
    pub last_chapter_read: f64,
    pub total_chapters: i64,
    pub status: i64,
    pub score: f64,
    pub remote_url: String,
}

impl Track {
    pub fn new(id: TrackId, media_id: i64, tracker_id: TrackerId, title: impl Into<String>) -> Self {
        Self {
            id,
            media_id,
            tracker_id,
            remote_id: 0,
            title: title.into(),
            last_chapter_read: 0.0,
            total_chapters: 0,
            status: 0,
            score: 0.0,
            remote_url: String::new(),
        }
    }
}

/// A tracker progress update that could not be sent when it happened.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayedTrackingItem {
    pub track_id: TrackId,
    pub last_chapter_read: f64,
}
