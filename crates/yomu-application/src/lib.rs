// SPDX-License-Identifier: GPL-3.0-or-later
use yomu_config::AppConfig;
pub mod incognito;
pub mod preferences;
pub mod reorder;
pub mod tracking;

pub use incognito::{ExtensionRegistry, GetIncognitoState, InMemoryExtensionRegistry};
pub use preferences::{LibraryPreferences, Preference};
pub use reorder::{ReorderCategory, ReorderResult};
pub use tracking::{DelayedTrackingSync, SyncReport, Tracker, TrackerError, TrackerManager};

use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub preferences: LibraryPreferences,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let preferences = LibraryPreferences::from_config(&config.preferences);
        Self {
            config,
            preferences,
        }
    }

    pub fn on_start(&self) {
        info!(
            target: "application",
            incognito = self.preferences.incognito_mode.get(),
            "application state initialized"
        );
    }
}
