// SPDX-License-Identifier: GPL-3.0-or-later

//! Incognito state for a source.
//!
//! A source is incognito when global incognito mode is on, or when the
//! extension providing it is in the per-extension incognito list.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, warn};
use yomu_domain::SourceId;

use crate::preferences::LibraryPreferences;

/// Lookup from source to the package name of the extension that provides it.
pub trait ExtensionRegistry: Send + Sync {
    fn package_for(&self, source: SourceId) -> Option<String>;

    /// Receiver following the package of `source`, including later installs
    /// and removals.
    fn watch_package(&self, source: SourceId) -> watch::Receiver<Option<String>>;
}

/// Extension registry kept in memory, fed by whoever installs extensions.
#[derive(Default)]
pub struct InMemoryExtensionRegistry {
    sources: Mutex<HashMap<SourceId, watch::Sender<Option<String>>>>,
}

impl InMemoryExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, source: SourceId, package: impl Into<String>) {
        self.set(source, Some(package.into()));
    }

    pub fn uninstall(&self, source: SourceId) {
        self.set(source, None);
    }

    fn set(&self, source: SourceId, package: Option<String>) {
        let mut sources = self.sources.lock().unwrap_or_else(|poisoned| {
            warn!(target: "application", "extension registry mutex poisoned, recovering");
            poisoned.into_inner()
        });
        sources
            .entry(source)
            .or_insert_with(|| watch::channel(None).0)
            .send_if_modified(|current| {
                if *current == package {
                    return false;
                }
                *current = package;
                true
            });
        prune(&mut sources);
    }
}

/// Drop channels for sources that are neither installed nor watched.
fn prune(sources: &mut HashMap<SourceId, watch::Sender<Option<String>>>) {
    sources.retain(|_, tx| tx.borrow().is_some() || tx.receiver_count() > 0);
}

impl ExtensionRegistry for InMemoryExtensionRegistry {
    fn package_for(&self, source: SourceId) -> Option<String> {
        let sources = self.sources.lock().unwrap_or_else(|p| p.into_inner());
        sources.get(&source).and_then(|tx| tx.borrow().clone())
    }

    fn watch_package(&self, source: SourceId) -> watch::Receiver<Option<String>> {
        let mut sources = self.sources.lock().unwrap_or_else(|p| p.into_inner());
        prune(&mut sources);
        sources
            .entry(source)
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }
}

pub struct GetIncognitoState {
    preferences: LibraryPreferences,
    extensions: Arc<dyn ExtensionRegistry>,
}

impl GetIncognitoState {
    pub fn new(preferences: LibraryPreferences, extensions: Arc<dyn ExtensionRegistry>) -> Self {
        Self {
            preferences,
            extensions,
        }
    }

    pub fn get(&self, source: Option<SourceId>) -> bool {
        if self.preferences.incognito_mode.get() {
            return true;
        }
        let Some(source) = source else {
            return false;
        };
        let Some(package) = self.extensions.package_for(source) else {
            return false;
        };
        self.preferences.incognito_extensions.get().contains(&package)
    }

    /// Follow the incognito state of `source`. The receiver only wakes when the
    /// derived value flips.
    ///
    /// Must be called inside a Tokio runtime; the combining task stops once the
    /// returned receiver is dropped.
    pub fn subscribe(&self, source: Option<SourceId>) -> watch::Receiver<bool> {
        let Some(source) = source else {
            return self.preferences.incognito_mode.changes();
        };

        let mut mode = self.preferences.incognito_mode.changes();
        let mut listed = self.preferences.incognito_extensions.changes();
        let mut package = self.extensions.watch_package(source);

        let derive = |mode: &watch::Receiver<bool>,
                      listed: &watch::Receiver<BTreeSet<String>>,
                      package: &watch::Receiver<Option<String>>| {
            *mode.borrow()
                || package
                    .borrow()
                    .as_ref()
                    .is_some_and(|p| listed.borrow().contains(p))
        };

        let (tx, rx) = watch::channel(derive(&mode, &listed, &package));

        tokio::spawn(async move {
            loop {
                let changed = tokio::select! {
                    r = mode.changed() => r,
                    r = listed.changed() => r,
                    r = package.changed() => r,
                    _ = tx.closed() => break,
                };
                if changed.is_err() {
                    debug!(target: "application", %source, "incognito input closed");
                    break;
                }

                let value = derive(&mode, &listed, &package);
                tx.send_if_modified(|current| {
                    if *current == value {
                        return false;
                    }
                    *current = value;
                    true
                });
            }
        });

        rx
    }
}
