// SPDX-License-Identifier: GPL-3.0-or-later
//! Observable in-process preferences.
//!
//! A [`Preference`] is a single value backed by a `tokio::sync::watch` channel:
//! readers call [`Preference::get`], writers call [`Preference::set`], and
//! anything that reacts to changes holds a receiver from [`Preference::changes`].
//! Setting a preference to its current value does not notify receivers.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::watch;
use yomu_config::PreferencesConfig;

#[derive(Debug)]
pub struct Preference<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for Preference<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> Preference<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn set(&self, value: T) {
        self.tx.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Receiver that starts at the current value and wakes on every change.
    pub fn changes(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

/// Library-wide preferences, seeded from configuration.
#[derive(Debug, Clone)]
pub struct LibraryPreferences {
    pub incognito_mode: Preference<bool>,
    /// Extension packages whose sources never record history.
    pub incognito_extensions: Preference<BTreeSet<String>>,
}

impl LibraryPreferences {
    pub fn from_config(config: &PreferencesConfig) -> Self {
        Self {
            incognito_mode: Preference::new(config.incognito_mode),
            incognito_extensions: Preference::new(
                config.incognito_extensions.iter().cloned().collect(),
            ),
        }
    }
}

impl Default for LibraryPreferences {
    fn default() -> Self {
        Self::from_config(&PreferencesConfig::default())
    }
}
