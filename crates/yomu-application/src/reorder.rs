// SPDX-License-Identifier: GPL-3.0-or-later

//! Category reordering.
//!
//! [`ReorderCategory`] moves a category one slot up or down, or sorts the whole
//! shelf by name, and writes the resulting ordinals back through the
//! [`CategoryRepository`]. One instance serializes all of its operations behind
//! a single async mutex, so two callers can never interleave the read and the
//! write of the same ordering.
//!
//! Each operation runs on its own task. Dropping the returned future does not
//! abort the work: the reorder still completes and is persisted.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::Mutex;
use tracing::{debug, error};
use yomu_domain::{Category, CategoryId, CategoryUpdate};
use yomu_infrastructure::CategoryRepository;

/// Outcome of a reorder operation.
#[derive(Debug)]
pub enum ReorderResult {
    /// The new ordering was persisted.
    Success,
    /// The category is unknown or already at the edge; nothing was written.
    Unchanged,
    /// The repository failed; the cause is attached.
    InternalError(anyhow::Error),
}

impl ReorderResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Move(CategoryId, Direction),
    SortAlphabetically,
}

#[derive(Clone)]
pub struct ReorderCategory {
    repository: Arc<dyn CategoryRepository>,
    lock: Arc<Mutex<()>>,
}

impl ReorderCategory {
    pub fn new(repository: Arc<dyn CategoryRepository>) -> Self {
        Self {
            repository,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn move_up(&self, category: &Category) -> ReorderResult {
        self.run(Action::Move(category.id, Direction::Up)).await
    }

    pub async fn move_down(&self, category: &Category) -> ReorderResult {
        self.run(Action::Move(category.id, Direction::Down)).await
    }

    /// Sort every category, system categories included, by name.
    pub async fn sort_alphabetically(&self) -> ReorderResult {
        self.run(Action::SortAlphabetically).await
    }

    async fn run(&self, action: Action) -> ReorderResult {
        let repository = Arc::clone(&self.repository);
        let lock = Arc::clone(&self.lock);

        // The lock is taken inside the task so a caller dropped while waiting
        // for it still gets its operation applied.
        let task = tokio::spawn(async move {
            let _guard = lock.lock().await;
            match action {
                Action::Move(id, direction) => {
                    move_category(repository.as_ref(), id, direction).await
                }
                Action::SortAlphabetically => sort_by_name(repository.as_ref()).await,
            }
        });

        match task.await {
            Ok(result) => result,
            Err(err) => {
                error!(target: "application", ?action, error = %err, "reorder task did not complete");
                ReorderResult::InternalError(anyhow!("reorder task did not complete: {err}"))
            }
        }
    }
}

async fn move_category(
    repository: &dyn CategoryRepository,
    id: CategoryId,
    direction: Direction,
) -> ReorderResult {
    let mut categories = match repository.get_all_non_system().await {
        Ok(categories) => categories,
        Err(err) => {
            error!(target: "application", %id, error = %err, "failed to load categories");
            return ReorderResult::InternalError(err);
        }
    };

    let Some(current) = categories.iter().position(|c| c.id == id) else {
        debug!(target: "application", %id, "category not found, nothing to move");
        return ReorderResult::Unchanged;
    };

    let target = match direction {
        Direction::Up => current.checked_sub(1),
        Direction::Down => Some(current + 1).filter(|&i| i < categories.len()),
    };
    let Some(target) = target else {
        debug!(target: "application", %id, ?direction, "category already at the edge");
        return ReorderResult::Unchanged;
    };

    categories.swap(current, target);
    persist(repository, &categories).await
}

async fn sort_by_name(repository: &dyn CategoryRepository) -> ReorderResult {
    let mut categories = match repository.get_all().await {
        Ok(categories) => categories,
        Err(err) => {
            error!(target: "application", error = %err, "failed to load categories");
            return ReorderResult::InternalError(err);
        }
    };

    categories.sort_by(|a, b| a.name.cmp(&b.name));
    persist(repository, &categories).await
}

/// Write ordinals `0..n` following the order of `categories`.
async fn persist(repository: &dyn CategoryRepository, categories: &[Category]) -> ReorderResult {
    let updates: Vec<CategoryUpdate> = categories
        .iter()
        .enumerate()
        .map(|(index, category)| CategoryUpdate::order(category.id, index as i64))
        .collect();

    match repository.update_partial(&updates).await {
        Ok(()) => {
            debug!(target: "application", count = updates.len(), "category order persisted");
            ReorderResult::Success
        }
        Err(err) => {
            error!(target: "application", error = %err, "failed to persist category order");
            ReorderResult::InternalError(err)
        }
    }
}
