// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use yomu_application::{
    AppState, DelayedTrackingSync, ExtensionRegistry, GetIncognitoState,
    InMemoryExtensionRegistry, ReorderCategory, ReorderResult, TrackerManager,
};
use yomu_config::load as load_config;
use yomu_domain::{Category, CategoryId, MediaKind, SourceId, TrackId};
use yomu_infrastructure::{
    init_database, CategoryRepository, DelayedTrackingStore, SqliteCategoryRepository,
    SqliteDelayedTrackingStore, SqliteTrackRepository,
};
use yomu_scheduler::jobs::delayed_tracking_job_id;
use yomu_scheduler::{JobOutcome, Scheduler};

#[derive(Debug, Parser)]
#[command(name = "yomu", version, about = "Manga and anime library maintenance")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage library categories
    Categories {
        #[arg(long, default_value = "manga")]
        kind: MediaKind,

        #[command(subcommand)]
        action: CategoryAction,
    },
    /// Inspect and flush parked tracker updates
    Tracking {
        #[arg(long, default_value = "manga")]
        kind: MediaKind,

        #[command(subcommand)]
        action: TrackingAction,
    },
    /// Show whether history is recorded for a source
    Incognito {
        source: Option<i64>,

        /// Extension package providing the source
        #[arg(long, requires = "source")]
        package: Option<String>,
    },
    /// Run the background scheduler until interrupted
    Daemon,
}

#[derive(Debug, Subcommand)]
enum CategoryAction {
    List,
    Add { name: String },
    Delete { id: i64 },
    MoveUp { id: i64 },
    MoveDown { id: i64 },
    Sort,
}

#[derive(Debug, Subcommand)]
enum TrackingAction {
    List,
    Queue { track_id: i64, chapter: f64 },
    Flush,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.telemetry.log_level);

    let state = AppState::new(config.clone());
    state.on_start();

    match cli.command {
        Command::Categories { kind, action } => {
            let pool = init_database(&config).await?;
            let repository: Arc<dyn CategoryRepository> =
                Arc::new(SqliteCategoryRepository::new(pool, kind));
            run_categories(repository, action).await
        }
        Command::Tracking { kind, action } => {
            let pool = init_database(&config).await?;
            let store: Arc<dyn DelayedTrackingStore> =
                Arc::new(SqliteDelayedTrackingStore::new(pool.clone(), kind));
            let sync = DelayedTrackingSync::new(
                Arc::new(SqliteTrackRepository::new(pool, kind)),
                store.clone(),
                Arc::new(trackers()),
            );
            run_tracking(Scheduler::new(config), kind, store, sync, action).await
        }
        Command::Incognito { source, package } => {
            let registry = Arc::new(InMemoryExtensionRegistry::new());
            if let (Some(source), Some(package)) = (source, package) {
                registry.install(SourceId(source), package);
            }
            let incognito = GetIncognitoState::new(
                state.preferences.clone(),
                registry as Arc<dyn ExtensionRegistry>,
            );
            println!("{}", incognito.get(source.map(SourceId)));
            Ok(())
        }
        Command::Daemon => run_daemon(config).await,
    }
}

/// Trackers compiled into this build. Parked updates for any other tracker are dropped.
fn trackers() -> TrackerManager {
    TrackerManager::new()
}

async fn run_categories(
    repository: Arc<dyn CategoryRepository>,
    action: CategoryAction,
) -> Result<()> {
    let reorder = ReorderCategory::new(repository.clone());

    let result = match action {
        CategoryAction::List => None,
        CategoryAction::Add { name } => {
            let category = add_category(repository.as_ref(), &name).await?;
            info!(target: "cli", id = %category.id, name = %category.name, "category added");
            None
        }
        CategoryAction::Delete { id } => {
            if CategoryId(id) == CategoryId::UNCATEGORIZED {
                bail!("the default category cannot be deleted");
            }
            repository.delete(CategoryId(id)).await?;
            None
        }
        CategoryAction::MoveUp { id } => {
            let category = find_category(repository.as_ref(), id).await?;
            Some(reorder.move_up(&category).await)
        }
        CategoryAction::MoveDown { id } => {
            let category = find_category(repository.as_ref(), id).await?;
            Some(reorder.move_down(&category).await)
        }
        CategoryAction::Sort => Some(reorder.sort_alphabetically().await),
    };

    match result {
        Some(ReorderResult::InternalError(err)) => return Err(err.context("reorder failed")),
        Some(ReorderResult::Unchanged) => println!("unchanged"),
        Some(ReorderResult::Success) | None => {}
    }

    for category in repository.get_all().await? {
        let marker = if category.is_system_category() { "*" } else { " " };
        println!("{marker}{:>4} {:>4}  {}", category.id.0, category.order, category.name);
    }
    Ok(())
}

/// Append a category after the last user category. Ordinals may start above
/// zero after a sort that placed the system category first.
async fn add_category(repository: &dyn CategoryRepository, name: &str) -> Result<Category> {
    let order = repository
        .get_all_non_system()
        .await?
        .iter()
        .map(|c| c.order + 1)
        .max()
        .unwrap_or(0);
    repository.insert(name, order, 0).await
}

/// Unknown ids become a bare category so the reorder reports it as unchanged.
async fn find_category(repository: &dyn CategoryRepository, id: i64) -> Result<Category> {
    let id = CategoryId(id);
    let found = repository
        .get_all()
        .await?
        .into_iter()
        .find(|c| c.id == id);
    Ok(found.unwrap_or_else(|| Category::new(id, "", 0)))
}

async fn run_tracking(
    scheduler: Scheduler,
    kind: MediaKind,
    store: Arc<dyn DelayedTrackingStore>,
    sync: DelayedTrackingSync,
    action: TrackingAction,
) -> Result<()> {
    match action {
        TrackingAction::List => {}
        TrackingAction::Queue { track_id, chapter } => {
            store.add(TrackId(track_id), chapter).await?;
        }
        TrackingAction::Flush => {
            scheduler.enqueue_delayed_tracking(kind, sync).await;
            let outcome = scheduler
                .registry()
                .join(&delayed_tracking_job_id(kind))
                .await
                .context("flush was not enqueued")?;
            if outcome != JobOutcome::Succeeded {
                warn!(target: "cli", ?outcome, "delayed tracking flush did not complete");
            }
        }
    }

    for item in store.items().await? {
        println!("{:>6}  {}", item.track_id.0, item.last_chapter_read);
    }
    Ok(())
}

async fn run_daemon(config: yomu_config::AppConfig) -> Result<()> {
    let pool = init_database(&config).await?;

    let mut delayed = Vec::new();
    let trackers = Arc::new(trackers());
    for kind in [MediaKind::Manga, MediaKind::Anime] {
        let sync = DelayedTrackingSync::new(
            Arc::new(SqliteTrackRepository::new(pool.clone(), kind)),
            Arc::new(SqliteDelayedTrackingStore::new(pool.clone(), kind)),
            trackers.clone(),
        );
        delayed.push((kind, sync));
    }

    let scheduler = Scheduler::new(config);
    scheduler.register_jobs(delayed).await;
    let _scheduler_handle = scheduler.start();

    info!(target: "cli", "scheduler running");
    shutdown_signal().await;
    Ok(())
}

fn init_tracing(default_level: &str) {
    let fmt_layer = fmt::layer().with_target(true).with_thread_names(true).with_level(true);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut interrupt), Ok(mut terminate)) => {
                tokio::select! {
                    _ = interrupt.recv() => {},
                    _ = terminate.recv() => {},
                }
            }
            _ => {
                warn!(target: "cli", "could not install signal handlers, falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!(target: "cli", "shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_category_move_with_kind() {
        let cli = Cli::try_parse_from(["yomu", "categories", "--kind", "anime", "move-up", "3"])
            .expect("parse");
        match cli.command {
            Command::Categories {
                kind,
                action: CategoryAction::MoveUp { id },
            } => {
                assert_eq!(kind, MediaKind::Anime);
                assert_eq!(id, 3);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn kind_defaults_to_manga() {
        let cli = Cli::try_parse_from(["yomu", "--config", "yomu.toml", "categories", "sort"])
            .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("yomu.toml")));
        assert!(matches!(
            cli.command,
            Command::Categories {
                kind: MediaKind::Manga,
                action: CategoryAction::Sort
            }
        ));
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["yomu", "categories", "--kind", "novel", "list"]).is_err());
    }

    #[test]
    fn incognito_package_requires_source() {
        assert!(Cli::try_parse_from(["yomu", "incognito", "--package", "pkg"]).is_err());
        assert!(Cli::try_parse_from(["yomu", "incognito", "12", "--package", "pkg"]).is_ok());
    }

    /// Category table kept in memory, seeded with the system category.
    struct MemCategories(std::sync::Mutex<Vec<Category>>);

    impl MemCategories {
        fn new() -> Self {
            Self(std::sync::Mutex::new(vec![Category::new(
                CategoryId::UNCATEGORIZED,
                "",
                0,
            )]))
        }
    }

    #[async_trait::async_trait]
    impl CategoryRepository for MemCategories {
        async fn get_all(&self) -> Result<Vec<Category>> {
            let mut all = self.0.lock().unwrap().clone();
            all.sort_by_key(|c| (c.order, c.id));
            Ok(all)
        }
        async fn get_all_non_system(&self) -> Result<Vec<Category>> {
            let all = self.get_all().await?;
            Ok(all.into_iter().filter(|c| !c.is_system_category()).collect())
        }
        async fn insert(&self, name: &str, order: i64, flags: i64) -> Result<Category> {
            let mut categories = self.0.lock().unwrap();
            let id = CategoryId(categories.iter().map(|c| c.id.0).max().unwrap_or(0) + 1);
            let mut category = Category::new(id, name, order);
            category.flags = flags;
            categories.push(category.clone());
            Ok(category)
        }
        async fn delete(&self, id: CategoryId) -> Result<()> {
            self.0.lock().unwrap().retain(|c| c.id != id);
            Ok(())
        }
        async fn update_partial(&self, updates: &[yomu_domain::CategoryUpdate]) -> Result<()> {
            let mut categories = self.0.lock().unwrap();
            for update in updates {
                if let Some(c) = categories.iter_mut().find(|c| c.id == update.id) {
                    if let Some(order) = update.order {
                        c.order = order;
                    }
                }
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn add_after_sort_gets_a_fresh_ordinal() {
        let repository = Arc::new(MemCategories::new());
        add_category(repository.as_ref(), "B").await.expect("add B");
        add_category(repository.as_ref(), "A").await.expect("add A");
        let reorder = ReorderCategory::new(repository.clone() as Arc<dyn CategoryRepository>);
        assert!(reorder.sort_alphabetically().await.is_success());

        add_category(repository.as_ref(), "C").await.expect("add C");

        let orders: Vec<(String, i64)> = repository
            .get_all_non_system()
            .await
            .expect("list")
            .into_iter()
            .map(|c| (c.name, c.order))
            .collect();
        assert_eq!(
            orders,
            vec![
                ("A".to_string(), 1),
                ("B".to_string(), 2),
                ("C".to_string(), 3)
            ]
        );
    }

    #[tokio::test]
    async fn first_category_starts_at_zero() {
        let repository = MemCategories::new();
        let category = add_category(&repository, "Reading").await.expect("add");
        assert_eq!(category.order, 0);
    }

    #[tokio::test]
    async fn find_category_falls_back_to_bare_id() {
        struct Empty;

        #[async_trait::async_trait]
        impl CategoryRepository for Empty {
            async fn get_all(&self) -> Result<Vec<Category>> {
                Ok(vec![Category::new(CategoryId(2), "Reading", 0)])
            }
            async fn get_all_non_system(&self) -> Result<Vec<Category>> {
                self.get_all().await
            }
            async fn insert(&self, _: &str, _: i64, _: i64) -> Result<Category> {
                unimplemented!()
            }
            async fn delete(&self, _: CategoryId) -> Result<()> {
                unimplemented!()
            }
            async fn update_partial(&self, _: &[yomu_domain::CategoryUpdate]) -> Result<()> {
                unimplemented!()
            }
        }

        let found = find_category(&Empty, 2).await.expect("find");
        assert_eq!(found.name, "Reading");
        let missing = find_category(&Empty, 9).await.expect("find");
        assert_eq!(missing.id, CategoryId(9));
    }
}
