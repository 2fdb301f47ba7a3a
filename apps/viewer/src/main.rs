use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    EventSlot, HttpFetcher, LoadStatus, MemoryStore, RecentEventCache, SelectionStore,
    SyncController, SyncState,
};
use shared::protocol::{Event, InterestGroup};
use storage::Storage;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, Settings};

#[derive(Parser, Debug)]
#[command(about = "Browse interest groups and their upcoming events")]
struct Args {
    /// Path to the viewer config file.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    groups_url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    /// Keep the selection in memory instead of the sqlite database.
    #[arg(long)]
    ephemeral: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every group.
    Groups,
    /// Remember a group as the current selection.
    Select { name: String },
    /// Show upcoming and past events for a group.
    Events {
        #[arg(long)]
        group: Option<String>,
    },
    /// Follow selection changes and print every state update until Ctrl-C.
    Watch,
}

enum Backend {
    Sqlite(Arc<Storage>),
    Memory(Arc<MemoryStore>),
}

impl Backend {
    async fn open(settings: &Settings, ephemeral: bool) -> Result<Self> {
        if ephemeral {
            return Ok(Self::Memory(Arc::new(MemoryStore::new())));
        }
        let storage = Storage::new(&settings.database_url).await?;
        Ok(Self::Sqlite(Arc::new(storage)))
    }

    fn selection_store(&self) -> Arc<dyn SelectionStore> {
        match self {
            Self::Sqlite(storage) => Arc::clone(storage) as _,
            Self::Memory(store) => Arc::clone(store) as _,
        }
    }

    fn recent_cache(&self) -> Arc<dyn RecentEventCache> {
        match self {
            Self::Sqlite(storage) => Arc::clone(storage) as _,
            Self::Memory(store) => Arc::clone(store) as _,
        }
    }

    async fn select(&self, name: &str) -> Result<()> {
        match self {
            Self::Sqlite(storage) => storage.set_selected_group(name).await,
            Self::Memory(store) => {
                store.set_selection(name);
                Ok(())
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref());
    if let Some(url) = args.groups_url {
        settings.groups_url = url;
    }
    if let Some(url) = args.database_url {
        settings.database_url = url;
    }

    let http = reqwest::Client::builder()
        .timeout(settings.request_timeout())
        .build()
        .context("failed to build http client")?;
    let fetcher = HttpFetcher::with_client(http, &settings.groups_url, settings.retry_policy());
    let backend = Backend::open(&settings, args.ephemeral).await?;
    let controller = SyncController::new_with_dependencies(
        Arc::new(fetcher),
        backend.selection_store(),
        backend.recent_cache(),
        Arc::new(client_core::SystemClock),
        settings.sync_options(),
    );

    match args.command {
        Command::Groups => {
            controller.load_groups().await?;
            print_groups(&controller.snapshot());
        }
        Command::Select { name } => {
            controller.load_groups().await?;
            let group = controller
                .resolve_selection(&name)
                .ok_or_else(|| anyhow!("no group named '{name}'"))?;
            backend.select(&group.name).await?;
            println!("Selected {}", group.name);
        }
        Command::Events { group } => {
            controller.load_groups().await?;
            let target = match group {
                Some(name) => controller
                    .resolve_selection(&name)
                    .ok_or_else(|| anyhow!("no group named '{name}'"))?,
                None => controller
                    .snapshot()
                    .selected_group
                    .ok_or_else(|| anyhow!("no group selected; run `viewer select <name>`"))?,
            };
            controller.load_events(&target).await?;
            print_events(&controller.snapshot());
        }
        Command::Watch => watch(&controller).await?,
    }

    Ok(())
}

async fn watch(controller: &Arc<SyncController>) -> Result<()> {
    let mut updates = controller.subscribe();
    controller.refresh().await?;
    print_events(&updates.borrow_and_update());
    controller.observe_selection();
    info!("watch: following selection changes; press Ctrl-C to stop");

    let mut current = controller.snapshot().selected_group.map(|group| group.id);
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                let selected = state.selected_group.clone();
                if selected.as_ref().map(|group| group.id) != current {
                    current = selected.as_ref().map(|group| group.id);
                    if let Some(group) = selected {
                        spawn_event_load(controller, group);
                    }
                }
                print_status(&state);
            }
            _ = tokio::signal::ctrl_c() => {
                controller.cancel_all();
                break;
            }
        }
    }
    Ok(())
}

fn spawn_event_load(controller: &Arc<SyncController>, group: InterestGroup) {
    let controller = Arc::clone(controller);
    tokio::spawn(async move {
        if let Err(err) = controller.load_events(&group).await {
            warn!(group = %group.name, error = %err, "watch: event load failed");
        }
    });
}

fn print_groups(state: &SyncState) {
    let selected = state.selected_group.as_ref().map(|group| group.name.as_str());
    for group in &state.groups {
        let marker = if Some(group.name.as_str()) == selected { "*" } else { " " };
        let locator = if group.events_locator().is_some() { "" } else { " (no events feed)" };
        println!("{marker} {}{locator}", group.name);
    }
}

fn print_status(state: &SyncState) {
    match &state.status {
        LoadStatus::Loading => println!("… loading"),
        LoadStatus::Failed(err) => println!("! {err}"),
        LoadStatus::Ready => print_events(state),
    }
}

fn print_events(state: &SyncState) {
    if let Some(group) = &state.selected_group {
        println!("== {} ==", group.name);
    }
    match &state.first_event {
        EventSlot::Event(event) => println!("Next up: {}", event.name),
        EventSlot::Empty => println!("No events scheduled"),
        EventSlot::Error => println!("Events unavailable"),
        EventSlot::Loading => {}
    }
    if state.events.iter().any(|slot| *slot == EventSlot::Error) {
        if let Some(err) = state.status.error() {
            println!("! {err}");
        }
        return;
    }
    println!("Upcoming:");
    for event in &state.upcoming_events {
        println!("  {}", describe(event));
    }
    println!("Past:");
    for event in &state.past_events {
        println!("  {}", describe(event));
    }
}

fn describe(event: &Event) -> String {
    let when = event
        .start_at
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "TBA".into());
    format!("{when}  {} @ {}", event.name, event.venue.name)
}
