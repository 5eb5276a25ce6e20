//! Launcher facade
//!
//! Ties the game library and the process supervisor together behind the
//! operations a front end needs: list games with their run state, register
//! and remove games, start and stop them, and follow run-state changes.

use crate::config::Config;
use lwl_core::{
    suggest_name, Error, GameEntry, LibraryStorage, NewGame, ProcessSupervisor, Result,
    RunEvent, RunState, SkippedRecord,
};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// A library entry together with its current run state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameView {
    #[serde(flatten)]
    pub entry: GameEntry,
    pub run_state: Option<RunState>,
}

impl GameView {
    pub fn is_running(&self) -> bool {
        self.run_state.as_ref().map_or(false, |state| state.is_running)
    }
}

pub struct Launcher {
    library: LibraryStorage,
    supervisor: ProcessSupervisor,
}

impl Launcher {
    pub fn new(library: LibraryStorage, supervisor: ProcessSupervisor) -> Self {
        Self {
            library,
            supervisor,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let library = LibraryStorage::open(&config.game_library_location)?;
        let supervisor = ProcessSupervisor::with_poll_interval(config.poll_interval());
        Ok(Self::new(library, supervisor))
    }

    pub fn library(&self) -> &LibraryStorage {
        &self.library
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Every loadable game with its run state
    pub async fn games(&self) -> Result<Vec<GameView>> {
        Ok(self.scan_games().await?.0)
    }

    /// Games with their run state, plus the records that failed to load
    pub async fn scan_games(&self) -> Result<(Vec<GameView>, Vec<SkippedRecord>)> {
        let listing = self.library.scan()?;
        let running = self.supervisor.running().await;

        let games = listing
            .entries
            .into_iter()
            .map(|entry| {
                let run_state = running.get(&entry.id).cloned();
                GameView { entry, run_state }
            })
            .collect();

        Ok((games, listing.skipped))
    }

    /// Register a game; without a name, one is derived from the executable
    pub fn add_game(&self, name: Option<String>, path: PathBuf) -> Result<GameEntry> {
        let name = match name.filter(|n| !n.trim().is_empty()) {
            Some(name) => name,
            None => suggest_name(&path).ok_or_else(|| {
                Error::InvalidEntry(format!("cannot derive a game name from {:?}", path))
            })?,
        };

        if !path.is_file() {
            warn!("Executable {:?} for game \"{}\" does not exist yet", path, name);
        }

        self.library.create(NewGame::new(name, path))
    }

    /// Delete a game's record and stop tracking it
    ///
    /// A running game keeps running.
    pub async fn remove_game(&self, entry: &GameEntry) -> Result<()> {
        self.library.delete(entry)?;

        if self.supervisor.forget(&entry.id).await.is_some() {
            info!(
                "Game \"{}\" was removed while running, it is no longer tracked",
                entry.name
            );
        }

        Ok(())
    }

    pub fn find(&self, query: &str) -> Result<Option<GameEntry>> {
        self.library.find(query)
    }

    pub async fn launch(&self, entry: &GameEntry) -> Result<RunState> {
        self.supervisor.launch(entry).await
    }

    pub async fn stop(&self, entry: &GameEntry) {
        self.supervisor.stop(entry).await
    }

    /// Force-stop a game that ignored `stop`
    pub async fn kill(&self, entry: &GameEntry) {
        self.supervisor.kill(entry).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.supervisor.subscribe()
    }

    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await
    }
}
