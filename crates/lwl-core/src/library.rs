//! Game library storage
//!
//! One TOML record per game in a single directory. The record's file name is
//! derived from the game name (see [`storage_file_name`]), so registering two
//! games whose names slug to the same file replaces the first one.

use crate::types::{storage_file_name, validate_library_name, GameEntry, GameId, NewGame};
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A record file that could not be loaded
#[derive(Debug)]
pub struct SkippedRecord {
    pub path: PathBuf,
    pub error: Error,
}

/// Result of walking the library directory
#[derive(Debug, Default)]
pub struct LibraryListing {
    /// Loaded entries ordered by storage file name
    pub entries: Vec<GameEntry>,
    pub skipped: Vec<SkippedRecord>,
}

/// Directory-backed game library
#[derive(Debug, Clone)]
pub struct LibraryStorage {
    root: PathBuf,
}

impl LibraryStorage {
    /// Open the library at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!("Game library at: {:?}", root);
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of an entry's record file
    ///
    /// Fails with `InvalidEntry` if the entry's file name would leave the
    /// library directory.
    pub fn record_path(&self, entry: &GameEntry) -> Result<PathBuf> {
        validate_library_name(&entry.library_name)?;
        Ok(self.root.join(&entry.library_name))
    }

    /// Register a game and write its record
    ///
    /// An existing record with the same storage file name is overwritten.
    pub fn create(&self, game: NewGame) -> Result<GameEntry> {
        game.validate()?;

        let library_name = storage_file_name(&game.name)?;
        let entry = GameEntry {
            name: game.name,
            path: game.path,
            library_name,
            id: GameId::generate(),
        };

        self.write(&entry)?;
        Ok(entry)
    }

    /// Write (or rewrite) an entry's record file
    pub fn write(&self, entry: &GameEntry) -> Result<()> {
        let path = self.record_path(entry)?;

        if path.exists() {
            warn!(
                "Record {:?} already exists, replacing it with game \"{}\"",
                path, entry.name
            );
        }

        let content = toml::to_string_pretty(entry)?;
        fs::write(&path, content)?;

        info!(
            "Game \"{}\" saved to: {:?} (id: {})",
            entry.name, path, entry.id
        );
        Ok(())
    }

    /// All loadable entries; unreadable records are logged and skipped
    pub fn list(&self) -> Result<Vec<GameEntry>> {
        Ok(self.scan()?.entries)
    }

    /// Walk the library directory, keeping track of records that failed to load
    pub fn scan(&self) -> Result<LibraryListing> {
        let mut listing = LibraryListing::default();

        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();

            if !dir_entry.file_type()?.is_file() {
                debug!("Skipping non-file library item: {:?}", path);
                continue;
            }

            match Self::read_record(&path) {
                Ok(entry) => {
                    debug!("Found game: \"{}\", file: {:?}", entry.name, path);
                    listing.entries.push(entry);
                }
                Err(error) => {
                    warn!("Skipping unreadable game record {:?}: {}", path, error);
                    listing.skipped.push(SkippedRecord { path, error });
                }
            }
        }

        listing
            .entries
            .sort_by(|a, b| a.library_name.cmp(&b.library_name));

        Ok(listing)
    }

    /// Load one record; its storage file name is the file it was read from,
    /// whatever the record itself claims
    fn read_record(path: &Path) -> Result<GameEntry> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::InvalidEntry(format!("record file name {:?} is not valid UTF-8", path))
            })?
            .to_string();

        let content = fs::read_to_string(path)?;
        let mut entry: GameEntry = toml::from_str(&content)?;

        if entry.library_name != file_name {
            warn!(
                "Record {:?} names its file {:?}, using the actual file name",
                path, entry.library_name
            );

            if entry.id == GameId::legacy(&entry.library_name) {
                entry.id = GameId::legacy(&file_name);
            }
            entry.library_name = file_name;
        }

        Ok(entry)
    }

    /// Look up an entry by id
    pub fn get(&self, id: &GameId) -> Result<Option<GameEntry>> {
        Ok(self.list()?.into_iter().find(|entry| &entry.id == id))
    }

    /// Look up an entry by id, name (case-insensitive) or storage file name
    pub fn find(&self, query: &str) -> Result<Option<GameEntry>> {
        let entries = self.list()?;

        let found = entries
            .iter()
            .find(|entry| entry.id.as_str() == query)
            .or_else(|| {
                let query = query.to_lowercase();
                entries
                    .iter()
                    .find(|entry| entry.name.to_lowercase() == query)
            })
            .or_else(|| {
                entries
                    .iter()
                    .find(|entry| entry.library_name == query)
            })
            .cloned();

        Ok(found)
    }

    /// Remove an entry's record file
    ///
    /// Fails with an IO `NotFound` error if the record is already gone.
    pub fn delete(&self, entry: &GameEntry) -> Result<()> {
        let path = self.record_path(entry)?;
        fs::remove_file(&path)?;
        info!("Game: {:?} deleted", path);
        Ok(())
    }
}
