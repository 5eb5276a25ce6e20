use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Extension of per-game record files in the library directory
pub const RECORD_EXTENSION: &str = "toml";

/// Stable identifier of a game in the library
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(String);

impl GameId {
    /// Fresh random identifier for a new library entry
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Identifier for records written without a token id.
    ///
    /// Derived from the storage file name, which is unique within a library
    /// directory, so it stays the same across reloads.
    pub fn legacy(library_name: &str) -> Self {
        let stem = library_name
            .strip_suffix(RECORD_EXTENSION)
            .and_then(|s| s.strip_suffix('.'))
            .unwrap_or(library_name);
        Self(format!("legacy-{}", stem))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lower-cased, space-trimmed name with inner spaces replaced by underscores
pub fn slugify(name: &str) -> String {
    name.to_lowercase().trim_matches(' ').replace(' ', "_")
}

/// Storage file name for a game name (`" My Game "` -> `my_game.toml`)
///
/// Rejects names that produce an empty slug or one that would escape the
/// library directory.
pub fn storage_file_name(name: &str) -> Result<String> {
    let stem = slugify(name);

    if stem.is_empty() {
        return Err(Error::InvalidEntry(format!(
            "name {:?} does not produce a file name",
            name
        )));
    }

    if !is_plain_file_name(&stem) {
        return Err(Error::InvalidEntry(format!(
            "name {:?} is not a valid file name",
            name
        )));
    }

    Ok(format!("{}.{}", stem, RECORD_EXTENSION))
}

/// Check that a record file name stays inside the library directory
pub fn validate_library_name(library_name: &str) -> Result<()> {
    if library_name.is_empty() || !is_plain_file_name(library_name) {
        return Err(Error::InvalidEntry(format!(
            "record file name {:?} is not a plain file name",
            library_name
        )));
    }
    Ok(())
}

fn is_plain_file_name(name: &str) -> bool {
    name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

/// Default display name for an executable: its file name up to the first dot
pub fn suggest_name(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let name = file_name.split('.').next().unwrap_or(file_name);

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// A game submitted for registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGame {
    pub name: String,
    pub path: PathBuf,
}

impl NewGame {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Both fields must be non-empty after trimming
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidEntry("game name is empty".to_string()));
        }

        if self.path.as_os_str().is_empty() || self.path.to_string_lossy().trim().is_empty() {
            return Err(Error::InvalidEntry("game path is empty".to_string()));
        }

        Ok(())
    }
}

/// A registered game, as stored in its record file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GameRecord")]
pub struct GameEntry {
    pub name: String,
    pub path: PathBuf,
    pub library_name: String,
    pub id: GameId,
}

impl GameEntry {
    /// Directory the game is started in
    pub fn working_dir(&self) -> Option<&Path> {
        self.path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
    }
}

/// On-disk shape of a record, accepting the capitalized keys and integer ids
/// written by older launcher versions.
#[derive(Deserialize)]
struct GameRecord {
    #[serde(alias = "Name")]
    name: String,
    #[serde(alias = "Path")]
    path: PathBuf,
    #[serde(default, alias = "Libary_name", alias = "libary_name")]
    library_name: String,
    #[serde(default, alias = "Id")]
    id: Option<RecordId>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordId {
    Token(String),
    // Load-order index from older versions, replaced on load
    Index(#[allow(dead_code)] i64),
}

impl TryFrom<GameRecord> for GameEntry {
    type Error = String;

    fn try_from(record: GameRecord) -> std::result::Result<Self, Self::Error> {
        let library_name = if record.library_name.is_empty() {
            storage_file_name(&record.name).map_err(|e| e.to_string())?
        } else {
            record.library_name
        };

        let id = match record.id {
            Some(RecordId::Token(token)) if !token.trim().is_empty() => GameId(token),
            _ => GameId::legacy(&library_name),
        };

        Ok(Self {
            name: record.name,
            path: record.path,
            library_name,
            id,
        })
    }
}

/// In-memory liveness record of a launched game
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunState {
    pub process_id: u32,
    pub is_running: bool,
    pub started_at: DateTime<Utc>,
}

impl RunState {
    pub fn started(process_id: u32) -> Self {
        Self {
            process_id,
            is_running: true,
            started_at: Utc::now(),
        }
    }
}

/// Run-state transition published by the supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        id: GameId,
        name: String,
        process_id: u32,
    },
    Exited {
        id: GameId,
        name: String,
        process_id: u32,
        exit_code: Option<i32>,
    },
}

impl RunEvent {
    pub fn id(&self) -> &GameId {
        match self {
            RunEvent::Started { id, .. } | RunEvent::Exited { id, .. } => id,
        }
    }
}
