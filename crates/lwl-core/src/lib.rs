//! LWL Core Library
//!
//! Core library for LWL - a launcher for locally installed games.
//! Provides the on-disk game library and supervision of launched game processes.

pub mod error;
pub mod executor;
pub mod library;
pub mod supervisor;
pub mod types;

pub use error::{Error, Result};
pub use executor::ProcessExecutor;
pub use library::{LibraryListing, LibraryStorage, SkippedRecord};
pub use supervisor::{ProcessSupervisor, RunRegistry, DEFAULT_POLL_INTERVAL};
pub use types::{
    slugify, storage_file_name, suggest_name, validate_library_name, GameEntry, GameId, NewGame,
    RunEvent, RunState,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
