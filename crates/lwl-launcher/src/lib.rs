//! LWL Launcher
//!
//! Application layer of LWL: configuration, logging, and the launcher facade
//! front ends drive.

pub mod config;
pub mod launcher;
pub mod logging;

pub use config::{Config, ConfigSource};
pub use launcher::{GameView, Launcher};
