// Integration tests for the Launcher facade

use lwl_core::{Error, RunEvent};
use lwl_launcher::{Config, Launcher};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

/// Fixture games, all written before any test spawns a process
fn fixtures() -> &'static Path {
    static FIXTURES: OnceLock<PathBuf> = OnceLock::new();

    FIXTURES.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("lwl-launcher-fixtures-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("Failed to create fixture dir");

        write_script(&dir.join("sleeper.x86_64"), "exec sleep 30");
        // Ignores SIGTERM
        write_script(&dir.join("stubborn.x86_64"), "trap '' TERM\nwhile :; do sleep 1; done");
        dir
    })
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write fixture");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .expect("Failed to make fixture executable");
}

fn sleeper() -> PathBuf {
    fixtures().join("sleeper.x86_64")
}

fn stubborn() -> PathBuf {
    fixtures().join("stubborn.x86_64")
}

fn launcher() -> (TempDir, Launcher) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::with_app_location(dir.path());
    config.ensure_directories().unwrap();

    let launcher = Launcher::from_config(&config).expect("Failed to create launcher");
    (dir, launcher)
}

#[tokio::test]
async fn test_add_game_uses_config_library() {
    let (dir, launcher) = launcher();

    let entry = launcher
        .add_game(Some("Chess".to_string()), PathBuf::from("/games/chess/chess.bin"))
        .unwrap();

    assert!(dir.path().join("libary").join("chess.toml").is_file());
    assert_eq!(launcher.library().root(), dir.path().join("libary"));
    assert_eq!(launcher.find("chess").unwrap(), Some(entry));
}

#[tokio::test]
async fn test_add_game_suggests_name() {
    let (_dir, launcher) = launcher();

    let entry = launcher
        .add_game(None, PathBuf::from("/games/doom/doom.x86_64"))
        .unwrap();
    assert_eq!(entry.name, "doom");
    assert_eq!(entry.library_name, "doom.toml");

    let err = launcher.add_game(None, PathBuf::from("/")).unwrap_err();
    assert!(matches!(err, Error::InvalidEntry(_)));
}

#[tokio::test]
async fn test_games_report_run_state() {
    let (_dir, launcher) = launcher();

    let sleeper = launcher
        .add_game(Some("Sleeper".to_string()), sleeper())
        .unwrap();
    launcher
        .add_game(Some("Idle".to_string()), PathBuf::from("/games/idle/idle.bin"))
        .unwrap();

    let state = launcher.launch(&sleeper).await.unwrap();

    let games = launcher.games().await.unwrap();
    assert_eq!(games.len(), 2);

    let running: Vec<_> = games.iter().filter(|g| g.is_running()).collect();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].entry.id, sleeper.id);
    assert_eq!(
        running[0].run_state.as_ref().map(|s| s.process_id),
        Some(state.process_id)
    );

    let json = serde_json::to_string(&games).unwrap();
    assert!(json.contains("\"name\":\"Sleeper\""));
    assert!(json.contains("\"run_state\":null"));

    let mut events = launcher.subscribe();
    launcher.stop(&sleeper).await;

    let exited = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("Timed out waiting for exit")
        .unwrap();
    assert!(matches!(exited, RunEvent::Exited { .. }));
    assert!(launcher.games().await.unwrap().iter().all(|g| !g.is_running()));
}

#[tokio::test]
async fn test_remove_running_game() {
    let (_dir, launcher) = launcher();

    let sleeper = launcher
        .add_game(Some("Sleeper".to_string()), sleeper())
        .unwrap();
    let state = launcher.launch(&sleeper).await.unwrap();

    launcher.remove_game(&sleeper).await.unwrap();

    assert!(launcher.games().await.unwrap().is_empty());
    assert!(!launcher.supervisor().is_running(&sleeper.id).await);

    // Removing again reports the missing record
    let err = launcher.remove_game(&sleeper).await.unwrap_err();
    assert!(err.is_not_found());

    lwl_core::ProcessExecutor::kill_process(state.process_id).unwrap();
    launcher.shutdown().await;
}

#[tokio::test]
async fn test_scan_games_reports_skipped_records() {
    let (dir, launcher) = launcher();

    launcher
        .add_game(Some("Chess".to_string()), PathBuf::from("/games/chess/chess.bin"))
        .unwrap();
    fs::write(dir.path().join("libary").join("junk.toml"), "not = [valid").unwrap();

    let (games, skipped) = launcher.scan_games().await.unwrap();
    assert_eq!(games.len(), 1);
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0].path.ends_with("junk.toml"));
}

#[tokio::test]
async fn test_kill_game_that_ignores_stop() {
    let (_dir, launcher) = launcher();

    let stubborn = launcher
        .add_game(Some("Stubborn".to_string()), stubborn())
        .unwrap();
    let mut events = launcher.subscribe();

    launcher.launch(&stubborn).await.unwrap();
    // Give the script time to install its SIGTERM trap
    tokio::time::sleep(Duration::from_millis(300)).await;

    launcher.stop(&stubborn).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(launcher.supervisor().is_running(&stubborn.id).await);

    launcher.kill(&stubborn).await;

    let exited = timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(event @ RunEvent::Exited { .. }) = events.recv().await {
                return event;
            }
        }
    })
    .await
    .expect("Timed out waiting for exit");

    assert!(matches!(exited, RunEvent::Exited { exit_code: None, .. }));
    assert!(!launcher.supervisor().is_running(&stubborn.id).await);
}
