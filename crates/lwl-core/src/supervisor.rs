//! Process supervision for launched games
//!
//! Each launched game gets one watch task. The task owns the child handle,
//! reaps it when it exits and, in the same loop, probes the process id with a
//! no-op signal every poll interval. Whichever notices the exit first ends the
//! loop; the task then drops the game's [`RunState`] and publishes a single
//! [`RunEvent::Exited`].

use crate::executor::ProcessExecutor;
use crate::types::{GameEntry, GameId, RunEvent, RunState};
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, RwLock};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Liveness probe interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Shared map of running games
///
/// `launch` is the only inserter and the watch task the only remover of a
/// given run, so readers always see a consistent snapshot.
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    inner: Arc<RwLock<HashMap<GameId, RunState>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &GameId) -> Option<RunState> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &GameId) -> bool {
        self.inner.read().await.contains_key(id)
    }

    pub async fn snapshot(&self) -> HashMap<GameId, RunState> {
        self.inner.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Remove the entry only if it still belongs to `process_id`
    async fn remove_run(&self, id: &GameId, process_id: u32) -> Option<RunState> {
        let mut runs = self.inner.write().await;
        match runs.get(id) {
            Some(state) if state.process_id == process_id => runs.remove(id),
            _ => None,
        }
    }

    async fn remove(&self, id: &GameId) -> Option<RunState> {
        self.inner.write().await.remove(id)
    }

    async fn clear(&self) -> usize {
        let mut runs = self.inner.write().await;
        let dropped = runs.len();
        runs.clear();
        dropped
    }
}

/// Launches games and tracks their processes
pub struct ProcessSupervisor {
    registry: RunRegistry,
    poll_interval: Duration,
    events: broadcast::Sender<RunEvent>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            registry: RunRegistry::new(),
            poll_interval,
            events,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Receive every run-state transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub async fn run_state(&self, id: &GameId) -> Option<RunState> {
        self.registry.get(id).await
    }

    pub async fn is_running(&self, id: &GameId) -> bool {
        self.registry.contains(id).await
    }

    pub async fn running(&self) -> HashMap<GameId, RunState> {
        self.registry.snapshot().await
    }

    /// Start a game's executable from its own directory
    ///
    /// Returns once the child has been spawned. Spawn failures come back as
    /// [`Error::Launch`] and leave no run state behind.
    pub async fn launch(&self, entry: &GameEntry) -> Result<RunState> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Launch {
                game: entry.name.clone(),
                message: "launcher is shutting down".to_string(),
            });
        }

        let mut runs = self.registry.inner.write().await;

        if runs.contains_key(&entry.id) {
            warn!("Game \"{}\" is already running", entry.name);
            return Err(Error::AlreadyRunning(entry.name.clone()));
        }

        let program = program_path(entry);
        let mut command = Command::new(&program);
        if let Some(dir) = program.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| {
            error!("Error while launching game: {}, {}", entry.name, e);
            Error::Launch {
                game: entry.name.clone(),
                message: e.to_string(),
            }
        })?;

        let process_id = child.id().ok_or_else(|| Error::Launch {
            game: entry.name.clone(),
            message: "process exited before its id could be read".to_string(),
        })?;

        let state = RunState::started(process_id);
        runs.insert(entry.id.clone(), state.clone());
        drop(runs);

        info!(
            "Launched game: \"{}\" exec: {:?} work dir: {:?}, PID: {}",
            entry.name,
            program,
            program.parent(),
            process_id
        );

        let _ = self.events.send(RunEvent::Started {
            id: entry.id.clone(),
            name: entry.name.clone(),
            process_id,
        });

        let watch = WatchTask {
            id: entry.id.clone(),
            name: entry.name.clone(),
            process_id,
            registry: self.registry.clone(),
            events: self.events.clone(),
            poll_interval: self.poll_interval,
            shutdown: self.shutdown.child_token(),
        };
        self.tasks.spawn(watch.run(child));

        Ok(state)
    }

    /// Ask the game's process to exit (SIGTERM)
    ///
    /// `process_id` 0 means the game is not tracked as running. Errors are
    /// logged, never returned; the watch task observes the actual exit.
    pub fn terminate(&self, entry: &GameEntry, process_id: u32) {
        if process_id == 0 {
            warn!("Couldn't find process for game: \"{}\"", entry.name);
            return;
        }

        match ProcessExecutor::terminate_process(process_id) {
            Ok(()) => info!("Terminated game: \"{}\", PID: {}", entry.name, process_id),
            Err(e) => error!(
                "Failed to terminate game \"{}\" PID: {}: {}",
                entry.name, process_id, e
            ),
        }
    }

    /// Terminate the game using its tracked process id
    pub async fn stop(&self, entry: &GameEntry) {
        let process_id = self.tracked_pid(&entry.id).await;
        self.terminate(entry, process_id);
    }

    /// SIGKILL the game's tracked process, for games that ignore SIGTERM
    pub async fn kill(&self, entry: &GameEntry) {
        let process_id = self.tracked_pid(&entry.id).await;

        if process_id == 0 {
            warn!("Couldn't find process for game: \"{}\"", entry.name);
            return;
        }

        match ProcessExecutor::kill_process(process_id) {
            Ok(()) => info!("Killed game: \"{}\", PID: {}", entry.name, process_id),
            Err(e) => error!(
                "Failed to kill game \"{}\" PID: {}: {}",
                entry.name, process_id, e
            ),
        }
    }

    async fn tracked_pid(&self, id: &GameId) -> u32 {
        self.registry
            .get(id)
            .await
            .map(|state| state.process_id)
            .unwrap_or(0)
    }

    /// Drop a game's run state without touching its process
    ///
    /// The watch task keeps reaping the child; the game is no longer reported
    /// as running.
    pub async fn forget(&self, id: &GameId) -> Option<RunState> {
        let removed = self.registry.remove(id).await;
        if let Some(state) = &removed {
            debug!("Forgot run state of {} (PID: {})", id, state.process_id);
        }
        removed
    }

    /// Stop all watch tasks and wait for them to finish
    ///
    /// Running games are left alone and become untracked: their run state is
    /// dropped along with the tasks.
    pub async fn shutdown(&self) {
        info!("Shutting down process supervisor");
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;

        let dropped = self.registry.clear().await;
        if dropped > 0 {
            info!("{} running game(s) are no longer tracked", dropped);
        }
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// Relative paths are resolved against the launcher's directory, not the game's
fn program_path(entry: &GameEntry) -> PathBuf {
    if entry.path.is_relative() && entry.working_dir().is_some() {
        if let Ok(cwd) = std::env::current_dir() {
            return cwd.join(&entry.path);
        }
    }
    entry.path.clone()
}

struct WatchTask {
    id: GameId,
    name: String,
    process_id: u32,
    registry: RunRegistry,
    events: broadcast::Sender<RunEvent>,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

enum WatchOutcome {
    Exited(Option<i32>),
    Cancelled,
}

impl WatchTask {
    async fn run(self, mut child: Child) {
        info!(
            "Watching game process: \"{}\" with PID: {}",
            self.name, self.process_id
        );

        let exit_code = match self.watch(&mut child, true).await {
            WatchOutcome::Exited(code) => code,
            WatchOutcome::Cancelled => {
                info!(
                    "Stopped watching game: \"{}\" PID: {}, it is no longer tracked",
                    self.name, self.process_id
                );
                return;
            }
        };

        if self.registry.remove_run(&self.id, self.process_id).await.is_none() {
            debug!("Run state of \"{}\" was already dropped", self.name);
        }

        info!(
            "Game process: \"{}\" ended, PID: {}, exit code: {:?}",
            self.name, self.process_id, exit_code
        );

        let _ = self.events.send(RunEvent::Exited {
            id: self.id,
            name: self.name,
            process_id: self.process_id,
            exit_code,
        });
    }

    /// Wait for the child to end, either by reaping it or, once reaping has
    /// failed, by polling its pid
    async fn watch(&self, child: &mut Child, mut reaping: bool) -> WatchOutcome {
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                status = child.wait(), if reaping => match status {
                    Ok(status) => return WatchOutcome::Exited(status.code()),
                    Err(e) => {
                        warn!(
                            "Wait for game \"{}\" PID: {} failed: {}, falling back to polling",
                            self.name, self.process_id, e
                        );
                        reaping = false;
                    }
                },
                _ = ticker.tick() => match ProcessExecutor::process_exists(self.process_id) {
                    // An exited but unreaped child still passes the liveness check
                    Ok(true) if !reaping => {
                        if let Ok(Some(status)) = child.try_wait() {
                            return WatchOutcome::Exited(status.code());
                        }
                    }
                    Ok(true) => {}
                    Ok(false) => {
                        debug!("PID {} no longer answers the liveness probe", self.process_id);
                        let code = child.try_wait().ok().flatten().and_then(|s| s.code());
                        return WatchOutcome::Exited(code);
                    }
                    Err(e) => warn!("Couldn't check if game \"{}\" is alive: {}", self.name, e),
                },
                _ = self.shutdown.cancelled() => return WatchOutcome::Cancelled,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_remove_run_checks_pid() {
        let registry = RunRegistry::new();
        let id = GameId::from("chess");

        registry
            .inner
            .write()
            .await
            .insert(id.clone(), RunState::started(100));

        assert!(registry.remove_run(&id, 200).await.is_none());
        assert!(registry.contains(&id).await);

        let removed = registry.remove_run(&id, 100).await;
        assert_eq!(removed.map(|s| s.process_id), Some(100));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_registry_snapshot_is_detached() {
        let registry = RunRegistry::new();
        let id = GameId::from("chess");
        registry
            .inner
            .write()
            .await
            .insert(id.clone(), RunState::started(7));

        let snapshot = registry.snapshot().await;
        registry.remove(&id).await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_registry_clear() {
        let registry = RunRegistry::new();
        for (name, pid) in [("chess", 1), ("go", 2)] {
            registry
                .inner
                .write()
                .await
                .insert(GameId::from(name), RunState::started(pid));
        }

        assert_eq!(registry.clear().await, 2);
        assert!(registry.is_empty().await);
    }

    fn watch_task(process_id: u32) -> WatchTask {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        WatchTask {
            id: GameId::from("quick"),
            name: "Quick".to_string(),
            process_id,
            registry: RunRegistry::new(),
            events,
            poll_interval: Duration::from_millis(20),
            shutdown: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_polling_reaps_exited_child() {
        let mut child = Command::new("sh")
            .args(["-c", "exit 4"])
            .spawn()
            .expect("Failed to spawn sh");
        let task = watch_task(child.id().expect("Child has no pid"));

        // Without reaping, the exited child lingers as a zombie that still
        // passes the liveness check
        let outcome = time::timeout(Duration::from_secs(5), task.watch(&mut child, false))
            .await
            .expect("Watch loop never saw the exit");

        assert!(matches!(outcome, WatchOutcome::Exited(Some(4))));
    }

    #[tokio::test]
    async fn test_watch_stops_on_cancel() {
        let mut child = Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("Failed to spawn sleep");
        let task = watch_task(child.id().expect("Child has no pid"));

        task.shutdown.cancel();
        let outcome = task.watch(&mut child, true).await;
        assert!(matches!(outcome, WatchOutcome::Cancelled));

        child.kill().await.expect("Failed to kill sleep");
    }

    #[test]
    fn test_default_poll_interval() {
        let supervisor = ProcessSupervisor::new();
        assert_eq!(supervisor.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_terminate_zero_pid_is_noop() {
        let supervisor = ProcessSupervisor::new();
        let entry = GameEntry {
            name: "Chess".to_string(),
            path: PathBuf::from("/games/chess/chess.bin"),
            library_name: "chess.toml".to_string(),
            id: GameId::from("chess"),
        };

        supervisor.terminate(&entry, 0);
    }

    #[test]
    fn test_program_path_keeps_absolute() {
        let entry = GameEntry {
            name: "Chess".to_string(),
            path: PathBuf::from("/games/chess/chess.bin"),
            library_name: "chess.toml".to_string(),
            id: GameId::from("chess"),
        };
        assert_eq!(program_path(&entry), PathBuf::from("/games/chess/chess.bin"));

        let relative = GameEntry {
            path: PathBuf::from("games/chess.bin"),
            ..entry
        };
        assert!(program_path(&relative).is_absolute());
    }
}
