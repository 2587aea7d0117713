// In-process registry of running bots

use crate::core::bot::{BotControl, BotStatus, SharedState};
use crate::error::{BotError, BotResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

/// What the registry keeps per running bot: its control flags, a view of its
/// state, and the worker task driving it.
pub struct BotHandle {
    pub control: Arc<BotControl>,
    pub state: SharedState,
    pub task: JoinHandle<BotResult<()>>,
}

/// Tracks running bots by name. One name, one bot: starting a second bot
/// under a running name is rejected.
#[derive(Default)]
pub struct BotRegistry {
    bots: Mutex<HashMap<String, BotHandle>>,
}

impl BotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: &str,
        control: Arc<BotControl>,
        state: SharedState,
        task: JoinHandle<BotResult<()>>,
    ) -> BotResult<()> {
        let mut bots = self.bots.lock().unwrap();
        if bots.contains_key(name) {
            return Err(BotError::AlreadyRunning(name.to_string()));
        }
        info!("📋 Registered bot '{}'", name);
        bots.insert(
            name.to_string(),
            BotHandle {
                control,
                state,
                task,
            },
        );
        Ok(())
    }

    /// Requests a stop, waits for the worker to finish its final cycle, and
    /// removes the bot. Returns the worker's outcome.
    pub async fn stop(&self, name: &str) -> BotResult<()> {
        let handle = self
            .bots
            .lock()
            .unwrap()
            .remove(name)
            .ok_or_else(|| BotError::UnknownBot(name.to_string()))?;
        handle.control.stop();
        match handle.task.await {
            Ok(outcome) => outcome,
            Err(err) => Err(BotError::Internal(format!(
                "bot '{}' worker aborted: {}",
                name, err
            ))),
        }
    }

    /// Keeps the worker alive but skips trading cycles until resumed.
    pub fn pause(&self, name: &str) -> BotResult<()> {
        self.with_handle(name, |handle| handle.control.pause())
    }

    pub fn resume(&self, name: &str) -> BotResult<()> {
        self.with_handle(name, |handle| handle.control.resume())
    }

    pub fn status(&self, name: &str) -> BotResult<BotStatus> {
        self.with_handle(name, |handle| handle.state.lock().unwrap().status())
    }

    pub fn runtime_secs(&self, name: &str) -> BotResult<f64> {
        self.with_handle(name, |handle| handle.state.lock().unwrap().runtime_secs())
    }

    pub fn realized_gain(&self, name: &str) -> BotResult<f64> {
        self.with_handle(name, |handle| handle.state.lock().unwrap().realized_gain)
    }

    pub fn unrealized_gain(&self, name: &str) -> BotResult<f64> {
        self.with_handle(name, |handle| handle.state.lock().unwrap().unrealized_gain)
    }

    pub fn list(&self) -> Vec<BotStatus> {
        let bots = self.bots.lock().unwrap();
        let mut statuses: Vec<BotStatus> = bots
            .values()
            .map(|handle| handle.state.lock().unwrap().status())
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.bots.lock().unwrap().contains_key(name)
    }

    fn with_handle<T>(&self, name: &str, f: impl FnOnce(&BotHandle) -> T) -> BotResult<T> {
        let bots = self.bots.lock().unwrap();
        let handle = bots
            .get(name)
            .ok_or_else(|| BotError::UnknownBot(name.to_string()))?;
        Ok(f(handle))
    }
}
