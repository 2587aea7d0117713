// JSON snapshot store for bot state

use crate::core::bot::BotState;
use crate::error::{BotError, BotResult};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persists one pretty-printed JSON file per bot, keyed by bot name.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        // bot names land in filenames; keep path separators out
        let safe: String = name
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }

    pub fn save(&self, state: &BotState) -> BotResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&state.name);
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| BotError::Persistence(e.to_string()))?;
        std::fs::write(&path, json)?;
        debug!("Saved bot state to {}", path.display());
        Ok(path)
    }

    pub fn load(&self, name: &str) -> BotResult<BotState> {
        let path = self.path_for(name);
        let json = std::fs::read_to_string(&path).map_err(|e| {
            BotError::Persistence(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&json).map_err(|e| {
            BotError::Persistence(format!("corrupt state file {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BotMode;
    use tempfile::tempdir;

    #[test]
    fn state_round_trips() {
        let dir = tempdir().unwrap();
        let store = JsonStateStore::new(dir.path());

        let mut state = BotState::new("xbt-grid", "XBTUSD", BotMode::Test);
        state.realized_gain = 12.5;
        state.open_order_txids.push("O-AAA".to_string());
        state.open_order_txids.push("O-BBB".to_string());

        store.save(&state).unwrap();
        let loaded = store.load("xbt-grid").unwrap();
        assert_eq!(loaded.name, "xbt-grid");
        assert_eq!(loaded.realized_gain, 12.5);
        assert_eq!(loaded.open_order_txids, vec!["O-AAA", "O-BBB"]);
    }

    #[test]
    fn missing_state_is_an_error() {
        let dir = tempdir().unwrap();
        let store = JsonStateStore::new(dir.path());
        assert!(!store.exists("ghost"));
        assert!(matches!(store.load("ghost"), Err(BotError::Persistence(_))));
    }

    #[test]
    fn corrupt_state_is_reported() {
        let dir = tempdir().unwrap();
        let store = JsonStateStore::new(dir.path());
        std::fs::write(store.path_for("bad"), "not json").unwrap();
        assert!(matches!(store.load("bad"), Err(BotError::Persistence(_))));
    }

    #[test]
    fn names_with_separators_stay_in_the_dir() {
        let dir = tempdir().unwrap();
        let store = JsonStateStore::new(dir.path());
        let path = store.path_for("../evil");
        assert!(path.starts_with(dir.path()));
    }
}
