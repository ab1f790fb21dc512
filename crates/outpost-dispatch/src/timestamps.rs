use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::Result;

/// The epoch value used for a workspace that has never had a successful
/// dispatch: every message ever stored is "new" relative to it.
pub const EPOCH: &str = "1970-01-01T00:00:00Z";

/// Per-workspace `lastAgentTimestamp`, persisted the same way
/// [`outpost_router::WorkspaceSessions`] persists session tokens: a single
/// JSON file, written via write-then-rename.
pub struct AgentTimestamps {
    path: PathBuf,
    map: Mutex<HashMap<String, String>>,
}

impl AgentTimestamps {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let map = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            HashMap::new()
        };
        Ok(Self { path, map: Mutex::new(map) })
    }

    /// The last-processed timestamp for `folder`, or [`EPOCH`] if none yet.
    pub fn get_or_epoch(&self, folder: &str) -> String {
        self.map.lock().unwrap().get(folder).cloned().unwrap_or_else(|| EPOCH.to_string())
    }

    pub fn set(&self, folder: &str, timestamp: String) -> Result<()> {
        {
            let mut map = self.map.lock().unwrap();
            map.insert(folder.to_string(), timestamp);
        }
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let map = self.map.lock().unwrap();
        let body = serde_json::to_string_pretty(&*map)?;
        write_atomic(&self.path, &body)?;
        debug!(path = %self.path.display(), entries = map.len(), "persisted agent timestamps");
        Ok(())
    }
}

fn write_atomic(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, body)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_workspace_defaults_to_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let ts = AgentTimestamps::load(dir.path().join("ts.json")).unwrap();
        assert_eq!(ts.get_or_epoch("family-chat"), EPOCH);
    }

    #[test]
    fn set_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ts.json");
        let ts = AgentTimestamps::load(&path).unwrap();
        ts.set("family-chat", "2026-01-01T00:00:00Z".into()).unwrap();

        let reloaded = AgentTimestamps::load(&path).unwrap();
        assert_eq!(reloaded.get_or_epoch("family-chat"), "2026-01-01T00:00:00Z");
    }
}
