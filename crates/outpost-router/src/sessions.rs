use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::Result;

/// Per-workspace worker session token, persisted as a single JSON file.
///
/// Not a database table: the spec treats this as ephemeral state a worker
/// may or may not hand back, not a durable record — a flat file with
/// write-then-rename is the right weight for it.
pub struct WorkspaceSessions {
    path: PathBuf,
    map: Mutex<HashMap<String, String>>,
}

impl WorkspaceSessions {
    /// Load the map from `path`, or start empty if the file does not exist yet.
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

    /// The worker's last known session token for `folder`, if any.
    pub fn get(&self, folder: &str) -> Option<String> {
        self.map.lock().unwrap().get(folder).cloned()
    }

    /// Record a new token for `folder` and persist immediately.
    pub fn set(&self, folder: &str, token: String) -> Result<()> {
        {
            let mut map = self.map.lock().unwrap();
            map.insert(folder.to_string(), token);
        }
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let map = self.map.lock().unwrap();
        let body = serde_json::to_string_pretty(&*map)?;
        write_atomic(&self.path, &body)?;
        debug!(path = %self.path.display(), entries = map.len(), "persisted workspace sessions");
        Ok(())
    }
}

/// Write `body` to `path` via a sibling temp file and rename, so readers
/// never observe a partially-written file.
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
    fn roundtrips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let sessions = WorkspaceSessions::load(&path).unwrap();
        assert!(sessions.get("family-chat").is_none());
        sessions.set("family-chat", "s1".to_string()).unwrap();

        let reloaded = WorkspaceSessions::load(&path).unwrap();
        assert_eq!(reloaded.get("family-chat"), Some("s1".to_string()));
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let sessions = WorkspaceSessions::load(&path).unwrap();
        assert!(sessions.get("anything").is_none());
    }
}
