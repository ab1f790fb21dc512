use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::warn;

use outpost_core::types::ChatType;

use crate::error::Result;
use crate::types::{Allowlist, DroppedMount, Mount, MountPlan};

impl Allowlist {
    /// Load `{roots: [...], blocked_globs: [...]}` from `path`. A missing
    /// file is not an error — it means no extra mounts are permitted yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Everything the planner needs to build the mount list for one worker
/// invocation. All paths are resolved relative to `project_root`.
pub struct MountRequest<'a> {
    pub project_root: &'a Path,
    pub workspace_folder: &'a str,
    pub is_main: bool,
    pub chat_type: ChatType,
    pub extra_mounts: &'a [String],
    pub allowlist: &'a Allowlist,
    pub non_main_read_only: bool,
}

fn workspaces_dir(root: &Path) -> PathBuf {
    root.join("workspaces")
}

fn group_dir(root: &Path, folder: &str) -> PathBuf {
    workspaces_dir(root).join(folder)
}

fn global_dir(root: &Path) -> PathBuf {
    workspaces_dir(root).join("global")
}

fn worker_state_dir(root: &Path, folder: &str) -> PathBuf {
    root.join("state").join(folder).join(".claude")
}

fn mailbox_dir(root: &Path, folder: &str) -> PathBuf {
    root.join("mailbox").join(folder)
}

fn env_file(root: &Path, folder: &str) -> PathBuf {
    root.join("state").join(folder).join("env")
}

const ENV_WHITELIST: &[&str] = &["CLAUDE_CODE_OAUTH_TOKEN", "ANTHROPIC_API_KEY"];

/// Build the ordered bind mount list for one worker invocation, per the
/// main/non-main/shared-instructions/extra-mounts contract. Never fails on
/// a bad extra mount — those are reported in `MountPlan::dropped` instead.
pub fn plan_mounts(req: &MountRequest<'_>) -> Result<MountPlan> {
    let mut plan = MountPlan::default();

    if req.is_main {
        plan.mounts.push(Mount::new(req.project_root, "/workspace/project", false));
        plan.mounts.push(Mount::new(
            group_dir(req.project_root, req.workspace_folder),
            "/workspace/group",
            false,
        ));
    } else {
        plan.mounts.push(Mount::new(
            group_dir(req.project_root, req.workspace_folder),
            "/workspace/group",
            false,
        ));

        let shared_claude_md = if req.chat_type == ChatType::Private {
            workspaces_dir(req.project_root).join("main").join("CLAUDE.md")
        } else {
            global_dir(req.project_root).join("CLAUDE.md")
        };
        if shared_claude_md.is_file() {
            plan.mounts.push(Mount::new(shared_claude_md, "/workspace/group/CLAUDE.md", true));
        }

        let global = global_dir(req.project_root);
        if global.is_dir() {
            plan.mounts.push(Mount::new(global, "/workspace/global", true));
        }
    }

    plan.mounts.push(Mount::new(
        worker_state_dir(req.project_root, req.workspace_folder),
        "/home/node/.claude",
        false,
    ));
    plan.mounts.push(Mount::new(
        mailbox_dir(req.project_root, req.workspace_folder),
        "/workspace/ipc",
        false,
    ));

    let env_path = env_file(req.project_root, req.workspace_folder);
    if env_path.is_file() {
        plan.mounts.push(Mount::new(env_path, "/workspace/env-dir", true));
    }

    for requested in req.extra_mounts {
        match validate_extra_mount(requested, req.allowlist, req.is_main && !req.non_main_read_only) {
            Ok(mount) => plan.mounts.push(mount),
            Err(reason) => {
                warn!(requested, reason, "dropping extra mount");
                plan.dropped.push(DroppedMount { requested: requested.clone(), reason });
            }
        }
    }

    Ok(plan)
}

fn validate_extra_mount(requested: &str, allowlist: &Allowlist, force_writable: bool) -> std::result::Result<Mount, String> {
    let expanded = expand_tilde(requested);
    let canonical = std::fs::canonicalize(&expanded).map_err(|e| format!("cannot resolve host path: {e}"))?;

    let contained = allowlist.roots.iter().any(|root| {
        std::fs::canonicalize(root).map(|root| canonical.starts_with(root)).unwrap_or(false)
    });
    if !contained {
        return Err("not under any allowed root".to_string());
    }

    let as_str = canonical.to_string_lossy();
    for blocked in &allowlist.blocked_globs {
        if let Ok(pattern) = Pattern::new(blocked) {
            if pattern.matches(&as_str) {
                return Err(format!("matches blocked pattern {blocked:?}"));
            }
        }
    }

    let sub = canonical
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| "host path has no file name".to_string())?;

    let read_only = !force_writable;
    Ok(Mount::new(canonical, format!("/workspace/extra/{sub}"), read_only))
}

fn expand_tilde(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_allowlist(root: &Path) -> Allowlist {
        Allowlist { roots: vec![root.to_path_buf()], blocked_globs: vec!["*.pem".into(), "**/.ssh/**".into()] }
    }

    #[test]
    fn main_binds_project_root_and_group_dir() {
        let dir = tempfile::tempdir().unwrap();
        let req = MountRequest {
            project_root: dir.path(),
            workspace_folder: "main",
            is_main: true,
            chat_type: ChatType::Private,
            extra_mounts: &[],
            allowlist: &Allowlist::default(),
            non_main_read_only: true,
        };
        let plan = plan_mounts(&req).unwrap();
        assert!(plan.mounts.iter().any(|m| m.container_path == "/workspace/project" && !m.read_only));
        assert!(plan.mounts.iter().any(|m| m.container_path == "/workspace/group" && !m.read_only));
    }

    #[test]
    fn non_main_overlays_global_claude_md_when_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("workspaces/global")).unwrap();
        std::fs::write(dir.path().join("workspaces/global/CLAUDE.md"), "shared notes").unwrap();

        let req = MountRequest {
            project_root: dir.path(),
            workspace_folder: "family-chat",
            is_main: false,
            chat_type: ChatType::Group,
            extra_mounts: &[],
            allowlist: &Allowlist::default(),
            non_main_read_only: true,
        };
        let plan = plan_mounts(&req).unwrap();
        let overlay = plan.mounts.iter().find(|m| m.container_path == "/workspace/group/CLAUDE.md").unwrap();
        assert!(overlay.read_only);
        assert!(plan.mounts.iter().any(|m| m.container_path == "/workspace/global" && m.read_only));
    }

    #[test]
    fn extra_mount_outside_allowlist_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "x").unwrap();

        let req = MountRequest {
            project_root: dir.path(),
            workspace_folder: "w",
            is_main: false,
            chat_type: ChatType::Private,
            extra_mounts: std::slice::from_ref(&outside.path().join("secret.txt").to_string_lossy().to_string()),
            allowlist: &base_allowlist(dir.path()),
            non_main_read_only: true,
        };
        let plan = plan_mounts(&req).unwrap();
        assert_eq!(plan.dropped.len(), 1);
        assert!(plan.dropped[0].reason.contains("not under any allowed root"));
    }

    #[test]
    fn extra_mount_matching_blocked_glob_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let allowed_root = dir.path().join("allowed");
        std::fs::create_dir_all(&allowed_root).unwrap();
        std::fs::write(allowed_root.join("key.pem"), "x").unwrap();

        let req = MountRequest {
            project_root: dir.path(),
            workspace_folder: "w",
            is_main: false,
            chat_type: ChatType::Private,
            extra_mounts: std::slice::from_ref(&allowed_root.join("key.pem").to_string_lossy().to_string()),
            allowlist: &base_allowlist(&allowed_root),
            non_main_read_only: true,
        };
        let plan = plan_mounts(&req).unwrap();
        assert_eq!(plan.dropped.len(), 1);
        assert!(plan.dropped[0].reason.contains("blocked pattern"));
    }

    #[test]
    fn non_main_read_only_forces_extra_mount_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let allowed_root = dir.path().join("allowed");
        std::fs::create_dir_all(&allowed_root).unwrap();
        std::fs::write(allowed_root.join("notes.md"), "x").unwrap();

        let req = MountRequest {
            project_root: dir.path(),
            workspace_folder: "w",
            is_main: false,
            chat_type: ChatType::Private,
            extra_mounts: std::slice::from_ref(&allowed_root.join("notes.md").to_string_lossy().to_string()),
            allowlist: &base_allowlist(&allowed_root),
            non_main_read_only: true,
        };
        let plan = plan_mounts(&req).unwrap();
        let extra = plan.mounts.iter().find(|m| m.container_path.starts_with("/workspace/extra/")).unwrap();
        assert!(extra.read_only);
    }

    #[test]
    fn allowlist_load_of_missing_file_is_empty_default() {
        let dir = tempfile::tempdir().unwrap();
        let allowlist = Allowlist::load(&dir.path().join("nope.json")).unwrap();
        assert!(allowlist.roots.is_empty());
        assert!(allowlist.blocked_globs.is_empty());
    }

    #[test]
    fn allowlist_load_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("allowlist.json");
        std::fs::write(&path, r#"{"roots": ["/srv/shared"], "blocked_globs": ["*.pem"]}"#).unwrap();

        let allowlist = Allowlist::load(&path).unwrap();
        assert_eq!(allowlist.roots, vec![PathBuf::from("/srv/shared")]);
        assert_eq!(allowlist.blocked_globs, vec!["*.pem".to_string()]);
    }
}
