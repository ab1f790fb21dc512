use std::path::PathBuf;
use std::time::Duration;

use outpost_mounts::Allowlist;

/// Everything Dispatch Core needs to turn a prompt into a [`outpost_pool::Job`]
/// that isn't carried by the Store, Registry, or Router — the pieces of
/// `SupervisorConfig` it was built from.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub assistant_name: String,
    pub project_root: PathBuf,
    pub non_main_read_only: bool,
    pub allowlist: Allowlist,
    pub container_image: String,
    pub container_runtime: String,
    pub default_timeout_secs: u64,
    /// Program + args run from `project_root` on a `rebuild` service control.
    pub build_command: Vec<String>,
    /// Grace period before exiting on a `restart` service control.
    pub restart_grace: Duration,
}
