use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SCHEDULER_TICK_SECS: u64 = 60;
pub const DEFAULT_MAILBOX_POLL_SECS: u64 = 1;
pub const DEFAULT_WORKER_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_WARM_IDLE_TIMEOUT_SECS: u64 = 1800;
pub const DEFAULT_WARM_READY_TIMEOUT_SECS: u64 = 30;

/// Top-level config (outpost.toml + OUTPOST_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub supervisor: SupervisorSection,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub mounts: MountsConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            supervisor: SupervisorSection::default(),
            store: StoreConfig::default(),
            pool: PoolConfig::default(),
            scheduler: SchedulerConfig::default(),
            mailbox: MailboxConfig::default(),
            mounts: MountsConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorSection {
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_project_root")]
    pub project_root: String,
    /// Chat id bound to the privileged `main` workspace. Unset until an
    /// operator registers the admin conversation; until then no inbound
    /// chat is treated as main.
    #[serde(default)]
    pub main_chat_id: Option<i64>,
    /// Command run from `project_root` on a mailbox `rebuild` service
    /// control action.
    #[serde(default = "default_build_command")]
    pub build_command: Vec<String>,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
            log_level: default_log_level(),
            timezone: default_timezone(),
            project_root: default_project_root(),
            main_chat_id: None,
            build_command: default_build_command(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_container_image")]
    pub container_image: String,
    #[serde(default = "default_container_runtime")]
    pub container_runtime: String,
    #[serde(default = "default_worker_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default = "default_warm_idle_timeout_secs")]
    pub warm_idle_timeout_secs: i64,
    #[serde(default = "default_warm_ready_timeout_secs")]
    pub warm_ready_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            container_image: default_container_image(),
            container_runtime: default_container_runtime(),
            default_timeout_secs: default_worker_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
            warm_idle_timeout_secs: default_warm_idle_timeout_secs(),
            warm_ready_timeout_secs: default_warm_ready_timeout_secs(),
        }
    }
}

impl PoolConfig {
    /// `false` when the warm pool is disabled (`warm_idle_timeout_secs <= 0`).
    pub fn warm_pool_enabled(&self) -> bool {
        self.warm_idle_timeout_secs > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_tick_secs")]
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_scheduler_tick_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    #[serde(default = "default_mailbox_poll_secs")]
    pub poll_interval_secs: u64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_mailbox_poll_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountsConfig {
    pub allowlist_path: Option<String>,
    #[serde(default = "bool_true")]
    pub non_main_read_only: bool,
}

impl Default for MountsConfig {
    fn default() -> Self {
        Self {
            allowlist_path: None,
            non_main_read_only: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatConfig {
    pub bot_token: Option<String>,
}

fn bool_true() -> bool {
    true
}
fn default_assistant_name() -> String {
    "assistant".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_project_root() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
}
fn default_container_image() -> String {
    "outpost-worker:latest".to_string()
}
fn default_container_runtime() -> String {
    "docker".to_string()
}
fn default_worker_timeout_secs() -> u64 {
    DEFAULT_WORKER_TIMEOUT_SECS
}
fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}
fn default_warm_idle_timeout_secs() -> i64 {
    DEFAULT_WARM_IDLE_TIMEOUT_SECS as i64
}
fn default_warm_ready_timeout_secs() -> u64 {
    DEFAULT_WARM_READY_TIMEOUT_SECS
}
fn default_scheduler_tick_secs() -> u64 {
    DEFAULT_SCHEDULER_TICK_SECS
}
fn default_mailbox_poll_secs() -> u64 {
    DEFAULT_MAILBOX_POLL_SECS
}
fn default_build_command() -> Vec<String> {
    vec!["cargo".to_string(), "build".to_string(), "--release".to_string()]
}
fn default_store_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.outpost/outpost.db", home)
}

impl SupervisorConfig {
    /// Load config from a TOML file with OUTPOST_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.outpost/outpost.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: SupervisorConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("OUTPOST_").split("_"))
            .extract()
            .map_err(|e| crate::error::OutpostError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.outpost/outpost.toml", home)
}
