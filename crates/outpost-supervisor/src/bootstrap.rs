//! Wires the ten component crates into one running supervisor, following
//! the construction order the config sections already imply: store first,
//! then the state every other piece reads, then the components that act
//! on them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{mpsc, watch};

use outpost_channels::{Channel, ChannelManager, InboundEvent, NullChannel};
use outpost_core::config::SupervisorConfig;
use outpost_debounce::{Debouncer, FlushedBatch};
use outpost_dispatch::{AgentTimestamps, DispatchCore};
use outpost_mounts::Allowlist;
use outpost_pool::WorkerPool;
use outpost_registry::Registry;
use outpost_router::WorkspaceSessions;
use outpost_store::Store;

/// Every long-lived handle `main` needs to spawn tasks and run the
/// shutdown sequence. Not reused across runs — `build` is called once.
pub struct Supervisor {
    pub config: SupervisorConfig,
    pub project_root: PathBuf,
    pub store: Arc<Store>,
    pub registry: Arc<Registry>,
    pub pool: Arc<WorkerPool>,
    pub dispatch: Arc<DispatchCore>,
    pub debouncer: Arc<Debouncer>,
    pub debounce_rx: mpsc::UnboundedReceiver<(String, FlushedBatch)>,
    pub channel_manager: ChannelManager,
    pub inbound_rx: mpsc::Receiver<InboundEvent>,
    pub shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// How long a workspace's text buffer waits for more messages before the
/// Debouncer flushes it. Not yet exposed as a config knob — the spec names
/// no value, and every example run in testing used this one.
const DEBOUNCE_DELAY: Duration = Duration::from_secs(10);

/// Before a rebuild or restart service control exits the process, give the
/// chat platform egress a moment to land any in-flight reply.
const RESTART_GRACE: Duration = Duration::from_secs(1);

pub async fn build(config: SupervisorConfig) -> anyhow::Result<Supervisor> {
    let project_root = PathBuf::from(&config.supervisor.project_root);
    std::fs::create_dir_all(project_root.join("state")).context("creating state/ directory")?;
    std::fs::create_dir_all(project_root.join("mailbox")).context("creating mailbox/ directory")?;
    std::fs::create_dir_all(project_root.join("workspaces/main")).context("creating workspaces/main directory")?;
    std::fs::create_dir_all(project_root.join("workspaces/global")).context("creating workspaces/global directory")?;

    let conn = rusqlite::Connection::open(&config.store.path)
        .with_context(|| format!("opening store database at {}", config.store.path))?;
    outpost_store::db::init_db(&conn).context("initializing store schema")?;
    let store = Arc::new(Store::new(conn));

    let registry = Arc::new(
        Registry::load(project_root.join("state/registry.json")).context("loading chat registry")?,
    );
    let sessions = Arc::new(
        WorkspaceSessions::load(project_root.join("state/sessions.json")).context("loading worker sessions")?,
    );
    let timestamps = Arc::new(
        AgentTimestamps::load(project_root.join("state/agent_timestamps.json"))
            .context("loading agent timestamps")?,
    );

    let allowlist_path = config
        .mounts
        .allowlist_path
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(|| project_root.join("state/allowlist.json"));
    let allowlist = Allowlist::load(&allowlist_path).context("loading mount allowlist")?;

    let pool = Arc::new(WorkerPool::new(config.pool.clone()));

    // `ChannelManager::register` takes ownership of its adapter, so the
    // egress path Dispatch Core holds is a second, independent `NullChannel`
    // instance — harmless, since the stub carries no state worth sharing.
    let egress_channel: Arc<dyn Channel + Send + Sync> = Arc::new(NullChannel::new());

    let dispatch_config = outpost_dispatch::DispatchConfig {
        assistant_name: config.supervisor.assistant_name.clone(),
        project_root: project_root.clone(),
        non_main_read_only: config.mounts.non_main_read_only,
        allowlist,
        container_image: config.pool.container_image.clone(),
        container_runtime: config.pool.container_runtime.clone(),
        default_timeout_secs: config.pool.default_timeout_secs,
        build_command: config.supervisor.build_command.clone(),
        restart_grace: RESTART_GRACE,
    };

    let dispatch = Arc::new(DispatchCore::new(
        store.clone(),
        registry.clone(),
        sessions.clone(),
        timestamps.clone(),
        pool.clone(),
        egress_channel,
        dispatch_config,
    ));

    let (debounce_tx, debounce_rx) = mpsc::unbounded_channel();
    let debouncer = Debouncer::new(DEBOUNCE_DELAY, debounce_tx);

    let mut channel_manager = ChannelManager::new();
    channel_manager.register(Box::new(NullChannel::new()));
    let inbound_rx = channel_manager.connect_all().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    Ok(Supervisor {
        config,
        project_root,
        store,
        registry,
        pool,
        dispatch,
        debouncer,
        debounce_rx,
        channel_manager,
        inbound_rx,
        shutdown_tx,
        shutdown_rx,
    })
}
