//! Entry point: brokers inbound chat events into the Debouncer and
//! Dispatch Core, and drives the Scheduler and Mailbox Poller as
//! background tasks, until told to stop.

mod bootstrap;
mod events;
mod shutdown;

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use outpost_core::config::SupervisorConfig;

#[derive(Parser, Debug)]
#[command(name = "outpost-supervisor", author, version, about = "Supervises a chat-bound pool of sandboxed agent containers", long_about = None)]
struct Cli {
    /// Path to outpost.toml. Defaults to ~/.outpost/outpost.toml.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outpost_supervisor=info,outpost_dispatch=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = SupervisorConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("failed to load config ({e}), falling back to defaults");
        SupervisorConfig::default()
    });

    if let Err(e) = preflight_container_runtime(&config.pool.container_runtime) {
        fatal(&format!("container runtime unavailable: {e}"));
    }

    let mut supervisor = match bootstrap::build(config).await {
        Ok(supervisor) => supervisor,
        Err(e) => fatal(&format!("failed to initialize supervisor: {e}")),
    };

    info!(
        project_root = %supervisor.project_root.display(),
        "outpost supervisor starting",
    );

    let scheduler = outpost_scheduler::SchedulerEngine::new(
        supervisor.store.clone(),
        supervisor.dispatch.clone(),
        std::time::Duration::from_secs(supervisor.config.scheduler.tick_interval_secs),
        supervisor.config.supervisor.timezone.clone(),
    );
    let scheduler_task = tokio::spawn(scheduler.run(supervisor.shutdown_rx.clone()));

    let mailbox_poller = Arc::new(outpost_mailbox::MailboxPoller::new(
        supervisor.project_root.join("mailbox"),
        std::time::Duration::from_secs(supervisor.config.mailbox.poll_interval_secs),
        supervisor.config.supervisor.timezone.clone(),
        supervisor.store.clone(),
        supervisor.registry.clone(),
        supervisor.dispatch.clone(),
    ));
    let mailbox_shutdown = supervisor.shutdown_rx.clone();
    let mailbox_poller_handle = mailbox_poller.clone();
    let mailbox_task = tokio::spawn(async move { mailbox_poller_handle.run(mailbox_shutdown).await });

    let debounce_task = tokio::spawn(events::run_debounce_consumer(
        supervisor.debounce_rx,
        supervisor.store.clone(),
        supervisor.dispatch.clone(),
    ));

    let event_ctx = Arc::new(events::EventContext {
        store: supervisor.store.clone(),
        registry: supervisor.registry.clone(),
        debouncer: supervisor.debouncer.clone(),
        dispatch: supervisor.dispatch.clone(),
        main_chat_id: supervisor.config.supervisor.main_chat_id,
        assistant_name: supervisor.config.supervisor.assistant_name.clone(),
    });
    let mut inbound_rx = supervisor.inbound_rx;
    let inbound_task = tokio::spawn(async move {
        while let Some(event) = inbound_rx.recv().await {
            event_ctx.handle(event).await;
        }
    });

    wait_for_shutdown_signal().await;

    let report = shutdown::execute_shutdown(
        &supervisor.shutdown_tx,
        &supervisor.store,
        &supervisor.debouncer,
        &supervisor.dispatch,
        &supervisor.pool,
        &mut supervisor.channel_manager,
    )
    .await;
    let _ = report;

    inbound_task.abort();
    debounce_task.abort();
    let _ = scheduler_task.await;
    let _ = mailbox_task.await;

    Ok(())
}

async fn wait_for_shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        _ = wait_for_sigterm() => {
            info!("received SIGTERM, shutting down");
        }
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}

/// Fatal startup failure: print a loud banner and exit non-zero, per the
/// exit-code contract for missing container runtime / bad store.
fn fatal(message: &str) -> ! {
    error!("==============================================");
    error!("FATAL: {message}");
    error!("==============================================");
    std::process::exit(1);
}

fn preflight_container_runtime(runtime: &str) -> anyhow::Result<()> {
    use anyhow::Context;
    std::process::Command::new(runtime)
        .arg("--version")
        .output()
        .with_context(|| format!("spawning `{runtime} --version`"))?;
    Ok(())
}
