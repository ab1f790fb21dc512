use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, instrument, warn};

use outpost_core::config::PoolConfig;
use outpost_mounts::Mount;

use crate::error::PoolError;
use crate::protocol::{cap_bytes, extract_payload, tail_str, OUTPUT_END, READY_MARKER};
use crate::types::{ContainerOutput, Job, WorkerState};

#[derive(Deserialize)]
struct WorkerReply {
    result: serde_json::Value,
    #[serde(default)]
    new_session_id: Option<String>,
}

enum WorkerEvent {
    Payload(String),
    Exited,
}

struct WarmWorker {
    child: Child,
    stdin: ChildStdin,
    state: WorkerState,
    last_active: Instant,
    events: mpsc::Receiver<WorkerEvent>,
}

/// Runs agent containers, keeping at most one warm worker per workspace.
pub struct WorkerPool {
    config: PoolConfig,
    warm: DashMap<String, Arc<Mutex<WarmWorker>>>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        Self { config, warm: DashMap::new() }
    }

    #[instrument(skip(self, job), fields(workspace = %job.workspace))]
    pub async fn run(&self, job: Job) -> ContainerOutput {
        if !self.config.warm_pool_enabled() {
            return self.run_cold(&job).await;
        }

        if let Some(handle) = self.warm.get(&job.workspace).map(|r| r.clone()) {
            let mut worker = handle.lock().await;
            match worker.state {
                WorkerState::Ready => {
                    worker.state = WorkerState::Busy;
                    worker.last_active = Instant::now();
                    let out = self.run_on_warm(&mut worker, &job).await;
                    drop(worker);
                    self.settle_warm_outcome(&job.workspace, &handle, out.is_ok()).await;
                    return out.unwrap_or_else(|e| ContainerOutput::err(e.to_string()));
                }
                WorkerState::Busy => {
                    drop(worker);
                    return self.run_cold(&job).await;
                }
                _ => {
                    drop(worker);
                    return self.run_cold(&job).await;
                }
            }
        }

        match self.spawn_warm(&job).await {
            Ok(mut worker) => {
                worker.state = WorkerState::Busy;
                worker.last_active = Instant::now();
                let out = self.run_on_warm(&mut worker, &job).await;
                let handle = Arc::new(Mutex::new(worker));
                self.warm.insert(job.workspace.clone(), handle.clone());
                self.settle_warm_outcome(&job.workspace, &handle, out.is_ok()).await;
                out.unwrap_or_else(|e| ContainerOutput::err(e.to_string()))
            }
            Err(reason) => {
                warn!(%reason, "warm spawn failed, falling back to cold run");
                self.run_cold(&job).await
            }
        }
    }

    async fn settle_warm_outcome(&self, workspace: &str, handle: &Arc<Mutex<WarmWorker>>, succeeded: bool) {
        if succeeded {
            let mut worker = handle.lock().await;
            worker.state = WorkerState::Ready;
        } else {
            self.warm.remove(workspace);
        }
    }

    async fn run_on_warm(&self, worker: &mut WarmWorker, job: &Job) -> Result<ContainerOutput, PoolError> {
        let line = format!("{}\n", job.input);
        worker.stdin.write_all(line.as_bytes()).await?;

        let event = tokio::time::timeout(job.timeout, worker.events.recv()).await;
        match event {
            Ok(Some(WorkerEvent::Payload(text))) => parse_reply(&text),
            Ok(Some(WorkerEvent::Exited)) | Ok(None) => {
                Err(PoolError::UnexpectedExit(job.workspace.clone()))
            }
            Err(_) => {
                let _ = worker.child.start_kill();
                let _ = worker.child.wait().await;
                Err(PoolError::RequestTimeout { workspace: job.workspace.clone() })
            }
        }
    }

    async fn spawn_warm(&self, job: &Job) -> Result<WarmWorker, PoolError> {
        let mut command = build_command(job, &self.config, true);
        let mut child = command.spawn()?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let (tx, rx) = mpsc::channel(8);
        let (ready_tx, mut ready_rx) = mpsc::channel(1);

        tokio::spawn(drain_stdout(stdout, tx.clone()));
        tokio::spawn(drain_stderr(stderr, ready_tx));

        let ready_timeout = Duration::from_secs(self.config.warm_ready_timeout_secs);
        if tokio::time::timeout(ready_timeout, ready_rx.recv()).await.is_err() {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(PoolError::ReadinessTimeout { workspace: job.workspace.clone() });
        }

        info!(workspace = %job.workspace, "warm worker ready");
        Ok(WarmWorker { child, stdin, state: WorkerState::Starting, last_active: Instant::now(), events: rx })
    }

    async fn run_cold(&self, job: &Job) -> ContainerOutput {
        let mut command = build_command(job, &self.config, false);
        let mut child = match command.spawn() {
            Ok(c) => c,
            Err(e) => return ContainerOutput::err(format!("failed to spawn cold worker: {e}")),
        };

        let mut stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let line = format!("{}\n", job.input);
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            return ContainerOutput::err(format!("failed writing to cold worker stdin: {e}"));
        }
        let _ = stdin.shutdown().await;
        drop(stdin);

        let max_bytes = self.config.max_output_bytes;
        let stdout_task = tokio::spawn(collect_capped(stdout, max_bytes));
        let stderr_task = tokio::spawn(collect_capped(stderr, max_bytes));

        let wait = tokio::time::timeout(job.timeout, child.wait()).await;
        let status = match wait {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return ContainerOutput::err(format!("failed waiting for cold worker: {e}")),
            Err(_) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return ContainerOutput::err(format!(
                    "request to workspace {} exceeded its deadline",
                    job.workspace
                ));
            }
        };

        let (stdout_lines, stdout_truncated) = stdout_task.await.unwrap_or_default();
        let (stderr_lines, stderr_truncated) = stderr_task.await.unwrap_or_default();
        if stdout_truncated || stderr_truncated {
            warn!(
                workspace = %job.workspace,
                stdout_truncated,
                stderr_truncated,
                max_output_bytes = max_bytes,
                "worker output truncated at max_output_bytes"
            );
        }

        if !status.success() {
            let stderr_bytes: Vec<u8> = stderr_lines.join("\n").into_bytes();
            return ContainerOutput::err(format!(
                "worker exited with {status}: {}",
                tail_str(&stderr_bytes, 200)
            ));
        }

        match extract_payload(&stdout_lines) {
            Some(text) => parse_reply(&text).unwrap_or_else(|e| ContainerOutput::err(e.to_string())),
            None => ContainerOutput::err("worker produced no output"),
        }
    }

    /// Kill every idle (not `Busy`) warm worker older than the configured
    /// idle timeout. Call on a 60s tick.
    pub async fn reap_idle(&self) {
        if !self.config.warm_pool_enabled() {
            return;
        }
        let idle_timeout = Duration::from_secs(self.config.warm_idle_timeout_secs.max(0) as u64);
        let workspaces: Vec<String> = self.warm.iter().map(|entry| entry.key().clone()).collect();

        for key in workspaces {
            let Some(handle) = self.warm.get(&key).map(|r| r.clone()) else { continue };
            let mut worker = handle.lock().await;
            if worker.state != WorkerState::Busy && worker.last_active.elapsed() >= idle_timeout {
                info!(workspace = %key, "reaping idle warm worker");
                let _ = worker.child.start_kill();
                let _ = worker.child.wait().await;
                drop(worker);
                self.warm.remove(&key);
            }
        }
    }

    pub async fn shutdown(&self) {
        let keys: Vec<String> = self.warm.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, handle)) = self.warm.remove(&key) {
                let mut worker = handle.lock().await;
                worker.state = WorkerState::Draining;
                let _ = worker.child.start_kill();
                let _ = worker.child.wait().await;
            }
        }
    }
}

fn parse_reply(text: &str) -> Result<ContainerOutput, PoolError> {
    let reply: WorkerReply = serde_json::from_str(text)
        .map_err(|e| PoolError::Protocol(e.to_string()))?;
    Ok(ContainerOutput::ok(reply.result, reply.new_session_id))
}

fn build_command(job: &Job, config: &PoolConfig, warm: bool) -> Command {
    let mut command = Command::new(&job.runtime);
    command.arg("run").arg("-i");
    if !warm {
        command.arg("--rm");
    }
    for mount in &job.mounts {
        command.arg("-v").arg(mount_arg(mount));
    }
    for (key, value) in &job.env {
        command.arg("-e").arg(format!("{key}={value}"));
    }
    if warm {
        command.arg("-e").arg("WARM_MODE=1");
        command.arg("-e").arg(format!("IDLE_TIMEOUT={}", config.warm_idle_timeout_secs));
    }
    command.arg(&job.image);
    command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
    command
}

fn mount_arg(mount: &Mount) -> String {
    let suffix = if mount.read_only { ":ro" } else { "" };
    format!("{}:{}{}", mount.host_path.display(), mount.container_path, suffix)
}

async fn drain_stdout(stdout: tokio::process::ChildStdout, tx: mpsc::Sender<WorkerEvent>) {
    let mut lines = BufReader::new(stdout).lines();
    let mut buffer: Vec<String> = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        let is_end = line.trim() == OUTPUT_END;
        buffer.push(line);
        if is_end {
            if let Some(payload) = extract_payload(&buffer) {
                if tx.send(WorkerEvent::Payload(payload)).await.is_err() {
                    return;
                }
            }
            buffer.clear();
        }
    }
    let _ = tx.send(WorkerEvent::Exited).await;
}

async fn drain_stderr(stderr: tokio::process::ChildStderr, ready_tx: mpsc::Sender<()>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim() == READY_MARKER {
            let _ = ready_tx.send(()).await;
        } else {
            warn!(stderr = %line, "worker stderr");
        }
    }
}

async fn collect_capped(
    stream: impl tokio::io::AsyncRead + Unpin,
    limit: usize,
) -> (Vec<String>, bool) {
    let mut lines = BufReader::new(stream).lines();
    let mut collected = Vec::new();
    let mut buf = Vec::new();
    let mut truncated = false;
    while let Ok(Some(line)) = lines.next_line().await {
        // Keep draining the stream once capped (so the child isn't blocked
        // writing to a full pipe), but stop retaining lines past the limit.
        if truncated {
            continue;
        }
        if cap_bytes(&mut buf, line.as_bytes(), limit) {
            truncated = true;
            continue;
        }
        collected.push(line);
    }
    (collected, truncated)
}
