//! Engine process execution.
//!
//! The runner writes the PID sidecar, verifies mounts, spawns the engine's
//! command line and watches its output until the process exits.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::arguments::sanitize_env_value;
use crate::config::Config;
use crate::data::ComputeData;
use crate::engine::{Engine, EngineContext, OutputEvent};
use crate::error::{Error, Result};
use crate::platform::Priority;
use crate::report::TaskReport;

/// How long to keep reading output after the process has exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs engines on this node.
#[derive(Debug, Clone, Default)]
pub struct Runner {
    config: Config,
}

impl Runner {
    /// Create a runner with the node configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// The node configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `engine` for the task described by `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails or the computation is unsuccessful.
    pub async fn run<E: Engine + ?Sized>(&self, engine: &E, ctx: &EngineContext) -> Result<()> {
        if let Some(dump) = ctx.dev_dump() {
            info!(
                "Dev mode, running {} item '{}' with data:\n{dump}",
                engine.name(),
                ctx.item
            );
        }
        self.write_pid_file(&ctx.data_path)?;
        self.check_mounts()?;
        engine.prepare(ctx)?;
        engine.execute(ctx, self).await
    }

    /// Write our PID to the sidecar file next to the compute data.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_pid_file(&self, data_path: &Path) -> Result<PathBuf> {
        let path = ComputeData::sidecar_dir(data_path).join(&self.config.execution.pid_file_name);
        let pid = std::process::id();
        std::fs::write(&path, pid.to_string())?;
        debug!("PID({pid}) written to '{}'", path.display());
        info!("accsyn PID({pid})");
        Ok(path)
    }

    /// Make sure all configured network mounts are available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MountUnavailable`] for the first missing mount.
    pub fn check_mounts(&self) -> Result<()> {
        if !self.config.execution.check_mounts {
            return Ok(());
        }
        for mount in &self.config.execution.mounts {
            if !mount.exists() {
                return Err(Error::MountUnavailable(mount.clone()));
            }
            debug!("Mount {} available", mount.display());
        }
        Ok(())
    }

    /// Spawn the engine's command line and supervise it.
    ///
    /// Output lines are echoed to stdout and handed to the engine's parser.
    /// Once the engine reports the render finished, the process has the
    /// configured grace period to exit before it is killed and the task is
    /// considered successful.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyCommandLine`], [`Error::Spawn`] or
    /// [`Error::ExecutionFailed`] for a non-zero exit.
    pub async fn run_process<E: Engine + ?Sized>(
        &self,
        engine: &E,
        ctx: &EngineContext,
    ) -> Result<()> {
        let cmd = engine.commandline(ctx)?;
        if cmd.is_empty() {
            return Err(Error::EmptyCommandLine);
        }

        let mut extra_envs = engine.envs(ctx);
        extra_envs.extend(ctx.overrides.envs.clone());
        let priority = ctx.overrides.priority.or_else(|| engine.priority(ctx));
        let stdin_text = engine.stdin(ctx);

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin_text.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);
        if let Some(dir) = &cmd.working_dir {
            info!("Working directory: {}", dir.display());
            command.current_dir(dir);
        }
        if !extra_envs.is_empty() {
            let env = merged_environment(std::env::vars(), &extra_envs);
            info!("Environment variables: {env:?}");
            command.env_clear().envs(env);
        }
        apply_priority(&mut command, priority);

        info!("Running {cmd}");
        if let Some(text) = &stdin_text {
            info!("Stdin: '{text}'");
        }
        if let Some(priority) = priority {
            info!("Priority: {priority:?}");
        }
        info!("{}", "-".repeat(120));

        let mut child = command.spawn().map_err(|source| Error::Spawn {
            program: cmd.program.display().to_string(),
            source,
        })?;

        if let (Some(text), Some(mut pipe)) = (stdin_text, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(text.as_bytes()).await {
                    warn!("Could not write stdin: {e}");
                }
                // Dropping the pipe closes stdin.
            });
        }

        let (tx, mut rx) = mpsc::channel::<String>(256);
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx.clone());
        }
        drop(tx);

        let mut watch = OutputWatch::new(ctx.item.to_string(), self.config.hung_render_grace());
        let mut streams_open = true;

        let status = loop {
            tokio::select! {
                line = rx.recv(), if streams_open => match line {
                    Some(line) => watch.handle_line(engine, &line),
                    None => streams_open = false,
                },
                status = child.wait() => break Some(status?),
                () = expire(watch.deadline) => {
                    warn!("Render finished but process still running (hung?), finishing up");
                    child.kill().await?;
                    break None;
                }
            }
        };

        let _ = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, async {
            while let Some(line) = rx.recv().await {
                watch.handle_line(engine, &line);
            }
        })
        .await;

        match status {
            None => {
                info!("Process killed after finished render, exit code forced to 0");
                Ok(())
            }
            Some(status) if status.success() => {
                info!("Process finished successfully");
                Ok(())
            }
            Some(status) => Err(Error::ExecutionFailed {
                code: status.code(),
            }),
        }
    }
}

fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Output stream closed: {e}");
                    break;
                }
            }
        }
    });
}

/// Per process output state.
#[derive(Debug)]
struct OutputWatch {
    item: String,
    grace: Duration,
    deadline: Option<Instant>,
    last_frame: Option<i64>,
}

impl OutputWatch {
    fn new(item: String, grace: Duration) -> Self {
        Self {
            item,
            grace,
            deadline: None,
            last_frame: None,
        }
    }

    /// Echo `line` and act on what the engine recognises in it.
    fn handle_line<E: Engine + ?Sized>(&mut self, engine: &E, line: &str) {
        println!("{line}");
        debug!(target: "engine", "{line}");
        match engine.parse_output(line) {
            Some(OutputEvent::FrameStarted(frame)) => {
                if self.last_frame != Some(frame) {
                    self.last_frame = Some(frame);
                    TaskReport::started(frame.to_string()).emit();
                }
            }
            Some(OutputEvent::Progress(percent)) => {
                TaskReport::progress(self.item.as_str(), percent).emit();
            }
            Some(OutputEvent::RenderFinished) => {
                if self.deadline.is_none() {
                    info!("Finished render will expire in {}s", self.grace.as_secs());
                    self.deadline = Some(Instant::now() + self.grace);
                }
            }
            None => {}
        }
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// The parent environment overlaid with `extra`, made safe for the child.
fn merged_environment(
    parent: impl Iterator<Item = (String, String)>,
    extra: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    parent
        .chain(extra.iter().map(|(k, v)| (k.clone(), v.clone())))
        .map(|(k, v)| (sanitize_env_value(&k), sanitize_env_value(&v)))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

#[cfg(windows)]
fn apply_priority(command: &mut Command, priority: Option<Priority>) {
    if let Some(priority) = priority {
        command.creation_flags(priority.creation_flags());
    }
}

#[cfg(not(windows))]
fn apply_priority(_command: &mut Command, priority: Option<Priority>) {
    if let Some(priority) = priority {
        debug!("Priority {priority:?} only applies on Windows");
    }
}
