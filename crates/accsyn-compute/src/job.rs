//! Local job sessions.
//!
//! A [`Session`] accepts the same job documents the farm does and runs their
//! tasks one after another on this node. Each task gets its own compute data
//! file, laid out the way the farm would hand it to an engine.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::data::{Compute, ComputeData, Share, Site};
use crate::engine::{Engine, EngineContext};
use crate::error::{Error, Result};
use crate::item::{parse_frame_list, Item};
use crate::runner::Runner;

/// The only job type that runs locally.
pub const COMPUTE_JOB_TYPE: &str = "compute";

/// Directory under the system temp dir used when no work dir is given.
const DEFAULT_WORK_DIR: &str = "accsyn-jobs";

/// A local job session.
#[derive(Debug, Clone)]
pub struct Session {
    dev: bool,
    work_dir: PathBuf,
}

impl Session {
    /// Create a session writing task data below the system temp directory.
    #[must_use]
    pub fn new(dev: bool) -> Self {
        Self::with_work_dir(dev, std::env::temp_dir().join(DEFAULT_WORK_DIR))
    }

    /// Create a session writing task data below `work_dir`.
    #[must_use]
    pub fn with_work_dir(dev: bool, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            dev,
            work_dir: work_dir.into(),
        }
    }

    /// Whether this is a development session.
    #[must_use]
    pub fn dev(&self) -> bool {
        self.dev
    }

    /// Where task data is written.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Create a job from a job document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedJobType`] unless `job_type` is `compute`,
    /// [`Error::InvalidJob`] for a malformed document and
    /// [`Error::UnknownEngine`] if the engine does not exist.
    pub fn create_job(&self, job_type: &str, document: Value) -> Result<Job> {
        if job_type != COMPUTE_JOB_TYPE {
            return Err(Error::UnsupportedJobType(job_type.to_string()));
        }
        let mut document: JobDocument =
            serde_json::from_value(document).map_err(|e| Error::invalid_job(e.to_string()))?;
        let engine = crate::engines::lookup(&document.engine)
            .ok_or_else(|| Error::UnknownEngine(document.engine.clone()))?;

        if document.code.trim().is_empty() {
            document.code = format!("{}-{}", engine.name(), Utc::now().format("%Y%m%d%H%M%S"));
        }
        if !is_plain_name(&document.code) {
            return Err(Error::invalid_job(format!(
                "job code '{}' must be a plain directory name",
                document.code
            )));
        }
        if document.bucketsize == Some(0) {
            return Err(Error::invalid_job("bucketsize must be at least 1"));
        }

        info!(
            "Created job '{}' for engine {} ({} site(s))",
            document.code,
            engine.name(),
            document.sites.len()
        );
        Ok(Job {
            dir: self.work_dir.join(&document.code),
            dev: self.dev,
            document,
            engine,
        })
    }
}

/// Whether `name` is a single normal path component on every platform.
fn is_plain_name(name: &str) -> bool {
    name != "." && name != ".." && !name.contains(['/', '\\', ':'])
}

/// A job document as submitted to the farm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDocument {
    /// Job code, used as the task data directory name.
    #[serde(default)]
    pub code: String,
    /// Engine name.
    pub engine: String,
    /// Sites to spread the tasks over.
    #[serde(default)]
    pub sites: Vec<String>,
    /// Frames to compute, e.g. `1001-1100` or `1001-1010,1020`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    /// Frames per task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucketsize: Option<u64>,
    /// The compute section handed to every task.
    #[serde(default)]
    pub compute: Compute,
    /// Storage shares.
    #[serde(default)]
    pub shares: Vec<Share>,
}

/// One task of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Task number within the job.
    pub index: usize,
    /// The item to compute.
    pub item: Item,
    /// The site the task runs at.
    pub site: Option<String>,
}

/// A job ready to run.
#[derive(Debug)]
pub struct Job {
    document: JobDocument,
    engine: Box<dyn Engine>,
    dir: PathBuf,
    dev: bool,
}

impl Job {
    /// The job code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.document.code
    }

    /// The engine the job runs.
    #[must_use]
    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Directory holding the task data of this job.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Split the job into tasks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidItem`] if the range cannot be parsed and
    /// [`Error::InvalidJob`] if a frame based engine gets no range.
    pub fn tasks(&self) -> Result<Vec<Task>> {
        let settings = self.engine.settings();
        let items = if settings.items {
            let range = self
                .document
                .range
                .as_deref()
                .or(settings.default_range.as_deref())
                .ok_or_else(|| Error::invalid_job("no frame range given"))?;
            let mut size = self
                .document
                .bucketsize
                .or(settings.default_bucketsize)
                .unwrap_or(1);
            if let Some(max) = settings.max_bucketsize {
                size = size.min(max);
            }
            let items: Vec<Item> = parse_frame_list(range)?
                .iter()
                .flat_map(|range| range.buckets(size))
                .map(Item::Frames)
                .collect();
            if items.is_empty() {
                return Err(Error::invalid_job(format!("empty frame range '{range}'")));
            }
            items
        } else {
            vec![Item::All]
        };

        let sites = &self.document.sites;
        Ok(items
            .into_iter()
            .enumerate()
            .map(|(index, item)| Task {
                index,
                item,
                site: (!sites.is_empty()).then(|| sites[index % sites.len()].clone()),
            })
            .collect())
    }

    /// The compute data a task is handed.
    #[must_use]
    pub fn task_data(&self, task: &Task) -> ComputeData {
        ComputeData {
            compute: self.document.compute.clone(),
            site: task.site.clone().map(|code| Site { code }),
            shares: self.document.shares.clone(),
        }
    }

    /// Where the compute data of a task is written.
    #[must_use]
    pub fn task_data_path(&self, task: &Task) -> PathBuf {
        self.dir.join(task.index.to_string()).join("data.json")
    }

    /// Run every task in order, carrying on past failed ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the job cannot be split into tasks. Task failures
    /// are collected in the report instead.
    pub async fn run(&self, config: &Config) -> Result<JobReport> {
        let runner = Runner::new(config.clone());

        let tasks = self.tasks()?;
        let started = Utc::now();
        info!(
            "Running job '{}': {} task(s) with {}",
            self.code(),
            tasks.len(),
            self.engine.name()
        );

        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let error = self.run_task(&runner, task).await.err().map(|e| {
                warn!("Task {} ({}) failed: {e}", task.index, task.item);
                e.to_string()
            });
            outcomes.push(TaskOutcome {
                index: task.index,
                item: task.item.to_string(),
                site: task.site.clone(),
                error,
            });
        }

        let report = JobReport {
            code: self.code().to_string(),
            engine: self.engine.name().to_string(),
            started,
            finished: Utc::now(),
            tasks: outcomes,
        };
        info!(
            "Job '{}' done: {} completed, {} failed",
            report.code,
            report.completed(),
            report.failed()
        );
        Ok(report)
    }

    /// The engine context a task runs with; a dev session runs it in dev mode.
    #[must_use]
    pub fn task_context(&self, task: &Task, config: &Config) -> EngineContext {
        let mut config = config.clone();
        config.dev |= self.dev;
        EngineContext::new(
            self.engine.as_ref(),
            self.task_data(task),
            task.item.clone(),
            self.task_data_path(task),
            &config,
        )
    }

    async fn run_task(&self, runner: &Runner, task: &Task) -> Result<()> {
        let ctx = self.task_context(task, runner.config());
        self.task_data(task).save(&ctx.data_path)?;
        info!(
            "Task {}: item {} at site {}",
            task.index,
            task.item,
            task.site.as_deref().unwrap_or("-")
        );
        runner.run(self.engine.as_ref(), &ctx).await
    }
}

/// The outcome of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    /// Task number.
    pub index: usize,
    /// The item computed.
    pub item: String,
    /// The site it ran at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    /// Why the task failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a job run.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    /// Job code.
    pub code: String,
    /// Engine name.
    pub engine: String,
    /// When the first task started.
    pub started: DateTime<Utc>,
    /// When the last task finished.
    pub finished: DateTime<Utc>,
    /// Per task outcomes, in task order.
    pub tasks: Vec<TaskOutcome>,
}

impl JobReport {
    /// Number of tasks that completed.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.tasks.iter().filter(|t| t.error.is_none()).count()
    }

    /// Number of tasks that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.tasks.len() - self.completed()
    }

    /// Whether every task completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Turn failed tasks into [`Error::TaskFailed`].
    ///
    /// # Errors
    ///
    /// Returns an error if any task failed.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::TaskFailed {
                failed: self.failed(),
                total: self.tasks.len(),
            })
        }
    }
}
