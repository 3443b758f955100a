//! The engine abstraction.
//!
//! An engine knows how to drive one render application: where it is
//! installed, how to build its command line from compute data, and how to
//! read its output. Engines that do their work in-process (checksumming,
//! fake rendering) override [`Engine::execute`] instead of spawning.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{Config, EngineOverride};
use crate::data::{ComputeData, Parameters};
use crate::error::{Error, Result};
use crate::item::Item;
use crate::paths::PathNormalizer;
use crate::platform::{Os, Priority};
use crate::runner::Runner;

/// Something an engine recognised in its application's output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputEvent {
    /// The application started or finished writing a frame.
    FrameStarted(i64),
    /// Overall progress in percent.
    Progress(f32),
    /// The application reported the render complete; it should exit shortly.
    RenderFinished,
}

/// A transcoding profile offered by an engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// Arguments substituted for `${PROFILE}`.
    pub arguments: String,
    /// Human readable description.
    pub description: String,
    /// Suffix appended to the output file name; may use `${PROFILE_NAME}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    /// Output file extension, including the dot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// Output location used when the job gives none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_output: Option<String>,
    /// Run the application from within the output directory.
    pub chdir_output: bool,
    /// Do not append an output file path; the arguments name outputs themselves.
    pub no_append_output: bool,
    /// Write into a subdirectory named after the input.
    pub output_directory: bool,
}

/// Engine behaviour published to the farm backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Whether the job is split into items (frames).
    pub items: bool,
    /// Frame range used when the job gives none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_range: Option<String>,
    /// Frames per task used when the job gives none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_bucketsize: Option<u64>,
    /// Upper bound on frames per task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bucketsize: Option<u64>,
    /// Comma separated input file extensions.
    pub filename_extensions: String,
    /// Input extensions that are binary and must not be path converted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_filename_extensions: Option<String>,
    /// Whether a job may carry several inputs.
    pub multiple_inputs: bool,
    /// Whether inputs are binary media.
    pub binary: bool,
    /// Whether the output location must not be modified by the engine.
    pub output_readonly: bool,
    /// Engine category, e.g. `transcode`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Display colour as `r,g,b`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Vendor of the driven application.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    /// Transcoding profiles.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, Profile>,
}

/// A fully resolved process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// The executable.
    pub program: PathBuf,
    /// Arguments, without the program.
    pub args: Vec<String>,
    /// Directory to run in, if not the current one.
    pub working_dir: Option<PathBuf>,
}

impl CommandLine {
    /// Create a command line for `program` with no arguments yet.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Whether there is nothing to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.program.as_os_str().is_empty()
    }

    /// Program and arguments as strings, for logging.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_vec())
    }
}

/// Everything an engine needs to know about the task at hand.
#[derive(Debug, Clone)]
pub struct EngineContext {
    /// The compute data, with engine default parameters filled in.
    pub data: ComputeData,
    /// The item to compute.
    pub item: Item,
    /// The platform to build paths and command lines for.
    pub os: Os,
    /// Development mode.
    pub dev: bool,
    /// Where the compute data was loaded from.
    pub data_path: PathBuf,
    /// Share based path conversion for `os`.
    pub normalizer: PathNormalizer,
    /// Site specific overrides for this engine.
    pub overrides: EngineOverride,
}

impl EngineContext {
    /// Build the context for running `engine` on `data`.
    #[must_use]
    pub fn new(
        engine: &(impl Engine + ?Sized),
        mut data: ComputeData,
        item: Item,
        data_path: impl Into<PathBuf>,
        config: &Config,
    ) -> Self {
        data.compute
            .parameters
            .merge_defaults(&engine.default_parameters());
        let os = Os::current();
        Self {
            normalizer: PathNormalizer::new(data.shares.clone(), os),
            data,
            item,
            os,
            dev: config.dev,
            data_path: data_path.into(),
            overrides: config
                .engine_override(engine.name())
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Target another platform; used to build command lines for foreign nodes.
    #[must_use]
    pub fn with_os(mut self, os: Os) -> Self {
        self.os = os;
        self.normalizer = PathNormalizer::new(self.data.shares.clone(), os);
        self
    }

    /// The engine parameters.
    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.data.compute.parameters
    }

    /// Convert a path to the local platform.
    #[must_use]
    pub fn normalize(&self, path: &str) -> String {
        self.normalizer.normalize(path)
    }

    /// The input path converted to the local platform.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParameter`] if the data has no input.
    pub fn input(&self, engine: &'static str) -> Result<String> {
        Ok(self.normalize(self.data.input(engine)?))
    }

    /// The output path converted to the local platform, if any.
    #[must_use]
    pub fn output(&self) -> Option<String> {
        self.data
            .compute
            .output
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|p| self.normalize(p))
    }

    /// Root directory to search for versioned installs.
    #[must_use]
    pub fn install_root(&self, default: &str) -> PathBuf {
        self.overrides
            .install_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(default))
    }

    /// The directory holding the compute data.
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        ComputeData::sidecar_dir(&self.data_path)
    }

    /// The compute data as pretty JSON, in development mode only.
    #[must_use]
    pub fn dev_dump(&self) -> Option<String> {
        self.dev
            .then(|| serde_json::to_string_pretty(&self.data).unwrap_or_default())
    }

    /// Fail with [`Error::UnsupportedOs`] unless running on one of `supported`.
    ///
    /// # Errors
    ///
    /// Returns an error if the current platform is not supported.
    pub fn require_os(&self, engine: &'static str, supported: &[Os]) -> Result<()> {
        if supported.contains(&self.os) {
            Ok(())
        } else {
            Err(Error::UnsupportedOs {
                engine,
                os: self.os.to_string(),
            })
        }
    }
}

/// A render application driver.
#[async_trait::async_trait]
pub trait Engine: Send + Sync + fmt::Debug {
    /// Unique engine name, e.g. `nuke-13`.
    fn name(&self) -> &'static str;

    /// Revision of the engine implementation.
    fn revision(&self) -> u32;

    /// Behaviour published to the farm backend.
    fn settings(&self) -> EngineSettings;

    /// Parameters used when the job does not give them.
    fn default_parameters(&self) -> Value {
        json!({})
    }

    /// Path of the application executable on this platform.
    ///
    /// # Errors
    ///
    /// Returns an error if the application is not installed or the platform is
    /// not supported.
    fn executable(&self, ctx: &EngineContext) -> Result<PathBuf>;

    /// The executable, honouring a configured override.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Engine::executable`].
    fn resolved_executable(&self, ctx: &EngineContext) -> Result<PathBuf> {
        match &ctx.overrides.executable {
            Some(path) => Ok(path.clone()),
            None => self.executable(ctx),
        }
    }

    /// Build the command line for the context's item.
    ///
    /// # Errors
    ///
    /// Returns an error if required data is missing or the application is not found.
    fn commandline(&self, ctx: &EngineContext) -> Result<CommandLine>;

    /// Additional environment variables for the process.
    fn envs(&self, _ctx: &EngineContext) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Text to send to the process on stdin.
    fn stdin(&self, _ctx: &EngineContext) -> Option<String> {
        None
    }

    /// Process priority.
    fn priority(&self, _ctx: &EngineContext) -> Option<Priority> {
        None
    }

    /// Setup before the command line is built.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not fit to run the task.
    fn prepare(&self, _ctx: &EngineContext) -> Result<()> {
        Ok(())
    }

    /// Check that the application is installed, returning its executable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstallNotFound`] if it is not.
    fn probe(&self, ctx: &EngineContext) -> Result<PathBuf> {
        let exe = self.resolved_executable(ctx)?;
        if exe.exists() {
            Ok(exe)
        } else {
            Err(Error::install_not_found(
                self.name(),
                format!("'{}' does not exist", exe.display()),
            ))
        }
    }

    /// Interpret one line of application output.
    fn parse_output(&self, _line: &str) -> Option<OutputEvent> {
        None
    }

    /// Compute the task. The default spawns the command line through `runner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the computation fails.
    async fn execute(&self, ctx: &EngineContext, runner: &Runner) -> Result<()> {
        runner.run_process(self, ctx).await
    }
}

/// What `describe` prints for an engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineDescription {
    /// Engine name.
    pub name: &'static str,
    /// Engine revision.
    pub revision: u32,
    /// Published settings.
    pub settings: EngineSettings,
    /// Default parameters.
    pub parameters: Value,
}

impl EngineDescription {
    /// Describe `engine`.
    #[must_use]
    pub fn of(engine: &(impl Engine + ?Sized)) -> Self {
        Self {
            name: engine.name(),
            revision: engine.revision(),
            settings: engine.settings(),
            parameters: engine.default_parameters(),
        }
    }
}

/// Whether `path` is a file with one of the comma separated `extensions`.
#[must_use]
pub fn has_extension(path: &Path, extensions: &str) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .split(',')
        .map(|e| e.trim().trim_start_matches('.'))
        .any(|e| e.eq_ignore_ascii_case(ext))
}
