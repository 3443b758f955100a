//! Hosts an accsyn server daemon as a long running compute task.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::info;

use super::parameter_arguments;
use crate::engine::{CommandLine, Engine, EngineContext, EngineSettings};
use crate::error::{Error, Result};
use crate::platform::Os;

const ROOT_PATH_ENV: &str = "AS_ROOT_PATH";
const WORKSPACE_ENV: &str = "AS_WORKSPACE";

/// Runs the accsyn daemon.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccsynServer;

impl AccsynServer {
    const NAME: &'static str = "accsyn-server";

    /// A variable from the engine's configured envs, else from our environment.
    fn env(ctx: &EngineContext, key: &str) -> Option<String> {
        ctx.overrides
            .envs
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
            .filter(|v| !v.is_empty())
    }
}

impl Engine for AccsynServer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn revision(&self) -> u32 {
        2
    }

    fn settings(&self) -> EngineSettings {
        EngineSettings {
            items: false,
            multiple_inputs: true,
            binary: true,
            kind: Some("hosting".to_string()),
            color: Some("36,65,85".to_string()),
            vendor: Some("accsyn.com".to_string()),
            ..EngineSettings::default()
        }
    }

    fn default_parameters(&self) -> Value {
        json!({ "arguments": "daemon" })
    }

    fn executable(&self, ctx: &EngineContext) -> Result<PathBuf> {
        ctx.require_os(Self::NAME, &[Os::Linux])?;
        let root = ctx.install_root("/usr/local/accsyn");
        Ok(root.join("accsyn"))
    }

    fn prepare(&self, ctx: &EngineContext) -> Result<()> {
        ctx.require_os(Self::NAME, &[Os::Linux])?;
        let root = Self::env(ctx, ROOT_PATH_ENV)
            .ok_or_else(|| Error::missing_parameter(Self::NAME, ROOT_PATH_ENV))?;
        let workspace = Self::env(ctx, WORKSPACE_ENV);
        prepare_root(Path::new(&root), workspace.as_deref())
    }

    fn commandline(&self, ctx: &EngineContext) -> Result<CommandLine> {
        ctx.require_os(Self::NAME, &[Os::Linux])?;
        let args = parameter_arguments(ctx);
        if args.is_empty() {
            return Err(Error::missing_parameter(Self::NAME, "arguments"));
        }
        info!("Running accsyn daemon, args: {args:?}");
        Ok(CommandLine::new(self.resolved_executable(ctx)?).args(args))
    }
}

/// Create the storage directory, and the workspace directory on first run.
fn prepare_root(root: &Path, workspace: Option<&str>) -> Result<()> {
    let storage = root.join("storage");
    if storage.exists() {
        return Ok(());
    }
    create_dir(&storage)?;
    info!("Created storage directory: {}", storage.display());
    if let Some(workspace) = workspace {
        create_dir(&root.join(workspace))?;
    }
    Ok(())
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| Error::DirectoryCreate {
        path: path.to_path_buf(),
        source,
    })
}
