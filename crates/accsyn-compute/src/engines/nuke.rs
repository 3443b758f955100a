//! Foundry Nuke, rendering comps per frame bucket or running Python scripts.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::{info, warn};

use super::{last_number, parameter_arguments};
use crate::engine::{CommandLine, Engine, EngineContext, EngineSettings, OutputEvent};
use crate::error::Result;
use crate::paths::convert_path;
use crate::platform::{find_executable_in, find_versioned_install, Os};

/// Renders Nuke scripts frame range by frame range.
#[derive(Debug, Clone, Copy)]
pub struct Nuke {
    name: &'static str,
    major: &'static str,
    revision: u32,
}

impl Nuke {
    /// Nuke 12.
    #[must_use]
    pub const fn v12() -> Self {
        Self {
            name: "nuke-12",
            major: "12",
            revision: 2,
        }
    }

    /// Nuke 13.
    #[must_use]
    pub const fn v13() -> Self {
        Self {
            name: "nuke-13",
            major: "13",
            revision: 4,
        }
    }
}

impl Engine for Nuke {
    fn name(&self) -> &'static str {
        self.name
    }

    fn revision(&self) -> u32 {
        self.revision
    }

    fn settings(&self) -> EngineSettings {
        EngineSettings {
            items: true,
            default_range: Some("1001-1100".to_string()),
            default_bucketsize: Some(5),
            filename_extensions: ".nk".to_string(),
            binary_filename_extensions: Some(String::new()),
            ..EngineSettings::default()
        }
    }

    fn default_parameters(&self) -> Value {
        json!({ "arguments": ["-txV"] })
    }

    fn executable(&self, ctx: &EngineContext) -> Result<PathBuf> {
        let preferred = ctx
            .input(self.name)
            .ok()
            .and_then(|input| script_version(Path::new(&input)));
        nuke_executable(self.name, ctx, self.major, preferred.as_deref())
    }

    fn commandline(&self, ctx: &EngineContext) -> Result<CommandLine> {
        let mut args = parameter_arguments(ctx);
        if let Some(range) = ctx.item.frames() {
            args.push("-F".to_string());
            args.push(format!("{}-{}", range.start, range.end));
        }
        args.push(convert_path(&ctx.input(self.name)?));

        Ok(CommandLine::new(self.resolved_executable(ctx)?).args(args))
    }

    fn parse_output(&self, line: &str) -> Option<OutputEvent> {
        parse_nuke_output(line)
    }
}

/// Runs Python scripts with Nuke in terminal mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct NukeScript;

impl NukeScript {
    const NAME: &'static str = "nuke-script-13";
}

impl Engine for NukeScript {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn revision(&self) -> u32 {
        2
    }

    fn settings(&self) -> EngineSettings {
        EngineSettings {
            items: false,
            filename_extensions: ".py".to_string(),
            binary_filename_extensions: Some(String::new()),
            ..EngineSettings::default()
        }
    }

    fn default_parameters(&self) -> Value {
        json!({ "arguments": ["-tV"], "script_arguments": [] })
    }

    fn executable(&self, ctx: &EngineContext) -> Result<PathBuf> {
        nuke_executable(Self::NAME, ctx, "13", None)
    }

    fn commandline(&self, ctx: &EngineContext) -> Result<CommandLine> {
        let mut args = parameter_arguments(ctx);
        args.push(convert_path(&ctx.input(Self::NAME)?));
        args.extend(ctx.parameters().string_list("script_arguments"));

        Ok(CommandLine::new(self.resolved_executable(ctx)?).args(args))
    }

    fn parse_output(&self, line: &str) -> Option<OutputEvent> {
        parse_nuke_output(line)
    }
}

fn default_install_root(os: Os) -> &'static str {
    match os {
        Os::Linux => "/usr/local",
        Os::Mac => "/Applications",
        Os::Windows => r"C:\Program Files",
    }
}

/// Find the Nuke executable, preferring the install matching `preferred` (e.g. `13.1v2`).
fn nuke_executable(
    engine: &'static str,
    ctx: &EngineContext,
    major: &str,
    preferred: Option<&str>,
) -> Result<PathBuf> {
    let prefix = format!("Nuke{major}");
    let base = ctx.install_root(default_install_root(ctx.os));
    let preferred = preferred.map(|version| format!("Nuke{version}"));
    let app = find_versioned_install(engine, &base, &prefix, None, preferred.as_deref())?;

    let search = match (ctx.os, app.file_name().and_then(|n| n.to_str())) {
        (Os::Mac, Some(dirname)) => app
            .join(format!("{dirname}.app"))
            .join("Contents")
            .join("MacOS"),
        _ => app.clone(),
    };
    find_executable_in(engine, &search, &prefix, ctx.os)
}

/// The Nuke version a script was saved with, from its `version 13.1 v2` line.
fn script_version(path: &Path) -> Option<String> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            warn!("Could not read Nuke version from {}: {e}", path.display());
            return None;
        }
    };
    let version = BufReader::new(file)
        .lines()
        .map_while(std::result::Result::ok)
        .find_map(|line| {
            line.strip_prefix("version ")
                .map(|v| v.replace(' ', "").trim().to_string())
        })?;
    info!("Parsed Nuke version: \"{version}\"");
    Some(version)
}

fn parse_nuke_output(line: &str) -> Option<OutputEvent> {
    if line.contains("Writing") && line.contains("took") {
        let end = line.rfind("took")?;
        let start = line[..end].rfind(['/', '\\'])?;
        return last_number(&line[start..end]).map(OutputEvent::FrameStarted);
    }
    line.contains("Total render time:")
        .then_some(OutputEvent::RenderFinished)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::engines::testing::{context, install_root_config, touch};

    fn fake_installs(root: &Path) {
        touch(&root.join("Nuke13.0v1").join("Nuke13.0"));
        touch(&root.join("Nuke13.1v2").join("Nuke13.1"));
        touch(&root.join("Nuke12.2v5").join("Nuke12.2"));
    }

    #[test]
    fn test_commandline_frame_bucket() {
        let dir = tempfile::tempdir().unwrap();
        fake_installs(dir.path());
        let script = dir.path().join("comp.nk");
        std::fs::write(&script, "#! /usr/local/Nuke13.1v2/libnuke-13.1.2.so -nx\nversion 13.1 v2\n").unwrap();

        let engine = Nuke::v13();
        let config = install_root_config("nuke-13", dir.path());
        let ctx = context(
            &engine,
            json!({ "compute": { "input": script.to_str().unwrap() } }),
            "1001-1005",
            dir.path(),
            &config,
            Os::Linux,
        );

        let cmd = engine.commandline(&ctx).unwrap();
        assert_eq!(cmd.program, dir.path().join("Nuke13.1v2").join("Nuke13.1"));
        assert_eq!(
            cmd.args,
            vec!["-txV", "-F", "1001-1005", script.to_str().unwrap()]
        );
    }

    #[test]
    fn test_executable_falls_back_on_latest() {
        let dir = tempfile::tempdir().unwrap();
        fake_installs(dir.path());
        let script = dir.path().join("comp.nk");
        std::fs::write(&script, "version 13.2 v1\n").unwrap();

        let engine = Nuke::v13();
        let config = install_root_config("nuke-13", dir.path());
        let ctx = context(
            &engine,
            json!({ "compute": { "input": script.to_str().unwrap(), "parameters": { "arguments": "-x" } } }),
            "all",
            dir.path(),
            &config,
            Os::Linux,
        );

        let cmd = engine.commandline(&ctx).unwrap();
        assert_eq!(cmd.program, dir.path().join("Nuke13.1v2").join("Nuke13.1"));
        assert_eq!(cmd.args, vec!["-x", script.to_str().unwrap()]);
    }

    #[test]
    fn test_executable_mac_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir
            .path()
            .join("Nuke12.2v5")
            .join("Nuke12.2v5.app")
            .join("Contents")
            .join("MacOS")
            .join("Nuke12.2");
        touch(&exe);

        let engine = Nuke::v12();
        let config = install_root_config("nuke-12", dir.path());
        let ctx = context(&engine, json!({}), "all", dir.path(), &config, Os::Mac);
        assert_eq!(engine.executable(&ctx).unwrap(), exe);
    }

    #[test]
    fn test_missing_install() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Nuke::v13();
        let config = install_root_config("nuke-13", dir.path());
        let ctx = context(&engine, json!({}), "all", dir.path(), &config, Os::Linux);
        assert!(engine.probe(&ctx).unwrap_err().is_not_installed());
    }

    #[test]
    fn test_script_commandline() {
        let dir = tempfile::tempdir().unwrap();
        fake_installs(dir.path());
        let engine = NukeScript;
        let config = install_root_config("nuke-script-13", dir.path());
        let ctx = context(
            &engine,
            json!({ "compute": {
                "input": "/mnt/scripts/publish.py",
                "parameters": { "script_arguments": ["--shot", "sc045"] }
            } }),
            "all",
            dir.path(),
            &config,
            Os::Linux,
        );

        let cmd = engine.commandline(&ctx).unwrap();
        assert_eq!(
            cmd.args,
            vec!["-tV", "/mnt/scripts/publish.py", "--shot", "sc045"]
        );
    }

    #[test]
    fn test_parse_output() {
        let writing = "Writing J:/pat/render/pat_v0001.01011.exr took 3.31 seconds";
        assert_eq!(
            parse_nuke_output(writing),
            Some(OutputEvent::FrameStarted(1011))
        );
        assert_eq!(
            parse_nuke_output("Total render time: 21 seconds"),
            Some(OutputEvent::RenderFinished)
        );
        assert_eq!(
            parse_nuke_output("Writing J:/pat/render/pat_v0001.01011.exr .1.3.6.8"),
            None
        );
        assert_eq!(parse_nuke_output("Frame 1010 (2 of 5)"), None);
    }
}
