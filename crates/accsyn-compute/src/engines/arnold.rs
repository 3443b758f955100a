//! Autodesk Arnold 7 standalone (`kick`), rendering `.ass` scene files.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use super::{last_number, parameter_arguments};
use crate::engine::{CommandLine, Engine, EngineContext, EngineSettings, OutputEvent};
use crate::error::Result;
use crate::item::format_frame;
use crate::platform::Os;

/// Renders one `.ass` file per frame with `kick`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Arnold;

impl Arnold {
    const NAME: &'static str = "arnold-7";
}

fn progress_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\|\s+(\d+)% done").expect("progress pattern is valid"))
}

impl Engine for Arnold {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn revision(&self) -> u32 {
        2
    }

    fn settings(&self) -> EngineSettings {
        EngineSettings {
            items: true,
            default_range: Some("1001-1100".to_string()),
            default_bucketsize: Some(1),
            max_bucketsize: Some(1),
            filename_extensions: ".ass".to_string(),
            output_readonly: true,
            color: Some("160,255,180".to_string()),
            vendor: Some("Autodesk".to_string()),
            ..EngineSettings::default()
        }
    }

    fn default_parameters(&self) -> Value {
        json!({ "arguments": "-dw -nstdin -v 2" })
    }

    fn executable(&self, ctx: &EngineContext) -> Result<PathBuf> {
        let root = match ctx.os {
            Os::Linux => "/usr/autodesk/arnold/maya2023",
            Os::Mac => "/Applications/Autodesk/Arnold/maya2023",
            Os::Windows => r"C:\Program Files\Autodesk\Arnold\maya2023",
        };
        let kick = if ctx.os == Os::Windows { "kick.exe" } else { "kick" };
        let root = ctx.install_root(root);
        Ok(ctx.os.join(&root.to_string_lossy(), &["bin", kick]))
    }

    fn commandline(&self, ctx: &EngineContext) -> Result<CommandLine> {
        let frame = ctx.item.single_frame()?;
        let input = format_frame(ctx.data.input(Self::NAME)?, frame);

        Ok(CommandLine::new(self.resolved_executable(ctx)?)
            .arg("-i")
            .arg(ctx.normalize(&input))
            .args(parameter_arguments(ctx)))
    }

    fn parse_output(&self, line: &str) -> Option<OutputEvent> {
        if let Some(caps) = progress_regex().captures(line) {
            return caps[1].parse().ok().map(OutputEvent::Progress);
        }
        if line.contains("[driver_") && line.contains("writing file") {
            let start = line.rfind(['/', '\\'])?;
            return last_number(&line[start..]).map(OutputEvent::FrameStarted);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::Config;
    use crate::engines::testing::context;

    #[test]
    fn test_commandline() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            &Arnold,
            json!({
                "compute": { "input": "J:/pat/ass/5minTest.%04d.ass" },
                "shares": [{ "id": "s1", "code": "pat", "paths": { "windows": "J:/pat", "linux": "/mnt/pat" } }]
            }),
            "1",
            dir.path(),
            &Config::default(),
            Os::Linux,
        );

        let cmd = Arnold.commandline(&ctx).unwrap();
        assert_eq!(
            cmd.program,
            PathBuf::from("/usr/autodesk/arnold/maya2023/bin/kick")
        );
        assert_eq!(
            cmd.args,
            vec!["-i", "/mnt/pat/ass/5minTest.0001.ass", "-dw", "-nstdin", "-v", "2"]
        );
    }

    #[test]
    fn test_windows_executable() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&Arnold, json!({}), "all", dir.path(), &Config::default(), Os::Windows);
        assert_eq!(
            Arnold.executable(&ctx).unwrap(),
            PathBuf::from(r"C:\Program Files\Autodesk\Arnold\maya2023\bin\kick.exe")
        );
    }

    #[test]
    fn test_parse_output() {
        assert_eq!(
            Arnold.parse_output("00:19:36 49197MB         |    50% done - 1198 rays/pixel"),
            Some(OutputEvent::Progress(50.0))
        );
        assert_eq!(
            Arnold.parse_output(
                "00:21:54 49262MB         |  [driver_exr] writing file `J:/pat/render/pat_v0003_Canyon.1009.exr'"
            ),
            Some(OutputEvent::FrameStarted(1009))
        );
        assert_eq!(
            Arnold.parse_output("00:21:54 49262MB         |  render done in 6:59.988"),
            None
        );
    }
}
