//! Blender 3.1.2 background rendering.

use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::info;

use super::parameter_arguments;
use crate::engine::{CommandLine, Engine, EngineContext, EngineSettings, OutputEvent};
use crate::error::{Error, Result};
use crate::platform::{Os, Priority};

const BLENDER_VERSION: &str = "3.1.2";

/// Renders `.blend` files frame by frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blender;

impl Blender {
    const NAME: &'static str = "blender-3.1.2";
}

impl Engine for Blender {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn revision(&self) -> u32 {
        3
    }

    fn settings(&self) -> EngineSettings {
        EngineSettings {
            items: true,
            default_range: Some("1001-1100".to_string()),
            default_bucketsize: Some(1),
            filename_extensions: ".blend".to_string(),
            binary_filename_extensions: Some(".blend".to_string()),
            color: Some("217,121,35".to_string()),
            vendor: Some("blender.org".to_string()),
            ..EngineSettings::default()
        }
    }

    fn default_parameters(&self) -> Value {
        // `-b` is always passed first.
        json!({ "arguments": "" })
    }

    fn executable(&self, ctx: &EngineContext) -> Result<PathBuf> {
        let (root, parts): (&str, &[&str]) = match ctx.os {
            Os::Linux => ("/usr/local/blender", &["bin", "Blender"]),
            Os::Mac => ("/Applications/Blender.app", &["Contents", "MacOS", "Blender"]),
            Os::Windows => (
                r"C:\Program Files\Blender Foundation\Blender 3.1.2",
                &["Blender.exe"],
            ),
        };
        let root = ctx.install_root(root);
        Ok(ctx.os.join(&root.to_string_lossy(), parts))
    }

    fn prepare(&self, ctx: &EngineContext) -> Result<()> {
        let exe = self.resolved_executable(ctx)?;
        let installed = match ctx.os {
            Os::Mac => {
                let plist = exe
                    .parent()
                    .and_then(|macos| macos.parent())
                    .map(|contents| contents.join("Info.plist"));
                info!("Checking for Blender version string \"{BLENDER_VERSION}\" within {plist:?}");
                plist
                    .and_then(|p| std::fs::read_to_string(p).ok())
                    .is_some_and(|content| content.contains(BLENDER_VERSION))
            }
            Os::Linux | Os::Windows => exe.exists(),
        };
        if installed {
            Ok(())
        } else {
            Err(Error::VersionMismatch {
                engine: Self::NAME,
                expected: BLENDER_VERSION.to_string(),
            })
        }
    }

    fn commandline(&self, ctx: &EngineContext) -> Result<CommandLine> {
        let mut args = vec!["-b".to_string(), ctx.input(Self::NAME)?];
        if let Some(range) = ctx.item.frames() {
            if range.is_single() {
                args.extend(["-f".to_string(), range.start.to_string()]);
            } else {
                args.extend([
                    "-s".to_string(),
                    range.start.to_string(),
                    "-e".to_string(),
                    range.end.to_string(),
                    "-a".to_string(),
                ]);
            }
        }
        if let Some(output) = ctx.output() {
            args.extend(["-o".to_string(), output]);
        }
        args.extend(parameter_arguments(ctx));

        Ok(CommandLine::new(self.resolved_executable(ctx)?).args(args))
    }

    fn priority(&self, _ctx: &EngineContext) -> Option<Priority> {
        Some(Priority::Normal)
    }

    fn parse_output(&self, line: &str) -> Option<OutputEvent> {
        let rest = line.strip_prefix("Fra:")?;
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok().map(OutputEvent::FrameStarted)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::Config;
    use crate::engines::testing::{context, install_root_config, touch};

    #[test]
    fn test_commandline_range() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            &Blender,
            json!({ "compute": {
                "input": "/mnt/projects/shot.blend",
                "output": "/mnt/projects/render/shot_####",
                "parameters": { "arguments": "-F OPEN_EXR" }
            } }),
            "1001-1010",
            dir.path(),
            &Config::default(),
            Os::Linux,
        );

        let cmd = Blender.commandline(&ctx).unwrap();
        assert_eq!(cmd.program, PathBuf::from("/usr/local/blender/bin/Blender"));
        assert_eq!(
            cmd.args,
            vec![
                "-b",
                "/mnt/projects/shot.blend",
                "-s",
                "1001",
                "-e",
                "1010",
                "-a",
                "-o",
                "/mnt/projects/render/shot_####",
                "-F",
                "OPEN_EXR"
            ]
        );
    }

    #[test]
    fn test_commandline_single_frame() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            &Blender,
            json!({ "compute": { "input": "/mnt/projects/shot.blend" } }),
            "1001",
            dir.path(),
            &Config::default(),
            Os::Linux,
        );

        let cmd = Blender.commandline(&ctx).unwrap();
        assert_eq!(cmd.args, vec!["-b", "/mnt/projects/shot.blend", "-f", "1001"]);
    }

    #[test]
    fn test_windows_executable() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&Blender, json!({}), "all", dir.path(), &Config::default(), Os::Windows);
        assert_eq!(
            Blender.executable(&ctx).unwrap(),
            PathBuf::from(r"C:\Program Files\Blender Foundation\Blender 3.1.2\Blender.exe")
        );
    }

    #[test]
    fn test_prepare_checks_mac_version() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("Blender.app");
        touch(&app.join("Contents").join("MacOS").join("Blender"));
        let plist = app.join("Contents").join("Info.plist");
        std::fs::write(&plist, "<string>3.0.1</string>").unwrap();

        let config = install_root_config("blender-3.1.2", &app);
        let ctx = context(&Blender, json!({}), "all", dir.path(), &config, Os::Mac);
        assert!(matches!(
            Blender.prepare(&ctx),
            Err(Error::VersionMismatch { .. })
        ));

        std::fs::write(&plist, "<string>3.1.2</string>").unwrap();
        assert!(Blender.prepare(&ctx).is_ok());
    }

    #[test]
    fn test_parse_output() {
        assert_eq!(
            Blender.parse_output("Fra:1001 Mem:12.38M (Peak 12.40M) | Time:00:00.10"),
            Some(OutputEvent::FrameStarted(1001))
        );
        assert_eq!(Blender.parse_output("Blender quit"), None);
    }
}
