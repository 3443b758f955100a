//! Chaos V-Ray 5 through the Maya 2022 batch renderer.

use std::path::PathBuf;

use serde_json::{json, Value};

use super::parameter_arguments;
use crate::engine::{CommandLine, Engine, EngineContext, EngineSettings};
use crate::error::{Error, Result};
use crate::platform::{Os, Priority};

const SUPPORTED: &[Os] = &[Os::Linux, Os::Windows];

/// Renders Maya scenes with V-Ray.
#[derive(Debug, Clone, Copy, Default)]
pub struct VRay;

impl VRay {
    const NAME: &'static str = "vray-5-maya-2022";

    fn maya_root(ctx: &EngineContext) -> Result<String> {
        ctx.require_os(Self::NAME, SUPPORTED)?;
        let root = match ctx.os {
            Os::Windows => r"C:\Program Files\Autodesk\Maya2022",
            Os::Linux | Os::Mac => "/usr/autodesk/maya2022",
        };
        Ok(ctx.install_root(root).to_string_lossy().into_owned())
    }
}

impl Engine for VRay {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn revision(&self) -> u32 {
        1
    }

    fn settings(&self) -> EngineSettings {
        EngineSettings {
            items: true,
            default_range: Some("1001-1100".to_string()),
            default_bucketsize: Some(1),
            filename_extensions: ".ma,.mb".to_string(),
            binary_filename_extensions: Some(".mb".to_string()),
            ..EngineSettings::default()
        }
    }

    fn default_parameters(&self) -> Value {
        json!({ "project": "", "arguments": "-r vray" })
    }

    fn executable(&self, ctx: &EngineContext) -> Result<PathBuf> {
        let root = Self::maya_root(ctx)?;
        let render = if ctx.os == Os::Windows { "Render.exe" } else { "Render" };
        Ok(ctx.os.join(&root, &["bin", render]))
    }

    fn prepare(&self, ctx: &EngineContext) -> Result<()> {
        let root = Self::maya_root(ctx)?;
        if ctx.os == Os::Windows {
            let dll = ctx.os.join(&root, &["vray", "bin", "vray.dll"]);
            if !dll.exists() {
                return Err(Error::install_not_found(
                    Self::NAME,
                    format!("V-Ray for Maya not properly installed (missing: '{}')", dll.display()),
                ));
            }
        }
        Ok(())
    }

    fn commandline(&self, ctx: &EngineContext) -> Result<CommandLine> {
        ctx.require_os(Self::NAME, SUPPORTED)?;
        let parameters = ctx.parameters();

        let mut args = parameter_arguments(ctx);
        if let Some(project) = parameters.string("project") {
            args.extend(["-proj".to_string(), ctx.normalize(project)]);
        }
        if let Some(layer) = parameters.string("renderlayer") {
            args.extend(["-rl".to_string(), layer.to_string()]);
        }
        if let Some(range) = ctx.item.frames() {
            args.extend([
                "-s".to_string(),
                range.start.to_string(),
                "-e".to_string(),
                range.end.to_string(),
            ]);
        }
        if let Some(output) = ctx.output() {
            args.extend(["-rd".to_string(), output]);
        }
        args.push(ctx.input(Self::NAME)?);

        Ok(CommandLine::new(self.resolved_executable(ctx)?).args(args))
    }

    fn priority(&self, _ctx: &EngineContext) -> Option<Priority> {
        Some(Priority::Normal)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::Config;
    use crate::engines::testing::context;

    fn shares() -> Value {
        json!([{ "id": "s1", "code": "projects", "paths": { "windows": "P:/", "linux": "/mnt/projects/" } }])
    }

    #[test]
    fn test_commandline() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            &VRay,
            json!({
                "compute": {
                    "input": "P:/pat/maya/scenes/sc045.mb",
                    "output": "P:/pat/render/sc045",
                    "parameters": { "project": "P:/pat/maya", "renderlayer": "beauty" }
                },
                "shares": shares()
            }),
            "1001-1003",
            dir.path(),
            &Config::default(),
            Os::Linux,
        );

        let cmd = VRay.commandline(&ctx).unwrap();
        assert_eq!(cmd.program, PathBuf::from("/usr/autodesk/maya2022/bin/Render"));
        assert_eq!(
            cmd.args,
            vec![
                "-r",
                "vray",
                "-proj",
                "/mnt/projects/pat/maya",
                "-rl",
                "beauty",
                "-s",
                "1001",
                "-e",
                "1003",
                "-rd",
                "/mnt/projects/pat/render/sc045",
                "/mnt/projects/pat/maya/scenes/sc045.mb"
            ]
        );
    }

    #[test]
    fn test_mac_not_supported() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            &VRay,
            json!({ "compute": { "input": "/Volumes/projects/sc045.mb" } }),
            "1001",
            dir.path(),
            &Config::default(),
            Os::Mac,
        );
        assert!(matches!(
            VRay.commandline(&ctx),
            Err(Error::UnsupportedOs { .. })
        ));
        assert!(VRay.executable(&ctx).is_err());
    }

    #[test]
    fn test_prepare_windows_requires_dll() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.engines.insert(
            "vray-5-maya-2022".to_string(),
            crate::config::EngineOverride {
                install_root: Some(dir.path().join("Maya2022")),
                ..Default::default()
            },
        );
        let ctx = context(&VRay, json!({}), "all", dir.path(), &config, Os::Windows);
        assert!(VRay.prepare(&ctx).unwrap_err().is_not_installed());
    }
}
