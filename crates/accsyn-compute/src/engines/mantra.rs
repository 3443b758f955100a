//! SideFX Houdini Mantra, rendering IFD sequences one frame per task.

use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::parameter_arguments;
use crate::engine::{CommandLine, Engine, EngineContext, EngineSettings, OutputEvent};
use crate::error::Result;
use crate::item::format_frame;
use crate::platform::{find_versioned_install, Os, Priority};

/// Renders Mantra IFD files.
#[derive(Debug, Clone, Copy)]
pub struct Mantra {
    name: &'static str,
    version: &'static str,
    revision: u32,
}

impl Mantra {
    /// Mantra from Houdini 18.5.
    #[must_use]
    pub const fn v18_5() -> Self {
        Self {
            name: "mantra-18.5",
            version: "18.5",
            revision: 4,
        }
    }

    /// Mantra from Houdini 19.0.
    #[must_use]
    pub const fn v19_0() -> Self {
        Self {
            name: "mantra-19.0",
            version: "19.0",
            revision: 3,
        }
    }
}

impl Engine for Mantra {
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
            default_bucketsize: Some(1),
            max_bucketsize: Some(1),
            filename_extensions: ".ifd".to_string(),
            color: Some("229,76,27".to_string()),
            vendor: Some("SideFX Software".to_string()),
            ..EngineSettings::default()
        }
    }

    fn default_parameters(&self) -> Value {
        json!({ "arguments": "-V 2p" })
    }

    fn executable(&self, ctx: &EngineContext) -> Result<PathBuf> {
        if ctx.dev {
            warn!("Houdini dev app not supported on {} yet!", ctx.os);
        }
        let (base, prefix) = match ctx.os {
            Os::Linux => ("/opt", "hfs"),
            Os::Mac => ("/Applications/Houdini", "Houdini"),
            Os::Windows => (r"C:\Program Files\Side Effects Software", "Houdini "),
        };
        let base = ctx.install_root(base);
        let filter = format!("{}.", self.version);
        let app = find_versioned_install(self.name, &base, prefix, Some(&filter), None)?;
        let app = app.to_string_lossy();

        Ok(match ctx.os {
            Os::Linux => ctx.os.join(&app, &["bin", "mantra"]),
            Os::Mac => ctx.os.join(
                &app,
                &[
                    "Frameworks",
                    "Houdini.framework",
                    "Versions",
                    self.version,
                    "Resources",
                    "bin",
                    "mantra",
                ],
            ),
            Os::Windows => ctx.os.join(&app, &["bin", "mantra.exe"]),
        })
    }

    fn commandline(&self, ctx: &EngineContext) -> Result<CommandLine> {
        let frame = ctx.item.single_frame()?;
        let input = format_frame(ctx.data.input(self.name)?, frame);

        let mut args = parameter_arguments(ctx);
        if let Some(output) = ctx.data.compute.output.as_deref().filter(|o| !o.is_empty()) {
            let output = ctx.normalizer.normalize_mkdirs(output)?;
            debug!("Rendering to '{output}'");
        }
        args.push("-f".to_string());
        args.push(ctx.normalize(&input));

        Ok(CommandLine::new(self.resolved_executable(ctx)?).args(args))
    }

    fn priority(&self, _ctx: &EngineContext) -> Option<Priority> {
        Some(Priority::BelowNormal)
    }

    fn parse_output(&self, line: &str) -> Option<OutputEvent> {
        let rest = line.split("ALF_PROGRESS").nth(1)?.trim_start();
        let number: String = rest
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        number.parse().ok().map(OutputEvent::Progress)
    }
}
