//! A fake renderer for trying out farm setups without a render application.
//!
//! Writes one small file per frame into the output directory, printing the
//! same progress lines Nuke does.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::info;

use crate::engine::{CommandLine, Engine, EngineContext, EngineSettings};
use crate::error::{Error, Result};
use crate::item::{FrameRange, Item};
use crate::report::TaskReport;
use crate::runner::Runner;

const FRAME_CONTENT: &[u8] = b"Humbug";
const DEFAULT_RANGE: &str = "1001-1010";

/// In-process fake renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fake;

impl Fake {
    const NAME: &'static str = "fake";

    fn frames(item: &Item) -> Result<FrameRange> {
        match item {
            Item::Frames(range) => Ok(*range),
            Item::All => DEFAULT_RANGE.parse(),
            Item::Uri(uri) => Err(Error::invalid_item(uri.clone(), "expected a frame range")),
        }
    }
}

#[async_trait::async_trait]
impl Engine for Fake {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn revision(&self) -> u32 {
        1
    }

    fn settings(&self) -> EngineSettings {
        EngineSettings {
            items: true,
            default_range: Some(DEFAULT_RANGE.to_string()),
            default_bucketsize: Some(5),
            filename_extensions: ".nk".to_string(),
            color: Some("200,200,200".to_string()),
            ..EngineSettings::default()
        }
    }

    fn default_parameters(&self) -> Value {
        json!({ "frame_delay_ms": 1000 })
    }

    fn executable(&self, _ctx: &EngineContext) -> Result<PathBuf> {
        Ok(std::env::current_exe()?)
    }

    /// Fake renders have no external command line.
    fn commandline(&self, _ctx: &EngineContext) -> Result<CommandLine> {
        Ok(CommandLine::new(PathBuf::new()))
    }

    async fn execute(&self, ctx: &EngineContext, _runner: &Runner) -> Result<()> {
        let frames = Self::frames(&ctx.item)?;
        let output = ctx
            .data
            .compute
            .output
            .as_deref()
            .filter(|o| !o.is_empty())
            .ok_or_else(|| Error::missing_parameter(Self::NAME, "output"))?;
        let output_dir = PathBuf::from(ctx.normalizer.normalize_mkdirs(output)?);
        let prefix = output_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame".to_string());
        let delay = Duration::from_millis(ctx.parameters().u64("frame_delay_ms").unwrap_or(1000));

        println!("Fake rendering frames {frames} > {}, stand by..", output_dir.display());
        let started = Instant::now();
        for frame in frames.iter() {
            let frame_started = Instant::now();
            let path = output_dir.join(format!("{prefix}.{frame:04}.jpg"));
            tokio::fs::write(&path, FRAME_CONTENT).await?;
            tokio::time::sleep(delay).await;
            println!(
                "Writing {} took {:.2} seconds",
                path.display(),
                frame_started.elapsed().as_secs_f64()
            );
            TaskReport::started(frame.to_string()).emit();
        }
        println!(
            "Total render time: {:.2} seconds",
            started.elapsed().as_secs_f64()
        );
        info!("Fake rendered {} frames", frames.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::Config;
    use crate::engines::testing::context;
    use crate::platform::Os;

    #[tokio::test]
    async fn test_writes_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("test_v001");
        let ctx = context(
            &Fake,
            json!({ "compute": {
                "input": "/projects/nuke/test_v001.nk",
                "output": output.to_str().unwrap(),
                "parameters": { "frame_delay_ms": 0 }
            } }),
            "1001-1003",
            dir.path(),
            &Config::default(),
            Os::current(),
        );

        Fake.execute(&ctx, &Runner::default()).await.unwrap();
        for frame in 1001..=1003 {
            let path = output.join(format!("test_v001.{frame}.jpg"));
            assert_eq!(std::fs::read(&path).unwrap(), FRAME_CONTENT);
        }
        assert!(!output.join("test_v001.1004.jpg").exists());
    }

    #[tokio::test]
    async fn test_requires_output() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&Fake, json!({}), "1001", dir.path(), &Config::default(), Os::current());
        assert!(matches!(
            Fake.execute(&ctx, &Runner::default()).await,
            Err(Error::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_frames_default_range() {
        assert_eq!(Fake::frames(&Item::All).unwrap(), FrameRange::new(1001, 1010).unwrap());
        assert!(Fake::frames(&Item::Uri("clip.mov".to_string())).is_err());
    }
}
