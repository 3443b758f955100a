//! Built-in engines.
//!
//! Every engine the node can run is registered here by name.

mod arnold;
mod blender;
mod fake;
mod ffmpeg;
mod mantra;
mod nuke;
mod server;
mod validate;
mod vray;

use std::sync::OnceLock;

use regex::Regex;

pub use arnold::Arnold;
pub use blender::Blender;
pub use fake::Fake;
pub use ffmpeg::Ffmpeg;
pub use mantra::Mantra;
pub use nuke::{Nuke, NukeScript};
pub use server::AccsynServer;
pub use validate::{ChecksumAlgorithm, Validate};
pub use vray::VRay;

use crate::arguments::build_arguments;
use crate::engine::{Engine, EngineContext};

/// All registered engines.
#[must_use]
pub fn all() -> Vec<Box<dyn Engine>> {
    vec![
        Box::new(Nuke::v12()),
        Box::new(Nuke::v13()),
        Box::new(NukeScript),
        Box::new(Blender),
        Box::new(Arnold),
        Box::new(Mantra::v18_5()),
        Box::new(Mantra::v19_0()),
        Box::new(VRay),
        Box::new(Ffmpeg),
        Box::new(Validate),
        Box::new(AccsynServer),
        Box::new(Fake),
    ]
}

/// Find an engine by name.
#[must_use]
pub fn lookup(name: &str) -> Option<Box<dyn Engine>> {
    all().into_iter().find(|engine| engine.name() == name)
}

/// Names of all registered engines.
#[must_use]
pub fn names() -> Vec<&'static str> {
    all().iter().map(|engine| engine.name()).collect()
}

/// The `arguments` parameter split into command line tokens.
pub(crate) fn parameter_arguments(ctx: &EngineContext) -> Vec<String> {
    ctx.parameters()
        .arguments()
        .map(|arguments| build_arguments(&arguments))
        .unwrap_or_default()
}

/// The last number in `text`, e.g. the frame of `shot.01010.exr`.
pub(crate) fn last_number(text: &str) -> Option<i64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d+)\D*$").expect("number pattern is valid"));
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;

    use serde_json::Value;

    use crate::config::Config;
    use crate::data::ComputeData;
    use crate::engine::{Engine, EngineContext};
    use crate::item::Item;
    use crate::platform::Os;

    /// Build a context for `engine` from a JSON data document.
    pub fn context(
        engine: &dyn Engine,
        data: Value,
        item: &str,
        dir: &Path,
        config: &Config,
        os: Os,
    ) -> EngineContext {
        let data: ComputeData = serde_json::from_value(data).unwrap();
        EngineContext::new(
            engine,
            data,
            Item::parse(Some(item)).unwrap(),
            dir.join("data.json"),
            config,
        )
        .with_os(os)
    }

    /// Config pointing `engine` at a fake install root.
    pub fn install_root_config(engine: &str, root: &Path) -> Config {
        let mut config = Config::default();
        config.engines.insert(
            engine.to_string(),
            crate::config::EngineOverride {
                install_root: Some(root.to_path_buf()),
                ..Default::default()
            },
        );
        config
    }

    /// Create an empty file, with parents.
    pub fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }
}
