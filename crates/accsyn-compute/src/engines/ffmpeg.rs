//! ffmpeg media transcoding with named profiles.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::arguments::{build_arguments, protect_whitespace, substitute};
use crate::data::Arguments;
use crate::engine::{CommandLine, Engine, EngineContext, EngineSettings, Profile};
use crate::error::{Error, Result};
use crate::platform::{Os, Priority};

const INPUT: &str = "${INPUT}";
const OUTPUT: &str = "${OUTPUT}";
const PROFILE: &str = "${PROFILE}";

/// Suffix used when the output would otherwise overwrite the input.
const TRANSCODED_SUFFIX: &str = "_transcoded";

/// Transcodes media files.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ffmpeg;

impl Ffmpeg {
    const NAME: &'static str = "ffmpeg";
}

fn profiles() -> BTreeMap<String, Profile> {
    let h264 = Profile {
        arguments: "-c:v libx264 -c:a aac -vf format=yuv420p -movflags +faststart -strict -2"
            .to_string(),
        description: "Transcode to H264/AAC".to_string(),
        suffix: Some("_${PROFILE_NAME}".to_string()),
        extension: Some(".mp4".to_string()),
        ..Profile::default()
    };
    let hls = Profile {
        arguments: concat!(
            "-filter:v:0 scale=-2:1080 -b:v:0 6000k ",
            "-filter:v:1 scale=-2:720 -b:v:1 2800k ",
            "-filter:v:2 scale=-2:480 -b:v:2 800k ",
            "-map 0:v -map 0:a? -map 0:v -map 0:a? -map 0:v -map 0:a? ",
            "-var_stream_map v:0,a:0%20v:1,a:1%20v:2,a:2 ",
            "-f hls -hls_time 4 -hls_playlist_type vod ",
            "-hls_segment_filename stream_%v_%03d.ts ",
            "-master_pl_name index.m3u8 stream_%v.m3u8"
        )
        .to_string(),
        default_output: Some("share=(default)/__STREAMING_MEDIA__".to_string()),
        chdir_output: true,
        no_append_output: true,
        suffix: Some("_${PROFILE_NAME}".to_string()),
        output_directory: true,
        ..Profile::default()
    };
    BTreeMap::from([("h264".to_string(), h264), ("hls".to_string(), hls)])
}

impl Engine for Ffmpeg {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn revision(&self) -> u32 {
        7
    }

    fn settings(&self) -> EngineSettings {
        EngineSettings {
            items: false,
            multiple_inputs: true,
            filename_extensions:
                ".mov,.mp4,.wmv,.avi,.mpg,.mpeg,.mxf,.m2v,.m4v,.dv,.3gp,.3g2,.flv,.mkv,.vob,.webm"
                    .to_string(),
            binary: true,
            kind: Some("transcode".to_string()),
            color: Some("8,139,9".to_string()),
            vendor: Some("ffmpeg.org".to_string()),
            profiles: profiles(),
            ..EngineSettings::default()
        }
    }

    fn default_parameters(&self) -> Value {
        json!({ "arguments": "-y -i ${INPUT} ${PROFILE} ${OUTPUT}", "profile": "h264" })
    }

    fn executable(&self, ctx: &EngineContext) -> Result<PathBuf> {
        let exe = if ctx.os == Os::Windows { "ffmpeg.exe" } else { "ffmpeg" };
        if let Some(root) = &ctx.overrides.install_root {
            return Ok(ctx.os.join(&root.to_string_lossy(), &["bin", exe]));
        }
        let candidates: &[&str] = match ctx.os {
            Os::Linux => &["/usr/local/bin/ffmpeg", "/usr/bin/ffmpeg"],
            Os::Mac => &["/opt/local/bin/ffmpeg", "/opt/homebrew/bin/ffmpeg"],
            Os::Windows => &[r"C:\ffmpeg\bin\ffmpeg.exe"],
        };
        let found = candidates
            .iter()
            .find(|c| Path::new(c).exists())
            .or_else(|| candidates.last())
            .copied()
            .unwrap_or_default();
        Ok(PathBuf::from(found))
    }

    fn commandline(&self, ctx: &EngineContext) -> Result<CommandLine> {
        let parameters = ctx.parameters();
        let arguments = match parameters.arguments() {
            Some(Arguments::Line(line)) => line,
            Some(Arguments::List(list)) => list.join(" "),
            None => return Err(Error::missing_parameter(Self::NAME, "arguments")),
        };
        for placeholder in [INPUT, OUTPUT] {
            if !arguments.contains(placeholder) {
                return Err(Error::missing_parameter(
                    Self::NAME,
                    format!("{placeholder} in arguments"),
                ));
            }
        }

        let input = ctx.input(Self::NAME)?;
        if !Path::new(&input).exists() {
            warn!("Input media not found @ {input}");
        }

        let profile_name = match ctx.data.compute.profile.as_deref() {
            Some(name) => Some(name.trim()),
            None if arguments.contains(PROFILE) => parameters.string("profile").map(str::trim),
            None => None,
        }
        .filter(|name| !name.is_empty());

        let profile = match profile_name {
            Some(name) => Some(
                self.settings()
                    .profiles
                    .remove(name)
                    .ok_or_else(|| Error::UnknownProfile(name.to_string()))?,
            ),
            None => {
                warn!("No profile specified, no transcoding will be done");
                None
            }
        };
        let profile = profile.unwrap_or_default();

        let mut suffix = match (profile.suffix.as_deref(), profile_name) {
            (Some(suffix), Some(name)) => {
                substitute(suffix, &HashMap::from([("PROFILE_NAME", name.to_string())]))
            }
            _ => String::new(),
        };

        let (input_dir, input_file) = split_path(&input);
        let (input_stem, input_ext) = split_extension(input_file);

        let mut output_path = match ctx.output() {
            Some(output) => output,
            None => {
                let base = match profile.default_output.as_deref() {
                    Some(default) => {
                        info!("No output path defined, falling back on default output: {default}");
                        ctx.normalize(default)
                    }
                    None => {
                        warn!("No output path defined, will output to same folder as input");
                        input_dir.to_string()
                    }
                };
                if profile.output_directory {
                    info!("Output to subdirectory: '{input_stem}'");
                    join(ctx.os, &base, input_stem)
                } else {
                    base
                }
            }
        };

        if !output_path.is_empty() && !Path::new(&output_path).exists() {
            warn!("Output media path not found @ {output_path}, creating");
            std::fs::create_dir_all(&output_path).map_err(|source| Error::DirectoryCreate {
                path: PathBuf::from(&output_path),
                source,
            })?;
        }

        let working_dir = profile.chdir_output.then(|| {
            info!("Transcoding in: {output_path}");
            PathBuf::from(&output_path)
        });

        let output_argument = if profile.no_append_output {
            info!("Not appending output path");
            String::new()
        } else {
            let extension = profile.extension.as_deref().unwrap_or_default();
            if output_path == input_dir && suffix.is_empty() {
                warn!(
                    "Output path is same as input path, appending '{TRANSCODED_SUFFIX}' suffix to prevent overwrite of input media"
                );
                suffix = TRANSCODED_SUFFIX.to_string();
            }
            let file_name = if suffix.is_empty() && extension.is_empty() {
                input_file.to_string()
            } else {
                let extension = if extension.is_empty() { input_ext } else { extension };
                format!("{input_stem}{suffix}{extension}")
            };
            output_path = join(ctx.os, &output_path, &file_name);
            protect_whitespace(&output_path)
        };

        let line = substitute(
            &arguments,
            &HashMap::from([
                ("INPUT", protect_whitespace(&input)),
                ("PROFILE", profile.arguments.clone()),
                ("OUTPUT", output_argument),
            ]),
        );
        info!(
            "Transcoding '{input}' => '{output_path}' using ffmpeg profile {}, arguments: {}",
            profile_name.unwrap_or("-"),
            profile.arguments
        );

        let mut cmd = CommandLine::new(self.resolved_executable(ctx)?)
            .args(build_arguments(&Arguments::Line(line)));
        cmd.working_dir = working_dir;
        Ok(cmd)
    }

    fn priority(&self, _ctx: &EngineContext) -> Option<Priority> {
        Some(Priority::Normal)
    }
}

/// Split a path into its directory and file name, accepting either separator.
fn split_path(path: &str) -> (&str, &str) {
    match path.rfind(['/', '\\']) {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// Split a file name into stem and extension (with the dot).
fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => (&file_name[..idx], &file_name[idx..]),
        _ => (file_name, ""),
    }
}

fn join(os: Os, dir: &str, name: &str) -> String {
    if dir.is_empty() {
        return name.to_string();
    }
    format!(
        "{}{}{}",
        dir.trim_end_matches(['/', '\\']),
        os.path_separator(),
        name
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::Config;
    use crate::engines::testing::{context, touch};

    fn media(dir: &Path, name: &str) -> String {
        let path = dir.join("media").join(name);
        touch(&path);
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_h264_next_to_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = media(dir.path(), "My Clip.mov");
        let ctx = context(
            &Ffmpeg,
            json!({ "compute": { "input": input } }),
            "all",
            dir.path(),
            &Config::default(),
            Os::Linux,
        );

        let cmd = Ffmpeg.commandline(&ctx).unwrap();
        let media_dir = dir.path().join("media");
        let expected_output = media_dir.join("My Clip_h264.mp4");
        assert_eq!(
            cmd.args,
            vec![
                "-y",
                "-i",
                input.as_str(),
                "-c:v",
                "libx264",
                "-c:a",
                "aac",
                "-vf",
                "format=yuv420p",
                "-movflags",
                "+faststart",
                "-strict",
                "-2",
                expected_output.to_str().unwrap()
            ]
        );
        assert!(cmd.working_dir.is_none());
    }

    #[test]
    fn test_hls_default_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let input = media(dir.path(), "clip.mov");
        let streaming_root = dir.path().join("share");
        let ctx = context(
            &Ffmpeg,
            json!({
                "compute": { "input": input, "profile": "hls" },
                "shares": [{
                    "id": "s1",
                    "code": "media",
                    "default": true,
                    "paths": { "windows": "M:/", "linux": streaming_root.to_str().unwrap() }
                }]
            }),
            "all",
            dir.path(),
            &Config::default(),
            Os::Linux,
        );

        let cmd = Ffmpeg.commandline(&ctx).unwrap();
        let expected_dir = streaming_root.join("__STREAMING_MEDIA__").join("clip");
        assert!(expected_dir.is_dir());
        assert_eq!(cmd.working_dir, Some(expected_dir));
        assert!(cmd.args.contains(&"v:0,a:0 v:1,a:1 v:2,a:2".to_string()));
        assert!(cmd.args.contains(&"stream_%v_%03d.ts".to_string()));
        assert_eq!(cmd.args.last().unwrap(), "stream_%v.m3u8");
    }

    #[test]
    fn test_no_profile_guards_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = media(dir.path(), "clip.mov");
        let ctx = context(
            &Ffmpeg,
            json!({ "compute": { "input": input, "profile": "" } }),
            "all",
            dir.path(),
            &Config::default(),
            Os::Linux,
        );

        let cmd = Ffmpeg.commandline(&ctx).unwrap();
        let expected = dir.path().join("media").join("clip_transcoded.mov");
        assert_eq!(
            cmd.args,
            vec!["-y", "-i", input.as_str(), expected.to_str().unwrap()]
        );
    }

    #[test]
    fn test_explicit_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = media(dir.path(), "clip.mxf");
        let output = dir.path().join("out");
        let ctx = context(
            &Ffmpeg,
            json!({ "compute": {
                "input": input,
                "output": output.to_str().unwrap(),
                "parameters": { "profile": "h264" }
            } }),
            "all",
            dir.path(),
            &Config::default(),
            Os::Linux,
        );

        let cmd = Ffmpeg.commandline(&ctx).unwrap();
        assert!(output.is_dir());
        assert_eq!(
            cmd.args.last().unwrap(),
            output.join("clip_h264.mp4").to_str().unwrap()
        );
    }

    #[test]
    fn test_unknown_profile() {
        let dir = tempfile::tempdir().unwrap();
        let input = media(dir.path(), "clip.mov");
        let ctx = context(
            &Ffmpeg,
            json!({ "compute": { "input": input, "profile": "prores" } }),
            "all",
            dir.path(),
            &Config::default(),
            Os::Linux,
        );
        assert!(matches!(
            Ffmpeg.commandline(&ctx),
            Err(Error::UnknownProfile(name)) if name == "prores"
        ));
    }

    #[test]
    fn test_requires_output_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let input = media(dir.path(), "clip.mov");
        let ctx = context(
            &Ffmpeg,
            json!({ "compute": {
                "input": input,
                "parameters": { "arguments": "-y -i ${INPUT} ${PROFILE}" }
            } }),
            "all",
            dir.path(),
            &Config::default(),
            Os::Linux,
        );
        assert!(matches!(
            Ffmpeg.commandline(&ctx),
            Err(Error::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_split_helpers() {
        assert_eq!(split_path(r"C:\media\clip.mov"), (r"C:\media", "clip.mov"));
        assert_eq!(split_path("clip.mov"), ("", "clip.mov"));
        assert_eq!(split_extension("clip.v2.mov"), ("clip.v2", ".mov"));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
        assert_eq!(join(Os::Windows, r"C:\out\", "clip.mp4"), r"C:\out\clip.mp4");
    }

    #[test]
    fn test_settings_publish_profiles() {
        let settings = Ffmpeg.settings();
        assert_eq!(settings.kind.as_deref(), Some("transcode"));
        assert!(settings.profiles["hls"].no_append_output);
        assert_eq!(settings.profiles["h264"].extension.as_deref(), Some(".mp4"));
    }
}
