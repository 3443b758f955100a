//! Operating system detection and application install discovery.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// The operating systems engines know how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// Linux render nodes.
    Linux,
    /// macOS workstations.
    Mac,
    /// Windows render nodes.
    Windows,
}

impl Os {
    /// The operating system this binary runs on.
    #[must_use]
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Mac
        } else {
            Self::Linux
        }
    }

    /// The key used for this platform in share path mappings.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Mac => "mac",
            Self::Windows => "windows",
        }
    }

    /// The native path separator.
    #[must_use]
    pub fn path_separator(&self) -> char {
        match self {
            Self::Windows => '\\',
            Self::Linux | Self::Mac => '/',
        }
    }

    /// Join path components with this platform's separator.
    ///
    /// Unlike [`Path::join`] this produces paths for the target platform rather than
    /// the host, so Windows locations can be built and tested on Linux.
    #[must_use]
    pub fn join(&self, base: &str, parts: &[&str]) -> PathBuf {
        let sep = self.path_separator();
        let mut out = base.trim_end_matches(['/', '\\']).to_string();
        for part in parts {
            out.push(sep);
            out.push_str(part.trim_matches(['/', '\\']));
        }
        PathBuf::from(out)
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process priority classes, mapped to Windows creation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Only run when the system is idle.
    Idle,
    /// Below normal priority.
    BelowNormal,
    /// Normal priority.
    Normal,
    /// Above normal priority.
    AboveNormal,
    /// High priority.
    High,
    /// Realtime priority.
    Realtime,
}

impl Priority {
    /// The Windows process creation flag for this priority class.
    #[must_use]
    pub fn creation_flags(&self) -> u32 {
        match self {
            Self::Idle => 0x0000_0040,
            Self::BelowNormal => 0x0000_4000,
            Self::Normal => 0x0000_0020,
            Self::AboveNormal => 0x0000_8000,
            Self::High => 0x0000_0080,
            Self::Realtime => 0x0000_0100,
        }
    }
}

/// Locate a versioned application install directory under `base`.
///
/// Entries of `base` starting with `prefix` (and containing `version_filter`,
/// when given) are candidates. The candidate containing `preferred` wins;
/// otherwise the lexicographically highest candidate is picked, which is the
/// newest version for the vendors' naming schemes.
///
/// # Errors
///
/// Returns [`Error::InstallNotFound`] when `base` does not exist or holds no
/// matching entry.
pub fn find_versioned_install(
    engine: &'static str,
    base: &Path,
    prefix: &str,
    version_filter: Option<&str>,
    preferred: Option<&str>,
) -> Result<PathBuf> {
    if !base.is_dir() {
        return Err(Error::install_not_found(
            engine,
            format!("application base directory '{}' not found", base.display()),
        ));
    }

    let mut candidates: Vec<String> = std::fs::read_dir(base)?
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with(prefix))
        .filter(|name| version_filter.map_or(true, |v| name.contains(v)))
        .collect();
    candidates.sort();

    if candidates.is_empty() {
        return Err(Error::install_not_found(
            engine,
            format!("no {prefix} application version found in '{}'", base.display()),
        ));
    }

    let chosen = match preferred {
        Some(wanted) => candidates
            .iter()
            .find(|c| c.contains(wanted))
            .cloned()
            .unwrap_or_else(|| {
                warn!("Could not find preferred version {wanted}, falling back on latest");
                candidates[candidates.len() - 1].clone()
            }),
        None => candidates[candidates.len() - 1].clone(),
    };
    debug!("Picked {chosen} among {candidates:?}");
    Ok(base.join(chosen))
}

/// Find the first file in `dir` whose name starts with `prefix` (case-insensitive).
///
/// On Windows only `.exe` files qualify.
///
/// # Errors
///
/// Returns [`Error::InstallNotFound`] when nothing matches.
pub fn find_executable_in(engine: &'static str, dir: &Path, prefix: &str, os: Os) -> Result<PathBuf> {
    let prefix = prefix.to_lowercase();
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map_err(|_| {
            Error::install_not_found(engine, format!("directory '{}' not found", dir.display()))
        })?
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();

    names
        .into_iter()
        .find(|name| {
            let lower = name.to_lowercase();
            lower.starts_with(&prefix) && (os != Os::Windows || lower.ends_with(".exe"))
        })
        .map(|name| dir.join(name))
        .ok_or_else(|| {
            Error::install_not_found(
                engine,
                format!("executable not found, looked in '{}'", dir.display()),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_as_str() {
        assert_eq!(Os::Linux.as_str(), "linux");
        assert_eq!(Os::Mac.as_str(), "mac");
        assert_eq!(Os::Windows.as_str(), "windows");
        assert_eq!(Os::Windows.to_string(), "windows");
    }

    #[test]
    fn test_os_current_is_consistent() {
        let os = Os::current();
        if cfg!(target_os = "linux") {
            assert_eq!(os, Os::Linux);
        }
    }

    #[test]
    fn test_os_join() {
        assert_eq!(
            Os::Windows.join("C:\\Program Files\\", &["Blender", "blender.exe"]),
            PathBuf::from("C:\\Program Files\\Blender\\blender.exe")
        );
        assert_eq!(
            Os::Linux.join("/opt", &["hfs18.5.499", "bin", "mantra"]),
            PathBuf::from("/opt/hfs18.5.499/bin/mantra")
        );
    }

    #[test]
    fn test_priority_creation_flags() {
        assert_eq!(Priority::Normal.creation_flags(), 0x20);
        assert_eq!(Priority::BelowNormal.creation_flags(), 0x4000);
        assert_eq!(Priority::Idle.creation_flags(), 0x40);
        assert_eq!(Priority::Realtime.creation_flags(), 0x100);
    }

    #[test]
    fn test_priority_deserialize() {
        let p: Priority = serde_json::from_str("\"below_normal\"").unwrap();
        assert_eq!(p, Priority::BelowNormal);
    }

    #[test]
    fn test_find_versioned_install_picks_highest() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Nuke12.2v4", "Nuke13.0v1", "Nuke13.1v2", "Maya2022"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        let found = find_versioned_install("nuke-13", dir.path(), "Nuke13", None, None).unwrap();
        assert_eq!(found, dir.path().join("Nuke13.1v2"));
    }

    #[test]
    fn test_find_versioned_install_prefers_requested() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Nuke13.0v1", "Nuke13.1v2"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        let found =
            find_versioned_install("nuke-13", dir.path(), "Nuke13", None, Some("Nuke13.0v1"))
                .unwrap();
        assert_eq!(found, dir.path().join("Nuke13.0v1"));

        let fallback =
            find_versioned_install("nuke-13", dir.path(), "Nuke13", None, Some("Nuke13.2v1"))
                .unwrap();
        assert_eq!(fallback, dir.path().join("Nuke13.1v2"));
    }

    #[test]
    fn test_find_versioned_install_version_filter() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["hfs18.5.499", "hfs19.0.383"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        let found =
            find_versioned_install("mantra-18.5", dir.path(), "hfs", Some("18.5."), None).unwrap();
        assert_eq!(found, dir.path().join("hfs18.5.499"));
    }

    #[test]
    fn test_find_versioned_install_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_versioned_install("nuke-13", dir.path(), "Nuke13", None, None).unwrap_err();
        assert!(err.is_not_installed());

        let err = find_versioned_install(
            "nuke-13",
            &dir.path().join("nope"),
            "Nuke13",
            None,
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_find_executable_in() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Nuke13.1"), "").unwrap();
        std::fs::write(dir.path().join("Nuke13.1.exe"), "").unwrap();
        std::fs::write(dir.path().join("libnuke.so"), "").unwrap();

        let linux = find_executable_in("nuke-13", dir.path(), "Nuke13", Os::Linux).unwrap();
        assert_eq!(linux, dir.path().join("Nuke13.1"));

        let windows = find_executable_in("nuke-13", dir.path(), "nuke13", Os::Windows).unwrap();
        assert_eq!(windows, dir.path().join("Nuke13.1.exe"));
    }
}
