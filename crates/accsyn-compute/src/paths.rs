//! Cross-platform path conversion based on share mappings.
//!
//! A job submitted from a Windows workstation refers to `J:/projects/...`
//! while the Linux render node mounts the same share at `/mnt/projects`.
//! Paths may also be given share-relative as `share=<code>/...`.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::data::Share;
use crate::error::{Error, Result};
use crate::platform::Os;

/// Converts foreign paths to the local platform using share mappings.
#[derive(Debug, Clone)]
pub struct PathNormalizer {
    shares: Vec<Share>,
    os: Os,
}

impl PathNormalizer {
    /// Create a normalizer for the given shares targeting `os`.
    #[must_use]
    pub fn new(shares: Vec<Share>, os: Os) -> Self {
        Self { shares, os }
    }

    /// The platform paths are converted to.
    #[must_use]
    pub fn os(&self) -> Os {
        self.os
    }

    /// Convert a path from any platform to the local one.
    ///
    /// Paths not on a known share only get their separators adjusted.
    #[must_use]
    pub fn normalize(&self, path: &str) -> String {
        if path.is_empty() {
            return String::new();
        }
        let original = path;
        let mut p = path.replace('\\', "/");

        let mut prefix_from: Option<String> = None;
        let mut prefix_to: Option<String> = None;
        for share in &self.shares {
            for (platform, prefix) in &share.paths {
                let prefix = prefix.replace('\\', "/");
                if platform.eq_ignore_ascii_case(self.os.as_str()) {
                    prefix_to = Some(prefix);
                } else if !prefix.is_empty()
                    && (Self::is_share_reference(&p, share)
                        || p.to_lowercase().starts_with(&prefix.to_lowercase()))
                {
                    prefix_from = Some(prefix);
                }
            }
            if prefix_from.is_some() {
                break;
            }
        }

        if let (Some(from), Some(to)) = (&prefix_from, &prefix_to) {
            p = if p.starts_with("share=") {
                match p.find('/') {
                    Some(idx) => format!("{to}{}", &p[idx..]),
                    None => to.clone(),
                }
            } else if from.len() < p.len() && p.is_char_boundary(from.len()) {
                let rest = &p[from.len()..];
                format!(
                    "{}/{}",
                    to.trim_end_matches('/'),
                    rest.trim_start_matches('/')
                )
            } else {
                to.clone()
            };
        }

        if self.os == Os::Windows {
            p = p.replace('/', "\\");
        }

        if p == original {
            debug!(
                "No conversion of path '{original}' needed (prefix_from: {prefix_from:?}, prefix_to: {prefix_to:?})"
            );
        } else {
            debug!("Converted '{original}' > '{p}'");
        }
        p
    }

    /// Normalize a path and make sure the directory exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryCreate`] if the directory cannot be created.
    pub fn normalize_mkdirs(&self, path: &str) -> Result<String> {
        let p = self.normalize(path);
        let dir = PathBuf::from(&p);
        if !p.is_empty() && !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|source| Error::DirectoryCreate {
                path: dir.clone(),
                source,
            })?;
            warn!("Created missing folder: '{p}'");
        }
        Ok(p)
    }

    fn is_share_reference(path: &str, share: &Share) -> bool {
        let Some(reference) = path.strip_prefix("share=") else {
            return false;
        };
        let name = reference.split('/').next().unwrap_or_default();
        (!share.code.is_empty() && name == share.code)
            || (!share.id.is_empty() && name == share.id)
            || (share.default && name == "(default)")
    }
}

/// Turn backslashes into forward slashes.
///
/// Applications such as Nuke want forward slashes even on Windows.
#[must_use]
pub fn convert_path(path: &str) -> String {
    path.replace('\\', "/")
}
