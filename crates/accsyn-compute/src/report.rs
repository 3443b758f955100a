//! Task progress reports.
//!
//! The farm backend scans engine stdout for single-line JSON objects flagged
//! with a report kind (`taskstarted`, `taskprogress`, `taskchecksum`).

use std::io::Write;

use serde::Serialize;
use tracing::warn;

/// A progress report about the current task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskReport {
    /// A frame (or other sub item) started processing.
    Started {
        /// Always `true`; marks the report kind.
        taskstarted: bool,
        /// The sub item, e.g. a frame number.
        uri: String,
    },
    /// Percentage of the task done.
    Progress {
        /// Always `true`; marks the report kind.
        taskprogress: bool,
        /// The item being processed.
        uri: String,
        /// Percent complete, 0-100.
        percent: f32,
    },
    /// The checksum computed for an item.
    Checksum {
        /// Always `true`; marks the report kind.
        taskchecksum: bool,
        /// The item the checksum belongs to.
        uri: String,
        /// Hash algorithm, e.g. `md5` or `sha-1`.
        algorithm: String,
        /// The digest.
        result: String,
    },
}

impl TaskReport {
    /// Report that `uri` started.
    #[must_use]
    pub fn started(uri: impl Into<String>) -> Self {
        Self::Started {
            taskstarted: true,
            uri: uri.into(),
        }
    }

    /// Report progress on `uri`.
    #[must_use]
    pub fn progress(uri: impl Into<String>, percent: f32) -> Self {
        Self::Progress {
            taskprogress: true,
            uri: uri.into(),
            percent: percent.clamp(0.0, 100.0),
        }
    }

    /// Report a checksum for `uri`.
    #[must_use]
    pub fn checksum(
        uri: impl Into<String>,
        algorithm: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self::Checksum {
            taskchecksum: true,
            uri: uri.into(),
            algorithm: algorithm.into(),
            result: result.into(),
        }
    }

    /// Render as the single JSON line the backend parses.
    #[must_use]
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Print the report to stdout.
    pub fn emit(&self) {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", self.to_line()).and_then(|()| stdout.flush()) {
            warn!("Could not write task report: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_line() {
        assert_eq!(
            TaskReport::started("1010").to_line(),
            r#"{"taskstarted":true,"uri":"1010"}"#
        );
    }

    #[test]
    fn test_checksum_line() {
        assert_eq!(
            TaskReport::checksum("all", "md5", "d41d8cd98f00b204e9800998ecf8427e").to_line(),
            r#"{"taskchecksum":true,"uri":"all","algorithm":"md5","result":"d41d8cd98f00b204e9800998ecf8427e"}"#
        );
    }

    #[test]
    fn test_progress_is_clamped() {
        match TaskReport::progress("1001", 140.0) {
            TaskReport::Progress { percent, .. } => assert!((percent - 100.0).abs() < f32::EPSILON),
            other => panic!("unexpected report {other:?}"),
        }
    }
}
