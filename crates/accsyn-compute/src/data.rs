//! Compute data handed to an engine by the farm.
//!
//! The backend writes one JSON document per task describing what to compute
//! (`compute`), where it runs (`site`) and how storage is mounted on each
//! platform (`shares`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// The complete compute data document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputeData {
    /// What to compute.
    #[serde(default)]
    pub compute: Compute,

    /// The site the task executes at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<Site>,

    /// Storage shares and their per-platform mount prefixes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shares: Vec<Share>,
}

/// The compute section of the data document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Compute {
    /// Path to the input file or directory, possibly on a foreign platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    /// Path to the output file or directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Transcoding profile selected when the job was submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Engine parameters.
    #[serde(default)]
    pub parameters: Parameters,
}

/// A named render site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    /// Site code, e.g. `hq`.
    pub code: String,
}

/// A storage share with one path prefix per platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    /// Backend identifier of the share.
    #[serde(default)]
    pub id: String,

    /// Human readable code of the share.
    #[serde(default)]
    pub code: String,

    /// Whether this is the default share, addressed as `share=(default)`.
    #[serde(default)]
    pub default: bool,

    /// Mount prefix keyed by platform (`linux`, `mac`, `windows`).
    #[serde(default)]
    pub paths: BTreeMap<String, String>,
}

/// Command line arguments given as a single line or as a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arguments {
    /// A whitespace separated line, tokens may be url encoded.
    Line(String),
    /// Pre-split arguments.
    List(Vec<String>),
}

impl Arguments {
    /// Whether there are no arguments at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Line(line) => line.trim().is_empty(),
            Self::List(list) => list.is_empty(),
        }
    }
}

/// Engine parameters: a free-form JSON object with typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(Map<String, Value>);

impl Parameters {
    /// Build parameters from a JSON value; anything but an object yields no parameters.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    /// Whether the parameter is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Raw access to a parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// A non-empty string parameter.
    #[must_use]
    pub fn string(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// A list of strings; a plain string yields a single element.
    #[must_use]
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// An unsigned integer parameter, accepting numeric strings.
    #[must_use]
    pub fn u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// The `arguments` parameter, if present and non-empty.
    #[must_use]
    pub fn arguments(&self) -> Option<Arguments> {
        let arguments = match self.0.get("arguments")? {
            Value::String(s) => Arguments::Line(s.clone()),
            Value::Array(items) => Arguments::List(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            _ => return None,
        };
        (!arguments.is_empty()).then_some(arguments)
    }

    /// Fill in any parameter missing here from `defaults`.
    pub fn merge_defaults(&mut self, defaults: &Value) {
        if let Value::Object(defaults) = defaults {
            for (key, value) in defaults {
                self.0.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }
}

impl ComputeData {
    /// Load compute data from disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataNotFound`] if the file is missing or a directory and
    /// [`Error::DataInvalid`] if it is not valid compute data.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::DataNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let data: Self = serde_json::from_str(&content).map_err(|source| {
            warn!("Loading the execution data failed: {source}: {content}");
            Error::DataInvalid {
                path: path.to_path_buf(),
                source,
            }
        })?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                "Data loaded:\n{}",
                serde_json::to_string_pretty(&data).unwrap_or_default()
            );
        }
        Ok(data)
    }

    /// Write compute data to disk as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The code of the site we are running at.
    #[must_use]
    pub fn site_code(&self) -> Option<&str> {
        self.site.as_ref().map(|s| s.code.as_str())
    }

    /// The raw (not yet normalized) input path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParameter`] if the compute section has no input.
    pub fn input(&self, engine: &'static str) -> Result<&str> {
        self.compute
            .input
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::missing_parameter(engine, "input"))
    }

    /// The directory holding the data file, where sidecar files are written.
    #[must_use]
    pub fn sidecar_dir(data_path: &Path) -> PathBuf {
        data_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }
}
