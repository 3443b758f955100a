//! Media validation: file checksums and DCP packing list verification.
//!
//! Validation runs in-process on a blocking thread; nothing is spawned.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use base64::Engine as _;
use md5::Md5;
use roxmltree::{Document, Node};
use serde_json::{json, Value};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::engine::{CommandLine, Engine, EngineContext, EngineSettings};
use crate::error::{Error, Result};
use crate::report::TaskReport;
use crate::runner::Runner;

const CHUNK_SIZE: usize = 1024 * 1024;
const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Hash algorithms offered as `checksum-<name>` methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// MD5.
    Md5,
    /// SHA-1.
    Sha1,
    /// SHA-256.
    Sha256,
    /// BLAKE3.
    Blake3,
}

impl ChecksumAlgorithm {
    /// The name reported to the backend.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }

    fn hasher(self) -> Hasher {
        match self {
            Self::Md5 => Hasher::Md5(Md5::new()),
            Self::Sha1 => Hasher::Sha1(Sha1::new()),
            Self::Sha256 => Hasher::Sha256(Sha256::new()),
            Self::Blake3 => Hasher::Blake3(Box::default()),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Hasher {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Md5(h) => format!("{:x}", h.finalize()),
            Self::Sha1(h) => format!("{:x}", h.finalize()),
            Self::Sha256(h) => format!("{:x}", h.finalize()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// What the validation engine does with its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Checksum(ChecksumAlgorithm),
    PklVerify,
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "checksum-md5" => Ok(Self::Checksum(ChecksumAlgorithm::Md5)),
            "checksum-sha1" => Ok(Self::Checksum(ChecksumAlgorithm::Sha1)),
            "checksum-sha256" => Ok(Self::Checksum(ChecksumAlgorithm::Sha256)),
            "checksum-blake3" => Ok(Self::Checksum(ChecksumAlgorithm::Blake3)),
            "pkl-verify" => Ok(Self::PklVerify),
            other => Err(Error::validation(format!(
                "unsupported validation method: {other}"
            ))),
        }
    }
}

/// Checksums files and verifies DCP packing lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validate;

impl Validate {
    const NAME: &'static str = "validate";
}

#[async_trait::async_trait]
impl Engine for Validate {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn revision(&self) -> u32 {
        1
    }

    fn settings(&self) -> EngineSettings {
        EngineSettings {
            items: false,
            multiple_inputs: true,
            kind: Some("validation".to_string()),
            color: Some("78,78,78".to_string()),
            vendor: Some(String::new()),
            ..EngineSettings::default()
        }
    }

    fn default_parameters(&self) -> Value {
        json!({ "method": "checksum-md5" })
    }

    fn executable(&self, _ctx: &EngineContext) -> Result<PathBuf> {
        Ok(std::env::current_exe()?)
    }

    /// Validation has no external command line.
    fn commandline(&self, _ctx: &EngineContext) -> Result<CommandLine> {
        Ok(CommandLine::new(PathBuf::new()))
    }

    async fn execute(&self, ctx: &EngineContext, _runner: &Runner) -> Result<()> {
        let method: Method = ctx
            .parameters()
            .string("method")
            .ok_or_else(|| Error::missing_parameter(Self::NAME, "method"))?
            .parse()?;
        let input = PathBuf::from(ctx.input(Self::NAME)?);
        if !input.exists() {
            warn!("Input file not found @ {}", input.display());
        }
        let item = ctx.item.to_string();

        tokio::task::spawn_blocking(move || match method {
            Method::Checksum(algorithm) => {
                let checksum = checksum_file(&input, algorithm, &item)?;
                TaskReport::checksum(item, algorithm.as_str(), checksum).emit();
                Ok(())
            }
            Method::PklVerify => {
                let summary = verify_packing_lists(&input)?;
                TaskReport::checksum(item, "sha-1", summary.largest_checksum).emit();
                Ok(())
            }
        })
        .await
        .map_err(|e| Error::internal(format!("validation task panicked: {e}")))?
    }
}

/// Hash `path` in 1 MiB chunks, logging progress every ten seconds.
///
/// # Errors
///
/// Returns [`Error::Validation`] if `path` is not a file, or an I/O error.
pub fn checksum_file(path: &Path, algorithm: ChecksumAlgorithm, item: &str) -> Result<String> {
    if !path.is_file() {
        return Err(Error::validation(format!(
            "input file not found: {}",
            path.display()
        )));
    }
    let file_size = std::fs::metadata(path)?.len();
    info!(
        "Calculating {algorithm} checksum for {}(task: {item}) using {CHUNK_SIZE}b chunks",
        path.display()
    );

    let started = Instant::now();
    let mut last_progress = Instant::now();
    let mut hasher = algorithm.hasher();
    let mut read_bytes = 0u64;
    read_chunks(path, |chunk| {
        hasher.update(chunk);
        read_bytes += chunk.len() as u64;
        if last_progress.elapsed() >= PROGRESS_INTERVAL {
            let percent = percent_of(read_bytes, file_size);
            info!("Progress: {percent:.2}%");
            TaskReport::progress(item, percent).emit();
            last_progress = Instant::now();
        }
    })?;

    let checksum = hasher.finalize_hex();
    info!("{} checksum: {checksum}", algorithm.as_str().to_uppercase());
    log_speed(file_size, started.elapsed());
    Ok(checksum)
}

fn read_chunks(path: &Path, mut f: impl FnMut(&[u8])) -> Result<()> {
    let mut file = File::open(path)?;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            return Ok(());
        }
        f(&buffer[..n]);
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn percent_of(done: u64, total: u64) -> f32 {
    if total == 0 {
        0.0
    } else {
        (done as f64 / total as f64 * 100.0) as f32
    }
}

#[allow(clippy::cast_precision_loss)]
fn log_speed(bytes: u64, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let speed = if secs > 0.0 { bytes as f64 / secs } else { 0.0 };
    info!(
        "Processed {} in {secs:.2} seconds @ ({}/s)",
        human_size(bytes as f64),
        human_size(speed)
    );
}

fn human_size(mut bytes: f64) -> String {
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if bytes < 1024.0 {
            return format!("{bytes:.2} {unit}");
        }
        bytes /= 1024.0;
    }
    format!("{bytes:.2} PB")
}

/// Outcome of a successful packing list verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PklSummary {
    /// Number of packing lists checked.
    pub packing_lists: usize,
    /// Number of assets whose hash matched.
    pub files: u64,
    /// Total size of verified assets.
    pub bytes: u64,
    /// Base64 SHA-1 of the largest verified asset.
    pub largest_checksum: String,
}

#[derive(Debug, Default)]
struct PklVerifier {
    files: u64,
    bytes: u64,
    largest: Option<(u64, String)>,
}

/// Verify every packing list found below `root` against the assets on disk.
///
/// # Errors
///
/// Returns [`Error::Validation`] if `root` is not a directory, holds no
/// packing list, or any asset is missing, has the wrong size or hash.
pub fn verify_packing_lists(root: &Path) -> Result<PklSummary> {
    if !root.is_dir() {
        return Err(Error::validation(format!(
            "input path is not a directory: {}",
            root.display()
        )));
    }
    info!("Checking PKL xml:s in {}", root.display());

    let mut xml_files = Vec::new();
    collect_xml_files(root, &mut xml_files)?;
    let packing_lists: Vec<PathBuf> = xml_files
        .into_iter()
        .filter(|path| root_name(path).is_some_and(|name| name == "packinglist"))
        .collect();
    if packing_lists.is_empty() {
        return Err(Error::validation(format!(
            "no packing list found in {}",
            root.display()
        )));
    }

    let started = Instant::now();
    let mut verifier = PklVerifier::default();
    let errors: usize = packing_lists
        .iter()
        .map(|pkl| verifier.verify_pkl(pkl))
        .sum();

    if verifier.files > 0 {
        info!("Processed {} files", verifier.files);
        log_speed(verifier.bytes, started.elapsed());
    }
    if errors > 0 {
        return Err(Error::validation(format!(
            "hash check complete with {errors} errors"
        )));
    }
    info!("*** Hash check complete with 0 errors ***");

    let largest_checksum = verifier
        .largest
        .map(|(_, checksum)| checksum)
        .ok_or_else(|| Error::validation("no packing list asset carries a hash"))?;
    Ok(PklSummary {
        packing_lists: packing_lists.len(),
        files: verifier.files,
        bytes: verifier.bytes,
        largest_checksum,
    })
}

fn collect_xml_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_xml_files(&path, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("xml"))
        {
            out.push(path);
        }
    }
    Ok(())
}

fn parse_xml<'a>(path: &Path, text: &'a str) -> Result<Document<'a>> {
    Document::parse(text).map_err(|source| Error::Xml {
        path: path.to_path_buf(),
        source,
    })
}

/// Lowercase local name of the root element of an XML file.
fn root_name(path: &Path) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    match parse_xml(path, &text) {
        Ok(doc) => Some(doc.root_element().tag_name().name().to_lowercase()),
        Err(e) => {
            error!("*** XML parse error *** {e}");
            None
        }
    }
}

fn is_named(node: &Node<'_, '_>, name: &str) -> bool {
    node.is_element() && node.tag_name().name().eq_ignore_ascii_case(name)
}

fn text_of(node: &Node<'_, '_>) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn find_assetmap(dir: &Path) -> Option<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    let by_name = files.iter().find(|path| {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.to_lowercase().contains("assetmap"))
    });
    by_name.cloned().or_else(|| {
        files.into_iter().find(|path| {
            path.extension().is_some_and(|e| e == "xml")
                && root_name(path).is_some_and(|n| n == "assetmap" || n == "assetmap2")
        })
    })
}

/// Asset id to relative path, from an ASSETMAP.
fn assetmap_index(path: &Path) -> HashMap<String, String> {
    let mut index = HashMap::new();
    let Ok(text) = std::fs::read_to_string(path) else {
        return index;
    };
    let doc = match parse_xml(path, &text) {
        Ok(doc) => doc,
        Err(e) => {
            error!("*** XML parse error *** {e}");
            return index;
        }
    };
    for asset in doc.descendants().filter(|n| is_named(n, "asset")) {
        let id = asset
            .descendants()
            .find(|n| is_named(n, "id") && text_of(n).is_some())
            .and_then(|n| text_of(&n));
        let rel = asset
            .descendants()
            .find(|n| is_named(n, "path") && text_of(n).is_some())
            .and_then(|n| text_of(&n));
        if let (Some(id), Some(rel)) = (id, rel) {
            index.insert(id, rel);
        }
    }
    debug!("ASSETMAP {} lists {} assets", path.display(), index.len());
    index
}

fn sha1_base64(path: &Path) -> Result<String> {
    let mut hasher = Sha1::new();
    read_chunks(path, |chunk| hasher.update(chunk))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(hasher.finalize()))
}

struct PklAsset {
    id: String,
    hash: String,
    size: Option<u64>,
    original_file_name: Option<String>,
}

impl PklVerifier {
    /// Verify one packing list, returning the number of errors.
    fn verify_pkl(&mut self, pkl: &Path) -> usize {
        let dir = pkl.parent().unwrap_or_else(|| Path::new("."));
        info!("Checking PKL: {}", pkl.display());

        let text = match std::fs::read_to_string(pkl) {
            Ok(text) => text,
            Err(e) => {
                error!("Could not read {}: {e}", pkl.display());
                return 1;
            }
        };
        let doc = match parse_xml(pkl, &text) {
            Ok(doc) => doc,
            Err(e) => {
                error!("*** XML parse error *** {e}");
                return 1;
            }
        };
        let index = find_assetmap(dir)
            .map(|assetmap| assetmap_index(&assetmap))
            .unwrap_or_default();

        let mut errors = 0;
        for node in doc.descendants().filter(|n| is_named(n, "asset")) {
            let mut id = None;
            let mut hash = None;
            let mut size = None;
            let mut original_file_name = None;
            for child in node.children().filter(Node::is_element) {
                let Some(text) = text_of(&child) else {
                    continue;
                };
                match child.tag_name().name().to_lowercase().as_str() {
                    "annotationtext" => info!("   Annotation: {text}"),
                    "id" => id = Some(text),
                    "hash" => hash = Some(text),
                    "size" => size = text.parse().ok(),
                    "originalfilename" => original_file_name = Some(text),
                    _ => {}
                }
            }
            let Some(hash) = hash else {
                info!("   Skipping asset - no hash");
                continue;
            };
            let asset = PklAsset {
                id: id.unwrap_or_default(),
                hash,
                size,
                original_file_name,
            };
            if !self.verify_asset(dir, &asset, &index) {
                errors += 1;
            }
        }
        errors
    }

    fn verify_asset(&mut self, dir: &Path, asset: &PklAsset, index: &HashMap<String, String>) -> bool {
        let Some(file_name) = asset
            .original_file_name
            .as_ref()
            .or_else(|| index.get(&asset.id))
        else {
            error!("*** MISSING FILENAME FOR ASSET {} ***", asset.id);
            return false;
        };

        let mut candidate = dir.join(file_name);
        if !candidate.exists() {
            if let Some(alt) = dir.parent().map(|p| p.join(file_name)).filter(|p| p.exists()) {
                candidate = alt;
            }
        }
        let Ok(metadata) = std::fs::metadata(&candidate) else {
            error!("*** MISSING FILE *** {file_name}");
            return false;
        };
        let actual_size = metadata.len();
        if let Some(size) = asset.size {
            if actual_size != size {
                error!(
                    "*** INCORRECT SIZE *** {} (expected {size}, got {actual_size})",
                    candidate.display()
                );
                return false;
            }
        }

        self.files += 1;
        self.bytes += actual_size;

        let actual = match sha1_base64(&candidate) {
            Ok(actual) => actual,
            Err(e) => {
                error!("Could not hash {}: {e}", candidate.display());
                return false;
            }
        };
        if actual != asset.hash {
            error!(
                "File {} is NOT OK. Hash from PKL: {}, calculated hash: {actual}",
                candidate.display(),
                asset.hash
            );
            return false;
        }
        info!("File {} is: OK", candidate.display());
        if self
            .largest
            .as_ref()
            .map_or(true, |(largest, _)| actual_size > *largest)
        {
            self.largest = Some((actual_size, actual));
        }
        true
    }
}
