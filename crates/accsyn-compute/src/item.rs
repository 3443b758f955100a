//! Work items: what part of a job a single engine invocation computes.
//!
//! The farm passes the item in `ACCSYN_ITEM`. For frame based engines it is a
//! frame (`1001`) or a bucket of frames (`1001-1005`); other engines receive
//! `all` or an opaque URI.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// An inclusive range of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRange {
    /// First frame.
    pub start: i64,
    /// Last frame, inclusive.
    pub end: i64,
}

impl FrameRange {
    /// Create a range, rejecting `start > end`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidItem`] if the range is reversed.
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start > end {
            return Err(Error::invalid_item(
                format!("{start}-{end}"),
                "start frame is after end frame",
            ));
        }
        Ok(Self { start, end })
    }

    /// A range holding one frame.
    #[must_use]
    pub fn single(frame: i64) -> Self {
        Self {
            start: frame,
            end: frame,
        }
    }

    /// Number of frames in the range.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.start.abs_diff(self.end) + 1
    }

    /// A frame range is never empty; present for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether the range is a single frame.
    #[must_use]
    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    /// Iterate over the frames.
    pub fn iter(&self) -> impl Iterator<Item = i64> {
        self.start..=self.end
    }

    /// Split into consecutive buckets of at most `size` frames.
    #[must_use]
    pub fn buckets(&self, size: u64) -> Vec<FrameRange> {
        let size = i64::try_from(size.max(1)).unwrap_or(i64::MAX);
        let mut out = Vec::new();
        let mut start = self.start;
        while start <= self.end {
            let end = start.saturating_add(size - 1).min(self.end);
            out.push(FrameRange { start, end });
            match end.checked_add(1) {
                Some(next) => start = next,
                None => break,
            }
        }
        out
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl FromStr for FrameRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::invalid_item(s, "expected a frame or a frame range");
        // A leading minus belongs to the first frame number.
        let split_at = s
            .char_indices()
            .skip(1)
            .find(|(_, c)| *c == '-')
            .map(|(i, _)| i);
        match split_at {
            Some(idx) => {
                let start = s[..idx].trim().parse().map_err(|_| invalid())?;
                let end = s[idx + 1..].trim().parse().map_err(|_| invalid())?;
                Self::new(start, end)
            }
            None => s.parse().map(Self::single).map_err(|_| invalid()),
        }
    }
}

/// The work item of one task.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Item {
    /// The whole input, for engines without items.
    #[default]
    All,
    /// A frame or bucket of frames.
    Frames(FrameRange),
    /// An opaque item such as a media URI.
    Uri(String),
}

impl Item {
    /// Parse an item as received from the farm.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidItem`] for a numeric range with start after end.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(Self::All);
        };
        if raw.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        if frames_regex().is_match(raw) {
            return raw.parse().map(Self::Frames);
        }
        Ok(Self::Uri(raw.to_string()))
    }

    /// The frame range, if this item is one.
    #[must_use]
    pub fn frames(&self) -> Option<FrameRange> {
        match self {
            Self::Frames(range) => Some(*range),
            _ => None,
        }
    }

    /// A single frame, as needed by engines rendering one frame per task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidItem`] unless the item is exactly one frame.
    pub fn single_frame(&self) -> Result<i64> {
        match self {
            Self::Frames(range) if range.is_single() => Ok(range.start),
            other => Err(Error::invalid_item(
                other.to_string(),
                "a single frame is required",
            )),
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Frames(range) => range.fmt(f),
            Self::Uri(uri) => f.write_str(uri),
        }
    }
}

/// `N` or `A-B`, frames possibly negative.
fn frames_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\d+(\s*-\s*-?\d+)?$").expect("frames pattern is valid"))
}

/// Parse a comma separated frame list such as `1001-1010,1020`.
///
/// # Errors
///
/// Returns [`Error::InvalidItem`] if any part is not a frame or range.
pub fn parse_frame_list(list: &str) -> Result<Vec<FrameRange>> {
    list.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect()
}

/// Substitute a frame number into a sequence path pattern.
///
/// Supports printf style `%d` / `%04d` and `#` padding (`####` is four digits).
/// Patterns without a placeholder are returned unchanged.
#[must_use]
pub fn format_frame(pattern: &str, frame: i64) -> String {
    if let Some(start) = pattern.find('%') {
        let rest = &pattern[start + 1..];
        let width_len = rest.chars().take_while(char::is_ascii_digit).count();
        if rest[width_len..].starts_with('d') {
            let width: usize = rest[..width_len].parse().unwrap_or(0);
            let number = format!("{frame:0width$}");
            return format!(
                "{}{}{}",
                &pattern[..start],
                number,
                &rest[width_len + 1..]
            );
        }
    }
    if let Some(start) = pattern.find('#') {
        let width = pattern[start..].chars().take_while(|c| *c == '#').count();
        let number = format!("{frame:0width$}");
        return format!("{}{}{}", &pattern[..start], number, &pattern[start + width..]);
    }
    pattern.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all() {
        assert_eq!(Item::parse(None).unwrap(), Item::All);
        assert_eq!(Item::parse(Some("all")).unwrap(), Item::All);
        assert_eq!(Item::parse(Some("  ")).unwrap(), Item::All);
    }

    #[test]
    fn test_parse_frames() {
        assert_eq!(
            Item::parse(Some("1001")).unwrap(),
            Item::Frames(FrameRange::single(1001))
        );
        assert_eq!(
            Item::parse(Some("1001-1005")).unwrap(),
            Item::Frames(FrameRange {
                start: 1001,
                end: 1005
            })
        );
    }

    #[test]
    fn test_parse_reversed_range_fails() {
        assert!(Item::parse(Some("1005-1001")).is_err());
    }

    #[test]
    fn test_parse_uri() {
        assert_eq!(
            Item::parse(Some("media/A001_C011.mov")).unwrap(),
            Item::Uri("media/A001_C011.mov".to_string())
        );
    }

    #[test]
    fn test_parse_other_shapes_are_uris() {
        for raw in ["1-2-3", "1001-", "10 20", "-"] {
            assert_eq!(
                Item::parse(Some(raw)).unwrap(),
                Item::Uri(raw.to_string()),
                "{raw}"
            );
        }
        assert_eq!(
            Item::parse(Some("-5 - 5")).unwrap(),
            Item::Frames(FrameRange { start: -5, end: 5 })
        );
    }

    #[test]
    fn test_negative_start_frame() {
        let range: FrameRange = "-5-5".parse().unwrap();
        assert_eq!(range.start, -5);
        assert_eq!(range.end, 5);
        assert_eq!(range.len(), 11);
    }

    #[test]
    fn test_item_display() {
        assert_eq!(Item::All.to_string(), "all");
        assert_eq!(Item::parse(Some("7")).unwrap().to_string(), "7");
        assert_eq!(Item::parse(Some("1-3")).unwrap().to_string(), "1-3");
    }

    #[test]
    fn test_single_frame() {
        assert_eq!(Item::parse(Some("12")).unwrap().single_frame().unwrap(), 12);
        assert!(Item::parse(Some("12-13")).unwrap().single_frame().is_err());
        assert!(Item::All.single_frame().is_err());
    }

    #[test]
    fn test_buckets() {
        let range = FrameRange::new(1001, 1012).unwrap();
        let buckets = range.buckets(5);
        assert_eq!(
            buckets,
            vec![
                FrameRange::new(1001, 1005).unwrap(),
                FrameRange::new(1006, 1010).unwrap(),
                FrameRange::new(1011, 1012).unwrap(),
            ]
        );
        assert_eq!(range.buckets(0).len(), 12);
    }

    #[test]
    fn test_frame_range_iter() {
        let frames: Vec<i64> = FrameRange::new(3, 5).unwrap().iter().collect();
        assert_eq!(frames, vec![3, 4, 5]);
    }

    #[test]
    fn test_parse_frame_list() {
        let list = parse_frame_list("1001-1010, 1020").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1], FrameRange::single(1020));
        assert!(parse_frame_list("1001-x").is_err());
    }

    #[test]
    fn test_format_frame() {
        assert_eq!(format_frame("/r/shot.%04d.ass", 7), "/r/shot.0007.ass");
        assert_eq!(format_frame("/r/shot.%d.ass", 1001), "/r/shot.1001.ass");
        assert_eq!(format_frame("/r/shot.####.ifd", 42), "/r/shot.0042.ifd");
        assert_eq!(format_frame("/r/shot.ifd", 42), "/r/shot.ifd");
    }
}
