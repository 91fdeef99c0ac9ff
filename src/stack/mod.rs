//! Stack trace normalization.
//!
//! Turns the raw stack text of an [`ErrorEvent`] into ordered
//! [`StackFrame`]s, innermost call first, and optionally attaches a preview
//! of the source lines around each frame.
//!
//! # Recognized frame lines
//!
//! ```text
//!     at handleClick (https://app.example.com/main.js:10:5)   function + location
//!     at https://app.example.com/main.js:10:5                 location only
//!              at ./src/main.rs:42:9                          raw Rust backtrace location
//! ```
//!
//! Any other line (the `Error: message` header, raw Rust backtrace symbol
//! lines, `at async Promise.all (index 0)`) contributes no frame.
//! [`ErrorEvent::from_error`] writes its backtrace in the first form, so
//! Rust frames keep their function names.

mod source;

pub use source::{DefaultSourceFetcher, FsSourceFetcher, HttpSourceFetcher, SourceFetcher};

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use futures_util::future::join_all;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StackError;
use crate::event::ErrorEvent;

/// Default number of lines shown on each side of the error line.
pub const DEFAULT_PREVIEW_RADIUS: u32 = 5;

pub(crate) const UNKNOWN_FUNCTION: &str = "anonymous";
pub(crate) const UNKNOWN_FILE: &str = "unknown";

/// `at <function> (<file>:<line>:<column>)`
static CALL_SITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)at\s+(.*)\s+\((.*):(\d*):(\d*)\)").expect("call site pattern is valid")
});

/// `at <file>:<line>:<column>`
static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)at\s+()(.*):(\d*):(\d*)").expect("location pattern is valid")
});

/// One normalized stack trace entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub function: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    /// Absolute line number → trimmed source text around `line`.
    ///
    /// `None` when previews are disabled or the source could not be fetched.
    pub preview: Option<BTreeMap<u32, String>>,
}

impl StackFrame {
    /// Creates a frame without a preview.
    pub fn new(function: impl Into<String>, file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            function: function.into(),
            file: file.into(),
            line,
            column,
            preview: None,
        }
    }

    /// Placeholder used when a trace yields no frames at all.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_FUNCTION, UNKNOWN_FILE, 0, 0)
    }

    /// Whether the frame points at a concrete line of a known file.
    pub fn has_location(&self) -> bool {
        self.file != UNKNOWN_FILE && self.line > 0
    }

    /// Computes the preview window for `line` in `source`.
    ///
    /// Covers the half-open range `[line - radius, line + radius)` of
    /// 1-based line numbers, clipped to the lines that exist.
    pub fn preview_window(source: &str, line: u32, radius: u32) -> BTreeMap<u32, String> {
        let lines: Vec<&str> = source.lines().collect();
        let last = u32::try_from(lines.len()).unwrap_or(u32::MAX);

        let start = line.saturating_sub(radius).max(1);
        let end = line.saturating_add(radius).min(last.saturating_add(1));

        (start..end)
            .map(|n| (n, lines[(n - 1) as usize].trim().to_string()))
            .collect()
    }

    fn from_captures(caps: &Captures<'_>) -> Self {
        let text = |i: usize| {
            caps.get(i)
                .map(|m| m.as_str().trim())
                .filter(|s| !s.is_empty())
        };
        let number = |i: usize| text(i).and_then(|s| s.parse().ok()).unwrap_or(0);

        Self::new(
            text(1).unwrap_or(UNKNOWN_FUNCTION),
            text(2).unwrap_or(UNKNOWN_FILE),
            number(3),
            number(4),
        )
    }
}

/// Splits raw stack text into distinct, non-blank lines.
///
/// Runs of line breaks collapse, and a line identical to an earlier one is
/// dropped so recursive frames are reported once.
pub fn normalize_lines(stack: &str) -> Vec<&str> {
    let mut seen = HashSet::new();
    stack
        .split(['\n', '\r'])
        .filter(|line| !line.trim().is_empty())
        .filter(|line| seen.insert(*line))
        .collect()
}

/// Parses a single line against the two frame grammars, in order.
pub fn parse_line(line: &str) -> Option<StackFrame> {
    CALL_SITE_RE
        .captures(line)
        .or_else(|| LOCATION_RE.captures(line))
        .map(|caps| StackFrame::from_captures(&caps))
}

/// Parses the stack text of `error` into frames.
///
/// Fails when the error has no stack text or none of its lines is a frame.
pub fn parse_stack(error: &ErrorEvent) -> Result<Vec<StackFrame>, StackError> {
    let stack = error.usable_stack().ok_or(StackError::MissingStack)?;

    let lines = normalize_lines(stack);
    let frames: Vec<StackFrame> = lines.iter().filter_map(|line| parse_line(line)).collect();

    if frames.is_empty() {
        return Err(StackError::NoFrames { lines: lines.len() });
    }
    Ok(frames)
}

/// Resolves stack traces into frames, optionally with source previews.
#[derive(Debug, Clone)]
pub struct StackTraceResolver {
    fetcher: Option<Arc<dyn SourceFetcher>>,
    radius: u32,
}

impl Default for StackTraceResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl StackTraceResolver {
    /// Creates a resolver that never fetches sources.
    pub fn new() -> Self {
        Self {
            fetcher: None,
            radius: DEFAULT_PREVIEW_RADIUS,
        }
    }

    /// Enables previews using `fetcher` to read source files.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Sets how many lines before and after the frame line a preview covers.
    pub fn with_radius(mut self, radius: u32) -> Self {
        self.radius = radius;
        self
    }

    /// Parses `error` into frames, degrading to an empty list.
    pub fn resolve(&self, error: &ErrorEvent) -> Vec<StackFrame> {
        match parse_stack(error) {
            Ok(frames) => frames,
            Err(e) => {
                warn!(
                    error = %e,
                    exception = error.name.as_deref().unwrap_or("unknown"),
                    "Could not extract stack frames"
                );
                Vec::new()
            }
        }
    }

    /// Parses `error` and enriches the frames when a fetcher is configured.
    pub async fn resolve_enriched(&self, error: &ErrorEvent) -> Vec<StackFrame> {
        let frames = self.resolve(error);
        self.enrich(frames).await
    }

    /// Attaches source previews to `frames`.
    ///
    /// Each distinct file is fetched once, all files concurrently. A failed
    /// fetch leaves the preview of the affected frames as `None`.
    pub async fn enrich(&self, mut frames: Vec<StackFrame>) -> Vec<StackFrame> {
        let Some(fetcher) = self.fetcher.as_deref() else {
            return frames;
        };

        let files: BTreeSet<String> = frames
            .iter()
            .filter(|f| f.has_location())
            .map(|f| f.file.clone())
            .collect();

        let fetches = files.into_iter().map(|file| async move {
            let result = fetcher.fetch(&file).await;
            (file, result)
        });

        let sources: HashMap<String, Option<String>> = join_all(fetches)
            .await
            .into_iter()
            .map(|(file, result)| match result {
                Ok(text) => (file, Some(text)),
                Err(e) => {
                    warn!(file = %file, error = %e, "Source preview unavailable");
                    (file, None)
                }
            })
            .collect();

        for frame in frames.iter_mut().filter(|f| f.has_location()) {
            frame.preview = sources
                .get(&frame.file)
                .and_then(Option::as_deref)
                .map(|text| StackFrame::preview_window(text, frame.line, self.radius));
        }

        debug!(frames = frames.len(), files = sources.len(), "Enriched stack frames");
        frames
    }
}
