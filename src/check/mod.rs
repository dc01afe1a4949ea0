//! Translation of the external syntax checker's output into positioned
//! editor diagnostics.
//!
//! The OpenEdge compiler reports a file, a 1-based line number, a severity
//! string and a message; it never reports columns. This module rebuilds a
//! tight character range for each message (trimming surrounding whitespace
//! when the live line text is available) and buckets the results into two
//! named per-file collections, one per severity channel. Launching the
//! checker binary itself is a collaborator concern behind the
//! [`SyntaxCheck`] trait.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use tower_lsp::lsp_types::*;

use crate::config::OpenEdgeConfig;

/// One message from the external syntax check. `line` is 1-based; 0 means
/// the message carries no location (a file-level or tool-level failure).
#[derive(Debug, Clone, Deserialize)]
pub struct CheckMessage {
    pub file: String,
    pub line: u32,
    pub severity: String,
    #[serde(rename = "msg")]
    pub message: String,
}

impl CheckMessage {
    /// Decode the checker runner's JSON output (an array of messages).
    pub fn parse_many(json: &str) -> Result<Vec<CheckMessage>, CheckError> {
        serde_json::from_str(json).map_err(|e| CheckError::ParseError(e.to_string()))
    }
}

#[derive(Debug)]
pub enum CheckError {
    IoError(String),
    ParseError(String),
    CheckFailed(String),
}

impl std::fmt::Display for CheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckError::IoError(e) => write!(f, "IO error: {}", e),
            CheckError::ParseError(e) => write!(f, "Parse error: {}", e),
            CheckError::CheckFailed(e) => write!(f, "Syntax check failed: {}", e),
        }
    }
}

impl std::error::Error for CheckError {}

/// External syntax-check collaborator. Implementations run the OpenEdge
/// binary (or a test double) and return its message list; process launching
/// and argument construction live entirely behind this seam.
#[async_trait]
pub trait SyntaxCheck: Send + Sync {
    async fn check(
        &self,
        path: &Path,
        config: &OpenEdgeConfig,
    ) -> Result<Vec<CheckMessage>, CheckError>;
}

/// Named per-file diagnostic store. Two of these exist per server, one for
/// errors and one for warnings; each publish cycle replaces their contents
/// wholesale, never merges into them.
#[derive(Debug)]
pub struct DiagnosticCollection {
    name: &'static str,
    entries: HashMap<String, Vec<Diagnostic>>,
}

impl DiagnosticCollection {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: HashMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Append to a file's bucket, stamping the channel name as the
    /// diagnostic source so the editor shows which channel it came from.
    pub fn insert(&mut self, uri: String, mut diagnostic: Diagnostic) {
        diagnostic.source = Some(self.name.to_string());
        self.entries.entry(uri).or_default().push(diagnostic);
    }

    pub fn get(&self, uri: &str) -> Option<&[Diagnostic]> {
        self.entries.get(uri).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Diagnostic>)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The document the editor currently has focus on, identified by its
/// canonical URI. Only this document's live text is available for range
/// tightening.
#[derive(Debug)]
pub struct ActiveDocument<'a> {
    pub uri: String,
    pub text: &'a str,
}

lazy_static! {
    static ref TRIM_RE: Regex = Regex::new(r"^(\s*)(.*?)(\s*)$").unwrap();
}

/// Canonical `file://` URI for a checker-reported path, used as the bucket
/// key so one file never splits across two keys.
pub fn canonical_file_uri(path: &str) -> String {
    Uri::from_file_path(path)
        .ok()
        .map(|uri| uri.to_string())
        .unwrap_or_else(|| format!("file://{}", path))
}

/// Rebuild the two diagnostic collections from a checker run.
///
/// Both collections are cleared first, so a run replaces prior results for
/// the whole workspace. Messages with `line == 0` produce no positioned
/// diagnostic; their texts are returned for out-of-band display instead.
pub fn rebuild_diagnostics(
    messages: &[CheckMessage],
    active: Option<&ActiveDocument<'_>>,
    errors: &mut DiagnosticCollection,
    warnings: &mut DiagnosticCollection,
) -> Vec<String> {
    errors.clear();
    warnings.clear();

    let mut unlocated = Vec::new();

    for message in messages {
        if message.line == 0 {
            unlocated.push(message.message.clone());
            continue;
        }

        let uri = canonical_file_uri(&message.file);
        let line = message.line - 1;

        // Provisional range: the whole line. The end column is only known
        // for the active document; elsewhere the editor clamps the
        // out-of-range sentinel to the actual line end.
        let mut start_col = 0u32;
        let mut end_col = u32::MAX;

        if let Some(doc) = active {
            if doc.uri == uri {
                if let Some(text) = doc.text.lines().nth(line as usize) {
                    let (leading, trailing) = surrounding_whitespace(text);
                    start_col = leading as u32;
                    end_col = (text.chars().count() - trailing) as u32;
                }
            }
        }

        let severity = map_severity(&message.severity);
        let diagnostic = Diagnostic {
            range: Range {
                start: Position {
                    line,
                    character: start_col,
                },
                end: Position {
                    line,
                    character: end_col,
                },
            },
            severity: Some(severity),
            message: message.message.clone(),
            ..Default::default()
        };

        if severity == DiagnosticSeverity::WARNING {
            warnings.insert(uri, diagnostic);
        } else {
            errors.insert(uri, diagnostic);
        }
    }

    unlocated
}

/// Lengths (in chars) of the leading and trailing whitespace runs of a line.
fn surrounding_whitespace(line: &str) -> (usize, usize) {
    match TRIM_RE.captures(line) {
        Some(caps) => (
            caps[1].chars().count(),
            caps[3].chars().count(),
        ),
        None => (0, 0),
    }
}

/// error / warning / anything else → error.
fn map_severity(severity: &str) -> DiagnosticSeverity {
    match severity {
        "warning" => DiagnosticSeverity::WARNING,
        _ => DiagnosticSeverity::ERROR,
    }
}
