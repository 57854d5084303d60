//! Public types consumed by callers of the client.
//!
//! The result structs deserialize the server's wire shapes directly: the
//! protocol already speaks 1-based lines and 1-based character offsets,
//! so no conversion layer sits between the wire and the caller. Editors
//! with 0-based cursor coordinates must convert before building requests
//! and after reading results. Unknown wire fields are ignored to tolerate
//! server version drift.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default deadline for a matching response, in seconds.
pub const RESPONSE_TIMEOUT_SECONDS: u64 = 20;

fn default_command() -> String {
    String::from("tsserver")
}

fn default_response_timeout_ms() -> u64 {
    RESPONSE_TIMEOUT_SECONDS * 1000
}

/// Configuration for the analysis-server client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Executable command for the server binary.
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the server process. Defaults to the
    /// client's own working directory.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables layered over the inherited environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Deadline for a matching response, in milliseconds.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

impl ClientConfig {
    /// Deadline for a matching response.
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Outcome of a query the server answered.
///
/// `Rejected` carries the server's own `success: false` message — an
/// expected, recoverable result (e.g. "no definition found"), distinct
/// from every [`crate::ClientError`] transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    Success(T),
    Rejected(String),
}

impl<T> Reply<T> {
    /// The success body, if the server accepted the request.
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(body) => Some(body),
            Self::Rejected(_) => None,
        }
    }

    /// The server's rejection message, if any.
    #[must_use]
    pub fn rejection(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Rejected(message) => Some(message),
        }
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// A position in a file: 1-based line, 1-based character offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Position {
    pub line: u32,
    pub offset: u32,
}

/// A span within one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

/// A span tagged with the file it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileSpan {
    pub file: String,
    pub start: Position,
    pub end: Position,
}

/// One completion candidate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEntry {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub kind_modifiers: String,
    #[serde(default)]
    pub sort_text: Option<String>,
}

impl CompletionEntry {
    /// The server emits `kind: "warning"` placeholder entries that are
    /// not real candidates.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        self.kind == "warning"
    }
}

/// Drop placeholder entries, keeping real candidates in order.
#[must_use]
pub fn without_warnings(entries: Vec<CompletionEntry>) -> Vec<CompletionEntry> {
    entries.into_iter().filter(|e| !e.is_warning()).collect()
}

/// One fragment of server-rendered display text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DisplayPart {
    pub text: String,
    #[serde(default)]
    pub kind: String,
}

/// Detailed information for one completion candidate.
///
/// Detail responses carry only the requested names, in no guaranteed
/// order relative to the request order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionDetails {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub kind_modifiers: String,
    #[serde(default)]
    pub display_parts: Vec<DisplayPart>,
    #[serde(default)]
    pub documentation: Vec<DisplayPart>,
}

/// Symbol information at a position.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickInfo {
    pub kind: String,
    #[serde(default)]
    pub kind_modifiers: String,
    pub display_string: String,
    #[serde(default)]
    pub documentation: String,
    pub start: Position,
    pub end: Position,
}

/// One reference occurrence, with the text of the line it sits on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceSpan {
    pub file: String,
    pub start: Position,
    pub end: Position,
    #[serde(default)]
    pub line_text: String,
    #[serde(default)]
    pub is_write_access: bool,
}

/// All references to the symbol at a position.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct References {
    pub refs: Vec<ReferenceSpan>,
    #[serde(default)]
    pub symbol_name: String,
    #[serde(default)]
    pub symbol_display_string: String,
}

/// Severity of a diagnostic, mapped from the wire category string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Suggestion,
}

impl DiagnosticSeverity {
    /// Convert from the wire category string.
    ///
    /// Returns `None` for categories this client does not know about.
    #[must_use]
    pub fn from_category(category: &str) -> Option<Self> {
        match category {
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            "suggestion" => Some(Self::Suggestion),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Suggestion => "suggestion",
        }
    }
}

/// A single diagnostic reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Diagnostic {
    pub start: Position,
    #[serde(default)]
    pub end: Option<Position>,
    pub text: String,
    #[serde(default)]
    pub category: Option<String>,
}

impl Diagnostic {
    /// Severity of this diagnostic. The server omits the category for
    /// plain check errors, so absent or unknown categories are errors.
    #[must_use]
    pub fn severity(&self) -> DiagnosticSeverity {
        self.category
            .as_deref()
            .and_then(DiagnosticSeverity::from_category)
            .unwrap_or(DiagnosticSeverity::Error)
    }

    /// Format as `path:line:offset: severity: message`.
    #[must_use]
    pub fn display_with_path(&self, path: &std::path::Path) -> String {
        format!(
            "{}:{}:{}: {}: {}",
            path.display(),
            self.start.line,
            self.start.offset,
            self.severity().label(),
            self.text,
        )
    }
}

/// Diagnostics for one file, in server order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileDiagnostics {
    pub file: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// One edit to apply: replace `span` with `new_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: Position,
    pub end: Position,
    pub new_text: String,
}

/// Edits for one file. Applying them is the caller's responsibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEdits {
    pub file: String,
    pub edits: Vec<Edit>,
}

/// One parameter of a candidate signature.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureParameter {
    #[serde(default)]
    pub display_parts: Vec<DisplayPart>,
    #[serde(default)]
    pub documentation: Vec<DisplayPart>,
}

/// One candidate call signature, decomposed into display fragments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureHelpItem {
    #[serde(default)]
    pub prefix_display_parts: Vec<DisplayPart>,
    #[serde(default)]
    pub separator_display_parts: Vec<DisplayPart>,
    #[serde(default)]
    pub suffix_display_parts: Vec<DisplayPart>,
    #[serde(default)]
    pub parameters: Vec<SignatureParameter>,
    #[serde(default)]
    pub documentation: Vec<DisplayPart>,
}

/// Candidate signatures for the call under the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureHelpItems {
    pub items: Vec<SignatureHelpItem>,
    #[serde(default)]
    pub selected_item_index: u32,
    #[serde(default)]
    pub argument_index: u32,
}

/// One node of the document-symbol tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavItem {
    pub text: String,
    pub kind: String,
    #[serde(default)]
    pub kind_modifiers: String,
    #[serde(default)]
    pub spans: Vec<Span>,
    #[serde(default)]
    pub child_items: Vec<NavItem>,
}

/// Reason a server session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The server closed its output stream.
    Exited,
    /// Reading from the server failed.
    Failed(String),
}

/// An out-of-band message from the server, routed off the query path.
///
/// Events never satisfy a pending query; they are drained via
/// [`crate::Client::poll_events`].
#[derive(Debug)]
pub enum ServerEvent {
    /// The server pushed fresh diagnostics for a file.
    Diagnostics {
        file: PathBuf,
        items: Vec<Diagnostic>,
    },
    /// The server session ended.
    Stopped { reason: StopReason },
}

/// Immutable snapshot of all event-pushed diagnostics.
///
/// Counts are computed from the canonical per-file data rather than
/// cached alongside it.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsSnapshot {
    /// Per-file diagnostics, sorted with error-containing files first.
    files: Vec<(PathBuf, Vec<Diagnostic>)>,
}

impl DiagnosticsSnapshot {
    pub(crate) fn new(files: Vec<(PathBuf, Vec<Diagnostic>)>) -> Self {
        Self { files }
    }

    /// Per-file diagnostics, sorted with error-containing files first.
    #[must_use]
    pub fn files(&self) -> &[(PathBuf, Vec<Diagnostic>)] {
        &self.files
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn count_by_severity(&self, severity: DiagnosticSeverity) -> usize {
        self.files
            .iter()
            .flat_map(|(_, items)| items)
            .filter(|d| d.severity() == severity)
            .count()
    }

    /// Number of error-level diagnostics.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Error)
    }

    /// Number of warning-level diagnostics.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Warning)
    }

    /// Number of suggestion-level diagnostics.
    #[must_use]
    pub fn suggestion_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Suggestion)
    }

    /// Total diagnostic count across all files.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.files.iter().map(|(_, items)| items.len()).sum()
    }

    /// Format a compact status string like "E:3 W:5".
    #[must_use]
    pub fn status_string(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        format!("E:{} W:{}", self.error_count(), self.warning_count())
    }
}
