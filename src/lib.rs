//! Client for a line-JSON analysis-server subprocess.
//!
//! The server is an external black box that answers code-intelligence
//! queries (completions, quick info, definitions, references, diagnostics,
//! rename, signature help) over its stdio: one JSON document per line,
//! requests tagged with a sequence number the matching response echoes.
//! This crate owns the subprocess lifecycle and exposes typed queries.

pub mod codec;
pub mod display;
pub mod types;

pub(crate) mod diagnostics;
pub(crate) mod protocol;

mod client;
mod error;

pub use client::Client;
pub use error::ClientError;
pub use types::{
    ClientConfig, CompletionDetails, CompletionEntry, Diagnostic, DiagnosticSeverity,
    DiagnosticsSnapshot, DisplayPart, Edit, FileDiagnostics, FileEdits, FileSpan, NavItem,
    Position, QuickInfo, ReferenceSpan, References, Reply, ServerEvent, SignatureHelpItem,
    SignatureHelpItems, SignatureParameter, Span, StopReason, without_warnings,
};
