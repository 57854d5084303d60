//! Wire envelope types and per-command request builders.
//!
//! Field names here are a bit-exact contract with the external server:
//! requests are `{"seq", "type": "request", "command", "arguments"}`,
//! responses echo the request's `seq` and carry `success`/`body`/
//! `message`, and unsolicited events are `{"type": "event", "event",
//! "body"}`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ClientError;
use crate::types::{Edit, FileEdits, Reply};

/// Wire command names.
pub(crate) mod command {
    pub const OPEN: &str = "open";
    pub const CLOSE: &str = "close";
    pub const RELOAD: &str = "reload";
    pub const COMPLETIONS: &str = "completions";
    pub const COMPLETION_ENTRY_DETAILS: &str = "completionEntryDetails";
    pub const QUICKINFO: &str = "quickinfo";
    pub const DEFINITION: &str = "definition";
    pub const REFERENCES: &str = "references";
    pub const GETERR: &str = "geterr";
    pub const RENAME: &str = "rename";
    pub const SIGNATURE_HELP: &str = "signatureHelp";
    pub const NAVTREE: &str = "navtree";
    pub const EXIT: &str = "exit";
}

#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub command: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

impl Request {
    pub fn new(seq: u64, command: &'static str, arguments: Option<serde_json::Value>) -> Self {
        Self {
            seq,
            kind: "request",
            command,
            arguments,
        }
    }
}

/// A sequence-matched response envelope.
///
/// `success: false` means `body` must be treated as absent even when the
/// server sent one.
#[derive(Debug, Deserialize)]
pub(crate) struct ResponseEnvelope {
    pub seq: u64,
    pub command: String,
    pub success: bool,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Classification of one message read off the server's output stream.
#[derive(Debug)]
pub(crate) enum Incoming {
    /// `type: "response"` with a usable `seq`. Kept raw so routing by
    /// sequence number never depends on the rest of the envelope being
    /// well-formed.
    Response { seq: u64, raw: serde_json::Value },
    /// `type: "event"` — unsolicited, never satisfies a query.
    Event {
        name: String,
        body: Option<serde_json::Value>,
    },
}

pub(crate) fn classify(frame: &serde_json::Value) -> Option<Incoming> {
    match frame.get("type").and_then(serde_json::Value::as_str) {
        Some("response") => {
            let seq = frame.get("seq").and_then(serde_json::Value::as_u64)?;
            Some(Incoming::Response {
                seq,
                raw: frame.clone(),
            })
        }
        Some("event") => {
            let name = frame.get("event")?.as_str()?.to_string();
            Some(Incoming::Event {
                name,
                body: frame.get("body").cloned(),
            })
        }
        _ => None,
    }
}

/// Decode a raw matched response into an envelope, verifying the
/// command echo.
pub(crate) fn decode_envelope(
    raw: serde_json::Value,
    expected_command: &str,
) -> Result<ResponseEnvelope, ClientError> {
    let envelope: ResponseEnvelope = serde_json::from_value(raw)
        .map_err(|e| ClientError::Protocol(format!("invalid response envelope: {e}")))?;
    if envelope.command != expected_command {
        return Err(ClientError::Protocol(format!(
            "response for `{}` (seq {}) arrived while awaiting `{expected_command}`",
            envelope.command, envelope.seq
        )));
    }
    Ok(envelope)
}

/// Turn an envelope into a typed reply.
///
/// `success: false` becomes `Reply::Rejected` with the server's message;
/// a missing or malformed body on success is a protocol error for this
/// call only.
pub(crate) fn decode_reply<T: serde::de::DeserializeOwned>(
    envelope: ResponseEnvelope,
) -> Result<Reply<T>, ClientError> {
    if !envelope.success {
        return Ok(Reply::Rejected(
            envelope
                .message
                .unwrap_or_else(|| String::from("request rejected")),
        ));
    }
    let body = envelope.body.ok_or_else(|| {
        ClientError::Protocol(format!("missing body in `{}` response", envelope.command))
    })?;
    serde_json::from_value(body)
        .map(Reply::Success)
        .map_err(|e| ClientError::Protocol(format!("invalid `{}` body: {e}", envelope.command)))
}

fn wire_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(crate) fn file_args(file: &Path) -> serde_json::Value {
    json!({ "file": wire_path(file) })
}

pub(crate) fn reload_args(file: &Path, tmpfile: &Path) -> serde_json::Value {
    json!({ "file": wire_path(file), "tmpfile": wire_path(tmpfile) })
}

pub(crate) fn position_args(file: &Path, line: u32, offset: u32) -> serde_json::Value {
    json!({ "file": wire_path(file), "line": line, "offset": offset })
}

pub(crate) fn completions_args(
    file: &Path,
    line: u32,
    offset: u32,
    prefix: &str,
) -> serde_json::Value {
    json!({ "file": wire_path(file), "line": line, "offset": offset, "prefix": prefix })
}

pub(crate) fn completion_details_args(
    file: &Path,
    line: u32,
    offset: u32,
    entry_names: &[String],
) -> serde_json::Value {
    json!({
        "file": wire_path(file),
        "line": line,
        "offset": offset,
        "entryNames": entry_names,
    })
}

pub(crate) fn geterr_args(files: &[std::path::PathBuf]) -> serde_json::Value {
    let files: Vec<String> = files.iter().map(|f| wire_path(f)).collect();
    json!({ "files": files, "delay": 0 })
}

pub(crate) fn rename_args(file: &Path, line: u32, offset: u32) -> serde_json::Value {
    json!({
        "file": wire_path(file),
        "line": line,
        "offset": offset,
        "findInComments": false,
        "findInStrings": false,
    })
}

/// Rename body as the server reports it: whether the symbol can be
/// renamed at all, plus the occurrence locations grouped per file.
#[derive(Debug, Deserialize)]
pub(crate) struct RenameBody {
    pub info: RenameInfo,
    #[serde(default)]
    pub locs: Vec<RenameFileLocs>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RenameInfo {
    pub can_rename: bool,
    #[serde(default)]
    pub localized_error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RenameFileLocs {
    pub file: String,
    #[serde(default)]
    pub locs: Vec<crate::types::Span>,
}

/// Pair the server's rename locations with the replacement text. The
/// server never sees the new name; the caller applies the edits.
pub(crate) fn rename_edits(body: RenameBody, new_name: &str) -> Reply<Vec<FileEdits>> {
    if !body.info.can_rename {
        return Reply::Rejected(
            body.info
                .localized_error_message
                .unwrap_or_else(|| String::from("symbol cannot be renamed")),
        );
    }
    Reply::Success(
        body.locs
            .into_iter()
            .map(|group| FileEdits {
                file: group.file,
                edits: group
                    .locs
                    .into_iter()
                    .map(|span| Edit {
                        start: span.start,
                        end: span.end,
                        new_text: new_name.to_string(),
                    })
                    .collect(),
            })
            .collect(),
    )
}

/// Body of a `syntaxDiag`/`semanticDiag` event.
#[derive(Debug, Deserialize)]
pub(crate) struct DiagnosticEventBody {
    pub file: String,
    #[serde(default)]
    pub diagnostics: Vec<crate::types::Diagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QuickInfo;

    #[test]
    fn test_request_serialization_with_arguments() {
        let req = Request::new(
            42,
            command::QUICKINFO,
            Some(position_args(Path::new("/a.ts"), 3, 7)),
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["seq"], 42);
        assert_eq!(json["type"], "request");
        assert_eq!(json["command"], "quickinfo");
        assert_eq!(json["arguments"]["file"], "/a.ts");
        assert_eq!(json["arguments"]["line"], 3);
        assert_eq!(json["arguments"]["offset"], 7);
    }

    #[test]
    fn test_request_serialization_without_arguments() {
        let req = Request::new(1, command::EXIT, None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["command"], "exit");
        assert!(
            json.get("arguments").is_none(),
            "arguments must be omitted, not null"
        );
    }

    #[test]
    fn test_completion_details_args_carry_entry_names() {
        let args = completion_details_args(
            Path::new("/a.ts"),
            1,
            10,
            &["foo".to_string(), "bar".to_string()],
        );
        assert_eq!(args["entryNames"][0], "foo");
        assert_eq!(args["entryNames"][1], "bar");
    }

    #[test]
    fn test_geterr_args_carry_file_list() {
        let args = geterr_args(&[std::path::PathBuf::from("/a.ts")]);
        assert_eq!(args["files"][0], "/a.ts");
        assert_eq!(args["delay"], 0);
    }

    #[test]
    fn test_classify_response() {
        let frame = serde_json::json!({
            "seq": 5, "type": "response", "command": "open", "success": true
        });
        match classify(&frame) {
            Some(Incoming::Response { seq, .. }) => assert_eq!(seq, 5),
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_event() {
        let frame = serde_json::json!({
            "type": "event", "event": "semanticDiag", "body": { "file": "/a.ts", "diagnostics": [] }
        });
        match classify(&frame) {
            Some(Incoming::Event { name, body }) => {
                assert_eq!(name, "semanticDiag");
                assert!(body.is_some());
            }
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_rejects_response_without_seq() {
        let frame = serde_json::json!({ "type": "response", "command": "open" });
        assert!(classify(&frame).is_none());
    }

    #[test]
    fn test_classify_rejects_unknown_type() {
        assert!(classify(&serde_json::json!({ "type": "request" })).is_none());
        assert!(classify(&serde_json::json!({ "hello": "world" })).is_none());
        assert!(classify(&serde_json::json!(17)).is_none());
    }

    #[test]
    fn test_decode_envelope_checks_command_echo() {
        let raw = serde_json::json!({
            "seq": 1, "type": "response", "command": "definition", "success": true, "body": []
        });
        let err = decode_envelope(raw, "quickinfo").unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn test_decode_reply_failure_carries_message() {
        let raw = serde_json::json!({
            "seq": 7, "type": "response", "command": "quickinfo",
            "success": false, "message": "no info"
        });
        let envelope = decode_envelope(raw, "quickinfo").unwrap();
        let reply: Reply<QuickInfo> = decode_reply(envelope).unwrap();
        assert_eq!(reply.rejection(), Some("no info"));
    }

    #[test]
    fn test_decode_reply_failure_without_message() {
        let raw = serde_json::json!({
            "seq": 7, "type": "response", "command": "quickinfo", "success": false
        });
        let envelope = decode_envelope(raw, "quickinfo").unwrap();
        let reply: Reply<QuickInfo> = decode_reply(envelope).unwrap();
        assert_eq!(reply.rejection(), Some("request rejected"));
    }

    #[test]
    fn test_decode_reply_missing_body_is_protocol_error() {
        let raw = serde_json::json!({
            "seq": 2, "type": "response", "command": "quickinfo", "success": true
        });
        let envelope = decode_envelope(raw, "quickinfo").unwrap();
        let err = decode_reply::<QuickInfo>(envelope).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn test_decode_reply_wrong_body_shape_is_protocol_error() {
        let raw = serde_json::json!({
            "seq": 2, "type": "response", "command": "quickinfo",
            "success": true, "body": "not an object"
        });
        let envelope = decode_envelope(raw, "quickinfo").unwrap();
        let err = decode_reply::<QuickInfo>(envelope).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn test_rename_edits_pair_locations_with_new_name() {
        let body: RenameBody = serde_json::from_value(serde_json::json!({
            "info": { "canRename": true, "displayName": "x" },
            "locs": [
                {
                    "file": "/a.ts",
                    "locs": [
                        {"start": {"line": 1, "offset": 7}, "end": {"line": 1, "offset": 8}},
                        {"start": {"line": 4, "offset": 3}, "end": {"line": 4, "offset": 4}}
                    ]
                },
                {
                    "file": "/b.ts",
                    "locs": [
                        {"start": {"line": 2, "offset": 1}, "end": {"line": 2, "offset": 2}}
                    ]
                }
            ]
        }))
        .unwrap();

        let edits = rename_edits(body, "renamed").success().unwrap();
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0].file, "/a.ts");
        assert_eq!(edits[0].edits.len(), 2);
        assert_eq!(edits[0].edits[0].new_text, "renamed");
        assert_eq!(edits[1].file, "/b.ts");
    }

    #[test]
    fn test_rename_edits_rejected_when_not_renameable() {
        let body: RenameBody = serde_json::from_value(serde_json::json!({
            "info": {
                "canRename": false,
                "localizedErrorMessage": "You cannot rename this element."
            },
            "locs": []
        }))
        .unwrap();

        let reply = rename_edits(body, "renamed");
        assert_eq!(reply.rejection(), Some("You cannot rename this element."));
    }

    #[test]
    fn test_diagnostic_event_body_deserialization() {
        let body: DiagnosticEventBody = serde_json::from_value(serde_json::json!({
            "file": "/a.ts",
            "diagnostics": [{
                "start": {"line": 9, "offset": 1},
                "end": {"line": 9, "offset": 4},
                "text": "Cannot find name 'foo'.",
                "category": "error"
            }]
        }))
        .unwrap();
        assert_eq!(body.file, "/a.ts");
        assert_eq!(body.diagnostics.len(), 1);
    }
}
