//! The analysis-server client — owns one subprocess and the
//! sequence-correlated request/response channel over its stdio.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use crate::codec::{MessageReader, MessageWriter};
use crate::diagnostics::DiagnosticsStore;
use crate::error::ClientError;
use crate::protocol::{self, Incoming, Request, command};
use crate::types::{
    ClientConfig, CompletionDetails, CompletionEntry, DiagnosticsSnapshot, FileDiagnostics,
    FileEdits, FileSpan, NavItem, QuickInfo, References, Reply, ServerEvent, SignatureHelpItems,
    StopReason,
};

const SHUTDOWN_TIMEOUT_SECS: u64 = 2;

const WRITER_CHANNEL_CAPACITY: usize = 64;

const EVENT_CHANNEL_CAPACITY: usize = 256;

enum WriterCommand {
    Send(serde_json::Value),
    Shutdown,
}

type PendingMap = Arc<tokio::sync::Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>>;

/// One live server session. Dropping it kills the child.
struct Connection {
    child: Child,
    writer_tx: mpsc::Sender<WriterCommand>,
    /// Next sequence number. Strictly increasing, never reused within
    /// this session; notifications and queries draw from the same
    /// counter but only queries register a pending entry.
    next_seq: u64,
    pending: PendingMap,
    event_rx: mpsc::Receiver<ServerEvent>,
    #[allow(dead_code)]
    reader_handle: tokio::task::JoinHandle<()>,
    #[allow(dead_code)]
    writer_handle: tokio::task::JoinHandle<()>,
}

/// Client for one external analysis-server process.
///
/// Queries take `&mut self`, which keeps one logical request in flight
/// at a time; the reader task routes responses by sequence number so
/// interleaved events can never satisfy a query.
///
/// All positions are 1-based lines and 1-based character offsets, as the
/// wire protocol requires. Editors with 0-based cursors convert before
/// calling in and after reading results.
pub struct Client {
    config: ClientConfig,
    /// State-as-location: a live session is `Some`.
    conn: Option<Connection>,
    open_files: HashSet<PathBuf>,
    diagnostics: DiagnosticsStore,
}

impl Client {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            conn: None,
            open_files: HashSet::new(),
            diagnostics: DiagnosticsStore::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.conn.is_some()
    }

    /// Files the server has been told are open, this session.
    pub fn open_files(&self) -> impl Iterator<Item = &Path> {
        self.open_files.iter().map(PathBuf::as_path)
    }

    /// Spawn the server if it is not already running.
    ///
    /// Idempotent: calling while running is a no-op returning `Ok`.
    pub async fn start(&mut self) -> Result<(), ClientError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let resolved = which::which(&self.config.command).map_err(|e| ClientError::Startup {
            command: self.config.command.clone(),
            reason: format!("not found in PATH ({e})"),
        })?;

        let mut cmd = Command::new(&resolved);
        cmd.args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| ClientError::Startup {
            command: self.config.command.clone(),
            reason: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| ClientError::Startup {
            command: self.config.command.clone(),
            reason: String::from("no stdin handle"),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| ClientError::Startup {
            command: self.config.command.clone(),
            reason: String::from("no stdout handle"),
        })?;

        // stderr is log noise only, never protocol data.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!("analysis server stderr: {line}");
                }
            });
        }

        let pending: PendingMap = Arc::new(tokio::sync::Mutex::new(HashMap::new()));

        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        let writer_handle = tokio::spawn(async move {
            let mut writer = MessageWriter::new(stdin);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(frame) => {
                        if let Err(e) = writer.write_message(&frame).await {
                            tracing::warn!("analysis server write error: {e}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let reader_pending = pending.clone();
        let reader_handle = tokio::spawn(async move {
            let mut reader = MessageReader::new(stdout);
            loop {
                match reader.read_message().await {
                    Ok(Some(frame)) => {
                        Self::dispatch_message(&frame, &reader_pending, &event_tx).await;
                    }
                    Ok(None) => {
                        tracing::info!("analysis server closed its output stream");
                        let _ = event_tx
                            .send(ServerEvent::Stopped {
                                reason: StopReason::Exited,
                            })
                            .await;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("analysis server read error: {e}");
                        let _ = event_tx
                            .send(ServerEvent::Stopped {
                                reason: StopReason::Failed(e.to_string()),
                            })
                            .await;
                        break;
                    }
                }
            }
            // Fail in-flight queries immediately instead of letting them
            // ride out their full timeout.
            reader_pending.lock().await.clear();
        });

        tracing::info!("analysis server `{}` started", self.config.command);
        self.conn = Some(Connection {
            child,
            writer_tx,
            next_seq: 1,
            pending,
            event_rx,
            reader_handle,
            writer_handle,
        });
        Ok(())
    }

    /// Route one message from the server's output stream.
    ///
    /// Responses resolve their pending entry by sequence number; a
    /// response matching no pending request is discarded. Events go to
    /// the event channel and never touch the pending map.
    async fn dispatch_message(
        frame: &serde_json::Value,
        pending: &tokio::sync::Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>,
        event_tx: &mpsc::Sender<ServerEvent>,
    ) {
        let Some(incoming) = protocol::classify(frame) else {
            tracing::trace!("ignoring unrecognized server message");
            return;
        };

        match incoming {
            Incoming::Response { seq, raw } => {
                let sender = pending.lock().await.remove(&seq);
                match sender {
                    Some(tx) => {
                        let _ = tx.send(raw);
                    }
                    None => {
                        tracing::trace!(seq, "discarding response with no pending request");
                    }
                }
            }
            Incoming::Event { name, body } => match name.as_str() {
                "syntaxDiag" | "semanticDiag" => {
                    let Some(body) = body else { return };
                    match serde_json::from_value::<protocol::DiagnosticEventBody>(body) {
                        Ok(diag) => {
                            let _ = event_tx
                                .send(ServerEvent::Diagnostics {
                                    file: PathBuf::from(diag.file),
                                    items: diag.diagnostics,
                                })
                                .await;
                        }
                        Err(e) => {
                            tracing::debug!("failed to parse {name} event body: {e}");
                        }
                    }
                }
                _ => {
                    tracing::trace!(event = %name, "ignoring server event");
                }
            },
        }
    }

    /// Stop the server if it is running. Idempotent.
    ///
    /// Clears all session state: open-file set, pending requests,
    /// event-pushed diagnostics.
    pub async fn stop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        self.open_files.clear();
        self.diagnostics.clear();

        // Graceful shutdown request; the server exits without replying.
        let seq = conn.next_seq;
        conn.next_seq += 1;
        if let Ok(frame) = serde_json::to_value(Request::new(seq, command::EXIT, None)) {
            let _ = conn.writer_tx.send(WriterCommand::Send(frame)).await;
        }
        let _ = conn.writer_tx.send(WriterCommand::Shutdown).await;

        let waited = tokio::time::timeout(
            Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
            conn.child.wait(),
        )
        .await;
        if waited.is_err() {
            tracing::debug!("analysis server did not exit in time, killing");
            let _ = conn.child.kill().await;
        }
        tracing::info!("analysis server stopped");
    }

    /// `stop()` then `start()`.
    ///
    /// A full state reset: the new process knows nothing about
    /// previously open files; callers re-open and re-reload them.
    pub async fn restart(&mut self) -> Result<(), ClientError> {
        self.stop().await;
        self.start().await
    }

    /// Fire-and-forget: tagged with a sequence number from the shared
    /// counter, but no pending entry is registered and no response is
    /// read.
    async fn notify(
        &mut self,
        command: &'static str,
        arguments: Option<serde_json::Value>,
    ) -> Result<(), ClientError> {
        let conn = self.conn.as_mut().ok_or(ClientError::NotRunning)?;
        let seq = conn.next_seq;
        conn.next_seq += 1;

        let frame = serde_json::to_value(Request::new(seq, command, arguments))
            .map_err(|e| ClientError::Protocol(format!("serializing `{command}` request: {e}")))?;
        conn.writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| ClientError::ConnectionLost)?;
        Ok(())
    }

    /// Tell the server a file is now under analysis.
    pub async fn open(&mut self, file: impl AsRef<Path>) -> Result<(), ClientError> {
        let file = file.as_ref();
        self.notify(command::OPEN, Some(protocol::file_args(file)))
            .await?;
        self.open_files.insert(file.to_path_buf());
        Ok(())
    }

    /// Tell the server a file is no longer under analysis.
    ///
    /// Closing a file that was never opened is a no-op, not an error.
    pub async fn close(&mut self, file: impl AsRef<Path>) -> Result<(), ClientError> {
        let file = file.as_ref();
        if !self.open_files.remove(file) {
            return Ok(());
        }
        self.notify(command::CLOSE, Some(protocol::file_args(file)))
            .await
    }

    /// Point the server at an already-flushed temp copy of `file`'s
    /// contents. The caller owns `tmpfile`'s lifetime.
    pub async fn reload(
        &mut self,
        file: impl AsRef<Path>,
        tmpfile: impl AsRef<Path>,
    ) -> Result<(), ClientError> {
        self.notify(
            command::RELOAD,
            Some(protocol::reload_args(file.as_ref(), tmpfile.as_ref())),
        )
        .await
    }

    /// Reload `file` from in-memory buffer contents.
    ///
    /// Stages the contents in a scoped temp file that is deleted when
    /// this call returns — including when the write or the send fails.
    pub async fn reload_buffer(
        &mut self,
        file: impl AsRef<Path>,
        contents: &str,
    ) -> Result<(), ClientError> {
        let staged = stage_reload_contents(contents)?;
        let result = self.reload(file, staged.path()).await;
        if let Err(e) = staged.close() {
            tracing::debug!("failed to remove reload staging file: {e}");
        }
        result
    }

    /// Send one request and await its sequence-matched response.
    ///
    /// The deadline is wall-clock from the send; interleaved events and
    /// noise do not reset it. Every failure path removes the pending
    /// entry so repeated failures cannot grow the map.
    async fn request(
        &mut self,
        command: &'static str,
        arguments: Option<serde_json::Value>,
    ) -> Result<protocol::ResponseEnvelope, ClientError> {
        let timeout = self.config.response_timeout();
        let conn = self.conn.as_mut().ok_or(ClientError::NotRunning)?;

        let seq = conn.next_seq;
        conn.next_seq += 1;

        let (tx, rx) = oneshot::channel();
        conn.pending.lock().await.insert(seq, tx);

        let frame = match serde_json::to_value(Request::new(seq, command, arguments)) {
            Ok(frame) => frame,
            Err(e) => {
                conn.pending.lock().await.remove(&seq);
                return Err(ClientError::Protocol(format!(
                    "serializing `{command}` request: {e}"
                )));
            }
        };
        if conn
            .writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .is_err()
        {
            conn.pending.lock().await.remove(&seq);
            return Err(ClientError::ConnectionLost);
        }

        let raw = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(_)) => {
                // Reader task exited and cleared the pending map.
                conn.pending.lock().await.remove(&seq);
                return Err(ClientError::ConnectionLost);
            }
            Err(_) => {
                conn.pending.lock().await.remove(&seq);
                return Err(ClientError::Timeout(timeout));
            }
        };

        protocol::decode_envelope(raw, command)
    }

    /// Completion candidates at a position. An empty list is a valid
    /// success ("no suggestions").
    pub async fn completions(
        &mut self,
        file: impl AsRef<Path>,
        line: u32,
        offset: u32,
        prefix: &str,
    ) -> Result<Reply<Vec<CompletionEntry>>, ClientError> {
        let envelope = self
            .request(
                command::COMPLETIONS,
                Some(protocol::completions_args(file.as_ref(), line, offset, prefix)),
            )
            .await?;
        protocol::decode_reply(envelope)
    }

    /// Details for the named completion candidates only.
    ///
    /// The server does not guarantee result order matches `entry_names`.
    pub async fn completion_entry_details(
        &mut self,
        file: impl AsRef<Path>,
        line: u32,
        offset: u32,
        entry_names: &[String],
    ) -> Result<Reply<Vec<CompletionDetails>>, ClientError> {
        let envelope = self
            .request(
                command::COMPLETION_ENTRY_DETAILS,
                Some(protocol::completion_details_args(
                    file.as_ref(),
                    line,
                    offset,
                    entry_names,
                )),
            )
            .await?;
        protocol::decode_reply(envelope)
    }

    /// Symbol information at a position. Rejected when nothing is under
    /// the cursor.
    pub async fn quick_info(
        &mut self,
        file: impl AsRef<Path>,
        line: u32,
        offset: u32,
    ) -> Result<Reply<QuickInfo>, ClientError> {
        let envelope = self
            .request(
                command::QUICKINFO,
                Some(protocol::position_args(file.as_ref(), line, offset)),
            )
            .await?;
        protocol::decode_reply(envelope)
    }

    /// Definition locations for the symbol at a position. An empty list
    /// means "not found", which is distinct from a rejection.
    pub async fn definition(
        &mut self,
        file: impl AsRef<Path>,
        line: u32,
        offset: u32,
    ) -> Result<Reply<Vec<FileSpan>>, ClientError> {
        let envelope = self
            .request(
                command::DEFINITION,
                Some(protocol::position_args(file.as_ref(), line, offset)),
            )
            .await?;
        protocol::decode_reply(envelope)
    }

    /// All references to the symbol at a position.
    pub async fn references(
        &mut self,
        file: impl AsRef<Path>,
        line: u32,
        offset: u32,
    ) -> Result<Reply<References>, ClientError> {
        let envelope = self
            .request(
                command::REFERENCES,
                Some(protocol::position_args(file.as_ref(), line, offset)),
            )
            .await?;
        protocol::decode_reply(envelope)
    }

    /// Diagnostics for a set of files.
    ///
    /// May trigger whole-project analysis and take noticeably longer
    /// than other queries, but uses the same timeout.
    pub async fn diagnostics(
        &mut self,
        files: &[PathBuf],
    ) -> Result<Reply<Vec<FileDiagnostics>>, ClientError> {
        let envelope = self
            .request(command::GETERR, Some(protocol::geterr_args(files)))
            .await?;
        protocol::decode_reply(envelope)
    }

    /// Rename the symbol at a position to `new_name`.
    ///
    /// The result pairs every occurrence with the replacement text;
    /// applying the edits is the caller's responsibility.
    pub async fn rename(
        &mut self,
        new_name: &str,
        file: impl AsRef<Path>,
        line: u32,
        offset: u32,
    ) -> Result<Reply<Vec<FileEdits>>, ClientError> {
        let envelope = self
            .request(
                command::RENAME,
                Some(protocol::rename_args(file.as_ref(), line, offset)),
            )
            .await?;
        match protocol::decode_reply::<protocol::RenameBody>(envelope)? {
            Reply::Success(body) => Ok(protocol::rename_edits(body, new_name)),
            Reply::Rejected(message) => Ok(Reply::Rejected(message)),
        }
    }

    /// Candidate call signatures at a position, as display fragments for
    /// the caller to join (see [`crate::display`]).
    pub async fn signature_help(
        &mut self,
        file: impl AsRef<Path>,
        line: u32,
        offset: u32,
    ) -> Result<Reply<SignatureHelpItems>, ClientError> {
        let envelope = self
            .request(
                command::SIGNATURE_HELP,
                Some(protocol::position_args(file.as_ref(), line, offset)),
            )
            .await?;
        protocol::decode_reply(envelope)
    }

    /// The document-symbol tree for a file.
    pub async fn document_symbols(
        &mut self,
        file: impl AsRef<Path>,
    ) -> Result<Reply<NavItem>, ClientError> {
        let envelope = self
            .request(command::NAVTREE, Some(protocol::file_args(file.as_ref())))
            .await?;
        protocol::decode_reply(envelope)
    }

    /// Drain pending out-of-band events, up to `budget`.
    ///
    /// Non-blocking. Diagnostics events accumulate in the snapshot
    /// store; a stop event drops the dead session.
    pub fn poll_events(&mut self, budget: usize) -> usize {
        let Some(conn) = self.conn.as_mut() else {
            return 0;
        };

        let mut drained = Vec::new();
        while drained.len() < budget {
            match conn.event_rx.try_recv() {
                Ok(event) => drained.push(event),
                Err(mpsc::error::TryRecvError::Empty | mpsc::error::TryRecvError::Disconnected) => {
                    break;
                }
            }
        }

        let count = drained.len();
        for event in drained {
            self.handle_event(event);
        }
        count
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Diagnostics { file, items } => {
                tracing::debug!(
                    file = %file.display(),
                    count = items.len(),
                    "diagnostics updated"
                );
                self.diagnostics.update(file, items);
            }
            ServerEvent::Stopped { reason } => {
                match &reason {
                    StopReason::Exited => {
                        tracing::info!("analysis server exited");
                    }
                    StopReason::Failed(msg) => {
                        tracing::warn!(error = %msg, "analysis server failed");
                    }
                }
                // State-as-location: dropping the connection is the
                // transition; kill_on_drop reaps the child.
                self.conn = None;
                self.open_files.clear();
            }
        }
    }

    /// Immutable snapshot of all event-pushed diagnostics.
    #[must_use]
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }
}

/// Write buffer contents to a scoped temp file. The file is deleted on
/// drop, which holds on every failure path of the caller.
fn stage_reload_contents(contents: &str) -> Result<tempfile::NamedTempFile, std::io::Error> {
    let staged = tempfile::NamedTempFile::new()?;
    std::fs::write(staged.path(), contents)?;
    Ok(staged)
}
