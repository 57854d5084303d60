//! Diagnostics store — accumulates per-file diagnostics pushed by the
//! server as unsolicited events.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::types::{Diagnostic, DiagnosticsSnapshot};

pub(crate) struct DiagnosticsStore {
    data: HashMap<PathBuf, Vec<Diagnostic>>,
}

impl DiagnosticsStore {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    /// Replace the diagnostics for a file. An empty list clears it.
    pub fn update(&mut self, file: PathBuf, items: Vec<Diagnostic>) {
        if items.is_empty() {
            self.data.remove(&file);
        } else {
            self.data.insert(file, items);
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let mut files: Vec<(PathBuf, Vec<Diagnostic>)> = self
            .data
            .iter()
            .map(|(file, items)| (file.clone(), items.clone()))
            .collect();

        // Sort: files with errors first, then alphabetically
        files.sort_by(|a, b| {
            let a_has_errors = a.1.iter().any(|d| d.severity().is_error());
            let b_has_errors = b.1.iter().any(|d| d.severity().is_error());
            b_has_errors.cmp(&a_has_errors).then_with(|| a.0.cmp(&b.0))
        });

        DiagnosticsSnapshot::new(files)
    }
}
