//! Citation records and the run-scoped source accumulator.
//!
//! Every tool-augmented generation call may surface citation metadata. A run
//! owns one `SourceCollector`; in multi-agent mode the orchestrator's
//! collector is handed to every nested engine, so concurrent agents append
//! into the same accumulator. Appends are serialized behind a lock —
//! collection is append-only and deduplication is not guaranteed.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// A single citation record surfaced by the text-generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Title of the cited document, when the provider reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Snippet or excerpt of the cited content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Location of the cited document.
    pub url: String,
}

impl Source {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            title: None,
            content: None,
            url: url.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Append-only accumulator of citation records for one run.
///
/// Shared by reference across concurrent agent tasks in multi-agent mode;
/// the lock covers only the append and the terminal snapshot.
#[derive(Debug, Default)]
pub struct SourceCollector {
    records: Mutex<Vec<Source>>,
}

impl SourceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch of records.
    pub fn record(&self, sources: impl IntoIterator<Item = Source>) {
        let mut records = self.records.lock().expect("source collector lock poisoned");
        records.extend(sources);
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("source collector lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of everything collected so far, in append order.
    pub fn snapshot(&self) -> Vec<Source> {
        self.records
            .lock()
            .expect("source collector lock poisoned")
            .clone()
    }

    /// Result-shaped snapshot: `None` when nothing was collected.
    pub fn snapshot_optional(&self) -> Option<Vec<Source>> {
        let records = self.snapshot();
        if records.is_empty() {
            None
        } else {
            Some(records)
        }
    }
}
