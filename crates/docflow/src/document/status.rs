//! Document status lifecycle.
//!
//! ```text
//! Pending ──> Processing ──> Processed
//!    │            │ ↺
//!    └────────────┴────────> Failed
//! ```
//!
//! Processed and Failed are terminal for the pipeline. Any other requested
//! move is ignored rather than rejected, so a redelivered job can never push
//! a finished document backwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

/// Outcome of asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The change is legal and should be written.
    Apply,
    /// The change is not legal from the current state; leave the document alone.
    Ignore,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 4] = [
        DocumentStatus::Pending,
        DocumentStatus::Processing,
        DocumentStatus::Processed,
        DocumentStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "PENDING",
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Processed => "PROCESSED",
            DocumentStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Processed | DocumentStatus::Failed)
    }

    /// Decides whether moving from `self` to `to` is allowed.
    pub fn transition(self, to: DocumentStatus) -> Transition {
        use DocumentStatus::*;
        match (self, to) {
            (Pending, Processing)
            | (Processing, Processing)
            | (Processing, Processed)
            | (Processing, Failed)
            | (Pending, Failed) => Transition::Apply,
            _ => Transition::Ignore,
        }
    }

    /// States from which `to` may be entered. Used to guard status writes
    /// at the storage layer.
    pub fn sources_of(to: DocumentStatus) -> Vec<DocumentStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.transition(to) == Transition::Apply)
            .collect()
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown document status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for DocumentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(DocumentStatus::Pending),
            "PROCESSING" => Ok(DocumentStatus::Processing),
            "PROCESSED" => Ok(DocumentStatus::Processed),
            "FAILED" => Ok(DocumentStatus::Failed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}
