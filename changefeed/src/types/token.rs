use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::StartPosition;

/// Range id of the row recording that a target's checkpoints were fully initialized.
pub const COMPLETION_MARKER: &str = "complete";

/// Token stored in the completion marker row.
pub(crate) const COMPLETION_MARKER_TOKEN: &str = "true";

/// Opaque cursor marking how far a range has been consumed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeToken(String);

impl ResumeToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResumeToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResumeToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Resumption state of a single range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    /// Nothing was consumed yet, reading starts at the configured [`StartPosition`].
    StartOfStream,
    /// Reading resumes right after the page that produced the token.
    Resume(ResumeToken),
}

impl Checkpoint {
    /// Returns where a page read for this checkpoint starts.
    pub fn read_start(&self, start_position: &StartPosition) -> ReadStart {
        match self {
            Checkpoint::StartOfStream => ReadStart::Position(start_position.clone()),
            Checkpoint::Resume(token) => ReadStart::Token(token.clone()),
        }
    }
}

impl From<Option<ResumeToken>> for Checkpoint {
    fn from(value: Option<ResumeToken>) -> Self {
        match value {
            Some(token) => Checkpoint::Resume(token),
            None => Checkpoint::StartOfStream,
        }
    }
}

/// Starting point of a page read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStart {
    Token(ResumeToken),
    Position(StartPosition),
}
