use serde::{Deserialize, Serialize};

use crate::types::ResumeToken;

/// A single change read from a feed range, as ordered column name and value pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedRow {
    pub columns: Vec<(String, serde_json::Value)>,
}

impl FeedRow {
    pub fn new(columns: Vec<(String, serde_json::Value)>) -> Self {
        Self { columns }
    }

    /// Appends a column, consuming and returning the row.
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.columns.push((name.into(), value.into()));
        self
    }

    /// Returns the value of the first column called `name`.
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }
}

/// Result of one page read: up to `max_rows` rows and the token to resume after them.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
    pub rows: Vec<FeedRow>,
    pub next_token: ResumeToken,
}

impl FeedPage {
    pub fn new(rows: Vec<FeedRow>, next_token: ResumeToken) -> Self {
        Self { rows, next_token }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
