use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::shared::{BatchConfig, ValidationError};

/// Position from which a range is read when no checkpoint token exists for it yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartPosition {
    /// Read every change still retained by the source.
    #[default]
    Beginning,
    /// Read only changes made after the first read.
    Now,
    /// Read changes made at or after the given instant.
    At { timestamp: DateTime<Utc> },
}

/// Configuration of the polling workers consuming a change feed.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FeedConfig {
    /// Logical names of the change streams to consume, for example `keyspace.table`.
    pub targets: Vec<String>,
    #[serde(default)]
    pub start_position: StartPosition,
    /// Upper bound on the rows returned by a single page read.
    pub page_size: usize,
    /// Maximum number of workers. The effective number is capped by the number of ranges.
    pub max_concurrency: usize,
    /// Minimum duration, in milliseconds, of a full rotation through a worker's ranges.
    pub min_cycle_time_ms: u64,
    /// Pause, in milliseconds, after the source or destination signals overload.
    pub overload_backoff_ms: u64,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl FeedConfig {
    pub fn min_cycle_time(&self) -> Duration {
        Duration::from_millis(self.min_cycle_time_ms)
    }

    pub fn overload_backoff(&self) -> Duration {
        Duration::from_millis(self.overload_backoff_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.targets.is_empty() {
            return Err(ValidationError::NoTargets);
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(target) {
                return Err(ValidationError::DuplicateTarget(target.clone()));
            }
        }

        if self.page_size == 0 {
            return Err(ValidationError::ZeroValue("page_size"));
        }

        if self.max_concurrency == 0 {
            return Err(ValidationError::ZeroValue("max_concurrency"));
        }

        self.batch.validate()
    }
}
