use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Batching of rows forwarded to a destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Maximum number of rows in a single destination write.
    pub max_size: usize,
    /// Maximum number of destination writes in flight across all workers.
    ///
    /// `None` leaves writes unbounded.
    #[serde(default)]
    pub max_inflight_writes: Option<usize>,
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_size == 0 {
            return Err(ValidationError::ZeroValue("batch.max_size"));
        }

        if self.max_inflight_writes == Some(0) {
            return Err(ValidationError::ZeroValue("batch.max_inflight_writes"));
        }

        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            max_inflight_writes: None,
        }
    }
}
