use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{CheckpointStoreConfig, FeedConfig, ValidationError};

/// Complete configuration of a change feed consumer process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConsumerConfig {
    /// Name used to identify the consumer in logs.
    pub name: String,
    pub feed: FeedConfig,
    #[serde(default)]
    pub checkpoint_store: CheckpointStoreConfig,
}

impl ConsumerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.feed.validate()?;
        self.checkpoint_store.validate()
    }
}

impl Config for ConsumerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["feed.targets"];
}
