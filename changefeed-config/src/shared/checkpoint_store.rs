use serde::{Deserialize, Serialize};

use crate::shared::{PgConnectionConfig, ValidationError};

/// Backend used to persist checkpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckpointStoreConfig {
    /// Checkpoints are kept in memory and lost on restart.
    #[default]
    Memory,
    /// Checkpoints are persisted in the `changefeed.checkpoints` table of a Postgres database.
    Postgres { connection: PgConnectionConfig },
}

impl CheckpointStoreConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            CheckpointStoreConfig::Memory => Ok(()),
            CheckpointStoreConfig::Postgres { connection } => connection.validate(),
        }
    }
}
