use changefeed_config::shared::CheckpointStoreConfig;
use tracing::info;

use crate::error::FeedResult;
use crate::store::backend::{
    CheckpointBackend, MemoryCheckpointBackend, PostgresCheckpointBackend,
};
use crate::types::{RangeId, ResumeToken, TargetId};

/// Checkpoint backend chosen by a [`CheckpointStoreConfig`].
#[derive(Debug, Clone)]
pub enum ConfiguredCheckpointBackend {
    Memory(MemoryCheckpointBackend),
    Postgres(PostgresCheckpointBackend),
}

impl ConfiguredCheckpointBackend {
    /// Builds the configured backend. A Postgres backend is migrated before connecting.
    pub async fn from_config(config: &CheckpointStoreConfig) -> FeedResult<Self> {
        match config {
            CheckpointStoreConfig::Memory => {
                info!("using in-memory checkpoints, progress is lost on restart");
                Ok(Self::Memory(MemoryCheckpointBackend::new()))
            }
            CheckpointStoreConfig::Postgres { connection } => {
                PostgresCheckpointBackend::migrate(connection).await?;
                let backend = PostgresCheckpointBackend::connect(connection).await?;
                info!(
                    host = %connection.host,
                    database = %connection.name,
                    "using postgres checkpoints"
                );

                Ok(Self::Postgres(backend))
            }
        }
    }
}

impl CheckpointBackend for ConfiguredCheckpointBackend {
    async fn read_all(
        &self,
        target: &TargetId,
    ) -> FeedResult<Vec<(RangeId, Option<ResumeToken>)>> {
        match self {
            Self::Memory(backend) => backend.read_all(target).await,
            Self::Postgres(backend) => backend.read_all(target).await,
        }
    }

    async fn upsert(
        &self,
        target: &TargetId,
        range: &RangeId,
        token: Option<&ResumeToken>,
    ) -> FeedResult<()> {
        match self {
            Self::Memory(backend) => backend.upsert(target, range, token).await,
            Self::Postgres(backend) => backend.upsert(target, range, token).await,
        }
    }
}
