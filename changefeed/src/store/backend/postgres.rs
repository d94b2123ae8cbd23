use changefeed_config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Executor, PgPool};
use tracing::info;

use crate::error::FeedResult;
use crate::store::backend::CheckpointBackend;
use crate::types::{RangeId, ResumeToken, TargetId};

/// Number of connections kept by the checkpoint pool. Every worker writes through it.
const NUM_POOL_CONNECTIONS: u32 = 4;

/// Number of database connections to use for the migration pool.
const NUM_MIGRATION_POOL_CONNECTIONS: u32 = 1;

/// Checkpoint backend storing rows in the `changefeed.checkpoints` table of a Postgres database.
#[derive(Debug, Clone)]
pub struct PostgresCheckpointBackend {
    pool: PgPool,
}

impl PostgresCheckpointBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database described by `config`.
    ///
    /// The checkpoints table must already exist, see [`PostgresCheckpointBackend::migrate`].
    pub async fn connect(config: &PgConnectionConfig) -> FeedResult<Self> {
        let options: PgConnectOptions = config.with_db();

        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(NUM_POOL_CONNECTIONS)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool))
    }

    /// Applies the checkpoint migrations.
    ///
    /// Migrations run with `changefeed` as search path so that the `sqlx` migration metadata
    /// table does not end up in the public schema.
    pub async fn migrate(config: &PgConnectionConfig) -> FeedResult<()> {
        let options: PgConnectOptions = config.with_db();

        let pool = PgPoolOptions::new()
            .max_connections(NUM_MIGRATION_POOL_CONNECTIONS)
            .min_connections(NUM_MIGRATION_POOL_CONNECTIONS)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("create schema if not exists changefeed;").await?;
                    conn.execute("set search_path = 'changefeed';").await?;

                    Ok(())
                })
            })
            .connect_with(options)
            .await?;

        info!("applying checkpoint store migrations");

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("checkpoint store migrations successfully applied");

        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl CheckpointBackend for PostgresCheckpointBackend {
    async fn read_all(
        &self,
        target: &TargetId,
    ) -> FeedResult<Vec<(RangeId, Option<ResumeToken>)>> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            r#"
            select range_id, token
            from changefeed.checkpoints
            where target = $1
            order by range_id
            "#,
        )
        .bind(target.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(range, token)| (RangeId::new(range), token.map(ResumeToken::new)))
            .collect())
    }

    async fn upsert(
        &self,
        target: &TargetId,
        range: &RangeId,
        token: Option<&ResumeToken>,
    ) -> FeedResult<()> {
        sqlx::query(
            r#"
            insert into changefeed.checkpoints (target, range_id, token, updated_at)
            values ($1, $2, $3, now())
            on conflict (target, range_id)
            do update set token = excluded.token, updated_at = now()
            "#,
        )
        .bind(target.as_str())
        .bind(range.as_str())
        .bind(token.map(ResumeToken::as_str))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
