use changefeed_config::shared::{IntoConnectOptions, PgConnectionConfig, TlsConfig};
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, Executor, PgConnection};
use uuid::Uuid;

use crate::store::backend::PostgresCheckpointBackend;

/// Returns the [`PgConnectionConfig`] parameters to connect to the local instance of Postgres.
///
/// The database name is random so that tests never share state.
pub fn local_pg_connection_config() -> PgConnectionConfig {
    PgConnectionConfig {
        host: "localhost".to_owned(),
        port: 5430,
        name: Uuid::new_v4().to_string(),
        username: "postgres".to_owned(),
        password: Some("postgres".to_owned().into()),
        tls: TlsConfig {
            trusted_root_certs: String::new(),
            enabled: false,
        },
    }
}

/// Creates a fresh database with the checkpoint migrations applied and connects a backend to it.
///
/// # Panics
///
/// Panics if the database cannot be created, migrated, or connected to.
pub async fn spawn_checkpoint_database() -> (PgConnectionConfig, PostgresCheckpointBackend) {
    let config = local_pg_connection_config();

    let options: PgConnectOptions = config.without_db();
    let mut connection = PgConnection::connect_with(&options)
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(format!(r#"create database "{}";"#, config.name).as_str())
        .await
        .expect("Failed to create database");

    PostgresCheckpointBackend::migrate(&config)
        .await
        .expect("Failed to migrate the checkpoint database");

    let backend = PostgresCheckpointBackend::connect(&config)
        .await
        .expect("Failed to connect the checkpoint backend");

    (config, backend)
}

/// Drops a database created by [`spawn_checkpoint_database`].
///
/// # Panics
///
/// Panics if the database cannot be dropped.
pub async fn drop_checkpoint_database(config: &PgConnectionConfig) {
    let options: PgConnectOptions = config.without_db();
    let mut connection = PgConnection::connect_with(&options)
        .await
        .expect("Failed to connect to Postgres");

    connection
        .execute(format!(r#"drop database if exists "{}" with (force);"#, config.name).as_str())
        .await
        .expect("Failed to drop database");
}
