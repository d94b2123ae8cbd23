use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Connection parameters of the Postgres database holding checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Name of the database to connect to.
    pub name: String,
    pub username: String,
    /// Password for the specified user. Redacted in debug output.
    pub password: Option<SerializableSecretString>,
    pub tls: TlsConfig,
}

impl PgConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.tls.validate()
    }
}

/// TLS settings for Postgres connections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    pub trusted_root_certs: String,
    pub enabled: bool,
}

impl TlsConfig {
    /// Returns [`ValidationError::MissingTrustedRootCerts`] if TLS is enabled without
    /// certificates.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

/// Conversion of a [`PgConnectionConfig`] into driver specific connect options.
pub trait IntoConnectOptions<Output> {
    /// Connect options without a database, used for administrative operations such as
    /// creating the checkpoint database.
    fn without_db(&self) -> Output;

    /// Connect options for the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<PgConnectOptions> for PgConnectionConfig {
    fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.tls.enabled {
            PgSslMode::VerifyFull
        } else {
            PgSslMode::Prefer
        };
        let options = PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .username(&self.username)
            .port(self.port)
            .ssl_mode(ssl_mode)
            .ssl_root_cert_from_pem(self.tls.trusted_root_certs.clone().into_bytes());

        if let Some(password) = &self.password {
            options.password(password.expose_secret())
        } else {
            options
        }
    }

    fn with_db(&self) -> PgConnectOptions {
        let options: PgConnectOptions = self.without_db();
        options.database(&self.name)
    }
}
