use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// No target was configured.
    #[error("at least one target must be configured in `targets`")]
    NoTargets,
    /// The same target was listed more than once.
    #[error("target `{0}` is configured more than once")]
    DuplicateTarget(String),
    /// A numeric setting which must be positive is zero.
    #[error("`{0}` cannot be zero")]
    ZeroValue(&'static str),
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
}
