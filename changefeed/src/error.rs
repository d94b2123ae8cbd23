use std::error;
use std::fmt;

/// Convenient result type for change feed operations using [`FeedError`] as the error type.
pub type FeedResult<T> = Result<T, FeedError>;

/// Main error type for change feed operations.
///
/// [`FeedError`] can represent a single error, an error with additional dynamic detail, or many
/// aggregated errors, for example the failures of several workers collected on shutdown.
#[derive(Debug, Clone)]
pub struct FeedError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Error with kind and static description
    WithDescription(ErrorKind, &'static str),
    /// Error with kind, static description, and dynamic detail
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    /// Multiple aggregated errors
    Many(Vec<FeedError>),
}

/// Categories of errors that can occur while consuming a change feed.
///
/// The kind decides how a poll worker reacts to a failure: transient kinds (see
/// [`ErrorKind::is_transient`]) make the worker back off and retry the range later, every other
/// kind is fatal to the worker.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Source Errors
    SourceOverloaded,
    SourceUnavailable,
    SourceQueryFailed,

    // Destination Errors
    DestinationOverloaded,
    DestinationUnavailable,
    DestinationWriteFailed,

    // Checkpoint & Startup Errors
    CheckpointStoreFailed,
    CorruptCheckpoints,
    RangeDiscoveryFailed,

    // Processing Errors
    RowProcessingFailed,
    InvalidResumeToken,

    // Configuration & State Errors
    ConfigError,
    InvalidState,
    WorkerPanic,

    // IO & Serialization Errors
    IoError,
    SerializationError,
    DeserializationError,

    // Unknown / Uncategorized
    Unknown,
}

impl ErrorKind {
    /// Returns `true` if the error signals a temporary overload of the source or destination.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::SourceOverloaded | ErrorKind::DestinationOverloaded
        )
    }
}

impl FeedError {
    /// Creates a [`FeedError`] containing multiple aggregated errors.
    pub fn many(errors: Vec<FeedError>) -> FeedError {
        FeedError {
            repr: ErrorRepr::Many(errors),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
            ErrorRepr::Many(ref errors) => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error, flattening aggregated errors.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => vec![kind],
            ErrorRepr::Many(ref errors) => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::Many(ref errors) => errors.iter().find_map(|e| e.detail()),
            _ => None,
        }
    }

    /// Returns `true` if this error is transient.
    ///
    /// An aggregated error is transient only when every contained error is.
    pub fn is_transient(&self) -> bool {
        let kinds = self.kinds();
        !kinds.is_empty() && kinds.iter().all(ErrorKind::is_transient)
    }
}

impl PartialEq for FeedError {
    fn eq(&self, other: &FeedError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::WithDescription(kind_a, _), ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::Many(errors_a), ErrorRepr::Many(errors_b)) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;

                Ok(())
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;
                f.write_str(" -> ")?;
                detail.fmt(f)?;

                Ok(())
            }
            ErrorRepr::Many(ref errors) => {
                if errors.is_empty() {
                    write!(f, "Multiple errors occurred (empty)")?;
                } else if errors.len() == 1 {
                    errors[0].fmt(f)?;
                } else {
                    write!(f, "Multiple errors occurred ({} total):", errors.len())?;
                    for (i, error) in errors.iter().enumerate() {
                        write!(f, "\n  {}: {}", i + 1, error)?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for FeedError {}

impl From<(ErrorKind, &'static str)> for FeedError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> FeedError {
        FeedError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for FeedError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> FeedError {
        FeedError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

impl<E> From<Vec<E>> for FeedError
where
    E: Into<FeedError>,
{
    fn from(errors: Vec<E>) -> FeedError {
        FeedError {
            repr: ErrorRepr::Many(errors.into_iter().map(Into::into).collect()),
        }
    }
}

/// Converts [`std::io::Error`] to [`FeedError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> FeedError {
        FeedError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::IoError,
                "I/O error occurred",
                err.to_string(),
            ),
        }
    }
}

/// Converts [`serde_json::Error`] to [`FeedError`], classifying by the JSON error category.
impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> FeedError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        FeedError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, err.to_string()),
        }
    }
}

/// Converts [`sqlx::Error`] to [`FeedError`].
///
/// `sqlx` is only used by the Postgres checkpoint backend, so every database failure is a
/// checkpoint store failure.
impl From<sqlx::Error> for FeedError {
    fn from(err: sqlx::Error) -> FeedError {
        let description = match &err {
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                "Checkpoint database connection unavailable"
            }
            sqlx::Error::Io(_) => "Checkpoint database I/O failed",
            _ => "Checkpoint database operation failed",
        };

        FeedError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::CheckpointStoreFailed,
                description,
                err.to_string(),
            ),
        }
    }
}

/// Converts [`sqlx::migrate::MigrateError`] to [`FeedError`] with [`ErrorKind::CheckpointStoreFailed`].
impl From<sqlx::migrate::MigrateError> for FeedError {
    fn from(err: sqlx::migrate::MigrateError) -> FeedError {
        FeedError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::CheckpointStoreFailed,
                "Checkpoint database migration failed",
                err.to_string(),
            ),
        }
    }
}

/// Converts [`tokio::task::JoinError`] to [`FeedError`] with [`ErrorKind::WorkerPanic`].
impl From<tokio::task::JoinError> for FeedError {
    fn from(err: tokio::task::JoinError) -> FeedError {
        let description = if err.is_panic() {
            "Worker task panicked"
        } else {
            "Worker task was cancelled"
        };

        FeedError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::WorkerPanic,
                description,
                err.to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bail, feed_error};

    #[test]
    fn test_simple_error_creation() {
        let err = FeedError::from((ErrorKind::SourceUnavailable, "Source connection lost"));
        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
        assert_eq!(err.detail(), None);
        assert_eq!(err.kinds(), vec![ErrorKind::SourceUnavailable]);
    }

    #[test]
    fn test_error_with_detail() {
        let err = FeedError::from((
            ErrorKind::CorruptCheckpoints,
            "Checkpoints present without completion marker",
            "target 'shop.orders' has 2 rows".to_string(),
        ));
        assert_eq!(err.kind(), ErrorKind::CorruptCheckpoints);
        assert_eq!(err.detail(), Some("target 'shop.orders' has 2 rows"));
    }

    #[test]
    fn test_multiple_errors() {
        let multi_err = FeedError::many(vec![
            FeedError::from((ErrorKind::RowProcessingFailed, "Processor failed")),
            FeedError::from((
                ErrorKind::CheckpointStoreFailed,
                "Write failed",
                "connection reset".to_string(),
            )),
        ]);

        assert_eq!(multi_err.kind(), ErrorKind::RowProcessingFailed);
        assert_eq!(
            multi_err.kinds(),
            vec![
                ErrorKind::RowProcessingFailed,
                ErrorKind::CheckpointStoreFailed
            ]
        );
        assert_eq!(multi_err.detail(), Some("connection reset"));
    }

    #[test]
    fn test_empty_multiple_errors() {
        let multi_err = FeedError::many(vec![]);
        assert_eq!(multi_err.kind(), ErrorKind::Unknown);
        assert_eq!(multi_err.kinds(), vec![]);
        assert!(!multi_err.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        assert!(ErrorKind::SourceOverloaded.is_transient());
        assert!(ErrorKind::DestinationOverloaded.is_transient());
        assert!(!ErrorKind::SourceUnavailable.is_transient());
        assert!(!ErrorKind::RowProcessingFailed.is_transient());

        let mixed = FeedError::many(vec![
            feed_error!(ErrorKind::SourceOverloaded, "Throttled"),
            feed_error!(ErrorKind::SourceUnavailable, "Gone"),
        ]);
        assert!(!mixed.is_transient());
        assert!(feed_error!(ErrorKind::DestinationOverloaded, "Throttled").is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = feed_error!(ErrorKind::SourceQueryFailed, "Read failed", "bad range");
        let display_str = format!("{err}");
        assert!(display_str.contains("SourceQueryFailed"));
        assert!(display_str.contains("Read failed"));
        assert!(display_str.contains("bad range"));

        let multi_err = FeedError::from(vec![
            feed_error!(ErrorKind::WorkerPanic, "Panic"),
            feed_error!(ErrorKind::IoError, "Io"),
        ]);
        let display_str = format!("{multi_err}");
        assert!(display_str.contains("2 total"));
    }

    #[test]
    fn test_bail_macro() {
        fn fails() -> FeedResult<()> {
            bail!(
                ErrorKind::InvalidResumeToken,
                "Token is not an offset",
                "abc"
            );
        }

        let err = fails().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResumeToken);
        assert_eq!(err.detail(), Some("abc"));
    }

    #[test]
    fn test_json_error_classification() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err = FeedError::from(json_err);
        assert_eq!(err.kind(), ErrorKind::DeserializationError);
        assert!(err.detail().unwrap().contains("expected"));
    }

    #[tokio::test]
    async fn test_join_error_is_worker_panic() {
        let join_err = tokio::spawn(async { panic!("boom") }).await.unwrap_err();
        let err = FeedError::from(join_err);
        assert_eq!(err.kind(), ErrorKind::WorkerPanic);
    }
}
