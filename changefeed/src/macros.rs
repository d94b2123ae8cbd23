//! Macros for change feed error handling.

/// Creates a [`crate::error::FeedError`] from error kind and description, with optional detail.
#[macro_export]
macro_rules! feed_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::FeedError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::FeedError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns a [`crate::error::FeedError`] from the current function.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::feed_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::feed_error!($kind, $desc, $detail))
    };
}
