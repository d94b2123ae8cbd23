use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};

static REGISTER_METRICS: Once = Once::new();

pub const CHANGEFEED_WORKERS_TOTAL: &str = "changefeed_workers_total";
pub const CHANGEFEED_ROWS_PROCESSED_TOTAL: &str = "changefeed_rows_processed_total";
pub const CHANGEFEED_CHECKPOINTS_TOTAL: &str = "changefeed_checkpoints_total";
pub const CHANGEFEED_OVERLOADS_TOTAL: &str = "changefeed_overloads_total";
pub const CHANGEFEED_PAGE_SIZE: &str = "changefeed_page_size";
pub const CHANGEFEED_PAGE_DRAIN_DURATION_SECONDS: &str = "changefeed_page_drain_duration_seconds";
pub const TARGET: &str = "target";
pub const SOURCE: &str = "source";
pub const ORIGIN: &str = "origin";
pub const DESTINATION: &str = "destination";

/// Registers the metrics emitted by the consumer. Safe to call more than once.
pub(crate) fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_gauge!(
            CHANGEFEED_WORKERS_TOTAL,
            Unit::Count,
            "Number of poll workers started"
        );

        describe_counter!(
            CHANGEFEED_ROWS_PROCESSED_TOTAL,
            Unit::Count,
            "Total number of rows handed to the row processor"
        );

        describe_counter!(
            CHANGEFEED_CHECKPOINTS_TOTAL,
            Unit::Count,
            "Total number of checkpoints written after a drained page"
        );

        describe_counter!(
            CHANGEFEED_OVERLOADS_TOTAL,
            Unit::Count,
            "Total number of pages dropped because the source or destination was overloaded"
        );

        describe_histogram!(
            CHANGEFEED_PAGE_SIZE,
            Unit::Count,
            "Number of rows returned by a page read"
        );

        describe_histogram!(
            CHANGEFEED_PAGE_DRAIN_DURATION_SECONDS,
            Unit::Seconds,
            "Time taken to process, forward, and checkpoint a page"
        );
    });
}
