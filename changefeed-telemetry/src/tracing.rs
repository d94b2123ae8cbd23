use changefeed_config::Environment;
use std::io::Error;
use std::io::Write;
use std::sync::OnceLock;
use std::{
    backtrace::{Backtrace, BacktraceStatus},
    panic::PanicHookInfo,
    sync::Once,
};
use thiserror::Error;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{self, InitError},
};
use tracing_log::{LogTracer, log_tracer::SetLoggerError};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber, Registry, fmt, layer::SubscriberExt};

/// JSON field name carrying the consumer name in production logs.
const CONSUMER_KEY_IN_LOG: &str = "consumer";

/// Directory where production logs are written.
const LOG_DIR: &str = "logs";

/// Maximum number of rotated log files kept on disk.
const MAX_LOG_FILES: usize = 5;

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to build rolling file appender: {0}")]
    InitAppender(#[from] InitError),

    #[error("failed to init log tracer: {0}")]
    InitLogTracer(#[from] SetLoggerError),

    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),

    #[error("an io error occurred: {0}")]
    Io(#[from] Error),
}

/// Guard that flushes buffered logs when dropped.
///
/// Must be kept alive for the lifetime of the process in production mode, otherwise pending
/// log lines written by the non-blocking appender are lost.
#[must_use]
pub enum LogFlusher {
    Flusher(WorkerGuard),
    NullFlusher,
}

static INIT_TEST_TRACING: Once = Once::new();

/// Initializes tracing for tests.
///
/// Output is only enabled when the `ENABLE_TRACING` environment variable is set:
///
/// ```bash
/// ENABLE_TRACING=1 cargo test test_name
/// ```
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_ok() {
            // Without an explicit environment we would default to prod and log to files.
            Environment::Dev.set();
            let _log_flusher =
                init_tracing("test").expect("Failed to initialize tracing for tests");
        }
    });
}

static CONSUMER_NAME: OnceLock<String> = OnceLock::new();

/// Sets the consumer name injected into every JSON log entry.
pub fn set_global_consumer_name(name: String) {
    let _ = CONSUMER_NAME.set(name);
}

pub fn get_global_consumer_name() -> Option<&'static str> {
    CONSUMER_NAME.get().map(|s| s.as_str())
}

/// Writer that adds the consumer name to JSON log lines which do not carry one.
struct ConsumerInjectingWriter<W> {
    inner: W,
}

impl<W> ConsumerInjectingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W> Write for ConsumerInjectingWriter<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(line) = inject_consumer_name(buf) {
            self.inner.write_all(line.as_bytes())?;
            return Ok(buf.len());
        }

        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Returns the rewritten log line, or `None` when the buffer must be written unchanged.
fn inject_consumer_name(buf: &[u8]) -> Option<String> {
    let consumer_name = get_global_consumer_name()?;
    let json_str = std::str::from_utf8(buf).ok()?;

    let serde_json::Value::Object(mut map) = serde_json::from_str(json_str).ok()? else {
        return None;
    };
    if map.contains_key(CONSUMER_KEY_IN_LOG) {
        return None;
    }

    map.insert(
        CONSUMER_KEY_IN_LOG.to_owned(),
        serde_json::Value::String(consumer_name.to_owned()),
    );
    let modified = serde_json::to_string(&map).ok()?;

    if json_str.ends_with('\n') {
        Some(format!("{modified}\n"))
    } else {
        Some(modified)
    }
}

/// Initializes tracing for the application.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    init_tracing_with_consumer_name(app_name, None)
}

/// Like [`init_tracing`] but also sets the consumer name added to every log entry.
pub fn init_tracing_with_consumer_name(
    app_name: &str,
    consumer_name: Option<String>,
) -> Result<LogFlusher, TracingError> {
    if let Some(name) = consumer_name {
        set_global_consumer_name(name);
    }

    // Captures records emitted through the `log` crate by dependencies such as `sqlx`.
    LogTracer::init()?;

    let is_prod = Environment::load()?.is_prod();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_flusher = if is_prod {
        configure_prod_tracing(filter, app_name)?
    } else {
        configure_dev_tracing(filter)?
    };

    set_tracing_panic_hook();

    Ok(log_flusher)
}

/// JSON logs to daily rotated files.
fn configure_prod_tracing(filter: EnvFilter, app_name: &str) -> Result<LogFlusher, TracingError> {
    let file_appender = rolling::Builder::new()
        .filename_prefix(app_name)
        .filename_suffix("log")
        .rotation(rolling::Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .build(LOG_DIR)?;

    let (file_appender, guard) = tracing_appender::non_blocking(file_appender);

    let format = fmt::format()
        .with_level(true)
        .with_ansi(false)
        .with_target(false);

    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .event_format(format)
            .with_writer(move || ConsumerInjectingWriter::new(file_appender.make_writer()))
            .json()
            .with_current_span(true)
            .with_span_list(true),
    );

    set_global_default(subscriber)?;

    Ok(LogFlusher::Flusher(guard))
}

/// Pretty console logs.
fn configure_dev_tracing(filter: EnvFilter) -> Result<LogFlusher, TracingError> {
    let format = fmt::format()
        .with_level(true)
        .with_ansi(true)
        .pretty()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let subscriber = FmtSubscriber::builder()
        .event_format(format)
        .with_env_filter(filter)
        .finish();

    set_global_default(subscriber)?;

    Ok(LogFlusher::NullFlusher)
}

/// Routes panics through tracing before running the previous hook.
fn set_tracing_panic_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        panic_hook(info);
        prev_hook(info);
    }));
}

fn panic_hook(panic_info: &PanicHookInfo) {
    let backtrace = Backtrace::capture();
    let (backtrace, note) = match backtrace.status() {
        BacktraceStatus::Captured => (Some(backtrace), None),
        BacktraceStatus::Disabled => (
            None,
            Some("run with RUST_BACKTRACE=1 to display backtraces"),
        ),
        BacktraceStatus::Unsupported => {
            (None, Some("backtraces are not supported on this platform"))
        }
        _ => (None, Some("backtrace status is unknown")),
    };

    let payload = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    };

    let location = panic_info.location().map(|location| location.to_string());

    tracing::error!(
        panic.payload = payload,
        payload.location = location,
        panic.backtrace = backtrace.map(tracing::field::display),
        panic.note = note,
        "a panic occurred",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_name_is_injected_once() {
        set_global_consumer_name("orders-consumer".to_owned());

        let line = inject_consumer_name(b"{\"level\":\"INFO\",\"message\":\"hi\"}\n").unwrap();
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value[CONSUMER_KEY_IN_LOG], "orders-consumer");

        // Lines that already carry the field or are not JSON pass through untouched.
        assert!(inject_consumer_name(b"{\"consumer\":\"other\"}").is_none());
        assert!(inject_consumer_name(b"plain text line").is_none());
    }
}
