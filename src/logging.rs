//! Tracing setup for the server.
//!
//! Events always go to stdout through a compact formatter. When `PAPERSTREAM_LOG_FILE`
//! points at a writable path the same events are also appended there through a
//! non-blocking writer; that is the mode for deployments that scrape a file instead of
//! stdout. Without the variable the server logs to stdout only.

use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter applied when `RUST_LOG` is absent. sqlx logs every statement at info level,
/// which would drown the pipeline's own events, so it is capped at warn along with the
/// HTTP internals.
const DEFAULT_DIRECTIVES: &str = "info,sqlx=warn,hyper=warn,reqwest=warn";

// Keeps the non-blocking file writer flushing for the process lifetime.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. A failure to open the requested log file is
/// reported on stderr and logging continues on stdout alone.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let stdout = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry().with(filter).with(stdout);

    match file_writer() {
        Some(writer) => {
            let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}

fn file_writer() -> Option<NonBlocking> {
    let path = std::env::var("PAPERSTREAM_LOG_FILE").ok()?;
    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Cannot append to log file {path}: {err}; logging to stdout only");
            return None;
        }
    };
    let (writer, guard) = tracing_appender::non_blocking(file);
    let _ = LOG_GUARD.set(guard);
    Some(writer)
}
