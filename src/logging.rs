//! Structured logging setup using the `tracing` ecosystem.
//!
//! JSON output when stdout is not a terminal (containers, log shippers),
//! pretty output on a TTY. Either can be forced with `--json` or
//! `--pretty`.
//!
//! With `logging.syslog` enabled, the per-request access line (events
//! with target [`ACCESS_TARGET`]) goes to the local syslog daemon instead
//! of stdout. Everything else stays on the console.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

use crate::cli::LogLevel;
use crate::error::TurnstileError;

/// Target of the one-line-per-request access log.
pub const ACCESS_TARGET: &str = "turnstile::access";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[must_use]
pub fn resolve_format(pretty: bool, json: bool) -> LogFormat {
    if json {
        LogFormat::Json
    } else if pretty || std::io::IsTerminal::is_terminal(&std::io::stdout()) {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn console_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Json => fmt::layer().json().with_target(false).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
    }
}

fn console_filter(level: LevelFilter, syslog: bool) -> Targets {
    let filter = Targets::new().with_default(level);
    if syslog {
        filter.with_target(ACCESS_TARGET, LevelFilter::OFF)
    } else {
        filter
    }
}

fn syslog_filter(level: LevelFilter) -> Targets {
    Targets::new().with_target(ACCESS_TARGET, level)
}

/// Install the global subscriber. Fails only when syslog output is
/// requested and the local daemon cannot be reached.
pub fn init(level: &LogLevel, format: LogFormat, syslog: bool) -> Result<(), TurnstileError> {
    let level = LevelFilter::from_level(level.to_tracing_level());
    let console = console_layer(format).with_filter(console_filter(level, syslog));

    if !syslog {
        tracing_subscriber::registry().with(console).init();
        return Ok(());
    }

    let remote = fmt::layer()
        .with_writer(SyslogWriter::connect()?)
        .with_ansi(false)
        .without_time()
        .with_level(false)
        .with_target(false)
        .with_filter(syslog_filter(level));
    tracing_subscriber::registry()
        .with(console)
        .with(remote)
        .init();
    Ok(())
}

type SyslogLogger = syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>;

/// Hands each formatted event to the local syslog daemon as one
/// `LOG_INFO` message.
#[derive(Clone)]
struct SyslogWriter(Arc<Mutex<SyslogLogger>>);

impl SyslogWriter {
    #[cfg(unix)]
    fn connect() -> Result<Self, TurnstileError> {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_USER,
            hostname: None,
            process: env!("CARGO_PKG_NAME").into(),
            pid: std::process::id(),
        };
        syslog::unix(formatter)
            .map(|logger| Self(Arc::new(Mutex::new(logger))))
            .map_err(|e| TurnstileError::Syslog(e.to_string()))
    }

    #[cfg(not(unix))]
    fn connect() -> Result<Self, TurnstileError> {
        Err(TurnstileError::Syslog(
            "syslog output is only supported on Unix".into(),
        ))
    }
}

impl<'a> MakeWriter<'a> for SyslogWriter {
    type Writer = SyslogLine;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogLine {
            logger: Arc::clone(&self.0),
            buf: Vec::new(),
        }
    }
}

/// Buffers one formatted event; sent when the formatter drops it.
struct SyslogLine {
    logger: Arc<Mutex<SyslogLogger>>,
    buf: Vec<u8>,
}

impl io::Write for SyslogLine {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogLine {
    fn drop(&mut self) {
        let line = String::from_utf8_lossy(&self.buf);
        let line = line.trim_end();
        if line.is_empty() {
            return;
        }
        // Nowhere to report a failed log write.
        let _ = self
            .logger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .info(line);
    }
}
