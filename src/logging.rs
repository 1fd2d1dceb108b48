//! Tracing setup for the orchestrator binary
//!
//! Events go to stderr so generated text on stdout can be piped. A log file,
//! when configured, rotates daily and is written off-thread; the returned
//! [`LogGuards`] flush it on drop. `RUST_LOG` replaces the base filter, while
//! the crate level from flags or config and the HTTP client caps always apply.

use std::fs;
use std::io;
use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingSettings;
use crate::error::{Error, Result};

/// Targets that log every request at info and would drown job events
const NOISY_TARGETS: &[&str] = &["hyper", "reqwest", "rustls", "h2"];

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Keeps the non-blocking file writer alive
pub struct LogGuards {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber for a command that runs jobs
pub fn init_logging(settings: &LoggingSettings, verbose: u8, quiet: bool) -> Result<LogGuards> {
    let level = effective_level(&settings.level, verbose, quiet)?;
    let filter = job_filter(level)?;

    let (file_layer, file_guard) = match settings.file.as_deref() {
        Some(path) => {
            let (layer, guard) = file_layer(Path::new(path), settings.max_files, settings.json_format)?;
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(event_layer(io::stderr, settings.json_format, false))
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;

    tracing::debug!(%level, file = ?settings.file, json = settings.json_format, "Logging ready");
    Ok(LogGuards { _file: file_guard })
}

/// Stderr-only subscriber for commands that run before config is loaded
pub fn init_simple(level: Level) -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .with(event_layer(io::stderr, false, false))
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

/// `-q` wins, then each `-v` steps below the configured level
fn effective_level(configured: &str, verbose: u8, quiet: bool) -> Result<Level> {
    if quiet {
        return Ok(Level::ERROR);
    }
    let base: Level = configured
        .parse()
        .map_err(|_| Error::config_field_invalid("logging.level", format!("unknown level '{}'", configured)))?;

    Ok(match verbose {
        0 => base,
        1 => base.max(Level::DEBUG),
        _ => Level::TRACE,
    })
}

fn job_filter(level: Level) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let own = format!("ofsm_orchestrator={}", level);
    let caps = NOISY_TARGETS.iter().map(|target| format!("{}=warn", target));
    for spec in std::iter::once(own).chain(caps) {
        let directive: Directive = spec
            .parse()
            .map_err(|e| Error::Internal(format!("bad log directive '{}': {}", spec, e)))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

/// Formatting shared by console and file output; files also get source locations
fn event_layer<S, W>(writer: W, json: bool, to_file: bool) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_ansi(!to_file)
        .with_file(to_file || json)
        .with_line_number(to_file || json);

    if json {
        Box::new(base.json().with_thread_ids(true).with_span_events(FmtSpan::CLOSE))
    } else if to_file {
        Box::new(base.with_thread_ids(true))
    } else {
        Box::new(base.compact())
    }
}

/// `logs/orchestrator.log` rolls as `logs/orchestrator.<date>.log`
fn rolled_name(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("orchestrator");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("log");
    (stem.to_string(), ext.to_string())
}

fn file_layer<S>(path: &Path, max_files: u32, json: bool) -> Result<(BoxedLayer<S>, WorkerGuard)>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let directory = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(directory).map_err(|e| Error::IoWrite {
        path: directory.to_path_buf(),
        source: e,
    })?;

    let (prefix, suffix) = rolled_name(path);
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix(suffix)
        .max_log_files(max_files.max(1) as usize)
        .build(directory)
        .map_err(|e| Error::Config(format!("Failed to open log file in '{}': {}", directory.display(), e)))?;

    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((event_layer(writer, json, true), guard))
}
