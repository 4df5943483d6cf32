use clap::ValueEnum;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "app.log";
const FILTER_ENV: &str = "REMOTE_UI_LOG_FILTER";

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Logs go to `<dir>/app.log` when set, stderr otherwise.
    pub dir: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to prepare log directory {path:?}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to configure logger: {0}")]
    Configure(String),
}

static INIT: OnceLock<()> = OnceLock::new();
static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub fn init(config: &LogConfig) -> Result<(), InitError> {
    if INIT.get().is_some() {
        return Ok(());
    }

    inner_init(config)?;
    INIT.set(()).ok();
    Ok(())
}

fn inner_init(config: &LogConfig) -> Result<(), InitError> {
    let (writer, guard) = match &config.dir {
        Some(dir) => {
            prepare_log_dir(dir)?;
            let path = dir.join(LOG_FILE_NAME);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|source| InitError::Io { path, source })?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(config.level.to_filter()))
        .with_level(true)
        .with_target(config.level >= LogLevel::Debug)
        .with_thread_names(config.level >= LogLevel::Trace)
        .with_ansi(config.dir.is_none())
        .with_writer(writer)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| InitError::Configure(err.to_string()))?;

    let _ = GUARD.set(guard);
    Ok(())
}

fn build_env_filter(level: LevelFilter) -> EnvFilter {
    for name in [FILTER_ENV, "RUST_LOG"] {
        if let Ok(filter) = std::env::var(name) {
            return EnvFilter::new(filter);
        }
    }
    EnvFilter::new(default_filter_for(level))
}

/// Our own crates log at `level`; dependencies stay at `warn` unless the
/// level is stricter.
fn default_filter_for(level: LevelFilter) -> String {
    let level = level.to_string().to_lowercase();
    match level.as_str() {
        "debug" | "trace" => format!("warn,ui_host={level},remote_ui_host_runtime={level}"),
        _ => level,
    }
}

/// Creates the directory if needed and removes `*.log` files from earlier
/// runs. A file that cannot be removed is reported and skipped.
pub fn prepare_log_dir(dir: &Path) -> Result<(), InitError> {
    fs::create_dir_all(dir).map_err(|source| InitError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;

    let entries = fs::read_dir(dir).map_err(|source| InitError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries.flatten() {
        let path = entry.path();
        let is_log = path.extension().is_some_and(|ext| ext == "log");
        if is_log && path.is_file() {
            if let Err(err) = fs::remove_file(&path) {
                // The subscriber is not installed yet.
                eprintln!("failed to remove old log {}: {err}", path.display());
            }
        }
    }

    Ok(())
}
