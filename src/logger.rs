//! Session logger: the `log` facade backend for PhotoFE.
//!
//! Every record goes to a single file in the OS data directory. The file is
//! **truncated at each launch**, so it only ever holds the most recent
//! session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\PhotoFE\photofe.log`
//!   Linux:    `~/.local/share/PhotoFE/photofe.log`
//!   macOS:    `~/Library/Application Support/PhotoFE/photofe.log`
//!
//! Library code logs through `log::{info, warn, error, debug}` and never
//! depends on `init` having run; without it, records are simply dropped.

use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

static LOGGER: OnceLock<SessionLogger> = OnceLock::new();

struct SessionLogger {
    file: Mutex<File>,
    path: PathBuf,
    /// Mirror warnings and errors to stderr (headless runs).
    echo_stderr: bool,
}

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] [{}] [{}] {}", timestamp(), record.level(), record.target(), record.args());
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{line}");
        }
        if self.echo_stderr && record.level() <= log::Level::Warn {
            eprintln!("{}", line);
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

/// Where this session is logging, once `init` has succeeded.
pub fn log_path() -> Option<&'static Path> {
    LOGGER.get().map(|l| l.path.as_path())
}

/// Initialise the session logger at the default location.
pub fn init(level: LevelFilter, echo_stderr: bool) {
    init_at(log_file_path(), level, echo_stderr);
}

/// Initialise the session logger writing to `path`.
///
/// * Truncates the log file, creating it and its directory if needed.
/// * Registers it as the global `log` backend.
/// * Installs a panic hook that mirrors the panic message to the log before
///   running the previous hook.
///
/// Only the first call takes effect. Failing to open the file is not fatal.
pub fn init_at(path: PathBuf, level: LevelFilter, echo_stderr: bool) {
    if LOGGER.get().is_some() {
        return;
    }
    let opened = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| OpenOptions::new().create(true).write(true).truncate(true).open(&path));
    let file = match opened {
        Ok(f) => f,
        Err(e) => {
            eprintln!("photofe: cannot open session log {}: {}", path.display(), e);
            return;
        }
    };

    let logger = LOGGER.get_or_init(|| SessionLogger { file: Mutex::new(file), path, echo_stderr });
    if log::set_logger(logger).is_err() {
        // Another backend is already installed (e.g. by a test harness).
        return;
    }
    log::set_max_level(level);

    if let Ok(mut file) = logger.file.lock() {
        let _ = writeln!(file, "=== PhotoFE session started {} ===", session_stamp());
        let _ = writeln!(file, "Log file: {}", logger.path.display());
        let _ = writeln!(file);
    }

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log::error!(target: "panic", "PANIC: {}", info);
        log::logger().flush();
        default_hook(info);
    }));
}

fn log_file_path() -> PathBuf {
    data_dir().join("PhotoFE").join("photofe.log")
}

/// Per-user data root for the current platform, or `.` when the
/// environment gives nothing usable.
fn data_dir() -> PathBuf {
    let env_path = |key: &str| std::env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from);

    let platform = if cfg!(target_os = "windows") {
        env_path("APPDATA")
    } else if cfg!(target_os = "macos") {
        env_path("HOME").map(|h| h.join("Library/Application Support"))
    } else {
        None
    };

    platform
        .or_else(|| env_path("XDG_DATA_HOME"))
        .or_else(|| env_path("HOME").map(|h| h.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn since_epoch() -> Option<Duration> {
    SystemTime::now().duration_since(UNIX_EPOCH).ok()
}

/// Wall-clock time of day (UTC) as `HH:MM:SS.mmm`.
fn timestamp() -> String {
    let Some(d) = since_epoch() else {
        return "--:--:--.---".to_string();
    };
    let day_secs = d.as_secs() % 86_400;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        day_secs / 3600,
        day_secs / 60 % 60,
        day_secs % 60,
        d.subsec_millis()
    )
}

fn session_stamp() -> String {
    since_epoch().map_or_else(|| "at an unknown time".to_string(), |d| format!("at unix {}", d.as_secs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_shape() {
        let ts = timestamp();
        assert_eq!(ts.len(), 12);
        assert_eq!(&ts[2..3], ":");
        assert_eq!(&ts[8..9], ".");
    }

    #[test]
    fn data_dir_is_never_empty() {
        assert!(!data_dir().as_os_str().is_empty());
        assert!(log_file_path().ends_with("PhotoFE/photofe.log"));
    }
}
