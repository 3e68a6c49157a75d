//! Log sinks
//!
//! JSON lines go to stdout; a plain-text copy is appended to `app.log` in
//! the configured log directory, which is what `/logs` tails.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Name of the text log file inside the log directory
pub const LOG_FILE_NAME: &str = "app.log";

/// Default number of lines returned by [`tail_lines`] callers
pub const DEFAULT_TAIL_LINES: usize = 50;

/// Path of the text log inside `log_dir`
pub fn log_file_path(log_dir: impl AsRef<Path>) -> PathBuf {
    log_dir.as_ref().join(LOG_FILE_NAME)
}

fn open_log_file(log_dir: &Path) -> Result<(PathBuf, File)> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let path = log_file_path(log_dir);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    Ok((path, file))
}

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install the global subscriber and return the text log path
///
/// `RUST_LOG` overrides `default_filter`. Fails if a subscriber is already
/// installed.
pub fn init(log_dir: impl AsRef<Path>, default_filter: &str) -> Result<PathBuf> {
    let (path, file) = open_log_file(log_dir.as_ref())?;

    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(fmt::layer().json())
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(path)
}

/// Like [`init`] but without the stdout layer, for command-line tools
/// whose stdout is their output
pub fn init_file_only(log_dir: impl AsRef<Path>, default_filter: &str) -> Result<PathBuf> {
    let (path, file) = open_log_file(log_dir.as_ref())?;

    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(path)
}

/// Last `n` lines of a text file, each with its newline
///
/// Returns `None` when the file does not exist.
pub fn tail_lines(path: impl AsRef<Path>, n: usize) -> io::Result<Option<String>> {
    let file = match fs::File::open(path.as_ref()) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut window = std::collections::VecDeque::with_capacity(n.min(4096));
    for line in BufReader::new(file).lines() {
        let line = line?;
        if n == 0 {
            continue;
        }
        if window.len() == n {
            window.pop_front();
        }
        window.push_back(line);
    }

    let mut out = String::new();
    for line in window {
        out.push_str(&line);
        out.push('\n');
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_tail_returns_last_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(LOG_FILE_NAME);
        let mut file = fs::File::create(&path).unwrap();
        for i in 0..10 {
            writeln!(file, "line {}", i).unwrap();
        }

        let tail = tail_lines(&path, 3).unwrap().unwrap();
        assert_eq!(tail, "line 7\nline 8\nline 9\n");
        assert_eq!(tail_lines(&path, 100).unwrap().unwrap().lines().count(), 10);
        assert_eq!(tail_lines(&path, 0).unwrap().unwrap(), "");
    }

    #[test]
    fn test_tail_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(tail_lines(temp_dir.path().join("nope.log"), 5).unwrap().is_none());
    }

    #[test]
    fn test_log_file_path() {
        assert_eq!(log_file_path("logs"), PathBuf::from("logs/app.log"));
    }
}
