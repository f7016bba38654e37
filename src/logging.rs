// File-based logging: every tracing event goes to stderr and a timestamped log file.
//
// Creates a new log file on every launch:
//   ~/.local/share/vosk-session/logs/vosk-session-2026-03-01_14-30-00.log
//
// Keeps last 5 log files, deletes older ones.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};

use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log files kept across launches
const KEEP_LOGS: usize = 5;

const LOG_PREFIX: &str = "vosk-session-";

/// Initialize logging. Call once at startup; later calls do nothing.
///
/// `filter` is used unless `RUST_LOG` is set. If the log file can't be
/// created, logging continues on stderr only.
pub fn init(logs_dir: &Path, filter: &str) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

        let (file_layer, file_error) = match open_log_file(logs_dir) {
            Ok((file, path)) => (
                Some(
                    fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                ),
                Ok(path),
            ),
            Err(e) => (None, Err(e)),
        };

        let installed = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(io::stderr))
            .with(file_layer)
            .try_init();
        if installed.is_err() {
            // Host already installed a subscriber; ours would never see events
            return;
        }

        match file_error {
            Ok(path) => info!("Logging: Writing to {}", path.display()),
            Err(e) => warn!("Failed to initialize file logging: {}", e),
        }
    });
}

fn open_log_file(logs_dir: &Path) -> io::Result<(fs::File, PathBuf)> {
    fs::create_dir_all(logs_dir)?;

    // Leave room for the file created below
    rotate_logs(logs_dir, KEEP_LOGS - 1)?;

    let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    let log_file_path = logs_dir.join(format!("{}{}.log", LOG_PREFIX, timestamp));

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)?;

    Ok((log_file, log_file_path))
}

/// Delete old log files, keeping the most recent `keep` files.
fn rotate_logs(logs_dir: &Path, keep: usize) -> Result<(), io::Error> {
    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();

    for entry in fs::read_dir(logs_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_ours = path.extension().and_then(|e| e.to_str()) == Some("log")
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(LOG_PREFIX))
                .unwrap_or(false);
        if !is_ours {
            continue;
        }
        if let Ok(metadata) = entry.metadata() {
            let modified = metadata.modified().unwrap_or(std::time::UNIX_EPOCH);
            log_files.push((path, modified));
        }
    }

    // Newest first; name breaks ties since timestamps sort lexically
    log_files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

    for (path, _) in log_files.iter().skip(keep) {
        let _ = fs::remove_file(path);
    }

    Ok(())
}

/// Get the logs directory path.
pub fn logs_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("vosk-session").join("logs"))
}
