pub mod agent_core;
pub mod commands;
pub mod config;
pub mod events;
pub mod inference;
pub mod tools;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Return the platform-standard data directory for the assistant.
///
/// - macOS: `~/Library/Application Support/library-assistant/`
/// - Windows: `{FOLDERID_RoamingAppData}\library-assistant\`
/// - Linux: `$XDG_DATA_HOME/library-assistant/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.library-assistant/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("library-assistant");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".library-assistant")
}

/// Log file name inside [`data_dir`].
pub const LOG_FILE_NAME: &str = "assistant.log";

/// Rotated generations kept next to the live log.
const KEPT_LOG_GENERATIONS: u32 = 3;

/// Initialize the tracing subscriber: structured logs go to a file so the
/// terminal stays free for the conversation.
///
/// The previous run's log becomes `assistant.log.1`, older generations shift
/// up and the oldest is dropped. Returns the path of the fresh log.
pub fn init_tracing() -> io::Result<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = data_dir();
    fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join(LOG_FILE_NAME);
    rotate_logs(&log_path, KEPT_LOG_GENERATIONS);
    let log_file = SyncedLogFile::create(&log_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("library_assistant=info,warn"));

    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== Library Assistant starting ==="
    );

    Ok(log_path)
}

/// `assistant.log` → `assistant.log.{n}`.
fn generation_path(log_path: &Path, n: u32) -> PathBuf {
    let mut name = log_path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Shift every generation up by one and drop generation `keep`.
///
/// Gaps in the chain are fine: renaming a missing file just fails.
fn rotate_logs(log_path: &Path, keep: u32) {
    let _ = fs::remove_file(generation_path(log_path, keep));
    for n in (1..keep).rev() {
        let _ = fs::rename(generation_path(log_path, n), generation_path(log_path, n + 1));
    }
    let _ = fs::rename(log_path, generation_path(log_path, 1));
}

/// Shared handle to the log file. Every write is flushed before returning.
#[derive(Clone)]
struct SyncedLogFile(Arc<Mutex<File>>);

impl SyncedLogFile {
    fn create(path: &Path) -> io::Result<Self> {
        let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self(Arc::new(Mutex::new(file))))
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, File>> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))
    }
}

impl Write for SyncedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.lock()?;
        file.write_all(buf)?;
        file.flush()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SyncedLogFile {
    type Writer = SyncedLogFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
