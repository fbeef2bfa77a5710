use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

static INIT_ONCE: std::sync::Once = std::sync::Once::new();

/// Install the global `tracing` subscriber once. `RUST_LOG` wins, default `info`.
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
    });
}

// -------- file operations with retry/backoff --------

const TRIES: usize = 16;
const DELAY_MS: u64 = 50;

/// Transient errors worth retrying: sharing/lock violations and device
/// hiccups on Windows, interrupted calls everywhere.
fn is_retriable_io_error(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::Interrupted {
        return true;
    }
    matches!(e.raw_os_error(), Some(5 | 21 | 32 | 33 | 225 | 433 | 1006 | 1117 | 1224))
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// attempts run out. The delay grows linearly with each attempt.
fn with_backoff<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_retriable_io_error(&e) && attempt + 1 < TRIES => {
                attempt += 1;
                sleep(Duration::from_millis(DELAY_MS.saturating_mul(attempt as u64)));
            }
            Err(e) => return Err(e),
        }
    }
}

pub fn open_with_backoff(path: &Path) -> io::Result<File> {
    with_backoff(|| File::open(path))
}

pub fn create_with_backoff(path: &Path) -> io::Result<File> {
    with_backoff(|| File::create(path))
}

/// Create `path`, failing with `AlreadyExists` instead of truncating.
pub fn create_new_with_backoff(path: &Path) -> io::Result<File> {
    with_backoff(|| OpenOptions::new().write(true).create_new(true).open(path))
}

/// Remove a file; a file that is already gone counts as success.
pub fn remove_with_backoff(path: &Path) -> Result<()> {
    match with_backoff(|| fs::remove_file(path)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
    }
}

/// Replace `dest` with `tmp`. Falls back to copy+remove when the rename is
/// refused (cross-device moves, sharing violations that outlast the retries).
pub fn replace_file_atomic_backoff(tmp: &Path, dest: &Path) -> Result<()> {
    if with_backoff(|| fs::rename(tmp, dest)).is_ok() {
        return Ok(());
    }
    with_backoff(|| fs::copy(tmp, dest))
        .with_context(|| format!("copy {} -> {}", tmp.display(), dest.display()))?;
    remove_with_backoff(tmp)
}
