//! Utility functions for AuthGate

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "AuthGate";

/// Local data directory for session stores and logs
pub fn authgate_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| std::env::temp_dir().join(APP_NAME))
}

// ═══════════════════════════════════════════════════════════════════════════════
//  RETRY UTILITIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Retry delays in milliseconds (exponential backoff)
const DEFAULT_RETRY_DELAYS: [u64; 3] = [250, 500, 1000];

/// Retry an async operation while `should_retry` accepts the error
pub async fn with_retry_if<T, E, F, Fut, P>(
    max_attempts: u32,
    should_retry: P,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.clamp(1, 10);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && should_retry(&e) => {
                let delay_idx = (attempt as usize - 1).min(DEFAULT_RETRY_DELAYS.len() - 1);
                let delay_ms = DEFAULT_RETRY_DELAYS[delay_idx];
                log::warn!(
                    "Attempt {}/{} failed: {}, retrying in {}ms...",
                    attempt,
                    max_attempts,
                    e,
                    delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt > 1 {
                    log::error!("All {} attempts failed. Last error: {}", attempt, e);
                }
                return Err(e);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  LOG ROTATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum log file size before rotation (1MB)
const MAX_LOG_SIZE: u64 = 1024 * 1024;

/// Rotate log file if it exceeds the maximum size
///
/// Renames the current log to .old (deleting previous .old) if it's too large.
/// Returns Ok(true) if rotation occurred, Ok(false) if not needed.
pub fn rotate_log_if_needed(log_path: &Path) -> std::io::Result<bool> {
    if !log_path.exists() {
        return Ok(false);
    }

    let metadata = std::fs::metadata(log_path)?;
    if metadata.len() <= MAX_LOG_SIZE {
        return Ok(false);
    }

    let old_path = log_path.with_extension("log.old");
    if old_path.exists() {
        let _ = std::fs::remove_file(&old_path);
    }

    std::fs::rename(log_path, &old_path)?;

    log::info!(
        "Rotated log file: {} -> {}",
        log_path.display(),
        old_path.display()
    );
    Ok(true)
}
