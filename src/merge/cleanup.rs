use log::{debug, warn};
use std::io;
use std::path::Path;
use std::time::Duration;

/// Deletes `path`, retrying with a fixed pause until it succeeds or
/// `max_attempts` is reached (`None` keeps trying). A missing file counts as deleted.
///
/// Blocks the calling thread between attempts.
pub fn remove_with_retry(path: &Path, delay: Duration, max_attempts: Option<u32>) -> io::Result<()> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                if max_attempts.is_some_and(|max| attempt >= max) {
                    return Err(e);
                }
                warn!(
                    "Could not delete {} (attempt {}): {}, retrying in {:?}",
                    path.display(),
                    attempt,
                    e,
                    delay
                );
                std::thread::sleep(delay);
            }
        }
    }
}

/// Deletes every path, logging (not returning) failures.
pub fn remove_all(paths: &[impl AsRef<Path>], delay: Duration, max_attempts: Option<u32>) -> usize {
    let mut removed = 0;
    for path in paths {
        let path = path.as_ref();
        if !path.exists() {
            continue;
        }
        match remove_with_retry(path, delay, max_attempts) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Giving up deleting {}: {}", path.display(), e),
        }
    }
    removed
}
