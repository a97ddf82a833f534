use std::path::Path;

use crate::error::PipelineError;

/// Maximum allowed path length for security
const MAX_PATH_LENGTH: usize = 4096;

/// Validate that a user-supplied path string is well formed.
pub fn validate_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("Path is empty".to_string());
    }

    if path.len() > MAX_PATH_LENGTH {
        return Err(format!("Path too long (max {MAX_PATH_LENGTH} bytes)"));
    }

    if path.bytes().any(|b| b == 0) {
        return Err("Path contains null bytes".to_string());
    }

    Ok(())
}

/// Validate that a path exists and is a directory.
pub fn verify_directory(path: &Path) -> Result<(), PipelineError> {
    let meta = std::fs::metadata(path).map_err(|e| PipelineError::from_io(path, e))?;
    if !meta.is_dir() {
        return Err(PipelineError::InvalidConfig {
            reason: format!("{} is not a directory", path.display()),
        });
    }
    Ok(())
}

/// Validate a watched root and a destination root as a pair.
///
/// Both must be existing directories and neither may contain the other: a nested
/// pair would let the transfer's own writes re-trigger the watcher.
pub fn validate_roots(watched: &Path, destination: &Path) -> Result<(), PipelineError> {
    verify_directory(watched)?;
    verify_directory(destination)?;

    let watched_canonical = watched
        .canonicalize()
        .map_err(|e| PipelineError::from_io(watched, e))?;
    let destination_canonical = destination
        .canonicalize()
        .map_err(|e| PipelineError::from_io(destination, e))?;

    if watched_canonical.starts_with(&destination_canonical)
        || destination_canonical.starts_with(&watched_canonical)
    {
        return Err(PipelineError::InvalidConfig {
            reason: format!(
                "{} and {} overlap",
                watched.display(),
                destination.display()
            ),
        });
    }

    Ok(())
}
