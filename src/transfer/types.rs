use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bytes read and written per copy step.
pub const COPY_CHUNK_SIZE: usize = 1024 * 1024;

/// Bytes read per step when hashing for verification.
pub const HASH_CHUNK_SIZE: usize = 4 * 1024;

const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HiddenEntryPolicy {
    /// Entries whose name starts with the hidden prefix are skipped, subtree included.
    #[default]
    Exclude,
    Include,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the enumerated root. Empty when the root itself is a file.
    pub relative_path: PathBuf,
    pub size_bytes: u64,
    pub is_directory: bool,
}

/// Immutable manifest of one transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferPlan {
    pub root_source: PathBuf,
    pub root_destination: PathBuf,
    pub total_bytes: u64,
    pub total_files: u32,
    pub entries: Vec<FileEntry>,
}

impl TransferPlan {
    /// Builds a plan from an already enumerated entry list, deriving the totals.
    pub fn from_entries(root_source: PathBuf, root_destination: PathBuf, entries: Vec<FileEntry>) -> Self {
        let files = entries.iter().filter(|e| !e.is_directory);
        let total_bytes = files.clone().map(|e| e.size_bytes).sum();
        let total_files = files.count() as u32;

        Self {
            root_source,
            root_destination,
            total_bytes,
            total_files,
            entries,
        }
    }

    pub fn source_path(&self, entry: &FileEntry) -> PathBuf {
        resolve(&self.root_source, &entry.relative_path)
    }

    pub fn destination_path(&self, entry: &FileEntry) -> PathBuf {
        resolve(&self.root_destination, &entry.relative_path)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter().filter(|e| !e.is_directory)
    }
}

fn resolve(root: &Path, relative: &Path) -> PathBuf {
    if relative.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

/// Snapshot emitted after every chunk written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferProgress {
    pub bytes_copied: u64,
    pub total_bytes: u64,
    pub files_copied: u32,
    pub total_files: u32,
    pub elapsed_seconds: f64,
    /// Average throughput since the transfer started, in MiB/s.
    pub current_speed_mbps: f64,
    pub remaining_files: u32,
    /// `None` while throughput is still zero.
    pub remaining_time_estimate: Option<Duration>,
    pub current_file: Option<String>,
}

impl TransferProgress {
    pub fn compute(
        bytes_copied: u64,
        total_bytes: u64,
        files_copied: u32,
        total_files: u32,
        elapsed: Duration,
        current_file: Option<String>,
    ) -> Self {
        let elapsed_seconds = elapsed.as_secs_f64();
        let bytes_per_sec = if elapsed_seconds > 0.0 {
            bytes_copied as f64 / elapsed_seconds
        } else {
            0.0
        };

        let remaining_time_estimate = if bytes_per_sec > 0.0 {
            let remaining = total_bytes.saturating_sub(bytes_copied) as f64;
            Some(Duration::from_secs_f64(remaining / bytes_per_sec))
        } else {
            None
        };

        Self {
            bytes_copied,
            total_bytes,
            files_copied,
            total_files,
            elapsed_seconds,
            current_speed_mbps: bytes_per_sec / MIB,
            remaining_files: total_files.saturating_sub(files_copied),
            remaining_time_estimate,
            current_file,
        }
    }

    /// Whole percent of bytes copied, clamped to 100. An empty plan counts as complete.
    pub fn percent(&self) -> u32 {
        if self.total_bytes == 0 {
            return 100;
        }
        ((self.bytes_copied.min(self.total_bytes) as f64 / self.total_bytes as f64) * 100.0) as u32
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerificationFailure {
    SizeMismatch,
    HashMismatch,
    MissingDestination,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationResult {
    pub relative_path: PathBuf,
    pub passed: bool,
    pub reason: Option<VerificationFailure>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationReport {
    pub total: u32,
    pub failed: Vec<VerificationResult>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_count(&self) -> u32 {
        self.failed.len() as u32
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TransferSummary {
    pub bytes_copied: u64,
    pub files_copied: u32,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, size: u64, is_directory: bool) -> FileEntry {
        FileEntry {
            relative_path: PathBuf::from(path),
            size_bytes: size,
            is_directory,
        }
    }

    #[test]
    fn test_plan_totals_skip_directories() {
        let plan = TransferPlan::from_entries(
            PathBuf::from("/src"),
            PathBuf::from("/dst"),
            vec![entry("a", 0, true), entry("a/x", 10, false), entry("y", 5, false)],
        );
        assert_eq!(plan.total_bytes, 15);
        assert_eq!(plan.total_files, 2);
        assert_eq!(plan.files().count(), 2);
    }

    #[test]
    fn test_empty_relative_path_resolves_to_root() {
        let plan = TransferPlan::from_entries(
            PathBuf::from("/src/file.bin"),
            PathBuf::from("/dst/file.bin"),
            vec![entry("", 3, false)],
        );
        let e = &plan.entries[0];
        assert_eq!(plan.source_path(e), PathBuf::from("/src/file.bin"));
        assert_eq!(plan.destination_path(e), PathBuf::from("/dst/file.bin"));
    }

    #[test]
    fn test_progress_eta_unknown_without_throughput() {
        let p = TransferProgress::compute(0, 100, 0, 2, Duration::ZERO, None);
        assert_eq!(p.current_speed_mbps, 0.0);
        assert!(p.remaining_time_estimate.is_none());
        assert_eq!(p.remaining_files, 2);
    }

    #[test]
    fn test_progress_eta_from_average_throughput() {
        // 2 MiB in 2 s → 1 MiB/s, 3 MiB left → 3 s.
        let p = TransferProgress::compute(
            2 * 1024 * 1024,
            5 * 1024 * 1024,
            1,
            3,
            Duration::from_secs(2),
            Some("a.bin".to_string()),
        );
        assert!((p.current_speed_mbps - 1.0).abs() < 1e-9);
        let eta = p.remaining_time_estimate.unwrap();
        assert!((eta.as_secs_f64() - 3.0).abs() < 1e-6);
        assert_eq!(p.percent(), 40);
    }

    #[test]
    fn test_percent_of_empty_plan_is_complete() {
        let p = TransferProgress::compute(0, 0, 0, 0, Duration::from_secs(1), None);
        assert_eq!(p.percent(), 100);
    }
}
