use crate::error::PipelineError;
use crate::transfer::types::{FileEntry, HiddenEntryPolicy, TransferPlan};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Depth-first lister shared by planning, copying and verification, so all three
/// see the same hidden-entry filtering.
#[derive(Debug, Clone)]
pub struct PathEnumerator {
    policy: HiddenEntryPolicy,
    hidden_prefix: String,
}

impl Default for PathEnumerator {
    fn default() -> Self {
        Self::new(HiddenEntryPolicy::Exclude, ".")
    }
}

impl PathEnumerator {
    pub fn new(policy: HiddenEntryPolicy, hidden_prefix: impl Into<String>) -> Self {
        Self {
            policy,
            hidden_prefix: hidden_prefix.into(),
        }
    }

    pub fn policy(&self) -> HiddenEntryPolicy {
        self.policy
    }

    pub fn is_hidden(&self, name: &str) -> bool {
        self.policy == HiddenEntryPolicy::Exclude
            && !self.hidden_prefix.is_empty()
            && name.starts_with(&self.hidden_prefix)
    }

    fn keep(&self, entry: &DirEntry) -> bool {
        // The root is never filtered, even if its own name looks hidden.
        entry.depth() == 0 || !self.is_hidden(&entry.file_name().to_string_lossy())
    }

    /// Lists every entry under `root` in sorted pre-order. A file root yields a
    /// single entry with an empty relative path; a directory root is not listed itself.
    ///
    /// Symbolic links are not followed and are left out of the listing.
    ///
    /// Any unreadable subtree aborts the whole pass: a partial listing would make
    /// the plan totals wrong.
    pub fn enumerate(&self, root: &Path) -> Result<Vec<FileEntry>, PipelineError> {
        let root_meta = std::fs::metadata(root).map_err(|e| PipelineError::from_io(root, e))?;
        if !root_meta.is_dir() {
            return Ok(vec![FileEntry {
                relative_path: PathBuf::new(),
                size_bytes: root_meta.len(),
                is_directory: false,
            }]);
        }

        let mut entries = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.keep(e));

        for item in walker {
            let entry = item.map_err(|e| walk_error(root, e))?;
            if entry.depth() == 0 {
                continue;
            }
            if entry.path_is_symlink() {
                log::warn!("Skipping symlink {}", entry.path().display());
                continue;
            }

            let metadata = entry
                .metadata()
                .map_err(|e| walk_error(entry.path(), e))?;
            let relative_path = entry
                .path()
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .map_err(|_| PipelineError::InvalidConfig {
                    reason: format!("{} escapes {}", entry.path().display(), root.display()),
                })?;

            entries.push(FileEntry {
                relative_path,
                size_bytes: if metadata.is_dir() { 0 } else { metadata.len() },
                is_directory: metadata.is_dir(),
            });
        }

        log::debug!("Enumerated {} entries under {}", entries.len(), root.display());
        Ok(entries)
    }

    pub fn total_size(&self, root: &Path) -> Result<u64, PipelineError> {
        Ok(self
            .enumerate(root)?
            .iter()
            .filter(|e| !e.is_directory)
            .map(|e| e.size_bytes)
            .sum())
    }

    pub fn total_file_count(&self, root: &Path) -> Result<u32, PipelineError> {
        Ok(self.enumerate(root)?.iter().filter(|e| !e.is_directory).count() as u32)
    }

    /// Single enumeration pass over `source`, paired with `destination`.
    pub fn plan(&self, source: &Path, destination: &Path) -> Result<TransferPlan, PipelineError> {
        let entries = self.enumerate(source)?;
        let plan = TransferPlan::from_entries(source.to_path_buf(), destination.to_path_buf(), entries);
        log::info!(
            "Planned {} files ({} bytes) from {} to {}",
            plan.total_files,
            plan.total_bytes,
            source.display(),
            destination.display()
        );
        Ok(plan)
    }

    /// True when `dir` holds at least one non-hidden regular file at any depth.
    pub fn contains_file(&self, dir: &Path) -> bool {
        WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| self.keep(e))
            .filter_map(|e| e.ok())
            .any(|e| e.depth() > 0 && e.file_type().is_file())
    }
}

fn walk_error(fallback: &Path, err: walkdir::Error) -> PipelineError {
    let path = err.path().unwrap_or(fallback).to_path_buf();
    match err.into_io_error() {
        Some(io_err) => PipelineError::from_io(&path, io_err),
        // Loop detection only runs when links are followed.
        None => PipelineError::InvalidConfig {
            reason: format!("filesystem loop at {}", path.display()),
        },
    }
}
