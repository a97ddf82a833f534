use crate::error::PipelineError;
use crate::transfer::types::{FileEntry, TransferPlan, TransferProgress, TransferSummary, COPY_CHUNK_SIZE};
use std::io;
use std::path::Path;
use std::time::Instant;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct TransferEngine {
    chunk_size: usize,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new()
    }
}

struct Counters {
    started: Instant,
    bytes_copied: u64,
    files_copied: u32,
}

impl TransferEngine {
    pub fn new() -> Self {
        Self {
            chunk_size: COPY_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Copies every planned entry, replacing existing destination files.
    ///
    /// `cancel` is polled before each entry and before each chunk. On cancellation
    /// the partial output stays where it is and `Cancelled` is returned. Any read or
    /// write failure aborts the whole transfer, as does a source entry that vanished
    /// or changed size since planning.
    ///
    /// Directories and empty files are handled before any file with content. Empty
    /// files are counted without an event of their own, so the only event at
    /// `total_bytes` is the last one.
    pub async fn transfer<F>(
        &self,
        plan: &TransferPlan,
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<TransferSummary, PipelineError>
    where
        F: FnMut(TransferProgress),
    {
        let mut counters = Counters {
            started: Instant::now(),
            bytes_copied: 0,
            files_copied: 0,
        };

        let file_root = plan.entries.len() == 1 && plan.entries[0].relative_path.as_os_str().is_empty();
        if !file_root {
            create_dir(&plan.root_destination).await?;
        }

        let (structure, content): (Vec<&FileEntry>, Vec<&FileEntry>) = plan
            .entries
            .iter()
            .partition(|e| e.is_directory || e.size_bytes == 0);

        for entry in structure.into_iter().chain(content) {
            if cancel.is_cancelled() {
                log::info!("Transfer cancelled before {}", entry.relative_path.display());
                return Err(PipelineError::Cancelled);
            }

            if entry.is_directory {
                create_dir(&plan.destination_path(entry)).await?;
                continue;
            }

            self.copy_entry(plan, entry, &mut counters, &mut on_progress, cancel)
                .await?;
        }

        if plan.total_bytes == 0 && plan.total_files > 0 {
            on_progress(TransferProgress::compute(
                0,
                0,
                counters.files_copied,
                plan.total_files,
                counters.started.elapsed(),
                None,
            ));
        }

        let summary = TransferSummary {
            bytes_copied: counters.bytes_copied,
            files_copied: counters.files_copied,
            elapsed: counters.started.elapsed(),
        };
        log::info!(
            "Transferred {} files ({} bytes) in {:.2}s",
            summary.files_copied,
            summary.bytes_copied,
            summary.elapsed.as_secs_f64()
        );
        Ok(summary)
    }

    async fn copy_entry<F>(
        &self,
        plan: &TransferPlan,
        entry: &FileEntry,
        counters: &mut Counters,
        on_progress: &mut F,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError>
    where
        F: FnMut(TransferProgress),
    {
        let source = plan.source_path(entry);
        let destination = plan.destination_path(entry);
        let label = entry.relative_path.display().to_string();

        let mut reader = match fs::File::open(&source).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PipelineError::SourceVanished { path: source });
            }
            Err(e) => return Err(PipelineError::from_io(&source, e)),
        };

        if let Some(parent) = destination.parent() {
            create_dir(parent).await?;
        }
        let mut writer = fs::File::create(&destination)
            .await
            .map_err(|e| PipelineError::from_io(&destination, e))?;

        let snapshot = |counters: &Counters| {
            TransferProgress::compute(
                counters.bytes_copied,
                plan.total_bytes,
                counters.files_copied,
                plan.total_files,
                counters.started.elapsed(),
                Some(label.clone()),
            )
        };

        if entry.size_bytes == 0 {
            counters.files_copied += 1;
        }

        let mut buffer = vec![0u8; self.chunk_size];
        let mut written = 0u64;
        loop {
            if cancel.is_cancelled() {
                log::info!("Transfer cancelled inside {label} after {written} bytes");
                return Err(PipelineError::Cancelled);
            }

            let n = read_chunk(&mut reader, &mut buffer)
                .await
                .map_err(|e| PipelineError::from_io(&source, e))?;
            if n == 0 {
                break;
            }

            writer
                .write_all(&buffer[..n])
                .await
                .map_err(|e| PipelineError::from_io(&destination, e))?;

            written += n as u64;
            counters.bytes_copied += n as u64;
            if written == entry.size_bytes {
                counters.files_copied += 1;
            }
            on_progress(snapshot(counters));
        }

        writer
            .flush()
            .await
            .map_err(|e| PipelineError::from_io(&destination, e))?;

        if written != entry.size_bytes {
            return Err(PipelineError::SourceChanged {
                path: source,
                planned: entry.size_bytes,
                actual: written,
            });
        }

        log::debug!("Copied {label} ({written} bytes)");
        Ok(())
    }
}

/// Fills `buffer` unless EOF comes first, so progress granularity is the
/// configured chunk and not whatever the runtime hands back per read.
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = reader.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn create_dir(path: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| PipelineError::from_io(path, e))
}
