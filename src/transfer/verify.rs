use crate::error::PipelineError;
use crate::transfer::enumerate::PathEnumerator;
use crate::transfer::types::{
    TransferPlan, VerificationFailure, VerificationReport, VerificationResult, HASH_CHUNK_SIZE,
};
use std::hash::Hasher;
use std::io;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;
use twox_hash::XxHash64;

/// Read-only comparison of a copied tree against its source.
#[derive(Debug, Default, Clone)]
pub struct IntegrityVerifier;

impl IntegrityVerifier {
    pub fn new() -> Self {
        Self
    }

    async fn calculate_checksum(&self, path: &Path) -> io::Result<u64> {
        let mut file = fs::File::open(path).await?;
        let mut hasher = XxHash64::with_seed(0);
        let mut buffer = [0u8; HASH_CHUNK_SIZE];

        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.write(&buffer[..n]);
        }

        Ok(hasher.finish())
    }

    /// Checks one planned file: missing destination first, then size, and only
    /// when sizes agree, content hash.
    pub async fn verify_file(&self, source: &Path, destination: &Path) -> Result<Option<VerificationFailure>, PipelineError> {
        let dst_meta = match fs::metadata(destination).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Some(VerificationFailure::MissingDestination));
            }
            Err(e) => return Err(PipelineError::from_io(destination, e)),
        };
        let src_meta = fs::metadata(source)
            .await
            .map_err(|e| PipelineError::from_io(source, e))?;

        if src_meta.len() != dst_meta.len() {
            return Ok(Some(VerificationFailure::SizeMismatch));
        }

        let source_hash = self
            .calculate_checksum(source)
            .await
            .map_err(|e| PipelineError::from_io(source, e))?;
        let destination_hash = self
            .calculate_checksum(destination)
            .await
            .map_err(|e| PipelineError::from_io(destination, e))?;

        if source_hash != destination_hash {
            return Ok(Some(VerificationFailure::HashMismatch));
        }
        Ok(None)
    }

    /// Verifies every file of `plan`, collecting failures instead of stopping at
    /// the first. `on_tick` receives the percentage of files checked after each file.
    pub async fn verify<F>(&self, plan: &TransferPlan, mut on_tick: F) -> Result<VerificationReport, PipelineError>
    where
        F: FnMut(u32),
    {
        let total = plan.total_files;
        let mut report = VerificationReport {
            total,
            failed: Vec::new(),
        };

        for (checked, entry) in plan.files().enumerate() {
            let source = plan.source_path(entry);
            let destination = plan.destination_path(entry);

            if let Some(reason) = self.verify_file(&source, &destination).await? {
                log::warn!("Verification failed for {}: {:?}", entry.relative_path.display(), reason);
                report.failed.push(VerificationResult {
                    relative_path: entry.relative_path.clone(),
                    passed: false,
                    reason: Some(reason),
                });
            }

            let checked = checked as u32 + 1;
            on_tick(checked * 100 / total.max(1));
        }

        log::info!(
            "Verified {} files, {} failed",
            report.total,
            report.failed_count()
        );
        Ok(report)
    }

    /// Root-pair form: plans `source` with `enumerator` and verifies against `destination`.
    pub async fn verify_roots<F>(
        &self,
        source: &Path,
        destination: &Path,
        enumerator: &PathEnumerator,
        on_tick: F,
    ) -> Result<VerificationReport, PipelineError>
    where
        F: FnMut(u32),
    {
        let plan = enumerator.plan(source, destination)?;
        self.verify(&plan, on_tick).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{TransferEngine, VerificationFailure};
    use std::fs as std_fs;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn pair() -> (TempDir, PathBuf, PathBuf) {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        std_fs::create_dir_all(src.join("nested")).unwrap();
        std_fs::create_dir_all(&dst).unwrap();
        (temp, src, dst)
    }

    #[tokio::test]
    async fn test_round_trip_has_no_failures() {
        let (_temp, src, dst) = pair();
        std_fs::write(src.join("a.bin"), vec![1u8; 9000]).unwrap();
        std_fs::write(src.join("nested/b.txt"), b"bee").unwrap();
        std_fs::write(src.join("empty"), b"").unwrap();

        let enumerator = PathEnumerator::default();
        let plan = enumerator.plan(&src, &dst).unwrap();
        TransferEngine::new()
            .transfer(&plan, |_| {}, &CancellationToken::new())
            .await
            .unwrap();

        let report = IntegrityVerifier::new()
            .verify_roots(&src, &dst, &enumerator, |_| {})
            .await
            .unwrap();
        assert_eq!(report.total, 3);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_same_size_tamper_is_hash_mismatch() {
        let (_temp, src, dst) = pair();
        std_fs::write(src.join("f.bin"), b"abcdefgh").unwrap();
        std_fs::write(dst.join("f.bin"), b"abcdefgX").unwrap();

        let result = IntegrityVerifier::new()
            .verify_file(&src.join("f.bin"), &dst.join("f.bin"))
            .await
            .unwrap();
        assert_eq!(result, Some(VerificationFailure::HashMismatch));
    }

    #[tokio::test]
    async fn test_size_difference_short_circuits() {
        let (_temp, src, dst) = pair();
        std_fs::write(src.join("f.bin"), b"abc").unwrap();
        std_fs::write(dst.join("f.bin"), b"abcd").unwrap();

        let result = IntegrityVerifier::new()
            .verify_file(&src.join("f.bin"), &dst.join("f.bin"))
            .await
            .unwrap();
        assert_eq!(result, Some(VerificationFailure::SizeMismatch));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_destination_does_not_hash() {
        use std::os::unix::fs::PermissionsExt;

        let (_temp, src, dst) = pair();
        // An unreadable source proves no hash was attempted: hashing would error.
        std_fs::write(src.join("f.bin"), b"data").unwrap();
        std_fs::set_permissions(src.join("f.bin"), std_fs::Permissions::from_mode(0o000)).unwrap();

        let result = IntegrityVerifier::new()
            .verify_file(&src.join("f.bin"), &dst.join("f.bin"))
            .await;
        std_fs::set_permissions(src.join("f.bin"), std_fs::Permissions::from_mode(0o644)).unwrap();

        assert_eq!(result.unwrap(), Some(VerificationFailure::MissingDestination));
    }

    #[tokio::test]
    async fn test_failures_are_collected_with_ticks() {
        let (_temp, src, dst) = pair();
        for name in ["a", "b", "c", "d"] {
            std_fs::write(src.join(name), name.repeat(10)).unwrap();
        }
        std_fs::write(dst.join("a"), "a".repeat(10)).unwrap();
        std_fs::write(dst.join("b"), "B".repeat(10)).unwrap();
        std_fs::write(dst.join("c"), "c".repeat(3)).unwrap();

        let plan = PathEnumerator::default().plan(&src, &dst).unwrap();
        let mut ticks = Vec::new();
        let report = IntegrityVerifier::new()
            .verify(&plan, |p| ticks.push(p))
            .await
            .unwrap();

        assert_eq!(ticks, vec![25, 50, 75, 100]);
        let reasons: Vec<_> = report.failed.iter().map(|r| (r.relative_path.clone(), r.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                (PathBuf::from("b"), Some(VerificationFailure::HashMismatch)),
                (PathBuf::from("c"), Some(VerificationFailure::SizeMismatch)),
                (PathBuf::from("d"), Some(VerificationFailure::MissingDestination)),
            ]
        );
        assert!(report.failed.iter().all(|r| !r.passed));
    }

    #[tokio::test]
    async fn test_verification_does_not_mutate_trees() {
        let (_temp, src, dst) = pair();
        std_fs::write(src.join("x"), b"source").unwrap();
        std_fs::write(dst.join("x"), b"target").unwrap();

        IntegrityVerifier::new()
            .verify_roots(&src, &dst, &PathEnumerator::default(), |_| {})
            .await
            .unwrap();

        assert_eq!(std_fs::read(src.join("x")).unwrap(), b"source");
        assert_eq!(std_fs::read(dst.join("x")).unwrap(), b"target");
    }
}
