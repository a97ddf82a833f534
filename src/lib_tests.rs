#[cfg(test)]
mod integration_tests {
    use crate::config::{AppConfig, TransferDirection};
    use crate::error::PipelineError;
    use crate::logging::LogManager;
    use crate::orchestrator::{PipelineListener, PipelineState};
    use crate::process_control::NoopProcessController;
    use crate::runtime::PipelineRuntime;
    use crate::transfer::{IntegrityVerifier, PathEnumerator, TransferEngine};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;

    struct ChannelListener {
        states: mpsc::UnboundedSender<(PipelineState, Option<&'static str>)>,
    }

    impl PipelineListener for ChannelListener {
        fn on_state_changed(&self, state: PipelineState, error: Option<&PipelineError>) {
            let _ = self.states.send((state, error.map(PipelineError::code)));
        }
    }

    async fn wait_for(
        states: &mut mpsc::UnboundedReceiver<(PipelineState, Option<&'static str>)>,
        wanted: PipelineState,
    ) -> Option<&'static str> {
        timeout(Duration::from_secs(30), async {
            loop {
                let (state, code) = states.recv().await.expect("listener dropped");
                if state == wanted {
                    return code;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {wanted:?}"))
    }

    fn write_tree(root: &Path) {
        fs::create_dir_all(root.join("Content/Paks")).unwrap();
        fs::write(root.join("Content/Paks/pak0.bin"), vec![0x5au8; 3 * 1024 * 1024 + 17]).unwrap();
        fs::write(root.join("manifest.json"), br#"{"build": 42}"#).unwrap();
        fs::write(root.join("empty.txt"), b"").unwrap();
    }

    /// Builds a folder off to the side and renames it into `dest`, so the watcher
    /// sees it appear with its content already in place.
    fn drop_folder(staging: &Path, dest: &Path, fill: impl FnOnce(&Path)) {
        fs::create_dir_all(staging).unwrap();
        fill(staging);
        fs::rename(staging, dest).unwrap();
    }

    fn assert_same_file(a: &Path, b: &Path) {
        assert_eq!(fs::read(a).unwrap(), fs::read(b).unwrap(), "{a:?} != {b:?}");
    }

    async fn run_pipeline(direction: TransferDirection, fill: impl FnOnce(&Path)) -> (TempDir, PathBuf, PathBuf) {
        let temp = TempDir::new().unwrap();
        let watched = temp.path().join("watched");
        let stash = temp.path().join("stash");
        fs::create_dir_all(&watched).unwrap();
        fs::create_dir_all(stash.join("GameA")).unwrap();
        if direction == TransferDirection::DestinationToWatched {
            write_tree(&stash.join("GameA"));
        }

        let mut config = AppConfig::new(watched.clone(), stash.clone());
        config.pipeline.debounce_secs = 1;
        config.pipeline.auto_reset = false;
        config.pipeline.direction = direction;

        let (tx, mut states) = mpsc::unbounded_channel();
        let (runtime, handle) = PipelineRuntime::with_notify(
            &config,
            NoopProcessController,
            Arc::new(ChannelListener { states: tx }),
            Arc::new(LogManager::new(100)),
        )
        .unwrap();
        let task = tokio::spawn(runtime.with_check_interval(Duration::from_millis(100)).run());

        handle.start_monitoring();
        wait_for(&mut states, PipelineState::Watching).await;

        drop_folder(&temp.path().join("staging/GameA"), &watched.join("GameA"), fill);

        wait_for(&mut states, PipelineState::Transferring).await;
        assert_eq!(wait_for(&mut states, PipelineState::Done).await, None);

        handle.shutdown();
        let orchestrator = task.await.unwrap();
        assert!(orchestrator.last_report().unwrap().is_clean());
        assert_eq!(orchestrator.active_pair().unwrap().name, "GameA");

        (temp, watched, stash)
    }

    #[tokio::test]
    async fn test_new_folder_is_copied_after_it_settles() {
        let (_temp, watched, stash) = run_pipeline(TransferDirection::WatchedToDestination, write_tree).await;

        for rel in ["Content/Paks/pak0.bin", "manifest.json", "empty.txt"] {
            assert_same_file(&watched.join("GameA").join(rel), &stash.join("GameA").join(rel));
        }
    }

    #[tokio::test]
    async fn test_new_folder_is_seeded_from_destination() {
        let (_temp, watched, stash) = run_pipeline(TransferDirection::DestinationToWatched, |dir| {
            fs::write(dir.join(".placeholder"), b"").unwrap();
            fs::write(dir.join("manifest.json"), b"stale").unwrap();
        })
        .await;

        assert_same_file(&stash.join("GameA/Content/Paks/pak0.bin"), &watched.join("GameA/Content/Paks/pak0.bin"));
        assert_eq!(fs::read(watched.join("GameA/manifest.json")).unwrap(), br#"{"build": 42}"#);
        // Unplanned entries in the target are left alone.
        assert!(watched.join("GameA/.placeholder").exists());
    }

    #[tokio::test]
    async fn test_hidden_entries_are_skipped_end_to_end() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        write_tree(&src);
        fs::create_dir_all(src.join(".cache")).unwrap();
        fs::write(src.join(".cache/blob"), b"cached").unwrap();
        fs::write(src.join("Content/.DS_Store"), b"meta").unwrap();

        let enumerator = PathEnumerator::default();
        let plan = enumerator.plan(&src, &dst).unwrap();
        assert_eq!(plan.total_files, 3);

        TransferEngine::new()
            .transfer(&plan, |_| {}, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!dst.join(".cache").exists());
        assert!(!dst.join("Content/.DS_Store").exists());

        let report = IntegrityVerifier::new()
            .verify_roots(&src, &dst, &enumerator, |_| {})
            .await
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.total, 3);
    }

    #[tokio::test]
    async fn test_repeated_transfer_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        write_tree(&src);

        let plan = PathEnumerator::default().plan(&src, &dst).unwrap();
        let engine = TransferEngine::new();
        let cancel = CancellationToken::new();
        let first = engine.transfer(&plan, |_| {}, &cancel).await.unwrap();
        let second = engine.transfer(&plan, |_| {}, &cancel).await.unwrap();
        assert_eq!(first.bytes_copied, second.bytes_copied);
        assert_eq!(second.files_copied, 3);

        let report = IntegrityVerifier::new().verify(&plan, |_| {}).await.unwrap();
        assert!(report.is_clean());
        assert_same_file(&src.join("Content/Paks/pak0.bin"), &dst.join("Content/Paks/pak0.bin"));
    }

    #[test]
    fn test_get_app_version() {
        let version = crate::get_app_version();
        assert!(version.contains('.'));
        let major: u32 = version.split('.').next().unwrap().parse().unwrap_or(0);
        assert!(major < 100);
    }
}
