use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{AppConfig, PipelineSettings, TransferDirection};
use crate::error::PipelineError;
use crate::logging::LogManager;
use crate::path_validation::validate_roots;
use crate::process_control::ProcessController;
use crate::transfer::{PathEnumerator, TransferPlan, TransferProgress, TransferSummary, VerificationReport};
use crate::watcher::{ChangeNotifier, StabilityDetector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Watching,
    PendingStability,
    Transferring,
    Verifying,
    Done,
    Failed,
}

impl PipelineState {
    /// States in which raw change notifications are consumed.
    pub fn accepts_changes(self) -> bool {
        matches!(self, Self::Watching | Self::PendingStability)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Receives everything the presentation layer renders. Calls happen on the
/// event-loop thread and must not block.
pub trait PipelineListener: Send + Sync {
    fn on_progress(&self, _progress: &TransferProgress) {}
    fn on_verification(&self, _percent: u32) {}
    fn on_state_changed(&self, _state: PipelineState, _error: Option<&PipelineError>) {}
}

pub struct NullListener;

impl PipelineListener for NullListener {}

/// A new watched folder and the same-named folder under the destination root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderPair {
    pub name: String,
    pub watched: PathBuf,
    pub destination: PathBuf,
}

impl FolderPair {
    /// `(source, destination)` of the copy for the given direction.
    pub fn endpoints(&self, direction: TransferDirection) -> (&Path, &Path) {
        match direction {
            TransferDirection::WatchedToDestination => (&self.watched, &self.destination),
            TransferDirection::DestinationToWatched => (&self.destination, &self.watched),
        }
    }
}

/// Owns every pipeline state transition. It never blocks and never spawns:
/// the event loop feeds it inputs and runs the plans it hands back.
pub struct TransferOrchestrator<N: ChangeNotifier, P: ProcessController> {
    settings: PipelineSettings,
    watched_root: PathBuf,
    destination_root: PathBuf,
    enumerator: PathEnumerator,
    state: PipelineState,
    detector: StabilityDetector,
    notifier: N,
    process: P,
    process_stopped: bool,
    new_children: Vec<String>,
    /// Qualifying folders that showed up while another one was pending.
    deferred: Vec<String>,
    active_pair: Option<FolderPair>,
    last_error: Option<PipelineError>,
    last_report: Option<VerificationReport>,
    listener: Arc<dyn PipelineListener>,
    activity: Arc<LogManager>,
}

impl<N: ChangeNotifier, P: ProcessController> TransferOrchestrator<N, P> {
    pub fn new(
        config: &AppConfig,
        notifier: N,
        process: P,
        listener: Arc<dyn PipelineListener>,
        activity: Arc<LogManager>,
    ) -> Self {
        let settings = config.pipeline.clone();
        Self {
            enumerator: settings.enumerator(),
            detector: StabilityDetector::new(config.source_root.clone(), settings.debounce()),
            settings,
            watched_root: config.source_root.clone(),
            destination_root: config.destination_root.clone(),
            state: PipelineState::Idle,
            notifier,
            process,
            process_stopped: false,
            new_children: Vec::new(),
            deferred: Vec::new(),
            active_pair: None,
            last_error: None,
            last_report: None,
            listener,
            activity,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn last_error(&self) -> Option<&PipelineError> {
        self.last_error.as_ref()
    }

    pub fn last_report(&self) -> Option<&VerificationReport> {
        self.last_report.as_ref()
    }

    pub fn active_pair(&self) -> Option<&FolderPair> {
        self.active_pair.as_ref()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn detector(&self) -> &StabilityDetector {
        &self.detector
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn activity(&self) -> &Arc<LogManager> {
        &self.activity
    }

    fn subtree(&self) -> Option<&str> {
        self.active_pair.as_ref().map(|p| p.name.as_str())
    }

    fn set_state(&mut self, state: PipelineState) {
        if self.state == state {
            return;
        }
        self.activity
            .info(&format!("{:?} -> {:?}", self.state, state), self.subtree());
        self.state = state;
        self.listener.on_state_changed(state, None);
    }

    fn fail(&mut self, err: PipelineError) {
        self.activity.error(
            &format!("{:?} -> Failed: {err}", self.state),
            self.subtree(),
        );
        self.state = PipelineState::Failed;
        self.listener.on_state_changed(PipelineState::Failed, Some(&err));
        self.last_error = Some(err);
    }

    /// `Idle → Watching`. Records the current child folders as the baseline.
    /// Folders deferred during the previous run are re-evaluated right away.
    pub fn start_monitoring(&mut self) -> Result<(), PipelineError> {
        if self.state != PipelineState::Idle {
            log::debug!("start_monitoring ignored in {:?}", self.state);
            return Ok(());
        }

        validate_roots(&self.watched_root, &self.destination_root)?;
        self.detector
            .begin()
            .map_err(|e| PipelineError::from_io(&self.watched_root, e))?;
        self.notifier.watch(&self.watched_root)?;
        self.new_children.clear();

        self.set_state(PipelineState::Watching);
        self.resume_deferred();
        Ok(())
    }

    fn resume_deferred(&mut self) {
        for name in std::mem::take(&mut self.deferred) {
            let child = self.watched_root.join(&name);
            if !child.is_dir() {
                continue;
            }
            if let Err(e) = self.notifier.watch(&child) {
                log::warn!("Cannot watch {}: {e}", child.display());
            }
            self.new_children.push(name);
        }

        if let Some(pair) = self.find_candidate() {
            self.activate(pair, Instant::now());
            self.defer_new_candidates();
        }
    }

    /// Back to `Idle` from `Watching`/`PendingStability`. A running transfer is
    /// only stopped through cancellation.
    pub fn stop_monitoring(&mut self) {
        if !self.state.accepts_changes() {
            log::debug!("stop_monitoring ignored in {:?}", self.state);
            return;
        }
        self.notifier.unwatch_all();
        self.detector.reset();
        self.new_children.clear();
        self.deferred.clear();
        self.active_pair = None;
        self.set_state(PipelineState::Idle);
    }

    /// Ingests one raw notification.
    pub fn on_change(&mut self, path: &Path, now: Instant) {
        if !self.state.accepts_changes() {
            log::trace!("Ignoring change to {} in {:?}", path.display(), self.state);
            return;
        }

        self.detector.record_change(path, now);

        match self.detector.discover_new_children() {
            Ok(delta) => {
                for name in delta {
                    let child = self.watched_root.join(&name);
                    if let Err(e) = self.notifier.watch(&child) {
                        log::warn!("Cannot watch {}: {e}", child.display());
                    }
                    self.new_children.push(name);
                }
            }
            Err(e) => {
                self.activity.warn(
                    &format!("Cannot list {}: {e}", self.watched_root.display()),
                    None,
                );
                return;
            }
        }

        match self.state {
            PipelineState::Watching => {
                if let Some(pair) = self.find_candidate() {
                    self.activate(pair, now);
                }
            }
            PipelineState::PendingStability => self.defer_new_candidates(),
            _ => {}
        }
    }

    fn activate(&mut self, pair: FolderPair, now: Instant) {
        self.activity.info(
            &format!(
                "New folder {} pairs with {}",
                pair.watched.display(),
                pair.destination.display()
            ),
            Some(&pair.name),
        );
        self.active_pair = Some(pair);
        self.detector.arm(now);
        self.set_state(PipelineState::PendingStability);
    }

    /// Queues every other qualifying folder behind the pending one.
    fn defer_new_candidates(&mut self) {
        let active = self.active_pair.as_ref().map(|p| p.name.clone());
        let waiting: Vec<FolderPair> = self
            .new_children
            .iter()
            .filter(|name| Some(*name) != active.as_ref() && !self.deferred.contains(name))
            .filter_map(|name| self.qualify(name))
            .collect();

        for pair in waiting {
            self.activity.warn(
                &format!(
                    "{} is queued until {} has been transferred",
                    pair.watched.display(),
                    active.as_deref().unwrap_or("the pending folder")
                ),
                Some(&pair.name),
            );
            self.deferred.push(pair.name);
        }
    }

    /// Most recently discovered child that qualifies.
    fn find_candidate(&self) -> Option<FolderPair> {
        self.new_children.iter().rev().find_map(|name| self.qualify(name))
    }

    /// A child qualifies when it is not hidden, has a same-named destination
    /// folder and already holds at least one file.
    fn qualify(&self, name: &str) -> Option<FolderPair> {
        if self.enumerator.is_hidden(name) {
            return None;
        }
        let watched = self.watched_root.join(name);
        let destination = self.destination_root.join(name);
        let paired = watched.is_dir() && destination.is_dir() && self.enumerator.contains_file(&watched);
        paired.then(|| FolderPair {
            name: name.to_string(),
            watched,
            destination,
        })
    }

    /// Names waiting for the next monitoring session.
    pub fn deferred(&self) -> &[String] {
        &self.deferred
    }

    /// Periodic stability check. Returns the plan to hand to the worker when the
    /// pending folder has settled.
    pub fn on_tick(&mut self, now: Instant) -> Option<TransferPlan> {
        if self.state != PipelineState::PendingStability || !self.detector.poll(now) {
            return None;
        }
        let pair = self.active_pair.clone()?;

        self.last_error = None;
        self.last_report = None;
        self.set_state(PipelineState::Transferring);

        // Our own writes must not re-trigger the detector.
        self.notifier.unwatch_all();

        if !self.process_stopped {
            match self.process.stop_conflicting_process() {
                Ok(()) => self.activity.info("Stopped conflicting process", Some(&pair.name)),
                Err(e) => self
                    .activity
                    .warn(&format!("Could not stop conflicting process: {e:#}"), Some(&pair.name)),
            }
            self.process_stopped = true;
        }

        let (source, destination) = pair.endpoints(self.settings.direction);
        match self.enumerator.plan(source, destination) {
            Ok(plan) => Some(plan),
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    pub fn on_progress(&self, progress: &TransferProgress) {
        if self.state == PipelineState::Transferring {
            self.listener.on_progress(progress);
        }
    }

    pub fn on_transfer_finished(&mut self, result: Result<TransferSummary, PipelineError>) {
        if self.state != PipelineState::Transferring {
            return;
        }
        match result {
            Ok(summary) => {
                self.activity.info(
                    &format!(
                        "Copied {} files ({} bytes) in {:.1}s",
                        summary.files_copied,
                        summary.bytes_copied,
                        summary.elapsed.as_secs_f64()
                    ),
                    self.subtree(),
                );
                self.set_state(PipelineState::Verifying);
            }
            Err(e) => self.fail(e),
        }
    }

    pub fn on_verification_tick(&self, percent: u32) {
        if self.state == PipelineState::Verifying {
            self.listener.on_verification(percent);
        }
    }

    pub fn on_verification_finished(&mut self, result: Result<VerificationReport, PipelineError>) {
        if self.state != PipelineState::Verifying {
            return;
        }
        let report = match result {
            Ok(report) => report,
            Err(e) => return self.fail(e),
        };

        for failure in &report.failed {
            self.activity.warn(
                &format!(
                    "Integrity check failed for {}: {:?}",
                    failure.relative_path.display(),
                    failure.reason
                ),
                self.subtree(),
            );
        }

        let mismatch = (!report.is_clean()).then(|| PipelineError::VerificationFailed {
            failed: report.failed_count(),
            total: report.total,
        });
        self.last_report = Some(report);

        match mismatch {
            Some(err) if self.settings.fail_on_verification_mismatch => self.fail(err),
            _ => self.set_state(PipelineState::Done),
        }
    }

    /// `Done/Failed → Idle`: resumes the conflicting process and, unless
    /// configured otherwise, goes straight back to watching.
    pub fn reset(&mut self) -> Result<(), PipelineError> {
        if !self.state.is_terminal() {
            log::debug!("reset ignored in {:?}", self.state);
            return Ok(());
        }

        self.resume_process();
        self.detector.reset();
        self.new_children.clear();
        self.set_state(PipelineState::Idle);
        self.active_pair = None;

        if self.settings.resume_watching_after_reset {
            self.start_monitoring()?;
        }
        Ok(())
    }

    /// Releases every watch and resumes the conflicting process. The state is
    /// left as is so callers can still inspect the outcome.
    pub fn shutdown(&mut self) {
        self.notifier.unwatch_all();
        self.resume_process();
    }

    fn resume_process(&mut self) {
        if !self.process_stopped {
            return;
        }
        match self.process.resume_conflicting_process() {
            Ok(()) => self.activity.info("Resumed conflicting process", self.subtree()),
            Err(e) => self
                .activity
                .warn(&format!("Could not resume conflicting process: {e:#}"), self.subtree()),
        }
        self.process_stopped = false;
    }
}
