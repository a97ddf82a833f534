use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::logging::LogManager;
use crate::orchestrator::{PipelineListener, TransferOrchestrator};
use crate::process_control::ProcessController;
use crate::transfer::{
    IntegrityVerifier, TransferEngine, TransferPlan, TransferProgress, TransferSummary, VerificationReport,
};
use crate::watcher::{ChangeNotifier, NotifyWatcher, CHANGE_CHANNEL_CAPACITY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartMonitoring,
    StopMonitoring,
    CancelTransfer,
    Reset,
    Shutdown,
}

/// Everything the worker reports back. The worker only ever sends.
#[derive(Debug)]
pub enum WorkerEvent {
    Progress(TransferProgress),
    TransferFinished(Result<TransferSummary, PipelineError>),
    VerificationTick(u32),
    VerificationFinished(Result<VerificationReport, PipelineError>),
}

#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl RuntimeHandle {
    /// Returns `false` once the event loop has exited.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn start_monitoring(&self) -> bool {
        self.send(Command::StartMonitoring)
    }

    pub fn stop_monitoring(&self) -> bool {
        self.send(Command::StopMonitoring)
    }

    pub fn cancel_transfer(&self) -> bool {
        self.send(Command::CancelTransfer)
    }

    pub fn reset(&self) -> bool {
        self.send(Command::Reset)
    }

    pub fn shutdown(&self) -> bool {
        self.send(Command::Shutdown)
    }
}

/// Single event loop around a [`TransferOrchestrator`] plus the one background
/// worker that copies and verifies.
pub struct PipelineRuntime<N: ChangeNotifier, P: ProcessController> {
    orchestrator: TransferOrchestrator<N, P>,
    changes: mpsc::Receiver<PathBuf>,
    commands: mpsc::UnboundedReceiver<Command>,
    engine: TransferEngine,
    verifier: IntegrityVerifier,
    check_interval: Duration,
    auto_reset: bool,
}

impl<P: ProcessController> PipelineRuntime<NotifyWatcher, P> {
    /// Runtime fed by a real `notify` watcher.
    pub fn with_notify(
        config: &AppConfig,
        process: P,
        listener: Arc<dyn PipelineListener>,
        activity: Arc<LogManager>,
    ) -> Result<(Self, RuntimeHandle), PipelineError> {
        let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
        let notifier = NotifyWatcher::new(tx)?;
        let orchestrator = TransferOrchestrator::new(config, notifier, process, listener, activity);
        Ok(Self::new(orchestrator, rx))
    }
}

impl<N: ChangeNotifier, P: ProcessController> PipelineRuntime<N, P> {
    pub fn new(orchestrator: TransferOrchestrator<N, P>, changes: mpsc::Receiver<PathBuf>) -> (Self, RuntimeHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let settings = orchestrator.settings();
        let runtime = Self {
            check_interval: settings.check_interval(),
            auto_reset: settings.auto_reset,
            orchestrator,
            changes,
            commands: rx,
            engine: TransferEngine::new(),
            verifier: IntegrityVerifier::new(),
        };
        (runtime, RuntimeHandle { commands: tx })
    }

    pub fn with_engine(mut self, engine: TransferEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    /// Runs until [`Command::Shutdown`] and hands the orchestrator back.
    pub async fn run(mut self) -> TransferOrchestrator<N, P> {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (worker_tx, mut worker_rx) = mpsc::unbounded_channel();
        let mut cancel: Option<CancellationToken> = None;
        let mut worker: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                biased;

                Some(command) = self.commands.recv() => {
                    log::debug!("Command {command:?} in {:?}", self.orchestrator.state());
                    match command {
                        Command::StartMonitoring => {
                            if let Err(e) = self.orchestrator.start_monitoring() {
                                self.orchestrator
                                    .activity()
                                    .error(&format!("Cannot start monitoring: {e}"), None);
                            }
                        }
                        Command::StopMonitoring => self.orchestrator.stop_monitoring(),
                        Command::CancelTransfer => {
                            if let Some(token) = &cancel {
                                log::info!("Cancellation requested");
                                token.cancel();
                            }
                        }
                        Command::Reset => self.reset(),
                        Command::Shutdown => break,
                    }
                }

                Some(path) = self.changes.recv() => {
                    self.orchestrator.on_change(&path, Instant::now());
                }

                Some(event) = worker_rx.recv() => {
                    self.handle_worker_event(event);
                    if self.orchestrator.state().is_terminal() {
                        cancel = None;
                        if self.auto_reset {
                            self.reset();
                        }
                    }
                }

                _ = ticker.tick() => {
                    if let Some(plan) = self.orchestrator.on_tick(Instant::now()) {
                        let token = CancellationToken::new();
                        worker = Some(spawn_worker(
                            self.engine,
                            self.verifier.clone(),
                            plan,
                            token.clone(),
                            worker_tx.clone(),
                        ));
                        cancel = Some(token);
                    } else if self.auto_reset && self.orchestrator.state().is_terminal() {
                        // Planning failed on this tick.
                        self.reset();
                    }
                }
            }
        }

        if let Some(token) = cancel {
            token.cancel();
        }
        if let Some(handle) = worker {
            if let Err(e) = handle.await {
                log::error!("Transfer worker panicked: {e}");
            }
        }
        self.orchestrator.shutdown();
        log::info!("Event loop stopped in {:?}", self.orchestrator.state());
        self.orchestrator
    }

    fn reset(&mut self) {
        if let Err(e) = self.orchestrator.reset() {
            self.orchestrator
                .activity()
                .error(&format!("Cannot resume monitoring: {e}"), None);
        }
    }

    fn handle_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Progress(progress) => self.orchestrator.on_progress(&progress),
            WorkerEvent::TransferFinished(result) => self.orchestrator.on_transfer_finished(result),
            WorkerEvent::VerificationTick(percent) => self.orchestrator.on_verification_tick(percent),
            WorkerEvent::VerificationFinished(result) => self.orchestrator.on_verification_finished(result),
        }
    }
}

fn spawn_worker(
    engine: TransferEngine,
    verifier: IntegrityVerifier,
    plan: TransferPlan,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<WorkerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // Send failures only mean the loop is gone; the work stops with it.
        let transferred = engine
            .transfer(
                &plan,
                |progress| {
                    let _ = events.send(WorkerEvent::Progress(progress));
                },
                &cancel,
            )
            .await;
        let copied = transferred.is_ok();
        let _ = events.send(WorkerEvent::TransferFinished(transferred));
        if !copied {
            return;
        }

        let report = verifier
            .verify(&plan, |percent| {
                let _ = events.send(WorkerEvent::VerificationTick(percent));
            })
            .await;
        let _ = events.send(WorkerEvent::VerificationFinished(report));
    })
}
