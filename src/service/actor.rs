use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::{Phase, RescanOutcome};
use crate::observability::Metrics;
use crate::registry::{
    AppRef, DefaultMutator, DefaultResolver, RegistryError, Result, Scanner, Snapshot, TypeKey,
};

/// Requests from [`RegistryHandle`](super::RegistryHandle).
pub(crate) enum Command {
    Rescan {
        reply: oneshot::Sender<RescanOutcome>,
    },
    SetDefault {
        app: String,
        key: TypeKey,
        reply: oneshot::Sender<Result<AppRef>>,
    },
    RefreshDefault {
        key: TypeKey,
        reply: oneshot::Sender<Result<Option<AppRef>>>,
    },
}

/// Results of work the actor handed off to background tasks.
enum Internal {
    ScanFinished(Option<Snapshot>),
    Commit {
        key: TypeKey,
        app: AppRef,
        reply: oneshot::Sender<Result<AppRef>>,
    },
    Refreshed {
        key: TypeKey,
        app: Option<AppRef>,
        reply: oneshot::Sender<Result<Option<AppRef>>>,
    },
}

/// Sole writer of the published snapshot.
///
/// Scans and OS calls run in spawned tasks; their results come back over the
/// internal channel and are applied here one at a time.
pub(crate) struct RegistryActor {
    scanner: Scanner,
    resolver: DefaultResolver,
    mutator: DefaultMutator,
    metrics: Arc<Metrics>,
    snapshot: watch::Sender<Arc<Snapshot>>,
    phase: watch::Sender<Phase>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    rescan_pending: bool,
    /// Defaults written while a scan was running, replayed onto its result.
    late_commits: Vec<(TypeKey, AppRef)>,
    generation: u64,
}

impl RegistryActor {
    pub(crate) fn new(
        scanner: Scanner,
        resolver: DefaultResolver,
        mutator: DefaultMutator,
        metrics: Arc<Metrics>,
        snapshot: watch::Sender<Arc<Snapshot>>,
        phase: watch::Sender<Phase>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            scanner,
            resolver,
            mutator,
            metrics,
            snapshot,
            phase,
            internal_tx,
            internal_rx,
            rescan_pending: false,
            late_commits: Vec::new(),
            generation: 0,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        debug!("Registry service started");
        loop {
            tokio::select! {
                biased;
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal),
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }
        debug!("Registry service stopped");
    }

    fn scanning(&self) -> bool {
        *self.phase.borrow() == Phase::Scanning
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Rescan { reply } => {
                let outcome = if self.scanning() {
                    self.rescan_pending = true;
                    self.metrics.rescan_coalesced();
                    RescanOutcome::Coalesced
                } else {
                    self.start_scan();
                    RescanOutcome::Started
                };
                let _ = reply.send(outcome);
            }
            Command::SetDefault { app, key, reply } => {
                if self.scanning() {
                    let _ = reply.send(Err(RegistryError::ScanInProgress));
                    return;
                }
                self.spawn_assignment(app, key, reply);
            }
            Command::RefreshDefault { key, reply } => {
                if self.scanning() {
                    let _ = reply.send(Err(RegistryError::ScanInProgress));
                    return;
                }
                self.spawn_refresh(key, reply);
            }
        }
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::ScanFinished(result) => self.finish_scan(result),
            Internal::Commit { key, app, reply } => {
                self.apply_default(&key, Some(app.clone()));
                if self.scanning() {
                    self.late_commits.push((key, app.clone()));
                }
                self.metrics.default_changed();
                let _ = reply.send(Ok(app));
            }
            Internal::Refreshed { key, app, reply } => {
                self.apply_default(&key, app.clone());
                let _ = reply.send(Ok(app));
            }
        }
    }

    fn apply_default(&self, key: &TypeKey, app: Option<AppRef>) {
        self.snapshot.send_if_modified(|current| Arc::make_mut(current).set_default(key, app));
    }

    fn start_scan(&mut self) {
        self.phase.send_replace(Phase::Scanning);
        self.metrics.scan_started();

        let scanner = self.scanner.clone();
        let resolver = self.resolver.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let built = match tokio::task::spawn_blocking(move || scanner.build()).await {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    error!(error = %e, "Scan task failed, keeping the previous snapshot");
                    None
                }
            };
            let annotated = match built {
                Some(mut snapshot) => {
                    resolver.annotate(&mut snapshot).await;
                    Some(snapshot)
                }
                None => None,
            };
            let _ = internal.send(Internal::ScanFinished(annotated));
        });
    }

    fn finish_scan(&mut self, result: Option<Snapshot>) {
        let late_commits = std::mem::take(&mut self.late_commits);
        if let Some(mut snapshot) = result {
            for (key, app) in late_commits {
                snapshot.set_default(&key, Some(app));
            }
            self.generation += 1;
            snapshot.generation = self.generation;
            info!(
                generation = self.generation,
                applications = snapshot.applications().len(),
                types = snapshot.len(),
                "Snapshot published"
            );
            self.snapshot.send_replace(Arc::new(snapshot));
            self.metrics.scan_completed();
        }

        if std::mem::take(&mut self.rescan_pending) {
            debug!("Starting queued rescan");
            self.start_scan();
        } else {
            self.phase.send_replace(Phase::Idle);
        }
    }

    fn spawn_assignment(&self, app: String, key: TypeKey, reply: oneshot::Sender<Result<AppRef>>) {
        let snapshot = self.snapshot.borrow().clone();
        let resolver = self.resolver.clone();
        let mutator = self.mutator.clone();
        let metrics = self.metrics.clone();
        let internal = self.internal_tx.clone();

        tokio::spawn(async move {
            let result = async {
                let record = resolver
                    .application(&app, &snapshot)
                    .await
                    .ok_or_else(|| RegistryError::UnknownApplication(app.clone()))?;
                mutator.set_default(&record.identifier, &key).await?;
                Ok::<_, RegistryError>(record)
            }
            .await;

            match result {
                Ok(record) => {
                    let _ = internal.send(Internal::Commit {
                        key,
                        app: record,
                        reply,
                    });
                }
                Err(e) => {
                    warn!(%key, %app, error = %e, "Default handler not changed");
                    if matches!(e, RegistryError::AssignmentFailure { .. }) {
                        metrics.assignment_failed();
                    }
                    let _ = reply.send(Err(e));
                }
            }
        });
    }

    fn spawn_refresh(&self, key: TypeKey, reply: oneshot::Sender<Result<Option<AppRef>>>) {
        let snapshot = self.snapshot.borrow().clone();
        let resolver = self.resolver.clone();
        let internal = self.internal_tx.clone();

        tokio::spawn(async move {
            let app = resolver.resolve_default(&key, &snapshot).await;
            let _ = internal.send(Internal::Refreshed { key, app, reply });
        });
    }
}
