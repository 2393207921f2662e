//! Observable state holder.
//!
//! One actor task owns the published [`Snapshot`]. Readers get cheap
//! `Arc<Snapshot>` clones from a `watch` channel and never see a partially
//! built registry: a finished scan replaces the whole value, and a changed
//! default is applied copy-on-write.
//!
//! While a scan runs, default-changing requests are refused with
//! [`RegistryError::ScanInProgress`], and further rescan requests collapse
//! into a single follow-up scan.

mod actor;

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

use crate::observability::Metrics;
use crate::os::SystemServices;
use crate::registry::{
    AppRef, CanonicalType, DefaultMutator, DefaultResolver, RegistryError, Result, ScanSettings,
    Scanner, Snapshot, TypeKey,
};
use actor::{Command, RegistryActor};

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    Scanning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanOutcome {
    Started,
    /// A scan was already running; one more will follow it.
    Coalesced,
}

/// Cloneable front end to the registry service.
#[derive(Clone)]
pub struct RegistryHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Arc<Snapshot>>,
    phase: watch::Receiver<Phase>,
    resolver: DefaultResolver,
    mutator: DefaultMutator,
    metrics: Arc<Metrics>,
}

impl RegistryHandle {
    /// Start the service on the current runtime with an empty snapshot.
    pub fn spawn(services: SystemServices, settings: ScanSettings) -> Self {
        let scanner = Scanner::new(&services, settings);
        let resolver = DefaultResolver::new(&services);
        let mutator = DefaultMutator::new(&services);
        let metrics = Arc::new(Metrics::new());

        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(Snapshot::empty()));
        let (phase_tx, phase_rx) = watch::channel(Phase::Idle);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);

        let actor = RegistryActor::new(
            scanner,
            resolver.clone(),
            mutator.clone(),
            metrics.clone(),
            snapshot_tx,
            phase_tx,
        );
        tokio::spawn(actor.run(command_rx));

        Self {
            commands: command_tx,
            snapshot: snapshot_rx,
            phase: phase_rx,
            resolver,
            mutator,
            metrics,
        }
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.borrow().clone()
    }

    /// Change notifications for the published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot.clone()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| RegistryError::ServiceStopped)?;
        response.await.map_err(|_| RegistryError::ServiceStopped)
    }

    pub async fn rescan(&self) -> Result<RescanOutcome> {
        self.request(|reply| Command::Rescan { reply }).await
    }

    /// Wait until no scan is running or queued, then return the snapshot.
    pub async fn wait_idle(&self) -> Result<Arc<Snapshot>> {
        let mut phase = self.phase.clone();
        phase
            .wait_for(|phase| *phase == Phase::Idle)
            .await
            .map_err(|_| RegistryError::ServiceStopped)?;
        Ok(self.snapshot())
    }

    /// Rescan and wait for the result.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>> {
        self.rescan().await?;
        self.wait_idle().await
    }

    /// Make `app` the default for `key`. The application does not have to be
    /// a listed supporter; the OS decides.
    pub async fn set_default(&self, app: &str, key: &TypeKey) -> Result<AppRef> {
        self.request(|reply| Command::SetDefault {
            app: app.to_string(),
            key: key.clone(),
            reply,
        })
        .await?
    }

    /// [`set_default`](Self::set_default) for every type `app` supports.
    /// Failures are reported per type and do not stop the batch.
    pub async fn set_default_for_all(&self, app: &str) -> Result<Vec<(TypeKey, Result<AppRef>)>> {
        let snapshot = self.snapshot();
        let keys: Vec<TypeKey> = snapshot
            .types_for_application(app)
            .into_iter()
            .map(|ty| ty.key.clone())
            .collect();
        if keys.is_empty() && snapshot.known_application(app).is_none() {
            return Err(RegistryError::UnknownApplication(app.to_string()));
        }

        let mut outcomes = Vec::with_capacity(keys.len());
        for key in keys {
            let outcome = self.set_default(app, &key).await;
            if matches!(outcome, Err(RegistryError::ServiceStopped)) {
                return Err(RegistryError::ServiceStopped);
            }
            outcomes.push((key, outcome));
        }
        Ok(outcomes)
    }

    /// Re-query the OS for one key and update the snapshot in place.
    pub async fn refresh_default(&self, key: &TypeKey) -> Result<Option<AppRef>> {
        self.request(|reply| Command::RefreshDefault {
            key: key.clone(),
            reply,
        })
        .await?
    }

    /// Registry entry for a file, resolved against the current snapshot.
    pub async fn resolve_ad_hoc(&self, path: &Path) -> Option<CanonicalType> {
        let snapshot = self.snapshot();
        self.resolver.resolve_ad_hoc(path, &snapshot).await
    }

    /// Always [`RegistryError::Unsupported`].
    pub fn clear_default(&self, key: &TypeKey) -> Result<()> {
        self.mutator.clear_default(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::manifest::{BundleManifest, DocumentTypeDeclaration};
    use crate::os::{
        self, AssignmentApi, BundleReader, DirectoryLister, HandlerDatabase, HandlerTarget,
        MemoryHandlerDatabase,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::mpsc as std_mpsc;
    use tokio::sync::{Notify, Semaphore};

    /// Lists one bundle, but only after a token arrives.
    struct GatedDisk {
        tokens: Mutex<std_mpsc::Receiver<()>>,
    }

    impl DirectoryLister for GatedDisk {
        fn list(&self, _dir: &Path) -> os::Result<Vec<PathBuf>> {
            let _ = self.tokens.lock().unwrap().recv();
            Ok(vec![PathBuf::from("/Applications/Editor.app")])
        }
    }

    impl BundleReader for GatedDisk {
        fn read(&self, _bundle: &Path) -> os::Result<Option<BundleManifest>> {
            Ok(Some(BundleManifest {
                identifier: Some("com.example.editor".to_string()),
                name: Some("Editor".to_string()),
                icon: None,
                document_types: vec![DocumentTypeDeclaration {
                    content_types: vec!["com.example.text".to_string()],
                    ..Default::default()
                }],
                url_types: Vec::new(),
            }))
        }
    }

    struct Harness {
        handle: RegistryHandle,
        handlers: Arc<MemoryHandlerDatabase>,
        gate: std_mpsc::Sender<()>,
    }

    /// Content-type assignments wait for a permit before reaching the
    /// database. Batch lookups see no defaults, as if they ran before any
    /// pending write.
    struct GatedHandlers {
        inner: Arc<MemoryHandlerDatabase>,
        entered: Notify,
        release: Semaphore,
    }

    #[async_trait]
    impl HandlerDatabase for GatedHandlers {
        async fn default_handler(&self, target: &HandlerTarget) -> os::Result<Option<String>> {
            self.inner.default_handler(target).await
        }

        async fn default_handlers(&self, _targets: &[HandlerTarget]) -> os::Result<HashMap<HandlerTarget, String>> {
            Ok(HashMap::new())
        }

        async fn role_handlers(&self, content_type: &str) -> os::Result<Vec<String>> {
            self.inner.role_handlers(content_type).await
        }

        async fn application_path(&self, identifier: &str) -> os::Result<Option<PathBuf>> {
            self.inner.application_path(identifier).await
        }

        fn supports_modern_assignment(&self) -> bool {
            self.inner.supports_modern_assignment()
        }

        async fn assign_content_type(&self, identifier: &str, content_type: &str, api: AssignmentApi) -> os::Result<()> {
            self.entered.notify_one();
            let _permit = self.release.acquire().await;
            self.inner.assign_content_type(identifier, content_type, api).await
        }

        async fn assign_url_scheme(&self, identifier: &str, scheme: &str) -> os::Result<()> {
            self.inner.assign_url_scheme(identifier, scheme).await
        }
    }

    fn harness() -> Harness {
        let handlers = Arc::new(MemoryHandlerDatabase::new());
        harness_over(handlers.clone(), handlers)
    }

    fn harness_over(handlers: Arc<MemoryHandlerDatabase>, database: Arc<dyn HandlerDatabase>) -> Harness {
        let (gate, tokens) = std_mpsc::channel();
        let disk = Arc::new(GatedDisk {
            tokens: Mutex::new(tokens),
        });
        let base = SystemServices::in_memory(&BackendConfig::default());
        let services = SystemServices {
            lister: disk.clone(),
            bundles: disk,
            handlers: database,
            ..base
        };
        let settings = ScanSettings {
            directories: vec![PathBuf::from("/Applications")],
            package_extension: "app".to_string(),
            extra_rejected_types: Vec::new(),
        };
        Harness {
            handle: RegistryHandle::spawn(services, settings),
            handlers,
            gate,
        }
    }

    fn text() -> TypeKey {
        TypeKey::content("com.example.text")
    }

    #[tokio::test]
    async fn test_starts_empty_and_idle() {
        let h = harness();
        assert!(h.handle.snapshot().is_empty());
        assert_eq!(h.handle.snapshot().generation, 0);
        assert_eq!(h.handle.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_rescan_publishes_annotated_snapshot() {
        let h = harness();
        h.handlers.seed_default("com.example.text", "com.example.editor");
        h.gate.send(()).unwrap();

        let snapshot = h.handle.refresh().await.unwrap();
        assert_eq!(snapshot.generation, 1);
        assert!(snapshot.get(&text()).unwrap().is_default("com.example.editor"));
        assert_eq!(h.handle.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_rescans_coalesce_while_scanning() {
        let h = harness();
        let mut updates = h.handle.subscribe();

        assert_eq!(h.handle.rescan().await.unwrap(), RescanOutcome::Started);
        assert_eq!(h.handle.phase(), Phase::Scanning);
        assert_eq!(h.handle.rescan().await.unwrap(), RescanOutcome::Coalesced);
        assert_eq!(h.handle.rescan().await.unwrap(), RescanOutcome::Coalesced);

        // nothing is visible until the scan completes
        assert!(h.handle.snapshot().is_empty());
        assert!(!updates.has_changed().unwrap());

        h.gate.send(()).unwrap();
        h.gate.send(()).unwrap();
        let snapshot = h.handle.wait_idle().await.unwrap();

        assert_eq!(snapshot.generation, 2);
        let metrics = h.handle.metrics().snapshot();
        assert_eq!(metrics.scans_started, 2);
        assert_eq!(metrics.scans_completed, 2);
        assert_eq!(metrics.rescans_coalesced, 2);
        assert!(updates.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_set_default_rejected_while_scanning() {
        let h = harness();
        h.handle.rescan().await.unwrap();

        let err = h.handle.set_default("com.example.editor", &text()).await.unwrap_err();
        assert!(matches!(err, RegistryError::ScanInProgress));
        assert!(h.handlers.assignments().is_empty());

        h.gate.send(()).unwrap();
        h.handle.wait_idle().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_default_updates_snapshot() {
        let h = harness();
        h.gate.send(()).unwrap();
        let before = h.handle.refresh().await.unwrap();
        assert!(before.get(&text()).unwrap().default_app.is_none());

        let app = h.handle.set_default("com.example.editor", &text()).await.unwrap();
        assert_eq!(app.identifier, "com.example.editor");

        let after = h.handle.snapshot();
        assert!(after.get(&text()).unwrap().is_default("com.example.editor"));
        // readers holding the old snapshot keep a consistent view
        assert!(before.get(&text()).unwrap().default_app.is_none());
        assert_eq!(h.handle.metrics().snapshot().defaults_changed, 1);
    }

    #[tokio::test]
    async fn test_commit_during_scan_carries_into_next_snapshot() {
        let memory = Arc::new(MemoryHandlerDatabase::new());
        let gated = Arc::new(GatedHandlers {
            inner: memory.clone(),
            entered: Notify::new(),
            release: Semaphore::new(0),
        });
        let h = harness_over(memory, gated.clone());
        h.gate.send(()).unwrap();
        assert_eq!(h.handle.refresh().await.unwrap().generation, 1);

        let handle = h.handle.clone();
        let assignment = tokio::spawn(async move { handle.set_default("com.example.editor", &text()).await });
        gated.entered.notified().await;

        // the write is in flight when the scan starts
        assert_eq!(h.handle.rescan().await.unwrap(), RescanOutcome::Started);
        gated.release.add_permits(1);
        let app = assignment.await.unwrap().unwrap();
        assert_eq!(app.identifier, "com.example.editor");
        assert_eq!(h.handle.phase(), Phase::Scanning);

        h.gate.send(()).unwrap();
        let snapshot = h.handle.wait_idle().await.unwrap();
        assert_eq!(snapshot.generation, 2);
        assert!(snapshot.get(&text()).unwrap().is_default("com.example.editor"));
        assert_eq!(snapshot.stats.defaults_resolved, 0);
    }

    #[tokio::test]
    async fn test_failed_assignment_leaves_snapshot() {
        let h = harness();
        h.handlers.seed_default("com.example.text", "com.example.editor");
        h.handlers
            .reject_assignments(HandlerTarget::ContentType("com.example.text".to_string()));
        let other = tempfile::TempDir::new().unwrap();
        h.handlers.register_application("com.example.other", other.path().join("Other.app"));
        h.gate.send(()).unwrap();
        h.handle.refresh().await.unwrap();

        let err = h.handle.set_default("com.example.other", &text()).await.unwrap_err();
        assert!(matches!(err, RegistryError::AssignmentFailure { .. }));
        assert!(
            h.handle
                .snapshot()
                .get(&text())
                .unwrap()
                .is_default("com.example.editor")
        );
        assert_eq!(h.handle.metrics().snapshot().assignments_failed, 1);
    }

    #[tokio::test]
    async fn test_unknown_application() {
        let h = harness();
        let err = h.handle.set_default("com.example.ghost", &text()).await.unwrap_err();
        assert!(matches!(err, RegistryError::UnknownApplication(_)));
    }

    #[tokio::test]
    async fn test_refresh_default_picks_up_external_change() {
        let h = harness();
        h.gate.send(()).unwrap();
        h.handle.refresh().await.unwrap();

        h.handlers.seed_default("com.example.text", "com.example.editor");
        let app = h.handle.refresh_default(&text()).await.unwrap();
        assert_eq!(app.unwrap().identifier, "com.example.editor");
        assert!(h.handle.snapshot().get(&text()).unwrap().is_default("com.example.editor"));
    }

    #[tokio::test]
    async fn test_set_default_for_all() {
        let h = harness();
        h.gate.send(()).unwrap();
        h.handle.refresh().await.unwrap();

        let outcomes = h.handle.set_default_for_all("com.example.editor").await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].1.is_ok());
        assert_eq!(h.handle.snapshot().default_count("com.example.editor"), 1);

        assert!(matches!(
            h.handle.set_default_for_all("com.example.ghost").await,
            Err(RegistryError::UnknownApplication(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_default_is_unsupported() {
        let h = harness();
        assert!(matches!(
            h.handle.clear_default(&text()),
            Err(RegistryError::Unsupported { .. })
        ));
    }
}
