//! PatternWorkspace: owns the backend and wires the store, ledger,
//! snapshot and severity engines over it for one project root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pattern_core::config::{CliOverrides, PatternStoreConfig};
use pattern_core::errors::WorkspaceError;
use pattern_core::events::{EventDispatcher, PatternEventHandler};
use pattern_core::tracing::metrics;
use pattern_core::types::Snapshot;
use pattern_storage::export::{self, ExportDocument, ImportMode, ImportReport};
use pattern_storage::{open_backend, StorageBackend};
use serde::Serialize;

use crate::history::{HistoryLedger, PruneReport, RetentionPolicy};
use crate::severity::SeverityEngine;
use crate::snapshots::{SnapshotEngine, TrendReport};
use crate::store::PatternStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub history: PruneReport,
    pub change_log_pruned: usize,
    /// Empty when the store passed its consistency check.
    pub integrity_problems: Vec<String>,
}

pub struct PatternWorkspace {
    root: PathBuf,
    config: PatternStoreConfig,
    backend: Arc<dyn StorageBackend>,
    store: PatternStore,
    history: Option<Arc<HistoryLedger>>,
    snapshots: SnapshotEngine,
    severity: SeverityEngine,
}

impl PatternWorkspace {
    /// Resolve configuration for `root` and open its store.
    pub fn open(root: &Path, cli: Option<&CliOverrides>) -> Result<Self, WorkspaceError> {
        let config = PatternStoreConfig::load(root, cli)?;
        Self::open_with_config(root, config, Vec::new())
    }

    pub fn open_with_config(
        root: &Path,
        config: PatternStoreConfig,
        handlers: Vec<Arc<dyn PatternEventHandler>>,
    ) -> Result<Self, WorkspaceError> {
        config.validate()?;
        let backend = open_backend(&config.storage, root)?;
        Self::open_with_backend(root, backend, config, handlers)
    }

    /// Wire the engines over an already opened backend.
    pub fn open_with_backend(
        root: &Path,
        backend: Arc<dyn StorageBackend>,
        config: PatternStoreConfig,
        handlers: Vec<Arc<dyn PatternEventHandler>>,
    ) -> Result<Self, WorkspaceError> {
        let mut dispatcher = EventDispatcher::new();
        for handler in handlers {
            dispatcher.register(handler);
        }
        let events = Arc::new(dispatcher);

        let history = if config.history.effective_enabled() {
            Some(Arc::new(HistoryLedger::open(
                backend.clone(),
                RetentionPolicy::from(&config.history),
                events.clone(),
            )?))
        } else {
            None
        };
        let store = PatternStore::open(backend.clone(), events.clone(), history.clone())?;
        let snapshots = SnapshotEngine::new(backend.clone(), &config.snapshots, events);
        let severity =
            SeverityEngine::with_backend(backend.clone(), config.severity.to_severity_config())?;

        tracing::info!(
            root = %root.display(),
            { metrics::BACKEND } = tracing::field::display(backend.kind()),
            history = history.is_some(),
            "pattern workspace opened"
        );
        Ok(Self {
            root: root.to_path_buf(),
            config,
            backend,
            store,
            history,
            snapshots,
            severity,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &PatternStoreConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn store(&self) -> &PatternStore {
        &self.store
    }

    /// `None` when history is disabled in configuration.
    pub fn history(&self) -> Option<&Arc<HistoryLedger>> {
        self.history.as_ref()
    }

    pub fn snapshots(&self) -> &SnapshotEngine {
        &self.snapshots
    }

    pub fn severity(&self) -> &SeverityEngine {
        &self.severity
    }

    /// Capture today's snapshot of every pattern in the store.
    pub async fn snapshot(&self) -> Result<Snapshot, WorkspaceError> {
        let patterns = self.store.all().await;
        Ok(self.snapshots.create_snapshot(&patterns).await?)
    }

    pub async fn latest_trends(&self) -> Result<Option<TrendReport>, WorkspaceError> {
        Ok(self.snapshots.latest_trends().await?)
    }

    // --- Export / import ---

    /// Write a portable JSON export to `path`. Pending history is flushed
    /// first so the export is complete.
    pub async fn export_to(&self, path: &Path) -> Result<ExportDocument, WorkspaceError> {
        if let Some(history) = &self.history {
            history.flush().await?;
        }
        let doc = export::export_document(self.backend.as_ref())?;
        export::write_document(&doc, path)?;
        tracing::info!(
            path = %path.display(),
            patterns = doc.patterns.len(),
            histories = doc.histories.len(),
            snapshots = doc.snapshots.len(),
            "store exported"
        );
        Ok(doc)
    }

    /// Load a JSON export, then rebuild every in-memory view.
    pub async fn import_from(
        &self,
        path: &Path,
        mode: ImportMode,
    ) -> Result<ImportReport, WorkspaceError> {
        let doc = export::read_document(path)?;
        let report = export::import_document(self.backend.as_ref(), &doc, mode)?;
        self.reload().await?;
        tracing::info!(
            path = %path.display(),
            mode = ?mode,
            inserted = report.patterns_inserted,
            updated = report.patterns_updated,
            "store imported"
        );
        Ok(report)
    }

    /// Binary image of the store. SQLite only.
    pub async fn export_image(&self, dest: &Path) -> Result<(), WorkspaceError> {
        if let Some(history) = &self.history {
            history.flush().await?;
        }
        Ok(self.backend.export_image(dest)?)
    }

    pub async fn import_image(&self, src: &Path) -> Result<(), WorkspaceError> {
        self.backend.import_image(src)?;
        self.reload().await
    }

    /// Re-read the index, histories and severity configuration from the
    /// backend.
    pub async fn reload(&self) -> Result<(), WorkspaceError> {
        self.store.reload().await?;
        if let Some(history) = &self.history {
            history.reload().await?;
        }
        self.severity.reload()?;
        Ok(())
    }

    // --- Maintenance ---

    /// Prune history, drop synced change-log rows, checkpoint, and run the
    /// consistency check.
    pub async fn maintain(&self) -> Result<MaintenanceReport, WorkspaceError> {
        let history = match &self.history {
            Some(ledger) => ledger.prune().await?,
            None => PruneReport::default(),
        };
        let change_log_pruned = self.backend.prune_synced(chrono::Utc::now())?;
        self.backend.checkpoint()?;
        let integrity_problems = self.backend.integrity_check()?;
        if !integrity_problems.is_empty() {
            tracing::warn!(problems = integrity_problems.len(), "integrity check failed");
        }
        Ok(MaintenanceReport {
            history,
            change_log_pruned,
            integrity_problems,
        })
    }
}
