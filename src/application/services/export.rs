//! Export workflow: scan -> build -> resolve -> export -> index.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::application::services::index::{render_index, StructureSnapshot};
use crate::application::services::metadata::{ExportMetadata, RunStats};
use crate::application::services::orchestrator::{
    wait_cancelled, ExportOrchestrator, ExportReport, ProgressFn,
};
use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::config::Settings;
use crate::domain::paths::{INDEX_FILE, METADATA_FILE, SNAPSHOT_BACKUP_FILE, SNAPSHOT_FILE};
use crate::domain::{build_forest, DocumentRecord, Forest, PathPlan, PathResolver};
use crate::infrastructure::traits::{FileSystem, Renderer, StructureScanner};

/// Result of a structure scan.
#[derive(Debug)]
pub struct ScanResult {
    pub forest: Forest,
    pub snapshot_path: PathBuf,
}

/// What `export` should do besides exporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportRequest {
    /// Remove the output directory first.
    pub clean: bool,
    /// Scan even if a structure snapshot exists.
    pub scan_first: bool,
}

/// Everything a finished export produced.
#[derive(Debug)]
pub struct ExportSummary {
    pub forest: Forest,
    pub plan: PathPlan,
    pub report: ExportReport,
    pub index_path: PathBuf,
    pub metadata: ExportMetadata,
    pub duration_seconds: f64,
}

/// State of an output directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportStatus {
    pub output_dir: PathBuf,
    pub exists: bool,
    pub markdown_files: usize,
    pub folders: usize,
    pub metadata: Option<ExportMetadata>,
    /// `Some(true)` if the snapshot on disk is the one the last export used.
    pub snapshot_matches: Option<bool>,
}

/// Export use cases over the configured output directory.
pub struct ExportService {
    settings: Arc<Settings>,
    fs: Arc<dyn FileSystem>,
    scanner: Arc<dyn StructureScanner>,
    renderer: Arc<dyn Renderer>,
}

impl ExportService {
    pub fn new(
        settings: Arc<Settings>,
        fs: Arc<dyn FileSystem>,
        scanner: Arc<dyn StructureScanner>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            settings,
            fs,
            scanner,
            renderer,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.settings.output_dir
    }

    /// Scan every root, build the forest and persist the snapshot.
    #[instrument(skip_all)]
    pub async fn scan(&self, mut cancel: watch::Receiver<bool>) -> ApplicationResult<ScanResult> {
        let (_, root_ids) = self.settings.credentials()?;

        let mut records: Vec<DocumentRecord> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for root in root_ids {
            let result = tokio::select! {
                biased;
                _ = wait_cancelled(&mut cancel) => return Err(ApplicationError::Cancelled),
                r = self.scanner.scan(root, self.settings.scan.recursive) => r,
            };
            let scanned = result.map_err(|source| ApplicationError::Scan {
                root: root.clone(),
                source,
            })?;
            info!(root = %root, pages = scanned.len(), "scanned");

            for record in scanned {
                if seen.insert(record.id.clone()) {
                    records.push(record);
                } else {
                    debug!(id = %record.id, "skipping document reported by several roots");
                }
            }
        }

        let forest = build_forest(records)?;
        let snapshot = StructureSnapshot::from_forest(&forest, root_ids);
        let snapshot_path = self.output_dir().join(SNAPSHOT_FILE);
        self.backup_snapshot(&snapshot_path);
        snapshot.save(self.fs.as_ref(), &snapshot_path)?;
        info!(path = %snapshot_path.display(), pages = forest.len(), "structure snapshot saved");

        Ok(ScanResult {
            forest,
            snapshot_path,
        })
    }

    /// Run a full export.
    ///
    /// Per-document failures are reported in the summary; only structural,
    /// configuration and output-root errors are returned as `Err`.
    #[instrument(skip_all, fields(clean = request.clean, scan_first = request.scan_first))]
    pub async fn export(
        &self,
        request: ExportRequest,
        cancel: watch::Receiver<bool>,
        progress: Option<ProgressFn>,
    ) -> ApplicationResult<ExportSummary> {
        self.settings.credentials()?;
        let started = Instant::now();
        let output_dir = self.output_dir().to_path_buf();

        if request.clean && self.fs.exists(&output_dir) {
            info!(dir = %output_dir.display(), "cleaning output directory");
            self.fs
                .remove_dir_all(&output_dir)
                .with_path_context("clean output directory", &output_dir)?;
        }

        let snapshot_path = output_dir.join(SNAPSHOT_FILE);
        let forest = if request.scan_first || !self.fs.is_file(&snapshot_path) {
            self.scan(cancel.clone()).await?.forest
        } else {
            debug!(path = %snapshot_path.display(), "reusing structure snapshot");
            let snapshot = StructureSnapshot::load(self.fs.as_ref(), &snapshot_path)?;
            build_forest(snapshot.pages)?
        };

        let classifier = self.settings.classifier.classifier();
        let plan = PathResolver::new(self.settings.layout, &classifier, &self.settings.entry_file_name)
            .resolve(&forest);

        let mut orchestrator = ExportOrchestrator::new(
            self.fs.clone(),
            self.renderer.clone(),
            self.settings.export.options(),
        );
        if let Some(progress) = progress {
            orchestrator = orchestrator.with_progress(progress);
        }
        let report = orchestrator.run(&forest, &plan, &output_dir, cancel).await?;

        let index_path = output_dir.join(INDEX_FILE);
        self.fs
            .write(&index_path, &render_index(&forest, &plan, &report))
            .with_path_context("write index", &index_path)?;

        let snapshot = StructureSnapshot::from_forest(&forest, &self.settings.root_ids);
        snapshot.save(self.fs.as_ref(), &snapshot_path)?;

        let duration_seconds = started.elapsed().as_secs_f64();
        let metadata = ExportMetadata::record(
            self.fs.as_ref(),
            &output_dir.join(METADATA_FILE),
            RunStats {
                finished_at: Local::now(),
                pages: report.succeeded(),
                errors: report.failed(),
                duration_seconds,
                cancelled: report.was_cancelled(),
                fingerprint: Some(snapshot.fingerprint()?),
                failed: report.failed_ids(),
            },
        )?;

        Ok(ExportSummary {
            forest,
            plan,
            report,
            index_path,
            metadata,
            duration_seconds,
        })
    }

    /// Inspect the output directory without touching it.
    #[instrument(skip_all)]
    pub fn status(&self) -> ApplicationResult<ExportStatus> {
        let output_dir = self.output_dir().to_path_buf();
        if !self.fs.is_dir(&output_dir) {
            return Ok(ExportStatus {
                output_dir,
                exists: false,
                markdown_files: 0,
                folders: 0,
                metadata: None,
                snapshot_matches: None,
            });
        }

        let markdown_files = self.count_markdown(&output_dir)?;
        let folders = self
            .fs
            .list_dir(&output_dir)
            .with_path_context("list output directory", &output_dir)?
            .iter()
            .filter(|p| self.fs.is_dir(p))
            .count();
        let metadata = ExportMetadata::load(self.fs.as_ref(), &output_dir.join(METADATA_FILE))?;

        let snapshot_path = output_dir.join(SNAPSHOT_FILE);
        let snapshot_matches = match metadata.as_ref().and_then(|m| m.structure_fingerprint.as_ref()) {
            Some(expected) if self.fs.is_file(&snapshot_path) => {
                match StructureSnapshot::load(self.fs.as_ref(), &snapshot_path)
                    .and_then(|s| s.fingerprint())
                {
                    Ok(actual) => Some(&actual == expected),
                    Err(e) => {
                        warn!(error = %e, "cannot fingerprint structure snapshot");
                        Some(false)
                    }
                }
            }
            _ => None,
        };

        Ok(ExportStatus {
            output_dir,
            exists: true,
            markdown_files,
            folders,
            metadata,
            snapshot_matches,
        })
    }

    /// Markdown files `clean` would delete; `None` if there is no output directory.
    pub fn clean_preview(&self) -> ApplicationResult<Option<usize>> {
        let output_dir = self.output_dir();
        if !self.fs.is_dir(output_dir) {
            return Ok(None);
        }
        self.count_markdown(output_dir).map(Some)
    }

    /// Remove the output directory. Returns the number of Markdown files removed.
    #[instrument(skip_all)]
    pub fn clean(&self) -> ApplicationResult<usize> {
        let output_dir = self.output_dir();
        let Some(count) = self.clean_preview()? else {
            return Ok(0);
        };
        self.fs
            .remove_dir_all(output_dir)
            .with_path_context("remove output directory", output_dir)?;
        info!(dir = %output_dir.display(), files = count, "output directory removed");
        Ok(count)
    }

    fn count_markdown(&self, dir: &Path) -> ApplicationResult<usize> {
        let files = self
            .fs
            .walk_files(dir)
            .with_path_context("walk output directory", dir)?;
        Ok(files
            .iter()
            .filter(|p| p.extension().is_some_and(|e| e.eq_ignore_ascii_case("md")))
            .count())
    }

    /// Keep the previous snapshot as `.bak`; failures only warn.
    fn backup_snapshot(&self, snapshot_path: &Path) {
        if !self.fs.is_file(snapshot_path) {
            return;
        }
        let backup = snapshot_path.with_file_name(SNAPSHOT_BACKUP_FILE);
        if let Err(e) = self.fs.copy(snapshot_path, &backup) {
            warn!(path = %backup.display(), error = %e, "cannot back up structure snapshot");
        }
    }
}
