//! Export orchestration: one render call per document, isolated failures.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, instrument, trace, warn};

use crate::application::{ApplicationResult, IoResultExt};
use crate::domain::{ErrorKind, ExportOutcome, Forest, NodeState, PathPlan, RenderResponse};
use crate::infrastructure::traits::{FileSystem, ProcessError, Renderer};

/// Callback invoked once per finished document.
pub type ProgressFn = Arc<dyn Fn(&ExportOutcome) + Send + Sync>;

/// Tuning knobs for one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Wall-clock budget per render attempt.
    pub timeout: Duration,
    /// Additional attempts after the first failure.
    pub retries: u32,
    pub retry_delay: Duration,
    /// 1 = sequential depth-first; more = level-by-level with that many in flight.
    pub concurrency: usize,
    /// Upper bound (characters) for recorded error details.
    pub max_diagnostic_len: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 1,
            retry_delay: Duration::from_millis(500),
            concurrency: 1,
            max_diagnostic_len: 500,
        }
    }
}

/// Outcomes of a run, one per submitted document, in depth-first order.
#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    outcomes: HashMap<String, ExportOutcome>,
    order: Vec<String>,
    cancelled: bool,
}

impl ExportReport {
    fn record(&mut self, outcome: ExportOutcome) {
        if outcome.error_kind == Some(ErrorKind::Cancelled) {
            self.cancelled = true;
        }
        debug_assert!(!self.outcomes.contains_key(&outcome.node_id));
        self.outcomes.insert(outcome.node_id.clone(), outcome);
    }

    pub fn get(&self, id: &str) -> Option<&ExportOutcome> {
        self.outcomes.get(id)
    }

    /// Outcomes in depth-first order.
    pub fn iter(&self) -> impl Iterator<Item = &ExportOutcome> {
        self.order.iter().filter_map(|id| self.outcomes.get(id))
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.values().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.iter()
            .filter(|o| !o.success)
            .map(|o| o.node_id.clone())
            .collect()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

struct NodeJob {
    id: String,
    rel_dir: PathBuf,
    depth: usize,
}

/// Drives the renderer over a resolved forest.
pub struct ExportOrchestrator {
    fs: Arc<dyn FileSystem>,
    renderer: Arc<dyn Renderer>,
    options: ExportOptions,
    progress: Option<ProgressFn>,
}

impl ExportOrchestrator {
    pub fn new(fs: Arc<dyn FileSystem>, renderer: Arc<dyn Renderer>, options: ExportOptions) -> Self {
        Self {
            fs,
            renderer,
            options,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Export every node of `forest` below `output_root`.
    ///
    /// Only a failure to create `output_root` itself is returned as `Err`.
    /// Cancellation through `cancel` marks unfinished nodes as cancelled and
    /// still returns the (partial) report.
    #[instrument(level = "debug", skip_all, fields(root = %output_root.display(), nodes = forest.len()))]
    pub async fn run(
        &self,
        forest: &Forest,
        plan: &PathPlan,
        output_root: &Path,
        cancel: watch::Receiver<bool>,
    ) -> ApplicationResult<ExportReport> {
        self.fs
            .create_dir_all(output_root)
            .with_path_context("create output directory", output_root)?;

        let jobs: Vec<NodeJob> = forest
            .iter()
            .map(|(_, depth, node)| NodeJob {
                id: node.id().to_string(),
                rel_dir: plan.get(node.id()).map(Path::to_path_buf).unwrap_or_default(),
                depth,
            })
            .collect();

        let mut report = ExportReport {
            order: jobs.iter().map(|j| j.id.clone()).collect(),
            ..ExportReport::default()
        };

        if self.options.concurrency <= 1 {
            for job in &jobs {
                let outcome = self
                    .export_node(job, output_root, plan.entry_file_name(), cancel.clone())
                    .await;
                self.finish(&mut report, outcome);
            }
        } else {
            let max_depth = jobs.iter().map(|j| j.depth).max().unwrap_or(0);
            for depth in 0..=max_depth {
                let level: Vec<&NodeJob> = jobs.iter().filter(|j| j.depth == depth).collect();
                debug!(depth, nodes = level.len(), "dispatching level");
                let outcomes: Vec<ExportOutcome> = stream::iter(level)
                    .map(|job| {
                        self.export_node(job, output_root, plan.entry_file_name(), cancel.clone())
                    })
                    .buffer_unordered(self.options.concurrency)
                    .collect()
                    .await;
                for outcome in outcomes {
                    self.finish(&mut report, outcome);
                }
            }
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            cancelled = report.was_cancelled(),
            "export run finished"
        );
        Ok(report)
    }

    fn finish(&self, report: &mut ExportReport, outcome: ExportOutcome) {
        if let Some(progress) = &self.progress {
            progress(&outcome);
        }
        report.record(outcome);
    }

    async fn export_node(
        &self,
        job: &NodeJob,
        output_root: &Path,
        entry_file_name: &str,
        mut cancel: watch::Receiver<bool>,
    ) -> ExportOutcome {
        let mut state = NodeState::Pending;
        let id = job.id.as_str();

        if *cancel.borrow() {
            advance(id, &mut state, NodeState::Failed);
            return cancelled(job, 0);
        }

        let dir = output_root.join(&job.rel_dir);
        if let Err(e) = self.fs.create_dir_all(&dir) {
            warn!(id, dir = %dir.display(), error = %e, "cannot create node directory");
            advance(id, &mut state, NodeState::Failed);
            return ExportOutcome::failed(
                id,
                job.rel_dir.clone(),
                0,
                ErrorKind::Filesystem,
                self.bounded(&format!("create {}: {}", dir.display(), e)),
            );
        }

        let max_attempts = self.options.retries.saturating_add(1);
        let mut last_error = (ErrorKind::Render, String::new());
        for attempt in 1..=max_attempts {
            advance(id, &mut state, NodeState::Exporting { attempt });

            let result = tokio::select! {
                biased;
                _ = wait_cancelled(&mut cancel) => {
                    advance(id, &mut state, NodeState::Failed);
                    return cancelled(job, attempt);
                }
                r = tokio::time::timeout(self.options.timeout, self.renderer.render(id, &dir)) => r,
            };

            last_error = match result {
                Err(_) => (
                    ErrorKind::Timeout,
                    format!("render timed out after {}s", self.options.timeout.as_secs_f64()),
                ),
                Ok(Err(ProcessError::Malformed(message))) => (ErrorKind::Malformed, message),
                Ok(Err(e)) => (ErrorKind::Render, e.to_string()),
                Ok(Ok(response)) => match response.failure_reason() {
                    Some(reason) => (ErrorKind::Render, reason),
                    None => {
                        advance(id, &mut state, NodeState::Succeeded);
                        let entry = self.place_entry_file(&dir, job, output_root, entry_file_name, &response);
                        info!(id, dir = %job.rel_dir.display(), attempt, "exported");
                        return ExportOutcome::succeeded(
                            id,
                            job.rel_dir.clone(),
                            response.files().len(),
                            entry,
                            attempt,
                        );
                    }
                },
            };
            warn!(id, attempt, kind = %last_error.0, "render attempt failed");

            if attempt < max_attempts && !self.options.retry_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = wait_cancelled(&mut cancel) => {
                        advance(id, &mut state, NodeState::Failed);
                        return cancelled(job, attempt);
                    }
                    _ = tokio::time::sleep(self.options.retry_delay) => {}
                }
            }
        }

        advance(id, &mut state, NodeState::Failed);
        let (kind, detail) = last_error;
        ExportOutcome::failed(id, job.rel_dir.clone(), max_attempts, kind, self.bounded(&detail))
    }

    /// Rename the primary file to the canonical entry file name.
    ///
    /// Best-effort: when the rename is impossible the original file is
    /// linked instead. Returns the entry path relative to `output_root`.
    fn place_entry_file(
        &self,
        dir: &Path,
        job: &NodeJob,
        output_root: &Path,
        entry_file_name: &str,
        response: &RenderResponse,
    ) -> Option<PathBuf> {
        let primary = &response.primary()?.path;
        let canonical = job.rel_dir.join(entry_file_name);
        if primary.file_name().is_some_and(|n| n == entry_file_name)
            && primary.parent().map(without_cur_dir) == Some(without_cur_dir(dir))
        {
            return Some(canonical);
        }

        let target = dir.join(entry_file_name);
        if self.fs.is_dir(&target) {
            warn!(id = %job.id, target = %target.display(), "entry name taken by a directory, keeping original file");
            return Some(relative_to_root(primary, dir, &job.rel_dir, output_root));
        }
        match self.fs.rename(primary, &target) {
            Ok(()) => {
                trace!(id = %job.id, from = %primary.display(), "renamed primary file");
                Some(canonical)
            }
            Err(e) => {
                warn!(id = %job.id, from = %primary.display(), error = %e, "cannot rename primary file, keeping original");
                Some(relative_to_root(primary, dir, &job.rel_dir, output_root))
            }
        }
    }

    fn bounded(&self, detail: &str) -> String {
        truncate_diagnostic(detail, self.options.max_diagnostic_len)
    }
}

fn advance(id: &str, state: &mut NodeState, next: NodeState) {
    debug_assert!(state.can_transition_to(next), "{id}: {state:?} -> {next:?}");
    trace!(id, from = ?state, to = ?next, "state change");
    *state = next;
}

fn cancelled(job: &NodeJob, attempts: u32) -> ExportOutcome {
    ExportOutcome::failed(
        job.id.as_str(),
        job.rel_dir.clone(),
        attempts,
        ErrorKind::Cancelled,
        "export interrupted",
    )
}

/// Resolves once cancellation was requested; never if the sender is gone.
pub(crate) async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Path of `file` relative to the output root; renderers may report
/// `output/A/page.md` for an output root of `./output`.
fn relative_to_root(file: &Path, dir: &Path, rel_dir: &Path, output_root: &Path) -> PathBuf {
    let file = without_cur_dir(file);
    if let Ok(rest) = file.strip_prefix(without_cur_dir(dir)) {
        return rel_dir.join(rest);
    }
    if let Some(rel) = pathdiff::diff_paths(&file, without_cur_dir(output_root)) {
        return rel;
    }
    rel_dir.join(file.file_name().unwrap_or(file.as_os_str()))
}

/// Drop `.` components so `./output/A` and `output/A` compare equal.
fn without_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Trim and cap a diagnostic at `max` characters, marking the cut.
pub fn truncate_diagnostic(detail: &str, max: usize) -> String {
    let detail = detail.trim();
    if detail.is_empty() {
        return "no diagnostic output".to_string();
    }
    if detail.chars().count() <= max {
        return detail.to_string();
    }
    let mut cut: String = detail.chars().take(max).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_long_detail_when_truncate_then_bounded() {
        let detail = "e".repeat(2000);
        let result = truncate_diagnostic(&detail, 100);
        assert_eq!(result.chars().count(), 103);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn given_blank_detail_when_truncate_then_generic_message() {
        assert_eq!(truncate_diagnostic("  \n", 10), "no diagnostic output");
    }

    #[test]
    fn given_file_inside_node_dir_when_relative_to_root_then_joined_with_rel_dir() {
        let rel = relative_to_root(
            Path::new("/out/A/page.md"),
            Path::new("/out/A"),
            Path::new("A"),
            Path::new("/out"),
        );
        assert_eq!(rel, PathBuf::from("A/page.md"));
    }

    #[test]
    fn given_dot_prefixed_root_and_plain_file_path_when_relative_to_root_then_root_relative() {
        let rel = relative_to_root(
            Path::new("output/A/assets/page.md"),
            Path::new("./output/A"),
            Path::new("A"),
            Path::new("./output"),
        );
        assert_eq!(rel, PathBuf::from("A/assets/page.md"));
    }

    #[test]
    fn given_file_outside_node_dir_when_relative_to_root_then_diffed_against_plain_root() {
        let rel = relative_to_root(
            Path::new("output/B/page.md"),
            Path::new("./output/A"),
            Path::new("A"),
            Path::new("./output"),
        );
        assert_eq!(rel, PathBuf::from("B/page.md"));
    }
}
