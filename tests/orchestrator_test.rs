//! Tests for ExportOrchestrator

mod common;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::watch;

use common::{rec, FakeRenderer, Script};
use pagemirror::application::services::{ExportOptions, ExportOrchestrator, ExportReport};
use pagemirror::domain::{
    build_forest, CategoryClassifier, DocumentRecord, ErrorKind, ExportOutcome, Forest, Layout,
    PathPlan, PathResolver,
};
use pagemirror::infrastructure::traits::RealFileSystem;
use pagemirror::util::testing;

fn fast_options() -> ExportOptions {
    ExportOptions {
        timeout: Duration::from_secs(5),
        retries: 0,
        retry_delay: Duration::from_millis(1),
        ..ExportOptions::default()
    }
}

fn plan_for(records: Vec<DocumentRecord>) -> (Forest, PathPlan) {
    let forest = build_forest(records).unwrap();
    let classifier = CategoryClassifier::default();
    let plan = PathResolver::new(Layout::Hierarchical, &classifier, "README.md").resolve(&forest);
    (forest, plan)
}

fn three_siblings() -> Vec<DocumentRecord> {
    vec![
        rec("root", "Root", None),
        rec("a", "Alpha", Some("root")),
        rec("b", "Beta", Some("root")),
        rec("c", "Gamma", Some("root")),
    ]
}

async fn run(
    renderer: Arc<FakeRenderer>,
    options: ExportOptions,
    forest: &Forest,
    plan: &PathPlan,
    out: &Path,
    cancel: watch::Receiver<bool>,
) -> ExportReport {
    ExportOrchestrator::new(Arc::new(RealFileSystem), renderer, options)
        .run(forest, plan, out, cancel)
        .await
        .unwrap()
}

/// Sender dropped right away: the flag stays `false` for good.
fn never_cancelled() -> watch::Receiver<bool> {
    watch::channel(false).1
}

#[tokio::test]
async fn given_all_renders_succeed_when_run_then_entry_files_renamed() {
    // Arrange
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let (forest, plan) = plan_for(three_siblings());
    let renderer = Arc::new(FakeRenderer::new().script("a", Script::Write("Alpha.md".into())));

    // Act
    let report = run(renderer, fast_options(), &forest, &plan, temp.path(), never_cancelled()).await;

    // Assert
    assert_eq!(report.len(), 4);
    assert!(report.all_succeeded());
    let alpha = report.get("a").unwrap();
    assert_eq!(alpha.entry_file, Some(Path::new("Alpha").join("README.md")));
    assert_eq!(alpha.attempts, 1);
    assert_eq!(alpha.rendered_file_count, 1);
    assert!(temp.path().join("Alpha").join("README.md").is_file());
    assert!(!temp.path().join("Alpha").join("Alpha.md").exists());
    assert_eq!(report.get("root").unwrap().entry_file, Some(PathBuf::from("README.md")));
}

#[tokio::test]
async fn given_one_render_hangs_when_run_then_timeout_recorded_and_siblings_succeed() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let (forest, plan) = plan_for(three_siblings());
    let renderer = Arc::new(FakeRenderer::new().script("b", Script::Hang));
    let options = ExportOptions {
        timeout: Duration::from_millis(50),
        max_diagnostic_len: 40,
        ..fast_options()
    };

    // Act
    let report = run(renderer, options, &forest, &plan, temp.path(), never_cancelled()).await;

    // Assert
    assert_eq!(report.len(), 4);
    assert_eq!(report.failed(), 1);
    let beta = report.get("b").unwrap();
    assert!(!beta.success);
    assert_eq!(beta.error_kind, Some(ErrorKind::Timeout));
    assert!(beta.error_detail.as_ref().unwrap().chars().count() <= 43);
    assert!(report.get("a").unwrap().success);
    assert!(report.get("c").unwrap().success);
    assert_eq!(report.failed_ids(), vec!["b".to_string()]);
}

#[tokio::test]
async fn given_malformed_output_when_run_then_bounded_malformed_outcome() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let (forest, plan) = plan_for(three_siblings());
    let renderer = Arc::new(
        FakeRenderer::new().script("c", Script::Malformed("x".repeat(5000))),
    );

    // Act
    let report = run(renderer, fast_options(), &forest, &plan, temp.path(), never_cancelled()).await;

    // Assert
    let gamma = report.get("c").unwrap();
    assert_eq!(gamma.error_kind, Some(ErrorKind::Malformed));
    let detail = gamma.error_detail.as_ref().unwrap();
    assert_eq!(detail.chars().count(), 503);
    assert!(detail.ends_with("..."));
}

#[tokio::test]
async fn given_failed_parent_when_run_then_children_still_exported() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let (forest, plan) = plan_for(vec![
        rec("root", "Root", None),
        rec("p", "Parent", Some("root")),
        rec("k", "Kid", Some("p")),
    ]);
    let renderer = Arc::new(FakeRenderer::new().script("p", Script::Fail("boom".into())));

    // Act
    let report = run(renderer, fast_options(), &forest, &plan, temp.path(), never_cancelled()).await;

    // Assert
    let parent = report.get("p").unwrap();
    assert_eq!(parent.error_kind, Some(ErrorKind::Render));
    assert_eq!(parent.error_detail.as_deref(), Some("boom"));
    assert!(report.get("k").unwrap().success);
    assert!(temp.path().join("Parent").join("Kid").join("README.md").is_file());
}

#[tokio::test]
async fn given_flaky_render_when_retries_allowed_then_second_attempt_succeeds() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let (forest, plan) = plan_for(three_siblings());
    let renderer = Arc::new(FakeRenderer::new().script("a", Script::FailOnce));
    let options = ExportOptions {
        retries: 1,
        ..fast_options()
    };

    // Act
    let report = run(renderer.clone(), options, &forest, &plan, temp.path(), never_cancelled()).await;

    // Assert
    let alpha = report.get("a").unwrap();
    assert!(alpha.success);
    assert_eq!(alpha.attempts, 2);
    assert_eq!(renderer.calls("a"), 2);
    assert_eq!(renderer.calls("b"), 1);
}

#[tokio::test]
async fn given_persistent_failure_when_retries_exhausted_then_attempts_counted() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let (forest, plan) = plan_for(three_siblings());
    let renderer = Arc::new(FakeRenderer::new().script("a", Script::Fail("nope".into())));
    let options = ExportOptions {
        retries: 2,
        ..fast_options()
    };

    // Act
    let report = run(renderer.clone(), options, &forest, &plan, temp.path(), never_cancelled()).await;

    // Assert
    let alpha = report.get("a").unwrap();
    assert!(!alpha.success);
    assert_eq!(alpha.attempts, 3);
    assert_eq!(renderer.calls("a"), 3);
}

#[tokio::test]
async fn given_entry_name_taken_by_directory_when_run_then_original_file_kept() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let (forest, plan) = plan_for(vec![rec("root", "Root", None)]);
    std::fs::create_dir_all(temp.path().join("README.md")).unwrap();
    let renderer = Arc::new(FakeRenderer::new().script("root", Script::Write("Root.md".into())));

    // Act
    let report = run(renderer, fast_options(), &forest, &plan, temp.path(), never_cancelled()).await;

    // Assert
    let root = report.get("root").unwrap();
    assert!(root.success);
    assert_eq!(root.entry_file, Some(PathBuf::from("Root.md")));
    assert!(temp.path().join("Root.md").is_file());
}

#[tokio::test]
async fn given_existing_entry_file_when_reexported_then_replaced() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let (forest, plan) = plan_for(vec![rec("root", "Root", None)]);
    std::fs::write(temp.path().join("README.md"), "stale").unwrap();
    let renderer = Arc::new(FakeRenderer::new().script("root", Script::Write("Root.md".into())));

    // Act
    let report = run(renderer, fast_options(), &forest, &plan, temp.path(), never_cancelled()).await;

    // Assert
    assert!(report.get("root").unwrap().success);
    let content = std::fs::read_to_string(temp.path().join("README.md")).unwrap();
    assert_eq!(content, "# Root.md\n");
}

#[tokio::test]
async fn given_cancellation_during_render_when_run_then_remaining_nodes_cancelled() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let (forest, plan) = plan_for(three_siblings());
    let (tx, rx) = watch::channel(false);
    let renderer = Arc::new(
        FakeRenderer::new()
            .script("b", Script::CancelAndHang)
            .with_cancel(tx),
    );

    // Act
    let report = run(renderer.clone(), fast_options(), &forest, &plan, temp.path(), rx).await;

    // Assert
    assert!(report.was_cancelled());
    assert_eq!(report.len(), forest.len());
    assert!(report.get("root").unwrap().success);
    assert!(report.get("a").unwrap().success);
    assert_eq!(report.get("b").unwrap().error_kind, Some(ErrorKind::Cancelled));
    let gamma = report.get("c").unwrap();
    assert_eq!(gamma.error_kind, Some(ErrorKind::Cancelled));
    assert_eq!(gamma.attempts, 0);
    assert_eq!(renderer.calls("c"), 0);
}

#[tokio::test]
async fn given_concurrency_limit_when_run_then_parallel_within_bound() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let mut records = vec![rec("root", "Root", None)];
    for i in 0..6 {
        records.push(rec(&format!("p{i}"), &format!("Page {i}"), Some("root")));
    }
    records.push(rec("deep", "Deep", Some("p0")));
    let (forest, plan) = plan_for(records);
    let renderer = Arc::new(FakeRenderer::new().with_delay(Duration::from_millis(20)));
    let options = ExportOptions {
        concurrency: 3,
        ..fast_options()
    };

    // Act
    let report = run(renderer.clone(), options, &forest, &plan, temp.path(), never_cancelled()).await;

    // Assert
    assert_eq!(report.len(), 8);
    assert!(report.all_succeeded());
    assert!(renderer.max_in_flight() > 1);
    assert!(renderer.max_in_flight() <= 3);
    assert!(temp.path().join("Page 0").join("Deep").join("README.md").is_file());
    let order: Vec<&str> = report.iter().map(|o| o.node_id.as_str()).collect();
    assert_eq!(order[0], "root");
    assert_eq!(order[1], "p0");
    assert_eq!(order[2], "deep");
}

#[tokio::test]
async fn given_progress_callback_when_run_then_called_once_per_node() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let (forest, plan) = plan_for(three_siblings());
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let orchestrator = ExportOrchestrator::new(
        Arc::new(RealFileSystem),
        Arc::new(FakeRenderer::new()),
        fast_options(),
    )
    .with_progress(Arc::new(move |_: &ExportOutcome| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    // Act
    let report = orchestrator
        .run(&forest, &plan, temp.path(), never_cancelled())
        .await
        .unwrap();

    // Assert
    assert_eq!(seen.load(Ordering::SeqCst), report.len());
}
