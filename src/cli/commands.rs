//! Command dispatch: one function per subcommand.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::CommandFactory;
use clap_complete::generate;
use generational_arena::Index;
use termtree::Tree;
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::application::services::index::{ICON_CONTAINER, ICON_PAGE};
use crate::application::services::{ExportRequest, ExportService, ExportSummary, ProgressFn};
use crate::cli::args::{Cli, Commands, ConfigCommands, ExportArgs, LayoutArg};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::{ExportOutcome, Forest};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;

/// Execute the parsed command line.
pub fn execute(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Some(Commands::Scan) => cmd_scan(cli),
        Some(Commands::Export(args)) => cmd_export(cli, args),
        Some(Commands::Full { clean, layout }) => {
            let args = ExportArgs {
                clean: *clean,
                scan_first: true,
                layout: *layout,
            };
            cmd_export(cli, &args)
        }
        Some(Commands::Status) => cmd_status(cli),
        Some(Commands::Clean { yes }) => cmd_clean(cli, *yes),
        Some(Commands::Config { command }) => cmd_config(cli, command),
        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
        None => {
            output::info("No command given, see --help");
            Ok(())
        }
    }
}

fn project_dir(cli: &Cli) -> CliResult<PathBuf> {
    match &cli.project_dir {
        Some(dir) => Ok(dir.clone()),
        None => env::current_dir().map_err(|e| InfraError::io("get current directory", e).into()),
    }
}

/// Effective settings: config layers, then command-line overrides.
fn load_settings(cli: &Cli, layout: Option<LayoutArg>) -> CliResult<Settings> {
    let dir = project_dir(cli)?;
    let mut settings = Settings::load(Some(&dir))?;
    if let Some(output_dir) = &cli.output {
        settings.output_dir = output_dir.clone();
    }
    if let Some(layout) = layout {
        settings.layout = layout.into();
    }
    debug!(output_dir = %settings.output_dir.display(), layout = ?settings.layout, "settings loaded");
    Ok(settings)
}

fn runtime() -> CliResult<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| InfraError::io("build tokio runtime", e).into())
}

/// Flip the returned receiver to `true` on the first Ctrl-C.
///
/// Must be called from inside the runtime.
fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight documents");
            let _ = tx.send(true);
        }
    });
    rx
}

fn export_service(cli: &Cli, layout: Option<LayoutArg>) -> CliResult<ExportService> {
    let settings = load_settings(cli, layout)?;
    Ok(ServiceContainer::new(settings).export_service())
}

#[instrument(skip_all)]
fn cmd_scan(cli: &Cli) -> CliResult<()> {
    let service = export_service(cli, None)?;
    let result = runtime()?.block_on(async {
        let cancel = cancel_on_ctrl_c();
        service.scan(cancel).await
    })?;

    output::header("Page structure");
    for tree in forest_trees(&result.forest) {
        output::info(&tree);
    }
    output::info("");
    output::action(
        "Scanned",
        &format!(
            "{} pages, structure saved to {}",
            result.forest.len(),
            result.snapshot_path.display()
        ),
    );
    Ok(())
}

/// One termtree per root.
fn forest_trees(forest: &Forest) -> Vec<Tree<String>> {
    fn label(forest: &Forest, idx: Index) -> String {
        forest
            .get_node(idx)
            .map(|node| {
                let icon = if node.record.is_from_container {
                    ICON_CONTAINER
                } else {
                    ICON_PAGE
                };
                format!("{icon} {}", node.record.title())
            })
            .unwrap_or_default()
    }

    fn build(forest: &Forest, idx: Index) -> Tree<String> {
        let mut tree = Tree::new(label(forest, idx));
        if let Some(node) = forest.get_node(idx) {
            for &child in &node.children {
                tree.push(build(forest, child));
            }
        }
        tree
    }

    forest.roots().iter().map(|&root| build(forest, root)).collect()
}

#[instrument(skip(cli))]
fn cmd_export(cli: &Cli, args: &ExportArgs) -> CliResult<()> {
    let service = export_service(cli, args.layout)?;
    let request = ExportRequest {
        clean: args.clean,
        scan_first: args.scan_first,
    };

    let progress: ProgressFn = Arc::new(print_progress);
    let summary = runtime()?.block_on(async {
        let cancel = cancel_on_ctrl_c();
        service.export(request, cancel, Some(progress)).await
    })?;

    print_summary(&summary);

    let failed = summary.report.failed();
    if failed > 0 {
        return Err(CliError::ExportIncomplete {
            failed,
            total: summary.report.len(),
        });
    }
    Ok(())
}

fn print_progress(outcome: &ExportOutcome) {
    let location = if outcome.output_path.as_os_str().is_empty() {
        ".".to_string()
    } else {
        outcome.output_path.display().to_string()
    };
    if outcome.success {
        output::success_detail(&format!(
            "{location} ({} files)",
            outcome.rendered_file_count
        ));
    } else {
        let kind = outcome
            .error_kind
            .map(|k| k.to_string())
            .unwrap_or_else(|| "error".into());
        output::failure(&format!("{location} [{}] {kind}", outcome.node_id));
    }
}

fn print_summary(summary: &ExportSummary) {
    let report = &summary.report;
    output::info("");
    if report.was_cancelled() {
        output::warning("export interrupted, unfinished pages marked as cancelled");
    }
    if report.all_succeeded() {
        output::success(&format!(
            "{} pages exported in {:.1}s",
            report.succeeded(),
            summary.duration_seconds
        ));
    } else {
        output::warning(&format!(
            "{} of {} pages exported in {:.1}s",
            report.succeeded(),
            report.len(),
            summary.duration_seconds
        ));
        for outcome in report.iter().filter(|o| !o.success) {
            let title = summary
                .forest
                .find(&outcome.node_id)
                .map(|n| n.record.title().to_string())
                .unwrap_or_else(|| outcome.node_id.clone());
            output::failure(&format!(
                "{title}: {}",
                outcome.error_detail.as_deref().unwrap_or("no diagnostic output")
            ));
        }
    }
    output::action("Index", &summary.index_path.display());
}

#[instrument(skip_all)]
fn cmd_status(cli: &Cli) -> CliResult<()> {
    let service = export_service(cli, None)?;
    let status = service.status()?;

    output::header("Export status");
    output::detail(&format!("Output directory: {}", status.output_dir.display()));
    if !status.exists {
        output::warning("no export found");
        return Ok(());
    }
    output::detail(&format!("Markdown files:   {}", status.markdown_files));
    output::detail(&format!("Folders:          {}", status.folders));

    let Some(metadata) = &status.metadata else {
        output::detail("No export metadata");
        return Ok(());
    };
    output::detail(&format!(
        "Last export:      {} ({} pages, {} errors, {:.1}s)",
        metadata.last_export, metadata.pages_exported, metadata.errors, metadata.duration_seconds
    ));
    if metadata.cancelled {
        output::detail("Last export was interrupted");
    }
    match status.snapshot_matches {
        Some(true) => output::success_detail("structure.json matches the last export"),
        Some(false) => output::failure("structure.json changed since the last export"),
        None => {}
    }

    let recent = metadata.recent(5);
    if !recent.is_empty() {
        output::info("");
        output::header("Recent exports");
        for entry in recent {
            output::detail(&format!(
                "{}: {} pages, {} errors",
                entry.timestamp, entry.pages, entry.errors
            ));
        }
    }
    if !metadata.failed.is_empty() {
        output::info("");
        output::header("Failed in last export");
        for id in &metadata.failed {
            output::failure(id);
        }
    }
    Ok(())
}

#[instrument(skip(cli))]
fn cmd_clean(cli: &Cli, yes: bool) -> CliResult<()> {
    let service = export_service(cli, None)?;
    let output_dir = service.output_dir().to_path_buf();
    let Some(count) = service.clean_preview()? else {
        output::info(&format!("Nothing to clean: {} does not exist", output_dir.display()));
        return Ok(());
    };

    if !yes && !output::confirm(&format!("Delete {count} files in {}?", output_dir.display())) {
        output::info("Aborted");
        return Ok(());
    }
    let removed = service.clean()?;
    output::action(
        "Removed",
        &format!("{} ({removed} Markdown files)", output_dir.display()),
    );
    Ok(())
}

fn cmd_config(cli: &Cli, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = load_settings(cli, None)?;
            output::info(&settings.redacted().to_toml()?);
            Ok(())
        }
        ConfigCommands::Init { global } => {
            let path = if *global {
                global_config_path().ok_or_else(|| {
                    CliError::Usage("cannot determine the global config directory".into())
                })?
            } else {
                local_config_path(&project_dir(cli)?)
            };
            write_template(&path)?;
            output::action("Created", &path.display());
            Ok(())
        }
        ConfigCommands::Path => {
            match global_config_path() {
                Some(path) => output::detail(&format!("Global: {}", existence(&path))),
                None => output::detail("Global: (unavailable)"),
            }
            let local = local_config_path(&project_dir(cli)?);
            output::detail(&format!("Local:  {}", existence(&local)));
            Ok(())
        }
    }
}

fn existence(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found)", path.display())
    }
}

fn write_template(path: &Path) -> CliResult<()> {
    if path.exists() {
        return Err(CliError::Usage(format!(
            "config file already exists: {}",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| InfraError::io(format!("create {}", parent.display()), e))?;
    }
    std::fs::write(path, Settings::template())
        .map_err(|e| InfraError::io(format!("write {}", path.display()), e))?;
    Ok(())
}
