//! Navigable index and machine-readable structure snapshot.

use std::fmt::Write as _;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::application::error_ext::JsonResultExt;
use crate::application::services::orchestrator::ExportReport;
use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::{DocumentRecord, Forest, PathPlan};
use crate::infrastructure::traits::FileSystem;

pub const SNAPSHOT_VERSION: u32 = 1;

pub const ICON_PAGE: &str = "📄";
pub const ICON_CONTAINER: &str = "📊";
pub const ICON_OK: &str = "✅";
pub const ICON_FAILED: &str = "❌";

/// Re-loadable description of the scanned structure.
///
/// `pages` is in depth-first order, so building a forest from it reproduces
/// the same trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureSnapshot {
    pub version: u32,
    pub root_ids: Vec<String>,
    pub total_pages: usize,
    pub pages: Vec<DocumentRecord>,
}

impl StructureSnapshot {
    pub fn from_forest(forest: &Forest, root_ids: &[String]) -> Self {
        let pages = forest.records();
        Self {
            version: SNAPSHOT_VERSION,
            root_ids: root_ids.to_vec(),
            total_pages: pages.len(),
            pages,
        }
    }

    pub fn to_json(&self) -> ApplicationResult<String> {
        let mut json = serde_json::to_string_pretty(self).map_err(|e| ApplicationError::Decode {
            context: "structure snapshot".to_string(),
            message: e.to_string(),
        })?;
        json.push('\n');
        Ok(json)
    }

    /// SHA-256 of the serialized snapshot, hex encoded.
    pub fn fingerprint(&self) -> ApplicationResult<String> {
        let json = self.to_json()?;
        Ok(hex::encode(Sha256::digest(json.as_bytes())))
    }

    pub fn load(fs: &dyn FileSystem, path: &Path) -> ApplicationResult<Self> {
        let content = fs
            .read_to_string(path)
            .with_path_context("read structure snapshot", path)?;
        let snapshot: Self = serde_json::from_str(&content).with_decode_context(path)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ApplicationError::Decode {
                context: path.display().to_string(),
                message: format!("unsupported snapshot version {}", snapshot.version),
            });
        }
        Ok(snapshot)
    }

    pub fn save(&self, fs: &dyn FileSystem, path: &Path) -> ApplicationResult<()> {
        fs.ensure_parent(path)
            .with_path_context("create snapshot directory", path)?;
        fs.write(path, &self.to_json()?)
            .with_path_context("write structure snapshot", path)
    }
}

/// Render the Markdown index for a finished run.
///
/// Depth-first, children in input order; the output depends only on the
/// forest, the plan and the outcomes, so unchanged runs produce identical
/// bytes.
#[instrument(level = "debug", skip_all)]
pub fn render_index(forest: &Forest, plan: &PathPlan, report: &ExportReport) -> String {
    let mut out = String::new();
    out.push_str("# Export Structure\n\n");
    out.push_str("Hierarchical structure of the exported pages.\n\n");
    out.push_str("## Legend\n\n");
    let _ = writeln!(out, "- {ICON_PAGE} Regular Page");
    let _ = writeln!(out, "- {ICON_CONTAINER} Database Page");
    let _ = writeln!(out, "- {ICON_OK} Successfully Exported");
    let _ = writeln!(out, "- {ICON_FAILED} Export Failed");
    out.push('\n');
    let _ = writeln!(
        out,
        "{} of {} pages exported.\n",
        report.succeeded(),
        forest.len()
    );
    out.push_str("## Structure\n\n");

    for (_, depth, node) in forest.iter() {
        let indent = "  ".repeat(depth);
        let icon = if node.record.is_from_container {
            ICON_CONTAINER
        } else {
            ICON_PAGE
        };
        let title = escape_title(node.record.title());
        let outcome = report.get(node.id()).filter(|o| o.success);
        let link = outcome
            .and_then(|o| o.entry_file.clone())
            .or_else(|| outcome.and_then(|_| plan.entry_file(node.id())));

        match (outcome, link) {
            (Some(_), Some(link)) => {
                let _ = writeln!(out, "{indent}- {ICON_OK} {icon} [{title}](<{}>)", link_target(&link));
            }
            (Some(_), None) => {
                let _ = writeln!(out, "{indent}- {ICON_OK} {icon} {title}");
            }
            (None, _) => {
                let reason = report
                    .get(node.id())
                    .and_then(|o| o.error_kind)
                    .map(|k| format!(" ({k})"))
                    .unwrap_or_default();
                let _ = writeln!(out, "{indent}- {ICON_FAILED} {icon} {title}{reason}");
            }
        }
    }
    debug!(bytes = out.len(), "index rendered");
    out
}

/// Forward-slash link target regardless of platform.
fn link_target(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn escape_title(title: &str) -> String {
    let mut escaped = String::with_capacity(title.len());
    for c in title.chars() {
        if matches!(c, '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
