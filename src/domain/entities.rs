//! Domain entities: core data structures

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

/// Title used when a document has none.
pub const UNTITLED: &str = "Untitled";

/// A single remote document as reported by the structure scan.
///
/// Field names follow the scanner's JSON schema. Decoding is strict: unknown
/// fields are rejected and `parent` must be present (it may be `null`).
/// `fromDatabase` is only emitted for pages living inside a database, so it
/// defaults to `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    #[serde(rename = "parent", deserialize_with = "required_nullable")]
    pub parent_id: Option<String>,
    pub level: u32,
    #[serde(rename = "fromDatabase", default)]
    pub is_from_container: bool,
}

/// Makes an `Option` field mandatory while still accepting `null`.
fn required_nullable<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
}

impl DocumentRecord {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        parent_id: Option<&str>,
        level: u32,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            parent_id: parent_id.map(str::to_string),
            level,
            is_from_container: false,
        }
    }

    /// Mark the record as living inside a container (database).
    pub fn in_container(mut self) -> Self {
        self.is_from_container = true;
        self
    }

    /// Display title, `"Untitled"` for blank titles.
    pub fn title(&self) -> &str {
        if self.title.trim().is_empty() {
            UNTITLED
        } else {
            &self.title
        }
    }
}

/// How top-level documents are laid out on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Directories mirror the parent links.
    #[default]
    Hierarchical,
    /// Top-level documents are grouped into numbered keyword buckets.
    Classified,
}

/// Lifecycle of one node during orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Pending,
    Exporting { attempt: u32 },
    Succeeded,
    Failed,
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Succeeded | NodeState::Failed)
    }

    /// Allowed transitions:
    /// `Pending -> Exporting`, `Exporting -> Exporting` (next attempt),
    /// `Exporting -> Succeeded | Failed` and `Pending -> Failed` (cancelled
    /// before dispatch).
    pub fn can_transition_to(&self, next: NodeState) -> bool {
        match (self, next) {
            (NodeState::Pending, NodeState::Exporting { attempt }) => attempt == 1,
            (NodeState::Pending, NodeState::Failed) => true,
            (NodeState::Exporting { attempt: a }, NodeState::Exporting { attempt: b }) => b == a + 1,
            (NodeState::Exporting { .. }, NodeState::Succeeded | NodeState::Failed) => true,
            _ => false,
        }
    }
}

/// Classification of a per-node failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The renderer reported failure or exited non-zero.
    Render,
    /// The attempt exceeded its wall-clock budget.
    Timeout,
    /// The renderer's output could not be decoded.
    Malformed,
    /// The node directory could not be prepared.
    Filesystem,
    /// The run was interrupted before the node finished.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Render => "render",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Malformed => "malformed",
            ErrorKind::Filesystem => "filesystem",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Final result for one exported node. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOutcome {
    pub node_id: String,
    pub success: bool,
    /// Node directory, relative to the output root.
    pub output_path: PathBuf,
    pub rendered_file_count: usize,
    /// File the index links to, relative to the output root.
    pub entry_file: Option<PathBuf>,
    pub attempts: u32,
    pub error_kind: Option<ErrorKind>,
    pub error_detail: Option<String>,
}

impl ExportOutcome {
    pub fn succeeded(
        node_id: impl Into<String>,
        output_path: PathBuf,
        rendered_file_count: usize,
        entry_file: Option<PathBuf>,
        attempts: u32,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            success: true,
            output_path,
            rendered_file_count,
            entry_file,
            attempts,
            error_kind: None,
            error_detail: None,
        }
    }

    pub fn failed(
        node_id: impl Into<String>,
        output_path: PathBuf,
        attempts: u32,
        kind: ErrorKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            success: false,
            output_path,
            rendered_file_count: 0,
            entry_file: None,
            attempts,
            error_kind: Some(kind),
            error_detail: Some(detail.into()),
        }
    }
}

/// Role of a file produced by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    #[serde(alias = "parent")]
    Primary,
    #[serde(alias = "child")]
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedFile {
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub path: PathBuf,
}

/// Per-page section of a renderer response (older renderers nest files here).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPage {
    #[serde(default)]
    pub files: Vec<RenderedFile>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Decoded renderer output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderResponse {
    pub success: bool,
    #[serde(default)]
    pub files: Vec<RenderedFile>,
    #[serde(default)]
    pub pages: Vec<RenderedPage>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RenderResponse {
    /// Files of the rendered document, from the flat list or the first page.
    pub fn files(&self) -> &[RenderedFile] {
        if !self.files.is_empty() {
            return &self.files;
        }
        self.pages.first().map(|p| p.files.as_slice()).unwrap_or(&[])
    }

    pub fn primary(&self) -> Option<&RenderedFile> {
        self.files().iter().find(|f| f.kind == FileKind::Primary)
    }

    /// Reason the render must be treated as failed, if any.
    pub fn failure_reason(&self) -> Option<String> {
        if !self.success {
            return Some(
                self.error
                    .clone()
                    .unwrap_or_else(|| "renderer reported failure".to_string()),
            );
        }
        self.pages.iter().find_map(|p| p.error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(NodeState::Pending, NodeState::Exporting { attempt: 1 }, true)]
    #[case(NodeState::Pending, NodeState::Exporting { attempt: 2 }, false)]
    #[case(NodeState::Pending, NodeState::Failed, true)]
    #[case(NodeState::Pending, NodeState::Succeeded, false)]
    #[case(NodeState::Exporting { attempt: 1 }, NodeState::Exporting { attempt: 2 }, true)]
    #[case(NodeState::Exporting { attempt: 2 }, NodeState::Succeeded, true)]
    #[case(NodeState::Succeeded, NodeState::Failed, false)]
    #[case(NodeState::Failed, NodeState::Exporting { attempt: 1 }, false)]
    fn given_state_when_transition_checked_then_only_forward_moves_allowed(
        #[case] from: NodeState,
        #[case] to: NodeState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn given_terminal_state_when_checked_then_no_transition_out() {
        for state in [NodeState::Succeeded, NodeState::Failed] {
            assert!(state.is_terminal());
            assert!(!state.can_transition_to(NodeState::Pending));
        }
        assert!(!NodeState::Exporting { attempt: 1 }.is_terminal());
    }

    #[test]
    fn given_blank_title_when_title_then_untitled() {
        let record = DocumentRecord::new("id", "   ", None, 0);
        assert_eq!(record.title(), UNTITLED);
    }

    #[test]
    fn given_page_level_error_when_failure_reason_then_reported() {
        let response: RenderResponse = serde_json::from_str(
            r#"{"success":true,"pages":[{"files":[],"error":"Could not find page"}]}"#,
        )
        .unwrap();
        assert_eq!(response.failure_reason().as_deref(), Some("Could not find page"));
        assert!(response.primary().is_none());
    }
}
