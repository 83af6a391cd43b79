//! External tool adapters: renderer and structure scanner run as child
//! processes that print one JSON document on stdout.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::domain::{DocumentRecord, RenderResponse};
use crate::infrastructure::traits::{ProcessError, Renderer, StructureScanner};

/// Program plus argument template with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Substitute placeholders in every argument.
    pub fn expand(&self, vars: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (name, value)| {
                    acc.replace(&format!("{{{name}}}"), value)
                })
            })
            .collect()
    }

    /// Run to completion; stdout on success, stderr (or stdout) as failure text.
    async fn run(&self, args: &[String]) -> Result<String, ProcessError> {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProcessError::Spawn {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(ProcessError::Failed(format!("{} ({})", detail, output.status)));
        }
        Ok(stdout)
    }
}

/// Document ids are passed to the tools without dashes.
pub fn compact_id(id: &str) -> String {
    id.replace('-', "")
}

/// Decode the JSON document printed on stdout.
///
/// Tools may print progress lines before the result, so the last non-empty
/// line is tried when the whole output does not parse.
fn decode_stdout<T: for<'de> Deserialize<'de>>(stdout: &str) -> Result<T, ProcessError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(ProcessError::Malformed("empty output".to_string()));
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(value),
        Err(first) => trimmed
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .and_then(|last| serde_json::from_str(last).ok())
            .ok_or_else(|| ProcessError::Malformed(first.to_string())),
    }
}

/// Renderer backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    template: CommandTemplate,
    token: String,
    separate_child_pages: bool,
}

impl CommandRenderer {
    pub fn new(template: CommandTemplate, token: impl Into<String>, separate_child_pages: bool) -> Self {
        Self {
            template,
            token: token.into(),
            separate_child_pages,
        }
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    #[instrument(level = "debug", skip(self), fields(program = %self.template.program))]
    async fn render(
        &self,
        document_id: &str,
        output_dir: &Path,
    ) -> Result<RenderResponse, ProcessError> {
        let id = compact_id(document_id);
        let output = output_dir.to_string_lossy();
        let separate = self.separate_child_pages.to_string();
        let args = self.template.expand(&[
            ("token", self.token.as_str()),
            ("id", id.as_str()),
            ("output", output.as_ref()),
            ("separate", separate.as_str()),
        ]);

        let stdout = self.template.run(&args).await?;
        let response: RenderResponse = decode_stdout(&stdout)?;
        debug!(files = response.files().len(), success = response.success, "render finished");
        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct ScanEnvelope {
    success: bool,
    #[serde(default)]
    pages: Vec<DocumentRecord>,
    #[serde(default)]
    error: Option<String>,
}

/// Structure scanner backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandScanner {
    template: CommandTemplate,
    token: String,
}

impl CommandScanner {
    pub fn new(template: CommandTemplate, token: impl Into<String>) -> Self {
        Self {
            template,
            token: token.into(),
        }
    }
}

#[async_trait]
impl StructureScanner for CommandScanner {
    #[instrument(level = "debug", skip(self), fields(program = %self.template.program))]
    async fn scan(
        &self,
        root_id: &str,
        recursive: bool,
    ) -> Result<Vec<DocumentRecord>, ProcessError> {
        let root = compact_id(root_id);
        let recursive = recursive.to_string();
        let args = self.template.expand(&[
            ("token", self.token.as_str()),
            ("root", root.as_str()),
            ("recursive", recursive.as_str()),
        ]);

        let stdout = self.template.run(&args).await?;
        let envelope: ScanEnvelope = decode_stdout(&stdout)?;
        if !envelope.success {
            return Err(ProcessError::Failed(
                envelope
                    .error
                    .unwrap_or_else(|| "scanner reported failure".to_string()),
            ));
        }
        debug!(pages = envelope.pages.len(), "scan finished");
        Ok(envelope.pages)
    }
}
