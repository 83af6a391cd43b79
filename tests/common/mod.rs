//! Scripted in-process stand-ins for the external tools.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use pagemirror::domain::{DocumentRecord, FileKind, RenderResponse, RenderedFile};
use pagemirror::infrastructure::traits::{ProcessError, Renderer, StructureScanner};

/// What the fake renderer does for one document.
#[derive(Debug, Clone)]
pub enum Script {
    /// Write `<file_name>` as the primary file.
    Write(String),
    /// Fail every attempt with this message.
    Fail(String),
    /// Output that cannot be decoded.
    Malformed(String),
    /// Fail the first attempt, then write `<id>.md`.
    FailOnce,
    /// Never finish.
    Hang,
    /// Request cancellation, then never finish.
    CancelAndHang,
}

pub struct FakeRenderer {
    scripts: HashMap<String, Script>,
    delay: Duration,
    calls: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    cancel: Option<watch::Sender<bool>>,
}

impl FakeRenderer {
    /// Every document not scripted otherwise writes `<id>.md`.
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            delay: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            cancel: None,
        }
    }

    pub fn script(mut self, id: &str, script: Script) -> Self {
        self.scripts.insert(id.to_string(), script);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_cancel(mut self, cancel: watch::Sender<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn calls(&self, id: &str) -> u32 {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn write_primary(dir: &Path, file_name: &str) -> Result<RenderResponse, ProcessError> {
        let path: PathBuf = dir.join(file_name);
        std::fs::write(&path, format!("# {file_name}\n"))
            .map_err(|e| ProcessError::Failed(e.to_string()))?;
        Ok(RenderResponse {
            success: true,
            files: vec![RenderedFile {
                kind: FileKind::Primary,
                path,
            }],
            pages: Vec::new(),
            error: None,
        })
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(
        &self,
        document_id: &str,
        output_dir: &Path,
    ) -> Result<RenderResponse, ProcessError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(document_id.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let default = Script::Write(format!("{document_id}.md"));
        match self.scripts.get(document_id).unwrap_or(&default) {
            Script::Write(name) => Self::write_primary(output_dir, name),
            Script::Fail(message) => Err(ProcessError::Failed(message.clone())),
            Script::Malformed(message) => Err(ProcessError::Malformed(message.clone())),
            Script::FailOnce if attempt == 1 => Err(ProcessError::Failed("flaky".into())),
            Script::FailOnce => Self::write_primary(output_dir, &format!("{document_id}.md")),
            Script::Hang => std::future::pending().await,
            Script::CancelAndHang => {
                if let Some(cancel) = &self.cancel {
                    let _ = cancel.send(true);
                }
                std::future::pending().await
            }
        }
    }
}

/// Scanner returning fixed records per root, or failing for unknown roots.
pub struct FakeScanner {
    pages: HashMap<String, Vec<DocumentRecord>>,
    calls: AtomicUsize,
}

impl FakeScanner {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn root(mut self, root: &str, records: Vec<DocumentRecord>) -> Self {
        self.pages.insert(root.to_string(), records);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StructureScanner for FakeScanner {
    async fn scan(
        &self,
        root_id: &str,
        _recursive: bool,
    ) -> Result<Vec<DocumentRecord>, ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(root_id)
            .cloned()
            .ok_or_else(|| ProcessError::Failed(format!("page {root_id} not found")))
    }
}

pub fn rec(id: &str, title: &str, parent: Option<&str>) -> DocumentRecord {
    DocumentRecord::new(id, title, parent, 0)
}
