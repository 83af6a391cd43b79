//! Application services
//!
//! Concrete service implementations that orchestrate domain logic.
//! Services depend on I/O boundary traits (FileSystem, Renderer, StructureScanner)
//! but are themselves concrete structs, not traits.

mod export;
pub mod index;
pub mod metadata;
pub mod orchestrator;

pub use export::{ExportRequest, ExportService, ExportStatus, ExportSummary, ScanResult};
pub use index::{render_index, StructureSnapshot};
pub use metadata::{ExportMetadata, HistoryEntry};
pub use orchestrator::{ExportOptions, ExportOrchestrator, ExportReport, ProgressFn};
