//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::sync::Arc;

use crate::application::services::ExportService;
use crate::config::Settings;
use crate::infrastructure::process::{CommandRenderer, CommandScanner, CommandTemplate};
use crate::infrastructure::traits::{FileSystem, RealFileSystem, Renderer, StructureScanner};

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    /// Structure scanner (external tool)
    pub scanner: Arc<dyn StructureScanner>,

    /// Document renderer (external tool)
    pub renderer: Arc<dyn Renderer>,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    ///
    /// A missing token is not an error here; commands that need one fail
    /// their pre-flight check instead.
    pub fn new(settings: Settings) -> Self {
        let token = settings.token.clone().unwrap_or_default();
        let scanner = CommandScanner::new(
            CommandTemplate::new(settings.scan.command.clone(), settings.scan.args.clone()),
            token.clone(),
        );
        let renderer = CommandRenderer::new(
            CommandTemplate::new(settings.render.command.clone(), settings.render.args.clone()),
            token,
            settings.separate_child_pages,
        );
        Self::with_deps(
            settings,
            Arc::new(RealFileSystem),
            Arc::new(scanner),
            Arc::new(renderer),
        )
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        fs: Arc<dyn FileSystem>,
        scanner: Arc<dyn StructureScanner>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let settings = Arc::new(settings);

        Self {
            settings,
            fs,
            scanner,
            renderer,
        }
    }

    /// Export service over the configured output directory.
    pub fn export_service(&self) -> ExportService {
        ExportService::new(
            self.settings.clone(),
            self.fs.clone(),
            self.scanner.clone(),
            self.renderer.clone(),
        )
    }
}
