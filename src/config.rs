//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/pagemirror/pagemirror.toml`
//! 3. Local config: `<project_dir>/.pagemirror.toml`
//! 4. Legacy environment variables: `NOTION_TOKEN`, `NOTION_PAGE_IDS`
//!    (or `NOTION_PAGE_ID`), `OUTPUT_DIR`, `SEPARATE_CHILD_PAGES`
//! 5. Environment variables: `PAGEMIRROR_*` prefix, `__` for nesting

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::services::ExportOptions;
use crate::application::ApplicationError;
use crate::domain::classifier::default_rules;
use crate::domain::{CategoryClassifier, ClassificationRule, Layout, DEFAULT_BUCKET};

/// External renderer invocation.
///
/// Placeholders in `args`: `{token}`, `{id}` (dashes removed), `{output}`,
/// `{separate}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RenderConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            command: "node".into(),
            args: vec![
                "notion_export.js".into(),
                "{token}".into(),
                "{id}".into(),
                "{output}".into(),
                "{separate}".into(),
            ],
        }
    }
}

/// External structure scanner invocation.
///
/// Placeholders in `args`: `{token}`, `{root}` (dashes removed), `{recursive}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanConfig {
    pub command: String,
    pub args: Vec<String>,
    pub recursive: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            command: "node".into(),
            args: vec![
                "get_page_ids.js".into(),
                "{token}".into(),
                "{root}".into(),
                "{recursive}".into(),
            ],
            recursive: true,
        }
    }
}

/// Orchestration tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExportConfig {
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub concurrency: usize,
    pub max_diagnostic_len: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retries: 1,
            retry_delay_ms: 500,
            concurrency: 1,
            max_diagnostic_len: 500,
        }
    }
}

impl ExportConfig {
    pub fn options(&self) -> ExportOptions {
        ExportOptions {
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            retries: self.retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            concurrency: self.concurrency.max(1),
            max_diagnostic_len: self.max_diagnostic_len.max(1),
        }
    }
}

/// Keyword rules for the classified layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub default_bucket: String,
    pub rules: Vec<ClassificationRule>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            default_bucket: DEFAULT_BUCKET.into(),
            rules: default_rules(),
        }
    }
}

impl ClassifierConfig {
    pub fn classifier(&self) -> CategoryClassifier {
        CategoryClassifier::new(self.rules.clone(), self.default_bucket.clone())
    }
}

/// Raw settings for intermediate parsing (`None` = not specified, inherit).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub token: Option<String>,
    pub root_ids: Option<Vec<String>>,
    pub output_dir: Option<PathBuf>,
    pub separate_child_pages: Option<bool>,
    pub entry_file_name: Option<String>,
    pub layout: Option<Layout>,
    pub render: RawRenderConfig,
    pub scan: RawScanConfig,
    pub export: RawExportConfig,
    pub classifier: RawClassifierConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawRenderConfig {
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawScanConfig {
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub recursive: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawExportConfig {
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub max_diagnostic_len: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawClassifierConfig {
    pub default_bucket: Option<String>,
    pub rules: Option<Vec<ClassificationRule>>,
}

/// Unified configuration for pagemirror.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Integration token handed to the external tools
    pub token: Option<String>,
    /// Documents whose trees are exported
    pub root_ids: Vec<String>,
    /// Export destination (default: ./output)
    pub output_dir: PathBuf,
    /// Forwarded to the renderer as `{separate}`
    pub separate_child_pages: bool,
    /// Canonical entry file of every exported directory
    pub entry_file_name: String,
    pub layout: Layout,
    pub render: RenderConfig,
    pub scan: ScanConfig,
    pub export: ExportConfig,
    pub classifier: ClassifierConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            token: None,
            root_ids: Vec::new(),
            output_dir: PathBuf::from("./output"),
            separate_child_pages: true,
            entry_file_name: "README.md".into(),
            layout: Layout::default(),
            render: RenderConfig::default(),
            scan: ScanConfig::default(),
            export: ExportConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

/// Get the XDG config directory for pagemirror.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "pagemirror").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("pagemirror.toml"))
}

/// Get the path to the local config file in a project directory.
pub fn local_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(".pagemirror.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

/// Split a comma and/or whitespace separated id list.
pub fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Expand `~`, `$VAR` and `${VAR}`; unresolvable input is returned unchanged.
pub fn expand_env_vars(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Settings {
    /// Expand shell variables and tilde in path-like fields.
    fn expand_paths(&mut self) {
        let expanded = expand_env_vars(self.output_dir.to_string_lossy().as_ref());
        self.output_dir = PathBuf::from(expanded);
        self.render.command = expand_env_vars(&self.render.command);
        self.scan.command = expand_env_vars(&self.scan.command);
    }

    /// Merge overlay config onto self (base). Specified values replace,
    /// including arrays.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            token: overlay.token.clone().or_else(|| self.token.clone()),
            root_ids: overlay
                .root_ids
                .clone()
                .unwrap_or_else(|| self.root_ids.clone()),
            output_dir: overlay
                .output_dir
                .clone()
                .unwrap_or_else(|| self.output_dir.clone()),
            separate_child_pages: overlay
                .separate_child_pages
                .unwrap_or(self.separate_child_pages),
            entry_file_name: overlay
                .entry_file_name
                .clone()
                .unwrap_or_else(|| self.entry_file_name.clone()),
            layout: overlay.layout.unwrap_or(self.layout),
            render: RenderConfig {
                command: overlay
                    .render
                    .command
                    .clone()
                    .unwrap_or_else(|| self.render.command.clone()),
                args: overlay
                    .render
                    .args
                    .clone()
                    .unwrap_or_else(|| self.render.args.clone()),
            },
            scan: ScanConfig {
                command: overlay
                    .scan
                    .command
                    .clone()
                    .unwrap_or_else(|| self.scan.command.clone()),
                args: overlay
                    .scan
                    .args
                    .clone()
                    .unwrap_or_else(|| self.scan.args.clone()),
                recursive: overlay.scan.recursive.unwrap_or(self.scan.recursive),
            },
            export: ExportConfig {
                timeout_secs: overlay.export.timeout_secs.unwrap_or(self.export.timeout_secs),
                retries: overlay.export.retries.unwrap_or(self.export.retries),
                retry_delay_ms: overlay
                    .export
                    .retry_delay_ms
                    .unwrap_or(self.export.retry_delay_ms),
                concurrency: overlay.export.concurrency.unwrap_or(self.export.concurrency),
                max_diagnostic_len: overlay
                    .export
                    .max_diagnostic_len
                    .unwrap_or(self.export.max_diagnostic_len),
            },
            classifier: ClassifierConfig {
                default_bucket: overlay
                    .classifier
                    .default_bucket
                    .clone()
                    .unwrap_or_else(|| self.classifier.default_bucket.clone()),
                rules: overlay
                    .classifier
                    .rules
                    .clone()
                    .unwrap_or_else(|| self.classifier.rules.clone()),
            },
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `project_dir` - Optional directory holding a local `.pagemirror.toml`
    pub fn load(project_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        // 1. Start with defaults
        let mut current = Self::default();

        // 2. Global config
        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.merge_with(&raw);
            }
        }

        // 3. Local config
        if let Some(dir) = project_dir {
            let local_path = local_config_path(dir);
            if local_path.exists() {
                let raw = load_raw_settings(&local_path)?;
                current = current.merge_with(&raw);
            }
        }

        // 4. Legacy variables, then PAGEMIRROR_* (explicit override)
        current = current.merge_with(&Self::legacy_env_overrides(|key| std::env::var(key).ok()));
        current = Self::apply_env_overrides(current)?;

        current.expand_paths();

        Ok(current)
    }

    /// Variables understood by the original export scripts.
    fn legacy_env_overrides(lookup: impl Fn(&str) -> Option<String>) -> RawSettings {
        RawSettings {
            token: lookup("NOTION_TOKEN").filter(|t| !t.trim().is_empty()),
            root_ids: lookup("NOTION_PAGE_IDS")
                .or_else(|| lookup("NOTION_PAGE_ID"))
                .map(|raw| parse_id_list(&raw))
                .filter(|ids| !ids.is_empty()),
            output_dir: lookup("OUTPUT_DIR").map(PathBuf::from),
            separate_child_pages: lookup("SEPARATE_CHILD_PAGES").and_then(|v| parse_bool(&v)),
            ..RawSettings::default()
        }
    }

    /// Apply PAGEMIRROR_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let builder = Config::builder().add_source(
            Environment::with_prefix("PAGEMIRROR")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("root_ids")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_err)?;

        if let Ok(val) = config.get_string("token") {
            settings.token = Some(val);
        }
        if let Ok(val) = config.get::<Vec<String>>("root_ids") {
            settings.root_ids = val.iter().flat_map(|v| parse_id_list(v)).collect();
        }
        if let Ok(val) = config.get_string("output_dir") {
            settings.output_dir = PathBuf::from(val);
        }
        if let Ok(val) = config.get_bool("separate_child_pages") {
            settings.separate_child_pages = val;
        }
        if let Ok(val) = config.get_string("entry_file_name") {
            settings.entry_file_name = val;
        }
        if let Ok(val) = config.get::<Layout>("layout") {
            settings.layout = val;
        }
        if let Ok(val) = config.get_string("render.command") {
            settings.render.command = val;
        }
        if let Ok(val) = config.get_string("scan.command") {
            settings.scan.command = val;
        }
        if let Ok(val) = config.get_bool("scan.recursive") {
            settings.scan.recursive = val;
        }
        if let Ok(val) = config.get::<u64>("export.timeout_secs") {
            settings.export.timeout_secs = val;
        }
        if let Ok(val) = config.get::<u32>("export.retries") {
            settings.export.retries = val;
        }
        if let Ok(val) = config.get::<u64>("export.retry_delay_ms") {
            settings.export.retry_delay_ms = val;
        }
        if let Ok(val) = config.get::<usize>("export.concurrency") {
            settings.export.concurrency = val;
        }
        if let Ok(val) = config.get::<usize>("export.max_diagnostic_len") {
            settings.export.max_diagnostic_len = val;
        }

        Ok(settings)
    }

    /// Token and root ids, or a configuration error naming what is missing.
    pub fn credentials(&self) -> Result<(&str, &[String]), ApplicationError> {
        let token = self
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ApplicationError::Config {
                message: "token is required (set NOTION_TOKEN or `token` in .pagemirror.toml)"
                    .into(),
            })?;
        if self.root_ids.is_empty() {
            return Err(ApplicationError::Config {
                message: "at least one root id is required (set NOTION_PAGE_IDS or `root_ids`)"
                    .into(),
            });
        }
        let entry = self.entry_file_name.trim();
        if entry.is_empty() || entry.chars().all(|c| c == '.') || entry.contains(['/', '\\']) {
            return Err(ApplicationError::Config {
                message: format!("invalid entry_file_name: {:?}", self.entry_file_name),
            });
        }
        Ok((token, &self.root_ids))
    }

    /// Copy with the token masked, for display.
    pub fn redacted(&self) -> Self {
        let mut shown = self.clone();
        if shown.token.is_some() {
            shown.token = Some("********".into());
        }
        shown
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# pagemirror configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/pagemirror/pagemirror.toml
#   Local:  <project>/.pagemirror.toml
#   Env:    NOTION_TOKEN, NOTION_PAGE_IDS, OUTPUT_DIR, SEPARATE_CHILD_PAGES
#   Env:    PAGEMIRROR_* (e.g. PAGEMIRROR_EXPORT__TIMEOUT_SECS=60)

# Integration token (prefer the NOTION_TOKEN environment variable)
# token = "secret_..."

# Root documents to export
# root_ids = ["1f2e3d4c5b6a79880123456789abcdef"]

# output_dir = "./output"
# separate_child_pages = true
# entry_file_name = "README.md"

# "hierarchical" mirrors parent links, "classified" groups top-level pages
# into keyword buckets
# layout = "hierarchical"

[render]
# command = "node"
# args = ["notion_export.js", "{token}", "{id}", "{output}", "{separate}"]

[scan]
# command = "node"
# args = ["get_page_ids.js", "{token}", "{root}", "{recursive}"]
# recursive = true

[export]
# timeout_secs = 30
# retries = 1
# retry_delay_ms = 500
# concurrency = 1
# max_diagnostic_len = 500

[classifier]
# default_bucket = "Uncategorized"
# [[classifier.rules]]
# bucket = "Weekly Summaries"
# keywords = ["week", "summary"]
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
