//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};

use crate::domain::Layout;

/// Mirror a tree of remote pages into a Markdown directory hierarchy
#[derive(Parser, Debug)]
#[command(name = "pagemirror")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output (repeat for more: -d info, -dd debug, -ddd trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub debug: u8,

    /// Project directory holding .pagemirror.toml (default: cwd)
    #[arg(short = 'C', long, global = true, value_hint = ValueHint::DirPath)]
    pub project_dir: Option<PathBuf>,

    /// Output directory (overrides configuration)
    #[arg(short, long, global = true, value_hint = ValueHint::DirPath)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover the page hierarchy and save structure.json
    Scan,

    /// Export pages to Markdown
    Export(ExportArgs),

    /// Scan, then export
    Full {
        /// Remove the output directory first
        #[arg(long)]
        clean: bool,

        /// Directory layout for top-level pages
        #[arg(long, value_enum)]
        layout: Option<LayoutArg>,
    },

    /// Show export status and history
    Status,

    /// Delete the output directory
    Clean {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct ExportArgs {
    /// Remove the output directory first
    #[arg(long)]
    pub clean: bool,

    /// Scan even if structure.json exists
    #[arg(long)]
    pub scan_first: bool,

    /// Directory layout for top-level pages
    #[arg(long, value_enum)]
    pub layout: Option<LayoutArg>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutArg {
    /// Directories mirror parent links
    Hierarchical,
    /// Top-level pages grouped into keyword buckets
    Classified,
}

impl From<LayoutArg> for Layout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Hierarchical => Layout::Hierarchical,
            LayoutArg::Classified => Layout::Classified,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective configuration (token masked)
    Show,
    /// Create config file with template
    Init {
        /// Create in ~/.config/pagemirror instead of the project directory
        #[arg(short, long)]
        global: bool,
    },
    /// Show config file locations
    Path,
}
