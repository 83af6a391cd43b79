//! pagemirror: mirror a tree of remote pages into a Markdown directory
//! hierarchy with a navigable index.
//!
//! Layers, innermost first: `domain` (tree building, path planning),
//! `application` (export orchestration, index, metadata), `infrastructure`
//! (filesystem and external tool adapters, wiring) and `cli`.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
