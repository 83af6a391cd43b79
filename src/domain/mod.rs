//! Domain layer: entities and business logic
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod builder;
pub mod classifier;
pub mod entities;
pub mod error;
pub mod paths;
pub mod sanitize;

pub use arena::{Forest, TreeNode};
pub use builder::build_forest;
pub use classifier::{CategoryClassifier, ClassificationRule, DEFAULT_BUCKET};
pub use entities::*;
pub use error::DomainError;
pub use paths::{PathPlan, PathResolver};
pub use sanitize::sanitize;
