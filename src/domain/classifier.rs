//! Keyword-based bucket classification.
//!
//! Rules are evaluated in order; the first rule with a keyword contained in
//! the lower-cased title wins. Titles matching nothing land in the default
//! bucket.

use serde::{Deserialize, Serialize};

/// Bucket for titles no rule matches.
pub const DEFAULT_BUCKET: &str = "Uncategorized";

/// One `keywords -> bucket` rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub bucket: String,
    pub keywords: Vec<String>,
}

impl ClassificationRule {
    pub fn new(bucket: &str, keywords: &[&str]) -> Self {
        Self {
            bucket: bucket.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn matches(&self, lowered_title: &str) -> bool {
        self.keywords
            .iter()
            .any(|k| !k.is_empty() && lowered_title.contains(&k.to_lowercase()))
    }
}

/// Ordered rule list plus catch-all bucket. Stateless: the same title always
/// yields the same bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryClassifier {
    rules: Vec<ClassificationRule>,
    default_bucket: String,
}

impl Default for CategoryClassifier {
    fn default() -> Self {
        Self::new(default_rules(), DEFAULT_BUCKET)
    }
}

impl CategoryClassifier {
    pub fn new(rules: Vec<ClassificationRule>, default_bucket: impl Into<String>) -> Self {
        let default_bucket = default_bucket.into();
        let default_bucket = if default_bucket.trim().is_empty() {
            DEFAULT_BUCKET.to_string()
        } else {
            default_bucket
        };
        Self {
            rules,
            default_bucket,
        }
    }

    pub fn classify(&self, title: &str) -> &str {
        let lowered = title.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.bucket.as_str())
            .unwrap_or(&self.default_bucket)
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn default_bucket(&self) -> &str {
        &self.default_bucket
    }
}

/// Research-notebook buckets the exporter ships with.
pub fn default_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::new(
            "Activity Log",
            &[
                "abrupt", "cancel", "convert", "ukb", "pdf", "download", "extract", "final",
                "collection", "normalis",
            ],
        ),
        ClassificationRule::new(
            "Supervisor Meetings",
            &[
                "introduction", "rag discussion", "refocus", "hypothsis", "proposal",
                "supervisor",
            ],
        ),
        ClassificationRule::new(
            "Experiments & Validation",
            &["benchmark", "test", "experiment", "validation"],
        ),
        ClassificationRule::new(
            "Literature Review",
            &[
                "contextual", "retrieval", "survey", "biobank", "monarch", "paper", "literature",
            ],
        ),
        ClassificationRule::new(
            "Issues & Debugging",
            &[
                "error", "metadata", "threadripper", "trouble", "infected", "debug", "issue",
            ],
        ),
        ClassificationRule::new("Weekly Summaries", &["week", "summary", "weekly"]),
        ClassificationRule::new(
            "Code Implementations",
            &[
                "faiss", "langchain", "llama", "milvus", "pytorch", "transform", "weaviate",
                "pipeline", "code",
            ],
        ),
        ClassificationRule::new(
            "System Architecture & Infrastructure",
            &[
                "docker", "python", "roocode", "ubuntu", "vs code", "workstation", "gpu",
                "system", "infrastructure",
            ],
        ),
        ClassificationRule::new("Prompts & Templates", &["synonym", "prompt", "template"]),
        ClassificationRule::new("Research Pages", &["research", "method", "overview", "architecture"]),
        ClassificationRule::new("Progress Tracking", &["progress", "tracking"]),
    ]
}
