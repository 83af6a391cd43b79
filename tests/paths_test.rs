//! Tests for path resolution (PathResolver → PathPlan)

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use pagemirror::domain::{
    build_forest, CategoryClassifier, ClassificationRule, DocumentRecord, Forest, Layout,
    PathPlan, PathResolver,
};
use rstest::rstest;

fn rec(id: &str, title: &str, parent: Option<&str>) -> DocumentRecord {
    DocumentRecord::new(id, title, parent, 0)
}

fn resolve(forest: &Forest, layout: Layout) -> PathPlan {
    let classifier = CategoryClassifier::default();
    PathResolver::new(layout, &classifier, "README.md").resolve(forest)
}

fn dir(plan: &PathPlan, id: &str) -> PathBuf {
    plan.get(id).unwrap().to_path_buf()
}

#[test]
fn given_root_with_two_same_named_children_when_resolve_then_numbered_prefixes() {
    // Arrange
    let forest = build_forest(vec![
        rec("root", "Root", None),
        rec("c1", "Child A", Some("root")),
        rec("c2", "Child A", Some("root")),
    ])
    .unwrap();

    // Act
    let plan = resolve(&forest, Layout::Hierarchical);

    // Assert
    assert_eq!(dir(&plan, "root"), PathBuf::new());
    assert_eq!(dir(&plan, "c1"), PathBuf::from("01. Child A"));
    assert_eq!(dir(&plan, "c2"), PathBuf::from("02. Child A"));
    assert_eq!(plan.primary_root(), Some("root"));
}

#[test]
fn given_blank_titled_siblings_when_resolve_then_numbered_untitled() {
    // Arrange
    let forest = build_forest(vec![
        rec("root", "Root", None),
        rec("abcdef123456", "", Some("root")),
        rec("fedcba654321", "   ", Some("root")),
        rec("99887766aabb", "***", Some("root")),
    ])
    .unwrap();

    // Act
    let plan = resolve(&forest, Layout::Hierarchical);

    // Assert
    assert_eq!(dir(&plan, "abcdef123456"), PathBuf::from("01. Untitled"));
    assert_eq!(dir(&plan, "fedcba654321"), PathBuf::from("02. Untitled"));
    assert_eq!(dir(&plan, "99887766aabb"), PathBuf::from("99887766"));
}

#[test]
fn given_nested_pages_when_resolve_then_directories_mirror_hierarchy() {
    // Arrange
    let forest = build_forest(vec![
        rec("root", "Research Notebook", None),
        rec("w1", "Week 1: Setup", Some("root")),
        rec("n1", "Notes/Draft", Some("w1")),
    ])
    .unwrap();

    // Act
    let plan = resolve(&forest, Layout::Hierarchical);

    // Assert
    assert_eq!(dir(&plan, "w1"), PathBuf::from("Week 1 Setup"));
    assert_eq!(dir(&plan, "n1"), Path::new("Week 1 Setup").join("NotesDraft"));
    assert_eq!(
        plan.entry_file("n1"),
        Some(Path::new("Week 1 Setup").join("NotesDraft").join("README.md"))
    );
}

#[test]
fn given_case_variants_when_resolve_then_disambiguated() {
    // Arrange
    let forest = build_forest(vec![
        rec("root", "Root", None),
        rec("a", "notes", Some("root")),
        rec("b", "Notes", Some("root")),
        rec("c", "Other", Some("root")),
    ])
    .unwrap();

    // Act
    let plan = resolve(&forest, Layout::Hierarchical);

    // Assert
    assert_eq!(dir(&plan, "a"), PathBuf::from("01. notes"));
    assert_eq!(dir(&plan, "b"), PathBuf::from("02. Notes"));
    assert_eq!(dir(&plan, "c"), PathBuf::from("Other"));
}

#[rstest]
#[case::entry_file("README.md")]
#[case::index("INDEX.md")]
#[case::snapshot("structure.json")]
fn given_title_equal_to_reserved_name_when_resolve_then_prefixed(#[case] title: &str) {
    // Arrange
    let forest = build_forest(vec![
        rec("root", "Root", None),
        rec("a", title, Some("root")),
    ])
    .unwrap();

    // Act
    let plan = resolve(&forest, Layout::Hierarchical);

    // Assert
    assert_eq!(dir(&plan, "a"), PathBuf::from(format!("01. {title}")));
}

#[test]
fn given_orphans_and_extra_roots_when_resolve_then_placed_under_output_root() {
    // Arrange
    let forest = build_forest(vec![
        rec("root", "Root", None),
        rec("a", "Alpha", Some("root")),
        rec("row", "Alpha", Some("missing-db")).in_container(),
        rec("x", "Second Root", None),
    ])
    .unwrap();

    // Act
    let plan = resolve(&forest, Layout::Hierarchical);

    // Assert
    assert_eq!(dir(&plan, "root"), PathBuf::new());
    assert_eq!(dir(&plan, "a"), PathBuf::from("01. Alpha"));
    assert_eq!(dir(&plan, "row"), PathBuf::from("02. Alpha"));
    assert_eq!(dir(&plan, "x"), PathBuf::from("Second Root"));
}

#[test]
fn given_many_pages_when_resolve_then_every_node_has_distinct_path() {
    // Arrange
    let mut records = vec![rec("root", "Root", None)];
    for i in 0..20 {
        let title = if i % 3 == 0 { "Same" } else { "same" };
        records.push(rec(&format!("p{i}"), title, Some("root")));
        records.push(rec(&format!("q{i}"), "Child", Some(&format!("p{i}"))));
    }
    let forest = build_forest(records).unwrap();

    // Act
    let plan = resolve(&forest, Layout::Hierarchical);

    // Assert
    assert_eq!(plan.len(), forest.len());
    let distinct: HashSet<String> = plan
        .iter()
        .map(|(_, p)| p.to_string_lossy().to_lowercase())
        .collect();
    assert_eq!(distinct.len(), plan.len());
}

#[test]
fn given_same_forest_when_resolved_twice_then_identical_plans() {
    // Arrange
    let records = vec![
        rec("root", "Root", None),
        rec("a", "Dup", Some("root")),
        rec("b", "Dup", Some("root")),
        rec("c", "Leaf", Some("a")),
    ];
    let forest = build_forest(records.clone()).unwrap();
    let again = build_forest(records).unwrap();

    // Act
    let first = resolve(&forest, Layout::Hierarchical);
    let second = resolve(&again, Layout::Hierarchical);

    // Assert
    assert_eq!(first, second);
}

#[test]
fn given_classified_layout_when_resolve_then_top_level_grouped_and_numbered() {
    // Arrange
    let classifier = CategoryClassifier::new(
        vec![
            ClassificationRule::new("Weekly Summaries", &["week"]),
            ClassificationRule::new("Experiments & Validation", &["benchmark"]),
        ],
        "Misc",
    );
    let forest = build_forest(vec![
        rec("root", "Notebook", None),
        rec("w1", "Week 1", Some("root")),
        rec("b1", "Benchmark run", Some("root")),
        rec("w2", "Week 2", Some("root")),
        rec("o", "Random thoughts", Some("root")),
        rec("n", "Nested detail", Some("w2")),
    ])
    .unwrap();

    // Act
    let plan = PathResolver::new(Layout::Classified, &classifier, "README.md").resolve(&forest);

    // Assert
    assert_eq!(dir(&plan, "root"), PathBuf::new());
    assert_eq!(dir(&plan, "w1"), Path::new("Weekly Summaries").join("01. Week 1"));
    assert_eq!(dir(&plan, "w2"), Path::new("Weekly Summaries").join("02. Week 2"));
    assert_eq!(
        dir(&plan, "b1"),
        Path::new("Experiments and Validation").join("01. Benchmark run")
    );
    assert_eq!(dir(&plan, "o"), Path::new("Misc").join("01. Random thoughts"));
    assert_eq!(
        dir(&plan, "n"),
        Path::new("Weekly Summaries").join("02. Week 2").join("Nested detail")
    );
}

#[test]
fn given_empty_forest_when_resolve_then_empty_plan() {
    let forest = build_forest(Vec::new()).unwrap();
    let plan = resolve(&forest, Layout::Hierarchical);
    assert!(plan.is_empty());
    assert_eq!(plan.primary_root(), None);
}
