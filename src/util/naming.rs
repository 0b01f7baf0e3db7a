//! Deterministic identifiers for sequence children and generated sub-graphs

/// Identifier of the `ordinal`-th child of a sequence (`fetch-2`)
///
/// Used as the resume marker, so it must not depend on anything but the
/// document.
pub fn child_id(name: &str, ordinal: usize) -> String {
    format!("{name}-{ordinal}")
}

/// Name of a sub-graph generated for a composite task
///
/// `child_graph_name("fork", "main", "race", Some("left"))` → `fork_main_race_left`.
/// Sibling names are unique and the parent name is unique, so the result is too.
pub fn child_graph_name(kind: &str, parent: &str, task: &str, key: Option<&str>) -> String {
    match key {
        Some(key) => format!("{kind}_{parent}_{task}_{key}"),
        None => format!("{kind}_{parent}_{task}"),
    }
}
