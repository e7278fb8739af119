//! Department and section reference data for the login form.

use crate::error::{AccessError, Result};
use crate::model::{entries, text, Department, Section};
use crate::store::{fetch_joined, RemoteStore};
use serde_json::Value;

/// Fetch departments and sections and nest each section under its department.
///
/// Both collections are requested concurrently; the merge runs only once
/// both have arrived. Any failure drops the whole result.
pub fn fetch_directory<S: RemoteStore + ?Sized>(store: &S) -> Result<Vec<Department>> {
    let mut fetched = fetch_joined(store, &["departments", "sections"]).map_err(|e| {
        tracing::error!("Directory fetch failed: {:#}", e);
        AccessError::Network("Failed to load selection data".to_string())
    })?;
    let sections = fetched.pop().flatten();
    let departments = fetched.pop().flatten();

    let directory = merge(departments, sections);
    tracing::debug!(departments = directory.len(), "Directory loaded");
    Ok(directory)
}

/// Join sections into departments by `departmentId`.
///
/// Without departments the result is empty whatever the sections hold.
/// Departments are ordered by key; sections keep key order too.
pub fn merge(departments: Option<Value>, sections: Option<Value>) -> Vec<Department> {
    let departments = entries(departments);
    if departments.is_empty() {
        return Vec::new();
    }

    let sections: Vec<Section> = entries(sections)
        .into_iter()
        .map(|(id, record)| Section {
            id,
            name: text(&record, "name").unwrap_or_default(),
            department_id: text(&record, "departmentId").unwrap_or_default(),
        })
        .collect();

    let mut merged: Vec<Department> = departments
        .into_iter()
        .map(|(id, record)| Department {
            sections: sections
                .iter()
                .filter(|s| s.department_id == id)
                .cloned()
                .collect(),
            name: text(&record, "name").unwrap_or_default(),
            id,
        })
        .collect();

    merged.sort_by(|a, b| a.id.cmp(&b.id));
    for dept in &mut merged {
        dept.sections.sort_by(|a, b| a.id.cmp(&b.id));
    }
    merged
}

/// Look up a department by id
pub fn find<'a>(directory: &'a [Department], id: &str) -> Option<&'a Department> {
    directory.iter().find(|d| d.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_merge_keeps_only_matching_sections() {
        let store = MemoryStore::default()
            .with("departments", json!({ "d1": { "name": "CS" } }))
            .with(
                "sections",
                json!({
                    "s1": { "name": "A", "departmentId": "d1" },
                    "s2": { "name": "B", "departmentId": "d2" }
                }),
            );

        let directory = fetch_directory(&store).unwrap();
        assert_eq!(directory.len(), 1);
        assert_eq!(directory[0].id, "d1");
        assert_eq!(directory[0].name, "CS");
        assert_eq!(directory[0].sections.len(), 1);
        assert_eq!(directory[0].sections[0].id, "s1");
        assert_eq!(directory[0].sections[0].name, "A");
    }

    #[test]
    fn test_no_departments_means_empty() {
        let store = MemoryStore::default().with(
            "sections",
            json!({ "s1": { "name": "A", "departmentId": "d1" } }),
        );
        assert!(fetch_directory(&store).unwrap().is_empty());

        let store = MemoryStore::default().with("departments", json!({}));
        assert!(fetch_directory(&store).unwrap().is_empty());
    }

    #[test]
    fn test_departments_without_sections() {
        let directory = merge(
            Some(json!({ "d2": { "name": "EE" }, "d1": { "name": "CS" } })),
            None,
        );
        assert_eq!(directory.len(), 2);
        assert_eq!(directory[0].id, "d1");
        assert!(directory.iter().all(|d| d.sections.is_empty()));
    }

    #[test]
    fn test_any_failure_is_network_error() {
        let store = MemoryStore::default()
            .with("departments", json!({ "d1": { "name": "CS" } }))
            .failing("sections");
        let err = fetch_directory(&store).unwrap_err();
        assert!(matches!(err, AccessError::Network(_)));
    }

    #[test]
    fn test_find() {
        let directory = merge(Some(json!({ "d1": { "name": "CS" } })), None);
        assert!(find(&directory, "d1").is_some());
        assert!(find(&directory, "d9").is_none());
    }
}
