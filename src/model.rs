//! Records exchanged with the remote store and kept in the session.
//!
//! The remote collections are JSON objects keyed by opaque ids. Student
//! records written over the years do not agree on field names, so reads go
//! through [`aliased`] instead of a strict serde schema.

use crate::error::{AccessError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Alternate field names for the roll number, most preferred first.
pub const ROLL_NO_FIELDS: &[&str] = &["rollNo", "id"];
/// Alternate field names for the department id.
pub const DEPT_ID_FIELDS: &[&str] = &["deptId", "departmentId"];
/// Alternate field names for the section id.
pub const SEC_ID_FIELDS: &[&str] = &["secId", "sectionId"];

/// A registered student as stored in the session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Identity {
    pub roll_no: String,
    pub name: String,
    pub father_name: String,
    pub email: String,
    pub phone: String,
    pub dept_id: String,
    pub sec_id: String,
    /// Resolved department display name
    #[serde(rename = "department", skip_serializing_if = "Option::is_none")]
    pub department_name: Option<String>,
    /// Resolved section display name
    #[serde(rename = "section", skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    /// Key of the record in the students collection
    #[serde(rename = "firebaseKey", skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<String>,
}

impl Identity {
    /// Build an identity from a raw student record, applying field aliases.
    pub fn from_record(key: &str, record: &Map<String, Value>) -> Self {
        Self {
            roll_no: aliased(record, ROLL_NO_FIELDS).unwrap_or_default(),
            name: text(record, "name").unwrap_or_default(),
            father_name: text(record, "fatherName").unwrap_or_default(),
            email: text(record, "email").unwrap_or_default(),
            phone: text(record, "phone").unwrap_or_default(),
            dept_id: aliased(record, DEPT_ID_FIELDS).unwrap_or_default(),
            sec_id: aliased(record, SEC_ID_FIELDS).unwrap_or_default(),
            department_name: None,
            section_name: None,
            storage_key: Some(key.to_string()),
            registered_at: text(record, "registeredAt"),
        }
    }
}

/// A section of a department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub name: String,
    pub department_id: String,
}

/// A department with the sections that belong to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: String,
    pub name: String,
    pub sections: Vec<Section>,
}

/// Details submitted by the login form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub name: String,
    pub roll_no: String,
    pub father_name: String,
    pub email: String,
    pub phone: String,
    pub dept_id: String,
    pub sec_id: String,
}

impl Credentials {
    /// Reject the form when any field is blank. Nothing is sent in that case.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("name", &self.name),
            ("roll number", &self.roll_no),
            ("father's name", &self.father_name),
            ("email", &self.email),
            ("phone", &self.phone),
            ("department", &self.dept_id),
            ("section", &self.sec_id),
        ];
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(label, _)| *label)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AccessError::Validation(format!(
                "Please fill in all required fields (missing: {})",
                missing.join(", ")
            )))
        }
    }
}

/// Convert a collection response into `(key, record)` pairs.
///
/// `null`, non-object bodies and non-object entries yield nothing.
pub fn entries(collection: Option<Value>) -> Vec<(String, Map<String, Value>)> {
    match collection {
        Some(Value::Object(map)) => map
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::Object(record) => Some((key, record)),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// A string field; non-strings count as absent.
pub fn text(record: &Map<String, Value>, field: &str) -> Option<String> {
    record.get(field).and_then(Value::as_str).map(str::to_string)
}

/// First non-empty string among `fields`.
pub fn aliased(record: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|field| record.get(*field).and_then(Value::as_str))
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Display name of the record stored under `key`.
pub fn name_of(collection: Option<&Value>, key: &str) -> Option<String> {
    collection
        .and_then(|c| c.get(key))
        .and_then(|record| record.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_aliased_prefers_first_non_empty() {
        let r = record(json!({ "deptId": "", "departmentId": "d2" }));
        assert_eq!(aliased(&r, DEPT_ID_FIELDS).as_deref(), Some("d2"));

        let r = record(json!({ "deptId": "d1", "departmentId": "d2" }));
        assert_eq!(aliased(&r, DEPT_ID_FIELDS).as_deref(), Some("d1"));

        let r = record(json!({ "deptId": 7 }));
        assert_eq!(aliased(&r, DEPT_ID_FIELDS), None);
    }

    #[test]
    fn test_entries_handles_null_and_objects() {
        assert!(entries(None).is_empty());
        assert!(entries(Some(Value::Null)).is_empty());

        let list = entries(Some(json!({ "a": { "name": "x" }, "b": 3 })));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].0, "a");
    }

    #[test]
    fn test_identity_from_record_uses_aliases() {
        let r = record(json!({
            "id": "R1",
            "name": "Asha",
            "fatherName": "Ravi",
            "email": "a@x.edu",
            "phone": "555",
            "departmentId": "d1",
            "sectionId": "s1"
        }));
        let identity = Identity::from_record("key1", &r);
        assert_eq!(identity.roll_no, "R1");
        assert_eq!(identity.dept_id, "d1");
        assert_eq!(identity.sec_id, "s1");
        assert_eq!(identity.storage_key.as_deref(), Some("key1"));
    }

    #[test]
    fn test_identity_serializes_with_store_field_names() {
        let identity = Identity {
            roll_no: "R1".to_string(),
            department_name: Some("CS".to_string()),
            storage_key: Some("k".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&identity).unwrap();
        assert_eq!(value["rollNo"], "R1");
        assert_eq!(value["department"], "CS");
        assert_eq!(value["firebaseKey"], "k");
        assert!(value.get("section").is_none());
    }

    #[test]
    fn test_credentials_validate_lists_missing() {
        let creds = Credentials {
            name: "Asha".to_string(),
            roll_no: " ".to_string(),
            ..Default::default()
        };
        let err = creds.validate().unwrap_err();
        match err {
            AccessError::Validation(msg) => {
                assert!(msg.contains("roll number"));
                assert!(msg.contains("section"));
                assert!(!msg.contains("missing: name"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_name_of_missing_is_none() {
        let depts = json!({ "d1": { "name": "CS" } });
        assert_eq!(name_of(Some(&depts), "d1").as_deref(), Some("CS"));
        assert_eq!(name_of(Some(&depts), "d9"), None);
        assert_eq!(name_of(None, "d1"), None);
    }
}
