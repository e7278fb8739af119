//! Writes to the remote store: admin enrollment and attendance records.

use crate::error::{AccessError, Result};
use crate::model::Identity;
use crate::pass::AccessToken;
use crate::store::RemoteStore;
use serde_json::Value;

/// Register a student under `students/<rollNo>` (admin side).
///
/// Display names and the storage key are not written; they are derived
/// on login.
pub fn enroll<S: RemoteStore + ?Sized>(store: &S, student: &Identity) -> Result<Value> {
    let roll_no = student.roll_no.trim();
    if roll_no.is_empty() {
        return Err(AccessError::Validation(
            "A roll number is required to register a student".to_string(),
        ));
    }
    if roll_no.contains(['/', '.', '#', '$', '[', ']']) {
        return Err(AccessError::Validation(format!(
            "Roll number '{}' contains characters not allowed in a key",
            roll_no
        )));
    }

    let record = Identity {
        department_name: None,
        section_name: None,
        storage_key: None,
        registered_at: student
            .registered_at
            .clone()
            .or_else(|| Some(chrono::Utc::now().to_rfc3339())),
        ..student.clone()
    };
    let body = serde_json::to_value(&record)
        .map_err(|e| AccessError::Validation(format!("Invalid student record: {}", e)))?;

    store
        .put(&format!("students/{}", roll_no), &body)
        .map_err(|e| {
            tracing::error!("Registration failed: {:#}", e);
            AccessError::Network("Failed to register student".to_string())
        })?;
    tracing::info!(roll_no, "Student registered");
    Ok(body)
}

/// Append a scanned pass to the attendance collection
pub fn record_attendance<S: RemoteStore + ?Sized>(store: &S, token: &AccessToken) -> Result<()> {
    let body = serde_json::to_value(token)
        .map_err(|e| AccessError::State(format!("Invalid pass: {}", e)))?;
    store.post("attendance", &body).map_err(|e| {
        tracing::error!("Attendance write failed: {:#}", e);
        AccessError::Network("Failed to record attendance".to_string())
    })?;
    Ok(())
}
