//! Student login: match submitted details against the students collection.
//!
//! Every attempt fetches the three collections in full and scans them
//! linearly. There is no index or cache; the collections are small.

use crate::error::{AccessError, Result};
use crate::model::{entries, name_of, Credentials, Identity};
use crate::session::SessionStore;
use crate::store::{fetch_joined, RemoteStore};

/// Verify `creds` and, on a unique match, store the enriched identity in
/// the session. The session is untouched on any failure.
pub fn verify<S: RemoteStore + ?Sized>(
    store: &S,
    session: &mut SessionStore,
    creds: &Credentials,
) -> Result<Identity> {
    creds.validate()?;

    let mut fetched = fetch_joined(store, &["students", "departments", "sections"]).map_err(|e| {
        tracing::error!("Login fetch failed: {:#}", e);
        AccessError::Network("Login failed".to_string())
    })?;
    let sections = fetched.pop().flatten();
    let departments = fetched.pop().flatten();
    let students = entries(fetched.pop().flatten());

    if students.is_empty() {
        return Err(AccessError::NotFound(
            "No students registered in the system".to_string(),
        ));
    }

    let mut found = students
        .iter()
        .map(|(key, record)| Identity::from_record(key, record))
        .filter(|candidate| matches(candidate, creds));

    let mut identity = match (found.next(), found.next()) {
        (Some(identity), None) => identity,
        (None, _) => {
            tracing::info!(roll_no = %creds.roll_no, "No matching student");
            return Err(AccessError::NotFound(
                "Login failed. Please verify your details.".to_string(),
            ));
        }
        (Some(_), Some(_)) => {
            tracing::warn!(roll_no = %creds.roll_no, "Several students match the same details");
            return Err(AccessError::NotFound(
                "These details match more than one registration. Contact administration."
                    .to_string(),
            ));
        }
    };

    identity.department_name = name_of(departments.as_ref(), &identity.dept_id);
    identity.section_name = name_of(sections.as_ref(), &identity.sec_id);

    session
        .set(identity.clone())
        .map_err(|e| AccessError::State(format!("Could not save session: {:#}", e)))?;
    Ok(identity)
}

/// All fields must agree. Text fields compare case-insensitively; phone and
/// ids compare exactly.
pub fn matches(candidate: &Identity, creds: &Credentials) -> bool {
    candidate.roll_no == creds.roll_no
        && same_text(&candidate.name, &creds.name)
        && same_text(&candidate.father_name, &creds.father_name)
        && same_text(&candidate.email, &creds.email)
        && candidate.phone == creds.phone
        && candidate.dept_id == creds.dept_id
        && candidate.sec_id == creds.sec_id
}

fn same_text(stored: &str, submitted: &str) -> bool {
    stored.to_lowercase() == submitted.to_lowercase()
}
