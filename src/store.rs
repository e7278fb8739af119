//! REST client for the remote JSON document store.
//!
//! Paths are collection paths without the `.json` suffix, e.g. `students`
//! or `students/R1`. A GET answers either `null` or an object keyed by
//! opaque ids; both are valid and `null` maps to `None`.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::thread;
use std::time::Duration;

/// Trait for the document store so the verifier can run against a fake
pub trait RemoteStore: Sync {
    fn get(&self, path: &str) -> Result<Option<Value>>;
    fn put(&self, path: &str, body: &Value) -> Result<Value>;
    fn post(&self, path: &str, body: &Value) -> Result<Value>;
}

pub struct FirebaseStore {
    base_url: String,
    auth_token: Option<String>,
    agent: ureq::Agent,
}

impl FirebaseStore {
    pub fn new(base_url: &str, auth_token: Option<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    /// Full URL of a collection path
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let req = self.agent.request(method, &self.url(path));
        match &self.auth_token {
            Some(token) => req.query("auth", token),
            None => req,
        }
    }

    fn finish(
        &self,
        method: &str,
        path: &str,
        resp: Result<ureq::Response, ureq::Error>,
    ) -> Result<Value> {
        match resp {
            Ok(r) => {
                let body: Value = r
                    .into_json()
                    .with_context(|| format!("Invalid JSON from {} {}", method, path))?;
                Ok(body)
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(anyhow!("{} {} returned {}: {}", method, path, code, body))
            }
            Err(e) => Err(anyhow!("{} {} failed: {}", method, path, e)),
        }
    }
}

impl RemoteStore for FirebaseStore {
    fn get(&self, path: &str) -> Result<Option<Value>> {
        tracing::debug!(url = %self.url(path), "GET");
        let body = self.finish("GET", path, self.request("GET", path).call())?;
        Ok(match body {
            Value::Null => None,
            other => Some(other),
        })
    }

    fn put(&self, path: &str, body: &Value) -> Result<Value> {
        tracing::debug!(url = %self.url(path), "PUT");
        let resp = self.request("PUT", path).send_json(body.clone());
        self.finish("PUT", path, resp)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value> {
        tracing::debug!(url = %self.url(path), "POST");
        let resp = self.request("POST", path).send_json(body.clone());
        self.finish("POST", path, resp)
    }
}

/// GET every path concurrently and wait for all of them.
///
/// Results come back in the order of `paths`. The first failure (in path
/// order) is returned once every request has finished.
pub fn fetch_joined<S: RemoteStore + ?Sized>(
    store: &S,
    paths: &[&str],
) -> Result<Vec<Option<Value>>> {
    let results: Vec<Result<Option<Value>>> = thread::scope(|scope| {
        let handles: Vec<_> = paths
            .iter()
            .map(|path| scope.spawn(move || store.get(path)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("fetch thread panicked")))
            })
            .collect()
    });
    results.into_iter().collect()
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryStore;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_building() {
        let store = FirebaseStore::new("https://db.example.com/", None, Duration::from_secs(1));
        assert_eq!(store.url("students"), "https://db.example.com/students.json");
        assert_eq!(
            store.url("/students/R1"),
            "https://db.example.com/students/R1.json"
        );
    }

    #[test]
    fn test_fetch_joined_keeps_order() {
        let store = MemoryStore::default()
            .with("a", json!({ "k": 1 }))
            .with("b", json!({ "k": 2 }));
        let results = fetch_joined(&store, &["b", "missing", "a"]).unwrap();
        assert_eq!(results[0], Some(json!({ "k": 2 })));
        assert_eq!(results[1], None);
        assert_eq!(results[2], Some(json!({ "k": 1 })));
    }

    #[test]
    fn test_fetch_joined_waits_for_all_before_failing() {
        let store = MemoryStore::default()
            .with("a", json!({}))
            .failing("b");
        assert!(fetch_joined(&store, &["b", "a"]).is_err());
        assert_eq!(store.get_count(), 2);
    }
}
