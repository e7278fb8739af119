//! The signed-in student, persisted across restarts until logout.

use crate::model::Identity;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// One durable string slot holding the serialized identity
pub trait SessionStorage {
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, data: &str) -> Result<()>;
    fn remove(&self) -> Result<()>;
}

/// Slot backed by a single JSON file
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// `<data dir>/campus-pass/session.json`
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("campus-pass")
            .join("session.json")
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        Ok(Some(data))
    }

    fn save(&self, data: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, data)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }
}

/// Volatile slot for tests
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStorage {
    slot: std::cell::RefCell<Option<String>>,
}

#[cfg(test)]
impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.slot.borrow().clone())
    }

    fn save(&self, data: &str) -> Result<()> {
        *self.slot.borrow_mut() = Some(data.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        *self.slot.borrow_mut() = None;
        Ok(())
    }
}

type Observer = Box<dyn Fn(Option<&Identity>)>;

/// Holds at most one identity.
///
/// `set` and `clear` are the only mutators. Both write the durable slot
/// first and then the in-memory value, so a failed write leaves the
/// session as it was. Observers run after the change is visible.
pub struct SessionStore {
    storage: Box<dyn SessionStorage>,
    current: Option<Identity>,
    observers: Vec<Observer>,
}

impl SessionStore {
    /// Open the store, loading a previous session if the slot holds one
    pub fn open(storage: Box<dyn SessionStorage>) -> Self {
        let current = match storage.load() {
            Ok(Some(data)) => match serde_json::from_str::<Identity>(&data) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    tracing::warn!("Ignoring malformed stored session: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Could not read stored session: {:#}", e);
                None
            }
        };
        Self {
            storage,
            current,
            observers: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::open(Box::new(MemoryStorage::default()))
    }

    pub fn get(&self) -> Option<&Identity> {
        self.current.as_ref()
    }

    pub fn is_present(&self) -> bool {
        self.current.is_some()
    }

    pub fn set(&mut self, identity: Identity) -> Result<()> {
        tracing::info!(roll_no = %identity.roll_no, "Storing session");
        let data = serde_json::to_string(&identity)?;
        self.storage.save(&data)?;
        self.current = Some(identity);
        self.notify();
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        tracing::info!("Clearing session");
        self.storage.remove()?;
        self.current = None;
        self.notify();
        Ok(())
    }

    /// Register a callback invoked with the new value after every change
    pub fn subscribe(&mut self, observer: impl Fn(Option<&Identity>) + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn notify(&self) {
        for observer in &self.observers {
            observer(self.current.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn sample() -> Identity {
        Identity {
            roll_no: "R1".to_string(),
            name: "Asha".to_string(),
            father_name: "Ravi".to_string(),
            email: "asha@campus.edu".to_string(),
            phone: "5550001".to_string(),
            dept_id: "d1".to_string(),
            sec_id: "s1".to_string(),
            department_name: Some("CS".to_string()),
            section_name: Some("A".to_string()),
            storage_key: Some("R1".to_string()),
            registered_at: None,
        }
    }

    #[test]
    fn test_set_then_clear_is_absent() {
        let mut store = SessionStore::in_memory();
        store.set(sample()).unwrap();
        store.clear().unwrap();
        assert!(store.get().is_none());
        assert!(!store.is_present());
    }

    #[test]
    fn test_set_then_get_round_trips() {
        let mut store = SessionStore::in_memory();
        store.set(sample()).unwrap();
        assert_eq!(store.get(), Some(&sample()));
        assert!(store.is_present());
    }

    #[test]
    fn test_file_storage_survives_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let mut store = SessionStore::open(Box::new(FileStorage::new(&path)));
        assert!(!store.is_present());
        store.set(sample()).unwrap();

        let reopened = SessionStore::open(Box::new(FileStorage::new(&path)));
        assert_eq!(reopened.get(), Some(&sample()));
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");

        let mut store = SessionStore::open(Box::new(FileStorage::new(&path)));
        store.set(sample()).unwrap();
        store.clear().unwrap();
        assert!(!path.exists());

        // clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_malformed_slot_is_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = SessionStore::open(Box::new(FileStorage::new(&path)));
        assert!(!store.is_present());
    }

    #[test]
    fn test_observers_see_changes() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut store = SessionStore::in_memory();
        let sink = Rc::clone(&seen);
        store.subscribe(move |identity| {
            sink.borrow_mut().push(identity.map(|i| i.roll_no.clone()));
        });

        store.set(sample()).unwrap();
        store.clear().unwrap();
        assert_eq!(*seen.borrow(), vec![Some("R1".to_string()), None]);
    }
}
