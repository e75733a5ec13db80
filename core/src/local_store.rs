use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::db::Database;
use crate::models::{DAY_FORMAT, LocalRoutine, validate_title};

pub const ROUTINES_KEY: &str = "currentRoutines";
pub const HISTORY_KEY: &str = "routineHistory";

/// Daily snapshots of the local list, keyed by `YYYY-MM-DD`.
pub type RoutineHistory = BTreeMap<String, Vec<LocalRoutine>>;

/// Device-local string storage. Values are JSON documents.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One `<key>.json` file per key inside a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create storage directory: {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Key/value rows in a local SQLite file.
pub struct DatabaseStore {
    db: Mutex<Database>,
}

impl DatabaseStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }
}

impl KeyValueStore for DatabaseStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        db.get_setting(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        db.set_setting(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let db = self.db.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        db.delete_setting(key)?;
        Ok(())
    }
}

/// Process-local store, used for routines handed over in a signup request.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_routines(routines: &[LocalRoutine]) -> Result<Self> {
        let store = Self::new();
        store.set(ROUTINES_KEY, &serde_json::to_string(routines)?)?;
        Ok(store)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

/// Typed access to the local routine list and its history.
pub struct LocalRoutineStore {
    store: Box<dyn KeyValueStore>,
}

impl LocalRoutineStore {
    #[must_use]
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Current local routines. Data that fails the shape check reads as an
    /// empty list.
    pub fn read_routines(&self) -> Result<Vec<LocalRoutine>> {
        let Some(raw) = self.store.get(ROUTINES_KEY)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<LocalRoutine>>(&raw) {
            Ok(routines) => Ok(routines),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed local routines");
                Ok(Vec::new())
            }
        }
    }

    pub fn write_routines(&self, routines: &[LocalRoutine]) -> Result<()> {
        self.store
            .set(ROUTINES_KEY, &serde_json::to_string(routines)?)
    }

    pub fn clear_routines(&self) -> Result<()> {
        self.write_routines(&[])
    }

    pub fn read_history(&self) -> Result<RoutineHistory> {
        let Some(raw) = self.store.get(HISTORY_KEY)? else {
            return Ok(RoutineHistory::new());
        };
        match serde_json::from_str::<RoutineHistory>(&raw) {
            Ok(history) => Ok(history),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed routine history");
                Ok(RoutineHistory::new())
            }
        }
    }

    pub fn write_history(&self, history: &RoutineHistory) -> Result<()> {
        self.store.set(HISTORY_KEY, &serde_json::to_string(history)?)
    }

    /// Append a new unchecked routine. Ids are millisecond timestamps, bumped
    /// forward when two routines land in the same millisecond.
    pub fn add(&self, text: &str, now: DateTime<Utc>) -> Result<LocalRoutine> {
        let text = validate_title(text)?;
        let mut routines = self.read_routines()?;
        let mut routine = LocalRoutine::new(&text, now);
        let mut stamp = now;
        while routines.iter().any(|r| r.id == routine.id) {
            stamp += Duration::milliseconds(1);
            routine.id = stamp.timestamp_millis().to_string();
        }
        routines.push(routine.clone());
        self.write_routines(&routines)?;
        Ok(routine)
    }

    pub fn toggle(&self, id: &str) -> Result<LocalRoutine> {
        self.update(id, |r| r.completed = !r.completed)
    }

    pub fn set_completed(&self, id: &str, completed: bool) -> Result<LocalRoutine> {
        self.update(id, |r| r.completed = completed)
    }

    pub fn rename(&self, id: &str, text: &str) -> Result<LocalRoutine> {
        let text = validate_title(text)?;
        self.update(id, |r| r.text.clone_from(&text))
    }

    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut routines = self.read_routines()?;
        let before = routines.len();
        routines.retain(|r| r.id != id);
        if routines.len() == before {
            return Ok(false);
        }
        self.write_routines(&routines)?;
        Ok(true)
    }

    /// Daily refresh: snapshot the current list into the history under `day`,
    /// then uncheck every routine. Returns the number of routines carried over.
    pub fn roll_over(&self, day: NaiveDate) -> Result<usize> {
        let routines = self.read_routines()?;
        let mut history = self.read_history()?;
        history.insert(day.format(DAY_FORMAT).to_string(), routines.clone());

        let unchecked: Vec<LocalRoutine> = routines
            .into_iter()
            .map(|r| LocalRoutine {
                completed: false,
                ..r
            })
            .collect();

        self.write_history(&history)?;
        self.write_routines(&unchecked)?;
        Ok(unchecked.len())
    }

    fn update(&self, id: &str, apply: impl FnOnce(&mut LocalRoutine)) -> Result<LocalRoutine> {
        let mut routines = self.read_routines()?;
        let routine = routines
            .iter_mut()
            .find(|r| r.id == id)
            .with_context(|| format!("Local routine {id} not found"))?;
        apply(routine);
        let updated = routine.clone();
        self.write_routines(&routines)?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    fn memory() -> LocalRoutineStore {
        LocalRoutineStore::new(Box::new(MemoryStore::new()))
    }

    #[test]
    fn test_missing_key_reads_empty() {
        let store = memory();
        assert!(store.read_routines().unwrap().is_empty());
        assert!(store.read_history().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_routines_read_empty() {
        let kv = MemoryStore::new();
        kv.set(ROUTINES_KEY, r#"[{"id":"1","text":"x"}]"#).unwrap();
        let store = LocalRoutineStore::new(Box::new(kv));
        assert!(store.read_routines().unwrap().is_empty());

        let kv = MemoryStore::new();
        kv.set(ROUTINES_KEY, "not json").unwrap();
        let store = LocalRoutineStore::new(Box::new(kv));
        assert!(store.read_routines().unwrap().is_empty());
    }

    #[test]
    fn test_add_assigns_unique_ids() {
        let store = memory();
        let a = store.add("Read", at(8, 0)).unwrap();
        let b = store.add("Walk", at(8, 0)).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.id, at(8, 0).timestamp_millis().to_string());

        let all = store.read_routines().unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|r| !r.completed));
    }

    #[test]
    fn test_add_rejects_blank() {
        let store = memory();
        assert!(store.add("   ", at(8, 0)).is_err());
        assert!(store.read_routines().unwrap().is_empty());
    }

    #[test]
    fn test_toggle_rename_remove() {
        let store = memory();
        let r = store.add("Read", at(8, 0)).unwrap();

        assert!(store.toggle(&r.id).unwrap().completed);
        assert!(!store.toggle(&r.id).unwrap().completed);
        assert!(store.set_completed(&r.id, true).unwrap().completed);
        assert_eq!(store.rename(&r.id, " Read more ").unwrap().text, "Read more");
        assert!(store.toggle("missing").is_err());

        assert!(store.remove(&r.id).unwrap());
        assert!(!store.remove(&r.id).unwrap());
    }

    #[test]
    fn test_roll_over_snapshots_and_unchecks() {
        let store = memory();
        let a = store.add("Read", at(8, 0)).unwrap();
        store.add("Walk", at(9, 0)).unwrap();
        store.set_completed(&a.id, true).unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(store.roll_over(day).unwrap(), 2);

        let history = store.read_history().unwrap();
        let snapshot = &history["2024-01-01"];
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().any(|r| r.completed));

        let current = store.read_routines().unwrap();
        assert_eq!(current.len(), 2);
        assert!(current.iter().all(|r| !r.completed));
    }

    #[test]
    fn test_clear_routines() {
        let store = memory();
        store.add("Read", at(8, 0)).unwrap();
        store.clear_routines().unwrap();
        assert!(store.read_routines().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalRoutineStore::new(Box::new(FileStore::open(dir.path()).unwrap()));
            store.add("Read", at(8, 0)).unwrap();
        }
        let kv = FileStore::open(dir.path()).unwrap();
        assert!(kv.get(ROUTINES_KEY).unwrap().is_some());
        let store = LocalRoutineStore::new(Box::new(kv));
        assert_eq!(store.read_routines().unwrap()[0].text, "Read");
    }

    #[test]
    fn test_file_store_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileStore::open(dir.path()).unwrap();
        kv.remove("nothing").unwrap();
        assert!(kv.get("nothing").unwrap().is_none());
    }

    #[test]
    fn test_database_store() {
        let kv = DatabaseStore::new(Database::open_in_memory().unwrap());
        kv.set(ROUTINES_KEY, "[]").unwrap();
        assert_eq!(kv.get(ROUTINES_KEY).unwrap().as_deref(), Some("[]"));
        kv.remove(ROUTINES_KEY).unwrap();
        assert!(kv.get(ROUTINES_KEY).unwrap().is_none());
    }
}
