// --------------------------------------------------
// Persistence bridge.
//
// The app state is mirrored into an opaque string key-value store
// as one JSON record. Load failures mean "nothing persisted",
// save failures mean "write skipped". Neither is fatal.
// --------------------------------------------------

use std::{
    collections::HashMap,
    fs, io,
    path::PathBuf,
    sync::Arc,
};

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::models::AppSnapshot;

pub const DATA_KEY: &str = "questup_data";
pub const SCHEMA_VERSION: u32 = 1;

/// Opaque get/set string store.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> io::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> io::Result<()>;
}

/// One file per key under a data directory.
#[derive(Debug, Clone)]
pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> io::Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid key {key:?}"),
            ));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KvStore for FileKv {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        let path = self.path_for(key)?;
        let tmp_path = path.with_extension("json.tmp");

        fs::create_dir_all(&self.dir)?;
        fs::write(&tmp_path, value)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Deserialize)]
struct VersionProbe {
    version: Option<u32>,
}

/// Decode a stored record, refusing layouts written under another schema.
pub fn decode_snapshot(text: &str) -> Result<AppSnapshot> {
    let probe: VersionProbe = serde_json::from_str(text)?;
    if probe.version != Some(SCHEMA_VERSION) {
        return Err(Error::SchemaMismatch {
            found: probe.version,
            expected: SCHEMA_VERSION,
        });
    }
    Ok(serde_json::from_str(text)?)
}

pub struct Persistence {
    kv: Arc<dyn KvStore>,
    loaded: bool,
}

impl Persistence {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv, loaded: false }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Returns the persisted snapshot, or `None` when there is nothing usable.
    /// Saving is only unlocked once this has run.
    pub fn load(&mut self) -> Option<AppSnapshot> {
        let result = self.try_load();
        self.loaded = true;
        match result {
            Ok(snapshot) => snapshot,
            Err(Error::SchemaMismatch { found, expected }) => {
                warn!(?found, expected, "stored snapshot has another schema; starting fresh");
                None
            }
            Err(e) => {
                error!(error = %e, "failed to load persisted state");
                None
            }
        }
    }

    fn try_load(&self) -> Result<Option<AppSnapshot>> {
        let Some(text) = self.kv.get(DATA_KEY)? else {
            return Ok(None);
        };
        decode_snapshot(&text).map(Some)
    }

    /// Writes the whole snapshot. Returns whether the write happened.
    pub fn save(&self, snapshot: &AppSnapshot) -> bool {
        if !self.loaded {
            warn!("save requested before initial load; skipped");
            return false;
        }
        match self.try_save(snapshot) {
            Ok(()) => {
                debug!(timestamp = %snapshot.timestamp, "snapshot saved");
                true
            }
            Err(e) => {
                error!(error = %e, "failed to save state");
                false
            }
        }
    }

    fn try_save(&self, snapshot: &AppSnapshot) -> Result<()> {
        let text = serde_json::to_string_pretty(snapshot)?;
        self.kv.set(DATA_KEY, &text)?;
        Ok(())
    }

    /// Reads a marker key. Unreadable markers count as unset.
    pub fn flag(&self, key: &str) -> bool {
        match self.kv.get(key) {
            Ok(value) => value.is_some(),
            Err(e) => {
                warn!(key, error = %e, "failed to read marker");
                false
            }
        }
    }

    pub fn set_flag(&self, key: &str) {
        if let Err(e) = self.kv.set(key, "true") {
            warn!(key, error = %e, "failed to write marker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Settings, TimerState};
    use chrono::Utc;

    struct BrokenKv;

    impl KvStore for BrokenKv {
        fn get(&self, _key: &str) -> io::Result<Option<String>> {
            Err(io::Error::other("disk on fire"))
        }
        fn set(&self, _key: &str, _value: &str) -> io::Result<()> {
            Err(io::Error::other("disk on fire"))
        }
    }

    fn snapshot() -> AppSnapshot {
        AppSnapshot {
            version: SCHEMA_VERSION,
            timestamp: Utc::now(),
            daily_tasks: vec![],
            birthdays: vec![],
            tasks: vec![],
            timer_state: TimerState::default(),
            settings: Settings {
                user_name: "Mina".into(),
                ..Settings::default()
            },
        }
    }

    #[test]
    fn file_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let kv = Arc::new(FileKv::new(dir.path().join("nested")));
        let mut p = Persistence::new(kv.clone());
        assert!(p.load().is_none());

        let snap = snapshot();
        assert!(p.save(&snap));
        assert!(!dir.path().join("nested/questup_data.json.tmp").exists());

        let mut reopened = Persistence::new(kv);
        assert_eq!(reopened.load(), Some(snap));
    }

    #[test]
    fn save_before_load_is_skipped() {
        let kv = Arc::new(MemoryKv::new());
        let p = Persistence::new(kv.clone());
        assert!(!p.save(&snapshot()));
        assert!(kv.get(DATA_KEY).unwrap().is_none());
    }

    #[test]
    fn other_schema_starts_fresh() {
        let kv = Arc::new(MemoryKv::new());
        kv.set(DATA_KEY, r#"{"version":0,"dailyTasks":[]}"#).unwrap();
        let mut p = Persistence::new(kv);
        assert!(p.load().is_none());
        assert!(p.is_loaded());
    }

    #[test]
    fn corrupt_record_starts_fresh() {
        let kv = Arc::new(MemoryKv::new());
        kv.set(DATA_KEY, "{not json").unwrap();
        let mut p = Persistence::new(kv);
        assert!(p.load().is_none());
    }

    #[test]
    fn io_failures_are_swallowed() {
        let mut p = Persistence::new(Arc::new(BrokenKv));
        assert!(p.load().is_none());
        assert!(!p.save(&snapshot()));
        assert!(!p.flag("questup_birthday_notified_2026-01-01"));
        p.set_flag("questup_birthday_notified_2026-01-01");
    }

    #[test]
    fn file_keys_cannot_escape_the_data_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let kv = FileKv::new(dir.path());
        assert!(kv.set("../outside", "x").is_err());
        assert!(kv.get("a/b").is_err());
    }
}
