//! INI file backed key-value store.

use std::path::{Path, PathBuf};

use ini::Ini;
use parking_lot::Mutex;

use super::{KeyValueStore, StoreError};

/// Section holding all persisted keys.
const STATE_SECTION: &str = "state";

/// Store that keeps every key in the `[state]` section of one INI file.
///
/// The file is read once on [`open`](Self::open) and rewritten on every
/// mutation. A missing file is treated as an empty store and created on the
/// first write.
#[derive(Debug)]
pub struct IniFileStore {
    path: PathBuf,
    ini: Mutex<Ini>,
}

impl IniFileStore {
    /// Open (or prepare to create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let ini = if path.exists() {
            Ini::load_from_file(&path)
                .map_err(|e| StoreError::Read(format!("{}: {}", path.display(), e)))?
        } else {
            Ini::new()
        };

        Ok(Self {
            path,
            ini: Mutex::new(ini),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, ini: &Ini) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Write(format!("{}: {}", parent.display(), e)))?;
        }
        ini.write_to_file(&self.path)
            .map_err(|e| StoreError::Write(format!("{}: {}", self.path.display(), e)))
    }
}

impl KeyValueStore for IniFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.ini
            .lock()
            .get_from(Some(STATE_SECTION), key)
            .map(str::to_string)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut ini = self.ini.lock();
        ini.with_section(Some(STATE_SECTION)).set(key, value);
        self.flush(&ini)
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut ini = self.ini.lock();
        let mut section = ini.with_section(Some(STATE_SECTION));
        for (key, value) in entries {
            section.set(*key, *value);
        }
        self.flush(&ini)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut ini = self.ini.lock();
        if ini.delete_from(Some(STATE_SECTION), key).is_some() {
            self.flush(&ini)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = IniFileStore::open(dir.path().join("state.ini")).unwrap();

        assert_eq!(store.get("anything"), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_values_persist_across_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.ini");

        {
            let store = IniFileStore::open(&path).unwrap();
            store.set("last_fix.latitude", "53.55").unwrap();
            store.set("last_place.city", "Hamburg").unwrap();
        }

        let reopened = IniFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("last_fix.latitude"), Some("53.55".to_string()));
        assert_eq!(reopened.get("last_place.city"), Some("Hamburg".to_string()));
    }

    #[test]
    fn test_set_many_persists_every_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.ini");

        let store = IniFileStore::open(&path).unwrap();
        store
            .set_many(&[
                ("last_fix.latitude", "53.55"),
                ("last_fix.longitude", "9.99"),
                ("last_fix.updated_at", "2026-03-01T12:00:00+00:00"),
            ])
            .unwrap();

        let reopened = IniFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("last_fix.latitude"), Some("53.55".to_string()));
        assert_eq!(reopened.get("last_fix.longitude"), Some("9.99".to_string()));
        assert_eq!(
            reopened.get("last_fix.updated_at"),
            Some("2026-03-01T12:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_remove_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.ini");

        let store = IniFileStore::open(&path).unwrap();
        store.set("a", "1").unwrap();
        store.remove("a").unwrap();
        store.remove("never-set").unwrap();

        let reopened = IniFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("a"), None);
    }

    #[test]
    fn test_corrupt_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.ini");
        std::fs::write(&path, "[state\nbroken").unwrap();

        assert!(matches!(
            IniFileStore::open(&path),
            Err(StoreError::Read(_))
        ));
    }
}
