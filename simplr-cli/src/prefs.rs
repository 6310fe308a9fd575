//! File-backed preference slots, the shared storage both processes read.

use simplr_core::{PreferenceStore, QueryError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::state::write_atomic;

#[derive(Debug, Clone)]
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn in_home(home: &Path) -> Self {
        Self {
            path: home.join("prefs.json"),
        }
    }

    fn read_all(&self) -> simplr_core::Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let s = fs::read_to_string(&self.path)
            .map_err(|e| QueryError::Storage(format!("read {}: {e}", self.path.display())))?;
        serde_json::from_str(&s)
            .map_err(|e| QueryError::Storage(format!("parse {}: {e}", self.path.display())))
    }
}

impl PreferenceStore for FilePreferences {
    fn get(&self, key: &str) -> simplr_core::Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> simplr_core::Result<()> {
        // An unreadable file is left alone; rewriting it would drop the other slots.
        let mut slots = self.read_all()?;
        slots.insert(key.to_string(), value.to_string());
        let json = serde_json::to_string_pretty(&slots)
            .map_err(|e| QueryError::Storage(format!("serialize prefs: {e}")))?;
        write_atomic(&self.path, json.as_bytes())
            .map_err(|e| QueryError::Storage(format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simplr_core::{load_sort_option, save_sort_option, SortOption, SORT_OPTION_KEY};

    #[test]
    fn token_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        save_sort_option(&FilePreferences::in_home(dir.path()), SortOption::DueDate).unwrap();

        let reopened = FilePreferences::in_home(dir.path());
        assert_eq!(
            reopened.get(SORT_OPTION_KEY).unwrap().as_deref(),
            Some("dueDate")
        );
        assert_eq!(load_sort_option(&reopened), SortOption::DueDate);
    }

    #[test]
    fn corrupt_file_falls_back_to_priority() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("prefs.json"), "{not json").unwrap();
        let prefs = FilePreferences::in_home(dir.path());
        assert!(prefs.get(SORT_OPTION_KEY).is_err());
        assert_eq!(load_sort_option(&prefs), SortOption::Priority);
    }

    #[test]
    fn set_refuses_to_overwrite_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "{not json").unwrap();
        let prefs = FilePreferences::in_home(dir.path());

        assert!(save_sort_option(&prefs, SortOption::DueDate).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn set_keeps_other_slots() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = FilePreferences::in_home(dir.path());
        prefs.set("simplr.theme", "dark").unwrap();
        save_sort_option(&prefs, SortOption::Alphabetical).unwrap();

        assert_eq!(prefs.get("simplr.theme").unwrap().as_deref(), Some("dark"));
        assert_eq!(load_sort_option(&prefs), SortOption::Alphabetical);
    }
}
