//! Non-sensitive user preferences, stored as plain JSON outside the
//! document.
//!
//! The core never reads preferences directly: it asks a
//! [`PreferenceSource`] injected at construction. [`Preferences`] is the
//! file-backed implementation; tests substitute fixed values.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ── Source trait ───────────────────────────────────────────────────

/// Read-only view of the preferences the core consults.
pub trait PreferenceSource: Send + Sync {
    /// Whether key-file locations are remembered per document.
    fn remember_key_files(&self) -> bool;

    /// Remembered key file for `document`, `None` when remembering is off.
    fn remembered_key_file(&self, document: &str) -> Option<PathBuf>;

    /// Whether deletes move nodes to the trash group.
    fn trash_enabled(&self) -> bool;

    fn password_change_intervals(&self) -> PasswordChangeIntervals;

    /// Cap on the number of history versions kept per entry.
    fn max_history_items(&self) -> usize;

    /// Whether a fresh search context includes trashed entries.
    fn search_includes_trash(&self) -> bool;
}

// ── Top-level preferences ──────────────────────────────────────────

/// Non-sensitive application preferences.
///
/// Persisted to `{data_dir}/preferences.json`. All fields have sensible
/// defaults via [`Default`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Whether to remember which key file opened which document.
    #[serde(default = "default_true")]
    pub remember_key_files: bool,

    /// Document identity to key-file path.
    #[serde(default)]
    pub remembered_key_files: BTreeMap<String, PathBuf>,

    /// Whether deletes go through the trash group.
    #[serde(default = "default_true")]
    pub trash_enabled: bool,

    /// Master password age thresholds.
    #[serde(default)]
    pub password_change: PasswordChangeIntervals,

    /// Versions kept in each entry's history (0 keeps none).
    #[serde(default = "default_max_history_items")]
    pub max_history_items: usize,

    /// Whether search shows trashed entries by default.
    #[serde(default)]
    pub search_includes_trash: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            remember_key_files: true,
            remembered_key_files: BTreeMap::new(),
            trash_enabled: true,
            password_change: PasswordChangeIntervals::default(),
            max_history_items: default_max_history_items(),
            search_includes_trash: false,
        }
    }
}

const fn default_true() -> bool {
    true
}
const fn default_max_history_items() -> usize {
    10
}

// ── Password change intervals ──────────────────────────────────────

/// Days after the last master key change at which a new password is
/// recommended or enforced. `None` disables the check.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeIntervals {
    #[serde(default)]
    pub recommend_after_days: Option<u32>,
    #[serde(default)]
    pub enforce_after_days: Option<u32>,
}

// ── Key-file memory ────────────────────────────────────────────────

impl Preferences {
    /// Remember `path` as the key file of `document`. Ignored while
    /// remembering is disabled.
    pub fn remember_key_file(&mut self, document: &str, path: &Path) {
        if self.remember_key_files {
            self.remembered_key_files
                .insert(document.to_string(), path.to_path_buf());
        }
    }

    pub fn forget_key_file(&mut self, document: &str) {
        self.remembered_key_files.remove(document);
    }
}

impl PreferenceSource for Preferences {
    fn remember_key_files(&self) -> bool {
        self.remember_key_files
    }

    fn remembered_key_file(&self, document: &str) -> Option<PathBuf> {
        if !self.remember_key_files {
            return None;
        }
        self.remembered_key_files.get(document).cloned()
    }

    fn trash_enabled(&self) -> bool {
        self.trash_enabled
    }

    fn password_change_intervals(&self) -> PasswordChangeIntervals {
        self.password_change
    }

    fn max_history_items(&self) -> usize {
        self.max_history_items
    }

    fn search_includes_trash(&self) -> bool {
        self.search_includes_trash
    }
}

// ── File I/O ───────────────────────────────────────────────────────

const PREFERENCES_FILE: &str = "preferences.json";

impl Preferences {
    /// Load preferences from `{data_dir}/preferences.json`.
    ///
    /// Returns [`Default::default()`] when the file is missing or
    /// contains invalid JSON (corrupt-file recovery).
    #[must_use]
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(PREFERENCES_FILE);
        fs::read_to_string(&path).map_or_else(
            |_| Self::default(),
            |contents| {
                serde_json::from_str(&contents).unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Corrupt preferences file, using defaults");
                    Self::default()
                })
            },
        )
    }

    /// Persist preferences to `{data_dir}/preferences.json`.
    ///
    /// Writes to `.tmp` then renames, so a crash never leaves a partial
    /// file behind.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the directory does not exist or the
    /// file system rejects the write/rename.
    pub fn save(&self, data_dir: &Path) -> std::io::Result<()> {
        let path = data_dir.join(PREFERENCES_FILE);
        let tmp = data_dir.join(".preferences.json.tmp");

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(&tmp, &json)?;

        // Key-file paths are private; owner-only on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &path)?;

        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_values_are_correct() {
        let prefs = Preferences::default();
        assert!(prefs.remember_key_files);
        assert!(prefs.trash_enabled);
        assert_eq!(prefs.max_history_items, 10);
        assert!(!prefs.search_includes_trash);
        assert_eq!(prefs.password_change, PasswordChangeIntervals::default());
    }

    #[test]
    fn load_returns_default_on_missing_file() {
        let dir = TempDir::new().unwrap();
        let prefs = Preferences::load(dir.path());
        assert_eq!(prefs, Preferences::default());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();

        let mut prefs = Preferences {
            trash_enabled: false,
            password_change: PasswordChangeIntervals {
                recommend_after_days: Some(90),
                enforce_after_days: Some(365),
            },
            ..Preferences::default()
        };
        prefs.remember_key_file("work.sbx", Path::new("/keys/work.key"));

        prefs.save(dir.path()).unwrap();
        let loaded = Preferences::load(dir.path());

        assert_eq!(loaded, prefs);
    }

    #[test]
    fn load_recovers_from_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PREFERENCES_FILE);
        fs::write(&path, "{ this is not valid json }}}").unwrap();

        let prefs = Preferences::load(dir.path());
        assert_eq!(prefs, Preferences::default());
    }

    #[test]
    fn load_handles_partial_json_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PREFERENCES_FILE);
        fs::write(&path, r#"{"trashEnabled":false}"#).unwrap();

        let prefs = Preferences::load(dir.path());
        assert!(!prefs.trash_enabled);
        assert!(prefs.remember_key_files);
        assert_eq!(prefs.max_history_items, 10);
    }

    #[test]
    fn save_is_atomic_via_tmp_file() {
        let dir = TempDir::new().unwrap();
        Preferences::default().save(dir.path()).unwrap();

        assert!(!dir.path().join(".preferences.json.tmp").exists());
        assert!(dir.path().join(PREFERENCES_FILE).exists());
    }

    #[cfg(unix)]
    #[test]
    fn save_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        Preferences::default().save(dir.path()).unwrap();

        let path = dir.path().join(PREFERENCES_FILE);
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "preferences.json should be owner-only (0600)");
    }

    #[test]
    fn key_files_are_not_reported_when_remembering_is_off() {
        let mut prefs = Preferences::default();
        prefs.remember_key_file("a.sbx", Path::new("/keys/a.key"));
        assert_eq!(
            prefs.remembered_key_file("a.sbx"),
            Some(PathBuf::from("/keys/a.key"))
        );

        prefs.remember_key_files = false;
        assert_eq!(prefs.remembered_key_file("a.sbx"), None);

        prefs.remember_key_file("b.sbx", Path::new("/keys/b.key"));
        assert!(!prefs.remembered_key_files.contains_key("b.sbx"));
    }

    #[test]
    fn serde_uses_camel_case() {
        let json = serde_json::to_string(&Preferences::default()).unwrap();
        assert!(json.contains("rememberKeyFiles"));
        assert!(json.contains("trashEnabled"));
        assert!(json.contains("maxHistoryItems"));
        assert!(json.contains("recommendAfterDays"));
        assert!(!json.contains("remember_key_files"));
        assert!(!json.contains("max_history_items"));
    }
}
