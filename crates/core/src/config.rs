use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commands::{KeyChord, ShortcutParseError, DEFAULT_RUN_SHORTCUT};
use crate::providers::SQL_LANGUAGE_ID;
use crate::session::{EditorHeight, EditorOptions};

pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EditorSettings {
    pub language_id: String,
    pub run_shortcut: String,
    /// Editor height in lines; absent means fill the available space.
    pub height: Option<u16>,
    pub font_size: u16,
    pub word_wrap: bool,
    pub line_numbers: bool,
    pub quick_suggestions: bool,
    pub hover_enabled: bool,
    pub hover_delay_ms: u64,
    pub log_filter: String,
}

impl Default for EditorSettings {
    fn default() -> Self {
        let options = EditorOptions::default();
        Self {
            language_id: SQL_LANGUAGE_ID.to_string(),
            run_shortcut: DEFAULT_RUN_SHORTCUT.to_string(),
            height: None,
            font_size: options.font_size,
            word_wrap: options.word_wrap,
            line_numbers: options.line_numbers,
            quick_suggestions: options.quick_suggestions,
            hover_enabled: options.hover_enabled,
            hover_delay_ms: options.hover_delay_ms,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl EditorSettings {
    pub fn run_shortcut(&self) -> Result<KeyChord, ShortcutParseError> {
        self.run_shortcut.parse()
    }

    #[must_use]
    pub fn height(&self) -> EditorHeight {
        self.height.map_or(EditorHeight::Fill, EditorHeight::Lines)
    }

    #[must_use]
    pub fn editor_options(&self) -> EditorOptions {
        EditorOptions {
            language_id: self.language_id.clone(),
            height: self.height(),
            font_size: self.font_size,
            line_numbers: self.line_numbers,
            word_wrap: self.word_wrap,
            quick_suggestions: self.quick_suggestions,
            suggest_on_trigger_characters: self.quick_suggestions,
            hover_enabled: self.hover_enabled,
            hover_delay_ms: self.hover_delay_ms,
            ..EditorOptions::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read settings file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid run shortcut in {path}: {source}")]
    InvalidShortcut {
        path: PathBuf,
        #[source]
        source: ShortcutParseError,
    },
    #[error("failed to create config directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {source}")]
    Serialize {
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to write settings file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
    settings: EditorSettings,
}

impl FileSettingsStore {
    pub fn load_default() -> Result<Self, SettingsError> {
        let path = default_settings_path()?;
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                settings: EditorSettings::default(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;

        if raw.trim().is_empty() {
            return Ok(Self {
                path,
                settings: EditorSettings::default(),
            });
        }

        let settings: EditorSettings =
            toml::from_str(&raw).map_err(|source| SettingsError::Parse {
                path: path.clone(),
                source,
            })?;
        settings
            .run_shortcut()
            .map_err(|source| SettingsError::InvalidShortcut {
                path: path.clone(),
                source,
            })?;

        Ok(Self { path, settings })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut EditorSettings {
        &mut self.settings
    }

    pub fn persist(&self) -> Result<(), SettingsError> {
        if let Some(parent_dir) = self.path.parent() {
            fs::create_dir_all(parent_dir).map_err(|source| SettingsError::CreateDir {
                path: parent_dir.to_path_buf(),
                source,
            })?;
        }

        let rendered = toml::to_string_pretty(&self.settings)
            .map_err(|source| SettingsError::Serialize { source })?;

        fs::write(&self.path, rendered).map_err(|source| SettingsError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    let base_dir = if let Some(custom) = env::var_os("SQLPANE_CONFIG_DIR") {
        PathBuf::from(custom)
    } else if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(SettingsError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(SettingsError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join("sqlpane").join("settings.toml"))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::{EditorSettings, FileSettingsStore, SettingsError};
    use crate::commands::{Key, KeyChord, Modifiers};
    use crate::session::EditorHeight;

    fn temp_settings_path(temp_dir: &TempDir) -> PathBuf {
        temp_dir.path().join("nested").join("settings.toml")
    }

    #[test]
    fn missing_settings_file_loads_defaults() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let store = FileSettingsStore::load_from_path(temp_settings_path(&temp_dir))
            .expect("failed to load store");

        assert_eq!(store.settings(), &EditorSettings::default());
        assert_eq!(
            store.settings().run_shortcut(),
            Ok(KeyChord::ctrl_cmd(Key::Enter))
        );
        assert_eq!(store.settings().height(), EditorHeight::Fill);
    }

    #[test]
    fn persist_and_reload_settings() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_settings_path(&temp_dir);

        let mut store = FileSettingsStore::load_from_path(&path).expect("failed to load store");
        store.settings_mut().run_shortcut = "f5".to_string();
        store.settings_mut().height = Some(12);
        store.settings_mut().hover_enabled = false;
        store.persist().expect("failed to persist settings");

        let reloaded = FileSettingsStore::load_from_path(&path).expect("failed to reload");
        assert_eq!(reloaded.settings(), store.settings());
        assert_eq!(
            reloaded.settings().run_shortcut(),
            Ok(KeyChord::new(Modifiers::default(), Key::F(5)))
        );

        let options = reloaded.settings().editor_options();
        assert_eq!(options.height, EditorHeight::Lines(12));
        assert!(!options.hover_enabled);
        assert!(!options.minimap);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("settings.toml");
        fs::write(&path, "font_size = 16\n").expect("failed to write settings");

        let store = FileSettingsStore::load_from_path(&path).expect("failed to load store");
        assert_eq!(store.settings().font_size, 16);
        assert_eq!(store.settings().run_shortcut, "ctrl+enter");
        assert_eq!(store.settings().log_filter, "info");
    }

    #[test]
    fn invalid_shortcut_is_rejected_at_load() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("settings.toml");
        fs::write(&path, "run_shortcut = \"hyper+enter\"\n").expect("failed to write settings");

        let error = FileSettingsStore::load_from_path(&path).expect_err("load should fail");
        assert!(matches!(error, SettingsError::InvalidShortcut { .. }));
    }
}
