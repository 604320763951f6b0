use scorepulse_ports::storage::{SettingsDto, StorageError, StoragePort};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const SCORE_EXTENSION: &str = "scorepulse";

pub struct FsStorage {
    base_dir: PathBuf,
}

impl FsStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_base_dir() -> Result<PathBuf, StorageError> {
        let base = dirs_next::config_dir()
            .ok_or_else(|| StorageError::Io("config dir not found".to_string()))?;
        Ok(base.join("ScorePulse"))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn library_dir(&self) -> PathBuf {
        self.base_dir.join("scores")
    }

    fn settings_path(&self) -> PathBuf {
        self.base_dir.join("settings.json")
    }

    fn score_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0']);
        if !valid {
            return Err(StorageError::Io(format!("invalid score name '{}'", name)));
        }
        Ok(self
            .library_dir()
            .join(format!("{}.{}", name, SCORE_EXTENSION)))
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
        let data = fs::read(path).map_err(|e| StorageError::Io(e.to_string()))?;
        serde_json::from_slice(&data).map_err(|e| StorageError::Serde(e.to_string()))
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
        let data =
            serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serde(e.to_string()))?;
        write_file(path, &data)
    }
}

impl Default for FsStorage {
    fn default() -> Self {
        let base_dir = Self::default_base_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { base_dir }
    }
}

impl StoragePort for FsStorage {
    fn load_settings(&self) -> Result<SettingsDto, StorageError> {
        let path = self.settings_path();
        if !path.exists() {
            return Ok(SettingsDto::default());
        }
        Self::read_json(&path)
    }

    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError> {
        let path = self.settings_path();
        Self::write_json(&path, s)
    }

    fn list_scores(&self) -> Result<Vec<String>, StorageError> {
        let entries = match fs::read_dir(self.library_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e.to_string())),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StorageError::Io(e.to_string()))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SCORE_EXTENSION) {
                continue;
            }
            match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(stem) => names.push(stem.to_string()),
                None => tracing::warn!(path = %path.display(), "skipping non-utf8 score file"),
            }
        }
        names.sort();
        Ok(names)
    }

    fn load_score(&self, name: &str) -> Result<String, StorageError> {
        let path = self.score_path(name)?;
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(name.to_string()),
            _ => StorageError::Io(e.to_string()),
        })
    }

    fn save_score(&self, name: &str, json: &str) -> Result<(), StorageError> {
        let path = self.score_path(name)?;
        write_file(&path, json.as_bytes())?;
        tracing::debug!(name, path = %path.display(), "score saved");
        Ok(())
    }
}

fn write_file(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
    }
    fs::write(path, data).map_err(|e| StorageError::Io(e.to_string()))
}
