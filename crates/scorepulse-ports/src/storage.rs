use crate::playback::SubdivisionMode;
use crate::types::*;
use serde::{Deserialize, Serialize};

fn default_click_volume() -> Volume01 {
    Volume01::new(0.8)
}

fn default_start_latency_ms() -> u32 {
    100
}

fn default_subdivision() -> SubdivisionMode {
    SubdivisionMode::Quarter
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("score not found: {0}")]
    NotFound(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsDto {
    pub selected_audio_out: Option<DeviceId>,
    pub audio_buffer_size_frames: Option<u32>,
    #[serde(default = "default_click_volume")]
    pub click_volume: Volume01,
    #[serde(default = "default_start_latency_ms")]
    pub start_latency_ms: u32,
    #[serde(default = "default_subdivision")]
    pub default_subdivision: SubdivisionMode,
    pub count_in: bool,
}

impl Default for SettingsDto {
    fn default() -> Self {
        Self {
            selected_audio_out: None,
            audio_buffer_size_frames: None,
            click_volume: default_click_volume(),
            start_latency_ms: default_start_latency_ms(),
            default_subdivision: default_subdivision(),
            count_in: false,
        }
    }
}

/// Settings and score-library persistence. Score payloads cross this port as
/// raw JSON; decoding and validation belong to the score domain.
pub trait StoragePort: Send + Sync {
    fn load_settings(&self) -> Result<SettingsDto, StorageError>;
    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError>;

    fn list_scores(&self) -> Result<Vec<String>, StorageError>;
    fn load_score(&self, name: &str) -> Result<String, StorageError>;
    fn save_score(&self, name: &str, json: &str) -> Result<(), StorageError>;
}
