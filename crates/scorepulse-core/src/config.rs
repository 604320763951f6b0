use scorepulse_ports::playback::ClickSound;
use scorepulse_ports::storage::SettingsDto;
use scorepulse_ports::types::Volume01;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClickFrequencies {
    pub downbeat: f32,
    pub beat_accent: f32,
    pub offbeat: f32,
}

impl ClickFrequencies {
    pub fn for_sound(&self, sound: ClickSound) -> f32 {
        match sound {
            ClickSound::Downbeat => self.downbeat,
            ClickSound::BeatAccent => self.beat_accent,
            ClickSound::Offbeat => self.offbeat,
        }
    }
}

impl Default for ClickFrequencies {
    fn default() -> Self {
        Self {
            downbeat: 1500.0,
            beat_accent: 1000.0,
            offbeat: 800.0,
        }
    }
}

/// Engine construction parameters. Passed in explicitly; the engine never
/// reads settings on its own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Requested device rate; the opened stream decides the final value.
    pub sample_rate_hz: u32,
    pub buffer_size_frames: Option<u32>,
    /// Lead time between `start` and the first click.
    pub start_latency_ms: u32,
    /// Fixed-mode batch size.
    pub lookahead_bars: u32,
    /// Fixed mode refills once less than this many bars remain queued.
    pub refill_threshold_bars: u32,
    pub poll_interval_ms: u64,
    pub decay_per_sample: f32,
    pub click_frequencies: ClickFrequencies,
    pub volume: Volume01,
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 48_000,
            buffer_size_frames: None,
            start_latency_ms: 100,
            lookahead_bars: 100,
            refill_threshold_bars: 50,
            poll_interval_ms: 20,
            decay_per_sample: 0.9995,
            click_frequencies: ClickFrequencies::default(),
            volume: Volume01::new(0.8),
            queue_capacity: 4096,
        }
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &SettingsDto) -> Self {
        Self {
            buffer_size_frames: settings.audio_buffer_size_frames,
            start_latency_ms: settings.start_latency_ms,
            volume: settings.click_volume,
            ..Self::default()
        }
    }
}
