use crate::types::SampleTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Bar number reported for every click of the count-in bar.
pub const COUNT_IN_BAR: i32 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubdivisionMode {
    Quarter,
    Eighth,
}

/// The three click timbres. Downbeat is the highest pitch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClickSound {
    Downbeat,
    BeatAccent,
    Offbeat,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduledClick {
    pub sample_time: SampleTime,
    pub sound: ClickSound,
    pub frequency_hz: f32,
    /// `COUNT_IN_BAR` during the count-in bar.
    pub bar_number: i32,
    pub beat_number: u32,
    pub tempo_for_display: u32,
}

impl ScheduledClick {
    pub fn is_count_in(&self) -> bool {
        self.bar_number == COUNT_IN_BAR
    }

    pub fn position(&self) -> PositionUpdate {
        PositionUpdate {
            bar: self.bar_number,
            beat: self.beat_number,
            tempo: self.tempo_for_display,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub bar: i32,
    pub beat: u32,
    pub tempo: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PlaybackStatus {
    pub bar: i32,
    pub beat: u32,
    pub tempo: u32,
    pub is_playing: bool,
}

pub type PositionCallback = Arc<dyn Fn(PositionUpdate) + Send + Sync + 'static>;
