use crate::timing::quarters_to_samples;
use scorepulse_domain_score::TimeSignature;
use scorepulse_ports::playback::{ClickSound, SubdivisionMode};

/// One click inside a bar, independent of tempo.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlannedClick {
    pub index: u32,
    pub sound: ClickSound,
    /// 1-based felt beat this click belongs to.
    pub beat_number: u32,
    pub duration_quarters: f64,
    /// Fraction of the bar already elapsed when this click sounds.
    pub bar_progress: f64,
}

/// Click layout of one bar for a meter and subdivision mode.
///
/// Every layout covers the full bar: the click durations always sum to the
/// bar's length in quarter notes.
#[derive(Clone, Debug, PartialEq)]
pub struct ClickPlanner {
    time_signature: TimeSignature,
    mode: SubdivisionMode,
    clicks: Vec<PlannedClick>,
}

impl ClickPlanner {
    pub fn new(time_signature: &TimeSignature, mode: SubdivisionMode) -> Self {
        let clicks = layout(time_signature, mode);
        Self {
            time_signature: time_signature.clone(),
            mode,
            clicks,
        }
    }

    pub fn time_signature(&self) -> &TimeSignature {
        &self.time_signature
    }

    pub fn mode(&self) -> SubdivisionMode {
        self.mode
    }

    pub fn clicks(&self) -> &[PlannedClick] {
        &self.clicks
    }

    pub fn total_clicks_per_bar(&self) -> u32 {
        self.clicks.len() as u32
    }

    pub fn click_type(&self, index: u32) -> Option<ClickSound> {
        self.clicks.get(index as usize).map(|click| click.sound)
    }

    pub fn beat_number(&self, index: u32) -> Option<u32> {
        self.clicks.get(index as usize).map(|click| click.beat_number)
    }

    pub fn click_duration_secs(&self, index: u32, tempo_bpm: f64) -> Option<f64> {
        self.clicks
            .get(index as usize)
            .map(|click| click.duration_quarters * 60.0 / tempo_bpm)
    }

    pub fn bar_duration_secs(&self, tempo_bpm: f64) -> f64 {
        self.time_signature.bar_in_quarters() * 60.0 / tempo_bpm
    }

    pub fn bar_duration_samples(&self, tempo_bpm: f64, sample_rate_hz: u32) -> f64 {
        quarters_to_samples(self.time_signature.bar_in_quarters(), tempo_bpm, sample_rate_hz)
    }
}

fn layout(ts: &TimeSignature, mode: SubdivisionMode) -> Vec<PlannedClick> {
    let unit = ts.unit_in_quarters();
    let beats = ts.beats_per_bar();

    let slots: Vec<(ClickSound, u32, f64)> = match (ts.effective_accent_pattern(), mode) {
        (None, SubdivisionMode::Quarter) => (0..beats)
            .map(|i| (first_or(i, ClickSound::Offbeat), i + 1, unit))
            .collect(),
        (None, SubdivisionMode::Eighth) => (0..beats * 2)
            .map(|i| {
                let sound = if i % 2 == 0 {
                    first_or(i, ClickSound::BeatAccent)
                } else {
                    ClickSound::Offbeat
                };
                (sound, i / 2 + 1, unit / 2.0)
            })
            .collect(),
        // sixteenth meters always click once per group
        (Some(pattern), _) if mode == SubdivisionMode::Quarter || ts.beat_unit() == 16 => {
            pattern
                .iter()
                .zip(0u32..)
                .map(|(&group, i)| (first_or(i, ClickSound::Offbeat), i + 1, unit * group as f64))
                .collect()
        }
        (Some(_), _) => {
            let steps_per_unit = (8 / ts.beat_unit()).max(1);
            let step = unit / steps_per_unit as f64;
            let boundaries: Vec<u32> = ts
                .accent_positions()
                .into_iter()
                .map(|position| position * steps_per_unit)
                .collect();

            let mut beat = 0;
            (0..beats * steps_per_unit)
                .map(|i| {
                    let sound = if boundaries.contains(&i) {
                        beat += 1;
                        first_or(i, ClickSound::BeatAccent)
                    } else {
                        ClickSound::Offbeat
                    };
                    (sound, beat, step)
                })
                .collect()
        }
    };

    let bar = ts.bar_in_quarters();
    let mut elapsed = 0.0;
    slots
        .into_iter()
        .zip(0u32..)
        .map(|((sound, beat_number, duration_quarters), index)| {
            let click = PlannedClick {
                index,
                sound,
                beat_number,
                duration_quarters,
                bar_progress: elapsed / bar,
            };
            elapsed += duration_quarters;
            click
        })
        .collect()
}

fn first_or(index: u32, otherwise: ClickSound) -> ClickSound {
    if index == 0 {
        ClickSound::Downbeat
    } else {
        otherwise
    }
}
