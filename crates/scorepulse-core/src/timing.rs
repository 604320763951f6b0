use scorepulse_ports::types::SampleTime;
use std::time::Duration;

pub fn quarter_note_secs(bpm: f64) -> f64 {
    60.0 / bpm
}

/// Length of `quarters` quarter notes at `bpm`, in fractional samples.
pub fn quarters_to_samples(quarters: f64, bpm: f64, sample_rate_hz: u32) -> f64 {
    quarters * quarter_note_secs(bpm) * sample_rate_hz as f64
}

pub fn ms_to_samples(ms: u32, sample_rate_hz: u32) -> SampleTime {
    (ms as u64 * sample_rate_hz as u64) / 1000
}

pub fn samples_to_duration(samples: SampleTime, sample_rate_hz: u32) -> Duration {
    if sample_rate_hz == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(samples as f64 / sample_rate_hz as f64)
}
