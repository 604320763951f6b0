use pretty_assertions::assert_eq;
use scorepulse_core::{
    ms_to_samples, quarters_to_samples, samples_to_duration, ClickFrequencies, EngineConfig,
};
use scorepulse_ports::playback::ClickSound;
use scorepulse_ports::storage::SettingsDto;
use scorepulse_ports::types::Volume01;
use std::time::Duration;

#[test]
fn defaults_match_the_documented_engine_constants() {
    let config = EngineConfig::default();
    assert_eq!(config.start_latency_ms, 100);
    assert_eq!(config.lookahead_bars, 100);
    assert_eq!(config.refill_threshold_bars, 50);
    assert_eq!(config.decay_per_sample, 0.9995);
    assert_eq!(config.volume, Volume01::new(0.8));

    let frequencies = ClickFrequencies::default();
    assert_eq!(frequencies.for_sound(ClickSound::Downbeat), 1500.0);
    assert_eq!(frequencies.for_sound(ClickSound::BeatAccent), 1000.0);
    assert_eq!(frequencies.for_sound(ClickSound::Offbeat), 800.0);
}

#[test]
fn settings_feed_the_engine_config() {
    let settings = SettingsDto {
        audio_buffer_size_frames: Some(256),
        click_volume: Volume01::new(0.3),
        start_latency_ms: 40,
        ..SettingsDto::default()
    };
    let config = EngineConfig::from_settings(&settings);
    assert_eq!(config.buffer_size_frames, Some(256));
    assert_eq!(config.volume, Volume01::new(0.3));
    assert_eq!(config.start_latency_ms, 40);
    assert_eq!(config.lookahead_bars, 100);
}

#[test]
fn partial_json_falls_back_to_defaults() {
    let config: EngineConfig =
        serde_json::from_str(r#"{ "sample_rate_hz": 44100, "poll_interval_ms": 10 }"#)
            .expect("config");
    assert_eq!(config.sample_rate_hz, 44_100);
    assert_eq!(config.poll_interval_ms, 10);
    assert_eq!(config.click_frequencies, ClickFrequencies::default());
    assert_eq!(config.queue_capacity, 4096);
}

#[test]
fn timing_conversions() {
    assert_eq!(quarters_to_samples(1.0, 120.0, 48_000), 24_000.0);
    assert_eq!(quarters_to_samples(0.5, 120.0, 44_100), 11_025.0);
    assert_eq!(ms_to_samples(100, 48_000), 4_800);
    assert_eq!(samples_to_duration(24_000, 48_000), Duration::from_millis(500));
    assert_eq!(samples_to_duration(10, 0), Duration::ZERO);
}
