use approx::assert_relative_eq;
use pretty_assertions::assert_eq;
use scorepulse_core::{ClickRenderer, ClickTrack};
use scorepulse_ports::audio::AudioRenderCallback;
use scorepulse_ports::playback::{ClickSound, ScheduledClick};
use scorepulse_ports::types::Volume01;
use std::f32::consts::TAU;

const RATE: u32 = 48_000;

fn click(sample_time: u64, frequency_hz: f32) -> ScheduledClick {
    ScheduledClick {
        sample_time,
        sound: ClickSound::Downbeat,
        frequency_hz,
        bar_number: 1,
        beat_number: 1,
        tempo_for_display: 120,
    }
}

fn renderer(decay: f32) -> (ClickTrack, ClickRenderer) {
    let track = ClickTrack::new(64, Volume01::new(1.0));
    let renderer = ClickRenderer::new(track.clone(), RATE, decay);
    (track, renderer)
}

#[test]
fn stays_silent_before_any_session() {
    let (track, mut renderer) = renderer(0.9995);
    let mut out = vec![1.0f32; 256];
    renderer.render(0, &mut out);

    assert!(out.iter().all(|sample| *sample == 0.0));
    assert_eq!(track.sample_time(), 256);
    assert!(track.is_silenced());
}

#[test]
fn click_starts_on_its_sample_and_decays() {
    let (track, mut renderer) = renderer(0.999);
    assert_eq!(track.begin_session(1), 0);
    assert_eq!(track.enqueue(1, &[click(10, 1000.0)]), Some(1));

    let mut out = vec![0.0f32; 2_000];
    renderer.render(0, &mut out);

    assert!(out[..10].iter().all(|sample| *sample == 0.0));
    assert_eq!(out[10], 0.0);
    let step = TAU * 1000.0 / RATE as f32;
    assert_relative_eq!(out[11], step.sin() * 0.999, epsilon = 1e-5);

    let early_peak = out[10..110].iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    let late_peak = out[1_900..].iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    assert!(early_peak > 0.9);
    assert!(late_peak < early_peak * 0.5);
    assert_eq!(track.pending(), 0);
}

#[test]
fn volume_scales_the_click() {
    let (track, mut renderer) = renderer(1.0);
    track.set_volume(Volume01::new(0.25));
    track.begin_session(1);
    track.enqueue(1, &[click(0, 12_000.0)]);

    let mut out = vec![0.0f32; 8];
    renderer.render(0, &mut out);
    let peak = out.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    assert_relative_eq!(peak, 0.25, epsilon = 1e-4);
}

#[test]
fn clicks_play_across_block_boundaries() {
    let (track, mut renderer) = renderer(0.9995);
    track.begin_session(7);
    track.enqueue(7, &[click(100, 1000.0), click(300, 800.0)]);

    let mut out = vec![0.0f32; 128];
    renderer.render(0, &mut out);
    assert_eq!(track.pending(), 1);
    renderer.render(128, &mut out);
    renderer.render(256, &mut out);
    assert_eq!(track.pending(), 0);
    assert_eq!(track.sample_time(), 384);
    assert_eq!(track.take_late_clicks(), 0);
}

#[test]
fn late_clicks_sound_immediately_and_are_counted() {
    let (track, mut renderer) = renderer(0.9995);
    track.begin_session(1);
    let mut out = vec![0.0f32; 64];
    renderer.render(0, &mut out);

    track.enqueue(1, &[click(10, 1000.0)]);
    renderer.render(64, &mut out);
    assert_eq!(track.pending(), 0);
    assert_eq!(track.take_late_clicks(), 1);
    assert_eq!(track.take_late_clicks(), 0);
    assert!(out[1..].iter().any(|sample| *sample != 0.0));
}

#[test]
fn one_trigger_per_frame() {
    let (track, mut renderer) = renderer(0.9995);
    track.begin_session(1);
    track.enqueue(1, &[click(0, 1000.0), click(0, 800.0), click(0, 1500.0)]);

    let mut out = vec![0.0f32; 1];
    renderer.render(0, &mut out);
    assert_eq!(track.pending(), 2);
    renderer.render(1, &mut out);
    renderer.render(2, &mut out);
    assert_eq!(track.pending(), 0);
}

#[test]
fn silence_drops_pending_clicks_and_mutes_the_tail() {
    let (track, mut renderer) = renderer(0.9999);
    track.begin_session(1);
    track.enqueue(1, &[click(0, 1000.0), click(500, 1000.0)]);

    let mut out = vec![0.0f32; 100];
    renderer.render(0, &mut out);
    assert!(out.iter().any(|sample| *sample != 0.0));

    track.silence(2);
    assert_eq!(track.pending(), 0);
    renderer.render(100, &mut out);
    renderer.render(200, &mut out);
    assert!(out.iter().all(|sample| *sample == 0.0));
    assert_eq!(track.sample_time(), 300);
}

#[test]
fn stale_sessions_cannot_enqueue() {
    let track = ClickTrack::new(16, Volume01::new(1.0));
    assert_eq!(track.enqueue(0, &[click(0, 1000.0)]), None);

    track.begin_session(3);
    assert_eq!(track.enqueue(2, &[click(0, 1000.0)]), None);
    assert_eq!(track.enqueue(3, &[click(0, 1000.0)]), Some(1));

    track.silence(4);
    assert_eq!(track.enqueue(3, &[click(10, 1000.0)]), None);
    assert_eq!(track.enqueue(4, &[click(10, 1000.0)]), None);
    assert_eq!(track.pending(), 0);
}

#[test]
fn new_session_starts_from_the_current_clock() {
    let (track, mut renderer) = renderer(0.9995);
    let mut out = vec![0.0f32; 480];
    renderer.render(0, &mut out);
    renderer.render(480, &mut out);
    assert_eq!(track.begin_session(1), 960);
    assert!(!track.is_silenced());
}

#[test]
fn queue_never_grows_past_its_capacity() {
    let track = ClickTrack::new(4, Volume01::new(1.0));
    track.begin_session(1);
    let clicks: Vec<ScheduledClick> = (0..6).map(|i| click(i * 100, 1000.0)).collect();

    assert_eq!(track.capacity(), 4);
    assert_eq!(track.enqueue(1, &clicks), Some(4));
    assert_eq!(track.pending(), 4);
    assert_eq!(track.enqueue(1, &clicks[4..]), Some(0));
    assert_eq!(track.pending(), 4);

    let mut renderer = ClickRenderer::new(track.clone(), RATE, 0.9995);
    let mut out = vec![0.0f32; 150];
    renderer.render(0, &mut out);
    assert_eq!(track.pending(), 2);
    assert_eq!(track.enqueue(1, &clicks[4..]), Some(2));
    assert_eq!(track.pending(), 4);
}

#[test]
fn large_batches_are_taken_in_full_when_they_fit() {
    let track = ClickTrack::new(1_000, Volume01::new(1.0));
    track.begin_session(2);
    let clicks: Vec<ScheduledClick> = (0..300).map(|i| click(i * 10, 1000.0)).collect();

    assert_eq!(track.enqueue(2, &clicks), Some(300));
    assert_eq!(track.pending(), 300);
}

#[test]
fn oscillator_carries_over_between_blocks() {
    let (whole_track, mut whole_renderer) = renderer(0.999);
    whole_track.begin_session(1);
    whole_track.enqueue(1, &[click(0, 1000.0)]);
    let mut whole = vec![0.0f32; 64];
    whole_renderer.render(0, &mut whole);

    let (split_track, mut split_renderer) = renderer(0.999);
    split_track.begin_session(1);
    split_track.enqueue(1, &[click(0, 1000.0)]);
    let mut first = vec![0.0f32; 32];
    let mut second = vec![0.0f32; 32];
    split_renderer.render(0, &mut first);
    split_renderer.render(32, &mut second);

    for (index, sample) in first.iter().chain(second.iter()).enumerate() {
        assert_relative_eq!(*sample, whole[index], epsilon = 1e-6);
    }
}
