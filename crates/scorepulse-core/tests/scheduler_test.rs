use pretty_assertions::assert_eq;
use scorepulse_core::{ClickFrequencies, ClickScheduler};
use scorepulse_domain_score::{Score, ScoreHeader, TempoChange, TimeSignature, Transition};
use scorepulse_ports::playback::{ClickSound, ScheduledClick, SubdivisionMode, COUNT_IN_BAR};
use std::sync::Arc;

const RATE: u32 = 48_000;

fn ts(text: &str) -> TimeSignature {
    text.parse().expect("time signature")
}

fn fixed(bpm: u32, meter: &str, mode: SubdivisionMode) -> ClickScheduler {
    ClickScheduler::fixed(bpm, &ts(meter), mode, RATE, ClickFrequencies::default(), 0)
}

fn plain_score(total_bars: u32, tempo_changes: Vec<TempoChange>) -> Arc<Score> {
    Arc::new(
        Score::new(
            ScoreHeader::new("Study", "Anon", 120, total_bars),
            tempo_changes,
            Vec::new(),
            Vec::new(),
        )
        .expect("score"),
    )
}

fn times(clicks: &[ScheduledClick]) -> Vec<u64> {
    clicks.iter().map(|click| click.sample_time).collect()
}

#[test]
fn fixed_tempo_bar_at_120_bpm() {
    let mut scheduler = fixed(120, "4/4", SubdivisionMode::Quarter);
    let bar = scheduler.next_bar().expect("bar");

    assert_eq!(times(&bar), vec![0, 24_000, 48_000, 72_000]);
    assert_eq!(bar[0].sound, ClickSound::Downbeat);
    assert_eq!(bar[0].frequency_hz, 1500.0);
    assert!(bar[1..].iter().all(|click| click.sound == ClickSound::Offbeat));
    assert!(bar[1..].iter().all(|click| click.frequency_hz == 800.0));
    assert!(bar.iter().all(|click| click.bar_number == 1 && click.tempo_for_display == 120));
    assert_eq!(scheduler.next_click_sample_time(), 96_000);

    let second = scheduler.next_bar().expect("bar");
    assert_eq!(second[0].sample_time, 96_000);
    assert_eq!(second[0].bar_number, 2);
}

#[test]
fn fixed_scheduling_starts_at_the_requested_sample() {
    let mut scheduler = ClickScheduler::fixed(
        60,
        &ts("3/4"),
        SubdivisionMode::Quarter,
        1_000,
        ClickFrequencies::default(),
        250,
    );
    let clicks = scheduler.schedule_bars(2);
    assert_eq!(times(&clicks), vec![250, 1_250, 2_250, 3_250, 4_250, 5_250]);
    assert_eq!(scheduler.fixed_bar_samples(), Some(3_000));
    assert!(!scheduler.is_finished());
}

#[test]
fn eighth_mode_uses_accent_frequency() {
    let mut scheduler = fixed(120, "2/4", SubdivisionMode::Eighth);
    let bar = scheduler.next_bar().expect("bar");
    assert_eq!(times(&bar), vec![0, 12_000, 24_000, 36_000]);
    let frequencies: Vec<f32> = bar.iter().map(|click| click.frequency_hz).collect();
    assert_eq!(frequencies, vec![1500.0, 800.0, 1000.0, 800.0]);
    let beats: Vec<u32> = bar.iter().map(|click| click.beat_number).collect();
    assert_eq!(beats, vec![1, 1, 2, 2]);
}

#[test]
fn additive_meters_follow_their_grouping() {
    let mut seven = fixed(120, "7/8", SubdivisionMode::Quarter);
    assert_eq!(times(&seven.next_bar().expect("bar")), vec![0, 24_000, 48_000]);
    assert_eq!(seven.next_click_sample_time(), 84_000);

    let eleven = TimeSignature::with_accent_pattern(11, 16, vec![3, 3, 3, 2]).expect("11/16");
    let mut scheduler = ClickScheduler::fixed(
        120,
        &eleven,
        SubdivisionMode::Eighth,
        RATE,
        ClickFrequencies::default(),
        0,
    );
    assert_eq!(times(&scheduler.next_bar().expect("bar")), vec![0, 18_000, 36_000, 54_000]);
    assert_eq!(scheduler.next_click_sample_time(), 66_000);
}

#[test]
fn long_runs_do_not_drift() {
    let mut scheduler = ClickScheduler::fixed(
        113,
        &ts("4/4"),
        SubdivisionMode::Quarter,
        44_100,
        ClickFrequencies::default(),
        0,
    );
    let clicks = scheduler.schedule_bars(1_000);
    let quarter = 60.0 / 113.0 * 44_100.0;
    for (n, click) in clicks.iter().enumerate() {
        let exact = n as f64 * quarter;
        assert!((click.sample_time as f64 - exact).abs() <= 0.5 + 1e-6, "click {n}");
    }
}

#[test]
fn zero_tempo_schedules_nothing() {
    let mut scheduler = fixed(0, "4/4", SubdivisionMode::Quarter);
    assert!(scheduler.is_finished());
    assert_eq!(scheduler.next_bar(), None);
    assert!(scheduler.schedule_bars(10).is_empty());
}

#[test]
fn score_playback_runs_to_the_last_bar() {
    let score = plain_score(3, Vec::new());
    let mut scheduler = ClickScheduler::score(
        score,
        2,
        1.0,
        SubdivisionMode::Quarter,
        false,
        RATE,
        ClickFrequencies::default(),
        0,
    );
    let clicks = scheduler.schedule_all();
    let bars: Vec<i32> = clicks.iter().map(|click| click.bar_number).collect();
    assert_eq!(bars, vec![2, 2, 2, 2, 3, 3, 3, 3]);
    assert!(scheduler.is_finished());
    assert_eq!(scheduler.next_click_sample_time(), 192_000);
    assert_eq!(scheduler.next_bar(), None);
}

#[test]
fn count_in_bar_precedes_the_start_bar() {
    let score = plain_score(4, Vec::new());
    let mut scheduler = ClickScheduler::score(
        score,
        2,
        1.0,
        SubdivisionMode::Quarter,
        true,
        RATE,
        ClickFrequencies::default(),
        0,
    );
    let clicks = scheduler.schedule_all();
    assert_eq!(clicks.len(), 16);

    let count_in = &clicks[..4];
    assert!(count_in.iter().all(|click| click.bar_number == COUNT_IN_BAR));
    assert!(count_in.iter().all(|click| click.is_count_in()));
    assert_eq!(times(count_in), vec![0, 24_000, 48_000, 72_000]);
    assert_eq!(count_in[0].sound, ClickSound::Downbeat);

    let bars: Vec<i32> = clicks[4..].iter().map(|click| click.bar_number).collect();
    assert_eq!(bars, vec![2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4]);
    assert_eq!(clicks[4].sample_time, 96_000);
}

#[test]
fn count_in_uses_the_start_bar_tempo_and_meter() {
    let score = Arc::new(
        Score::new(
            ScoreHeader::new("Study", "Anon", 120, 4),
            vec![TempoChange::tempo(3, 60)],
            Vec::new(),
            vec![scorepulse_domain_score::Bar::new(3, ts("3/4"))],
        )
        .expect("score"),
    );
    let mut scheduler = ClickScheduler::score(
        score,
        3,
        1.0,
        SubdivisionMode::Quarter,
        true,
        RATE,
        ClickFrequencies::default(),
        0,
    );
    let count_in = scheduler.next_bar().expect("count-in");
    assert_eq!(times(&count_in), vec![0, 48_000, 96_000]);
    assert!(count_in.iter().all(|click| click.tempo_for_display == 60));
}

#[test]
fn transition_bars_interpolate_per_click() {
    let score = plain_score(
        12,
        vec![
            TempoChange::transition(5, Transition::Accelerando),
            TempoChange::tempo(9, 160),
        ],
    );
    let mut scheduler = ClickScheduler::score(
        score,
        5,
        1.0,
        SubdivisionMode::Quarter,
        false,
        RATE,
        ClickFrequencies::default(),
        0,
    );
    let bar = scheduler.next_bar().expect("bar 5");
    let tempos: Vec<u32> = bar.iter().map(|click| click.tempo_for_display).collect();
    assert_eq!(tempos, vec![120, 123, 125, 128]);
    assert_eq!(bar[1].sample_time, 24_000);
    assert_eq!(bar[2].sample_time, 47_415);

    let bar_seven = {
        scheduler.next_bar();
        scheduler.next_bar().expect("bar 7")
    };
    assert_eq!(bar_seven[0].tempo_for_display, 140);
    assert_eq!(bar_seven[2].tempo_for_display, 145);
}

#[test]
fn tempo_multiplier_scales_time_and_display() {
    let score = plain_score(2, Vec::new());
    let mut scheduler = ClickScheduler::score(
        score,
        1,
        0.5,
        SubdivisionMode::Quarter,
        false,
        RATE,
        ClickFrequencies::default(),
        0,
    );
    let bar = scheduler.next_bar().expect("bar");
    assert_eq!(times(&bar), vec![0, 48_000, 96_000, 144_000]);
    assert!(bar.iter().all(|click| click.tempo_for_display == 60));
}

#[test]
fn invalid_score_requests_schedule_nothing() {
    let score = plain_score(4, Vec::new());
    let cases = [(0, 1.0), (5, 1.0), (1, 0.0), (1, -1.0), (1, f64::NAN)];
    for (start_bar, multiplier) in cases {
        let mut scheduler = ClickScheduler::score(
            score.clone(),
            start_bar,
            multiplier,
            SubdivisionMode::Quarter,
            true,
            RATE,
            ClickFrequencies::default(),
            0,
        );
        assert!(scheduler.is_finished(), "bar {start_bar} x{multiplier}");
        assert!(scheduler.schedule_all().is_empty());
    }
}
