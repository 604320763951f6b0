use crate::click_planner::ClickPlanner;
use crate::config::ClickFrequencies;
use crate::timing::quarters_to_samples;
use scorepulse_domain_score::{Score, TimeSignature};
use scorepulse_ports::playback::{ScheduledClick, SubdivisionMode, COUNT_IN_BAR};
use scorepulse_ports::types::SampleTime;
use std::sync::Arc;

#[derive(Clone, Debug)]
enum Source {
    Fixed {
        bpm: u32,
        planner: ClickPlanner,
        next_bar: u32,
    },
    Score {
        score: Arc<Score>,
        tempo_multiplier: f64,
        next_bar: u32,
        count_in: bool,
    },
    Exhausted,
}

/// Turns a playback request into absolute-time clicks, one bar at a time.
///
/// Pure: it never touches the audio path. Click times are accumulated in
/// fractional samples and rounded once per click, so long runs do not drift.
#[derive(Clone, Debug)]
pub struct ClickScheduler {
    source: Source,
    subdivision: SubdivisionMode,
    sample_rate_hz: u32,
    frequencies: ClickFrequencies,
    cursor: f64,
}

impl ClickScheduler {
    /// Constant-tempo metronome. A tempo of zero schedules nothing.
    pub fn fixed(
        bpm: u32,
        time_signature: &TimeSignature,
        subdivision: SubdivisionMode,
        sample_rate_hz: u32,
        frequencies: ClickFrequencies,
        start_sample: SampleTime,
    ) -> Self {
        let source = if bpm == 0 || sample_rate_hz == 0 {
            Source::Exhausted
        } else {
            Source::Fixed {
                bpm,
                planner: ClickPlanner::new(time_signature, subdivision),
                next_bar: 1,
            }
        };
        Self {
            source,
            subdivision,
            sample_rate_hz,
            frequencies,
            cursor: start_sample as f64,
        }
    }

    /// Plays `score` from `start_bar` to its last bar. An out-of-range start
    /// bar or a non-positive multiplier schedules nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn score(
        score: Arc<Score>,
        start_bar: u32,
        tempo_multiplier: f64,
        subdivision: SubdivisionMode,
        count_in: bool,
        sample_rate_hz: u32,
        frequencies: ClickFrequencies,
        start_sample: SampleTime,
    ) -> Self {
        let playable = score.contains_bar(start_bar)
            && tempo_multiplier.is_finite()
            && tempo_multiplier > 0.0
            && sample_rate_hz > 0;
        let source = if playable {
            Source::Score {
                score,
                tempo_multiplier,
                next_bar: start_bar,
                count_in,
            }
        } else {
            Source::Exhausted
        };
        Self {
            source,
            subdivision,
            sample_rate_hz,
            frequencies,
            cursor: start_sample as f64,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.source, Source::Exhausted)
    }

    /// Sample time of the next click that would be produced. Once finished
    /// this is the end of the last scheduled bar.
    pub fn next_click_sample_time(&self) -> SampleTime {
        self.cursor.round() as SampleTime
    }

    /// Length of one bar in samples for fixed playback.
    pub fn fixed_bar_samples(&self) -> Option<u64> {
        match &self.source {
            Source::Fixed { bpm, planner, .. } => Some(
                planner
                    .bar_duration_samples(*bpm as f64, self.sample_rate_hz)
                    .round() as u64,
            ),
            _ => None,
        }
    }

    /// Emits the clicks of the next bar, or `None` when playback is over.
    pub fn next_bar(&mut self) -> Option<Vec<ScheduledClick>> {
        match &mut self.source {
            Source::Exhausted => None,
            Source::Fixed {
                bpm,
                planner,
                next_bar,
            } => {
                let bar_number = *next_bar as i32;
                let tempo = *bpm as f64;
                *next_bar += 1;
                let planner = planner.clone();
                Some(self.emit(&planner, bar_number, |_| tempo))
            }
            Source::Score {
                score,
                tempo_multiplier,
                next_bar,
                count_in,
            } => {
                let score = Arc::clone(score);
                let multiplier = *tempo_multiplier;
                let bar = *next_bar;
                let planner = ClickPlanner::new(&score.time_signature_at(bar), self.subdivision);

                if std::mem::take(count_in) {
                    let tempo = score.tempo_at_progress(bar, 0.0) as f64 * multiplier;
                    return Some(self.emit(&planner, COUNT_IN_BAR, |_| tempo));
                }

                if bar >= score.total_bars() {
                    self.source = Source::Exhausted;
                } else {
                    *next_bar += 1;
                }

                let clicks = if score.is_in_transition(bar) {
                    self.emit(&planner, bar as i32, |progress| {
                        score.tempo_at_progress(bar, progress) as f64 * multiplier
                    })
                } else {
                    let tempo = score.tempo_at(bar) as f64 * multiplier;
                    self.emit(&planner, bar as i32, |_| tempo)
                };
                Some(clicks)
            }
        }
    }

    /// Up to `max_bars` bars worth of clicks, in time order.
    pub fn schedule_bars(&mut self, max_bars: usize) -> Vec<ScheduledClick> {
        let mut clicks = Vec::new();
        for _ in 0..max_bars {
            match self.next_bar() {
                Some(bar) => clicks.extend(bar),
                None => break,
            }
        }
        clicks
    }

    pub fn schedule_all(&mut self) -> Vec<ScheduledClick> {
        let mut clicks = Vec::new();
        while let Some(bar) = self.next_bar() {
            clicks.extend(bar);
        }
        clicks
    }

    fn emit(
        &mut self,
        planner: &ClickPlanner,
        bar_number: i32,
        tempo_at: impl Fn(f64) -> f64,
    ) -> Vec<ScheduledClick> {
        let mut clicks = Vec::with_capacity(planner.clicks().len());
        for planned in planner.clicks() {
            let tempo = tempo_at(planned.bar_progress);
            clicks.push(ScheduledClick {
                sample_time: self.cursor.round() as SampleTime,
                sound: planned.sound,
                frequency_hz: self.frequencies.for_sound(planned.sound),
                bar_number,
                beat_number: planned.beat_number,
                tempo_for_display: tempo.round() as u32,
            });
            self.cursor += quarters_to_samples(planned.duration_quarters, tempo, self.sample_rate_hz);
        }
        clicks
    }
}
