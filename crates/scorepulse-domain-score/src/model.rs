use crate::time_signature::TimeSignature;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoreError {
    #[error("invalid time signature: {0}")]
    InvalidTimeSignature(String),
    #[error("accent pattern {pattern:?} does not sum to {beats_per_bar}")]
    InvalidAccentPattern { pattern: Vec<u32>, beats_per_bar: u32 },
    #[error("time signature {0} requires an accent pattern")]
    MissingAccentPattern(String),
    #[error("invalid tempo {tempo} at bar {bar}")]
    InvalidTempo { bar: u32, tempo: u32 },
    #[error("{list} entry at bar {bar} is outside 1..={total_bars}")]
    BarOutOfRange {
        list: &'static str,
        bar: u32,
        total_bars: u32,
    },
    #[error("{list} has more than one entry at bar {bar}")]
    DuplicateBar { list: &'static str, bar: u32 },
    #[error("total bars must be at least 1")]
    InvalidTotalBars,
    #[error("tempo change at bar {0} has neither a tempo nor a transition")]
    TempoChangeWithoutTempo(u32),
    #[error("json error: {0}")]
    Json(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    #[default]
    None,
    Accelerando,
    Ritardando,
}

impl Transition {
    pub fn is_active(self) -> bool {
        self != Transition::None
    }
}

/// A time-signature change. Stored only where the meter differs from the
/// previous stored bar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bar {
    pub id: String,
    pub number: u32,
    pub time_signature: TimeSignature,
}

impl Bar {
    pub fn new(number: u32, time_signature: TimeSignature) -> Self {
        Self {
            id: new_id(),
            number,
            time_signature,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoChange {
    pub id: String,
    pub bar: u32,
    pub tempo: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marking: Option<String>,
    #[serde(default)]
    pub transition: Transition,
}

impl TempoChange {
    pub fn tempo(bar: u32, tempo: u32) -> Self {
        Self {
            id: new_id(),
            bar,
            tempo: Some(tempo),
            marking: None,
            transition: Transition::None,
        }
    }

    /// A pure transition marker with no resolved tempo of its own.
    pub fn transition(bar: u32, transition: Transition) -> Self {
        Self {
            id: new_id(),
            bar,
            tempo: None,
            marking: None,
            transition,
        }
    }

    pub fn with_marking(mut self, marking: impl Into<String>) -> Self {
        self.marking = Some(marking.into());
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transition = transition;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RehearsalMark {
    pub id: String,
    pub name: String,
    pub bar: u32,
}

impl RehearsalMark {
    pub fn new(name: impl Into<String>, bar: u32) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            bar,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoreHeader {
    pub id: String,
    pub title: String,
    pub composer: String,
    pub default_tempo: u32,
    pub total_bars: u32,
}

impl ScoreHeader {
    pub fn new(
        title: impl Into<String>,
        composer: impl Into<String>,
        default_tempo: u32,
        total_bars: u32,
    ) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            composer: composer.into(),
            default_tempo,
            total_bars,
        }
    }
}

/// Span of bars `[start_bar, end_bar)` over which tempo moves linearly from
/// `start_tempo` to `end_tempo`. `end_bar` is the resolution bar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionRange {
    pub kind: Transition,
    pub start_bar: u32,
    pub end_bar: u32,
    pub start_tempo: u32,
    pub end_tempo: u32,
}

impl TransitionRange {
    pub fn contains(&self, bar: u32) -> bool {
        bar >= self.start_bar && bar < self.end_bar
    }

    /// Interpolated tempo; bars outside the range hold its start or end tempo.
    pub fn tempo_at(&self, bar: u32, beat_progress: f64) -> u32 {
        if bar < self.start_bar {
            return self.start_tempo;
        }
        if bar >= self.end_bar {
            return self.end_tempo;
        }
        let progress = beat_progress.clamp(0.0, 1.0);
        let span = (self.end_bar - self.start_bar) as f64;
        let overall = ((bar - self.start_bar) as f64 + progress) / span;
        let start = self.start_tempo as f64;
        let end = self.end_tempo as f64;
        (start + (end - start) * overall).round() as u32
    }
}

/// Immutable score: three sparse change-lists sorted ascending by bar.
/// Editing produces a new `Score`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawScore")]
pub struct Score {
    id: String,
    title: String,
    composer: String,
    default_tempo: u32,
    tempo_changes: Vec<TempoChange>,
    rehearsal_marks: Vec<RehearsalMark>,
    bars: Vec<Bar>,
    total_bars: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScore {
    id: String,
    title: String,
    composer: String,
    default_tempo: u32,
    #[serde(default)]
    tempo_changes: Vec<TempoChange>,
    #[serde(default)]
    rehearsal_marks: Vec<RehearsalMark>,
    #[serde(default)]
    bars: Vec<Bar>,
    total_bars: u32,
}

impl TryFrom<RawScore> for Score {
    type Error = ScoreError;

    fn try_from(raw: RawScore) -> Result<Self, Self::Error> {
        Score::new(
            ScoreHeader {
                id: raw.id,
                title: raw.title,
                composer: raw.composer,
                default_tempo: raw.default_tempo,
                total_bars: raw.total_bars,
            },
            raw.tempo_changes,
            raw.rehearsal_marks,
            raw.bars,
        )
    }
}

impl Score {
    pub fn new(
        header: ScoreHeader,
        mut tempo_changes: Vec<TempoChange>,
        mut rehearsal_marks: Vec<RehearsalMark>,
        mut bars: Vec<Bar>,
    ) -> Result<Self, ScoreError> {
        let total_bars = header.total_bars;
        if total_bars == 0 {
            return Err(ScoreError::InvalidTotalBars);
        }
        if header.default_tempo == 0 {
            return Err(ScoreError::InvalidTempo { bar: 1, tempo: 0 });
        }

        bars.sort_by_key(|bar| bar.number);
        tempo_changes.sort_by_key(|change| change.bar);
        rehearsal_marks.sort_by_key(|mark| mark.bar);

        check_bars("bars", bars.iter().map(|bar| bar.number), total_bars)?;
        check_bars("tempoChanges", tempo_changes.iter().map(|c| c.bar), total_bars)?;
        check_bars("rehearsalMarks", rehearsal_marks.iter().map(|m| m.bar), total_bars)?;

        for change in &tempo_changes {
            match change.tempo {
                Some(0) => {
                    return Err(ScoreError::InvalidTempo {
                        bar: change.bar,
                        tempo: 0,
                    })
                }
                None if !change.transition.is_active() => {
                    return Err(ScoreError::TempoChangeWithoutTempo(change.bar))
                }
                _ => {}
            }
        }

        Ok(Self {
            id: header.id,
            title: header.title,
            composer: header.composer,
            default_tempo: header.default_tempo,
            tempo_changes,
            rehearsal_marks,
            bars,
            total_bars,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ScoreError> {
        serde_json::from_str(json).map_err(|e| ScoreError::Json(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, ScoreError> {
        serde_json::to_string_pretty(self).map_err(|e| ScoreError::Json(e.to_string()))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn composer(&self) -> &str {
        &self.composer
    }

    pub fn default_tempo(&self) -> u32 {
        self.default_tempo
    }

    pub fn total_bars(&self) -> u32 {
        self.total_bars
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn tempo_changes(&self) -> &[TempoChange] {
        &self.tempo_changes
    }

    pub fn rehearsal_marks(&self) -> &[RehearsalMark] {
        &self.rehearsal_marks
    }

    pub fn contains_bar(&self, bar: u32) -> bool {
        bar >= 1 && bar <= self.total_bars
    }

    /// Meter of the most recent stored bar at or before `bar`, else 4/4.
    pub fn time_signature_at(&self, bar: u32) -> TimeSignature {
        let end = self.bars.partition_point(|stored| stored.number <= bar);
        match end.checked_sub(1) {
            Some(idx) => self.bars[idx].time_signature.clone(),
            None => TimeSignature::common(),
        }
    }

    /// Most recent resolved tempo at or before `bar`, else the default tempo.
    pub fn tempo_at(&self, bar: u32) -> u32 {
        let end = self.tempo_changes.partition_point(|change| change.bar <= bar);
        self.tempo_changes[..end]
            .iter()
            .rev()
            .find_map(|change| change.tempo)
            .unwrap_or(self.default_tempo)
    }

    /// Tempo at a point inside `bar`, interpolated when the bar lies inside a
    /// transition range.
    pub fn tempo_at_progress(&self, bar: u32, beat_progress: f64) -> u32 {
        match self.transition_range_at(bar) {
            Some(range) => range.tempo_at(bar, beat_progress),
            None => self.tempo_at(bar),
        }
    }

    pub fn is_in_transition(&self, bar: u32) -> bool {
        self.transition_range_at(bar).is_some()
    }

    /// Earliest transition range containing `bar`. A run of consecutive
    /// markers resolves to the range opened by the first of them. Markers
    /// with no later resolved tempo are open-ended and never match.
    pub fn transition_range_at(&self, bar: u32) -> Option<TransitionRange> {
        let end = self.tempo_changes.partition_point(|change| change.bar <= bar);
        for (idx, marker) in self.tempo_changes[..end].iter().enumerate() {
            if !marker.transition.is_active() {
                continue;
            }
            let Some(resolution) = self.tempo_changes[idx + 1..]
                .iter()
                .find(|change| change.bar > marker.bar && change.tempo.is_some())
            else {
                continue;
            };
            if bar >= resolution.bar {
                continue;
            }
            let start_tempo = self.tempo_before(marker.bar);
            return Some(TransitionRange {
                kind: marker.transition,
                start_bar: marker.bar,
                end_bar: resolution.bar,
                start_tempo,
                end_tempo: resolution.tempo.unwrap_or(start_tempo),
            });
        }
        None
    }

    /// Marking of the last tempo change at or before `bar`. An unmarked
    /// change clears any earlier marking.
    pub fn tempo_marking_at(&self, bar: u32) -> Option<&str> {
        let end = self.tempo_changes.partition_point(|change| change.bar <= bar);
        self.tempo_changes[..end]
            .last()
            .and_then(|change| change.marking.as_deref())
    }

    pub fn rehearsal_mark_at(&self, bar: u32) -> Option<&RehearsalMark> {
        let end = self.rehearsal_marks.partition_point(|mark| mark.bar <= bar);
        end.checked_sub(1).map(|idx| &self.rehearsal_marks[idx])
    }

    pub fn next_rehearsal_mark(&self, after: u32) -> Option<&RehearsalMark> {
        self.rehearsal_marks.iter().find(|mark| mark.bar > after)
    }

    pub fn previous_rehearsal_mark(&self, before: u32) -> Option<&RehearsalMark> {
        self.rehearsal_marks.iter().rev().find(|mark| mark.bar < before)
    }

    fn tempo_before(&self, bar: u32) -> u32 {
        match bar.checked_sub(1) {
            Some(prev) if prev >= 1 => self.tempo_at(prev),
            _ => self.default_tempo,
        }
    }
}

fn check_bars(
    list: &'static str,
    numbers: impl Iterator<Item = u32>,
    total_bars: u32,
) -> Result<(), ScoreError> {
    let mut previous = None;
    for bar in numbers {
        if bar == 0 || bar > total_bars {
            return Err(ScoreError::BarOutOfRange {
                list,
                bar,
                total_bars,
            });
        }
        if previous == Some(bar) {
            return Err(ScoreError::DuplicateBar { list, bar });
        }
        previous = Some(bar);
    }
    Ok(())
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}
