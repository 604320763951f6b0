use crate::model::ScoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SUPPORTED_BEAT_UNITS: [u32; 4] = [2, 4, 8, 16];

/// A meter plus an optional grouping of its raw subdivisions.
///
/// Construction validates the meter, so every value in circulation has a
/// beat unit of 2, 4, 8 or 16, and any explicit accent pattern has positive
/// entries summing to `beats_per_bar`. `/16` meters always carry a pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TimeSignatureRepr", into = "TimeSignatureRepr")]
pub struct TimeSignature {
    beats_per_bar: u32,
    beat_unit: u32,
    accent_pattern: Option<Vec<u32>>,
}

impl TimeSignature {
    pub const fn common() -> Self {
        Self {
            beats_per_bar: 4,
            beat_unit: 4,
            accent_pattern: None,
        }
    }

    pub fn new(beats_per_bar: u32, beat_unit: u32) -> Result<Self, ScoreError> {
        Self::build(beats_per_bar, beat_unit, None)
    }

    pub fn with_accent_pattern(
        beats_per_bar: u32,
        beat_unit: u32,
        accent_pattern: Vec<u32>,
    ) -> Result<Self, ScoreError> {
        Self::build(beats_per_bar, beat_unit, Some(accent_pattern))
    }

    /// Parses `"7/8"` and attaches an optional explicit grouping.
    pub fn parse_with_pattern(text: &str, accent_pattern: Option<Vec<u32>>) -> Result<Self, ScoreError> {
        let (beats_per_bar, beat_unit) = parse_fraction(text)?;
        Self::build(beats_per_bar, beat_unit, accent_pattern)
    }

    fn build(
        beats_per_bar: u32,
        beat_unit: u32,
        accent_pattern: Option<Vec<u32>>,
    ) -> Result<Self, ScoreError> {
        if beats_per_bar == 0 || !SUPPORTED_BEAT_UNITS.contains(&beat_unit) {
            return Err(ScoreError::InvalidTimeSignature(format!(
                "{}/{}",
                beats_per_bar, beat_unit
            )));
        }

        if let Some(pattern) = accent_pattern.as_ref() {
            let sum: u32 = pattern.iter().sum();
            if pattern.is_empty() || pattern.contains(&0) || sum != beats_per_bar {
                return Err(ScoreError::InvalidAccentPattern {
                    pattern: pattern.clone(),
                    beats_per_bar,
                });
            }
        } else if beat_unit == 16 {
            return Err(ScoreError::MissingAccentPattern(format!(
                "{}/{}",
                beats_per_bar, beat_unit
            )));
        }

        Ok(Self {
            beats_per_bar,
            beat_unit,
            accent_pattern,
        })
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn beat_unit(&self) -> u32 {
        self.beat_unit
    }

    pub fn accent_pattern(&self) -> Option<&[u32]> {
        self.accent_pattern.as_deref()
    }

    /// Grouping actually used for accents: the explicit pattern when present,
    /// otherwise the derived default for `/8` meters. Simple `/2` and `/4`
    /// meters without a pattern have no grouping.
    pub fn effective_accent_pattern(&self) -> Option<Vec<u32>> {
        if let Some(pattern) = self.accent_pattern.as_ref() {
            return Some(pattern.clone());
        }
        match self.beat_unit {
            8 => Some(default_eighth_grouping(self.beats_per_bar)),
            _ => None,
        }
    }

    pub fn has_groupings(&self) -> bool {
        self.accent_pattern.is_some() || self.beat_unit == 8
    }

    /// Number of felt beats in a bar.
    pub fn actual_beats_per_bar(&self) -> u32 {
        match self.effective_accent_pattern() {
            Some(pattern) => pattern.len() as u32,
            None => self.beats_per_bar,
        }
    }

    /// Raw-subdivision index at which each felt beat starts.
    /// `[2,2,3]` gives `[0,2,4]`; an ungrouped meter gives every beat index.
    pub fn accent_positions(&self) -> Vec<u32> {
        let Some(pattern) = self.effective_accent_pattern() else {
            return (0..self.beats_per_bar).collect();
        };

        let mut positions = Vec::with_capacity(pattern.len());
        let mut cursor = 0;
        for group in &pattern {
            positions.push(cursor);
            cursor += group;
        }
        positions
    }

    /// Length of one raw beat unit measured in quarter notes.
    pub fn unit_in_quarters(&self) -> f64 {
        4.0 / self.beat_unit as f64
    }

    /// Length of the whole bar measured in quarter notes.
    pub fn bar_in_quarters(&self) -> f64 {
        self.beats_per_bar as f64 * self.unit_in_quarters()
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::common()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats_per_bar, self.beat_unit)
    }
}

impl FromStr for TimeSignature {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with_pattern(s, None)
    }
}

/// Default grouping of an `/8` meter: threes when the numerator divides by
/// three, otherwise twos closed by a final two or three.
pub fn default_eighth_grouping(beats_per_bar: u32) -> Vec<u32> {
    if beats_per_bar % 3 == 0 {
        return vec![3; (beats_per_bar / 3) as usize];
    }
    if beats_per_bar < 2 {
        return vec![beats_per_bar];
    }
    if beats_per_bar % 2 == 0 {
        return vec![2; (beats_per_bar / 2) as usize];
    }
    let mut pattern = vec![2; ((beats_per_bar - 3) / 2) as usize];
    pattern.push(3);
    pattern
}

/// Parses `"2+2+3"` into `[2, 2, 3]`.
pub fn parse_accent_pattern(text: &str) -> Option<Vec<u32>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let pattern = text
        .split('+')
        .map(|part| part.trim().parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    if pattern.iter().all(|group| *group > 0) {
        Some(pattern)
    } else {
        None
    }
}

fn parse_fraction(text: &str) -> Result<(u32, u32), ScoreError> {
    let invalid = || ScoreError::InvalidTimeSignature(text.to_string());
    let (numerator, denominator) = text.trim().split_once('/').ok_or_else(invalid)?;
    let is_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(numerator) || !is_digits(denominator) {
        return Err(invalid());
    }
    let numerator = numerator.parse::<u32>().map_err(|_| invalid())?;
    let denominator = denominator.parse::<u32>().map_err(|_| invalid())?;
    Ok((numerator, denominator))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum TimeSignatureRepr {
    Plain(String),
    Accented {
        #[serde(rename = "timeSignature")]
        time_signature: String,
        #[serde(rename = "accentPattern", default)]
        accent_pattern: Option<Vec<u32>>,
    },
}

impl TryFrom<TimeSignatureRepr> for TimeSignature {
    type Error = ScoreError;

    fn try_from(repr: TimeSignatureRepr) -> Result<Self, Self::Error> {
        match repr {
            TimeSignatureRepr::Plain(text) => text.parse(),
            TimeSignatureRepr::Accented {
                time_signature,
                accent_pattern,
            } => Self::parse_with_pattern(&time_signature, accent_pattern),
        }
    }
}

impl From<TimeSignature> for TimeSignatureRepr {
    fn from(ts: TimeSignature) -> Self {
        let text = ts.to_string();
        match ts.accent_pattern {
            Some(pattern) => TimeSignatureRepr::Accented {
                time_signature: text,
                accent_pattern: Some(pattern),
            },
            None => TimeSignatureRepr::Plain(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grouping_closes_with_two_or_three() {
        assert_eq!(default_eighth_grouping(5), vec![2, 3]);
        assert_eq!(default_eighth_grouping(7), vec![2, 2, 3]);
        assert_eq!(default_eighth_grouping(8), vec![2, 2, 2, 2]);
        assert_eq!(default_eighth_grouping(11), vec![2, 2, 2, 2, 3]);
        assert_eq!(default_eighth_grouping(12), vec![3, 3, 3, 3]);
        assert_eq!(default_eighth_grouping(1), vec![1]);
    }

    #[test]
    fn fraction_rejects_garbage() {
        assert!(parse_fraction("4/4").is_ok());
        assert!(parse_fraction("4-4").is_err());
        assert!(parse_fraction("/4").is_err());
        assert!(parse_fraction("a/4").is_err());
        assert!(parse_fraction("+3/4").is_err());
    }
}
