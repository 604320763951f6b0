use crate::model::{new_id, Bar, RehearsalMark, Score, ScoreError, ScoreHeader, TempoChange, Transition};
use crate::time_signature::{parse_accent_pattern, TimeSignature};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const MIN_IMPORT_TEMPO: u32 = 20;
pub const MAX_IMPORT_TEMPO: u32 = 300;

const COL_BAR: &str = "BAR NUMBER";
const COL_TIME_SIGNATURE: &str = "TIME SIGNATURE";
const COL_DIVISION: &str = "DIVISION";
const COL_TEMPO: &str = "TEMPO";
const COL_REHEARSAL: &str = "REHEARSAL MARKING";
const COL_TEXT: &str = "TEXT MARKING";

#[derive(thiserror::Error, Debug)]
pub enum CsvImportError {
    #[error("io error: {0}")]
    Io(String),
    #[error("missing column: {0}")]
    MissingColumn(&'static str),
    #[error("no valid bar data found")]
    Empty,
    #[error("bar numbers must be sequential starting from 1: expected {expected}, got {found}")]
    NonSequentialBars { expected: u32, found: u32 },
    #[error("invalid time signature '{value}' at bar {bar}")]
    InvalidTimeSignature { bar: u32, value: String },
    #[error("invalid division '{value}' at bar {bar}, use a form like '2+3' or '2+2+3'")]
    InvalidDivision { bar: u32, value: String },
    #[error("division at bar {bar} sums to {sum}, but time signature '{time_signature}' requires {required}")]
    DivisionMismatch {
        bar: u32,
        sum: u32,
        time_signature: String,
        required: u32,
    },
    #[error("time signature '{time_signature}' at bar {bar} requires a division")]
    DivisionRequired { bar: u32, time_signature: String },
    #[error("invalid tempo '{value}' at bar {bar}")]
    InvalidTempo { bar: u32, value: String },
    #[error("no tempo found, at least one bar must have a tempo")]
    NoTempo,
    #[error("no time signature found, at least one bar must have a time signature")]
    NoTimeSignature,
    #[error("score error: {0}")]
    Score(#[from] ScoreError),
}

#[derive(Clone, Debug, Default)]
struct CsvRow {
    bar: u32,
    time_signature: String,
    division: String,
    tempo: String,
    rehearsal: String,
    text: String,
}

pub fn import_csv_path(path: &Path, title: &str, composer: &str) -> Result<Score, CsvImportError> {
    let data = fs::read_to_string(path).map_err(|e| CsvImportError::Io(e.to_string()))?;
    import_csv_str(&data, title, composer)
}

/// Builds a score from a semicolon-delimited bar sheet. Only bars where
/// something changes produce entries in the score's change-lists.
pub fn import_csv_str(data: &str, title: &str, composer: &str) -> Result<Score, CsvImportError> {
    let mut rows = parse_rows(data)?;
    if rows.is_empty() {
        return Err(CsvImportError::Empty);
    }
    rows.sort_by_key(|row| row.bar);

    for (expected, row) in (1u32..).zip(rows.iter()) {
        if row.bar != expected {
            return Err(CsvImportError::NonSequentialBars {
                expected,
                found: row.bar,
            });
        }
    }

    let default_tempo = first_tempo(&rows)?;

    let mut bars = Vec::new();
    let mut tempo_changes = Vec::new();
    let mut rehearsal_marks = Vec::new();
    let mut current_signature: Option<String> = None;
    let mut current_pattern: Option<Vec<u32>> = None;

    for row in &rows {
        let pattern = if row.division.is_empty() {
            None
        } else {
            Some(
                parse_accent_pattern(&row.division).ok_or_else(|| CsvImportError::InvalidDivision {
                    bar: row.bar,
                    value: row.division.clone(),
                })?,
            )
        };

        let mut signature_changed = false;
        if !row.time_signature.is_empty() {
            validate_signature_text(row.bar, &row.time_signature)?;
            if current_signature.as_deref() != Some(row.time_signature.as_str()) {
                signature_changed = true;
                current_signature = Some(row.time_signature.clone());
            }
        }

        if let Some(pattern) = pattern.as_ref() {
            let Some(signature) = current_signature.as_deref() else {
                return Err(CsvImportError::InvalidDivision {
                    bar: row.bar,
                    value: row.division.clone(),
                });
            };
            check_division_sum(row.bar, pattern, signature)?;
        }

        if let Some(signature) = current_signature.as_deref() {
            if signature.ends_with("/16") && signature_changed && pattern.is_none() {
                return Err(CsvImportError::DivisionRequired {
                    bar: row.bar,
                    time_signature: signature.to_string(),
                });
            }
        }

        let pattern_changed = pattern.is_some() && pattern != current_pattern;
        if signature_changed || pattern_changed {
            // a meter change without a division resets the grouping
            current_pattern = pattern;
            if let Some(signature) = current_signature.as_deref() {
                let time_signature =
                    TimeSignature::parse_with_pattern(signature, current_pattern.clone()).map_err(
                        |_| CsvImportError::InvalidTimeSignature {
                            bar: row.bar,
                            value: signature.to_string(),
                        },
                    )?;
                bars.push(Bar::new(row.bar, time_signature));
            }
        }

        if !row.tempo.is_empty() {
            let tempo = validate_tempo(row.bar, &row.tempo)?;
            tempo_changes.push(TempoChange {
                id: new_id(),
                bar: row.bar,
                tempo: Some(tempo),
                marking: (!row.text.is_empty()).then(|| row.text.clone()),
                transition: Transition::None,
            });
        }

        if !row.rehearsal.is_empty() {
            rehearsal_marks.push(RehearsalMark::new(row.rehearsal.clone(), row.bar));
        }
    }

    let total_bars = rows.last().map(|row| row.bar).unwrap_or(0);
    let header = ScoreHeader::new(title, composer, default_tempo, total_bars);
    Ok(Score::new(header, tempo_changes, rehearsal_marks, bars)?)
}

fn parse_rows(data: &str) -> Result<Vec<CsvRow>, CsvImportError> {
    let mut lines = data.lines().filter(|line| !line.trim().is_empty());
    let Some(header) = lines.next() else {
        return Err(CsvImportError::Empty);
    };

    let columns: HashMap<String, usize> = split_fields(header.trim_start_matches('\u{feff}'))
        .into_iter()
        .enumerate()
        .map(|(idx, name)| (name.to_uppercase(), idx))
        .collect();
    let bar_col = *columns
        .get(COL_BAR)
        .ok_or(CsvImportError::MissingColumn(COL_BAR))?;
    let col = |name: &str| columns.get(name).copied();
    let (ts_col, div_col, tempo_col, reh_col, text_col) = (
        col(COL_TIME_SIGNATURE),
        col(COL_DIVISION),
        col(COL_TEMPO),
        col(COL_REHEARSAL),
        col(COL_TEXT),
    );

    let mut rows = Vec::new();
    for line in lines {
        let fields = split_fields(line);
        let field = |idx: Option<usize>| {
            idx.and_then(|i| fields.get(i))
                .cloned()
                .unwrap_or_default()
        };

        let bar_text = field(Some(bar_col));
        if bar_text.is_empty() {
            continue;
        }
        let Ok(bar) = bar_text.parse::<u32>() else {
            tracing::warn!("skipping row with invalid bar number '{}'", bar_text);
            continue;
        };

        rows.push(CsvRow {
            bar,
            time_signature: field(ts_col),
            division: field(div_col),
            tempo: field(tempo_col),
            rehearsal: field(reh_col),
            text: field(text_col),
        });
    }
    Ok(rows)
}

fn split_fields(line: &str) -> Vec<String> {
    line.split(';')
        .map(|field| field.trim().trim_matches('"').trim().to_string())
        .collect()
}

fn first_tempo(rows: &[CsvRow]) -> Result<u32, CsvImportError> {
    let mut default_tempo = None;
    let mut has_signature = false;
    for row in rows {
        if default_tempo.is_none() && !row.tempo.is_empty() {
            default_tempo = Some(validate_tempo(row.bar, &row.tempo)?);
        }
        if !has_signature && !row.time_signature.is_empty() {
            validate_signature_text(row.bar, &row.time_signature)?;
            has_signature = true;
        }
        if default_tempo.is_some() && has_signature {
            break;
        }
    }

    let tempo = default_tempo.ok_or(CsvImportError::NoTempo)?;
    if !has_signature {
        return Err(CsvImportError::NoTimeSignature);
    }
    Ok(tempo)
}

fn validate_tempo(bar: u32, value: &str) -> Result<u32, CsvImportError> {
    match value.parse::<u32>() {
        Ok(tempo) if (MIN_IMPORT_TEMPO..=MAX_IMPORT_TEMPO).contains(&tempo) => Ok(tempo),
        _ => Err(CsvImportError::InvalidTempo {
            bar,
            value: value.to_string(),
        }),
    }
}

fn validate_signature_text(bar: u32, value: &str) -> Result<(), CsvImportError> {
    let invalid = || CsvImportError::InvalidTimeSignature {
        bar,
        value: value.to_string(),
    };
    let (numerator, denominator) = value.split_once('/').ok_or_else(invalid)?;
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if digits(numerator) && digits(denominator) {
        Ok(())
    } else {
        Err(invalid())
    }
}

fn check_division_sum(bar: u32, pattern: &[u32], signature: &str) -> Result<(), CsvImportError> {
    let required = signature
        .split_once('/')
        .and_then(|(numerator, _)| numerator.parse::<u32>().ok())
        .unwrap_or(0);
    let sum: u32 = pattern.iter().sum();
    if sum == required {
        Ok(())
    } else {
        Err(CsvImportError::DivisionMismatch {
            bar,
            sum,
            time_signature: signature.to_string(),
            required,
        })
    }
}
