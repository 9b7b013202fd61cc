//! Pure typing-performance calculations over keypress streams.

use crate::time_series::{TimeSeriesPoint, TrendPoint};
use crate::util::{moving_average, std_dev};
use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Characters per standard word.
pub const CHARS_PER_WORD: f64 = 5.0;

/// Relative weight of accuracy against speed in the performance blends.
pub const ACCURACY_WEIGHT: f64 = 3.0;
pub const SPEED_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeypressEvent {
    pub key: char,
    pub correct: bool,
    pub timestamp_ms: i64,
}

impl KeypressEvent {
    pub fn new(key: char, correct: bool, timestamp_ms: i64) -> Self {
        Self {
            key,
            correct,
            timestamp_ms,
        }
    }
}

fn elapsed_minutes(keypresses: &[KeypressEvent]) -> f64 {
    match (keypresses.first(), keypresses.last()) {
        (Some(first), Some(last)) => {
            last.timestamp_ms.saturating_sub(first.timestamp_ms) as f64 / 60_000.0
        }
        _ => 0.0,
    }
}

/// Words per minute over the keypresses, or over the trailing `window_ms` of them.
///
/// Elapsed time runs from the first to the last keypress of the slice, so a slice
/// without any time span yields 0.
pub fn compute_wpm(keypresses: &[KeypressEvent], window_ms: Option<i64>) -> f64 {
    let slice = match (window_ms, keypresses.last()) {
        (Some(window), Some(last)) => {
            let cutoff = last.timestamp_ms.saturating_sub(window);
            let start = keypresses.partition_point(|k| k.timestamp_ms < cutoff);
            &keypresses[start..]
        }
        _ => keypresses,
    };

    let minutes = elapsed_minutes(slice);
    if minutes <= 0.0 {
        return 0.0;
    }
    let correct = slice.iter().filter(|k| k.correct).count() as f64;
    (correct / CHARS_PER_WORD) / minutes
}

/// Percentage of correct keypresses, 0 for an empty stream.
pub fn compute_accuracy(keypresses: &[KeypressEvent]) -> f64 {
    if keypresses.is_empty() {
        return 0.0;
    }
    let correct = keypresses.iter().filter(|k| k.correct).count() as f64;
    correct * 100.0 / keypresses.len() as f64
}

pub fn is_plausible_wpm(wpm: f64, floor: f64, ceiling: f64) -> bool {
    wpm.is_finite() && wpm >= floor && wpm <= ceiling
}

/// Blend of accuracy and speed in `[0, 1]`, accuracy weighted 3x.
pub fn performance_score(accuracy_pct: f64, wpm: f64, reference_wpm: f64) -> f64 {
    let accuracy = (accuracy_pct / 100.0).clamp(0.0, 1.0);
    let speed = if reference_wpm > 0.0 {
        (wpm / reference_wpm).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (ACCURACY_WEIGHT * accuracy + SPEED_WEIGHT * speed) / (ACCURACY_WEIGHT + SPEED_WEIGHT)
}

/// Change in performance between two `(accuracy_pct, wpm)` measurements, in `[-1, 1]`.
pub fn performance_delta(current: (f64, f64), previous: (f64, f64), reference_wpm: f64) -> f64 {
    let accuracy = ((current.0 - previous.0) / 100.0).clamp(-1.0, 1.0);
    let speed = if reference_wpm > 0.0 {
        ((current.1 - previous.1) / reference_wpm).clamp(-1.0, 1.0)
    } else {
        0.0
    };
    (ACCURACY_WEIGHT * accuracy + SPEED_WEIGHT * speed) / (ACCURACY_WEIGHT + SPEED_WEIGHT)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyErrorRate {
    pub attempts: u32,
    pub errors: u32,
}

impl KeyErrorRate {
    pub fn error_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.errors as f64 / self.attempts as f64
        }
    }

    /// Needs enough attempts so a single slip does not flag a key.
    pub fn is_challenging(&self, min_attempts: u32, threshold: f64) -> bool {
        self.attempts >= min_attempts && self.error_rate() > threshold
    }

    pub fn merge(&mut self, other: &KeyErrorRate) {
        self.attempts += other.attempts;
        self.errors += other.errors;
    }
}

pub fn key_error_rates(keypresses: &[KeypressEvent]) -> BTreeMap<char, KeyErrorRate> {
    keypresses
        .iter()
        .fold(BTreeMap::new(), |mut rates, k| {
            let entry: &mut KeyErrorRate = rates.entry(k.key).or_default();
            entry.attempts += 1;
            if !k.correct {
                entry.errors += 1;
            }
            rates
        })
}

/// Keys flagged as challenging, worst first.
pub fn challenging_keys(
    rates: &BTreeMap<char, KeyErrorRate>,
    min_attempts: u32,
    threshold: f64,
) -> Vec<(char, KeyErrorRate)> {
    rates
        .iter()
        .filter(|(_, rate)| rate.is_challenging(min_attempts, threshold))
        .map(|(key, rate)| (*key, *rate))
        .sorted_by(|a, b| {
            b.1.error_rate()
                .total_cmp(&a.1.error_rate())
                .then(b.1.attempts.cmp(&a.1.attempts))
                .then(a.0.cmp(&b.0))
        })
        .collect()
}

pub fn trend(series: &[(NaiveDate, f64)], window_size: usize) -> Vec<TrendPoint> {
    let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
    series
        .iter()
        .zip(moving_average(&values, window_size))
        .map(|(&(date, value), moving_average)| TrendPoint {
            date,
            value,
            moving_average,
        })
        .collect()
}

fn correct_chars_per_second(keypresses: &[KeypressEvent]) -> Vec<(i64, f64)> {
    let Some(first) = keypresses.first() else {
        return Vec::new();
    };
    keypresses
        .iter()
        .filter(|k| k.correct)
        .map(|k| (k.timestamp_ms.saturating_sub(first.timestamp_ms) / 1000 + 1, 1.0))
        .into_group_map()
        .into_iter()
        .map(|(second, hits)| (second, hits.iter().sum::<f64>()))
        .sorted_by_key(|(second, _)| *second)
        .collect()
}

/// Cumulative WPM at each whole second that saw a correct keypress.
pub fn wpm_timeline(keypresses: &[KeypressEvent]) -> Vec<TimeSeriesPoint> {
    let mut typed = 0.0;
    correct_chars_per_second(keypresses)
        .into_iter()
        .map(|(second, count)| {
            typed += count;
            let secs = second as f64;
            TimeSeriesPoint::new(secs, (typed / CHARS_PER_WORD) * (60.0 / secs))
        })
        .collect()
}

/// Standard deviation of correct characters per second; lower is steadier.
pub fn consistency(keypresses: &[KeypressEvent]) -> f64 {
    let per_second: Vec<f64> = correct_chars_per_second(keypresses)
        .into_iter()
        .map(|(_, count)| count)
        .collect();
    if per_second.len() < 2 {
        return 0.0;
    }
    std_dev(&per_second).unwrap_or_default()
}
