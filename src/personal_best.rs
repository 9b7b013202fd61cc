use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PersonalBestCategory {
    Wpm,
    Accuracy,
    Streak,
    SessionTime,
    WordsTotal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonalBest {
    pub value: f64,
    pub achieved_on: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersonalBestUpdate {
    pub updated: bool,
    pub previous: Option<f64>,
    /// Percent gain over `previous`; 0 when nothing was beaten.
    pub improvement_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonalBests {
    bests: BTreeMap<PersonalBestCategory, PersonalBest>,
}

impl PersonalBests {
    pub fn get(&self, category: PersonalBestCategory) -> Option<&PersonalBest> {
        self.bests.get(&category)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PersonalBestCategory, &PersonalBest)> {
        self.bests.iter().map(|(c, b)| (*c, b))
    }

    /// Replace the stored best only when `value` is strictly greater.
    pub fn update(
        &mut self,
        category: PersonalBestCategory,
        value: f64,
        date: NaiveDate,
    ) -> PersonalBestUpdate {
        let previous = self.bests.get(&category).map(|b| b.value);
        let beats = value.is_finite() && previous.map_or(value > 0.0, |prev| value > prev);
        if !beats {
            return PersonalBestUpdate {
                updated: false,
                previous,
                improvement_pct: 0.0,
            };
        }

        let improvement_pct = previous
            .filter(|prev| *prev > 0.0)
            .map_or(0.0, |prev| (value - prev) / prev * 100.0);
        info!(%category, value, ?previous, "new personal best");
        self.bests.insert(
            category,
            PersonalBest {
                value,
                achieved_on: date,
            },
        );
        PersonalBestUpdate {
            updated: true,
            previous,
            improvement_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn first_value_sets_best_without_improvement() {
        let mut pb = PersonalBests::default();
        let u = pb.update(PersonalBestCategory::Wpm, 40.0, day());
        assert!(u.updated);
        assert_eq!(u.previous, None);
        assert_eq!(u.improvement_pct, 0.0);
        assert_eq!(pb.get(PersonalBestCategory::Wpm).unwrap().value, 40.0);
    }

    #[test]
    fn only_strict_improvement_replaces() {
        let mut pb = PersonalBests::default();
        pb.update(PersonalBestCategory::Wpm, 40.0, day());
        assert!(!pb.update(PersonalBestCategory::Wpm, 40.0, day()).updated);
        assert!(!pb.update(PersonalBestCategory::Wpm, 35.0, day()).updated);

        let u = pb.update(PersonalBestCategory::Wpm, 50.0, day());
        assert!(u.updated);
        assert_eq!(u.previous, Some(40.0));
        assert!((u.improvement_pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn zero_and_nan_never_count() {
        let mut pb = PersonalBests::default();
        assert!(!pb.update(PersonalBestCategory::Streak, 0.0, day()).updated);
        assert!(!pb.update(PersonalBestCategory::Streak, f64::NAN, day()).updated);
        assert!(pb.get(PersonalBestCategory::Streak).is_none());
    }

    #[test]
    fn serializes_with_snake_case_keys() {
        let mut pb = PersonalBests::default();
        pb.update(PersonalBestCategory::SessionTime, 90.0, day());
        let json = serde_json::to_value(&pb).unwrap();
        assert_eq!(json["session_time"]["value"], 90.0);
        assert_eq!(PersonalBestCategory::WordsTotal.to_string(), "words_total");
    }
}
