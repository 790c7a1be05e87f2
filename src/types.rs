// ========================================================================================
//
//                       CORE DATA TYPES FOR THE EXAM-DROP PIPELINE
//
// ========================================================================================
//
// This module is the canonical dictionary for the data structures that cross module
// boundaries (`observations`, `augment`, `weights`, `pipeline`). Types that are used by
// a single file live in that file.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Season number as used by the show (season 22 is the 22nd season).
pub type SeasonId = u32;

/// Episode number within a season, 1-based.
pub type Episode = u32;

/// Removal episode of a participant that was not removed within the visible episodes.
pub const NEVER_REMOVED: Episode = Episode::MAX;

/// Visibility cutoff that exposes every episode of a season.
pub const UNBOUNDED_VISIBILITY: Episode = Episode::MAX;

/// A contestant, identified by the name used throughout the archive.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Participant(pub String);

impl Participant {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Participant {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// What the "selected" slot of an observation refers to.
///
/// Training rows are expanded once per roster candidate, so the slot carries the
/// candidate whose mol label becomes the row's label. Prediction rows are expanded
/// twice per answer and the slot only records whether the row scores the participants
/// inside the answer (`true`) or outside it (`false`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selected {
    Candidate(Participant),
    AnsweredOn(bool),
}

/// A single answer given during an exam, as supplied by a [`crate::source::SeasonSource`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub player: Participant,
    pub episode: Episode,
    pub question: u32,
    /// The participants the answer points at.
    pub answer: BTreeSet<Participant>,
    /// Everyone still in the game during this episode.
    pub roster: BTreeSet<Participant>,
}

/// One row of raw pipeline input: an answer paired with a selected slot.
#[derive(Clone, Debug, PartialEq)]
pub struct RawObservation {
    pub player: Participant,
    pub season: SeasonId,
    /// Earliest removal episode of `player` at or after `episode`, or [`NEVER_REMOVED`].
    pub removal_episode: Episode,
    pub episode: Episode,
    pub question: u32,
    pub answer: BTreeSet<Participant>,
    pub roster: BTreeSet<Participant>,
    pub selected: Selected,
}

impl RawObservation {
    /// Whether this row scores someone the answer points at.
    pub fn answered_on(&self) -> bool {
        match &self.selected {
            Selected::AnsweredOn(flag) => *flag,
            Selected::Candidate(candidate) => self.answer.contains(candidate),
        }
    }

    /// Roster members the answer does not point at.
    pub fn excluded(&self) -> BTreeSet<Participant> {
        self.roster.difference(&self.answer).cloned().collect()
    }
}

/// Fixed-width numeric representation of one observation.
pub type FeatureVector = Array1<f64>;

/// Train matrix handed to the downstream classifier.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    /// Shape: [n_samples, n_components].
    pub features: Array2<f64>,
    /// 1.0 when the row's candidate is the mol, 0.0 otherwise.
    pub labels: Array1<f64>,
    pub weights: Array1<f64>,
}

/// One scored answer at prediction time.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSample {
    pub in_answer: BTreeSet<Participant>,
    pub out_answer: BTreeSet<Participant>,
    pub in_features: FeatureVector,
    pub out_features: FeatureVector,
    pub weight: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(selected: Selected) -> RawObservation {
        RawObservation {
            player: Participant::from("Anna"),
            season: 21,
            removal_episode: NEVER_REMOVED,
            episode: 2,
            question: 1,
            answer: ["Bram", "Cis"].into_iter().map(Participant::from).collect(),
            roster: ["Anna", "Bram", "Cis", "Dirk"]
                .into_iter()
                .map(Participant::from)
                .collect(),
            selected,
        }
    }

    #[test]
    fn answered_on_follows_candidate_membership() {
        assert!(observation(Selected::Candidate("Bram".into())).answered_on());
        assert!(!observation(Selected::Candidate("Dirk".into())).answered_on());
        assert!(observation(Selected::AnsweredOn(true)).answered_on());
        assert!(!observation(Selected::AnsweredOn(false)).answered_on());
    }

    #[test]
    fn excluded_is_roster_minus_answer() {
        let excluded = observation(Selected::AnsweredOn(false)).excluded();
        let names: Vec<&str> = excluded.iter().map(Participant::name).collect();
        assert_eq!(names, vec!["Anna", "Dirk"]);
    }
}
