//! # Season Archive
//!
//! A TOML-backed [`SeasonSource`] for driving the pipeline from files. Each answer in
//! the archive carries the feature vector an upstream extractor computed for it, which
//! [`StoredFeatures`] serves back to the pipeline.
//!
//! ```toml
//! [[seasons]]
//! id = 21
//! mol = "Anna"
//! removals = { Bram = [3], Cis = [5] }
//!
//! [[seasons.answers]]
//! player = "Bram"
//! episode = 1
//! question = 2
//! answer = ["Anna"]
//! roster = ["Anna", "Bram", "Cis"]
//! features = [0.0, 1.0, 4.0]
//! ```

use crate::source::{FeatureExtractor, SeasonAnswers, SeasonSource, SourceError};
use crate::types::{
    AnswerRecord, Episode, FeatureVector, NEVER_REMOVED, Participant, RawObservation, SeasonId,
};
use itertools::Itertools;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to read archive file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML archive: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Season {0} appears more than once in the archive.")]
    DuplicateSeason(SeasonId),
    #[error(
        "{player} answered question {question} of season {season}, episode {episode} more than once."
    )]
    DuplicateAnswer {
        season: SeasonId,
        player: Participant,
        episode: Episode,
        question: u32,
    },
    #[error("Archived feature vectors have inconsistent widths ({first} and {other}).")]
    InconsistentFeatureWidth { first: usize, other: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedAnswer {
    pub player: Participant,
    pub episode: Episode,
    pub question: u32,
    pub answer: BTreeSet<Participant>,
    pub roster: BTreeSet<Participant>,
    pub features: Vec<f64>,
}

impl ArchivedAnswer {
    fn record(&self) -> AnswerRecord {
        AnswerRecord {
            player: self.player.clone(),
            episode: self.episode,
            question: self.question,
            answer: self.answer.clone(),
            roster: self.roster.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedSeason {
    pub id: SeasonId,
    pub mol: Participant,
    /// Episodes in which each participant left the game. Participants absent from the
    /// map were never removed.
    #[serde(default)]
    pub removals: BTreeMap<Participant, Vec<Episode>>,
    #[serde(default)]
    pub answers: Vec<ArchivedAnswer>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonArchive {
    #[serde(default)]
    pub seasons: Vec<ArchivedSeason>,
}

impl SeasonArchive {
    pub fn load(path: &str) -> Result<Self, ArchiveError> {
        let toml_string = fs::read_to_string(path)?;
        Self::from_toml_str(&toml_string)
    }

    pub fn from_toml_str(toml_string: &str) -> Result<Self, ArchiveError> {
        let archive: Self = toml::from_str(toml_string)?;
        archive.validate()?;
        Ok(archive)
    }

    pub fn validate(&self) -> Result<(), ArchiveError> {
        if let Some(season) = self.seasons.iter().map(|s| s.id).duplicates().next() {
            return Err(ArchiveError::DuplicateSeason(season));
        }
        for season in &self.seasons {
            let duplicate = season
                .answers
                .iter()
                .map(|a| (&a.player, a.episode, a.question))
                .duplicates()
                .next();
            if let Some((player, episode, question)) = duplicate {
                return Err(ArchiveError::DuplicateAnswer {
                    season: season.id,
                    player: player.clone(),
                    episode,
                    question,
                });
            }
        }
        let mut widths = self
            .seasons
            .iter()
            .flat_map(|s| s.answers.iter().map(|a| a.features.len()))
            .dedup();
        if let (Some(first), Some(other)) = (widths.next(), widths.next()) {
            return Err(ArchiveError::InconsistentFeatureWidth { first, other });
        }
        Ok(())
    }

    fn season(&self, season: SeasonId) -> Result<&ArchivedSeason, SourceError> {
        self.seasons
            .iter()
            .find(|s| s.id == season)
            .ok_or(SourceError::UnknownSeason(season))
    }

    /// Extractor serving the feature vectors stored with each answer.
    pub fn stored_features(&self) -> StoredFeatures {
        let mut features = HashMap::new();
        let mut width = 0;
        for season in &self.seasons {
            for answer in &season.answers {
                width = answer.features.len();
                features.insert(
                    (season.id, answer.player.clone(), answer.episode, answer.question),
                    Array1::from(answer.features.clone()),
                );
            }
        }
        StoredFeatures { width, features }
    }
}

impl SeasonSource for SeasonArchive {
    fn season_answers(
        &self,
        season: SeasonId,
        max_episode: Episode,
    ) -> Result<SeasonAnswers, SourceError> {
        let archived = self.season(season)?;
        let answers: Vec<AnswerRecord> = archived
            .answers
            .iter()
            .filter(|a| a.episode <= max_episode)
            .map(ArchivedAnswer::record)
            .collect();

        let mut removals = BTreeMap::new();
        for answer in &answers {
            removals.entry(answer.player.clone()).or_insert_with(|| {
                let visible: Vec<Episode> = archived
                    .removals
                    .get(&answer.player)
                    .into_iter()
                    .flatten()
                    .copied()
                    .filter(|&episode| episode <= max_episode)
                    .collect();
                if visible.is_empty() {
                    vec![NEVER_REMOVED]
                } else {
                    visible
                }
            });
        }

        Ok(SeasonAnswers { removals, answers })
    }

    fn answer_count(
        &self,
        season: SeasonId,
        episode: Episode,
        player: &Participant,
    ) -> Result<usize, SourceError> {
        Ok(self
            .season(season)?
            .answers
            .iter()
            .filter(|a| a.episode == episode && &a.player == player)
            .count())
    }

    fn is_mol(&self, season: SeasonId, player: &Participant) -> Result<bool, SourceError> {
        Ok(&self.season(season)?.mol == player)
    }
}

/// Feature vectors precomputed per answer.
///
/// The stored vectors were computed once per answer, so the visibility cutoff passed to
/// [`FeatureExtractor::extract`] is not applied here; archives meant for predicting a
/// running season must store vectors computed at that season's cutoff.
#[derive(Debug, Clone, Default)]
pub struct StoredFeatures {
    width: usize,
    features: HashMap<(SeasonId, Participant, Episode, u32), FeatureVector>,
}

impl FeatureExtractor for StoredFeatures {
    fn width(&self) -> usize {
        self.width
    }

    fn extract(
        &self,
        observation: &RawObservation,
        _visibility_cutoff: Episode,
    ) -> Result<FeatureVector, SourceError> {
        let key = (
            observation.season,
            observation.player.clone(),
            observation.episode,
            observation.question,
        );
        self.features
            .get(&key)
            .cloned()
            .ok_or_else(|| SourceError::MissingFeatures {
                season: observation.season,
                player: observation.player.clone(),
                episode: observation.episode,
                question: observation.question,
            })
    }
}
