//! Contracts for the collaborators that feed the pipeline: the season data source and
//! the per-record feature extractor.

use crate::types::{AnswerRecord, Episode, FeatureVector, Participant, RawObservation, SeasonId};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SourceError {
    #[error("Season {0} is not available in the data source.")]
    UnknownSeason(SeasonId),

    #[error(
        "No feature vector is stored for {player} in season {season}, episode {episode}, question {question}."
    )]
    MissingFeatures {
        season: SeasonId,
        player: Participant,
        episode: Episode,
        question: u32,
    },

    #[error("Feature extractor produced {found} values, but the pipeline expects {expected}.")]
    FeatureWidth { found: usize, expected: usize },
}

/// The answers of one season as visible at some cutoff episode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeasonAnswers {
    /// Removal episodes per answering participant. A participant that was not removed
    /// within the visible episodes maps to `[NEVER_REMOVED]`.
    pub removals: BTreeMap<Participant, Vec<Episode>>,
    /// Visible answers in source order.
    pub answers: Vec<AnswerRecord>,
}

/// Historical season data.
pub trait SeasonSource {
    /// All answers of `season` up to and including `max_episode`, with the removal
    /// mapping as known at that episode.
    fn season_answers(
        &self,
        season: SeasonId,
        max_episode: Episode,
    ) -> Result<SeasonAnswers, SourceError>;

    /// Number of answers `player` gave in `episode` of `season`, regardless of visibility.
    fn answer_count(
        &self,
        season: SeasonId,
        episode: Episode,
        player: &Participant,
    ) -> Result<usize, SourceError>;

    /// Whether `player` was the mol of `season`.
    fn is_mol(&self, season: SeasonId, player: &Participant) -> Result<bool, SourceError>;
}

impl<T: SeasonSource + ?Sized> SeasonSource for &T {
    fn season_answers(
        &self,
        season: SeasonId,
        max_episode: Episode,
    ) -> Result<SeasonAnswers, SourceError> {
        (**self).season_answers(season, max_episode)
    }

    fn answer_count(
        &self,
        season: SeasonId,
        episode: Episode,
        player: &Participant,
    ) -> Result<usize, SourceError> {
        (**self).answer_count(season, episode, player)
    }

    fn is_mol(&self, season: SeasonId, player: &Participant) -> Result<bool, SourceError> {
        (**self).is_mol(season, player)
    }
}

/// Maps one observation to a fixed-width numeric vector, using only information up to
/// `visibility_cutoff`.
pub trait FeatureExtractor {
    /// Number of values every extracted vector holds.
    fn width(&self) -> usize;

    fn extract(
        &self,
        observation: &RawObservation,
        visibility_cutoff: Episode,
    ) -> Result<FeatureVector, SourceError>;
}

impl<T: FeatureExtractor + ?Sized> FeatureExtractor for &T {
    fn width(&self) -> usize {
        (**self).width()
    }

    fn extract(
        &self,
        observation: &RawObservation,
        visibility_cutoff: Episode,
    ) -> Result<FeatureVector, SourceError> {
        (**self).extract(observation, visibility_cutoff)
    }
}
