//! Inverse-multiplicity sample weights.
//!
//! A participant who answered five questions in an episode should not carry five times
//! the evidence of one who answered once, so each row is weighted by one over the number
//! of answers its participant gave in that episode.

use crate::source::{SeasonSource, SourceError};
use crate::types::{Episode, Participant, RawObservation, SeasonId};
use ndarray::Array1;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum WeightError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(
        "Invariant violated: {player} has no recorded answers in season {season}, episode {episode}, yet an observation exists."
    )]
    NoAnswers {
        player: Participant,
        season: SeasonId,
        episode: Episode,
    },
}

/// Weight for every row of `observations`, in order.
pub fn sample_weights<S: SeasonSource>(
    source: &S,
    observations: &[RawObservation],
) -> Result<Array1<f64>, WeightError> {
    let mut counts: HashMap<(SeasonId, Episode, &Participant), usize> = HashMap::new();
    let mut weights = Array1::zeros(observations.len());

    for (weight, observation) in weights.iter_mut().zip(observations) {
        let key = (observation.season, observation.episode, &observation.player);
        let count = match counts.get(&key) {
            Some(&count) => count,
            None => {
                let count =
                    source.answer_count(observation.season, observation.episode, &observation.player)?;
                counts.insert(key, count);
                count
            }
        };
        if count == 0 {
            return Err(WeightError::NoAnswers {
                player: observation.player.clone(),
                season: observation.season,
                episode: observation.episode,
            });
        }
        *weight = 1.0 / count as f64;
    }
    Ok(weights)
}
