//! Expansion of a season's answers into pipeline rows.

use crate::source::{SeasonSource, SourceError};
use crate::types::{Episode, RawObservation, SeasonId, Selected};
use log::debug;

/// How an answer is expanded into rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionMode {
    /// One row per roster candidate, labelled by whether that candidate is the mol.
    Train,
    /// Two rows per answer: the excluded participants first, then the included ones.
    Predict,
}

/// Expands every visible answer of `season` into [`RawObservation`]s.
///
/// Answers given by a participant with no known removal at or after the answer's
/// episode are skipped. The resulting removal episode of a row is the earliest such
/// removal.
pub fn observations_for_season<S: SeasonSource>(
    source: &S,
    season: SeasonId,
    max_episode: Episode,
    mode: ExpansionMode,
) -> Result<Vec<RawObservation>, SourceError> {
    let season_answers = source.season_answers(season, max_episode)?;
    let mut observations = Vec::new();
    let mut skipped = 0usize;

    for answer in season_answers.answers {
        let removal = season_answers.removals.get(&answer.player).and_then(|episodes| {
            episodes
                .iter()
                .copied()
                .filter(|&removal| answer.episode <= removal)
                .min()
        });
        let Some(removal_episode) = removal else {
            skipped += 1;
            continue;
        };

        let row = |selected: Selected| RawObservation {
            player: answer.player.clone(),
            season,
            removal_episode,
            episode: answer.episode,
            question: answer.question,
            answer: answer.answer.clone(),
            roster: answer.roster.clone(),
            selected,
        };
        match mode {
            ExpansionMode::Train => {
                for candidate in &answer.roster {
                    observations.push(row(Selected::Candidate(candidate.clone())));
                }
            }
            ExpansionMode::Predict => {
                observations.push(row(Selected::AnsweredOn(false)));
                observations.push(row(Selected::AnsweredOn(true)));
            }
        }
    }

    debug!(
        "Season {} up to episode {}: {} rows ({:?}), {} answers without removal skipped.",
        season,
        max_episode,
        observations.len(),
        mode,
        skipped
    );
    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SeasonAnswers;
    use crate::types::{AnswerRecord, NEVER_REMOVED, Participant};
    use std::collections::{BTreeMap, BTreeSet};

    struct FixedSource(SeasonAnswers);

    impl SeasonSource for FixedSource {
        fn season_answers(&self, _: SeasonId, _: Episode) -> Result<SeasonAnswers, SourceError> {
            Ok(self.0.clone())
        }

        fn answer_count(&self, _: SeasonId, _: Episode, _: &Participant) -> Result<usize, SourceError> {
            Ok(1)
        }

        fn is_mol(&self, _: SeasonId, _: &Participant) -> Result<bool, SourceError> {
            Ok(false)
        }
    }

    fn names(list: &[&str]) -> BTreeSet<Participant> {
        list.iter().copied().map(Participant::from).collect()
    }

    fn fixture() -> FixedSource {
        let roster = names(&["Anna", "Bram", "Cis"]);
        let answer = |player: &str, episode| AnswerRecord {
            player: player.into(),
            episode,
            question: 1,
            answer: names(&["Bram"]),
            roster: roster.clone(),
        };
        let mut removals = BTreeMap::new();
        removals.insert(Participant::from("Anna"), vec![NEVER_REMOVED]);
        removals.insert(Participant::from("Bram"), vec![2, 5]);
        removals.insert(Participant::from("Cis"), vec![1]);
        FixedSource(SeasonAnswers {
            removals,
            answers: vec![answer("Anna", 1), answer("Bram", 3), answer("Cis", 2)],
        })
    }

    #[test]
    fn train_rows_cover_every_roster_candidate() {
        let rows = observations_for_season(&fixture(), 7, 10, ExpansionMode::Train).unwrap();
        // Cis was removed before answering in episode 2, so only two answers expand.
        assert_eq!(rows.len(), 6);
        let candidates: Vec<_> = rows[..3]
            .iter()
            .map(|row| match &row.selected {
                Selected::Candidate(c) => c.name().to_string(),
                Selected::AnsweredOn(_) => unreachable!(),
            })
            .collect();
        assert_eq!(candidates, vec!["Anna", "Bram", "Cis"]);
        assert_eq!(rows[0].removal_episode, NEVER_REMOVED);
        assert_eq!(rows[3].removal_episode, 5);
    }

    #[test]
    fn predict_rows_alternate_excluded_then_included() {
        let rows = observations_for_season(&fixture(), 7, 10, ExpansionMode::Predict).unwrap();
        let flags: Vec<_> = rows.iter().map(|row| row.selected.clone()).collect();
        assert_eq!(
            flags,
            vec![
                Selected::AnsweredOn(false),
                Selected::AnsweredOn(true),
                Selected::AnsweredOn(false),
                Selected::AnsweredOn(true),
            ]
        );
    }
}
