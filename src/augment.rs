//! The "answered on" interaction features.
//!
//! Each row is extended with the binned features multiplied by whether the row scores a
//! participant inside the answer, followed by that indicator itself. Output width is
//! `2 * W + 1`.

use crate::types::RawObservation;
use ndarray::{Array2, ArrayView2, s};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
#[error("Got {observations} observations for a feature matrix with {rows} rows.")]
pub struct AugmentError {
    pub observations: usize,
    pub rows: usize,
}

pub fn augment(
    observations: &[RawObservation],
    binned: ArrayView2<f64>,
) -> Result<Array2<f64>, AugmentError> {
    if observations.len() != binned.nrows() {
        return Err(AugmentError {
            observations: observations.len(),
            rows: binned.nrows(),
        });
    }

    let width = binned.ncols();
    let mut extended = Array2::zeros((binned.nrows(), 2 * width + 1));
    for ((observation, features), mut row) in observations
        .iter()
        .zip(binned.rows())
        .zip(extended.rows_mut())
    {
        let answered_on = if observation.answered_on() { 1.0 } else { 0.0 };
        row.slice_mut(s![..width]).assign(&features);
        row.slice_mut(s![width..2 * width])
            .assign(&features.mapv(|v| v * answered_on));
        row[2 * width] = answered_on;
    }
    Ok(extended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NEVER_REMOVED, Participant, Selected};
    use ndarray::array;

    fn observation(selected: Selected) -> RawObservation {
        RawObservation {
            player: Participant::from("Anna"),
            season: 20,
            removal_episode: NEVER_REMOVED,
            episode: 1,
            question: 3,
            answer: [Participant::from("Bram")].into_iter().collect(),
            roster: ["Anna", "Bram", "Cis"].into_iter().map(Participant::from).collect(),
            selected,
        }
    }

    #[test]
    fn appends_products_and_indicator() {
        let observations = vec![
            observation(Selected::Candidate("Bram".into())),
            observation(Selected::Candidate("Cis".into())),
            observation(Selected::AnsweredOn(false)),
            observation(Selected::AnsweredOn(true)),
        ];
        let binned = array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.5, 2.0]];
        let extended = augment(&observations, binned.view()).unwrap();
        assert_eq!(
            extended,
            array![
                [1.0, 0.0, 1.0, 0.0, 1.0],
                [0.0, 1.0, 0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0, 0.0, 0.0],
                [0.5, 2.0, 0.5, 2.0, 1.0],
            ]
        );
    }

    #[test]
    fn width_is_two_w_plus_one_and_indicator_is_binary() {
        let observations: Vec<_> = (0..6)
            .map(|i| observation(Selected::AnsweredOn(i % 2 == 1)))
            .collect();
        let binned = ndarray::Array2::from_shape_fn((6, 7), |(i, j)| (i * j) as f64);
        let extended = augment(&observations, binned.view()).unwrap();
        assert_eq!(extended.ncols(), 15);
        for value in extended.column(14) {
            assert!(*value == 0.0 || *value == 1.0);
        }
    }

    #[test]
    fn row_count_mismatch_is_an_error() {
        let observations = vec![observation(Selected::AnsweredOn(true))];
        let binned = array![[1.0], [0.0]];
        assert_eq!(
            augment(&observations, binned.view()),
            Err(AugmentError { observations: 1, rows: 2 })
        );
    }
}
