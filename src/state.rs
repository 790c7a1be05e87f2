use crate::discretize::DiscretizerState;
use crate::reduce::ReducerState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to read or write pipeline state file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML pipeline state: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize pipeline state to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Pipeline state is inconsistent: {0}")]
    Inconsistent(String),
}

/// Everything learned by a train fit, required by every subsequent predict.
///
/// Created once by [`crate::pipeline::ExamDropPipeline::fit_train`] and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipelineState {
    /// Width of the raw feature vectors the pipeline was fitted on.
    pub raw_width: usize,
    /// Bin counts chosen by the allocator, before narrow bins were merged.
    pub bin_counts: Vec<usize>,
    pub discretizer: DiscretizerState,
    pub reducer: ReducerState,
}

impl FittedPipelineState {
    /// Width of the reduced feature vectors handed to the classifier.
    pub fn output_width(&self) -> usize {
        self.reducer.n_outputs()
    }

    /// Checks that the stages chain together: raw width → one-hot width → extended
    /// width → projection input width.
    pub fn check_consistency(&self) -> Result<(), StateError> {
        if self.discretizer.n_features() != self.raw_width {
            return Err(StateError::Inconsistent(format!(
                "discretizer has {} features, raw width is {}",
                self.discretizer.n_features(),
                self.raw_width
            )));
        }
        let extended = 2 * self.discretizer.n_outputs() + 1;
        if self.reducer.n_inputs() != extended {
            return Err(StateError::Inconsistent(format!(
                "reducer mask has {} entries, augmented width is {}",
                self.reducer.n_inputs(),
                extended
            )));
        }
        let kept = self.reducer.selected.iter().filter(|&&keep| keep).count();
        if self.reducer.projection.n_features() != kept {
            return Err(StateError::Inconsistent(format!(
                "projection expects {} inputs, mask keeps {}",
                self.reducer.projection.n_features(),
                kept
            )));
        }
        Ok(())
    }

    /// Saves the state in a human-readable TOML format.
    pub fn save(&self, path: &str) -> Result<(), StateError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Loads a state from a TOML file and checks it for consistency.
    pub fn load(path: &str) -> Result<Self, StateError> {
        let toml_string = fs::read_to_string(path)?;
        let state: Self = toml::from_str(&toml_string)?;
        state.check_consistency()?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocate::allocate_bins;
    use crate::augment::augment;
    use crate::discretize;
    use crate::reduce;
    use crate::types::{NEVER_REMOVED, Participant, RawObservation, Selected};
    use ndarray::{Array1, Array2};

    /// The lowest level of column 0 marks the positive class, column 1 is constant.
    fn fitted_state() -> FittedPipelineState {
        let raw = Array2::from_shape_fn((12, 2), |(i, j)| {
            if j == 1 { 5.0 } else { (i % 4) as f64 }
        });
        let observations: Vec<RawObservation> = (0..raw.nrows())
            .map(|i| RawObservation {
                player: Participant::from("Bram"),
                season: 3,
                removal_episode: NEVER_REMOVED,
                episode: 1,
                question: i as u32,
                answer: Default::default(),
                roster: Default::default(),
                selected: Selected::AnsweredOn(i % 2 == 0),
            })
            .collect();
        let labels: Array1<f64> = (0..raw.nrows())
            .map(|i| if i % 4 == 0 { 1.0 } else { 0.0 })
            .collect();

        let bin_counts = allocate_bins(raw.view(), 2).unwrap();
        let discretizer = discretize::fit(raw.view(), &bin_counts).unwrap();
        let binned = discretize::transform(raw.view(), &discretizer).unwrap();
        let extended = augment(&observations, binned.view()).unwrap();
        let reducer = reduce::fit(extended.view(), labels.view(), 0.05, 0.9).unwrap();
        FittedPipelineState {
            raw_width: 2,
            bin_counts,
            discretizer,
            reducer,
        }
    }

    #[test]
    fn fitted_state_is_consistent_and_survives_a_round_trip() {
        let state = fitted_state();
        state.check_consistency().unwrap();
        // The constant column collapses to one unbounded bin.
        assert_eq!(state.discretizer.features[1].n_bins(), 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        let path = path.to_str().unwrap();
        state.save(path).unwrap();
        let loaded = FittedPipelineState::load(path).unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.output_width(), state.output_width());
    }

    #[test]
    fn mismatched_stages_are_reported() {
        let mut state = fitted_state();
        state.raw_width = 3;
        assert!(matches!(
            state.check_consistency(),
            Err(StateError::Inconsistent(_))
        ));

        let mut state = fitted_state();
        state.reducer.selected.push(true);
        assert!(matches!(
            state.check_consistency(),
            Err(StateError::Inconsistent(_))
        ));
    }

    #[test]
    fn loading_a_missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            FittedPipelineState::load(path.to_str().unwrap()),
            Err(StateError::IoError(_))
        ));
    }
}
