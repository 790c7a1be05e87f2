use crate::allocate::allocate_bins;
use crate::augment::{AugmentError, augment};
use crate::binning::BinningError;
use crate::config::PipelineConfig;
use crate::discretize::{self, DiscretizeError};
use crate::observations::{ExpansionMode, observations_for_season};
use crate::reduce::{self, ReduceError};
use crate::source::{FeatureExtractor, SeasonSource, SourceError};
use crate::state::FittedPipelineState;
use crate::types::{
    Episode, PredictionSample, RawObservation, SeasonId, Selected, TrainingSet,
    UNBOUNDED_VISIBILITY,
};
use crate::weights::{WeightError, sample_weights};
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use std::borrow::Cow;
use thiserror::Error;

// ========================================================================================
//                               ERROR HANDLING
// ========================================================================================

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("predict was called before fit_train; the pipeline has no fitted state.")]
    NotFitted,

    #[error("fit_train was already called; a pipeline is fitted exactly once.")]
    AlreadyFitted,

    #[error("The train seasons produced no observations.")]
    EmptyTrainingData,

    #[error("Observation {row} has no concrete candidate, so it cannot be labelled.")]
    UnlabelledObservation { row: usize },

    #[error("Prediction rows {row} and {} are not an excluded/included pair.", .row + 1)]
    MalformedPredictPair { row: usize },

    #[error("Raw features have width {found}, but the pipeline was fitted on width {expected}.")]
    RawWidthMismatch { found: usize, expected: usize },

    #[error("Data source error: {0}")]
    Source(#[from] SourceError),

    #[error("Bin allocation failed: {0}")]
    Allocation(#[from] BinningError),

    #[error("Discretization failed: {0}")]
    Discretize(#[from] DiscretizeError),

    #[error("Interaction augmentation failed: {0}")]
    Augment(#[from] AugmentError),

    #[error("Dimensionality reduction failed: {0}")]
    Reduce(#[from] ReduceError),

    #[error("Sample weighting failed: {0}")]
    Weight(#[from] WeightError),
}

// ========================================================================================
//                               SHARED TRANSFORM
// ========================================================================================

/// Hyperparameters needed only when the transforms are being learned.
#[derive(Debug, Clone, Copy)]
struct FitParameters<'a> {
    labels: ArrayView1<'a, f64>,
    max_splits: usize,
    significance: f64,
    explain: f64,
}

/// Whether the transform sequence learns its parameters or reuses stored ones.
#[derive(Debug, Clone, Copy)]
enum Stage<'a> {
    Fit(FitParameters<'a>),
    Apply(&'a FittedPipelineState),
}

/// Discretize → augment → reduce. Train and predict both run through here, so the
/// output width at predict time is exactly the width learned at fit time.
///
/// Returns the reduced matrix and, in [`Stage::Fit`], the newly learned state.
fn transform_features(
    observations: &[RawObservation],
    raw: ArrayView2<f64>,
    stage: Stage<'_>,
) -> Result<(Array2<f64>, Option<FittedPipelineState>), PipelineError> {
    let (bin_counts, discretizer) = match stage {
        Stage::Fit(params) => {
            let counts = allocate_bins(raw, params.max_splits)?;
            debug!("Allocated bins per feature: {:?}", counts);
            let fitted = discretize::fit(raw, &counts)?;
            (counts, Cow::Owned(fitted))
        }
        Stage::Apply(state) => {
            if raw.ncols() != state.raw_width {
                return Err(PipelineError::RawWidthMismatch {
                    found: raw.ncols(),
                    expected: state.raw_width,
                });
            }
            (Vec::new(), Cow::Borrowed(&state.discretizer))
        }
    };

    let binned = discretize::transform(raw, &discretizer)?;
    let extended = augment(observations, binned.view())?;

    let reducer = match stage {
        Stage::Fit(params) => Cow::Owned(reduce::fit(
            extended.view(),
            params.labels,
            params.significance,
            params.explain,
        )?),
        Stage::Apply(state) => Cow::Borrowed(&state.reducer),
    };
    let reduced = reduce::transform(extended.view(), &reducer)?;

    let fitted = match stage {
        Stage::Fit(_) => Some(FittedPipelineState {
            raw_width: raw.ncols(),
            bin_counts,
            discretizer: discretizer.into_owned(),
            reducer: reducer.into_owned(),
        }),
        Stage::Apply(_) => None,
    };
    Ok((reduced, fitted))
}

// ========================================================================================
//                               ORCHESTRATOR
// ========================================================================================

/// Produces train data and prediction samples for the exam-drop layer.
///
/// `fit_train` must run exactly once before any `predict`; the fitted state it learns is
/// owned by this instance and shared with nothing else.
pub struct ExamDropPipeline<S, E> {
    config: PipelineConfig,
    source: S,
    extractor: E,
    state: Option<FittedPipelineState>,
}

impl<S: SeasonSource, E: FeatureExtractor> ExamDropPipeline<S, E> {
    pub fn new(config: PipelineConfig, source: S, extractor: E) -> Self {
        Self {
            config,
            source,
            extractor,
            state: None,
        }
    }

    /// A pipeline that reuses a state fitted earlier, e.g. one loaded from disk.
    pub fn from_state(
        config: PipelineConfig,
        source: S,
        extractor: E,
        state: FittedPipelineState,
    ) -> Self {
        Self {
            config,
            source,
            extractor,
            state: Some(state),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> Option<&FittedPipelineState> {
        self.state.as_ref()
    }

    /// Gathers every train season at full visibility, learns all transforms and returns
    /// the train input, labels and weights.
    pub fn fit_train(&mut self) -> Result<TrainingSet, PipelineError> {
        if self.state.is_some() {
            return Err(PipelineError::AlreadyFitted);
        }

        let mut observations = Vec::new();
        for &season in &self.config.train_seasons {
            observations.extend(observations_for_season(
                &self.source,
                season,
                UNBOUNDED_VISIBILITY,
                ExpansionMode::Train,
            )?);
        }
        if observations.is_empty() {
            return Err(PipelineError::EmptyTrainingData);
        }

        let raw = self.extract(&observations, UNBOUNDED_VISIBILITY)?;
        let labels = self.labels(&observations)?;
        info!(
            "Fitting on {} rows from {} seasons ({} raw features, {} positive labels).",
            observations.len(),
            self.config.train_seasons.len(),
            raw.ncols(),
            labels.sum()
        );

        let stage = Stage::Fit(FitParameters {
            labels: labels.view(),
            max_splits: self.config.max_splits,
            significance: self.config.anova_f_significance,
            explain: self.config.pca_explain,
        });
        let (features, fitted) = transform_features(&observations, raw.view(), stage)?;
        let weights = sample_weights(&self.source, &observations)?;

        self.state = fitted;
        info!("Train matrix has {} columns.", features.ncols());
        Ok(TrainingSet {
            features,
            labels,
            weights,
        })
    }

    /// Prediction samples for the configured predict season and episode.
    pub fn predict(&self) -> Result<Vec<PredictionSample>, PipelineError> {
        self.predict_at(self.config.predict_season, self.config.predict_episode)
    }

    /// Prediction samples for `season`, using only episodes up to `episode_cutoff`.
    /// Returns an empty list when nothing is visible yet.
    pub fn predict_at(
        &self,
        season: SeasonId,
        episode_cutoff: Episode,
    ) -> Result<Vec<PredictionSample>, PipelineError> {
        let state = self.state.as_ref().ok_or(PipelineError::NotFitted)?;

        let observations =
            observations_for_season(&self.source, season, episode_cutoff, ExpansionMode::Predict)?;
        if observations.is_empty() {
            info!(
                "Season {} has no visible answers up to episode {}.",
                season, episode_cutoff
            );
            return Ok(Vec::new());
        }

        let raw = self.extract(&observations, episode_cutoff)?;
        let (features, _) = transform_features(&observations, raw.view(), Stage::Apply(state))?;
        let weights = sample_weights(&self.source, &observations)?;

        let mut samples = Vec::with_capacity(observations.len() / 2);
        for (pair_index, pair) in observations.chunks(2).enumerate() {
            let row = 2 * pair_index;
            let [excluded, included] = pair else {
                return Err(PipelineError::MalformedPredictPair { row });
            };
            if excluded.selected != Selected::AnsweredOn(false)
                || included.selected != Selected::AnsweredOn(true)
            {
                return Err(PipelineError::MalformedPredictPair { row });
            }
            samples.push(PredictionSample {
                in_answer: included.answer.clone(),
                out_answer: excluded.excluded(),
                in_features: features.row(row + 1).to_owned(),
                out_features: features.row(row).to_owned(),
                weight: weights[row],
            });
        }

        info!(
            "Built {} prediction samples for season {} up to episode {}.",
            samples.len(),
            season,
            episode_cutoff
        );
        Ok(samples)
    }

    fn extract(
        &self,
        observations: &[RawObservation],
        visibility_cutoff: Episode,
    ) -> Result<Array2<f64>, PipelineError> {
        let width = self.extractor.width();
        let mut raw = Array2::zeros((observations.len(), width));
        for (observation, mut row) in observations.iter().zip(raw.rows_mut()) {
            let features = self.extractor.extract(observation, visibility_cutoff)?;
            if features.len() != width {
                return Err(SourceError::FeatureWidth {
                    found: features.len(),
                    expected: width,
                }
                .into());
            }
            row.assign(&features);
        }
        Ok(raw)
    }

    fn labels(&self, observations: &[RawObservation]) -> Result<Array1<f64>, PipelineError> {
        observations
            .iter()
            .enumerate()
            .map(|(row, observation)| match &observation.selected {
                Selected::Candidate(candidate) => {
                    let is_mol = self.source.is_mol(observation.season, candidate)?;
                    Ok(if is_mol { 1.0 } else { 0.0 })
                }
                Selected::AnsweredOn(_) => Err(PipelineError::UnlabelledObservation { row }),
            })
            .collect()
    }
}
