//! Dimensionality reduction: ANOVA-F significance filter followed by PCA.
//!
//! Both steps are learned on the train matrix only. At predict time the stored column
//! mask and projection are applied verbatim; nothing is re-evaluated.

pub mod anova;
pub mod pca;

use crate::faer_ndarray::FaerLinalgError;
use log::info;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use pca::PcaState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReduceError {
    #[error("Got {labels} labels for a feature matrix with {rows} rows.")]
    LabelCountMismatch { labels: usize, rows: usize },

    #[error("The significance filter needs at least two label classes, but all labels are equal.")]
    SingleClass,

    #[error("Need at least {required} samples, but only {found} were provided.")]
    TooFewSamples { found: usize, required: usize },

    #[error(
        "No feature has an ANOVA F p-value below {alpha}; all {tested} features were filtered out."
    )]
    NoSignificantFeatures { alpha: f64, tested: usize },

    #[error("Cannot fit a projection on a matrix without features.")]
    NoFeatures,

    #[error("The filtered train matrix has zero total variance.")]
    ZeroVariance,

    #[error(
        "Retaining the requested variance needs {required} components, but the data only has rank {rank}."
    )]
    RankDeficient { required: usize, rank: usize },

    #[error("Input has {found} features, but the reducer was fitted on {expected}.")]
    FeatureCountMismatch { found: usize, expected: usize },

    #[error("Failed to construct the F distribution: {0}")]
    Distribution(String),

    #[error("Eigendecomposition of the covariance matrix failed: {0}")]
    Eigendecomposition(#[from] FaerLinalgError),
}

/// Selection mask plus projection learned at fit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducerState {
    /// One entry per extended input column; `true` columns survive the filter.
    pub selected: Vec<bool>,
    pub projection: PcaState,
}

impl ReducerState {
    pub fn n_inputs(&self) -> usize {
        self.selected.len()
    }

    pub fn n_outputs(&self) -> usize {
        self.projection.n_components()
    }
}

fn selected_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &keep)| keep.then_some(i))
        .collect()
}

/// Learns the significance mask at level `significance`, then the projection that
/// retains `explain` of the filtered variance.
pub fn fit(
    x: ArrayView2<f64>,
    labels: ArrayView1<f64>,
    significance: f64,
    explain: f64,
) -> Result<ReducerState, ReduceError> {
    let scores = anova::f_classif(x, labels)?;
    let selected = scores.mask(significance);
    let kept = selected.iter().filter(|&&keep| keep).count();
    info!(
        "ANOVA F filter kept {} of {} features at significance {}.",
        kept,
        selected.len(),
        significance
    );
    if kept == 0 {
        return Err(ReduceError::NoSignificantFeatures {
            alpha: significance,
            tested: selected.len(),
        });
    }

    let indices = selected_indices(&selected);
    let filtered = x.select(Axis(1), &indices);
    let projection = pca::fit(filtered.view(), explain)?;
    Ok(ReducerState {
        selected,
        projection,
    })
}

pub fn transform(x: ArrayView2<f64>, state: &ReducerState) -> Result<Array2<f64>, ReduceError> {
    if x.ncols() != state.n_inputs() {
        return Err(ReduceError::FeatureCountMismatch {
            found: x.ncols(),
            expected: state.n_inputs(),
        });
    }
    let filtered = x.select(Axis(1), &selected_indices(&state.selected));
    pca::transform(filtered.view(), &state.projection)
}
