//! Per-feature k-means discretization with one-hot output.

use crate::binning::{BinEdges, BinningError};
use log::info;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum DiscretizeError {
    #[error("Got {found} bin counts for a matrix with {expected} features.")]
    BinCountMismatch { found: usize, expected: usize },

    #[error("Input has {found} features, but the discretizer was fitted on {expected}.")]
    FeatureCountMismatch { found: usize, expected: usize },

    #[error("Failed to fit bins for feature {feature}: {source}")]
    Binning {
        feature: usize,
        #[source]
        source: BinningError,
    },
}

/// Fitted bin edges for every input feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscretizerState {
    pub features: Vec<BinEdges>,
}

impl DiscretizerState {
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    /// Width of the one-hot output: the sum of fitted bins over all features.
    pub fn n_outputs(&self) -> usize {
        self.features.iter().map(BinEdges::n_bins).sum()
    }
}

/// Fits k-means bin edges for every column of `raw`, using `bin_counts[j]` bins for
/// column `j`.
pub fn fit(raw: ArrayView2<f64>, bin_counts: &[usize]) -> Result<DiscretizerState, DiscretizeError> {
    if bin_counts.len() != raw.ncols() {
        return Err(DiscretizeError::BinCountMismatch {
            found: bin_counts.len(),
            expected: raw.ncols(),
        });
    }

    let features = raw
        .axis_iter(Axis(1))
        .zip(bin_counts)
        .enumerate()
        .map(|(feature, (column, &bins))| {
            BinEdges::fit(column, bins).map_err(|source| DiscretizeError::Binning { feature, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let state = DiscretizerState { features };
    info!(
        "Discretizer fitted: {} features expand to {} one-hot columns.",
        state.n_features(),
        state.n_outputs()
    );
    Ok(state)
}

/// One-hot encodes `raw` with previously fitted edges. Each input feature contributes
/// exactly one active column per row.
pub fn transform(
    raw: ArrayView2<f64>,
    state: &DiscretizerState,
) -> Result<Array2<f64>, DiscretizeError> {
    if raw.ncols() != state.n_features() {
        return Err(DiscretizeError::FeatureCountMismatch {
            found: raw.ncols(),
            expected: state.n_features(),
        });
    }

    let mut encoded = Array2::zeros((raw.nrows(), state.n_outputs()));
    let mut offset = 0;
    for (column, edges) in raw.axis_iter(Axis(1)).zip(&state.features) {
        for (row, &value) in column.iter().enumerate() {
            encoded[[row, offset + edges.bin_index(value)]] = 1.0;
        }
        offset += edges.n_bins();
    }
    Ok(encoded)
}
