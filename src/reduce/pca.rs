//! Variance-retention projection (principal components of the train covariance).

use super::ReduceError;
use crate::faer_ndarray::descending_psd_eigh;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Slack on the cumulative explained-variance comparison.
const EXPLAIN_TOLERANCE: f64 = 1.0e-12;
/// Eigenvalues below this fraction of the largest one count as numerically zero.
const RANK_TOLERANCE: f64 = 1.0e-10;

/// The learned projection: `transform(X) = (X - mean) · components`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaState {
    /// Per-feature train means. Shape: [n_features].
    pub mean: Array1<f64>,
    /// Principal axes as columns. Shape: [n_features, n_components].
    pub components: Array2<f64>,
    /// Variance captured by each kept component.
    pub explained_variance: Array1<f64>,
    /// Fraction of total variance captured by each kept component.
    pub explained_variance_ratio: Array1<f64>,
}

impl PcaState {
    pub fn n_features(&self) -> usize {
        self.components.nrows()
    }

    pub fn n_components(&self) -> usize {
        self.components.ncols()
    }
}

/// Fits the minimal set of components whose cumulative explained variance reaches
/// `explain`.
pub fn fit(x: ArrayView2<f64>, explain: f64) -> Result<PcaState, ReduceError> {
    let (n_samples, n_features) = x.dim();
    if n_features == 0 {
        return Err(ReduceError::NoFeatures);
    }
    if n_samples < 2 {
        return Err(ReduceError::TooFewSamples {
            found: n_samples,
            required: 2,
        });
    }

    let mean = x.mean_axis(Axis(0)).ok_or(ReduceError::NoFeatures)?;
    let centered = &x - &mean;
    let covariance = centered.t().dot(&centered) / (n_samples - 1) as f64;
    let (eigenvalues, eigenvectors) = descending_psd_eigh(&covariance)?;

    let total: f64 = eigenvalues.sum();
    if !(total > 0.0) {
        return Err(ReduceError::ZeroVariance);
    }
    let rank = eigenvalues
        .iter()
        .take_while(|&&v| v > eigenvalues[0] * RANK_TOLERANCE)
        .count();

    let ratios = &eigenvalues / total;
    let mut cumulative = 0.0;
    let mut n_components = ratios.len();
    for (i, &ratio) in ratios.iter().enumerate() {
        cumulative += ratio;
        if cumulative >= explain - EXPLAIN_TOLERANCE {
            n_components = i + 1;
            break;
        }
    }
    if n_components > rank {
        return Err(ReduceError::RankDeficient {
            required: n_components,
            rank,
        });
    }

    let mut components = eigenvectors.slice(ndarray::s![.., ..n_components]).to_owned();
    // The sign of an eigenvector is arbitrary; pin it so the largest loading is positive.
    for mut axis in components.axis_iter_mut(Axis(1)) {
        let pivot = axis
            .iter()
            .copied()
            .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
        if pivot < 0.0 {
            axis.mapv_inplace(|v| -v);
        }
    }

    let explained_variance = eigenvalues.slice(ndarray::s![..n_components]).to_owned();
    let explained_variance_ratio = ratios.slice(ndarray::s![..n_components]).to_owned();
    log::info!(
        "PCA kept {} of {} components, explaining {:.4} of the variance.",
        n_components,
        n_features,
        explained_variance_ratio.sum()
    );

    Ok(PcaState {
        mean,
        components,
        explained_variance,
        explained_variance_ratio,
    })
}

pub fn transform(x: ArrayView2<f64>, state: &PcaState) -> Result<Array2<f64>, ReduceError> {
    if x.ncols() != state.n_features() {
        return Err(ReduceError::FeatureCountMismatch {
            found: x.ncols(),
            expected: state.n_features(),
        });
    }
    Ok((&x - &state.mean).dot(&state.components))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn collinear_data_needs_one_component() {
        let x = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0], [4.0, 8.0]];
        let state = fit(x.view(), 0.99).unwrap();
        assert_eq!(state.n_components(), 1);
        assert_abs_diff_eq!(state.explained_variance_ratio[0], 1.0, epsilon = 1e-9);

        let axis = state.components.column(0);
        let norm = 5f64.sqrt();
        assert_abs_diff_eq!(axis[0], 1.0 / norm, epsilon = 1e-9);
        assert_abs_diff_eq!(axis[1], 2.0 / norm, epsilon = 1e-9);

        let projected = transform(x.view(), &state).unwrap();
        assert_abs_diff_eq!(projected.column(0).sum(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(projected[[3, 0]], 1.5 * norm, epsilon = 1e-9);
    }

    #[test]
    fn explain_fraction_selects_minimal_components() {
        // Independent axes with variances 9 : 4 : 1 (scaled by the same factor).
        let x = array![
            [3.0, 0.0, 0.0],
            [-3.0, 0.0, 0.0],
            [0.0, 2.0, 0.0],
            [0.0, -2.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 0.0, -1.0],
        ];
        assert_eq!(fit(x.view(), 9.0 / 14.0).unwrap().n_components(), 1);
        assert_eq!(fit(x.view(), 0.7).unwrap().n_components(), 2);
        assert_eq!(fit(x.view(), 13.0 / 14.0).unwrap().n_components(), 2);
        assert_eq!(fit(x.view(), 1.0).unwrap().n_components(), 3);
    }

    #[test]
    fn fit_then_transform_is_deterministic() {
        let x = array![[0.5, 1.0, 0.0], [1.5, 0.0, 1.0], [2.0, 1.0, 1.0], [0.0, 0.0, 0.0]];
        let state = fit(x.view(), 0.9).unwrap();
        let first = transform(x.view(), &state).unwrap();
        let second = transform(x.view(), &fit(x.view(), 0.9).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn retaining_variance_below_numerical_rank_is_rejected() {
        // The second axis carries 1e-11 of the variance: enough to be needed for a full
        // explain fraction, too little to count towards the rank.
        let s = 1e-11f64.sqrt();
        let x = array![[1.0, 0.0], [-1.0, 0.0], [0.0, s], [0.0, -s]];
        assert!(matches!(
            fit(x.view(), 1.0),
            Err(ReduceError::RankDeficient { required: 2, rank: 1 })
        ));
        assert_eq!(fit(x.view(), 0.99).unwrap().n_components(), 1);
    }

    #[test]
    fn constant_matrix_has_no_variance() {
        let x = array![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        assert!(matches!(fit(x.view(), 0.5), Err(ReduceError::ZeroVariance)));
    }

    #[test]
    fn single_row_is_rejected() {
        let x = array![[1.0, 2.0]];
        assert!(matches!(
            fit(x.view(), 0.5),
            Err(ReduceError::TooFewSamples { found: 1, required: 2 })
        ));
    }
}
