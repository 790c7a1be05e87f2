//! One-dimensional k-means binning.
//!
//! Bin edges are placed halfway between neighbouring cluster centres, so each bin
//! captures one natural cluster of a feature's values instead of an equal-width or
//! equal-frequency slice. This is the primitive shared by the bin allocator (which
//! only needs occupancy counts) and the discretizer (which keeps the edges).

use log::warn;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_KMEANS_ITERATIONS: usize = 300;
/// Relative convergence tolerance, scaled by the column variance.
const KMEANS_TOLERANCE: f64 = 1.0e-4;
/// Bins narrower than this are merged into their left neighbour.
const MIN_BIN_WIDTH: f64 = 1.0e-8;
const DIGITIZE_ATOL: f64 = 1.0e-8;
const DIGITIZE_RTOL: f64 = 1.0e-5;

#[derive(Error, Debug, PartialEq)]
pub enum BinningError {
    #[error("A feature must be split into at least 2 bins, but {0} were requested.")]
    TooFewBins(usize),

    #[error("Cannot fit bin edges on an empty feature column.")]
    EmptyColumn,

    #[error("Feature column contains the non-finite value {0}; bin edges require finite data.")]
    NonFiniteValue(f64),
}

/// Fitted edges for a single feature. `edges.len() == n_bins + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinEdges {
    edges: Vec<f64>,
}

impl BinEdges {
    /// Fits `n_bins` k-means bins to `column`.
    ///
    /// A constant column, or one whose range is below [`MIN_BIN_WIDTH`], collapses to a
    /// single bin spanning the real line. Bins whose
    /// width falls below [`MIN_BIN_WIDTH`] are dropped, so the fitted bin count can be
    /// lower than requested.
    pub fn fit(column: ArrayView1<f64>, n_bins: usize) -> Result<Self, BinningError> {
        if n_bins < 2 {
            return Err(BinningError::TooFewBins(n_bins));
        }
        if column.is_empty() {
            return Err(BinningError::EmptyColumn);
        }
        if let Some(&bad) = column.iter().find(|v| !v.is_finite()) {
            return Err(BinningError::NonFiniteValue(bad));
        }

        let (min, max) = column
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });

        // A range narrower than one bin would lose every inner and outer edge below.
        if max - min <= MIN_BIN_WIDTH {
            return Ok(Self {
                edges: vec![f64::NEG_INFINITY, f64::INFINITY],
            });
        }

        let centers = internal::kmeans_centers(column, min, max, n_bins);

        let mut raw_edges = Vec::with_capacity(n_bins + 1);
        raw_edges.push(min);
        raw_edges.extend(centers.windows(2).map(|pair| 0.5 * (pair[0] + pair[1])));
        raw_edges.push(max);

        let mut edges = Vec::with_capacity(raw_edges.len());
        for edge in raw_edges {
            match edges.last() {
                Some(&previous) if edge - previous <= MIN_BIN_WIDTH => {}
                _ => edges.push(edge),
            }
        }

        if edges.len() - 1 < n_bins {
            warn!(
                "Bins whose width is too small were removed: requested {} bins, fitted {}.",
                n_bins,
                edges.len() - 1
            );
        }

        Ok(Self { edges })
    }

    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Bin index of `value`. Values outside the fitted range land in the first or last bin.
    pub fn bin_index(&self, value: f64) -> usize {
        let nudged = value + DIGITIZE_ATOL + DIGITIZE_RTOL * value.abs();
        let passed = self.edges[1..].iter().take_while(|&&e| e <= nudged).count();
        passed.min(self.n_bins() - 1)
    }

    /// Number of values of `column` falling in each bin.
    pub fn occupancy(&self, column: ArrayView1<f64>) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_bins()];
        for &value in column {
            counts[self.bin_index(value)] += 1;
        }
        counts
    }
}

mod internal {
    use super::*;

    /// Lloyd's algorithm in one dimension, seeded at the midpoints of `n_bins` uniform
    /// bins over `[min, max]`. Returns the centres in ascending order.
    pub(super) fn kmeans_centers(
        column: ArrayView1<f64>,
        min: f64,
        max: f64,
        n_bins: usize,
    ) -> Vec<f64> {
        let width = (max - min) / n_bins as f64;
        let mut centers: Vec<f64> = (0..n_bins)
            .map(|i| min + width * (i as f64 + 0.5))
            .collect();

        let n = column.len() as f64;
        let mean = column.sum() / n;
        let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let tolerance = KMEANS_TOLERANCE * variance;

        let mut sums = vec![0.0; n_bins];
        let mut counts = vec![0usize; n_bins];
        for _ in 0..MAX_KMEANS_ITERATIONS {
            sums.fill(0.0);
            counts.fill(0);
            for &value in column {
                let nearest = nearest_center(&centers, value);
                sums[nearest] += value;
                counts[nearest] += 1;
            }

            let mut shift = 0.0;
            for (k, center) in centers.iter_mut().enumerate() {
                // Empty clusters keep their previous centre.
                if counts[k] > 0 {
                    let updated = sums[k] / counts[k] as f64;
                    shift += (updated - *center).powi(2);
                    *center = updated;
                }
            }
            if shift <= tolerance {
                break;
            }
        }

        centers.sort_by(f64::total_cmp);
        centers
    }

    /// Index of the closest centre; ties resolve to the lower index.
    fn nearest_center(centers: &[f64], value: f64) -> usize {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (k, &center) in centers.iter().enumerate() {
            let distance = (value - center).abs();
            if distance < best_distance {
                best = k;
                best_distance = distance;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn separated_clusters_get_edges_between_them() {
        let column = array![0.0, 0.1, 0.2, 5.0, 5.1, 5.2, 10.0, 10.1, 10.2];
        let bins = BinEdges::fit(column.view(), 3).unwrap();
        assert_eq!(bins.n_bins(), 3);
        let edges = bins.edges();
        assert_abs_diff_eq!(edges[0], 0.0);
        assert_abs_diff_eq!(edges[1], 2.6, epsilon = 1e-12);
        assert_abs_diff_eq!(edges[2], 7.6, epsilon = 1e-12);
        assert_abs_diff_eq!(edges[3], 10.2);
        assert_eq!(bins.occupancy(column.view()), vec![3, 3, 3]);
    }

    #[test]
    fn binary_column_splits_at_midpoint() {
        let column = array![0.0, 1.0, 0.0, 1.0];
        let bins = BinEdges::fit(column.view(), 2).unwrap();
        assert_eq!(bins.edges(), &[0.0, 0.5, 1.0]);
        assert_eq!(bins.bin_index(0.0), 0);
        assert_eq!(bins.bin_index(1.0), 1);
    }

    #[test]
    fn constant_column_collapses_to_one_bin() {
        let column = array![3.0, 3.0, 3.0];
        let bins = BinEdges::fit(column.view(), 4).unwrap();
        assert_eq!(bins.n_bins(), 1);
        assert_eq!(bins.bin_index(-100.0), 0);
        assert_eq!(bins.bin_index(100.0), 0);
    }

    #[test]
    fn range_below_min_width_collapses_to_one_bin() {
        let column = array![0.0, 1e-9];
        let bins = BinEdges::fit(column.view(), 2).unwrap();
        assert_eq!(bins.n_bins(), 1);
        assert_eq!(bins.bin_index(0.0), 0);
        assert_eq!(bins.bin_index(1e-9), 0);
        assert_eq!(bins.occupancy(column.view()), vec![2]);
    }

    #[test]
    fn out_of_range_values_are_clipped() {
        let column = array![1.0, 2.0, 3.0, 4.0];
        let bins = BinEdges::fit(column.view(), 2).unwrap();
        assert_eq!(bins.bin_index(-50.0), 0);
        assert_eq!(bins.bin_index(50.0), bins.n_bins() - 1);
    }

    #[test]
    fn more_bins_than_values_drops_empty_bins() {
        let column = array![0.0, 0.0, 1.0, 1.0];
        let bins = BinEdges::fit(column.view(), 5).unwrap();
        assert!(bins.n_bins() <= 5);
        let occupancy = bins.occupancy(column.view());
        assert_eq!(occupancy.iter().sum::<usize>(), 4);
    }

    #[test]
    fn rejects_degenerate_requests() {
        let column = array![1.0, f64::NAN];
        assert_eq!(
            BinEdges::fit(column.view(), 2).unwrap_err().to_string(),
            BinningError::NonFiniteValue(f64::NAN).to_string()
        );
        assert_eq!(
            BinEdges::fit(array![1.0].view(), 1),
            Err(BinningError::TooFewBins(1))
        );
        assert_eq!(
            BinEdges::fit(ndarray::Array1::<f64>::zeros(0).view(), 2),
            Err(BinningError::EmptyColumn)
        );
    }
}
