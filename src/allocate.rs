//! Forward-stepwise bin allocation.
//!
//! Every feature starts with two bins. The allocator then hands out additional bins one
//! at a time to the feature whose next split changes its binned-occupancy entropy the
//! most, until the budget is exhausted or every feature has as many bins as it has
//! distinct values.

use crate::binning::{BinEdges, BinningError};
use log::debug;
use ndarray::{ArrayView1, ArrayView2, Axis};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Number of bins every feature starts with.
pub const BASE_BINS: usize = 2;

/// Heap entry ordered by `(gain, feature)` with a total order on the gain.
///
/// Wrapped in `Reverse` this yields a min-heap: the most negative gain, i.e. the largest
/// entropy increase, pops first, and equal gains pop in ascending feature order.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    gain: f64,
    feature: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.gain
            .total_cmp(&other.gain)
            .then(self.feature.cmp(&other.feature))
    }
}

/// Shannon entropy (natural log) of the occupancy distribution of `column` binned into
/// `bins` k-means bins.
pub fn binned_entropy(column: ArrayView1<f64>, bins: usize) -> Result<f64, BinningError> {
    let occupancy = BinEdges::fit(column, bins)?.occupancy(column);
    let total: usize = occupancy.iter().sum();
    let entropy = occupancy
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total as f64;
            -p * p.ln()
        })
        .sum();
    Ok(entropy)
}

fn distinct_values(column: ArrayView1<f64>) -> usize {
    let mut values: Vec<f64> = column.to_vec();
    values.sort_by(f64::total_cmp);
    values.dedup();
    values.len()
}

/// Decides how many bins each column of `raw` gets.
///
/// # Arguments
/// * `raw`: unbinned feature matrix, shape `[n_samples, n_features]`.
/// * `max_additional_bins`: how many times a feature may receive one extra bin.
///
/// # Returns
/// One bin count per feature. Features with at most two distinct values always keep
/// [`BASE_BINS`].
pub fn allocate_bins(
    raw: ArrayView2<f64>,
    max_additional_bins: usize,
) -> Result<Vec<usize>, BinningError> {
    let n_features = raw.ncols();
    let mut num_bins = vec![BASE_BINS; n_features];
    if max_additional_bins == 0 || raw.nrows() == 0 {
        return Ok(num_bins);
    }

    let max_bins: Vec<usize> = raw.axis_iter(Axis(1)).map(distinct_values).collect();
    let mut entropies = vec![0.0; n_features];
    let mut options = BinaryHeap::new();

    for (feature, column) in raw.axis_iter(Axis(1)).enumerate() {
        if max_bins[feature] <= BASE_BINS {
            continue;
        }
        entropies[feature] = binned_entropy(column, BASE_BINS)?;
        let next = binned_entropy(column, BASE_BINS + 1)?;
        options.push(Reverse(Candidate {
            gain: -(next - entropies[feature]),
            feature,
        }));
    }

    for _ in 0..max_additional_bins {
        let Some(Reverse(Candidate { gain, feature })) = options.pop() else {
            break;
        };
        num_bins[feature] += 1;
        entropies[feature] -= gain;
        debug!(
            "Feature {} grows to {} bins (entropy {:.6}).",
            feature, num_bins[feature], entropies[feature]
        );

        if num_bins[feature] < max_bins[feature] {
            let next = binned_entropy(raw.column(feature), num_bins[feature] + 1)?;
            options.push(Reverse(Candidate {
                gain: -(next - entropies[feature]),
                feature,
            }));
        }
    }

    Ok(num_bins)
}
