//! One-way ANOVA F-test of every feature column against the class labels.

use super::ReduceError;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

/// F statistics and p-values for every column.
///
/// A column that is constant within every class and across classes has an undefined
/// statistic (`NaN` for both values). A column that is constant within every class but
/// differs between classes has `F = inf` and `p = 0`.
#[derive(Debug, Clone)]
pub struct AnovaScores {
    pub f_statistics: Array1<f64>,
    pub p_values: Array1<f64>,
}

impl AnovaScores {
    /// Columns whose p-value is strictly below `alpha`. Undefined p-values never pass.
    pub fn mask(&self, alpha: f64) -> Vec<bool> {
        self.p_values.iter().map(|&p| p < alpha).collect()
    }
}

/// Groups row indices by label value, classes in ascending label order.
fn class_members(labels: ArrayView1<f64>) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..labels.len()).collect();
    order.sort_by(|&a, &b| labels[a].total_cmp(&labels[b]));

    let mut classes: Vec<Vec<usize>> = Vec::new();
    let mut current: Option<f64> = None;
    for idx in order {
        if current != Some(labels[idx]) {
            classes.push(Vec::new());
            current = Some(labels[idx]);
        }
        if let Some(members) = classes.last_mut() {
            members.push(idx);
        }
    }
    classes
}

pub fn f_classif(x: ArrayView2<f64>, labels: ArrayView1<f64>) -> Result<AnovaScores, ReduceError> {
    if labels.len() != x.nrows() {
        return Err(ReduceError::LabelCountMismatch {
            labels: labels.len(),
            rows: x.nrows(),
        });
    }

    let classes = class_members(labels);
    let n = x.nrows();
    let k = classes.len();
    if k < 2 {
        return Err(ReduceError::SingleClass);
    }
    if n <= k {
        return Err(ReduceError::TooFewSamples {
            found: n,
            required: k + 1,
        });
    }

    let df_between = (k - 1) as f64;
    let df_within = (n - k) as f64;
    let distribution = FisherSnedecor::new(df_between, df_within)
        .map_err(|e| ReduceError::Distribution(e.to_string()))?;

    let mut f_statistics = Array1::zeros(x.ncols());
    let mut p_values = Array1::zeros(x.ncols());
    for (j, column) in x.axis_iter(Axis(1)).enumerate() {
        let grand_mean = column.sum() / n as f64;
        let mut ss_between = 0.0;
        let mut ss_within = 0.0;
        for members in &classes {
            let class_mean =
                members.iter().map(|&i| column[i]).sum::<f64>() / members.len() as f64;
            ss_between += members.len() as f64 * (class_mean - grand_mean).powi(2);
            ss_within += members
                .iter()
                .map(|&i| (column[i] - class_mean).powi(2))
                .sum::<f64>();
        }

        let ms_between = ss_between / df_between;
        let ms_within = ss_within / df_within;
        let (f, p) = if ms_within > 0.0 {
            let f = ms_between / ms_within;
            (f, distribution.sf(f))
        } else if ms_between > 0.0 {
            (f64::INFINITY, 0.0)
        } else {
            (f64::NAN, f64::NAN)
        };
        f_statistics[j] = f;
        p_values[j] = p;
    }

    Ok(AnovaScores {
        f_statistics,
        p_values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    // With two numerator degrees of freedom the F survival function has the closed
    // form (1 + 2F/d2)^(-d2/2).
    #[test]
    fn three_class_statistics_match_closed_form() {
        let x = array![
            [1.0, 1.0, 3.0, 0.0],
            [2.0, 2.0, 3.0, 0.0],
            [4.0, 2.0, 3.0, 1.0],
            [5.0, 1.0, 3.0, 1.0],
            [7.0, 1.0, 3.0, 2.0],
            [8.0, 2.0, 3.0, 2.0],
        ];
        let labels = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];
        let scores = f_classif(x.view(), labels.view()).unwrap();

        assert_abs_diff_eq!(scores.f_statistics[0], 36.0, epsilon = 1e-10);
        assert_abs_diff_eq!(scores.p_values[0], 1.0 / 125.0, epsilon = 1e-9);

        assert_abs_diff_eq!(scores.f_statistics[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(scores.p_values[1], 1.0, epsilon = 1e-9);

        assert!(scores.f_statistics[2].is_nan());
        assert!(scores.p_values[2].is_nan());

        assert!(scores.f_statistics[3].is_infinite());
        assert_eq!(scores.p_values[3], 0.0);

        assert_eq!(scores.mask(0.05), vec![true, false, false, true]);
        assert_eq!(scores.mask(0.005), vec![false, false, false, true]);
    }

    #[test]
    fn single_class_is_rejected() {
        let x = array![[1.0], [2.0], [3.0]];
        let labels = array![1.0, 1.0, 1.0];
        assert!(matches!(
            f_classif(x.view(), labels.view()),
            Err(ReduceError::SingleClass)
        ));
    }

    #[test]
    fn too_few_rows_per_class_is_rejected() {
        let x = array![[1.0], [2.0]];
        let labels = array![0.0, 1.0];
        assert!(matches!(
            f_classif(x.view(), labels.view()),
            Err(ReduceError::TooFewSamples { found: 2, required: 3 })
        ));
    }
}
