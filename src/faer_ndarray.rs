//! Bridge from `ndarray` matrices to faer's dense decompositions.

use faer::diag::DiagRef;
use faer::linalg::solvers;
use faer::{Mat, MatRef, Side};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaerLinalgError {
    #[error("Self-adjoint eigendecomposition failed: {0:?}")]
    SelfAdjointEigen(solvers::EvdError),
}

fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

fn diag_to_array(diag: DiagRef<'_, f64>) -> Array1<f64> {
    let mat = diag.column_vector().as_mat();
    Array1::from_shape_fn(mat.nrows(), |i| mat[(i, 0)])
}

enum FaerStorage<'a> {
    Borrowed(MatRef<'a, f64>),
    Owned(Mat<f64>),
}

/// Zero-copy faer view of a standard- or Fortran-layout array, copying only when the
/// array is strided.
pub struct FaerArrayView<'a> {
    storage: FaerStorage<'a>,
}

impl<'a> FaerArrayView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let (rows, cols) = array.dim();
        let storage = match array.as_slice_memory_order() {
            Some(slice) if array.is_standard_layout() => {
                FaerStorage::Borrowed(MatRef::from_row_major_slice(slice, rows, cols))
            }
            Some(slice) if array.t().is_standard_layout() => {
                FaerStorage::Borrowed(MatRef::from_column_major_slice(slice, rows, cols))
            }
            _ => FaerStorage::Owned(Mat::from_fn(rows, cols, |i, j| array[(i, j)])),
        };
        Self { storage }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        match &self.storage {
            FaerStorage::Borrowed(view) => *view,
            FaerStorage::Owned(mat) => mat.as_ref(),
        }
    }
}

pub trait FaerEigh {
    fn eigh(&self, side: Side) -> Result<(Array1<f64>, Array2<f64>), FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerEigh for ArrayBase<S, Ix2> {
    fn eigh(&self, side: Side) -> Result<(Array1<f64>, Array2<f64>), FaerLinalgError> {
        let faer_view = FaerArrayView::new(self);
        let eigen = faer_view
            .as_ref()
            .self_adjoint_eigen(side)
            .map_err(FaerLinalgError::SelfAdjointEigen)?;
        let values = diag_to_array(eigen.S());
        let vectors = mat_to_array(eigen.U());
        Ok((values, vectors))
    }
}

/// Eigenpairs of a symmetric positive semi-definite matrix, ordered by descending
/// eigenvalue. Round-off negatives are clamped to zero.
pub fn descending_psd_eigh(
    matrix: &Array2<f64>,
) -> Result<(Array1<f64>, Array2<f64>), FaerLinalgError> {
    let (values, vectors) = matrix.eigh(Side::Lower)?;
    let mut idxs: Vec<usize> = (0..values.len()).collect();
    idxs.sort_by(|&i, &j| values[j].total_cmp(&values[i]));

    let sorted_values = Array1::from_iter(idxs.iter().map(|&i| values[i].max(0.0)));
    let mut sorted_vectors = Array2::zeros((matrix.nrows(), idxs.len()));
    for (col, &idx) in idxs.iter().enumerate() {
        sorted_vectors.column_mut(col).assign(&vectors.column(idx));
    }
    Ok((sorted_values, sorted_vectors))
}
