#[cfg(test)]
use sprs::CsVecBase;
#[cfg(test)]
use std::ops::Deref;

#[cfg(test)]
pub(crate) fn to_dense<IStorage, DStorage>(vec: &CsVecBase<IStorage, DStorage, f64>) -> Vec<f64>
where
    IStorage: Deref<Target = [usize]>,
    DStorage: Deref<Target = [f64]>,
{
    let mut dense = vec![0.0; vec.dim()];
    vec.scatter(&mut dense);
    dense
}

/// Column `column` of a CSC matrix, written into `dense` (which is cleared first).
pub(crate) fn scatter_column(matrix: &sprs::CsMatI<f64, usize>, column: usize, dense: &mut [f64]) {
    dense.iter_mut().for_each(|v| *v = 0.0);
    if let Some(col) = matrix.outer_view(column) {
        for (row, &val) in col.iter() {
            dense[row] = val;
        }
    }
}

/// Largest absolute entry; zero for an empty slice.
pub(crate) fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

pub(crate) fn is_integral(value: f64, tolerance: f64) -> bool {
    (value - value.round()).abs() <= tolerance
}

#[cfg(test)]
use sprs::{CsMat, CsVec};

#[cfg(test)]
pub(crate) fn to_sparse(slice: &[f64]) -> CsVec<f64> {
    let mut res = CsVec::empty(slice.len());
    for (i, &val) in slice.iter().enumerate() {
        if val != 0.0 {
            res.append(i, val);
        }
    }
    res
}

#[cfg(test)]
pub(crate) fn to_csc(rows: &[Vec<f64>]) -> CsMat<f64> {
    let n_cols = rows.first().map_or(0, |row| row.len());
    let mut triplets = sprs::TriMat::new((rows.len(), n_cols));
    for (r, row) in rows.iter().enumerate() {
        for (c, &val) in row.iter().enumerate() {
            if val != 0.0 {
                triplets.add_triplet(r, c, val);
            }
        }
    }
    triplets.to_csc()
}

#[cfg(test)]
pub(crate) fn assert_matrix_eq(mat: &CsMat<f64>, reference: &[Vec<f64>]) {
    let mat = mat.to_csr();
    assert_eq!(mat.rows(), reference.len());
    for (r, row) in mat.outer_iterator().enumerate() {
        assert_slice_close(&to_dense(&row), &reference[r]);
    }
}

#[cfg(test)]
pub(crate) fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() <= 1e-6 * (1.0 + expected.abs()),
        "expected {}, got {}",
        expected,
        actual
    );
}

#[cfg(test)]
pub(crate) fn assert_slice_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "lengths differ");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= 1e-6 * (1.0 + e.abs()),
            "entry {} differs: expected {}, got {} ({:?} vs {:?})",
            i,
            e,
            a,
            expected,
            actual
        );
    }
}
