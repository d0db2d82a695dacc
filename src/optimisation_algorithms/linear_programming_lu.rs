use anyhow::{Result, anyhow};
use ndarray::Array2;

/// Dense LU decomposition with partial pivoting: `P·B = L·U`.
///
/// `L` is unit lower triangular and shares the array with `U`.
#[derive(Clone, Debug)]
pub(crate) struct LUFactors {
    lu: Array2<f64>,
    /// `row_perm[i]` is the row of `B` that ended up at position `i`.
    row_perm: Vec<usize>,
    nnz: usize,
}

pub(crate) fn lu_factorise(mut a: Array2<f64>, singular_tolerance: f64) -> Result<LUFactors> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(anyhow!("cannot factorise a {}x{} matrix", n, a.ncols()));
    }
    let mut row_perm = (0..n).collect::<Vec<_>>();

    for k in 0..n {
        let mut pivot_row = k;
        let mut pivot_abs = a[[k, k]].abs();
        for i in k + 1..n {
            if a[[i, k]].abs() > pivot_abs {
                pivot_row = i;
                pivot_abs = a[[i, k]].abs();
            }
        }
        if pivot_abs <= singular_tolerance {
            return Err(anyhow!("matrix is singular at column {}", k));
        }
        if pivot_row != k {
            for j in 0..n {
                a.swap([k, j], [pivot_row, j]);
            }
            row_perm.swap(k, pivot_row);
        }

        let pivot = a[[k, k]];
        for i in k + 1..n {
            let factor = a[[i, k]] / pivot;
            a[[i, k]] = factor;
            if factor != 0.0 {
                for j in k + 1..n {
                    a[[i, j]] -= factor * a[[k, j]];
                }
            }
        }
    }

    let off_diagonal = a
        .indexed_iter()
        .filter(|&((i, j), &val)| i != j && val != 0.0)
        .count();
    Ok(LUFactors {
        lu: a,
        row_perm,
        nnz: off_diagonal + n,
    })
}

impl LUFactors {
    pub(crate) fn size(&self) -> usize {
        self.row_perm.len()
    }

    /// Nonzeros of `L` (without the unit diagonal) and `U`, counted once when factorising.
    pub(crate) fn nnz(&self) -> usize {
        self.nnz
    }

    /// Solves `B·x = rhs` in place.
    pub(crate) fn solve(&self, rhs: &mut [f64]) {
        let n = self.size();
        let mut y = self.row_perm.iter().map(|&r| rhs[r]).collect::<Vec<_>>();
        for i in 0..n {
            let mut sum = y[i];
            for j in 0..i {
                sum -= self.lu[[i, j]] * y[j];
            }
            y[i] = sum;
        }
        for i in (0..n).rev() {
            let mut sum = y[i];
            for j in i + 1..n {
                sum -= self.lu[[i, j]] * y[j];
            }
            y[i] = sum / self.lu[[i, i]];
        }
        rhs.copy_from_slice(&y);
    }

    /// Solves `Bᵗ·x = rhs` in place.
    pub(crate) fn solve_transp(&self, rhs: &mut [f64]) {
        let n = self.size();
        let mut z = rhs.to_vec();
        // Uᵗ·z = rhs
        for i in 0..n {
            let mut sum = z[i];
            for j in 0..i {
                sum -= self.lu[[j, i]] * z[j];
            }
            z[i] = sum / self.lu[[i, i]];
        }
        // Lᵗ·w = z
        for i in (0..n).rev() {
            let mut sum = z[i];
            for j in i + 1..n {
                sum -= self.lu[[j, i]] * z[j];
            }
            z[i] = sum;
        }
        for (i, &r) in self.row_perm.iter().enumerate() {
            rhs[r] = z[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::optimisation_algorithms::linear_programming_helpers::assert_slice_close;

    fn multiply(a: &Array2<f64>, x: &[f64]) -> Vec<f64> {
        (0..a.nrows())
            .map(|i| (0..a.ncols()).map(|j| a[[i, j]] * x[j]).sum())
            .collect()
    }

    #[test]
    fn solve_with_pivoting() {
        let a = array![[0.0, 2.0, 1.0], [1.0, 1.0, 0.0], [4.0, 0.0, 3.0]];
        let lu = lu_factorise(a.clone(), 1e-12).unwrap();
        assert_eq!(lu.size(), 3);

        let mut x = vec![1.0, 2.0, 3.0];
        lu.solve(&mut x);
        assert_slice_close(&multiply(&a, &x), &[1.0, 2.0, 3.0]);

        let mut y = vec![-1.0, 0.5, 2.0];
        lu.solve_transp(&mut y);
        assert_slice_close(&multiply(&a.t().to_owned(), &y), &[-1.0, 0.5, 2.0]);
    }

    #[test]
    fn nonzeros_of_the_factors() {
        let a = array![[0.0, 2.0, 1.0], [1.0, 1.0, 0.0], [4.0, 0.0, 3.0]];
        let lu = lu_factorise(a, 1e-12).unwrap();
        // U = [[4, 0, 3], [0, 2, 1], [0, 0, -1.25]], L below the diagonal: 0.25 and 0.5
        assert_eq!(lu.nnz(), 7);

        let identity = lu_factorise(Array2::eye(4), 1e-12).unwrap();
        assert_eq!(identity.nnz(), 4);
    }

    #[test]
    fn singular() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        let err = lu_factorise(a, 1e-12).unwrap_err();
        assert_eq!(err.to_string(), "matrix is singular at column 1");
    }

    #[test]
    fn empty() {
        let lu = lu_factorise(Array2::zeros((0, 0)), 1e-12).unwrap();
        let mut x: Vec<f64> = vec![];
        lu.solve(&mut x);
        lu.solve_transp(&mut x);
        assert_eq!(lu.nnz(), 0);
    }
}
