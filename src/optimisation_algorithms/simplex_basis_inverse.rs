use anyhow::{Context, Result, anyhow};
use log::trace;
use ndarray::Array2;

use crate::optimisation_algorithms::{
    linear_programming_helpers::{max_abs, scatter_column},
    linear_programming_lu::{LUFactors, lu_factorise},
    linear_programming_sparse::{SparseVec, SparseVecPool},
    simplex_options::{InverseChoice, SimplexOptions},
    simplex_structure::CsMat,
};

/// How an update of the basis inverse was carried out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UpdateKind {
    Incremental,
    Refactorised,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BasisUpdateStats {
    /// Column replacements absorbed without refactorising.
    pub updates: usize,
    /// Full rebuilds, including the initial one.
    pub refactorisations: usize,
    /// Updates refused because the pivot was too small or the update file too long.
    pub rejected_updates: usize,
}

/// Maintains the inverse of the basis matrix: the columns of the constraint matrix at the
/// `included` indices, in row order.
pub(crate) trait BasisInverse: std::fmt::Debug {
    /// Rebuilds the inverse from scratch.
    fn reset(&mut self, matrix: &CsMat, included: &[usize]) -> Result<()>;

    /// Replaces the basic column of `exited_row` by `entering_column` (a column of the
    /// constraint matrix, not yet transformed). `included` already lists the new basis; it is
    /// used when the update falls back to a reset.
    fn update(
        &mut self,
        matrix: &CsMat,
        included: &[usize],
        exited_row: usize,
        entering_column: &[f64],
    ) -> Result<UpdateKind>;

    /// Solves `B·x = rhs` in place.
    fn ftran(&self, rhs: &mut [f64]);

    /// Solves `Bᵗ·x = rhs` in place.
    fn btran(&self, rhs: &mut [f64]);

    fn stats(&self) -> &BasisUpdateStats;
}

pub(crate) fn new_basis_inverse(options: &SimplexOptions, rows: usize) -> Box<dyn BasisInverse> {
    let settings = InverseSettings::from(options);
    match options.inverse {
        InverseChoice::Factorised => Box::new(FactorisedInverse::new(rows, settings)),
        InverseChoice::ProductForm => Box::new(ProductFormInverse::new(rows, settings)),
    }
}

#[derive(Clone, Copy, Debug)]
struct InverseSettings {
    singular_tolerance: f64,
    drop_tolerance: f64,
    update_pivot_threshold: f64,
    update_relative_threshold: f64,
    refactor_frequency: usize,
}

impl From<&SimplexOptions> for InverseSettings {
    fn from(options: &SimplexOptions) -> Self {
        Self {
            singular_tolerance: options.pivot_tolerance,
            drop_tolerance: options.drop_tolerance,
            update_pivot_threshold: options.update_pivot_threshold,
            update_relative_threshold: options.update_relative_threshold,
            refactor_frequency: options.refactor_frequency.max(1),
        }
    }
}

impl InverseSettings {
    fn is_safe_pivot(&self, column: &[f64], row: usize) -> bool {
        let pivot = column[row].abs();
        pivot > self.update_pivot_threshold
            && pivot >= self.update_relative_threshold * max_abs(column)
    }
}

/// Elementary factor: the identity with column `pivot` replaced so that it maps the
/// transformed entering column onto the `pivot` unit vector.
#[derive(Clone, Debug)]
struct EtaFactor {
    pivot: usize,
    pivot_value: f64,
    /// Entries of the transformed column off the pivot.
    others: SparseVec,
}

impl EtaFactor {
    fn apply(&self, rhs: &mut [f64]) {
        let t = rhs[self.pivot] / self.pivot_value;
        if t != 0.0 {
            self.others.scatter_scaled(-t, rhs);
        }
        rhs[self.pivot] = t;
    }

    fn apply_transp(&self, rhs: &mut [f64]) {
        rhs[self.pivot] = (rhs[self.pivot] - self.others.dot(rhs)) / self.pivot_value;
    }
}

/// Sequence of eta factors, applied in insertion order by `ftran`.
#[derive(Clone, Debug, Default)]
struct EtaFile {
    factors: Vec<EtaFactor>,
    nnz: usize,
}

impl EtaFile {
    fn len(&self) -> usize {
        self.factors.len()
    }

    fn push(&mut self, pool: &mut SparseVecPool, pivot: usize, column: &[f64], drop_tolerance: f64) {
        let mut others = pool.take();
        for (i, &val) in column.iter().enumerate() {
            if i != pivot && val.abs() > drop_tolerance {
                others.push(i, val);
            }
        }
        self.nnz += others.len() + 1;
        self.factors.push(EtaFactor {
            pivot,
            pivot_value: column[pivot],
            others,
        });
    }

    fn clear(&mut self, pool: &mut SparseVecPool) {
        for factor in self.factors.drain(..) {
            pool.give_back(factor.others);
        }
        self.nnz = 0;
    }

    fn ftran(&self, rhs: &mut [f64]) {
        for factor in &self.factors {
            factor.apply(rhs);
        }
    }

    fn btran(&self, rhs: &mut [f64]) {
        for factor in self.factors.iter().rev() {
            factor.apply_transp(rhs);
        }
    }
}

/// Dense LU factors of the basis plus a file of eta factors for the column replacements since
/// the last decomposition.
#[derive(Debug)]
pub(crate) struct FactorisedInverse {
    rows: usize,
    lu: Option<LUFactors>,
    etas: EtaFile,
    pool: SparseVecPool,
    settings: InverseSettings,
    stats: BasisUpdateStats,
}

impl FactorisedInverse {
    fn new(rows: usize, settings: InverseSettings) -> Self {
        Self {
            rows,
            lu: None,
            etas: EtaFile::default(),
            pool: SparseVecPool::new(rows),
            settings,
            stats: BasisUpdateStats::default(),
        }
    }
}

impl BasisInverse for FactorisedInverse {
    fn reset(&mut self, matrix: &CsMat, included: &[usize]) -> Result<()> {
        let m = matrix.rows();
        if included.len() != m {
            return Err(anyhow!("basis has {} columns for {} rows", included.len(), m));
        }
        let mut basis = Array2::zeros((m, m));
        for (k, &column) in included.iter().enumerate() {
            if let Some(col) = matrix.outer_view(column) {
                for (row, &val) in col.iter() {
                    basis[[row, k]] = val;
                }
            }
        }
        let lu = lu_factorise(basis, self.settings.singular_tolerance)
            .context("factorising the basis matrix")?;
        self.rows = m;
        self.pool.resize(m);
        self.etas.clear(&mut self.pool);
        self.lu = Some(lu);
        self.stats.refactorisations += 1;
        Ok(())
    }

    fn update(
        &mut self,
        matrix: &CsMat,
        included: &[usize],
        exited_row: usize,
        entering_column: &[f64],
    ) -> Result<UpdateKind> {
        let mut column = entering_column.to_vec();
        self.ftran(&mut column);

        let lu_nnz = self.lu.as_ref().map_or(0, |lu| lu.nnz());
        if self.settings.is_safe_pivot(&column, exited_row)
            && self.etas.len() < self.settings.refactor_frequency
            && self.etas.nnz < lu_nnz.max(self.rows)
        {
            self.etas
                .push(&mut self.pool, exited_row, &column, self.settings.drop_tolerance);
            self.stats.updates += 1;
            Ok(UpdateKind::Incremental)
        } else {
            trace!(
                "refactorising basis: pivot {:e}, {} etas",
                column[exited_row],
                self.etas.len()
            );
            self.stats.rejected_updates += 1;
            self.reset(matrix, included)?;
            Ok(UpdateKind::Refactorised)
        }
    }

    fn ftran(&self, rhs: &mut [f64]) {
        if let Some(lu) = &self.lu {
            lu.solve(rhs);
        }
        self.etas.ftran(rhs);
    }

    fn btran(&self, rhs: &mut [f64]) {
        self.etas.btran(rhs);
        if let Some(lu) = &self.lu {
            lu.solve_transp(rhs);
        }
    }

    fn stats(&self) -> &BasisUpdateStats {
        &self.stats
    }
}

/// The inverse as a product of eta factors only.
///
/// `reset` eliminates the basis column by column (choosing the largest remaining entry as
/// pivot), which leaves the rows permuted: basis position `k` is pivoted on row
/// `permutation[k]`. Updates are kept in a second file over basis positions.
#[derive(Debug)]
pub(crate) struct ProductFormInverse {
    rows: usize,
    elimination: EtaFile,
    permutation: Vec<usize>,
    updates: EtaFile,
    pool: SparseVecPool,
    settings: InverseSettings,
    stats: BasisUpdateStats,
}

impl ProductFormInverse {
    fn new(rows: usize, settings: InverseSettings) -> Self {
        Self {
            rows,
            elimination: EtaFile::default(),
            permutation: (0..rows).collect(),
            updates: EtaFile::default(),
            pool: SparseVecPool::new(rows),
            settings,
            stats: BasisUpdateStats::default(),
        }
    }

    #[cfg(test)]
    fn pool(&self) -> &SparseVecPool {
        &self.pool
    }
}

impl BasisInverse for ProductFormInverse {
    fn reset(&mut self, matrix: &CsMat, included: &[usize]) -> Result<()> {
        let m = matrix.rows();
        if included.len() != m {
            return Err(anyhow!("basis has {} columns for {} rows", included.len(), m));
        }
        self.rows = m;
        self.pool.resize(m);
        self.elimination.clear(&mut self.pool);
        self.updates.clear(&mut self.pool);
        self.permutation = vec![0; m];

        let mut pivoted = vec![false; m];
        let mut work = vec![0.0; m];
        for (k, &column) in included.iter().enumerate() {
            scatter_column(matrix, column, &mut work);
            self.elimination.ftran(&mut work);

            let mut pivot_row = None;
            let mut pivot_abs = self.settings.singular_tolerance;
            for (row, &val) in work.iter().enumerate() {
                if !pivoted[row] && val.abs() > pivot_abs {
                    pivot_row = Some(row);
                    pivot_abs = val.abs();
                }
            }
            let Some(row) = pivot_row else {
                return Err(anyhow!(
                    "basis matrix is singular at position {} (column {})",
                    k,
                    column
                ));
            };
            pivoted[row] = true;
            self.permutation[k] = row;
            self.elimination
                .push(&mut self.pool, row, &work, self.settings.drop_tolerance);
        }
        self.stats.refactorisations += 1;
        Ok(())
    }

    fn update(
        &mut self,
        matrix: &CsMat,
        included: &[usize],
        exited_row: usize,
        entering_column: &[f64],
    ) -> Result<UpdateKind> {
        let mut column = entering_column.to_vec();
        self.ftran(&mut column);

        if self.settings.is_safe_pivot(&column, exited_row)
            && self.updates.len() < self.settings.refactor_frequency
        {
            self.updates
                .push(&mut self.pool, exited_row, &column, self.settings.drop_tolerance);
            self.stats.updates += 1;
            Ok(UpdateKind::Incremental)
        } else {
            trace!(
                "rebuilding product form: pivot {:e}, {} updates",
                column[exited_row],
                self.updates.len()
            );
            self.stats.rejected_updates += 1;
            self.reset(matrix, included)?;
            Ok(UpdateKind::Refactorised)
        }
    }

    fn ftran(&self, rhs: &mut [f64]) {
        self.elimination.ftran(rhs);
        let permuted = self.permutation.iter().map(|&row| rhs[row]).collect::<Vec<_>>();
        rhs.copy_from_slice(&permuted);
        self.updates.ftran(rhs);
    }

    fn btran(&self, rhs: &mut [f64]) {
        self.updates.btran(rhs);
        let mut unpermuted = vec![0.0; self.rows];
        for (k, &row) in self.permutation.iter().enumerate() {
            unpermuted[row] = rhs[k];
        }
        rhs.copy_from_slice(&unpermuted);
        self.elimination.btran(rhs);
    }

    fn stats(&self) -> &BasisUpdateStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;
    use crate::optimisation_algorithms::linear_programming_helpers::{assert_slice_close, to_csc};

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn inverses(options: &SimplexOptions, rows: usize) -> Vec<Box<dyn BasisInverse>> {
        vec![
            new_basis_inverse(&options.clone().with_inverse(InverseChoice::Factorised), rows),
            new_basis_inverse(&options.clone().with_inverse(InverseChoice::ProductForm), rows),
        ]
    }

    fn multiply(matrix: &CsMat, included: &[usize], x: &[f64]) -> Vec<f64> {
        let mut result = vec![0.0; matrix.rows()];
        for (k, &column) in included.iter().enumerate() {
            for (row, &val) in matrix.outer_view(column).unwrap().iter() {
                result[row] += val * x[k];
            }
        }
        result
    }

    fn multiply_transp(matrix: &CsMat, included: &[usize], y: &[f64]) -> Vec<f64> {
        included
            .iter()
            .map(|&column| {
                matrix
                    .outer_view(column)
                    .unwrap()
                    .iter()
                    .map(|(row, &val)| val * y[row])
                    .sum()
            })
            .collect()
    }

    fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize) -> CsMat {
        let dense = (0..rows)
            .map(|r| {
                (0..cols)
                    .map(|c| {
                        if c % rows == r {
                            4.0 + rng.gen_range(0.0..1.0)
                        } else if rng.gen_range(0.0..1.0) < 0.4 {
                            rng.gen_range(-1.0..1.0)
                        } else {
                            0.0
                        }
                    })
                    .collect()
            })
            .collect::<Vec<Vec<f64>>>();
        to_csc(&dense)
    }

    #[test]
    fn reset_inverts() {
        init();
        let matrix = to_csc(&[
            vec![2.0, 0.0, 1.0, 1.0],
            vec![0.0, 3.0, 1.0, 0.0],
            vec![1.0, 0.0, 0.0, 2.0],
        ]);
        let included = [3, 0, 1];
        for mut inverse in inverses(&SimplexOptions::default(), 3) {
            inverse.reset(&matrix, &included).unwrap();
            let mut x = vec![1.0, -2.0, 0.5];
            inverse.ftran(&mut x);
            assert_slice_close(&multiply(&matrix, &included, &x), &[1.0, -2.0, 0.5]);

            let mut y = vec![0.0, 1.0, 3.0];
            inverse.btran(&mut y);
            assert_slice_close(&multiply_transp(&matrix, &included, &y), &[0.0, 1.0, 3.0]);
            assert_eq!(inverse.stats().refactorisations, 1);
        }
    }

    #[test]
    fn singular_basis() {
        let matrix = to_csc(&[vec![1.0, 2.0, 0.0], vec![2.0, 4.0, 1.0]]);
        for mut inverse in inverses(&SimplexOptions::default(), 2) {
            assert!(inverse.reset(&matrix, &[0, 1]).is_err());
            assert!(inverse.reset(&matrix, &[0, 2]).is_ok());
        }
    }

    #[test]
    fn updates_match_reset() {
        init();
        let mut rng = StdRng::seed_from_u64(42);
        let rows = 6;
        let matrix = random_matrix(&mut rng, rows, 3 * rows);
        let options = SimplexOptions::default();

        for mut inverse in inverses(&options, rows) {
            let mut included = (0..rows).collect::<Vec<_>>();
            inverse.reset(&matrix, &included).unwrap();
            let mut fresh = new_basis_inverse(&options, rows);

            for step in 0..12 {
                let exited_row = step % rows;
                let entering = rows + (step * 5) % (2 * rows);
                if included.contains(&entering) {
                    continue;
                }
                let mut column = vec![0.0; rows];
                scatter_column(&matrix, entering, &mut column);
                let mut transformed = column.clone();
                inverse.ftran(&mut transformed);
                if transformed[exited_row].abs() < 1e-3 {
                    continue;
                }
                included[exited_row] = entering;
                inverse
                    .update(&matrix, &included, exited_row, &column)
                    .unwrap();

                fresh.reset(&matrix, &included).unwrap();
                for _ in 0..3 {
                    let rhs = (0..rows).map(|_| rng.gen_range(-5.0..5.0)).collect::<Vec<_>>();
                    let (mut a, mut b) = (rhs.clone(), rhs.clone());
                    inverse.ftran(&mut a);
                    fresh.ftran(&mut b);
                    assert_slice_close(&a, &b);
                    let (mut a, mut b) = (rhs.clone(), rhs);
                    inverse.btran(&mut a);
                    fresh.btran(&mut b);
                    assert_slice_close(&a, &b);
                }
            }
            assert!(inverse.stats().updates > 0);
        }
    }

    #[test]
    fn small_pivot_refactorises() {
        init();
        let matrix = to_csc(&[vec![1.0, 0.0, 5e-8, 1e-6], vec![0.0, 1.0, 1.0, 1.0]]);
        for mut inverse in inverses(&SimplexOptions::default(), 2) {
            inverse.reset(&matrix, &[0, 1]).unwrap();
            let kind = inverse
                .update(&matrix, &[3, 1], 0, &[1e-6, 1.0])
                .unwrap();
            assert_eq!(kind, UpdateKind::Incremental);

            inverse.reset(&matrix, &[0, 1]).unwrap();
            let kind = inverse.update(&matrix, &[2, 1], 0, &[5e-8, 1.0]).unwrap();
            assert_eq!(kind, UpdateKind::Refactorised);
            assert_eq!(inverse.stats().rejected_updates, 1);

            let mut x = vec![1.0, 1.0];
            inverse.ftran(&mut x);
            assert_slice_close(&multiply(&matrix, &[2, 1], &x), &[1.0, 1.0]);
        }
    }

    #[test]
    fn refactor_frequency_bounds_chain() {
        let matrix = to_csc(&[vec![1.0, 0.0, 2.0, 1.0], vec![0.0, 1.0, 1.0, 3.0]]);
        let mut options = SimplexOptions::default();
        options.refactor_frequency = 1;
        for mut inverse in inverses(&options, 2) {
            inverse.reset(&matrix, &[0, 1]).unwrap();
            let kind = inverse.update(&matrix, &[2, 1], 0, &[2.0, 1.0]).unwrap();
            assert_eq!(kind, UpdateKind::Incremental);
            let kind = inverse.update(&matrix, &[2, 3], 1, &[1.0, 3.0]).unwrap();
            assert_eq!(kind, UpdateKind::Refactorised);
            assert_eq!(inverse.stats().refactorisations, 2);

            let mut x = vec![3.0, 4.0];
            inverse.ftran(&mut x);
            assert_slice_close(&multiply(&matrix, &[2, 3], &x), &[3.0, 4.0]);
        }
    }

    #[test]
    fn product_form_recycles_factors() {
        let matrix = to_csc(&[vec![2.0, 1.0, 0.0], vec![1.0, 3.0, 1.0]]);
        let mut inverse = ProductFormInverse::new(2, InverseSettings::from(&SimplexOptions::default()));
        inverse.reset(&matrix, &[0, 1]).unwrap();
        inverse.reset(&matrix, &[0, 2]).unwrap();
        assert_eq!(inverse.pool().recycled(), 2);
        assert_eq!(inverse.pool().available(), 0);
    }
}
