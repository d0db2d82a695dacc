use anyhow::{Result, anyhow};
use ndarray::{Array2, s};

use crate::optimisation_algorithms::{
    simplex_options::SimplexOptions,
    simplex_result::Error,
    simplex_store::{SimplexStore, StoreCore},
    simplex_structure::ExpandedForm,
};

/// Working state as a full dense tableau.
///
/// The table has one row per constraint plus a final row of reduced costs, and one column per
/// problem column plus a final column of basic values.
#[derive(Debug)]
pub struct DenseTableauStore {
    core: StoreCore,
    table: Array2<f64>,
}

impl DenseTableauStore {
    pub(crate) fn build(form: &ExpandedForm, options: &SimplexOptions) -> Result<Self, Error> {
        let core = StoreCore::new(form, options)?;
        let (m, n) = (core.rows(), core.columns());
        let mut store = Self {
            core,
            table: Array2::zeros((m + 1, n + 1)),
        };
        store
            .rebuild()
            .map_err(|err| Error::Numerical(format!("{:#}", err)))?;
        Ok(store)
    }

    fn eliminate(&mut self, row: usize, column: usize) {
        let pivot = self.table[[row, column]];
        self.table.row_mut(row).mapv_inplace(|v| v / pivot);
        self.table[[row, column]] = 1.0;
        let pivot_row = self.table.row(row).to_owned();
        for i in 0..self.table.nrows() {
            if i == row {
                continue;
            }
            let factor = self.table[[i, column]];
            if factor != 0.0 {
                self.table.row_mut(i).scaled_add(-factor, &pivot_row);
                self.table[[i, column]] = 0.0;
            }
        }
    }
}

impl SimplexStore for DenseTableauStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StoreCore {
        &mut self.core
    }

    fn name(&self) -> &'static str {
        "dense tableau"
    }

    fn basic_value(&self, row: usize) -> f64 {
        self.table[[row, self.core.columns()]]
    }

    fn reduced_cost(&self, column: usize) -> f64 {
        self.table[[self.core.rows(), column]]
    }

    fn calculate_primal_direction(&mut self, column: usize) -> Vec<f64> {
        let m = self.core.rows();
        self.table.slice(s![..m, column]).to_vec()
    }

    fn calculate_dual_direction(&mut self, row: usize) -> Vec<f64> {
        let n = self.core.columns();
        self.table.slice(s![row, ..n]).to_vec()
    }

    fn exchange(&mut self, row: usize, column: usize) -> Result<()> {
        let pivot = self.table[[row, column]];
        if pivot.abs() <= self.core.drop_tolerance {
            return Err(anyhow!(
                "pivot element {} at row {} and column {} is too small",
                pivot,
                row,
                column
            ));
        }
        self.eliminate(row, column);
        self.core.exchange_partition(row, column);
        Ok(())
    }

    fn apply_shift(&mut self, column: usize, delta: f64) {
        let (m, n) = (self.core.rows(), self.core.columns());
        for i in 0..m {
            let alpha = self.table[[i, column]];
            if alpha != 0.0 {
                self.table[[i, n]] -= delta * alpha;
            }
        }
    }

    fn recompute_reduced_costs(&mut self) {
        let (m, n) = (self.core.rows(), self.core.columns());
        let basic_objective = self.core.basic_objective();
        for j in 0..n {
            let mut d = self.core.objective[j];
            for (i, &cb) in basic_objective.iter().enumerate() {
                if cb != 0.0 {
                    d -= cb * self.table[[i, j]];
                }
            }
            self.table[[m, j]] = d;
        }
        for &column in &self.core.included {
            self.table[[m, column]] = 0.0;
        }
    }

    fn rebuild(&mut self) -> Result<()> {
        let (m, n) = (self.core.rows(), self.core.columns());
        let mut table = Array2::zeros((m + 1, n + 1));
        for (column, col) in self.core.matrix.outer_iterator().enumerate() {
            for (row, &val) in col.iter() {
                table[[row, column]] = val;
            }
        }
        for (row, &rhs) in self.core.rhs.iter().enumerate() {
            table[[row, n]] = rhs;
        }
        self.table = table;

        // Gauss-Jordan onto the basis, choosing the largest remaining entry of each basic column
        let mut assigned = vec![false; m];
        let mut row_of = Vec::with_capacity(m);
        for k in 0..m {
            let column = self.core.included[k];
            let pivot_row = (0..m)
                .filter(|&i| !assigned[i])
                .max_by(|&a, &b| {
                    self.table[[a, column]]
                        .abs()
                        .total_cmp(&self.table[[b, column]].abs())
                        .then(b.cmp(&a))
                })
                .ok_or_else(|| anyhow!("no row left for basic column {}", column))?;
            if self.table[[pivot_row, column]].abs() <= self.core.pivot_tolerance {
                return Err(anyhow!("basis is singular at column {}", column));
            }
            self.eliminate(pivot_row, column);
            assigned[pivot_row] = true;
            row_of.push(pivot_row);
        }

        // basic column k must sit on row k
        let mut ordered = Array2::zeros((m + 1, n + 1));
        for (k, &row) in row_of.iter().enumerate() {
            ordered.row_mut(k).assign(&self.table.row(row));
        }
        self.table = ordered;
        self.recompute_reduced_costs();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimisation_algorithms::{
        linear_programming_helpers::assert_slice_close,
        simplex_options::{Representation, TableauChoice},
        simplex_store::{build_store, tests::small_form},
    };

    #[test]
    fn elimination_keeps_identity_on_basis() {
        let options = SimplexOptions::default()
            .with_representation(Representation::Tableau)
            .with_tableau(TableauChoice::Dense);
        let mut store = build_store(&small_form(), &options).unwrap();
        assert_eq!(store.name(), "dense tableau");
        store.reset_basis(&[1, 0, 3]).unwrap();
        for (row, &column) in store.included().to_vec().iter().enumerate() {
            let mut unit = vec![0.0; 3];
            unit[row] = 1.0;
            assert_slice_close(&store.calculate_primal_direction(column), &unit);
        }
        assert!(store.reset_basis(&[0, 3, 2]).is_ok());
        assert!(store.reset_basis(&[5, 0, 1]).is_ok());
    }

    #[test]
    fn singular_basis_is_rejected() {
        let options = SimplexOptions::default()
            .with_representation(Representation::Tableau)
            .with_tableau(TableauChoice::Dense);
        let mut store = build_store(&small_form(), &options).unwrap();
        assert!(store.reset_basis(&[0, 4, 4]).is_err());
        // no column of this basis touches the last row
        assert!(store.reset_basis(&[2, 3, 4]).is_err());
    }
}
