use anyhow::{Result, anyhow};

use crate::optimisation_algorithms::{
    linear_programming_sparse::SparseVec,
    simplex_options::SimplexOptions,
    simplex_result::Error,
    simplex_store::{SimplexStore, StoreCore},
    simplex_structure::ExpandedForm,
};

/// Working state as a tableau of sorted sparse rows. Basic values and reduced costs are dense.
#[derive(Debug)]
pub struct SparseTableauStore {
    core: StoreCore,
    rows: Vec<SparseVec>,
    values: Vec<f64>,
    reduced: Vec<f64>,
    scratch: SparseVec,
}

impl SparseTableauStore {
    pub(crate) fn build(form: &ExpandedForm, options: &SimplexOptions) -> Result<Self, Error> {
        let core = StoreCore::new(form, options)?;
        let n = core.columns();
        let mut store = Self {
            core,
            rows: vec![],
            values: vec![],
            reduced: vec![0.0; n],
            scratch: SparseVec::new(),
        };
        store
            .rebuild()
            .map_err(|err| Error::Numerical(format!("{:#}", err)))?;
        Ok(store)
    }

    /// Scales `row` to a unit entry at `column` and removes `column` from every other row.
    fn eliminate(&mut self, row: usize, column: usize) {
        let mut pivot_row = std::mem::take(&mut self.rows[row]);
        let pivot = pivot_row.get(column);
        pivot_row.scale(1.0 / pivot);
        pivot_row.set_existing(column, 1.0);
        self.values[row] /= pivot;

        for i in 0..self.rows.len() {
            if i == row {
                continue;
            }
            let factor = self.rows[i].get(column);
            if factor == 0.0 {
                continue;
            }
            self.rows[i].merge_scaled(
                factor,
                &pivot_row,
                self.core.drop_tolerance,
                column,
                &mut self.scratch,
            );
            std::mem::swap(&mut self.rows[i], &mut self.scratch);
            self.values[i] -= factor * self.values[row];
        }
        self.rows[row] = pivot_row;
    }
}

impl SimplexStore for SparseTableauStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StoreCore {
        &mut self.core
    }

    fn name(&self) -> &'static str {
        "sparse tableau"
    }

    fn basic_value(&self, row: usize) -> f64 {
        self.values[row]
    }

    fn reduced_cost(&self, column: usize) -> f64 {
        self.reduced[column]
    }

    fn calculate_primal_direction(&mut self, column: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row.get(column)).collect()
    }

    fn calculate_dual_direction(&mut self, row: usize) -> Vec<f64> {
        self.rows[row].to_dense(self.core.columns())
    }

    fn exchange(&mut self, row: usize, column: usize) -> Result<()> {
        let pivot = self.rows[row].get(column);
        if pivot.abs() <= self.core.drop_tolerance {
            return Err(anyhow!(
                "pivot element {} at row {} and column {} is too small",
                pivot,
                row,
                column
            ));
        }
        self.eliminate(row, column);

        let d = self.reduced[column];
        if d != 0.0 {
            self.rows[row].scatter_scaled(-d, &mut self.reduced);
        }
        self.reduced[column] = 0.0;
        self.core.exchange_partition(row, column);
        Ok(())
    }

    fn apply_shift(&mut self, column: usize, delta: f64) {
        for (row, value) in self.rows.iter().zip(self.values.iter_mut()) {
            let alpha = row.get(column);
            if alpha != 0.0 {
                *value -= delta * alpha;
            }
        }
    }

    fn recompute_reduced_costs(&mut self) {
        self.reduced.clear();
        self.reduced.extend_from_slice(&self.core.objective);
        for (row, &column) in self.rows.iter().zip(self.core.included.iter()) {
            let cb = self.core.objective[column];
            if cb != 0.0 {
                row.scatter_scaled(-cb, &mut self.reduced);
            }
        }
        for &column in &self.core.included {
            self.reduced[column] = 0.0;
        }
    }

    fn rebuild(&mut self) -> Result<()> {
        let m = self.core.rows();
        let csr = self.core.matrix.to_csr();
        self.rows = csr
            .outer_iterator()
            .map(|row| {
                let mut vec = SparseVec::with_capacity(row.nnz());
                for (column, &val) in row.iter() {
                    vec.push(column, val);
                }
                vec
            })
            .collect();
        self.values = self.core.rhs.clone();
        self.reduced.clear();
        self.reduced.extend_from_slice(&self.core.objective);

        let mut assigned = vec![false; m];
        let mut row_of = Vec::with_capacity(m);
        for k in 0..m {
            let column = self.core.included[k];
            let mut best: Option<(usize, f64)> = None;
            for i in (0..m).filter(|&i| !assigned[i]) {
                let val = self.rows[i].get(column).abs();
                if best.is_none_or(|(_, best_val)| val > best_val) {
                    best = Some((i, val));
                }
            }
            let Some((pivot_row, pivot_abs)) = best else {
                return Err(anyhow!("no row left for basic column {}", column));
            };
            if pivot_abs <= self.core.pivot_tolerance {
                return Err(anyhow!("basis is singular at column {}", column));
            }
            self.eliminate(pivot_row, column);
            // the objective row is eliminated along with the rows
            let d = self.reduced[column];
            if d != 0.0 {
                self.rows[pivot_row].scatter_scaled(-d, &mut self.reduced);
            }
            self.reduced[column] = 0.0;
            assigned[pivot_row] = true;
            row_of.push(pivot_row);
        }

        let mut rows = std::mem::take(&mut self.rows);
        self.rows = row_of.iter().map(|&row| std::mem::take(&mut rows[row])).collect();
        self.values = row_of.iter().map(|&row| self.values[row]).collect();
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
    fn fill_in_is_dropped() {
        let options = SimplexOptions::default()
            .with_representation(Representation::Tableau)
            .with_tableau(TableauChoice::Sparse);
        let mut store = build_store(&small_form(), &options).unwrap();
        assert_eq!(store.name(), "sparse tableau");

        // x1 on row 1 then x2 on row 2 cancels x1 from every other row
        store.exchange(1, 0).unwrap();
        store.exchange(2, 1).unwrap();
        assert_slice_close(&store.calculate_primal_direction(0), &[0.0, 1.0, 0.0]);
        assert_slice_close(&store.calculate_primal_direction(1), &[0.0, 0.0, 1.0]);
        assert_slice_close(
            &store.calculate_dual_direction(2),
            &[0.0, 1.0, 0.5, 0.0, -0.5, 0.5],
        );
    }

    #[test]
    fn objective_row_follows_the_basis_build() {
        let options = SimplexOptions::default()
            .with_representation(Representation::Tableau)
            .with_tableau(TableauChoice::Sparse);
        let mut store = build_store(&small_form(), &options).unwrap();
        let reduced = |store: &dyn SimplexStore| {
            (0..store.num_columns())
                .map(|column| store.reduced_cost(column))
                .collect::<Vec<_>>()
        };
        assert_slice_close(&reduced(store.as_ref()), &[-1.0, -1.0, 0.0, 0.0, 0.0, 0.0]);

        // y = (0, 0, -1) for the basis {s0, x1, x2}
        store.reset_basis(&[3, 0, 1]).unwrap();
        let built = reduced(store.as_ref());
        assert_slice_close(&built, &[0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        store.recompute_reduced_costs();
        assert_slice_close(&reduced(store.as_ref()), &built);
    }
}
