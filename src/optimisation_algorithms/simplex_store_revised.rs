use anyhow::{Result, anyhow};
use log::trace;

use crate::optimisation_algorithms::{
    linear_programming_helpers::scatter_column,
    simplex_basis_inverse::{BasisInverse, BasisUpdateStats, UpdateKind, new_basis_inverse},
    simplex_options::SimplexOptions,
    simplex_result::Error,
    simplex_store::{SimplexStore, StoreCore},
    simplex_structure::{CsMat, ExpandedForm},
};

/// Working state of the revised simplex method: the constraint matrix stays untouched and
/// directions are computed through a factored basis inverse.
///
/// Basic values and reduced costs are updated per pivot and recomputed whenever the inverse
/// is rebuilt.
#[derive(Debug)]
pub struct RevisedStore {
    core: StoreCore,
    /// Row-major copy of the constraint matrix, for row computations.
    by_rows: CsMat,
    inverse: Box<dyn BasisInverse>,
    values: Vec<f64>,
    reduced: Vec<f64>,
    last_column: Option<(usize, Vec<f64>)>,
    last_row: Option<(usize, Vec<f64>)>,
}

impl RevisedStore {
    pub(crate) fn build(form: &ExpandedForm, options: &SimplexOptions) -> Result<Self, Error> {
        let core = StoreCore::new(form, options)?;
        let by_rows = core.matrix.to_csr();
        let inverse = new_basis_inverse(options, core.rows());
        let n = core.columns();
        let mut store = Self {
            core,
            by_rows,
            inverse,
            values: vec![],
            reduced: vec![0.0; n],
            last_column: None,
            last_row: None,
        };
        store
            .rebuild()
            .map_err(|err| Error::Numerical(format!("{:#}", err)))?;
        Ok(store)
    }

    pub fn basis_update_stats(&self) -> &BasisUpdateStats {
        self.inverse.stats()
    }

    fn recompute_values(&mut self) {
        self.values.clear();
        self.values.extend_from_slice(&self.core.rhs);
        self.inverse.ftran(&mut self.values);
    }

    fn invalidate(&mut self) {
        self.last_column = None;
        self.last_row = None;
    }
}

impl SimplexStore for RevisedStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StoreCore {
        &mut self.core
    }

    fn name(&self) -> &'static str {
        "revised"
    }

    fn basic_value(&self, row: usize) -> f64 {
        self.values[row]
    }

    fn reduced_cost(&self, column: usize) -> f64 {
        self.reduced[column]
    }

    fn calculate_primal_direction(&mut self, column: usize) -> Vec<f64> {
        if let Some((cached, direction)) = &self.last_column {
            if *cached == column {
                return direction.clone();
            }
        }
        let mut direction = vec![0.0; self.core.rows()];
        scatter_column(&self.core.matrix, column, &mut direction);
        self.inverse.ftran(&mut direction);
        self.last_column = Some((column, direction.clone()));
        direction
    }

    fn calculate_dual_direction(&mut self, row: usize) -> Vec<f64> {
        if let Some((cached, direction)) = &self.last_row {
            if *cached == row {
                return direction.clone();
            }
        }
        let mut rho = vec![0.0; self.core.rows()];
        rho[row] = 1.0;
        self.inverse.btran(&mut rho);

        let mut direction = vec![0.0; self.core.columns()];
        for (i, row_view) in self.by_rows.outer_iterator().enumerate() {
            let factor = rho[i];
            if factor.abs() <= self.core.drop_tolerance {
                continue;
            }
            for (column, &val) in row_view.iter() {
                direction[column] += factor * val;
            }
        }
        for (k, &column) in self.core.included.iter().enumerate() {
            direction[column] = if k == row { 1.0 } else { 0.0 };
        }
        self.last_row = Some((row, direction.clone()));
        direction
    }

    fn exchange(&mut self, row: usize, column: usize) -> Result<()> {
        let alpha_q = self.calculate_primal_direction(column);
        let alpha_r = self.calculate_dual_direction(row);
        let pivot = alpha_q[row];
        if pivot.abs() <= self.core.drop_tolerance {
            return Err(anyhow!(
                "pivot element {} at row {} and column {} is too small",
                pivot,
                row,
                column
            ));
        }

        let theta = self.values[row] / pivot;
        for (value, &alpha) in self.values.iter_mut().zip(alpha_q.iter()) {
            *value -= theta * alpha;
        }
        self.values[row] = theta;

        let ratio = self.reduced[column] / pivot;
        if ratio != 0.0 {
            for (d, &alpha) in self.reduced.iter_mut().zip(alpha_r.iter()) {
                *d -= ratio * alpha;
            }
        }
        self.reduced[column] = 0.0;

        self.core.exchange_partition(row, column);
        self.invalidate();

        let mut entering = vec![0.0; self.core.rows()];
        scatter_column(&self.core.matrix, column, &mut entering);
        let kind = self
            .inverse
            .update(&self.core.matrix, &self.core.included, row, &entering)?;
        if kind == UpdateKind::Refactorised {
            trace!("basis refactorised, recomputing values and reduced costs");
            self.recompute_values();
            self.recompute_reduced_costs();
        }
        Ok(())
    }

    fn apply_shift(&mut self, column: usize, delta: f64) {
        let direction = self.calculate_primal_direction(column);
        for (value, alpha) in self.values.iter_mut().zip(direction) {
            *value -= delta * alpha;
        }
    }

    fn recompute_reduced_costs(&mut self) {
        let mut y = self.core.basic_objective();
        self.inverse.btran(&mut y);
        for (column, col) in self.core.matrix.outer_iterator().enumerate() {
            let mut d = self.core.objective[column];
            for (row, &val) in col.iter() {
                d -= y[row] * val;
            }
            self.reduced[column] = d;
        }
        for &column in &self.core.included {
            self.reduced[column] = 0.0;
        }
    }

    fn rebuild(&mut self) -> Result<()> {
        self.invalidate();
        self.inverse.reset(&self.core.matrix, &self.core.included)?;
        self.recompute_values();
        self.recompute_reduced_costs();
        Ok(())
    }
}
