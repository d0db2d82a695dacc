use log::debug;
use ndarray::{Array1, Array2, ArrayView1, s};

use crate::optimisation_algorithms::{
    gomory_cuts::{BoundedTerm, Cut, bounded_gomory_mixed_integer_cut},
    simplex_options::SimplexOptions,
    simplex_result::{Error, SolveResult, SolveState},
    simplex_solvers::Solver,
    simplex_store::SimplexStore,
    simplex_structure::{StandardForm, StructureDescriptor},
};

/// What a tableau column stands for.
#[derive(Clone, Copy, Debug, PartialEq)]
enum SimplexVar {
    /// Distance of a solver-space variable from its lower bound.
    Real(usize),
    /// Distance of a solver-space variable from its upper bound.
    UpperSlack(usize),
    Artificial,
}

enum PhaseEnd {
    Optimal,
    Unbounded,
    Limit,
}

/// Textbook two-phase simplex on a dense tableau, kept as an independent reference for the
/// pivot engine.
///
/// Every variable is substituted by its distance from its (finite) lower bound; finite upper
/// bounds become extra rows and every row gets an artificial. Pricing is Dantzig's rule,
/// switching to Bland's rule after a run of degenerate pivots.
#[derive(Debug)]
pub struct LegacySimplex {
    structure: StructureDescriptor,
    costs: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    vars: Vec<SimplexVar>,
    /// +1 or -1 per tableau row, for rows negated to get a non-negative right-hand side.
    row_sign: Vec<f64>,
    initial: Array2<f64>,
    /// Row 0 holds the reduced costs, the last column the right-hand side.
    table: Array2<f64>,
    base: Vec<usize>,
    options: SimplexOptions,
    iterations: usize,
    degenerate_run: usize,
}

impl LegacySimplex {
    pub fn new(form: &StandardForm, options: &SimplexOptions) -> Result<Self, Error> {
        let structure = form.structure().clone();
        let v = structure.variables();
        let m = structure.constraints();
        let (lower, upper) = (form.lower().to_vec(), form.upper().to_vec());
        for column in 0..v {
            if !(lower[column] <= upper[column]) {
                return Err(Error::InvalidBounds {
                    column,
                    lower: lower[column],
                    upper: upper[column],
                });
            }
            if !lower[column].is_finite() {
                return Err(Error::Unsupported(format!(
                    "the legacy simplex needs a finite lower bound on column {}",
                    column
                )));
            }
        }

        let bounded = (0..v).filter(|&j| upper[j].is_finite()).collect::<Vec<_>>();
        let rows = m + bounded.len();
        let mut vars = (0..v).map(SimplexVar::Real).collect::<Vec<_>>();
        vars.extend(bounded.iter().map(|&j| SimplexVar::UpperSlack(j)));
        vars.extend((0..rows).map(|_| SimplexVar::Artificial));
        let columns = vars.len();

        let matrix = form.expand()?.matrix;
        let mut table = Array2::zeros((rows + 1, columns + 1));
        for (i, &b) in form.rhs().iter().enumerate() {
            table[[i + 1, columns]] = b;
        }
        for (column, col) in matrix.outer_iterator().enumerate().take(v) {
            for (row, &val) in col.iter() {
                table[[row + 1, column]] = val;
                table[[row + 1, columns]] -= val * lower[column];
            }
        }
        for (r, &j) in bounded.iter().enumerate() {
            let row = m + r + 1;
            table[[row, j]] = 1.0;
            table[[row, v + r]] = 1.0;
            table[[row, columns]] = upper[j] - lower[j];
        }

        let mut row_sign = vec![1.0; rows];
        for i in 0..rows {
            if table[[i + 1, columns]] < 0.0 {
                table.row_mut(i + 1).mapv_inplace(|x| -x);
                row_sign[i] = -1.0;
            }
            table[[i + 1, columns - rows + i]] = 1.0;
        }

        let base = (columns - rows..columns).collect();
        Ok(Self {
            structure,
            costs: form.objective().to_vec(),
            lower,
            upper,
            vars,
            row_sign,
            table: table.clone(),
            initial: table,
            base,
            options: options.clone(),
            iterations: 0,
            degenerate_run: 0,
        })
    }

    fn rows(&self) -> usize {
        self.table.nrows() - 1
    }

    fn rhs_column(&self) -> usize {
        self.table.ncols() - 1
    }

    fn first_artificial(&self) -> usize {
        self.rhs_column() - self.rows()
    }

    fn cost(&self, column: usize) -> f64 {
        match self.vars[column] {
            SimplexVar::Real(j) => self.costs[j],
            _ => 0.0,
        }
    }

    /// Row 0 from the costs `c`: `d_j = c_j - Σ c_B·T_ij`, and `-z` in the last column.
    fn price_out(&mut self, c: &[f64]) {
        let rhs = self.rhs_column();
        let mut objective = Array1::zeros(rhs + 1);
        objective.slice_mut(s![..rhs]).assign(&ArrayView1::from(c));
        for (i, &basic) in self.base.iter().enumerate() {
            let cb = c[basic];
            if cb != 0.0 {
                objective.scaled_add(-cb, &self.table.row(i + 1));
            }
        }
        for &basic in &self.base {
            objective[basic] = 0.0;
        }
        self.table.row_mut(0).assign(&objective);
    }

    fn entering(&self, allowed: usize) -> Option<usize> {
        let tolerance = self.options.optimality_tolerance;
        let row = self.table.slice(s![0, ..allowed]);
        if self.degenerate_run >= self.options.bland_after {
            return row.iter().position(|&d| d < -tolerance);
        }
        let mut entering = None;
        let mut min = -tolerance;
        for (j, &d) in row.iter().enumerate() {
            if d < min {
                min = d;
                entering = Some(j);
            }
        }
        entering
    }

    fn leaving(&self, entering: usize) -> Option<usize> {
        let rhs = self.rhs_column();
        let tie = self.options.tie_break_tolerance;
        let mut leaving: Option<(usize, f64, f64)> = None;
        for i in 1..=self.rows() {
            let alpha = self.table[[i, entering]];
            if alpha <= self.options.pivot_tolerance {
                continue;
            }
            let ratio = self.table[[i, rhs]].max(0.0) / alpha;
            leaving = match leaving {
                Some((row, best, best_alpha))
                    if best < ratio - tie
                        || ((best - ratio).abs() <= tie
                            && (best_alpha > alpha
                                || (best_alpha == alpha
                                    && self.base[row - 1] < self.base[i - 1]))) =>
                {
                    Some((row, best, best_alpha))
                }
                _ => Some((i, ratio, alpha)),
            };
        }
        leaving.map(|(row, _, _)| row)
    }

    fn step(&mut self, row: usize, column: usize) {
        let pivot = self.table[[row, column]];
        self.table.row_mut(row).mapv_inplace(|x| x / pivot);
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
        self.base[row - 1] = column;
    }

    fn run_phase(&mut self, allowed: usize) -> PhaseEnd {
        let rhs = self.rhs_column();
        loop {
            let Some(entering) = self.entering(allowed) else {
                return PhaseEnd::Optimal;
            };
            if self.iterations >= self.options.iteration_limit {
                return PhaseEnd::Limit;
            }
            let Some(leaving) = self.leaving(entering) else {
                return PhaseEnd::Unbounded;
            };
            if self.table[[leaving, rhs]].abs() <= self.options.feasibility_tolerance {
                self.degenerate_run += 1;
            } else {
                self.degenerate_run = 0;
            }
            self.step(leaving, entering);
            self.iterations += 1;
        }
    }

    /// Pivots basic artificials (all at zero after phase 1) out on any non-artificial column.
    /// Rows without such a column are redundant and keep their artificial.
    fn drive_out_artificials(&mut self) {
        let first_artificial = self.first_artificial();
        for row in 1..=self.rows() {
            if self.base[row - 1] < first_artificial {
                continue;
            }
            let replacement = (0..first_artificial).find(|&j| {
                !self.base.contains(&j) && self.table[[row, j]].abs() > self.options.pivot_tolerance
            });
            if let Some(column) = replacement {
                self.step(row, column);
            } else {
                debug!("row {} is redundant", row - 1);
            }
        }
    }

    /// Value of each tableau column.
    fn column_values(&self) -> Vec<f64> {
        let rhs = self.rhs_column();
        let mut values = vec![0.0; rhs];
        for (i, &basic) in self.base.iter().enumerate() {
            values[basic] = self.table[[i + 1, rhs]];
        }
        values
    }

    fn result(&self, state: SolveState) -> SolveResult {
        let values = self.column_values();
        let solution = (0..self.structure.variables())
            .map(|j| self.lower[j] + values[j])
            .collect::<Vec<_>>();
        let value = solution
            .iter()
            .zip(self.costs.iter())
            .map(|(x, c)| x * c)
            .sum();
        let first_artificial = self.first_artificial();
        let duals = (0..self.structure.constraints())
            .map(|i| {
                let dual = -self.table[[0, first_artificial + i]] * self.row_sign[i];
                if self.structure.is_negated(i) {
                    -dual
                } else {
                    dual
                }
            })
            .collect();
        SolveResult {
            state,
            value,
            solution,
            duals,
            iterations: self.iterations,
        }
    }
}

impl Solver for LegacySimplex {
    fn solve(&mut self) -> Result<SolveResult, Error> {
        self.table = self.initial.clone();
        self.base = (self.first_artificial()..self.rhs_column()).collect();
        self.iterations = 0;
        self.degenerate_run = 0;
        let rhs = self.rhs_column();
        let first_artificial = self.first_artificial();

        let phase_one = (0..rhs)
            .map(|j| if j >= first_artificial { 1.0 } else { 0.0 })
            .collect::<Vec<_>>();
        self.price_out(&phase_one);
        match self.run_phase(rhs) {
            PhaseEnd::Optimal => {}
            PhaseEnd::Limit => return Ok(self.result(SolveState::Unexplored)),
            PhaseEnd::Unbounded => return Ok(self.result(SolveState::Failed)),
        }
        let infeasibility = -self.table[[0, rhs]];
        debug!(
            "legacy phase 1: infeasibility {} after {} iterations",
            infeasibility, self.iterations
        );
        if infeasibility > self.options.feasibility_tolerance {
            return Ok(self.result(SolveState::Infeasible));
        }

        self.drive_out_artificials();
        let phase_two = (0..rhs).map(|j| self.cost(j)).collect::<Vec<_>>();
        self.price_out(&phase_two);
        self.degenerate_run = 0;
        let state = match self.run_phase(first_artificial) {
            PhaseEnd::Optimal => SolveState::Optimal,
            PhaseEnd::Unbounded => SolveState::Unbounded,
            PhaseEnd::Limit => SolveState::Feasible,
        };
        let result = self.result(state);
        debug!(
            "legacy simplex: {} after {} iterations, obj.: {}",
            result.state, result.iterations, result.value
        );
        Ok(result)
    }

    fn iterations(&self) -> usize {
        self.iterations
    }

    fn store(&self) -> Option<&dyn SimplexStore> {
        None
    }

    fn generate_cut_candidates(&mut self, threshold: f64, integer: &[bool]) -> Vec<Cut> {
        let rhs = self.rhs_column();
        let first_artificial = self.first_artificial();
        let is_integer = |j: usize| integer.get(j).copied().unwrap_or(false);
        let mut cuts = vec![];
        for (i, &basic) in self.base.iter().enumerate() {
            let SimplexVar::Real(variable) = self.vars[basic] else {
                continue;
            };
            if !is_integer(variable) {
                continue;
            }
            let terms = (0..first_artificial)
                .filter(|j| !self.base.contains(j))
                .filter(|&j| self.table[[i + 1, j]].abs() > self.options.drop_tolerance)
                .filter_map(|j| {
                    let coefficient = self.table[[i + 1, j]];
                    match self.vars[j] {
                        SimplexVar::Real(column) => Some(BoundedTerm {
                            column,
                            coefficient,
                            at_upper: false,
                            bound: self.lower[column],
                            integer: is_integer(column),
                        }),
                        SimplexVar::UpperSlack(column) => Some(BoundedTerm {
                            column,
                            coefficient,
                            at_upper: true,
                            bound: self.upper[column],
                            integer: is_integer(column),
                        }),
                        SimplexVar::Artificial => None,
                    }
                })
                .collect::<Vec<_>>();
            let value = self.lower[variable] + self.table[[i + 1, rhs]];
            if let Some(cut) = bounded_gomory_mixed_integer_cut(
                variable,
                value,
                &terms,
                threshold,
                self.options.feasibility_tolerance,
            ) {
                cuts.push(cut);
            }
        }
        cuts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimisation_algorithms::{
        linear_programming_helpers::{assert_close, assert_slice_close},
        simplex_solvers::solve,
        simplex_store::tests::init,
    };

    /// min -3x + y - 2z s.t. 2x - 2y + 3z <= 5, x + y - z <= 3, x - y + z <= 2
    fn three_rows() -> StandardForm {
        let structure = StructureDescriptor::new(3, 0, 3, 0, 0, 3).unwrap();
        let mut form = StandardForm::new(structure);
        let rows = [[2.0, -2.0, 3.0], [1.0, 1.0, -1.0], [1.0, -1.0, 1.0]];
        for (i, row) in rows.iter().enumerate() {
            for (j, &a) in row.iter().enumerate() {
                form.set_constraint_body(i, j, a).unwrap();
            }
            form.set_constraint_body(i, 3 + i, 1.0).unwrap();
        }
        form.set_constraint_rhs(0, 5.0).unwrap();
        form.set_constraint_rhs(1, 3.0).unwrap();
        form.set_constraint_rhs(2, 2.0).unwrap();
        form.set_objective(0, -3.0).unwrap();
        form.set_objective(1, 1.0).unwrap();
        form.set_objective(2, -2.0).unwrap();
        form
    }

    #[test]
    fn minimise() {
        init();
        let form = three_rows();
        let mut legacy = LegacySimplex::new(&form, &SimplexOptions::default()).unwrap();
        let result = legacy.solve().unwrap();
        assert_eq!(result.state, SolveState::Optimal);
        assert_close(result.value, -8.0);
        assert!(legacy.store().is_none());

        // the optimum is not unique, only the value is compared
        let engine = solve(&form, &SimplexOptions::default()).unwrap();
        assert_close(engine.value, result.value);
    }

    #[test]
    fn bounds_become_rows() {
        init();
        // the same problem with x in [1, 2] and z <= 0.5
        let mut form = three_rows();
        form.set_bounds(0, 1.0, 2.0).unwrap();
        form.set_bounds(2, 0.0, 0.5).unwrap();
        let mut legacy = LegacySimplex::new(&form, &SimplexOptions::default()).unwrap();
        let result = legacy.solve().unwrap();
        let engine = solve(&form, &SimplexOptions::default()).unwrap();
        assert_eq!(result.state, SolveState::Optimal);
        assert_eq!(engine.state, SolveState::Optimal);
        assert_close(result.value, engine.value);
        assert!(result.solution[0] >= 1.0 - 1e-9 && result.solution[0] <= 2.0 + 1e-9);
        assert!(result.solution[2] <= 0.5 + 1e-9);
    }

    #[test]
    fn infeasible_and_unbounded() {
        init();
        let mut form = three_rows();
        form.set_bounds(0, 4.0, 5.0).unwrap();
        let mut legacy = LegacySimplex::new(&form, &SimplexOptions::default()).unwrap();
        assert_eq!(legacy.solve().unwrap().state, SolveState::Infeasible);

        // dropping the first and last rows leaves x + y - z <= 3, so x = z grows for free
        let structure = StructureDescriptor::new(3, 0, 1, 0, 0, 1).unwrap();
        let mut form = StandardForm::new(structure);
        form.set_constraint_body(0, 0, 1.0).unwrap();
        form.set_constraint_body(0, 1, 1.0).unwrap();
        form.set_constraint_body(0, 2, -1.0).unwrap();
        form.set_constraint_body(0, 3, 1.0).unwrap();
        form.set_constraint_rhs(0, 3.0).unwrap();
        form.set_objective(0, -3.0).unwrap();
        form.set_objective(2, -2.0).unwrap();
        let mut legacy = LegacySimplex::new(&form, &SimplexOptions::default()).unwrap();
        assert_eq!(legacy.solve().unwrap().state, SolveState::Unbounded);
    }

    #[test]
    fn free_columns_are_unsupported() {
        let mut form = three_rows();
        form.set_bounds(1, f64::NEG_INFINITY, 1.0).unwrap();
        assert!(matches!(
            LegacySimplex::new(&form, &SimplexOptions::default()),
            Err(Error::Unsupported(_))
        ));
        form.set_bounds(1, 2.0, 1.0).unwrap();
        assert!(matches!(
            LegacySimplex::new(&form, &SimplexOptions::default()),
            Err(Error::InvalidBounds { column: 1, .. })
        ));
    }

    #[test]
    fn legacy_cuts_match_the_engine() {
        // max x2 s.t. 3 x1 + 2 x2 <= 6, -3 x1 + 2 x2 <= 0
        let structure = StructureDescriptor::new(2, 0, 2, 0, 0, 2).unwrap();
        let mut form = StandardForm::new(structure);
        form.set_constraint_body(0, 0, 3.0).unwrap();
        form.set_constraint_body(0, 1, 2.0).unwrap();
        form.set_constraint_body(0, 2, 1.0).unwrap();
        form.set_constraint_body(1, 0, -3.0).unwrap();
        form.set_constraint_body(1, 1, 2.0).unwrap();
        form.set_constraint_body(1, 3, 1.0).unwrap();
        form.set_constraint_rhs(0, 6.0).unwrap();
        form.set_objective(1, -1.0).unwrap();

        let mut legacy = LegacySimplex::new(&form, &SimplexOptions::default()).unwrap();
        let result = legacy.solve().unwrap();
        assert_slice_close(&result.solution, &[1.0, 1.5, 0.0, 0.0]);
        let cuts = legacy.generate_cut_candidates(1e-6, &[true, true, false, false]);
        assert_eq!(cuts.len(), 1);
        assert_eq!(cuts[0].basic_variable, 1);
        assert_eq!(cuts[0].coefficients.len(), 2);
        assert_close(cuts[0].coefficients[0].1, 0.5);
        assert_close(cuts[0].coefficients[1].1, 0.5);
        assert_close(cuts[0].rhs, 1.0);

        // integrality comes from the caller, x1 = 1 is already integral
        assert!(
            legacy
                .generate_cut_candidates(1e-6, &[true, false, false, false])
                .is_empty()
        );
    }
}
