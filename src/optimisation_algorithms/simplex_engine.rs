use anyhow::Result;
use log::{debug, trace, warn};

use crate::optimisation_algorithms::{
    simplex_options::SimplexOptions,
    simplex_result::{Error, SolveResult, SolveState},
    simplex_store::{EnterInfo, ExitInfo, IterationDescriptor, SimplexStore, VariableState},
};

/// Tied pricing candidates whose directions are compared.
const MAX_TIED_CANDIDATES: usize = 4;

/// How non-basic columns are put on their bounds before iterating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Lower bound if finite, else upper bound if finite, else free at zero.
    PrimalFirst,
    /// The bound that makes the reduced cost dual feasible, if that bound is finite.
    DualFirst,
}

/// Objective that primal iterations minimise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimalObjective {
    /// Whatever objective is set on the store.
    Current,
    /// The sum of bound violations of the basic variables, re-derived every iteration.
    SumOfInfeasibilities,
}

/// How a run of iterations ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// No pricing candidate is left.
    Completed,
    /// The primal ratio test found no limiting row.
    Unbounded,
    /// The dual ratio test found no entering column.
    Infeasible,
    IterationLimit,
    /// A pivot could not be carried out.
    Failed,
}

enum Step {
    Pivoted,
    Finished,
    Stuck,
    Limit,
}

/// Drives primal and dual simplex iterations on a store.
///
/// Pricing uses devex-style reference weights: `primal_weights` per column for primal pricing
/// and `dual_weights` per row for dual pricing. Both ratio tests are two-pass Harris tests
/// that pick the largest pivot among the near-minimal ratios.
#[derive(Debug)]
pub struct PivotEngine {
    store: Box<dyn SimplexStore>,
    options: SimplexOptions,
    primal_weights: Vec<f64>,
    dual_weights: Vec<f64>,
    iterations: usize,
}

impl PivotEngine {
    pub fn new(store: Box<dyn SimplexStore>, options: SimplexOptions) -> Self {
        let (m, n) = (store.num_rows(), store.num_columns());
        Self {
            store,
            options,
            primal_weights: vec![1.0; n],
            dual_weights: vec![1.0; m],
            iterations: 0,
        }
    }

    pub fn store(&self) -> &dyn SimplexStore {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn SimplexStore {
        self.store.as_mut()
    }

    pub fn options(&self) -> &SimplexOptions {
        &self.options
    }

    /// Pivots and bound flips committed so far, over all phases.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Places every non-basic column on a bound and resets the pricing weights.
    pub fn setup(&mut self, placement: Placement) -> Result<(), Error> {
        for column in 0..self.store.num_columns() {
            let (lower, upper) = (self.store.lower(column), self.store.upper(column));
            if !(lower <= upper) || lower == f64::INFINITY || upper == f64::NEG_INFINITY {
                let shift = self.store.shift(column);
                return Err(Error::InvalidBounds {
                    column,
                    lower: lower + shift,
                    upper: upper + shift,
                });
            }
        }

        if placement == Placement::DualFirst {
            self.use_true_objective();
        }
        let tolerance = self.options.optimality_tolerance;
        let excluded = self.store.excluded().to_vec();
        for column in excluded {
            let (lower, upper) = (self.store.lower(column), self.store.upper(column));
            let primal_first = if lower.is_finite() {
                VariableState::Lower
            } else if upper.is_finite() {
                VariableState::Upper
            } else {
                VariableState::Unbounded
            };
            let state = match placement {
                Placement::PrimalFirst => primal_first,
                Placement::DualFirst => {
                    let d = self.store.reduced_cost(column);
                    if d > tolerance && lower.is_finite() {
                        VariableState::Lower
                    } else if d < -tolerance && upper.is_finite() {
                        VariableState::Upper
                    } else {
                        primal_first
                    }
                }
            };
            match state {
                VariableState::Lower => self.store.shift_column(column, lower),
                VariableState::Upper => self.store.shift_column(column, upper),
                _ => {}
            }
            self.store.set_state(column, state);
        }

        self.primal_weights = vec![1.0; self.store.num_columns()];
        self.dual_weights = vec![1.0; self.store.num_rows()];
        debug!(
            "set up {} store ({:?}): {} rows, {} columns, primal feasible: {}, dual feasible: {}",
            self.store.name(),
            placement,
            self.store.num_rows(),
            self.store.num_columns(),
            self.is_primal_feasible(),
            self.is_dual_feasible()
        );
        Ok(())
    }

    pub fn use_true_objective(&mut self) {
        let costs = self.store.costs().to_vec();
        self.store.set_objective(&costs);
    }

    /// An objective for which the current placement is dual feasible: +1 on columns at their
    /// lower bound, -1 on columns at their upper bound, zero elsewhere.
    pub fn use_artificial_objective(&mut self) {
        let costs = (0..self.store.num_columns())
            .map(|column| match self.store.state(column) {
                VariableState::Lower => 1.0,
                VariableState::Upper => -1.0,
                _ => 0.0,
            })
            .collect::<Vec<_>>();
        self.store.set_objective(&costs);
    }

    pub fn is_primal_feasible(&self) -> bool {
        self.store
            .primal_infeasibility(self.options.feasibility_tolerance)
            .0
            == 0
    }

    pub fn is_dual_feasible(&self) -> bool {
        self.store
            .dual_infeasibility(self.options.optimality_tolerance)
            .0
            == 0
    }

    /// State to report when iterations stopped before a conclusion.
    pub fn interrupted_state(&self) -> SolveState {
        if self.is_primal_feasible() {
            SolveState::Feasible
        } else {
            SolveState::Unexplored
        }
    }

    pub fn result(&self, state: SolveState) -> SolveResult {
        SolveResult {
            state,
            value: self.store.extract_value(),
            solution: self.store.extract_solution(),
            duals: self.store.dual_values(),
            iterations: self.iterations,
        }
    }

    /// Value of the objective the store currently prices with.
    fn working_objective(&self) -> f64 {
        let core = self.store.core();
        (0..self.store.num_columns())
            .map(|column| core.objective[column] * (self.store.shift(column) + self.store.value(column)))
            .sum()
    }

    pub fn run_primal(&mut self, objective: PrimalObjective) -> PhaseOutcome {
        let phase_one = objective == PrimalObjective::SumOfInfeasibilities;
        let label = if phase_one { "primal phase 1" } else { "primal" };
        for iter in 0.. {
            if phase_one {
                if self.is_primal_feasible() {
                    debug!("{}: feasible after {} iterations", label, iter);
                    return PhaseOutcome::Completed;
                }
                let costs = self.phase_one_costs();
                self.store.set_objective(&costs);
            }
            if iter % 1000 == 0 {
                let (num_vars, infeasibility) =
                    self.store.dual_infeasibility(self.options.optimality_tolerance);
                debug!(
                    "{} iter {}: obj.: {}, non-optimal coeffs: {} ({})",
                    label,
                    iter,
                    self.working_objective(),
                    num_vars,
                    infeasibility
                );
            }

            match self.primal_iteration(phase_one) {
                Ok(Step::Pivoted) => {}
                Ok(Step::Finished) => {
                    debug!(
                        "{}: finished in {} iterations, obj.: {}",
                        label,
                        iter,
                        self.working_objective()
                    );
                    return PhaseOutcome::Completed;
                }
                Ok(Step::Stuck) => {
                    debug!("{}: unbounded ray after {} iterations", label, iter);
                    return PhaseOutcome::Unbounded;
                }
                Ok(Step::Limit) => {
                    debug!("{}: iteration limit {} reached", label, self.options.iteration_limit);
                    return PhaseOutcome::IterationLimit;
                }
                Err(err) => {
                    warn!("{} iteration {} failed: {:#}", label, iter, err);
                    return PhaseOutcome::Failed;
                }
            }
        }
        unreachable!()
    }

    pub fn run_dual(&mut self) -> PhaseOutcome {
        for iter in 0.. {
            if iter % 1000 == 0 {
                let (num_vars, infeasibility) =
                    self.store.primal_infeasibility(self.options.feasibility_tolerance);
                debug!(
                    "dual iter {}: obj.: {}, infeas. vars: {} ({})",
                    iter,
                    self.working_objective(),
                    num_vars,
                    infeasibility
                );
            }

            match self.dual_iteration() {
                Ok(Step::Pivoted) => {}
                Ok(Step::Finished) => {
                    debug!(
                        "dual: restored feasibility in {} iterations, obj.: {}",
                        iter,
                        self.working_objective()
                    );
                    return PhaseOutcome::Completed;
                }
                Ok(Step::Stuck) => {
                    debug!("dual: no entering column after {} iterations", iter);
                    return PhaseOutcome::Infeasible;
                }
                Ok(Step::Limit) => {
                    debug!("dual: iteration limit {} reached", self.options.iteration_limit);
                    return PhaseOutcome::IterationLimit;
                }
                Err(err) => {
                    warn!("dual iteration {} failed: {:#}", iter, err);
                    return PhaseOutcome::Failed;
                }
            }
        }
        unreachable!()
    }

    fn limit_reached(&self) -> bool {
        self.iterations >= self.options.iteration_limit
    }

    /// -1 on basic variables below their lower bound, +1 on those above their upper bound.
    fn phase_one_costs(&self) -> Vec<f64> {
        let tolerance = self.options.feasibility_tolerance;
        let mut costs = vec![0.0; self.store.num_columns()];
        for (row, &column) in self.store.included().iter().enumerate() {
            let value = self.store.basic_value(row);
            if value < self.store.lower(column) - tolerance {
                costs[column] = -1.0;
            } else if value > self.store.upper(column) + tolerance {
                costs[column] = 1.0;
            }
        }
        costs
    }

    fn primal_iteration(&mut self, phase_one: bool) -> Result<Step> {
        let Some((enter, direction)) = self.price_primal() else {
            return Ok(Step::Finished);
        };
        if self.limit_reached() {
            return Ok(Step::Limit);
        }
        let column = match direction {
            Some(direction) => direction,
            None => self.store.calculate_primal_direction(enter.column),
        };
        let descriptor = self.primal_ratio_test(enter, &column, phase_one);
        if descriptor.is_noop() {
            return Ok(Step::Stuck);
        }
        trace!("primal pivot: {:?}", descriptor);
        self.commit(descriptor, &column, None, !phase_one, false)?;
        Ok(Step::Pivoted)
    }

    fn dual_iteration(&mut self) -> Result<Step> {
        let Some((row, to)) = self.price_dual() else {
            return Ok(Step::Finished);
        };
        if self.limit_reached() {
            return Ok(Step::Limit);
        }
        let alpha_r = self.store.calculate_dual_direction(row);
        let Some(enter) = self.dual_ratio_test(&alpha_r, to) else {
            return Ok(Step::Stuck);
        };
        let column = self.store.calculate_primal_direction(enter.column);

        let leaving = self.store.included()[row];
        let bound = match to {
            VariableState::Upper => self.store.upper(leaving),
            _ => self.store.lower(leaving),
        };
        let step = ((self.store.basic_value(row) - bound) / column[row]).abs();
        let exit = ExitInfo {
            row,
            to,
            increasing: to == VariableState::Lower,
        };
        let descriptor = IterationDescriptor::basis_update(enter, exit, step);
        trace!("dual pivot: {:?}", descriptor);
        self.commit(descriptor, &column, Some(alpha_r), false, true)?;
        Ok(Step::Pivoted)
    }

    fn primal_candidate(&self, column: usize) -> Option<EnterInfo> {
        let tolerance = self.options.optimality_tolerance;
        let d = self.store.reduced_cost(column);
        let movable = self.store.upper(column) > self.store.lower(column);
        let (from, increasing) = match self.store.state(column) {
            VariableState::Lower if d < -tolerance && movable => (VariableState::Lower, true),
            VariableState::Upper if d > tolerance && movable => (VariableState::Upper, false),
            VariableState::Unbounded if d < -tolerance => (VariableState::Unbounded, true),
            VariableState::Unbounded if d > tolerance => (VariableState::Unbounded, false),
            _ => return None,
        };
        Some(EnterInfo {
            column,
            from,
            increasing,
        })
    }

    /// Best-scored entering column; near ties go to the column with the largest entry.
    ///
    /// Breaking a tie needs the direction of every tied column, so only the
    /// `MAX_TIED_CANDIDATES` lowest-indexed ones are compared. The direction of the chosen
    /// column is returned when it was computed.
    fn price_primal(&mut self) -> Option<(EnterInfo, Option<Vec<f64>>)> {
        let mut candidates = vec![];
        for &column in self.store.excluded() {
            if let Some(enter) = self.primal_candidate(column) {
                let d = self.store.reduced_cost(column);
                let score = if self.options.steepest_edge {
                    d * d / self.primal_weights[column]
                } else {
                    d.abs()
                };
                candidates.push((enter, score));
            }
        }
        let best = candidates.iter().map(|&(_, score)| score).fold(0.0, f64::max);
        let threshold = best * (1.0 - self.options.tie_break_tolerance);
        candidates.retain(|&(_, score)| score >= threshold);

        match candidates.len() {
            0 => None,
            1 => Some((candidates[0].0, None)),
            _ => {
                candidates.sort_by_key(|(enter, _)| enter.column);
                candidates.truncate(MAX_TIED_CANDIDATES);
                let mut chosen = None;
                let mut largest = -1.0;
                for (enter, _) in candidates {
                    let direction = self.store.calculate_primal_direction(enter.column);
                    let magnitude = direction.iter().fold(0.0, |acc: f64, v| acc.max(v.abs()));
                    if magnitude > largest {
                        largest = magnitude;
                        chosen = Some((enter, Some(direction)));
                    }
                }
                chosen
            }
        }
    }

    /// How far the basic variable of `row` may move at `rate` per unit of entering step, and
    /// the bound it stops at.
    fn row_limit(&self, row: usize, rate: f64, phase_one: bool) -> Option<(f64, VariableState)> {
        let column = self.store.included()[row];
        let value = self.store.basic_value(row);
        let (lower, upper) = (self.store.lower(column), self.store.upper(column));
        if phase_one {
            let tolerance = self.options.feasibility_tolerance;
            if value < lower - tolerance {
                return (rate > 0.0).then_some((lower - value, VariableState::Lower));
            }
            if value > upper + tolerance {
                return (rate < 0.0).then_some((value - upper, VariableState::Upper));
            }
        }
        if rate > 0.0 {
            upper
                .is_finite()
                .then_some(((upper - value).max(0.0), VariableState::Upper))
        } else {
            lower
                .is_finite()
                .then_some(((value - lower).max(0.0), VariableState::Lower))
        }
    }

    /// Two-pass Harris ratio test. Returns a no-op descriptor when nothing limits the step.
    fn primal_ratio_test(
        &self,
        enter: EnterInfo,
        column: &[f64],
        phase_one: bool,
    ) -> IterationDescriptor {
        let sigma = if enter.increasing { 1.0 } else { -1.0 };
        let range = self.store.upper(enter.column) - self.store.lower(enter.column);

        let mut max_step = range;
        let mut limits = vec![];
        for (row, &alpha) in column.iter().enumerate() {
            if alpha.abs() <= self.options.pivot_tolerance {
                continue;
            }
            let rate = -sigma * alpha;
            if let Some((slack, to)) = self.row_limit(row, rate, phase_one) {
                max_step = max_step.min((slack + self.options.ratio_tolerance) / alpha.abs());
                limits.push((row, slack / alpha.abs(), alpha.abs(), to, rate > 0.0));
            }
        }

        let mut best: Option<(usize, f64, f64, VariableState, bool)> = None;
        for limit in limits {
            if limit.1 <= max_step && best.is_none_or(|b| limit.2 > b.2) {
                best = Some(limit);
            }
        }

        match best {
            Some((row, step, _, to, increasing)) => IterationDescriptor::basis_update(
                enter,
                ExitInfo {
                    row,
                    to,
                    increasing,
                },
                step,
            ),
            None if range.is_finite() => IterationDescriptor::bound_flip(enter, range),
            None => IterationDescriptor::noop(),
        }
    }

    /// Most infeasible basic row, scaled by its weight, and the bound it has to reach.
    fn price_dual(&self) -> Option<(usize, VariableState)> {
        let tolerance = self.options.feasibility_tolerance;
        let mut best: Option<(usize, VariableState, f64)> = None;
        for (row, &column) in self.store.included().iter().enumerate() {
            let value = self.store.basic_value(row);
            let (infeasibility, to) = if value < self.store.lower(column) - tolerance {
                (self.store.lower(column) - value, VariableState::Lower)
            } else if value > self.store.upper(column) + tolerance {
                (value - self.store.upper(column), VariableState::Upper)
            } else {
                continue;
            };
            let score = if self.options.steepest_edge {
                infeasibility * infeasibility / self.dual_weights[row]
            } else {
                infeasibility
            };
            if best.is_none_or(|(_, _, best_score)| score > best_score) {
                best = Some((row, to, score));
            }
        }
        best.map(|(row, to, _)| (row, to))
    }

    /// Two-pass Harris test over the reduced costs, clamped to their dual feasible sign.
    fn dual_ratio_test(&self, alpha_r: &[f64], to: VariableState) -> Option<EnterInfo> {
        let leaving_increases = to == VariableState::Lower;
        let tolerance = self.options.optimality_tolerance;

        let mut max_step = f64::INFINITY;
        let mut candidates = vec![];
        for &column in self.store.excluded() {
            let alpha = alpha_r[column];
            if alpha.abs() <= self.options.pivot_tolerance {
                continue;
            }
            // the leaving variable moves by -alpha per unit of entering step
            let increasing = if alpha > 0.0 {
                !leaving_increases
            } else {
                leaving_increases
            };
            let state = self.store.state(column);
            let movable = self.store.upper(column) > self.store.lower(column);
            let allowed = match state {
                VariableState::Lower => increasing && movable,
                VariableState::Upper => !increasing && movable,
                VariableState::Unbounded => true,
                VariableState::Basis => false,
            };
            if !allowed {
                continue;
            }
            let d = self.store.reduced_cost(column);
            let clamped = match state {
                VariableState::Lower => d.max(0.0),
                VariableState::Upper => d.min(0.0),
                _ => 0.0,
            };
            max_step = max_step.min((clamped.abs() + tolerance) / alpha.abs());
            candidates.push((column, state, increasing, clamped.abs() / alpha.abs(), alpha.abs()));
        }

        let mut best: Option<(usize, VariableState, bool, f64, f64)> = None;
        for candidate in candidates {
            if candidate.3 <= max_step && best.is_none_or(|b| candidate.4 > b.4) {
                best = Some(candidate);
            }
        }
        best.map(|(column, from, increasing, _, _)| EnterInfo {
            column,
            from,
            increasing,
        })
    }

    /// Applies a decision to the store and updates the pricing weights.
    fn commit(
        &mut self,
        descriptor: IterationDescriptor,
        column: &[f64],
        row: Option<Vec<f64>>,
        expect_primal_feasible: bool,
        expect_dual_feasible: bool,
    ) -> Result<()> {
        if let (Some(enter), Some(exit)) = (descriptor.enter, descriptor.exit) {
            let row = match row {
                Some(row) => row,
                None => self.store.calculate_dual_direction(exit.row),
            };
            self.update_weights(enter.column, exit.row, column, &row);
        }
        self.store.pivot(&descriptor)?;
        self.iterations += 1;
        if self.options.validate {
            self.validate(expect_primal_feasible, expect_dual_feasible);
        }
        Ok(())
    }

    fn update_weights(&mut self, entering: usize, row: usize, column: &[f64], alpha_r: &[f64]) {
        let pivot = column[row];
        let leaving = self.store.included()[row];

        let w_q = self.primal_weights[entering];
        for &j in self.store.excluded() {
            if j == entering {
                continue;
            }
            let ratio = alpha_r[j] / pivot;
            if ratio != 0.0 {
                self.primal_weights[j] = self.primal_weights[j].max(ratio * ratio * w_q);
            }
        }
        self.primal_weights[leaving] = (w_q / (pivot * pivot)).max(1.0);

        let w_r = self.dual_weights[row];
        for (i, &alpha) in column.iter().enumerate() {
            if i == row {
                continue;
            }
            let ratio = alpha / pivot;
            if ratio != 0.0 {
                self.dual_weights[i] = self.dual_weights[i].max(ratio * ratio * w_r);
            }
        }
        self.dual_weights[row] = (w_r / (pivot * pivot)).max(1.0);
    }

    /// Consistency checks after a pivot; problems are logged, never fatal.
    fn validate(&self, expect_primal_feasible: bool, expect_dual_feasible: bool) {
        if let Err(message) = self.store.check_partition() {
            warn!("iteration {}: inconsistent partition: {}", self.iterations, message);
        }
        let tolerance = self.options.feasibility_tolerance;
        for &column in self.store.excluded() {
            let expected = match self.store.state(column) {
                VariableState::Lower => self.store.lower(column),
                VariableState::Upper => self.store.upper(column),
                _ => 0.0,
            };
            if expected.abs() > tolerance {
                warn!(
                    "iteration {}: column {} in state {} is {} away from its bound",
                    self.iterations,
                    column,
                    self.store.state(column),
                    expected
                );
            }
        }
        if expect_primal_feasible {
            let (count, sum) = self.store.primal_infeasibility(tolerance);
            if count > 0 {
                warn!(
                    "iteration {}: {} basic variables lost primal feasibility ({})",
                    self.iterations, count, sum
                );
            }
        }
        if expect_dual_feasible {
            let (count, sum) = self
                .store
                .dual_infeasibility(self.options.optimality_tolerance);
            if count > 0 {
                warn!(
                    "iteration {}: {} reduced costs lost dual feasibility ({})",
                    self.iterations, count, sum
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimisation_algorithms::{
        linear_programming_helpers::assert_close,
        simplex_store::{
            build_store,
            tests::{all_backends, init},
        },
        simplex_structure::{StandardForm, StructureDescriptor},
    };

    /// min -x s.t. x + s0 = 2, 2x + s1 = 4
    fn tied_rows() -> StandardForm {
        let structure = StructureDescriptor::new(1, 0, 2, 0, 0, 2).unwrap();
        let mut form = StandardForm::new(structure);
        form.set_constraint_body(0, 0, 1.0).unwrap();
        form.set_constraint_body(0, 1, 1.0).unwrap();
        form.set_constraint_body(1, 0, 2.0).unwrap();
        form.set_constraint_body(1, 2, 1.0).unwrap();
        form.set_constraint_rhs(0, 2.0).unwrap();
        form.set_constraint_rhs(1, 4.0).unwrap();
        form.set_objective(0, -1.0).unwrap();
        form
    }

    fn engine(form: &StandardForm, options: SimplexOptions) -> PivotEngine {
        let store = build_store(form, &options).unwrap();
        PivotEngine::new(store, options)
    }

    #[test]
    fn ratio_ties_take_largest_pivot() {
        init();
        for options in all_backends() {
            let mut engine = engine(&tied_rows(), options.with_validation(true));
            engine.setup(Placement::PrimalFirst).unwrap();
            engine.use_true_objective();
            assert!(matches!(engine.primal_iteration(false), Ok(Step::Pivoted)));
            assert_eq!(engine.store().included(), &[1, 0]);
            assert_close(engine.store().extract_solution()[0], 2.0);
            assert!(matches!(engine.primal_iteration(false), Ok(Step::Finished)));
            assert_eq!(engine.iterations(), 1);
        }
    }

    #[test]
    fn pricing_ties_compare_a_bounded_number_of_columns() {
        init();
        // min -x0 - ... - x5 s.t. x0 + 2 x1 + ... + 6 x5 + s = 10
        let structure = StructureDescriptor::new(6, 0, 1, 0, 0, 1).unwrap();
        let mut form = StandardForm::new(structure);
        for column in 0..6 {
            form.set_constraint_body(0, column, (column + 1) as f64).unwrap();
            form.set_objective(column, -1.0).unwrap();
        }
        form.set_constraint_body(0, 6, 1.0).unwrap();
        form.set_constraint_rhs(0, 10.0).unwrap();

        for options in all_backends() {
            let mut engine = engine(&form, options.with_validation(true));
            engine.setup(Placement::PrimalFirst).unwrap();
            engine.use_true_objective();
            assert!(matches!(engine.primal_iteration(false), Ok(Step::Pivoted)));
            // x5 has the largest entry but lies beyond the compared columns
            assert_eq!(engine.store().included(), &[3]);
            assert_close(engine.store().basic_value(0), 2.5);
        }
    }

    #[test]
    fn bound_flip_without_limiting_row() {
        init();
        for options in all_backends() {
            let mut form = tied_rows();
            form.set_bounds(0, 0.0, 1.5).unwrap();
            let mut engine = engine(&form, options);
            engine.setup(Placement::PrimalFirst).unwrap();
            engine.use_true_objective();
            assert_eq!(engine.run_primal(PrimalObjective::Current), PhaseOutcome::Completed);
            assert_eq!(engine.store().state(0), VariableState::Upper);
            assert_eq!(engine.store().included(), &[1, 2]);
            assert_close(engine.result(SolveState::Optimal).value, -1.5);
        }
    }

    #[test]
    fn dual_first_placement() {
        init();
        for options in all_backends() {
            // min -x with x in [1, 3] starts at its upper bound, y in [-inf, 4] at its upper bound
            let structure = StructureDescriptor::new(2, 0, 1, 0, 0, 1).unwrap();
            let mut form = StandardForm::new(structure);
            form.set_constraint_body(0, 0, 1.0).unwrap();
            form.set_constraint_body(0, 1, 1.0).unwrap();
            form.set_constraint_body(0, 2, 1.0).unwrap();
            form.set_constraint_rhs(0, 10.0).unwrap();
            form.set_objective(0, -1.0).unwrap();
            form.set_bounds(0, 1.0, 3.0).unwrap();
            form.set_bounds(1, f64::NEG_INFINITY, 4.0).unwrap();

            let mut engine = engine(&form, options.clone());
            engine.setup(Placement::DualFirst).unwrap();
            assert_eq!(engine.store().state(0), VariableState::Upper);
            assert_eq!(engine.store().state(1), VariableState::Upper);
            assert!(engine.is_dual_feasible());
            assert_close(engine.store().basic_value(0), 3.0);

            let mut engine = self::engine(&form, options);
            engine.setup(Placement::PrimalFirst).unwrap();
            assert_eq!(engine.store().state(0), VariableState::Lower);
            assert!(!engine.is_dual_feasible());
            engine.use_artificial_objective();
            assert!(engine.is_dual_feasible());
        }
    }

    #[test]
    fn crossed_bounds_are_rejected() {
        let mut form = tied_rows();
        form.set_bounds(0, 2.0, 1.0).unwrap();
        let mut engine = engine(&form, SimplexOptions::default());
        assert_eq!(
            engine.setup(Placement::PrimalFirst),
            Err(Error::InvalidBounds {
                column: 0,
                lower: 2.0,
                upper: 1.0
            })
        );
    }

    #[test]
    fn iteration_limit_interrupts() {
        init();
        let mut engine = engine(&tied_rows(), SimplexOptions::default().with_iteration_limit(0));
        engine.setup(Placement::PrimalFirst).unwrap();
        engine.use_true_objective();
        assert_eq!(
            engine.run_primal(PrimalObjective::Current),
            PhaseOutcome::IterationLimit
        );
        assert_eq!(engine.interrupted_state(), SolveState::Feasible);
    }

    #[test]
    fn phase_one_reaches_feasibility() {
        init();
        for options in all_backends() {
            // x + y = 3 and x - y = 1 need both artificials driven out
            let structure = StructureDescriptor::new(2, 0, 0, 2, 0, 0).unwrap();
            let mut form = StandardForm::new(structure);
            form.set_constraint_body(0, 0, 1.0).unwrap();
            form.set_constraint_body(0, 1, 1.0).unwrap();
            form.set_constraint_body(1, 0, 1.0).unwrap();
            form.set_constraint_body(1, 1, -1.0).unwrap();
            form.set_constraint_rhs(0, 3.0).unwrap();
            form.set_constraint_rhs(1, 1.0).unwrap();

            let mut engine = engine(&form, options);
            engine.setup(Placement::PrimalFirst).unwrap();
            assert!(!engine.is_primal_feasible());
            assert_eq!(
                engine.run_primal(PrimalObjective::SumOfInfeasibilities),
                PhaseOutcome::Completed
            );
            assert!(engine.is_primal_feasible());
            let solution = engine.store().extract_solution();
            assert_close(solution[0], 2.0);
            assert_close(solution[1], 1.0);
        }
    }
}
