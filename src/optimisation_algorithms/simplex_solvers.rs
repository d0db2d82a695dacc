use log::{debug, warn};

use crate::optimisation_algorithms::{
    gomory_cuts::Cut,
    simplex_engine::{PhaseOutcome, Placement, PivotEngine, PrimalObjective},
    simplex_options::{SimplexOptions, Strategy},
    simplex_result::{Error, SolveResult, SolveState},
    simplex_store::{SimplexStore, build_store},
    simplex_structure::StandardForm,
};

/// A simplex solver over a problem in standard form.
pub trait Solver: std::fmt::Debug {
    /// Runs the solver to a terminal state (or the iteration limit).
    ///
    /// Errors are reserved for malformed input, such as crossed bounds; infeasibility and
    /// unboundedness are reported through the state of the result.
    fn solve(&mut self) -> Result<SolveResult, Error>;

    fn iterations(&self) -> usize;

    /// The working state, for solvers that keep one behind the store interface.
    fn store(&self) -> Option<&dyn SimplexStore>;

    /// Gomory mixed-integer cuts from the current basis. `integer` flags the solver-space
    /// variables that must take integral values.
    fn generate_cut_candidates(&mut self, threshold: f64, integer: &[bool]) -> Vec<Cut>;
}

/// Builds the store selected by the options and wraps it in the configured strategy.
pub fn build_solver(form: &StandardForm, options: &SimplexOptions) -> Result<Box<dyn Solver>, Error> {
    let store = build_store(form, options)?;
    Ok(Box::new(SimplexSolver::new(store, options.clone())))
}

pub fn solve(form: &StandardForm, options: &SimplexOptions) -> Result<SolveResult, Error> {
    build_solver(form, options)?.solve()
}

/// Runs one of the [`Strategy`] variants on a pivot engine.
#[derive(Debug)]
pub struct SimplexSolver {
    engine: PivotEngine,
    strategy: Strategy,
}

impl SimplexSolver {
    pub fn new(store: Box<dyn SimplexStore>, options: SimplexOptions) -> Self {
        let strategy = options.strategy;
        Self {
            engine: PivotEngine::new(store, options),
            strategy,
        }
    }

    pub fn engine(&self) -> &PivotEngine {
        &self.engine
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Primal iterations on the true objective, from a primal feasible basis.
    fn finish_primal(engine: &mut PivotEngine) -> SolveState {
        match engine.run_primal(PrimalObjective::Current) {
            PhaseOutcome::Completed => {
                if engine.is_primal_feasible() {
                    SolveState::Optimal
                } else {
                    warn!("primal iterations ended on an infeasible basis");
                    SolveState::Failed
                }
            }
            PhaseOutcome::Unbounded => SolveState::Unbounded,
            PhaseOutcome::IterationLimit => engine.interrupted_state(),
            PhaseOutcome::Infeasible | PhaseOutcome::Failed => SolveState::Failed,
        }
    }

    fn solve_primal(&mut self) -> Result<SolveState, Error> {
        let engine = &mut self.engine;
        engine.setup(Placement::PrimalFirst)?;
        engine.use_true_objective();
        if !engine.is_primal_feasible() {
            warn!("primal simplex needs a primal feasible starting basis");
            return Ok(SolveState::Failed);
        }
        Ok(Self::finish_primal(engine))
    }

    fn solve_dual(&mut self) -> Result<SolveState, Error> {
        let engine = &mut self.engine;
        engine.setup(Placement::DualFirst)?;
        if !engine.is_dual_feasible() {
            warn!("dual simplex needs a dual feasible starting basis");
            return Ok(SolveState::Failed);
        }
        Ok(match engine.run_dual() {
            PhaseOutcome::Completed => {
                if engine.is_dual_feasible() {
                    SolveState::Optimal
                } else {
                    warn!("dual iterations ended on a dual infeasible basis");
                    SolveState::Failed
                }
            }
            PhaseOutcome::Infeasible => SolveState::Infeasible,
            PhaseOutcome::IterationLimit => engine.interrupted_state(),
            PhaseOutcome::Unbounded | PhaseOutcome::Failed => SolveState::Failed,
        })
    }

    fn solve_phased(&mut self) -> Result<SolveState, Error> {
        let engine = &mut self.engine;
        engine.setup(Placement::DualFirst)?;
        if !engine.is_dual_feasible() {
            debug!("placement is not dual feasible, using the artificial objective");
            engine.use_artificial_objective();
        }
        match engine.run_dual() {
            PhaseOutcome::Completed => {}
            PhaseOutcome::Infeasible => return Ok(SolveState::Infeasible),
            PhaseOutcome::IterationLimit => return Ok(engine.interrupted_state()),
            PhaseOutcome::Unbounded | PhaseOutcome::Failed => return Ok(SolveState::Failed),
        }
        engine.use_true_objective();
        Ok(Self::finish_primal(engine))
    }

    fn solve_two_phase(&mut self) -> Result<SolveState, Error> {
        let engine = &mut self.engine;
        engine.setup(Placement::PrimalFirst)?;
        match engine.run_primal(PrimalObjective::SumOfInfeasibilities) {
            PhaseOutcome::Completed => {
                if !engine.is_primal_feasible() {
                    return Ok(SolveState::Infeasible);
                }
            }
            PhaseOutcome::IterationLimit => return Ok(engine.interrupted_state()),
            PhaseOutcome::Unbounded | PhaseOutcome::Infeasible | PhaseOutcome::Failed => {
                return Ok(SolveState::Failed);
            }
        }
        engine.use_true_objective();
        Ok(Self::finish_primal(engine))
    }
}

impl Solver for SimplexSolver {
    fn solve(&mut self) -> Result<SolveResult, Error> {
        let state = match self.strategy {
            Strategy::Primal => self.solve_primal()?,
            Strategy::Dual => self.solve_dual()?,
            Strategy::Phased => self.solve_phased()?,
            Strategy::TwoPhase => self.solve_two_phase()?,
        };
        let result = self.engine.result(state);
        debug!(
            "{} simplex on {} store: {} after {} iterations, obj.: {}",
            self.strategy,
            self.engine.store().name(),
            result.state,
            result.iterations,
            result.value
        );
        Ok(result)
    }

    fn iterations(&self) -> usize {
        self.engine.iterations()
    }

    fn store(&self) -> Option<&dyn SimplexStore> {
        Some(self.engine.store())
    }

    fn generate_cut_candidates(&mut self, threshold: f64, integer: &[bool]) -> Vec<Cut> {
        self.engine
            .store_mut()
            .generate_cut_candidates(threshold, integer)
    }
}

#[cfg(test)]
mod tests {
    use ntest::timeout;
    use strum::IntoEnumIterator;

    use super::*;
    use crate::optimisation_algorithms::{
        linear_programming_helpers::{assert_close, assert_slice_close},
        simplex_store::tests::{all_backends, init},
        simplex_structure::StructureDescriptor,
    };

    fn strategies(options: &SimplexOptions) -> impl Iterator<Item = SimplexOptions> + '_ {
        Strategy::iter().map(|strategy| options.clone().with_strategy(strategy))
    }

    /// min x s.t. x >= 3
    fn at_least_three() -> StandardForm {
        let structure = StructureDescriptor::new(1, 0, 1, 0, 1, 0).unwrap();
        let mut form = StandardForm::new(structure);
        form.set_constraint_body(0, 0, 1.0).unwrap();
        form.set_constraint_body(0, 1, -1.0).unwrap();
        form.set_constraint_rhs(0, 3.0).unwrap();
        form.set_objective(0, 1.0).unwrap();
        form
    }

    /// min -x s.t. x - y <= 1
    fn unbounded() -> StandardForm {
        let structure = StructureDescriptor::new(2, 0, 1, 0, 0, 1).unwrap();
        let mut form = StandardForm::new(structure);
        form.set_constraint_body(0, 0, 1.0).unwrap();
        form.set_constraint_body(0, 1, -1.0).unwrap();
        form.set_constraint_body(0, 2, 1.0).unwrap();
        form.set_constraint_rhs(0, 1.0).unwrap();
        form.set_objective(0, -1.0).unwrap();
        form
    }

    /// min x s.t. x >= 5, x <= 2
    fn infeasible() -> StandardForm {
        let structure = StructureDescriptor::new(1, 0, 2, 0, 1, 1).unwrap();
        let mut form = StandardForm::new(structure);
        form.set_constraint_body(0, 0, 1.0).unwrap();
        form.set_constraint_body(0, 1, -1.0).unwrap();
        form.set_constraint_body(1, 0, 1.0).unwrap();
        form.set_constraint_body(1, 2, 1.0).unwrap();
        form.set_constraint_rhs(0, 5.0).unwrap();
        form.set_constraint_rhs(1, 2.0).unwrap();
        form.set_objective(0, 1.0).unwrap();
        form
    }

    #[test]
    #[timeout(10000)]
    fn trivial_lower_bound() {
        init();
        for backend in all_backends() {
            for options in strategies(&backend) {
                let result = solve(&at_least_three(), &options).unwrap();
                if options.strategy == Strategy::Primal {
                    // the artificial of the only row starts at 3
                    assert_eq!(result.state, SolveState::Failed);
                    continue;
                }
                assert_eq!(result.state, SolveState::Optimal, "{:?}", options);
                assert_close(result.value, 3.0);
                assert_slice_close(&result.solution, &[3.0, 0.0]);
                assert_slice_close(&result.duals, &[1.0]);
            }
        }
    }

    #[test]
    #[timeout(10000)]
    fn unbounded_ray() {
        init();
        for backend in all_backends() {
            for options in strategies(&backend) {
                let result = solve(&unbounded(), &options).unwrap();
                let expected = match options.strategy {
                    Strategy::Dual => SolveState::Failed,
                    _ => SolveState::Unbounded,
                };
                assert_eq!(result.state, expected, "{:?}", options);
            }
        }
    }

    #[test]
    #[timeout(10000)]
    fn infeasible_bounds() {
        init();
        for backend in all_backends() {
            for options in strategies(&backend) {
                let result = solve(&infeasible(), &options).unwrap();
                let expected = match options.strategy {
                    Strategy::Primal => SolveState::Failed,
                    _ => SolveState::Infeasible,
                };
                assert_eq!(result.state, expected, "{:?}", options);
            }
        }
    }

    #[test]
    fn interrupted_solves() {
        init();
        let options = SimplexOptions::default().with_iteration_limit(0);
        let result = solve(&unbounded(), &options).unwrap();
        assert_eq!(result.state, SolveState::Feasible);
        assert_eq!(result.iterations, 0);

        let result = solve(&at_least_three(), &options).unwrap();
        assert_eq!(result.state, SolveState::Unexplored);

        // one dual pivot is all this problem needs
        let result = solve(&at_least_three(), &options.with_iteration_limit(1)).unwrap();
        assert_eq!(result.state, SolveState::Optimal);
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn crossed_bounds_are_an_error() {
        let mut form = at_least_three();
        form.set_bounds(0, 4.0, 1.0).unwrap();
        let mut solver = build_solver(&form, &SimplexOptions::default()).unwrap();
        assert!(matches!(
            solver.solve(),
            Err(Error::InvalidBounds { column: 0, .. })
        ));
    }

    #[test]
    fn partition_survives_solves() {
        init();
        for backend in all_backends() {
            let options = backend.with_validation(true);
            let mut solver = build_solver(&at_least_three(), &options).unwrap();
            solver.solve().unwrap();
            let store = solver.store().unwrap();
            assert!(store.check_partition().is_ok());
            assert_eq!(store.primal_infeasibility(1e-9).0, 0);
            assert_eq!(store.dual_infeasibility(1e-9).0, 0);
            assert_eq!(solver.iterations(), store.structure().constraints());

            // solving again from the optimal basis takes no pivots
            let result = solver.solve().unwrap();
            assert_eq!(result.state, SolveState::Optimal);
            assert_eq!(solver.iterations(), 1);
        }
    }
}
