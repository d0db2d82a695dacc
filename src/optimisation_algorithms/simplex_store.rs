use anyhow::{Result, anyhow};
use itertools::Itertools;
use log::debug;
use strum_macros::Display;

use crate::optimisation_algorithms::{
    gomory_cuts::{BoundedTerm, Cut, bounded_gomory_mixed_integer_cut},
    simplex_options::SimplexOptions,
    simplex_result::Error,
    simplex_store_dense::DenseTableauStore,
    simplex_store_revised::RevisedStore,
    simplex_store_sparse::SparseTableauStore,
    simplex_structure::{CsMat, ExpandedForm, StandardForm, StructureDescriptor},
};

/// Where a column currently sits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum VariableState {
    Basis,
    /// Non-basic at its lower bound.
    Lower,
    /// Non-basic at its upper bound.
    Upper,
    /// Non-basic, free, valued zero.
    Unbounded,
}

/// The non-basic column chosen to change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnterInfo {
    pub column: usize,
    pub from: VariableState,
    pub increasing: bool,
}

/// The basic row chosen to leave, and the bound its variable ends up at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExitInfo {
    pub row: usize,
    pub to: VariableState,
    pub increasing: bool,
}

/// One pivot decision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IterationDescriptor {
    pub enter: Option<EnterInfo>,
    pub exit: Option<ExitInfo>,
    /// Distance moved by the entering variable.
    pub step: f64,
}

impl IterationDescriptor {
    pub fn basis_update(enter: EnterInfo, exit: ExitInfo, step: f64) -> Self {
        Self {
            enter: Some(enter),
            exit: Some(exit),
            step,
        }
    }

    pub fn bound_flip(enter: EnterInfo, step: f64) -> Self {
        Self {
            enter: Some(enter),
            exit: None,
            step,
        }
    }

    pub fn noop() -> Self {
        Self {
            enter: None,
            exit: None,
            step: 0.0,
        }
    }

    pub fn is_basis_update(&self) -> bool {
        self.enter.is_some() && self.exit.is_some()
    }

    pub fn is_bound_flip(&self) -> bool {
        self.enter.is_some() && self.exit.is_none()
    }

    pub fn is_noop(&self) -> bool {
        self.enter.is_none()
    }
}

/// State shared by all store backends: original data, bounds, shifts and the partition.
///
/// Bounds are kept in shifted coordinates: a column's model value is `shift + value`, and a
/// non-basic column always has shifted value zero.
#[derive(Clone, Debug)]
pub struct StoreCore {
    pub(crate) structure: StructureDescriptor,
    /// Constraint matrix (column major), artificials included.
    pub(crate) matrix: CsMat,
    /// Right-hand side after shifting.
    pub(crate) rhs: Vec<f64>,
    pub(crate) costs: Vec<f64>,
    /// Objective the reduced costs currently refer to.
    pub(crate) objective: Vec<f64>,
    pub(crate) lower: Vec<f64>,
    pub(crate) upper: Vec<f64>,
    pub(crate) shift: Vec<f64>,
    pub(crate) integer: Vec<bool>,
    pub(crate) unit_columns: Vec<usize>,
    pub(crate) states: Vec<VariableState>,
    pub(crate) included: Vec<usize>,
    pub(crate) excluded: Vec<usize>,
    /// Index of each column in `included` or `excluded`.
    pub(crate) positions: Vec<usize>,
    pub(crate) pivot_tolerance: f64,
    pub(crate) drop_tolerance: f64,
    pub(crate) integrality_tolerance: f64,
}

impl StoreCore {
    pub(crate) fn new(form: &ExpandedForm, options: &SimplexOptions) -> Result<Self, Error> {
        let n = form.structure.columns();
        if form.costs.len() != n || form.lower.len() != n || form.upper.len() != n {
            return Err(Error::DimensionMismatch {
                what: "column data",
                expected: n,
                found: form.costs.len().min(form.lower.len()).min(form.upper.len()),
            });
        }
        if form.rhs.len() != form.structure.constraints() {
            return Err(Error::DimensionMismatch {
                what: "right-hand side",
                expected: form.structure.constraints(),
                found: form.rhs.len(),
            });
        }
        let mut core = Self {
            structure: form.structure.clone(),
            matrix: form.matrix.clone(),
            rhs: form.rhs.clone(),
            costs: form.costs.clone(),
            objective: form.costs.clone(),
            lower: form.lower.clone(),
            upper: form.upper.clone(),
            shift: vec![0.0; n],
            integer: form.integer.clone(),
            unit_columns: form.unit_columns.clone(),
            states: vec![VariableState::Lower; n],
            included: vec![],
            excluded: vec![],
            positions: vec![0; n],
            pivot_tolerance: options.pivot_tolerance,
            drop_tolerance: options.drop_tolerance,
            integrality_tolerance: options.feasibility_tolerance,
        };
        core.set_partition(&form.basis)
            .map_err(|err| Error::InvalidStructure(err.to_string()))?;
        Ok(core)
    }

    pub(crate) fn rows(&self) -> usize {
        self.included.len()
    }

    pub(crate) fn columns(&self) -> usize {
        self.states.len()
    }

    /// Makes `included` the basis. Columns leaving the basis become `Lower`; other non-basic
    /// columns keep their state.
    pub(crate) fn set_partition(&mut self, included: &[usize]) -> Result<()> {
        let n = self.columns();
        if included.len() != self.structure.constraints() {
            return Err(anyhow!(
                "basis has {} columns for {} rows",
                included.len(),
                self.structure.constraints()
            ));
        }
        let mut in_basis = vec![false; n];
        for &column in included {
            if column >= n || std::mem::replace(&mut in_basis[column], true) {
                return Err(anyhow!("basis column {} is invalid or repeated", column));
            }
        }
        self.included = included.to_vec();
        self.excluded = (0..n).filter(|&c| !in_basis[c]).collect();
        for (row, &column) in self.included.iter().enumerate() {
            self.states[column] = VariableState::Basis;
            self.positions[column] = row;
        }
        for (pos, &column) in self.excluded.iter().enumerate() {
            if self.states[column] == VariableState::Basis {
                self.states[column] = VariableState::Lower;
            }
            self.positions[column] = pos;
        }
        Ok(())
    }

    /// Swaps `column` into the basis at `row`; returns the leaving column, which is marked `Lower`.
    pub(crate) fn exchange_partition(&mut self, row: usize, column: usize) -> usize {
        let leaving = self.included[row];
        let pos = self.positions[column];
        self.included[row] = column;
        self.excluded[pos] = leaving;
        self.positions[column] = row;
        self.positions[leaving] = pos;
        self.states[column] = VariableState::Basis;
        self.states[leaving] = VariableState::Lower;
        leaving
    }

    pub(crate) fn shift_bounds(&mut self, column: usize, delta: f64) {
        self.lower[column] -= delta;
        self.upper[column] -= delta;
        self.shift[column] += delta;
        if let Some(col) = self.matrix.outer_view(column) {
            for (row, &val) in col.iter() {
                self.rhs[row] -= delta * val;
            }
        }
    }

    /// Current objective coefficients of the basic variables, in row order.
    pub(crate) fn basic_objective(&self) -> Vec<f64> {
        self.included.iter().map(|&c| self.objective[c]).collect()
    }

    pub(crate) fn check_partition(&self) -> Result<(), String> {
        let n = self.columns();
        if self.included.len() != self.structure.constraints() {
            return Err(format!(
                "{} basic columns for {} rows",
                self.included.len(),
                self.structure.constraints()
            ));
        }
        if self.included.len() + self.excluded.len() != n {
            return Err(format!(
                "{} basic and {} non-basic columns for {} columns",
                self.included.len(),
                self.excluded.len(),
                n
            ));
        }
        let mut seen = vec![false; n];
        for (row, &column) in self.included.iter().enumerate() {
            if std::mem::replace(&mut seen[column], true) {
                return Err(format!("column {} appears twice", column));
            }
            if self.states[column] != VariableState::Basis || self.positions[column] != row {
                return Err(format!("basic column {} is out of sync", column));
            }
        }
        for (pos, &column) in self.excluded.iter().enumerate() {
            if std::mem::replace(&mut seen[column], true) {
                return Err(format!("column {} appears twice", column));
            }
            if self.states[column] == VariableState::Basis || self.positions[column] != pos {
                return Err(format!("non-basic column {} is out of sync", column));
            }
        }
        Ok(())
    }
}

/// Mutable working state of a simplex solve.
///
/// Backends differ in how they keep `B⁻¹·A`: as an explicit tableau or through a factored basis
/// inverse. The pivot engine only talks to this trait.
pub trait SimplexStore: std::fmt::Debug {
    #[doc(hidden)]
    fn core(&self) -> &StoreCore;

    #[doc(hidden)]
    fn core_mut(&mut self) -> &mut StoreCore;

    fn name(&self) -> &'static str;

    /// Shifted value of the basic variable of `row`.
    fn basic_value(&self, row: usize) -> f64;

    /// Reduced cost of `column` under the current objective; zero for basic columns.
    fn reduced_cost(&self, column: usize) -> f64;

    /// `B⁻¹·A_column`, one entry per row.
    fn calculate_primal_direction(&mut self, column: usize) -> Vec<f64>;

    /// Row `row` of `B⁻¹·A`, one entry per column.
    fn calculate_dual_direction(&mut self, row: usize) -> Vec<f64>;

    /// Basis exchange: `column` becomes basic at `row`, the leaving variable becomes non-basic at
    /// shifted value zero.
    fn exchange(&mut self, row: usize, column: usize) -> Result<()>;

    /// Propagates a shift of `column` by `delta` to the basic values.
    fn apply_shift(&mut self, column: usize, delta: f64);

    fn recompute_reduced_costs(&mut self);

    /// Re-derives the backend's data from the original problem for the current partition.
    fn rebuild(&mut self) -> Result<()>;

    fn structure(&self) -> &StructureDescriptor {
        &self.core().structure
    }

    fn num_rows(&self) -> usize {
        self.core().rows()
    }

    fn num_columns(&self) -> usize {
        self.core().columns()
    }

    fn lower(&self, column: usize) -> f64 {
        self.core().lower[column]
    }

    fn upper(&self, column: usize) -> f64 {
        self.core().upper[column]
    }

    fn shift(&self, column: usize) -> f64 {
        self.core().shift[column]
    }

    fn state(&self, column: usize) -> VariableState {
        self.core().states[column]
    }

    fn included(&self) -> &[usize] {
        &self.core().included
    }

    fn excluded(&self) -> &[usize] {
        &self.core().excluded
    }

    /// Original objective coefficient.
    fn cost(&self, column: usize) -> f64 {
        self.core().costs[column]
    }

    fn costs(&self) -> &[f64] {
        &self.core().costs
    }

    fn is_integer(&self, column: usize) -> bool {
        self.core().integer[column]
    }

    /// Shifted value of any column.
    fn value(&self, column: usize) -> f64 {
        match self.state(column) {
            VariableState::Basis => self.basic_value(self.core().positions[column]),
            _ => 0.0,
        }
    }

    /// Row of a basic column.
    fn basic_row(&self, column: usize) -> Option<usize> {
        match self.state(column) {
            VariableState::Basis => Some(self.core().positions[column]),
            _ => None,
        }
    }

    fn set_state(&mut self, column: usize, state: VariableState) {
        debug_assert_ne!(self.state(column), VariableState::Basis);
        debug_assert_ne!(state, VariableState::Basis);
        self.core_mut().states[column] = state;
    }

    /// Translates `column` by `delta` so that its shifted value zero moves to its old value `delta`.
    fn shift_column(&mut self, column: usize, delta: f64) {
        if delta == 0.0 {
            return;
        }
        self.core_mut().shift_bounds(column, delta);
        self.apply_shift(column, delta);
    }

    /// Sets the bounds of `column` in model coordinates.
    fn set_bounds(&mut self, column: usize, lower: f64, upper: f64) {
        let core = self.core_mut();
        core.lower[column] = lower - core.shift[column];
        core.upper[column] = upper - core.shift[column];
    }

    /// Makes `costs` the objective the reduced costs refer to.
    fn set_objective(&mut self, costs: &[f64]) {
        self.core_mut().objective.clear();
        self.core_mut().objective.extend_from_slice(costs);
        self.recompute_reduced_costs();
    }

    fn reset_basis(&mut self, included: &[usize]) -> Result<()> {
        self.core_mut().set_partition(included)?;
        self.rebuild()
    }

    /// Commits a pivot decision.
    fn pivot(&mut self, iteration: &IterationDescriptor) -> Result<()> {
        match (iteration.enter, iteration.exit) {
            (Some(enter), Some(exit)) => {
                let leaving = self.included()[exit.row];
                let bound = match exit.to {
                    VariableState::Upper => self.upper(leaving),
                    VariableState::Lower => self.lower(leaving),
                    state => return Err(anyhow!("cannot leave the basis to state {}", state)),
                };
                if !bound.is_finite() {
                    return Err(anyhow!("column {} leaves to an infinite bound", leaving));
                }
                self.exchange(exit.row, enter.column)?;
                self.shift_column(leaving, bound);
                self.set_state(leaving, exit.to);
                Ok(())
            }
            (Some(enter), None) => {
                let column = enter.column;
                let (delta, to) = match self.state(column) {
                    VariableState::Lower => (self.upper(column), VariableState::Upper),
                    VariableState::Upper => (self.lower(column), VariableState::Lower),
                    state => {
                        return Err(anyhow!("cannot flip column {} in state {}", column, state));
                    }
                };
                if !delta.is_finite() {
                    return Err(anyhow!("column {} has no opposite bound", column));
                }
                self.shift_column(column, delta);
                self.set_state(column, to);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Model values of the solver-space variables (artificials excluded).
    fn extract_solution(&self) -> Vec<f64> {
        (0..self.structure().variables())
            .map(|column| self.shift(column) + self.value(column))
            .collect()
    }

    /// Objective value of the current basic solution under the original costs.
    fn extract_value(&self) -> f64 {
        (0..self.num_columns())
            .map(|column| self.cost(column) * (self.shift(column) + self.value(column)))
            .sum()
    }

    /// Simplex multipliers of the current objective, one per row, with negated rows flipped back.
    fn dual_values(&self) -> Vec<f64> {
        let core = self.core();
        core.unit_columns
            .iter()
            .enumerate()
            .map(|(row, &unit)| {
                let dual = core.objective[unit] - self.reduced_cost(unit);
                if core.structure.is_negated(row) {
                    -dual
                } else {
                    dual
                }
            })
            .collect()
    }

    /// Number of basic variables outside their bounds and the sum of the violations.
    fn primal_infeasibility(&self, tolerance: f64) -> (usize, f64) {
        let mut count = 0;
        let mut sum = 0.0;
        for (row, &column) in self.included().iter().enumerate() {
            let value = self.basic_value(row);
            let violation = (self.lower(column) - value).max(value - self.upper(column));
            if violation > tolerance {
                count += 1;
                sum += violation;
            }
        }
        (count, sum)
    }

    /// Number of non-basic columns whose reduced cost has the wrong sign and the sum of the errors.
    fn dual_infeasibility(&self, tolerance: f64) -> (usize, f64) {
        let mut count = 0;
        let mut sum = 0.0;
        for &column in self.excluded() {
            if self.lower(column) == self.upper(column) {
                continue;
            }
            let d = self.reduced_cost(column);
            let error = match self.state(column) {
                VariableState::Lower => -d,
                VariableState::Upper => d,
                VariableState::Unbounded => d.abs(),
                VariableState::Basis => 0.0,
            };
            if error > tolerance {
                count += 1;
                sum += error;
            }
        }
        (count, sum)
    }

    fn check_partition(&self) -> Result<(), String> {
        self.core().check_partition()
    }

    /// Gomory mixed-integer cuts from every basic row whose variable is integer and fractional.
    ///
    /// `integer` is indexed by solver-space variable. Rows with a basic artificial, and rows
    /// involving a free non-basic column, yield no cut.
    fn generate_cut_candidates(&mut self, threshold: f64, integer: &[bool]) -> Vec<Cut> {
        let mut cuts = vec![];
        for row in 0..self.num_rows() {
            let basic = self.included()[row];
            if self.structure().is_artificial(basic) || !integer.get(basic).copied().unwrap_or(false)
            {
                continue;
            }
            let value = self.shift(basic) + self.basic_value(row);
            let direction = self.calculate_dual_direction(row);
            let drop_tolerance = self.core().drop_tolerance;

            let mut terms = vec![];
            let mut usable = true;
            for &column in self.excluded() {
                let coefficient = direction[column];
                if coefficient.abs() <= drop_tolerance
                    || self.structure().is_artificial(column)
                    || self.lower(column) == self.upper(column)
                {
                    continue;
                }
                let is_integer = integer.get(column).copied().unwrap_or(false);
                let shift = self.shift(column);
                match self.state(column) {
                    VariableState::Lower => terms.push(BoundedTerm {
                        column,
                        coefficient,
                        at_upper: false,
                        bound: shift + self.lower(column),
                        integer: is_integer,
                    }),
                    VariableState::Upper => terms.push(BoundedTerm {
                        column,
                        coefficient: -coefficient,
                        at_upper: true,
                        bound: shift + self.upper(column),
                        integer: is_integer,
                    }),
                    _ => {
                        usable = false;
                        break;
                    }
                }
            }
            if !usable {
                continue;
            }
            if let Some(cut) = bounded_gomory_mixed_integer_cut(
                basic,
                value,
                &terms,
                threshold,
                self.core().integrality_tolerance,
            ) {
                cuts.push(cut);
            }
        }
        debug!(
            "{} cut candidates from {} rows (basic: {})",
            cuts.len(),
            self.num_rows(),
            cuts.iter().map(|cut| cut.basic_variable).join(",")
        );
        cuts
    }
}

/// Builds the store backend selected by the options and the problem size.
pub fn build_store(form: &StandardForm, options: &SimplexOptions) -> Result<Box<dyn SimplexStore>, Error> {
    let expanded = form.expand()?;
    let variables = expanded.structure.variables();
    let constraints = expanded.structure.constraints();
    let store: Box<dyn SimplexStore> = if options.use_revised(variables, constraints) {
        Box::new(RevisedStore::build(&expanded, options)?)
    } else if options.use_sparse_tableau(variables, constraints) {
        Box::new(SparseTableauStore::build(&expanded, options)?)
    } else {
        Box::new(DenseTableauStore::build(&expanded, options)?)
    };
    debug!(
        "{} store for {} variables and {} constraints ({} artificials)",
        store.name(),
        variables,
        constraints,
        expanded.structure.artificials()
    );
    Ok(store)
}
