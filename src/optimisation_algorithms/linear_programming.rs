/*!
A linear programming front-end for the simplex engine.

[Linear programming](https://en.wikipedia.org/wiki/Linear_programming) is a technique for
finding the minimum (or maximum) of a linear function of a set of continuous variables
subject to linear equality and inequality constraints.

# Entry points

Begin by creating a [`Problem`](struct.Problem.html) instance, declaring variables and adding
constraints. Solving it will produce a [`Solution`](struct.Solution.html) that reports the
state of the solve, the objective value, the variable values and the constraint duals.

The problem is translated into a standard form over non-negative solver-space columns: a
variable with a finite lower bound `l` becomes `l + p`, one with only an upper bound `u`
becomes `u - q` and a free variable becomes `p - q`. Rows get a slack per inequality and are
negated when their right-hand side is negative.

# Example

```
# use ebi_simplex::optimisation_algorithms::{linear_programming::*, simplex_result::SolveState};
// Maximise an objective function x + 2 * y of two variables x >= 0 and 0 <= y <= 3
let mut problem = Problem::new(OptimisationDirection::Maximise);
let x = problem.add_var(1.0, (0.0, f64::INFINITY));
let y = problem.add_var(2.0, (0.0, 3.0));

// subject to constraints: x + y <= 4 and 2 * x + y >= 2.
problem.add_constraint(&[(x, 1.0), (y, 1.0)], ComparisonOp::Le, 4.0);
problem.add_constraint(&[(x, 2.0), (y, 1.0)], ComparisonOp::Ge, 2.0);

// Optimal value is 7, achieved at x = 1 and y = 3.
let solution = problem.solve().unwrap();
assert_eq!(solution.state(), SolveState::Optimal);
assert!((solution.objective() - 7.0).abs() < 1e-9);
assert!((solution[x] - 1.0).abs() < 1e-9);
assert!((solution[y] - 3.0).abs() < 1e-9);
```
*/

#![deny(missing_debug_implementations, missing_docs)]

use itertools::Itertools;
use log::debug;

use crate::optimisation_algorithms::{
    gomory_cuts::Cut,
    linear_programming_helpers::is_integral,
    simplex::LegacySimplex,
    simplex_options::SimplexOptions,
    simplex_result::{Error, SolveState},
    simplex_solvers::{Solver, build_solver},
    simplex_structure::{StandardForm, StructureDescriptor},
};

/// An enum indicating whether to minimise or maximise objective function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimisationDirection {
    /// Minimise the objective function.
    Minimise,
    /// Maximise the objective function.
    Maximise,
}

/// A reference to a variable in a linear programming problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Variable(pub(crate) usize);

impl Variable {
    /// Sequence number of the variable.
    ///
    /// Variables are referenced by their number in the addition sequence. The method returns
    /// this number.
    pub fn idx(&self) -> usize {
        self.0
    }
}

/// A reference to a constraint in a linear programming problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Constraint(pub(crate) usize);

impl Constraint {
    /// Sequence number of the constraint.
    pub fn idx(&self) -> usize {
        self.0
    }
}

/// A sum of variables multiplied by constant coefficients used as a left-hand side
/// when defining constraints.
#[derive(Clone, Debug)]
pub struct LinearExpr {
    vars: Vec<usize>,
    coeffs: Vec<f64>,
}

impl LinearExpr {
    /// Creates an empty linear expression.
    pub fn empty() -> Self {
        Self {
            vars: vec![],
            coeffs: vec![],
        }
    }

    /// Add a single term to the linear expression.
    ///
    /// Variables can be added to an expression in any order. Adding the same variable several
    /// times adds up its coefficients.
    pub fn add(&mut self, var: Variable, coeff: f64) {
        self.vars.push(var.0);
        self.coeffs.push(coeff);
    }
}

/// A single `variable * constant` term in a linear expression.
/// This is an auxiliary struct for specifying conversions.
#[doc(hidden)]
#[derive(Clone, Debug)]
pub struct LinearTerm(Variable, f64);

impl From<(Variable, f64)> for LinearTerm {
    fn from(term: (Variable, f64)) -> Self {
        LinearTerm(term.0, term.1)
    }
}

impl<'a> From<&'a (Variable, f64)> for LinearTerm {
    fn from(term: &'a (Variable, f64)) -> Self {
        LinearTerm(term.0, term.1)
    }
}

impl<I: IntoIterator<Item = impl Into<LinearTerm>>> From<I> for LinearExpr {
    fn from(iter: I) -> Self {
        let mut expr = LinearExpr::empty();
        for term in iter {
            let LinearTerm(var, coeff) = term.into();
            expr.add(var, coeff);
        }
        expr
    }
}

impl std::iter::FromIterator<(Variable, f64)> for LinearExpr {
    fn from_iter<I: IntoIterator<Item = (Variable, f64)>>(iter: I) -> Self {
        let mut expr = LinearExpr::empty();
        for term in iter {
            expr.add(term.0, term.1)
        }
        expr
    }
}

impl std::iter::Extend<(Variable, f64)> for LinearExpr {
    fn extend<I: IntoIterator<Item = (Variable, f64)>>(&mut self, iter: I) {
        for term in iter {
            self.add(term.0, term.1)
        }
    }
}

/// An operator specifying the relation between left-hand and right-hand sides of the constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComparisonOp {
    /// The == operator (equal to)
    Eq,
    /// The <= operator (less than or equal to)
    Le,
    /// The >= operator (greater than or equal to)
    Ge,
}

impl ComparisonOp {
    fn flipped(self) -> Self {
        match self {
            ComparisonOp::Eq => ComparisonOp::Eq,
            ComparisonOp::Le => ComparisonOp::Ge,
            ComparisonOp::Ge => ComparisonOp::Le,
        }
    }
}

/// What a solver-space column stands for in the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnOrigin {
    /// The part of a variable above its lower bound (or its positive part if it is free).
    Positive(Variable),
    /// The part of a variable below its upper bound (or its negative part if it is free).
    Negative(Variable),
    /// The slack of an inequality.
    Slack(Constraint),
    /// The artificial of a row without an identity slack.
    Artificial(Constraint),
}

/// A linear programming problem under construction.
#[derive(Clone)]
pub struct Problem {
    direction: OptimisationDirection,
    obj_coeffs: Vec<f64>,
    var_mins: Vec<f64>,
    var_maxs: Vec<f64>,
    integer: Vec<bool>,
    constraints: Vec<(LinearExpr, ComparisonOp, f64)>,
}

impl std::fmt::Debug for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only printing lengths here because actual data is probably huge.
        f.debug_struct("Problem")
            .field("direction", &self.direction)
            .field("num_vars", &self.obj_coeffs.len())
            .field("num_constraints", &self.constraints.len())
            .finish()
    }
}

/// Solver-space columns of one model variable: `x = offset + p - q`.
#[derive(Clone, Copy, Debug)]
struct VariableColumns {
    positive: Option<usize>,
    negative: Option<usize>,
    offset: f64,
}

/// One translated row, before the rows are put in structure order.
struct Row {
    origin: usize,
    terms: Vec<(usize, f64)>,
    op: ComparisonOp,
    rhs: f64,
    negated: bool,
}

/// A problem in standard form together with the maps back to the model.
#[derive(Debug)]
struct Translation {
    form: StandardForm,
    variables: Vec<VariableColumns>,
    /// For each model constraint, its row.
    rows: Vec<usize>,
    origins: Vec<ColumnOrigin>,
    objective_offset: f64,
}

impl Problem {
    /// Create a new problem instance.
    pub fn new(direction: OptimisationDirection) -> Self {
        Problem {
            direction,
            obj_coeffs: vec![],
            var_mins: vec![],
            var_maxs: vec![],
            integer: vec![],
            constraints: vec![],
        }
    }

    /// Add a new variable to the problem.
    ///
    /// `obj_coeff` is a coefficient of the term in the objective function corresponding to this
    /// variable, `min` and `max` are the minimum and maximum (inclusive) bounds of this
    /// variable. If one of the bounds is absent, use `f64::NEG_INFINITY` for minimum and
    /// `f64::INFINITY` for maximum.
    pub fn add_var(&mut self, obj_coeff: f64, (min, max): (f64, f64)) -> Variable {
        let var = Variable(self.obj_coeffs.len());
        let obj_coeff = match self.direction {
            OptimisationDirection::Minimise => obj_coeff,
            OptimisationDirection::Maximise => -obj_coeff,
        };
        self.obj_coeffs.push(obj_coeff);
        self.var_mins.push(min);
        self.var_maxs.push(max);
        self.integer.push(false);
        var
    }

    /// Add a new variable that must take an integral value.
    ///
    /// The solve itself only considers the relaxation; integrality is used when generating cut
    /// candidates from the solution.
    pub fn add_integer_var(&mut self, obj_coeff: f64, bounds: (f64, f64)) -> Variable {
        let var = self.add_var(obj_coeff, bounds);
        self.integer[var.0] = true;
        var
    }

    /// Add a linear constraint to the problem.
    ///
    /// # Examples
    ///
    /// Left-hand side of the constraint can be specified in several ways:
    /// ```
    /// # use ebi_simplex::optimisation_algorithms::linear_programming::*;
    /// let mut problem = Problem::new(OptimisationDirection::Minimise);
    /// let x = problem.add_var(1.0, (0.0, f64::INFINITY));
    /// let y = problem.add_var(1.0, (0.0, f64::INFINITY));
    ///
    /// // Add an x + y >= 2 constraint, specifying the left-hand side expression:
    ///
    /// // * by passing a slice of pairs (useful when explicitly enumerating variables)
    /// problem.add_constraint(&[(x, 1.0), (y, 1.0)], ComparisonOp::Ge, 2.0);
    ///
    /// // * by passing an iterator of variable-coefficient pairs.
    /// let vars = [x, y];
    /// problem.add_constraint(vars.iter().map(|&v| (v, 1.0)), ComparisonOp::Ge, 2.0);
    ///
    /// // * by manually constructing a LinearExpr.
    /// let mut lhs = LinearExpr::empty();
    /// for &v in &vars {
    ///     lhs.add(v, 1.0);
    /// }
    /// problem.add_constraint(lhs, ComparisonOp::Ge, 2.0);
    /// ```
    pub fn add_constraint(
        &mut self,
        expr: impl Into<LinearExpr>,
        cmp_op: ComparisonOp,
        rhs: f64,
    ) -> Constraint {
        let constraint = Constraint(self.constraints.len());
        self.constraints.push((expr.into(), cmp_op, rhs));
        constraint
    }

    /// Solve the problem with the default options, finding the optimal objective function
    /// value and variable values.
    ///
    /// # Errors
    ///
    /// Will return an error if the problem is malformed, such as a variable with crossed
    /// bounds. Infeasible and unbounded problems are reported through [`Solution::state`].
    pub fn solve(&self) -> Result<Solution, Error> {
        self.solve_with(&SimplexOptions::default())
    }

    /// Solve the problem with the given options.
    pub fn solve_with(&self, options: &SimplexOptions) -> Result<Solution, Error> {
        let translation = self.translate()?;
        let solver = build_solver(&translation.form, options)?;
        self.finish(translation, solver)
    }

    /// Solve the problem with the dense two-phase tableau solver.
    pub fn solve_legacy(&self, options: &SimplexOptions) -> Result<Solution, Error> {
        let translation = self.translate()?;
        let solver = Box::new(LegacySimplex::new(&translation.form, options)?);
        self.finish(translation, solver)
    }

    fn finish(&self, translation: Translation, mut solver: Box<dyn Solver>) -> Result<Solution, Error> {
        let result = solver.solve()?;
        let sense = match self.direction {
            OptimisationDirection::Minimise => 1.0,
            OptimisationDirection::Maximise => -1.0,
        };
        let values = translation
            .variables
            .iter()
            .map(|columns| {
                let p = columns.positive.map_or(0.0, |p| result.solution[p]);
                let q = columns.negative.map_or(0.0, |q| result.solution[q]);
                columns.offset + p - q
            })
            .collect_vec();
        let duals = translation
            .rows
            .iter()
            .map(|&row| sense * result.duals[row])
            .collect_vec();
        let objective = sense * (result.value + translation.objective_offset);
        debug!(
            "solved problem with {} variables and {} constraints: {}, obj.: {}",
            self.obj_coeffs.len(),
            self.constraints.len(),
            result.state,
            objective
        );

        Ok(Solution {
            direction: self.direction,
            state: result.state,
            objective,
            values,
            duals,
            iterations: result.iterations,
            integer: translation.form.integer().to_vec(),
            origins: translation.origins,
            solver,
        })
    }

    fn translate(&self) -> Result<Translation, Error> {
        let n = self.obj_coeffs.len();
        for column in 0..n {
            let (lower, upper) = (self.var_mins[column], self.var_maxs[column]);
            if !(lower <= upper) || lower == f64::INFINITY || upper == f64::NEG_INFINITY {
                return Err(Error::InvalidBounds {
                    column,
                    lower,
                    upper,
                });
            }
        }

        // positive parts first, then negative parts
        let mut variables = self
            .var_mins
            .iter()
            .zip(self.var_maxs.iter())
            .map(|(&lower, &upper)| VariableColumns {
                positive: None,
                negative: None,
                offset: if lower.is_finite() {
                    lower
                } else if upper.is_finite() {
                    upper
                } else {
                    0.0
                },
            })
            .collect_vec();
        let mut next = 0;
        for (k, columns) in variables.iter_mut().enumerate() {
            if self.var_mins[k].is_finite() || self.var_maxs[k].is_infinite() {
                columns.positive = Some(next);
                next += 1;
            }
        }
        let positive_parts = next;
        for (k, columns) in variables.iter_mut().enumerate() {
            if self.var_mins[k].is_infinite() {
                columns.negative = Some(next);
                next += 1;
            }
        }
        let negative_parts = next - positive_parts;

        let mut rows = Vec::with_capacity(self.constraints.len());
        for (origin, (expr, op, rhs)) in self.constraints.iter().enumerate() {
            let mut rhs = *rhs;
            let mut terms = vec![];
            for (&var, &coeff) in expr.vars.iter().zip(expr.coeffs.iter()) {
                let columns = variables.get(var).ok_or(Error::IndexOutOfRange {
                    what: "variable",
                    index: var,
                    len: n,
                })?;
                rhs -= coeff * columns.offset;
                if let Some(p) = columns.positive {
                    terms.push((p, coeff));
                }
                if let Some(q) = columns.negative {
                    terms.push((q, -coeff));
                }
            }
            let terms = terms
                .into_iter()
                .into_group_map()
                .into_iter()
                .map(|(column, values)| (column, values.into_iter().sum::<f64>()))
                .filter(|&(_, coeff)| coeff != 0.0)
                .sorted_by_key(|&(column, _)| column)
                .collect_vec();
            rows.push(if rhs < 0.0 {
                Row {
                    origin,
                    terms: terms.into_iter().map(|(column, coeff)| (column, -coeff)).collect(),
                    op: op.flipped(),
                    rhs: -rhs,
                    negated: true,
                }
            } else {
                Row {
                    origin,
                    terms,
                    op: *op,
                    rhs,
                    negated: false,
                }
            });
        }
        let (equalities, inequalities): (Vec<_>, Vec<_>) =
            rows.into_iter().partition(|row| row.op == ComparisonOp::Eq);
        let slacks = inequalities
            .iter()
            .filter(|row| row.op == ComparisonOp::Ge)
            .count();
        let identity_slacks = inequalities.len() - slacks;
        let (num_inequalities, num_equalities) = (inequalities.len(), equalities.len());

        let rows = inequalities.into_iter().chain(equalities).collect_vec();
        let structure = StructureDescriptor::new(
            positive_parts,
            negative_parts,
            num_inequalities,
            num_equalities,
            slacks,
            identity_slacks,
        )?
        .with_constraint_map(rows.iter().map(|row| row.origin).collect())?
        .with_negated(rows.iter().map(|row| row.negated).collect())?;

        let mut origins = vec![ColumnOrigin::Positive(Variable(0)); structure.columns()];
        let mut form = StandardForm::new(structure.clone());
        let mut objective_offset = 0.0;
        for (k, columns) in variables.iter().enumerate() {
            let cost = self.obj_coeffs[k];
            objective_offset += cost * columns.offset;
            let integer = self.integer[k] && is_integral(columns.offset, 1e-9);
            if let Some(p) = columns.positive {
                let upper = if self.var_mins[k].is_finite() {
                    self.var_maxs[k] - self.var_mins[k]
                } else {
                    f64::INFINITY
                };
                form.set_bounds(p, 0.0, upper)?;
                form.set_objective(p, cost)?;
                form.set_integer(p, integer)?;
                origins[p] = ColumnOrigin::Positive(Variable(k));
            }
            if let Some(q) = columns.negative {
                form.set_objective(q, -cost)?;
                form.set_integer(q, integer)?;
                origins[q] = ColumnOrigin::Negative(Variable(k));
            }
        }

        let mut slack = structure.slack_range().start;
        let mut identity_slack = structure.identity_slack_range().start;
        let mut artificial = structure.artificial_range().start;
        let mut constraint_rows = vec![0; self.constraints.len()];
        for (i, row) in rows.iter().enumerate() {
            constraint_rows[row.origin] = i;
            for &(column, coeff) in &row.terms {
                form.set_constraint_body(i, column, coeff)?;
            }
            form.set_constraint_rhs(i, row.rhs)?;
            let constraint = Constraint(row.origin);
            match row.op {
                ComparisonOp::Le => {
                    form.set_constraint_body(i, identity_slack, 1.0)?;
                    origins[identity_slack] = ColumnOrigin::Slack(constraint);
                    identity_slack += 1;
                }
                ComparisonOp::Ge => {
                    form.set_constraint_body(i, slack, -1.0)?;
                    origins[slack] = ColumnOrigin::Slack(constraint);
                    slack += 1;
                    origins[artificial] = ColumnOrigin::Artificial(constraint);
                    artificial += 1;
                }
                ComparisonOp::Eq => {
                    origins[artificial] = ColumnOrigin::Artificial(constraint);
                    artificial += 1;
                }
            }
        }

        Ok(Translation {
            form,
            variables,
            rows: constraint_rows,
            origins,
            objective_offset,
        })
    }
}

/// A solution of a problem: the state of the solve, the objective function value, variable
/// values and constraint duals.
///
/// The solver is kept alive so that cut candidates can be derived from its final basis.
pub struct Solution {
    direction: OptimisationDirection,
    state: SolveState,
    objective: f64,
    values: Vec<f64>,
    duals: Vec<f64>,
    iterations: usize,
    integer: Vec<bool>,
    origins: Vec<ColumnOrigin>,
    solver: Box<dyn Solver>,
}

impl std::fmt::Debug for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only printing lengths here because actual data is probably huge.
        f.debug_struct("Solution")
            .field("direction", &self.direction)
            .field("state", &self.state)
            .field("num_vars", &self.values.len())
            .field("num_constraints", &self.duals.len())
            .field("objective", &self.objective)
            .finish()
    }
}

impl Solution {
    /// Terminal state of the solve. Values are only meaningful for feasible states.
    pub fn state(&self) -> SolveState {
        self.state
    }

    /// Value of the objective function, in the direction of the problem.
    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// Value of the variable.
    ///
    /// Note that you can use indexing operations to get variable values.
    pub fn var_value(&self, var: Variable) -> f64 {
        self.values[var.0]
    }

    /// Shadow price of the constraint: the change of the objective per unit increase of its
    /// right-hand side.
    pub fn dual(&self, constraint: Constraint) -> f64 {
        self.duals[constraint.0]
    }

    /// Number of pivots the solver performed.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Iterate over the variable-value pairs of the solution.
    pub fn iter(&self) -> SolutionIter<'_> {
        SolutionIter {
            solution: self,
            var_idx: 0,
        }
    }

    /// [Gomory mixed-integer cuts](https://en.wikipedia.org/wiki/Cutting-plane_method#Gomory's_cut)
    /// from the final basis, over solver-space columns.
    ///
    /// Use [`column_origin`](#method.column_origin) to relate the columns of a cut to the
    /// problem. Rows whose fractional part is below `threshold` are skipped.
    pub fn cut_candidates(&mut self, threshold: f64) -> Vec<Cut> {
        self.solver.generate_cut_candidates(threshold, &self.integer)
    }

    /// What the solver-space column stands for, or `None` if there is no such column.
    pub fn column_origin(&self, column: usize) -> Option<ColumnOrigin> {
        self.origins.get(column).copied()
    }
}

impl std::ops::Index<Variable> for Solution {
    type Output = f64;

    fn index(&self, var: Variable) -> &Self::Output {
        &self.values[var.0]
    }
}

/// An iterator over the variable-value pairs of a [`Solution`].
#[derive(Debug, Clone)]
pub struct SolutionIter<'a> {
    solution: &'a Solution,
    var_idx: usize,
}

impl<'a> Iterator for SolutionIter<'a> {
    type Item = (Variable, &'a f64);

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.solution.values.get(self.var_idx)?;
        let var = Variable(self.var_idx);
        self.var_idx += 1;
        Some((var, value))
    }
}

impl<'a> IntoIterator for &'a Solution {
    type Item = (Variable, &'a f64);
    type IntoIter = SolutionIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
