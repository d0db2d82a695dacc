use std::ops::Range;

use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::optimisation_algorithms::simplex_result::Error;

pub(crate) type CsMat = sprs::CsMatI<f64, usize>;

/// Shape of a problem in solver space.
///
/// Columns are laid out as `[positive parts | negative parts | slacks | identity slacks | artificials]`.
/// Every solver-space variable is non-negative in the model translation; a free model variable
/// becomes a positive and a negative part.
#[derive(Clone, Debug, PartialEq)]
pub struct StructureDescriptor {
    positive_parts: usize,
    negative_parts: usize,
    inequalities: usize,
    equalities: usize,
    slacks: usize,
    identity_slacks: usize,
    constraint_map: Vec<usize>,
    negated: Vec<bool>,
}

impl StructureDescriptor {
    pub fn new(
        positive_parts: usize,
        negative_parts: usize,
        inequalities: usize,
        equalities: usize,
        slacks: usize,
        identity_slacks: usize,
    ) -> Result<Self, Error> {
        let constraints = inequalities + equalities;
        if identity_slacks > constraints {
            return Err(Error::InvalidStructure(format!(
                "{} identity slacks for {} constraints",
                identity_slacks, constraints
            )));
        }
        if slacks + identity_slacks > inequalities {
            return Err(Error::InvalidStructure(format!(
                "{} slacks for {} inequalities",
                slacks + identity_slacks,
                inequalities
            )));
        }
        Ok(Self {
            positive_parts,
            negative_parts,
            inequalities,
            equalities,
            slacks,
            identity_slacks,
            constraint_map: (0..constraints).collect(),
            negated: vec![false; constraints],
        })
    }

    /// Maps each constraint row to the model entity it reports to.
    pub fn with_constraint_map(mut self, constraint_map: Vec<usize>) -> Result<Self, Error> {
        if constraint_map.len() != self.constraints() {
            return Err(Error::DimensionMismatch {
                what: "constraint map",
                expected: self.constraints(),
                found: constraint_map.len(),
            });
        }
        self.constraint_map = constraint_map;
        Ok(self)
    }

    /// Marks the rows that were multiplied by -1 to make their right-hand side non-negative.
    pub fn with_negated(mut self, negated: Vec<bool>) -> Result<Self, Error> {
        if negated.len() != self.constraints() {
            return Err(Error::DimensionMismatch {
                what: "negation flags",
                expected: self.constraints(),
                found: negated.len(),
            });
        }
        self.negated = negated;
        Ok(self)
    }

    pub fn positive_parts(&self) -> usize {
        self.positive_parts
    }

    pub fn negative_parts(&self) -> usize {
        self.negative_parts
    }

    pub fn structurals(&self) -> usize {
        self.positive_parts + self.negative_parts
    }

    pub fn inequalities(&self) -> usize {
        self.inequalities
    }

    pub fn equalities(&self) -> usize {
        self.equalities
    }

    pub fn constraints(&self) -> usize {
        self.inequalities + self.equalities
    }

    pub fn slacks(&self) -> usize {
        self.slacks
    }

    pub fn identity_slacks(&self) -> usize {
        self.identity_slacks
    }

    /// Solver-space variables, artificials excluded.
    pub fn variables(&self) -> usize {
        self.positive_parts + self.negative_parts + self.slacks + self.identity_slacks
    }

    pub fn artificials(&self) -> usize {
        self.constraints() - self.identity_slacks
    }

    /// All columns of the working state, artificials included.
    pub fn columns(&self) -> usize {
        self.variables() + self.artificials()
    }

    pub fn positive_range(&self) -> Range<usize> {
        0..self.positive_parts
    }

    pub fn negative_range(&self) -> Range<usize> {
        self.positive_parts..self.structurals()
    }

    pub fn slack_range(&self) -> Range<usize> {
        self.structurals()..self.structurals() + self.slacks
    }

    pub fn identity_slack_range(&self) -> Range<usize> {
        self.structurals() + self.slacks..self.variables()
    }

    pub fn artificial_range(&self) -> Range<usize> {
        self.variables()..self.columns()
    }

    pub fn is_artificial(&self, column: usize) -> bool {
        column >= self.variables()
    }

    pub fn is_negated(&self, row: usize) -> bool {
        self.negated[row]
    }

    pub fn constraint_origin(&self, row: usize) -> usize {
        self.constraint_map[row]
    }
}

/// A problem in standard computational form, written through setters before a store is built.
///
/// Bounds default to `[0, +inf)` and objective coefficients to zero.
#[derive(Clone, Debug)]
pub struct StandardForm {
    structure: StructureDescriptor,
    body: FxHashMap<(usize, usize), f64>,
    rhs: Vec<f64>,
    objective: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    integer: Vec<bool>,
    basis: Option<Vec<usize>>,
}

impl StandardForm {
    pub fn new(structure: StructureDescriptor) -> Self {
        let m = structure.constraints();
        let n = structure.variables();
        Self {
            structure,
            body: FxHashMap::default(),
            rhs: vec![0.0; m],
            objective: vec![0.0; n],
            lower: vec![0.0; n],
            upper: vec![f64::INFINITY; n],
            integer: vec![false; n],
            basis: None,
        }
    }

    pub fn structure(&self) -> &StructureDescriptor {
        &self.structure
    }

    fn check_row(&self, row: usize) -> Result<(), Error> {
        if row >= self.structure.constraints() {
            return Err(Error::IndexOutOfRange {
                what: "row",
                index: row,
                len: self.structure.constraints(),
            });
        }
        Ok(())
    }

    fn check_column(&self, column: usize) -> Result<(), Error> {
        if column >= self.structure.variables() {
            return Err(Error::IndexOutOfRange {
                what: "column",
                index: column,
                len: self.structure.variables(),
            });
        }
        Ok(())
    }

    /// Sets (not adds) the coefficient of `column` in `row`.
    pub fn set_constraint_body(&mut self, row: usize, column: usize, value: f64) -> Result<(), Error> {
        self.check_row(row)?;
        self.check_column(column)?;
        if value == 0.0 {
            self.body.remove(&(row, column));
        } else {
            self.body.insert((row, column), value);
        }
        Ok(())
    }

    pub fn set_constraint_rhs(&mut self, row: usize, value: f64) -> Result<(), Error> {
        self.check_row(row)?;
        self.rhs[row] = value;
        Ok(())
    }

    pub fn set_objective(&mut self, column: usize, value: f64) -> Result<(), Error> {
        self.check_column(column)?;
        self.objective[column] = value;
        Ok(())
    }

    /// Bound order is not checked here but when a solve is set up.
    pub fn set_bounds(&mut self, column: usize, lower: f64, upper: f64) -> Result<(), Error> {
        self.check_column(column)?;
        self.lower[column] = lower;
        self.upper[column] = upper;
        Ok(())
    }

    pub fn set_integer(&mut self, column: usize, integer: bool) -> Result<(), Error> {
        self.check_column(column)?;
        self.integer[column] = integer;
        Ok(())
    }

    /// Seeds the initial basis: one column per row, artificial columns included.
    pub fn set_basis(&mut self, basis: Vec<usize>) -> Result<(), Error> {
        if basis.len() != self.structure.constraints() {
            return Err(Error::DimensionMismatch {
                what: "basis",
                expected: self.structure.constraints(),
                found: basis.len(),
            });
        }
        if let Some(&column) = basis.iter().find(|&&c| c >= self.structure.columns()) {
            return Err(Error::IndexOutOfRange {
                what: "basis column",
                index: column,
                len: self.structure.columns(),
            });
        }
        if !basis.iter().all_unique() {
            return Err(Error::InvalidStructure(
                "basis contains a column twice".to_string(),
            ));
        }
        self.basis = Some(basis);
        Ok(())
    }

    pub fn constraint_body(&self, row: usize, column: usize) -> f64 {
        self.body.get(&(row, column)).copied().unwrap_or(0.0)
    }

    pub fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    pub fn objective(&self) -> &[f64] {
        &self.objective
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn integer(&self) -> &[bool] {
        &self.integer
    }

    pub fn basis(&self) -> Option<&[usize]> {
        self.basis.as_deref()
    }

    /// Appends one artificial column per row that lacks an identity slack and resolves the
    /// initial basis.
    pub(crate) fn expand(&self) -> Result<ExpandedForm, Error> {
        let structure = self.structure.clone();
        let m = structure.constraints();
        let n = structure.columns();

        let mut columns: Vec<Vec<(usize, f64)>> = vec![vec![]; structure.variables()];
        for (&(row, column), &value) in &self.body {
            columns[column].push((row, value));
        }

        let mut unit_columns: Vec<Option<usize>> = vec![None; m];
        for column in structure.identity_slack_range() {
            let entries = &columns[column];
            if entries.len() != 1 || (entries[0].1 - 1.0).abs() > 1e-12 {
                return Err(Error::InvalidStructure(format!(
                    "identity slack {} is not a unit column",
                    column
                )));
            }
            let row = entries[0].0;
            if unit_columns[row].replace(column).is_some() {
                return Err(Error::InvalidStructure(format!(
                    "row {} has two identity slacks",
                    row
                )));
            }
        }

        let mut triplets = sprs::TriMat::new((m, n));
        for (column, entries) in columns.iter().enumerate() {
            for &(row, value) in entries {
                triplets.add_triplet(row, column, value);
            }
        }
        let mut artificial = structure.variables();
        for (row, unit) in unit_columns.iter_mut().enumerate() {
            if unit.is_none() {
                triplets.add_triplet(row, artificial, 1.0);
                *unit = Some(artificial);
                artificial += 1;
            }
        }
        debug_assert_eq!(artificial, n);
        let matrix: CsMat = triplets.to_csc();
        let unit_columns = unit_columns.into_iter().flatten().collect_vec();

        let mut costs = self.objective.clone();
        costs.resize(n, 0.0);
        let mut lower = self.lower.clone();
        lower.resize(n, 0.0);
        let mut upper = self.upper.clone();
        upper.resize(n, 0.0);
        let mut integer = self.integer.clone();
        integer.resize(n, false);

        let basis = match &self.basis {
            Some(basis) => basis.clone(),
            None => unit_columns.clone(),
        };

        Ok(ExpandedForm {
            structure,
            matrix,
            rhs: self.rhs.clone(),
            costs,
            lower,
            upper,
            integer,
            unit_columns,
            basis,
        })
    }
}

/// A standard form with its artificial columns in place, ready to be turned into a store.
#[derive(Clone, Debug)]
pub(crate) struct ExpandedForm {
    pub(crate) structure: StructureDescriptor,
    /// Constraint matrix over all columns, artificials included.
    pub(crate) matrix: CsMat,
    pub(crate) rhs: Vec<f64>,
    pub(crate) costs: Vec<f64>,
    pub(crate) lower: Vec<f64>,
    pub(crate) upper: Vec<f64>,
    pub(crate) integer: Vec<bool>,
    /// For each row, the column that is a unit vector on that row.
    pub(crate) unit_columns: Vec<usize>,
    pub(crate) basis: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts() {
        let structure = StructureDescriptor::new(3, 1, 2, 1, 1, 1).unwrap();
        assert_eq!(structure.variables(), 6);
        assert_eq!(structure.constraints(), 3);
        assert_eq!(structure.artificials(), 2);
        assert_eq!(structure.columns(), 8);
        assert_eq!(structure.positive_range(), 0..3);
        assert_eq!(structure.negative_range(), 3..4);
        assert_eq!(structure.slack_range(), 4..5);
        assert_eq!(structure.identity_slack_range(), 5..6);
        assert_eq!(structure.artificial_range(), 6..8);
        assert!(structure.is_artificial(6));
        assert!(!structure.is_artificial(5));
    }

    #[test]
    fn rejects_inconsistent_counts() {
        assert!(StructureDescriptor::new(1, 0, 1, 0, 1, 1).is_err());
        assert!(StructureDescriptor::new(1, 0, 0, 1, 0, 2).is_err());
        let structure = StructureDescriptor::new(1, 0, 1, 1, 0, 1).unwrap();
        assert!(structure.clone().with_negated(vec![true]).is_err());
        let structure = structure.with_negated(vec![false, true]).unwrap();
        assert!(structure.is_negated(1));
    }

    #[test]
    fn expand_adds_artificials() {
        // x + y + s = 4 (s identity), x - y = 1
        let structure = StructureDescriptor::new(2, 0, 1, 1, 0, 1).unwrap();
        let mut form = StandardForm::new(structure);
        form.set_constraint_body(0, 0, 1.0).unwrap();
        form.set_constraint_body(0, 1, 1.0).unwrap();
        form.set_constraint_body(0, 2, 1.0).unwrap();
        form.set_constraint_body(1, 0, 1.0).unwrap();
        form.set_constraint_body(1, 1, -2.0).unwrap();
        form.set_constraint_body(1, 1, -1.0).unwrap();
        form.set_constraint_rhs(0, 4.0).unwrap();
        form.set_constraint_rhs(1, 1.0).unwrap();
        assert_eq!(form.constraint_body(1, 1), -1.0);

        let expanded = form.expand().unwrap();
        assert_eq!(expanded.unit_columns, vec![2, 3]);
        assert_eq!(expanded.basis, vec![2, 3]);
        assert_eq!(expanded.matrix.rows(), 2);
        assert_eq!(expanded.matrix.cols(), 4);
        assert_eq!(expanded.matrix.nnz(), 6);
        assert_eq!(expanded.lower[3], 0.0);
        assert_eq!(expanded.upper[3], 0.0);
        assert_eq!(expanded.upper[0], f64::INFINITY);
    }

    #[test]
    fn expand_rejects_non_unit_identity() {
        let structure = StructureDescriptor::new(1, 0, 1, 0, 0, 1).unwrap();
        let mut form = StandardForm::new(structure);
        form.set_constraint_body(0, 0, 1.0).unwrap();
        form.set_constraint_body(0, 1, 2.0).unwrap();
        assert!(matches!(form.expand(), Err(Error::InvalidStructure(_))));
    }

    #[test]
    fn setters_check_indices() {
        let structure = StructureDescriptor::new(1, 0, 1, 0, 0, 1).unwrap();
        let mut form = StandardForm::new(structure);
        assert!(form.set_constraint_body(1, 0, 1.0).is_err());
        assert!(form.set_objective(2, 1.0).is_err());
        assert!(form.set_basis(vec![0, 1]).is_err());
        assert!(form.set_basis(vec![1]).is_ok());
        assert_eq!(form.basis(), Some(&[1][..]));
        assert!(form.set_basis(vec![2]).is_err());
    }
}
