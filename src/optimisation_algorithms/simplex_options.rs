use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Which solving strategy drives the pivot engine.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Primal iterations only; the starting basis must be primal feasible.
    Primal,
    /// Dual iterations only; the starting basis must be dual feasible.
    Dual,
    /// Dual iterations until primal feasible, then primal iterations.
    #[default]
    Phased,
    /// Primal iterations on a sum-of-infeasibilities objective, then on the true objective.
    TwoPhase,
}

/// Whether the working state keeps an explicit tableau or only a basis inverse.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Representation {
    #[default]
    Auto,
    Tableau,
    Revised,
}

/// Storage of an explicit tableau.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TableauChoice {
    #[default]
    Auto,
    Sparse,
    Dense,
}

/// Representation of the basis inverse in the revised store.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InverseChoice {
    /// LU decomposition with an update file.
    #[default]
    Factorised,
    /// Product of elementary eta factors.
    ProductForm,
}

/// Options of a simplex solve. They are cloned into each solver and never change during a solve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplexOptions {
    pub strategy: Strategy,
    pub representation: Representation,
    pub tableau: TableauChoice,
    pub inverse: InverseChoice,
    /// Problems with more variables or constraints than this use the revised (or sparse) store.
    pub size_threshold: usize,
    pub iteration_limit: usize,

    /// Largest bound violation of a basic variable that still counts as feasible.
    pub feasibility_tolerance: f64,
    /// Largest wrongly-signed reduced cost that still counts as optimal.
    pub optimality_tolerance: f64,
    /// Smallest magnitude of an admissible pivot element.
    pub pivot_tolerance: f64,
    /// Relaxation of the bounds in the first pass of the ratio tests.
    pub ratio_tolerance: f64,
    /// Relative difference under which pricing scores count as tied.
    pub tie_break_tolerance: f64,
    /// Fill-in below this magnitude is dropped from sparse rows.
    pub drop_tolerance: f64,
    /// Smallest absolute pivot of an incremental basis inverse update.
    pub update_pivot_threshold: f64,
    /// Smallest pivot of an incremental update relative to the largest entry of its column.
    pub update_relative_threshold: f64,
    /// Incremental updates after which the basis inverse is rebuilt.
    pub refactor_frequency: usize,

    pub steepest_edge: bool,
    /// Re-check feasibility and partition consistency after every pivot (expensive).
    pub validate: bool,
    /// Consecutive degenerate pivots after which the legacy solver switches to Bland's rule.
    pub bland_after: usize,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            representation: Representation::default(),
            tableau: TableauChoice::default(),
            inverse: InverseChoice::default(),
            size_threshold: 2000,
            iteration_limit: 50_000,
            feasibility_tolerance: 1e-7,
            optimality_tolerance: 1e-7,
            pivot_tolerance: 1e-9,
            ratio_tolerance: 1e-9,
            tie_break_tolerance: 1e-9,
            drop_tolerance: 1e-12,
            update_pivot_threshold: 1e-8,
            update_relative_threshold: 1e-7,
            refactor_frequency: 100,
            steepest_edge: true,
            validate: false,
            bland_after: 50,
        }
    }
}

impl SimplexOptions {
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }

    pub fn with_tableau(mut self, tableau: TableauChoice) -> Self {
        self.tableau = tableau;
        self
    }

    pub fn with_inverse(mut self, inverse: InverseChoice) -> Self {
        self.inverse = inverse;
        self
    }

    pub fn with_iteration_limit(mut self, iteration_limit: usize) -> Self {
        self.iteration_limit = iteration_limit;
        self
    }

    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Whether a problem of this shape counts as large.
    pub fn is_large(&self, variables: usize, constraints: usize) -> bool {
        variables.max(constraints) > self.size_threshold
    }

    /// Resolves `Representation::Auto` by problem size.
    pub fn use_revised(&self, variables: usize, constraints: usize) -> bool {
        match self.representation {
            Representation::Auto => self.is_large(variables, constraints),
            Representation::Tableau => false,
            Representation::Revised => true,
        }
    }

    /// Resolves `TableauChoice::Auto` by problem size.
    pub fn use_sparse_tableau(&self, variables: usize, constraints: usize) -> bool {
        match self.tableau {
            TableauChoice::Auto => self.is_large(variables, constraints),
            TableauChoice::Sparse => true,
            TableauChoice::Dense => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn parse_choices() {
        assert_eq!(TableauChoice::from_str("sparse").unwrap(), TableauChoice::Sparse);
        assert_eq!(TableauChoice::from_str("dense").unwrap(), TableauChoice::Dense);
        assert_eq!(TableauChoice::from_str("auto").unwrap(), TableauChoice::Auto);
        assert!(TableauChoice::from_str("dens").is_err());
        assert_eq!(Strategy::from_str("two_phase").unwrap(), Strategy::TwoPhase);
        assert_eq!(
            InverseChoice::from_str("product_form").unwrap(),
            InverseChoice::ProductForm
        );
        assert_eq!(Representation::Revised.to_string(), "revised");
    }

    #[test]
    fn partial_json() {
        let options: SimplexOptions =
            serde_json::from_str(r#"{"tableau": "sparse", "iteration_limit": 10, "validate": true}"#)
                .unwrap();
        assert_eq!(options.tableau, TableauChoice::Sparse);
        assert_eq!(options.iteration_limit, 10);
        assert!(options.validate);
        assert_eq!(options.size_threshold, 2000);
        assert_eq!(options.strategy, Strategy::Phased);

        let json = serde_json::to_string(&options).unwrap();
        let back: SimplexOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
    }

    #[test]
    fn size_selection() {
        let options = SimplexOptions::default();
        assert!(!options.use_revised(2000, 10));
        assert!(options.use_revised(2001, 10));
        assert!(options.use_revised(3, 2500));
        assert!(!options.use_sparse_tableau(10, 10));

        let options = options
            .with_representation(Representation::Tableau)
            .with_tableau(TableauChoice::Sparse);
        assert!(!options.use_revised(5000, 5000));
        assert!(options.use_sparse_tableau(1, 1));
    }
}
