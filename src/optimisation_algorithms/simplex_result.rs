use strum_macros::{Display, EnumIter, IntoStaticStr};

/// Terminal (or interrupted) state of a simplex solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SolveState {
    /// Primal and dual feasible basis found.
    Optimal,
    /// Primal feasible basis found, but the iteration limit was hit before optimality.
    Feasible,
    /// No point satisfies the constraints and bounds.
    Infeasible,
    /// The objective decreases without bound along a feasible ray.
    Unbounded,
    /// A post-condition of the chosen strategy did not hold, or the numerics broke down.
    Failed,
    /// Not solved yet, or interrupted before a feasible basis was reached.
    Unexplored,
}

impl SolveState {
    pub fn is_feasible(&self) -> bool {
        matches!(self, SolveState::Optimal | SolveState::Feasible)
    }
}

/// Outcome of a solve in solver space.
#[derive(Clone, Debug)]
pub struct SolveResult {
    pub state: SolveState,
    /// Objective value of `solution` under the original costs.
    pub value: f64,
    /// One entry per solver-space variable (artificials excluded), de-shifted.
    pub solution: Vec<f64>,
    /// One multiplier per constraint row, corrected for negated rows.
    pub duals: Vec<f64>,
    pub iterations: usize,
}

/// Errors raised while building or setting up a problem.
///
/// Infeasibility and unboundedness are not errors; they are reported through [`SolveState`].
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// A column has a lower bound above its upper bound.
    InvalidBounds { column: usize, lower: f64, upper: f64 },
    /// Two arrays that must agree in length do not.
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// An index is outside the declared dimensions.
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },
    /// The structure descriptor or the data written through it is inconsistent.
    InvalidStructure(String),
    /// The input uses a feature the chosen solver does not handle.
    Unsupported(String),
    /// A factorization could not be computed.
    Numerical(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::InvalidBounds {
                column,
                lower,
                upper,
            } => write!(
                f,
                "column {} has lower bound {} above its upper bound {}",
                column, lower, upper
            ),
            Error::DimensionMismatch {
                what,
                expected,
                found,
            } => write!(f, "{} has length {}, expected {}", what, found, expected),
            Error::IndexOutOfRange { what, index, len } => {
                write!(f, "{} index {} is out of range (len {})", what, index, len)
            }
            Error::InvalidStructure(msg) => write!(f, "invalid structure: {}", msg),
            Error::Unsupported(msg) => write!(f, "unsupported: {}", msg),
            Error::Numerical(msg) => write!(f, "numerical failure: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Numerical(format!("{:#}", value))
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn state_names() {
        let names = SolveState::iter()
            .map(|state| state.to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "OPTIMAL",
                "FEASIBLE",
                "INFEASIBLE",
                "UNBOUNDED",
                "FAILED",
                "UNEXPLORED"
            ]
        );
        let name: &'static str = SolveState::Infeasible.into();
        assert_eq!(name, "INFEASIBLE");
        assert!(SolveState::Feasible.is_feasible());
        assert!(!SolveState::Unexplored.is_feasible());
    }

    #[test]
    fn numerical_errors_keep_context() {
        let err = anyhow::anyhow!("pivot 0 is zero").context("factorising basis");
        let err: Error = err.into();
        assert_eq!(
            err,
            Error::Numerical("factorising basis: pivot 0 is zero".to_string())
        );
    }
}
