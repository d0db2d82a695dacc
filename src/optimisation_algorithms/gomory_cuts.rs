use itertools::Itertools;

use crate::optimisation_algorithms::linear_programming_helpers::is_integral;

/// A non-negative non-basic variable `y` of a tableau row `x_B + Σ a·y = b`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RowTerm {
    pub index: usize,
    pub coefficient: f64,
    pub integer: bool,
}

/// A non-basic column of a tableau row, with the bound it currently sits at.
///
/// `coefficient` refers to the distance `y` from that bound: `y = x - bound` at a lower bound and
/// `y = bound - x` at an upper bound.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundedTerm {
    pub column: usize,
    pub coefficient: f64,
    pub at_upper: bool,
    pub bound: f64,
    pub integer: bool,
}

/// The inequality `Σ coefficient·x ≥ rhs`.
#[derive(Clone, Debug, PartialEq)]
pub struct Cut {
    /// Basic variable of the row the cut was derived from.
    pub basic_variable: usize,
    pub coefficients: Vec<(usize, f64)>,
    pub rhs: f64,
}

impl Cut {
    pub fn lhs(&self, x: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .map(|&(index, coefficient)| coefficient * x[index])
            .sum()
    }

    /// How far `x` is from satisfying the cut; positive when violated.
    pub fn violation(&self, x: &[f64]) -> f64 {
        self.rhs - self.lhs(x)
    }

    pub fn is_satisfied(&self, x: &[f64], tolerance: f64) -> bool {
        self.violation(x) <= tolerance
    }
}

fn fractional_part(value: f64) -> f64 {
    value - value.floor()
}

/// Fractional parts closer than this to 0 or 1 count as integral.
const FRACTION_EPSILON: f64 = 1e-9;

/// Gomory mixed-integer cut `Σ π·y ≥ 1` from the row `x_B + Σ a·y = rhs` with `x_B` integer.
///
/// Returns `None` when the fractional part of `rhs` is below `threshold` (or above
/// `1 - threshold`). The coefficients are indexed like the terms.
pub fn gomory_mixed_integer_cut(
    basic_variable: usize,
    rhs: f64,
    terms: &[RowTerm],
    threshold: f64,
) -> Option<Cut> {
    let f0 = fractional_part(rhs);
    if f0 < threshold || f0 > 1.0 - threshold {
        return None;
    }

    let coefficients = terms
        .iter()
        .filter_map(|term| {
            let a = term.coefficient;
            let pi = if term.integer {
                let fj = fractional_part(a);
                if fj < FRACTION_EPSILON || fj > 1.0 - FRACTION_EPSILON {
                    return None;
                }
                if fj <= f0 {
                    fj / f0
                } else {
                    (1.0 - fj) / (1.0 - f0)
                }
            } else if a >= 0.0 {
                a / f0
            } else {
                -a / (1.0 - f0)
            };
            (pi > 0.0).then_some((term.index, pi))
        })
        .collect_vec();

    Some(Cut {
        basic_variable,
        coefficients,
        rhs: 1.0,
    })
}

/// Gomory mixed-integer cut for a row over bounded variables, expressed in the variables
/// themselves.
///
/// `value` is the current value of the basic variable. A term only counts as integer when its
/// variable is integer and its bound is integral, since `y` is otherwise not integral. Terms on
/// the same column are merged.
pub fn bounded_gomory_mixed_integer_cut(
    basic_variable: usize,
    value: f64,
    terms: &[BoundedTerm],
    threshold: f64,
    integrality_tolerance: f64,
) -> Option<Cut> {
    let row = terms
        .iter()
        .enumerate()
        .map(|(index, term)| RowTerm {
            index,
            coefficient: term.coefficient,
            integer: term.integer && is_integral(term.bound, integrality_tolerance),
        })
        .collect_vec();
    let in_distances = gomory_mixed_integer_cut(basic_variable, value, &row, threshold)?;

    let mut rhs = in_distances.rhs;
    let mut coefficients = vec![];
    for (index, pi) in in_distances.coefficients {
        let term = &terms[index];
        if term.at_upper {
            coefficients.push((term.column, -pi));
            rhs -= pi * term.bound;
        } else {
            coefficients.push((term.column, pi));
            rhs += pi * term.bound;
        }
    }
    let coefficients = coefficients
        .into_iter()
        .into_group_map()
        .into_iter()
        .map(|(column, values)| (column, values.into_iter().sum::<f64>()))
        .filter(|&(_, coefficient)| coefficient != 0.0)
        .sorted_by_key(|&(column, _)| column)
        .collect_vec();

    Some(Cut {
        basic_variable,
        coefficients,
        rhs,
    })
}
