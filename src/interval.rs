//! Truth bounds: closed sub-intervals of [0, 1].
//!
//! An [`Interval`] is the annotation carried by every atom. Reasoning only
//! ever *tightens* intervals (intersection) except when a contradiction is
//! resolved by resetting an atom to [`Interval::unknown`].
//!
//! Single-valued annotations are the degenerate case `lower == upper`; they go
//! through the same code path via [`Interval::point`].

use serde::{Deserialize, Serialize};

use crate::error::IntervalError;

/// Result type for interval operations.
pub type IntervalResult<T> = std::result::Result<T, IntervalError>;

/// A closed truth interval `[lower, upper] ⊆ [0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f64, f64)", into = "(f64, f64)")]
pub struct Interval {
    lower: f64,
    upper: f64,
}

impl Interval {
    /// Certain truth `[1, 1]`.
    pub const TRUE: Interval = Interval {
        lower: 1.0,
        upper: 1.0,
    };

    /// Certain falsity `[0, 0]`.
    pub const FALSE: Interval = Interval {
        lower: 0.0,
        upper: 0.0,
    };

    /// Create a validated interval.
    pub fn new(lower: f64, upper: f64) -> IntervalResult<Self> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(lower) || !in_unit(upper) || lower > upper {
            return Err(IntervalError::OutOfRange { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    /// The full unknown interval `[0, 1]`.
    pub const fn unknown() -> Self {
        Self {
            lower: 0.0,
            upper: 1.0,
        }
    }

    /// A degenerate single-value interval `[v, v]`.
    pub fn point(value: f64) -> IntervalResult<Self> {
        Self::new(value, value)
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Intersect two intervals, failing when they do not overlap.
    pub fn intersect(&self, other: &Interval) -> IntervalResult<Interval> {
        let lower = self.lower.max(other.lower);
        let upper = self.upper.min(other.upper);
        if lower > upper {
            return Err(IntervalError::EmptyIntersection {
                left_lower: self.lower,
                left_upper: self.upper,
                right_lower: other.lower,
                right_upper: other.upper,
            });
        }
        Ok(Interval { lower, upper })
    }

    /// Whether the two intervals share at least one value.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.lower.max(other.lower) <= self.upper.min(other.upper)
    }

    /// `self ⊆ other`.
    pub fn is_subset_of(&self, other: &Interval) -> bool {
        self.lower >= other.lower && self.upper <= other.upper
    }

    /// The lower bound has reached `true_threshold`.
    pub fn is_true(&self, true_threshold: f64) -> bool {
        self.lower >= true_threshold
    }

    /// The upper bound has dropped to `false_threshold`.
    pub fn is_false(&self, false_threshold: f64) -> bool {
        self.upper <= false_threshold
    }

    pub fn is_unknown(&self) -> bool {
        self.lower == 0.0 && self.upper == 1.0
    }

    /// Single-valued interval.
    pub fn is_point(&self) -> bool {
        self.lower == self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Largest movement of either bound between `previous` and `self`.
    pub fn distance_from(&self, previous: &Interval) -> f64 {
        (self.lower - previous.lower)
            .abs()
            .max((previous.upper - self.upper).abs())
    }

    /// Bit-exact key, used to deduplicate identical annotations.
    pub fn bits(&self) -> (u64, u64) {
        (self.lower.to_bits(), self.upper.to_bits())
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::unknown()
    }
}

impl TryFrom<(f64, f64)> for Interval {
    type Error = IntervalError;

    fn try_from((lower, upper): (f64, f64)) -> IntervalResult<Self> {
        Self::new(lower, upper)
    }
}

impl From<Interval> for (f64, f64) {
    fn from(i: Interval) -> Self {
        (i.lower, i.upper)
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(l: f64, u: f64) -> Interval {
        Interval::new(l, u).unwrap()
    }

    #[test]
    fn rejects_out_of_range_bounds() {
        assert!(Interval::new(-0.1, 0.5).is_err());
        assert!(Interval::new(0.2, 1.1).is_err());
        assert!(Interval::new(0.7, 0.3).is_err());
        assert!(Interval::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn intersection_tightens() {
        let tightened = iv(0.2, 0.9).intersect(&iv(0.5, 1.0)).unwrap();
        assert_eq!(tightened, iv(0.5, 0.9));
    }

    #[test]
    fn disjoint_intersection_fails() {
        let err = Interval::TRUE.intersect(&Interval::FALSE).unwrap_err();
        assert!(matches!(err, IntervalError::EmptyIntersection { .. }));
    }

    #[test]
    fn truth_predicates() {
        assert!(Interval::TRUE.is_true(1.0));
        assert!(!iv(0.6, 1.0).is_true(1.0));
        assert!(iv(0.6, 1.0).is_true(0.5));
        assert!(Interval::FALSE.is_false(0.0));
        assert!(Interval::unknown().is_unknown());
        assert!(Interval::point(0.3).unwrap().is_point());
    }

    #[test]
    fn distance_is_largest_bound_movement() {
        let before = Interval::unknown();
        let after = iv(0.25, 0.5);
        assert_eq!(after.distance_from(&before), 0.5);
    }

    #[test]
    fn serde_round_trips_as_pair() {
        let json = serde_json::to_string(&iv(0.25, 0.75)).unwrap();
        assert_eq!(json, "[0.25,0.75]");
        let back: Interval = serde_json::from_str(&json).unwrap();
        assert_eq!(back, iv(0.25, 0.75));
        assert!(serde_json::from_str::<Interval>("[0.9,0.1]").is_err());
    }
}
