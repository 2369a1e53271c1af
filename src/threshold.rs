//! Quantifier thresholds for rule clauses.
//!
//! A [`Threshold`] decides how many (or what fraction) of a clause's
//! groundings must be qualified for the clause to hold for one head
//! assignment. The default, `>= 1 number total`, is plain existential
//! semantics.

use serde::{Deserialize, Serialize};

use crate::error::RuleError;

/// Comparison applied between the observed count/ratio and the target value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOp {
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Equal,
}

impl ThresholdOp {
    fn compare(self, observed: f64, target: f64) -> bool {
        match self {
            Self::Greater => observed > target,
            Self::GreaterEqual => observed >= target,
            Self::Less => observed < target,
            Self::LessEqual => observed <= target,
            Self::Equal => observed == target,
        }
    }
}

/// Whether the target counts groundings or is a percentage of a denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    Number,
    Percent,
}

/// Which groundings form the denominator of a percent threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantifierScope {
    /// Every structurally possible grounding.
    Total,
    /// Groundings whose world holds the clause label at all.
    Available,
}

/// Quantifier over clause groundings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub op: ThresholdOp,
    pub mode: ThresholdMode,
    pub scope: QuantifierScope,
    pub value: f64,
}

impl Threshold {
    pub fn new(op: ThresholdOp, mode: ThresholdMode, scope: QuantifierScope, value: f64) -> Self {
        Self {
            op,
            mode,
            scope,
            value,
        }
    }

    /// `>= 1 number total`.
    pub fn existential() -> Self {
        Self::new(
            ThresholdOp::GreaterEqual,
            ThresholdMode::Number,
            QuantifierScope::Total,
            1.0,
        )
    }

    /// `>= 100 percent total`: every candidate grounding must qualify.
    pub fn universal() -> Self {
        Self::new(
            ThresholdOp::GreaterEqual,
            ThresholdMode::Percent,
            QuantifierScope::Total,
            100.0,
        )
    }

    pub fn is_existential(&self) -> bool {
        *self == Self::existential()
    }

    /// Reject thresholds that can never be meaningfully evaluated.
    pub fn validate(&self, rule: &str) -> Result<(), RuleError> {
        if !self.value.is_finite() || self.value < 0.0 {
            return Err(RuleError::MalformedThreshold {
                rule: rule.to_string(),
                message: format!("target {} must be a finite, non-negative number", self.value),
            });
        }
        if self.mode == ThresholdMode::Percent && self.value > 100.0 {
            return Err(RuleError::MalformedThreshold {
                rule: rule.to_string(),
                message: format!("percent target {} exceeds 100", self.value),
            });
        }
        Ok(())
    }

    /// Evaluate against `qualified` groundings out of `denominator`.
    ///
    /// The denominator is the total or available grounding count, chosen by
    /// the caller according to [`Threshold::scope`]. A percent threshold with
    /// an empty denominator is never satisfied.
    pub fn holds(&self, qualified: usize, denominator: usize) -> bool {
        match self.mode {
            ThresholdMode::Number => self.op.compare(qualified as f64, self.value),
            ThresholdMode::Percent => {
                if denominator == 0 {
                    return false;
                }
                let ratio = qualified as f64 / denominator as f64;
                self.op.compare(ratio, self.value * 0.01)
            }
        }
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::existential()
    }
}
