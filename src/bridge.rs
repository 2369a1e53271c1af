//! Facts from classifier output.
//!
//! A classifier hands over one probability per class. Every class becomes a
//! fact on the classified entity: confident classes get a bound derived from
//! the probability, the rest stay unknown so the reasoner still sees them.

use serde::{Deserialize, Serialize};

use crate::error::{AnnologResult, ConfigError};
use crate::fact::{Fact, FactTarget};
use crate::interval::Interval;
use crate::label::Label;

/// How class probabilities turn into bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelInterfaceOptions {
    /// Probabilities at or below this produce `[0, 1]` (default: 0.5).
    pub threshold: f64,
    /// Move the lower bound for confident classes (default: true).
    pub set_lower_bound: bool,
    /// Move the upper bound for confident classes (default: false).
    pub set_upper_bound: bool,
    /// Use this value instead of the raw probability (default: 1.0).
    pub snap_value: Option<f64>,
}

impl Default for ModelInterfaceOptions {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            set_lower_bound: true,
            set_upper_bound: false,
            snap_value: Some(1.0),
        }
    }
}

impl ModelInterfaceOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::Invalid {
                message: format!("classifier threshold {} is outside [0, 1]", self.threshold),
            });
        }
        if let Some(snap) = self.snap_value.filter(|v| !(0.0..=1.0).contains(v)) {
            return Err(ConfigError::Invalid {
                message: format!("snap value {snap} is outside [0, 1]"),
            });
        }
        Ok(())
    }

    /// Bound for a class predicted with `probability`.
    pub fn bound_for(&self, probability: f64) -> AnnologResult<Interval> {
        if probability <= self.threshold {
            return Ok(Interval::unknown());
        }
        let value = self.snap_value.unwrap_or(probability);
        let lower = if self.set_lower_bound { value } else { 0.0 };
        let upper = if self.set_upper_bound { value } else { 1.0 };
        Ok(Interval::new(lower, upper)?)
    }
}

/// Turn one classification into facts on `target`, one per class, active over
/// `[t_lower, t_upper]`.
///
/// Facts are named `<identifier>-<class>` in the trace.
pub fn classifier_facts(
    identifier: &str,
    probabilities: &[f64],
    classes: &[Label],
    target: &FactTarget,
    options: &ModelInterfaceOptions,
    t_lower: usize,
    t_upper: usize,
) -> AnnologResult<Vec<Fact>> {
    options.validate()?;
    if probabilities.len() != classes.len() {
        return Err(ConfigError::Invalid {
            message: format!(
                "{identifier}: {} probabilities for {} classes",
                probabilities.len(),
                classes.len()
            ),
        }
        .into());
    }

    let mut facts = Vec::with_capacity(classes.len());
    for (class, &probability) in classes.iter().zip(probabilities) {
        let bound = options.bound_for(probability)?;
        let fact = Fact {
            target: target.clone(),
            label: class.clone(),
            bound,
            t_lower: 0,
            t_upper: 0,
            is_static: false,
            name: Some(format!("{identifier}-{class}")),
        }
        .during(t_lower, t_upper);
        facts.push(fact);
    }
    tracing::debug!(identifier, %target, facts = facts.len(), "classifier facts");
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnnologError;

    fn classes() -> Vec<Label> {
        vec![Label::new("fraud"), Label::new("legitimate")]
    }

    #[test]
    fn confident_class_snaps_lower_bound() {
        let target = FactTarget::Node("tx".into());
        let facts = classifier_facts(
            "detector",
            &[0.8, 0.2],
            &classes(),
            &target,
            &ModelInterfaceOptions::default(),
            0,
            2,
        )
        .unwrap();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].bound, Interval::TRUE);
        assert_eq!(facts[0].trace_name(), "detector-fraud");
        assert_eq!(facts[0].t_upper, 2);
        assert!(facts[1].bound.is_unknown());
    }

    #[test]
    fn raw_probability_without_snap() {
        let options = ModelInterfaceOptions {
            threshold: 0.1,
            set_lower_bound: true,
            set_upper_bound: true,
            snap_value: None,
        };
        assert_eq!(options.bound_for(0.7).unwrap(), Interval::point(0.7).unwrap());

        let upper_only = ModelInterfaceOptions {
            set_lower_bound: false,
            set_upper_bound: true,
            snap_value: None,
            ..options
        };
        assert_eq!(upper_only.bound_for(0.3).unwrap(), Interval::new(0.0, 0.3).unwrap());
    }

    #[test]
    fn threshold_is_exclusive() {
        let options = ModelInterfaceOptions::default();
        assert!(options.bound_for(0.5).unwrap().is_unknown());
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let target = FactTarget::Node("tx".into());
        let result = classifier_facts(
            "detector",
            &[0.8],
            &classes(),
            &target,
            &ModelInterfaceOptions::default(),
            0,
            0,
        );
        assert!(matches!(result, Err(AnnologError::Config(ConfigError::Invalid { .. }))));
    }

    #[test]
    fn probability_out_of_range_is_an_interval_error() {
        let options = ModelInterfaceOptions {
            snap_value: None,
            ..ModelInterfaceOptions::default()
        };
        assert!(matches!(options.bound_for(1.5), Err(AnnologError::Interval(_))));
    }
}
