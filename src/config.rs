//! Reasoner configuration.
//!
//! Plain struct with defaults, loadable from TOML. Every field is optional
//! in the file; anything omitted keeps its default. Invalid values are
//! reported by [`ReasonerConfig::validate`] and never silently replaced.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// When the scheduler may stop before `tmax`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConvergenceMode {
    /// Stop only at a timestep with zero changes and nothing pending.
    PerfectConvergence,
    /// Stop once a timestep changes at most `delta` bounds.
    DeltaInterpretation { delta: usize },
    /// Stop once the largest bound movement in a timestep is at most `delta`.
    DeltaBound { delta: f64 },
}

impl Default for ConvergenceMode {
    fn default() -> Self {
        Self::PerfectConvergence
    }
}

impl std::fmt::Display for ConvergenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PerfectConvergence => write!(f, "perfect_convergence"),
            Self::DeltaInterpretation { delta } => write!(f, "delta_interpretation:{delta}"),
            Self::DeltaBound { delta } => write!(f, "delta_bound:{delta}"),
        }
    }
}

/// Parses `perfect_convergence`, `delta_interpretation[:N]` and
/// `delta_bound[:X]`. A missing delta means 0.
impl FromStr for ConvergenceMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        let (name, delta) = match s.split_once(':') {
            Some((name, delta)) => (name.trim(), Some(delta.trim())),
            None => (s.trim(), None),
        };
        let unknown = || ConfigError::UnknownConvergenceMode {
            mode: s.to_string(),
        };
        match name {
            "perfect_convergence" if delta.is_none() => Ok(Self::PerfectConvergence),
            "delta_interpretation" => {
                let delta = delta.map_or(Ok(0), str::parse).map_err(|_| unknown())?;
                Ok(Self::DeltaInterpretation { delta })
            }
            "delta_bound" => {
                let delta = delta.map_or(Ok(0.0), str::parse).map_err(|_| unknown())?;
                Ok(Self::DeltaBound { delta })
            }
            _ => Err(unknown()),
        }
    }
}

/// Which grounding strategy drives each pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Re-ground every rule on every pass.
    #[default]
    Full,
    /// Re-ground only rules whose inputs changed since their last grounding.
    FactPointer,
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.trim() {
            "full" => Ok(Self::Full),
            "fact_pointer" | "fact-pointer" => Ok(Self::FactPointer),
            other => Err(ConfigError::UnknownStrategy {
                strategy: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::FactPointer => write!(f, "fact_pointer"),
        }
    }
}

/// How a proposed bound is merged into the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Tighten by intersection.
    #[default]
    Intersection,
    /// Replace the stored bound; consistency checks do not apply.
    Override,
}

impl FromStr for UpdateMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.trim() {
            "intersection" => Ok(Self::Intersection),
            "override" => Ok(Self::Override),
            other => Err(ConfigError::UnknownUpdateMode {
                mode: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ReasonerConfig
// ---------------------------------------------------------------------------

/// Configuration for a reasoning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    /// Lower bound at or above which a label counts as true (default: 1.0).
    pub true_threshold: f64,
    /// Upper bound at or below which a label counts as false (default: 0.0).
    pub false_threshold: f64,
    /// Ground rules on the rayon pool (default: false).
    pub parallel: bool,
    /// Record committed changes (default: true).
    pub trace: bool,
    /// Record the atoms that justified each rule conclusion (default: false).
    pub atom_trace: bool,
    /// Graph attribute labels become static facts (default: true).
    pub static_graph_facts: bool,
    /// Bounds carry over between timesteps (default: true).
    pub persistent: bool,
    pub update_mode: UpdateMode,
    /// Detect contradictions at all (default: true).
    pub inconsistency_check: bool,
    /// Fail the run on a contradiction instead of resetting (default: false).
    pub abort_on_inconsistency: bool,
    /// Let distinct variables bind to the same entity (default: false).
    pub allow_ground_rules: bool,
    pub convergence: ConvergenceMode,
    /// Repeat grounding inside a timestep until nothing changes (default: false).
    pub again: bool,
    /// Cap on repeated grounding passes per timestep (default: 100).
    pub max_again_iterations: usize,
    /// Wall-clock cap on repeated passes per timestep, in milliseconds.
    pub again_time_budget_ms: Option<u64>,
    /// Timestep cap when no `tmax` is given (default: 1000).
    pub max_timesteps: usize,
    pub strategy: StrategyKind,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            true_threshold: 1.0,
            false_threshold: 0.0,
            parallel: false,
            trace: true,
            atom_trace: false,
            static_graph_facts: true,
            persistent: true,
            update_mode: UpdateMode::Intersection,
            inconsistency_check: true,
            abort_on_inconsistency: false,
            allow_ground_rules: false,
            convergence: ConvergenceMode::PerfectConvergence,
            again: false,
            max_again_iterations: 100,
            again_time_budget_ms: None,
            max_timesteps: 1000,
            strategy: StrategyKind::Full,
        }
    }
}

impl ReasonerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_toml_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_unit(self.true_threshold) {
            return Err(ConfigError::Invalid {
                message: format!("true_threshold {} must lie in [0, 1]", self.true_threshold),
            });
        }
        if !in_unit(self.false_threshold) {
            return Err(ConfigError::Invalid {
                message: format!("false_threshold {} must lie in [0, 1]", self.false_threshold),
            });
        }
        if self.false_threshold > self.true_threshold {
            return Err(ConfigError::Invalid {
                message: "false_threshold may not exceed true_threshold".into(),
            });
        }
        if let ConvergenceMode::DeltaBound { delta } = self.convergence {
            if !delta.is_finite() || delta < 0.0 {
                return Err(ConfigError::Invalid {
                    message: format!("delta_bound delta {delta} must be a non-negative number"),
                });
            }
        }
        if self.again && self.max_again_iterations == 0 {
            return Err(ConfigError::Invalid {
                message: "max_again_iterations must be > 0 when again is enabled".into(),
            });
        }
        if self.max_timesteps == 0 {
            return Err(ConfigError::Invalid {
                message: "max_timesteps must be > 0".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ReasonerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.true_threshold, 1.0);
        assert!(config.persistent);
        assert_eq!(config.strategy, StrategyKind::Full);
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config = ReasonerConfig::from_toml_str(
            r#"
            atom_trace = true
            strategy = "fact_pointer"

            [convergence]
            mode = "delta_bound"
            delta = 0.25
            "#,
        )
        .unwrap();
        assert!(config.atom_trace);
        assert_eq!(config.strategy, StrategyKind::FactPointer);
        assert_eq!(config.convergence, ConvergenceMode::DeltaBound { delta: 0.25 });
        assert!(config.trace);
    }

    #[test]
    fn unknown_convergence_mode_is_an_error() {
        let err = "almost_converged".parse::<ConvergenceMode>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownConvergenceMode { .. }));
        assert_eq!(
            "delta_interpretation:3".parse::<ConvergenceMode>().unwrap(),
            ConvergenceMode::DeltaInterpretation { delta: 3 }
        );
    }

    #[test]
    fn unknown_strategy_is_an_error() {
        assert!(matches!(
            "sometimes".parse::<StrategyKind>(),
            Err(ConfigError::UnknownStrategy { .. })
        ));
        assert!(matches!(
            "replace".parse::<UpdateMode>(),
            Err(ConfigError::UnknownUpdateMode { .. })
        ));
    }

    #[test]
    fn bad_toml_mode_is_a_parse_error() {
        let err = ReasonerConfig::from_toml_str(
            r#"
            [convergence]
            mode = "whenever"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let config = ReasonerConfig {
            true_threshold: 1.5,
            ..ReasonerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn toml_round_trip_keeps_settings() {
        let config = ReasonerConfig {
            again: true,
            again_time_budget_ms: Some(50),
            ..ReasonerConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(ReasonerConfig::from_toml_str(&text).unwrap(), config);
    }
}
