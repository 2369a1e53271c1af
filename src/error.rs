//! Rich diagnostic error types for the annolog reasoning engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the annolog engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum AnnologError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Interval(#[from] IntervalError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Reason(#[from] ReasonError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),
}

// ---------------------------------------------------------------------------
// Interval errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum IntervalError {
    #[error("invalid interval [{lower}, {upper}]: bounds must satisfy 0 <= lower <= upper <= 1")]
    #[diagnostic(
        code(annolog::interval::out_of_range),
        help(
            "Truth bounds live in [0, 1] and the lower bound may not exceed the upper bound. \
             Use `Interval::unknown()` for [0, 1] or `Interval::point(v)` for a single value."
        )
    )]
    OutOfRange { lower: f64, upper: f64 },

    #[error("inconsistent bounds: [{left_lower}, {left_upper}] and [{right_lower}, {right_upper}] do not overlap")]
    #[diagnostic(
        code(annolog::interval::empty_intersection),
        help(
            "Tightening two disjoint intervals yields no admissible truth value. \
             Either one of the assertions is wrong or the conflict must be resolved \
             by resetting the label to unknown."
        )
    )]
    EmptyIntersection {
        left_lower: f64,
        left_upper: f64,
        right_lower: f64,
        right_upper: f64,
    },
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("node not found: {name}")]
    #[diagnostic(
        code(annolog::graph::node_not_found),
        help("The node is not part of the graph. Add it with `add_node()` before referring to it.")
    )]
    NodeNotFound { name: String },

    #[error("edge not found: ({source_name}, {target_name})")]
    #[diagnostic(
        code(annolog::graph::edge_not_found),
        help("The edge is not part of the graph. Add it with `add_edge()` first.")
    )]
    EdgeNotFound {
        source_name: String,
        target_name: String,
    },

    #[error("node id space exhausted after {count} nodes")]
    #[diagnostic(
        code(annolog::graph::exhausted),
        help("The graph can hold at most u32::MAX nodes.")
    )]
    Exhausted { count: usize },
}

// ---------------------------------------------------------------------------
// Rule errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RuleError {
    #[error("rule '{rule}': malformed threshold: {message}")]
    #[diagnostic(
        code(annolog::rule::malformed_threshold),
        help(
            "Number thresholds need a non-negative count; percent thresholds need a \
             value in [0, 100]."
        )
    )]
    MalformedThreshold { rule: String, message: String },

    #[error("rule '{rule}': {given} thresholds given for {expected} quantifiable clauses")]
    #[diagnostic(
        code(annolog::rule::threshold_count),
        help(
            "Provide exactly one threshold per node/edge clause, or use \
             `with_rule_threshold()` to apply one threshold to every clause."
        )
    )]
    ThresholdCountMismatch {
        rule: String,
        given: usize,
        expected: usize,
    },

    #[error("rule '{rule}': {given} weights given for {expected} clauses")]
    #[diagnostic(
        code(annolog::rule::weight_count),
        help("Provide exactly one weight per node/edge clause.")
    )]
    WeightCountMismatch {
        rule: String,
        given: usize,
        expected: usize,
    },

    #[error("rule '{rule}': variable '{variable}' is used before any clause binds it")]
    #[diagnostic(
        code(annolog::rule::unbound_variable),
        help(
            "Comparison clauses can only refer to variables bound by an earlier node or \
             edge clause. Reorder the clauses or bind the variable first."
        )
    )]
    UnboundVariable { rule: String, variable: String },

    #[error("rule '{rule}': unknown annotation function '{function}'")]
    #[diagnostic(
        code(annolog::rule::unknown_annotation),
        help(
            "Register the function in the AnnotationRegistry before building the reasoner. \
             Built-ins: average, average_lower, maximum, minimum."
        )
    )]
    UnknownAnnotation { rule: String, function: String },

    #[error("rule '{rule}': head must have 1 (node) or 2 (edge) arguments, got {arity}")]
    #[diagnostic(
        code(annolog::rule::head_arity),
        help("Node rules conclude `pred(x)`, edge rules conclude `pred(x, y)`.")
    )]
    HeadArity { rule: String, arity: usize },

    #[error("rule '{rule}': clause {index} has an invalid shape: {message}")]
    #[diagnostic(
        code(annolog::rule::invalid_clause),
        help("Node clauses take one argument and edge clauses take two.")
    )]
    InvalidClause {
        rule: String,
        index: usize,
        message: String,
    },

    #[error("rule '{rule}': edge inference requires an edge head")]
    #[diagnostic(
        code(annolog::rule::infer_edge_on_node),
        help("Only rules of the form `pred(x, y) <- ...` can create edges.")
    )]
    InferEdgeOnNodeRule { rule: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Interval(#[from] IntervalError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(annolog::config::invalid),
        help("Check the ReasonerConfig fields. {message}")
    )]
    Invalid { message: String },

    #[error("unknown convergence mode: {mode}")]
    #[diagnostic(
        code(annolog::config::unknown_convergence),
        help("Valid modes are: perfect_convergence, delta_interpretation, delta_bound.")
    )]
    UnknownConvergenceMode { mode: String },

    #[error("unknown grounding strategy: {strategy}")]
    #[diagnostic(
        code(annolog::config::unknown_strategy),
        help("Valid strategies are: full, fact_pointer.")
    )]
    UnknownStrategy { strategy: String },

    #[error("unknown update mode: {mode}")]
    #[diagnostic(
        code(annolog::config::unknown_update_mode),
        help("Valid update modes are: intersection, override.")
    )]
    UnknownUpdateMode { mode: String },

    #[error("failed to read configuration file {path}: {source}")]
    #[diagnostic(
        code(annolog::config::io),
        help("Check that the file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {message}")]
    #[diagnostic(
        code(annolog::config::parse),
        help("The configuration must be valid TOML matching the ReasonerConfig fields.")
    )]
    Parse { message: String },
}

// ---------------------------------------------------------------------------
// Reasoning errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ReasonError {
    #[error(
        "inconsistent bounds for {entity} / {label} at t={timestep}: \
         existing {existing} cannot be tightened to {incoming}"
    )]
    #[diagnostic(
        code(annolog::reason::inconsistent_bounds),
        help(
            "Two assertions about the same atom do not overlap. Disable \
             `abort_on_inconsistency` to resolve the conflict by resetting the label \
             to unknown, or fix the offending fact/rule."
        )
    )]
    InconsistentBounds {
        entity: String,
        label: String,
        timestep: usize,
        existing: String,
        incoming: String,
    },

    #[error(
        "mutually exclusive labels {first} and {second} both hold on {entity} at t={timestep}"
    )]
    #[diagnostic(
        code(annolog::reason::exclusive_conflict),
        help(
            "The pair was registered as mutually exclusive. Disable \
             `abort_on_inconsistency` to reset both labels to unknown instead."
        )
    )]
    ExclusiveConflict {
        entity: String,
        first: String,
        second: String,
        timestep: usize,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// Query errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum QueryError {
    #[error("timestep {timestep} is out of range: reasoning reached t={last}")]
    #[diagnostic(
        code(annolog::query::timestep_out_of_range),
        help("Query a timestep between 0 and the last timestep the reasoner reached.")
    )]
    TimestepOutOfRange { timestep: usize, last: usize },

    #[error("timestep {timestep} requested before any reasoning ran")]
    #[diagnostic(
        code(annolog::query::not_reasoned),
        help("Call `reason()` before querying the interpretation.")
    )]
    NotReasoned { timestep: usize },

    #[error("{what} is unavailable: {reason}")]
    #[diagnostic(
        code(annolog::query::state_unavailable),
        help("Enable `trace` (and `atom_trace` for atom-level detail) in ReasonerConfig.")
    )]
    StateUnavailable { what: String, reason: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

/// Convenience alias for functions returning annolog results.
pub type AnnologResult<T> = std::result::Result<T, AnnologError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_error_converts_to_annolog_error() {
        let err = IntervalError::OutOfRange {
            lower: 0.8,
            upper: 0.2,
        };
        let top: AnnologError = err.into();
        assert!(matches!(
            top,
            AnnologError::Interval(IntervalError::OutOfRange { .. })
        ));
    }

    #[test]
    fn query_error_converts_to_annolog_error() {
        let err = QueryError::TimestepOutOfRange {
            timestep: 9,
            last: 3,
        };
        let top: AnnologError = err.into();
        assert!(matches!(
            top,
            AnnologError::Query(QueryError::TimestepOutOfRange { .. })
        ));
    }

    #[test]
    fn rule_error_wraps_interval_error() {
        let err: RuleError = IntervalError::OutOfRange {
            lower: -1.0,
            upper: 0.5,
        }
        .into();
        assert!(matches!(err, RuleError::Interval(_)));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = ReasonError::InconsistentBounds {
            entity: "A".into(),
            label: "alive".into(),
            timestep: 2,
            existing: "[1, 1]".into(),
            incoming: "[0, 0]".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("alive"));
        assert!(msg.contains("t=2"));
    }
}
