//! Data-driven inference rules.
//!
//! Rules are structs, not code: a head atom, an ordered body of clauses, a
//! delay, optional per-clause thresholds and weights, and an optional
//! annotation function name. They are built programmatically (the textual
//! grammar lives outside this crate) and validated once, when registered.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::annotation::AnnotationRegistry;
use crate::error::RuleError;
use crate::interval::Interval;
use crate::label::Label;
use crate::threshold::Threshold;

// ---------------------------------------------------------------------------
// Terms
// ---------------------------------------------------------------------------

/// An argument of an atom: a variable or a constant.
///
/// In node/edge clauses a constant names a concrete node. In comparison
/// clauses it is a literal value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    Var(String),
    Const(String),
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    pub fn constant(value: impl Into<String>) -> Self {
        Self::Const(value.into())
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            Self::Var(v) => Some(v),
            Self::Const(_) => None,
        }
    }
}

/// Bare strings are variables; use [`Term::constant`] for constants.
impl From<&str> for Term {
    fn from(s: &str) -> Self {
        Self::Var(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Clauses
// ---------------------------------------------------------------------------

/// Operator of a comparison clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Compare two values numerically when both parse as numbers, otherwise
    /// lexicographically.
    pub fn apply(self, left: &str, right: &str) -> bool {
        let ordering = match (left.parse::<f64>(), right.parse::<f64>()) {
            (Ok(l), Ok(r)) => match l.partial_cmp(&r) {
                Some(o) => o,
                None => return false,
            },
            _ => left.cmp(right),
        };
        match self {
            Self::Eq => ordering.is_eq(),
            Self::Ne => ordering.is_ne(),
            Self::Lt => ordering.is_lt(),
            Self::Le => ordering.is_le(),
            Self::Gt => ordering.is_gt(),
            Self::Ge => ordering.is_ge(),
        }
    }
}

/// Which kind of atom a clause matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseKind {
    Node,
    Edge,
    Comparison,
}

/// One body clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    /// `label(arg)`, satisfied when the node's bound for `label` lies within
    /// `bound` (or is true when no bound is given).
    Node {
        label: Label,
        arg: Term,
        bound: Option<Interval>,
    },
    /// `label(source, target)` over an existing edge.
    Edge {
        label: Label,
        source: Term,
        target: Term,
        bound: Option<Interval>,
    },
    /// `left op right` over already bound values.
    Comparison {
        left: Term,
        op: CompareOp,
        right: Term,
    },
}

impl Clause {
    pub fn kind(&self) -> ClauseKind {
        match self {
            Self::Node { .. } => ClauseKind::Node,
            Self::Edge { .. } => ClauseKind::Edge,
            Self::Comparison { .. } => ClauseKind::Comparison,
        }
    }

    pub fn label(&self) -> Option<&Label> {
        match self {
            Self::Node { label, .. } | Self::Edge { label, .. } => Some(label),
            Self::Comparison { .. } => None,
        }
    }

    /// Node and edge clauses take part in thresholds and annotations.
    pub fn is_quantified(&self) -> bool {
        !matches!(self, Self::Comparison { .. })
    }

    /// Variables mentioned by the clause, in argument order.
    pub fn variables(&self) -> Vec<&str> {
        let terms: Vec<&Term> = match self {
            Self::Node { arg, .. } => vec![arg],
            Self::Edge { source, target, .. } => vec![source, target],
            Self::Comparison { left, right, .. } => vec![left, right],
        };
        terms.into_iter().filter_map(Term::as_var).collect()
    }
}

// ---------------------------------------------------------------------------
// Head
// ---------------------------------------------------------------------------

/// The concluded atom: `label(x)` for node rules, `label(x, y)` for edge rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Head {
    pub label: Label,
    pub args: Vec<Term>,
}

impl Head {
    pub fn is_edge(&self) -> bool {
        self.args.len() == 2
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// A single inference rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub head: Head,
    pub clauses: Vec<Clause>,
    /// Timesteps between body satisfaction and the head taking effect.
    pub delay: usize,
    /// One per quantified clause; empty falls back to `rule_threshold`.
    pub thresholds: Vec<Threshold>,
    /// Applies to every quantified clause when `thresholds` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_threshold: Option<Threshold>,
    /// One per quantified clause; empty means 1.0 everywhere.
    pub weights: Vec<f64>,
    /// Interval asserted when no annotation function is set.
    pub head_bound: Interval,
    pub annotation: Option<String>,
    /// Satisfying the rule creates the head edge if it is missing.
    pub infer_edges: bool,
    /// Distinct variables may bind to the same entity.
    pub allow_ground_rules: bool,
}

impl Rule {
    /// Create a rule concluding `label(args..)` with defaults.
    pub fn new<T: Into<Term>>(
        name: impl Into<String>,
        label: impl Into<Label>,
        args: impl IntoIterator<Item = T>,
    ) -> Self {
        Self {
            name: name.into(),
            head: Head {
                label: label.into(),
                args: args.into_iter().map(Into::into).collect(),
            },
            clauses: Vec::new(),
            delay: 0,
            thresholds: Vec::new(),
            rule_threshold: None,
            weights: Vec::new(),
            head_bound: Interval::TRUE,
            annotation: None,
            infer_edges: false,
            allow_ground_rules: false,
        }
    }

    /// Append `label(arg)`.
    pub fn node_clause(mut self, label: impl Into<Label>, arg: impl Into<Term>) -> Self {
        self.clauses.push(Clause::Node {
            label: label.into(),
            arg: arg.into(),
            bound: None,
        });
        self
    }

    /// Append `label(arg):bound`.
    pub fn bounded_node_clause(
        mut self,
        label: impl Into<Label>,
        arg: impl Into<Term>,
        bound: Interval,
    ) -> Self {
        self.clauses.push(Clause::Node {
            label: label.into(),
            arg: arg.into(),
            bound: Some(bound),
        });
        self
    }

    /// Append `label(source, target)`.
    pub fn edge_clause(
        mut self,
        label: impl Into<Label>,
        source: impl Into<Term>,
        target: impl Into<Term>,
    ) -> Self {
        self.clauses.push(Clause::Edge {
            label: label.into(),
            source: source.into(),
            target: target.into(),
            bound: None,
        });
        self
    }

    /// Append `label(source, target):bound`.
    pub fn bounded_edge_clause(
        mut self,
        label: impl Into<Label>,
        source: impl Into<Term>,
        target: impl Into<Term>,
        bound: Interval,
    ) -> Self {
        self.clauses.push(Clause::Edge {
            label: label.into(),
            source: source.into(),
            target: target.into(),
            bound: Some(bound),
        });
        self
    }

    /// Append `left op right`.
    pub fn compare(mut self, left: impl Into<Term>, op: CompareOp, right: impl Into<Term>) -> Self {
        self.clauses.push(Clause::Comparison {
            left: left.into(),
            op,
            right: right.into(),
        });
        self
    }

    pub fn with_delay(mut self, delay: usize) -> Self {
        self.delay = delay;
        self
    }

    /// Per-clause thresholds, aligned with the node/edge clauses.
    pub fn with_thresholds(mut self, thresholds: Vec<Threshold>) -> Self {
        self.thresholds = thresholds;
        self.rule_threshold = None;
        self
    }

    /// Apply one threshold to every node/edge clause, including clauses
    /// appended later.
    pub fn with_rule_threshold(mut self, threshold: Threshold) -> Self {
        self.thresholds.clear();
        self.rule_threshold = Some(threshold);
        self
    }

    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_head_bound(mut self, bound: Interval) -> Self {
        self.head_bound = bound;
        self
    }

    pub fn with_annotation(mut self, function: impl Into<String>) -> Self {
        self.annotation = Some(function.into());
        self
    }

    pub fn infer_edges(mut self) -> Self {
        self.infer_edges = true;
        self
    }

    pub fn allow_ground_rules(mut self) -> Self {
        self.allow_ground_rules = true;
        self
    }

    /// Number of node/edge clauses.
    pub fn quantified_count(&self) -> usize {
        self.clauses.iter().filter(|c| c.is_quantified()).count()
    }

    /// Threshold of the `q`-th quantified clause.
    pub fn threshold(&self, q: usize) -> Threshold {
        self.thresholds
            .get(q)
            .copied()
            .or(self.rule_threshold)
            .unwrap_or_default()
    }

    /// Weight of the `q`-th quantified clause.
    pub fn weight(&self, q: usize) -> f64 {
        self.weights.get(q).copied().unwrap_or(1.0)
    }

    /// Labels read by the body.
    pub fn body_labels(&self) -> impl Iterator<Item = &Label> {
        self.clauses.iter().filter_map(Clause::label)
    }

    /// Head variables that no node/edge clause binds.
    pub fn free_head_variables(&self) -> Vec<&str> {
        let bound = self.body_bound_variables();
        self.head
            .args
            .iter()
            .filter_map(Term::as_var)
            .filter(|v| !bound.contains(v))
            .collect()
    }

    fn body_bound_variables(&self) -> HashSet<&str> {
        self.clauses
            .iter()
            .filter(|c| c.is_quantified())
            .flat_map(Clause::variables)
            .collect()
    }

    /// Check the rule for configuration errors.
    pub fn validate(&self, annotations: &AnnotationRegistry) -> Result<(), RuleError> {
        let arity = self.head.args.len();
        if arity != 1 && arity != 2 {
            return Err(RuleError::HeadArity {
                rule: self.name.clone(),
                arity,
            });
        }
        if self.infer_edges && !self.head.is_edge() {
            return Err(RuleError::InferEdgeOnNodeRule {
                rule: self.name.clone(),
            });
        }

        let quantified = self.quantified_count();
        if !self.thresholds.is_empty() && self.thresholds.len() != quantified {
            return Err(RuleError::ThresholdCountMismatch {
                rule: self.name.clone(),
                given: self.thresholds.len(),
                expected: quantified,
            });
        }
        for t in self.thresholds.iter().chain(&self.rule_threshold) {
            t.validate(&self.name)?;
        }
        if !self.weights.is_empty() && self.weights.len() != quantified {
            return Err(RuleError::WeightCountMismatch {
                rule: self.name.clone(),
                given: self.weights.len(),
                expected: quantified,
            });
        }

        if let Some(function) = &self.annotation {
            if !annotations.contains(function) {
                return Err(RuleError::UnknownAnnotation {
                    rule: self.name.clone(),
                    function: function.clone(),
                });
            }
        }

        // Comparison variables must be bound by an earlier node/edge clause.
        let mut seen: HashSet<&str> = HashSet::new();
        for (index, clause) in self.clauses.iter().enumerate() {
            if let Clause::Edge { source, target, .. } = clause {
                if source.as_var().is_some() && source == target {
                    return Err(RuleError::InvalidClause {
                        rule: self.name.clone(),
                        index,
                        message: "edge clause repeats the same variable on both ends".into(),
                    });
                }
            }
            if clause.is_quantified() {
                seen.extend(clause.variables());
                continue;
            }
            for var in clause.variables() {
                if !seen.contains(var) {
                    return Err(RuleError::UnboundVariable {
                        rule: self.name.clone(),
                        variable: var.to_string(),
                    });
                }
            }
        }

        // Created edges need both endpoints bound by the body.
        if self.infer_edges {
            if let Some(var) = self.free_head_variables().first() {
                return Err(RuleError::UnboundVariable {
                    rule: self.name.clone(),
                    variable: var.to_string(),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rule set
// ---------------------------------------------------------------------------

/// A named collection of rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub name: String,
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Keep only rules that can contribute to one of `targets`, following
    /// body labels transitively. Declared order is preserved.
    pub fn filter_for_queries<'a>(&self, targets: impl IntoIterator<Item = &'a Label>) -> RuleSet {
        let mut wanted: HashSet<&Label> = HashSet::new();
        let mut stack: Vec<&Label> = targets.into_iter().collect();
        while let Some(label) = stack.pop() {
            if !wanted.insert(label) {
                continue;
            }
            for rule in self.rules.iter().filter(|r| &r.head.label == label) {
                stack.extend(rule.body_labels());
            }
        }
        RuleSet {
            name: self.name.clone(),
            rules: self
                .rules
                .iter()
                .filter(|r| wanted.contains(&r.head.label))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threshold::{QuantifierScope, ThresholdMode, ThresholdOp};

    fn registry() -> AnnotationRegistry {
        AnnotationRegistry::with_builtins()
    }

    fn transitive() -> Rule {
        Rule::new("transitive", "connected", ["x", "z"])
            .edge_clause("connected", "x", "y")
            .edge_clause("connected", "y", "z")
            .with_delay(1)
            .infer_edges()
    }

    #[test]
    fn builder_collects_clauses() {
        let rule = transitive();
        assert!(rule.head.is_edge());
        assert_eq!(rule.clauses.len(), 2);
        assert_eq!(rule.quantified_count(), 2);
        assert_eq!(rule.threshold(0), Threshold::existential());
        assert_eq!(rule.weight(1), 1.0);
        assert!(rule.validate(&registry()).is_ok());
    }

    #[test]
    fn rule_threshold_applies_to_every_clause() {
        let t = Threshold::new(
            ThresholdOp::GreaterEqual,
            ThresholdMode::Number,
            QuantifierScope::Total,
            2.0,
        );
        let after = transitive().with_rule_threshold(t);
        assert_eq!(after.threshold(0), t);
        assert_eq!(after.threshold(1), t);

        let before = Rule::new("transitive", "connected", ["x", "z"])
            .with_rule_threshold(t)
            .edge_clause("connected", "x", "y")
            .edge_clause("connected", "y", "z");
        assert_eq!(before.threshold(0), t);
        assert_eq!(before.threshold(1), t);
        assert!(before.validate(&registry()).is_ok());
    }

    #[test]
    fn per_clause_thresholds_replace_the_rule_threshold() {
        let t = Threshold::new(
            ThresholdOp::Less,
            ThresholdMode::Number,
            QuantifierScope::Total,
            1.0,
        );
        let rule = transitive()
            .with_rule_threshold(t)
            .with_thresholds(vec![Threshold::existential(), Threshold::universal()]);
        assert_eq!(rule.rule_threshold, None);
        assert_eq!(rule.threshold(1), Threshold::universal());
    }

    #[test]
    fn threshold_count_mismatch_is_rejected() {
        let rule = transitive().with_thresholds(vec![Threshold::universal()]);
        assert!(matches!(
            rule.validate(&registry()),
            Err(RuleError::ThresholdCountMismatch {
                given: 1,
                expected: 2,
                ..
            })
        ));
    }

    #[test]
    fn comparison_before_binding_is_rejected() {
        let rule = Rule::new("older", "older", ["x"])
            .compare("x", CompareOp::Gt, Term::constant("30"))
            .node_clause("person", "x");
        assert!(matches!(
            rule.validate(&registry()),
            Err(RuleError::UnboundVariable { variable, .. }) if variable == "x"
        ));
    }

    #[test]
    fn unknown_annotation_is_rejected() {
        let rule = Rule::new("r", "p", ["x"])
            .node_clause("q", "x")
            .with_annotation("median");
        assert!(matches!(
            rule.validate(&registry()),
            Err(RuleError::UnknownAnnotation { .. })
        ));
    }

    #[test]
    fn infer_edges_needs_edge_head_with_bound_ends() {
        let node_head = Rule::new("r", "p", ["x"]).node_clause("q", "x").infer_edges();
        assert!(matches!(
            node_head.validate(&registry()),
            Err(RuleError::InferEdgeOnNodeRule { .. })
        ));

        let free = Rule::new("r", "link", ["x", "w"])
            .node_clause("q", "x")
            .infer_edges();
        assert!(matches!(
            free.validate(&registry()),
            Err(RuleError::UnboundVariable { variable, .. }) if variable == "w"
        ));
    }

    #[test]
    fn head_arity_is_checked() {
        let rule = Rule::new("r", "p", ["x", "y", "z"]).node_clause("q", "x");
        assert!(matches!(
            rule.validate(&registry()),
            Err(RuleError::HeadArity { arity: 3, .. })
        ));
    }

    #[test]
    fn compare_op_numeric_then_lexicographic() {
        assert!(CompareOp::Gt.apply("10", "9"));
        assert!(CompareOp::Lt.apply("apple", "banana"));
        assert!(CompareOp::Eq.apply("1.0", "1"));
        assert!(CompareOp::Ne.apply("a", "b"));
    }

    #[test]
    fn filter_for_queries_follows_dependencies_through_cycles() {
        let set = RuleSet::new("test")
            .with_rule(Rule::new("r1", "a", ["x"]).node_clause("b", "x"))
            .with_rule(Rule::new("r2", "b", ["x"]).node_clause("a", "x"))
            .with_rule(Rule::new("r3", "c", ["x"]).node_clause("d", "x"));

        let filtered = set.filter_for_queries([&Label::new("a")]);
        let names: Vec<&str> = filtered.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["r1", "r2"]);
    }
}
