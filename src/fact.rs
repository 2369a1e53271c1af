//! Time-windowed ground assertions.

use serde::{Deserialize, Serialize};

use crate::interval::Interval;
use crate::label::Label;

/// The entity a fact talks about, by node name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactTarget {
    Node(String),
    Edge(String, String),
}

impl std::fmt::Display for FactTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node(n) => write!(f, "{n}"),
            Self::Edge(s, t) => write!(f, "({s}, {t})"),
        }
    }
}

/// `label(target) : bound` asserted for every `t` in `[t_lower, t_upper]`.
///
/// Static facts are asserted once, pinned, and hold for the rest of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub target: FactTarget,
    pub label: Label,
    pub bound: Interval,
    pub t_lower: usize,
    pub t_upper: usize,
    #[serde(rename = "static", default)]
    pub is_static: bool,
    /// Name recorded in the trace; defaults to `fact`.
    #[serde(default)]
    pub name: Option<String>,
}

impl Fact {
    /// A node fact holding at `t = 0` only.
    pub fn node(node: impl Into<String>, label: impl Into<Label>, bound: Interval) -> Self {
        Self {
            target: FactTarget::Node(node.into()),
            label: label.into(),
            bound,
            t_lower: 0,
            t_upper: 0,
            is_static: false,
            name: None,
        }
    }

    /// An edge fact holding at `t = 0` only.
    pub fn edge(
        source: impl Into<String>,
        target: impl Into<String>,
        label: impl Into<Label>,
        bound: Interval,
    ) -> Self {
        Self {
            target: FactTarget::Edge(source.into(), target.into()),
            ..Self::node(String::new(), label, bound)
        }
    }

    /// Assert over the inclusive window `[t_lower, t_upper]`. A reversed
    /// window is normalized.
    pub fn during(mut self, t_lower: usize, t_upper: usize) -> Self {
        self.t_lower = t_lower.min(t_upper);
        self.t_upper = t_lower.max(t_upper);
        self
    }

    pub fn static_fact(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether the fact is asserted at `t`.
    pub fn active_at(&self, t: usize) -> bool {
        if self.is_static {
            t == self.t_lower
        } else {
            (self.t_lower..=self.t_upper).contains(&t)
        }
    }

    /// Whether the fact still has an assertion due after `t`.
    pub fn pending_after(&self, t: usize) -> bool {
        if self.is_static {
            self.t_lower > t
        } else {
            self.t_upper > t
        }
    }

    pub fn trace_name(&self) -> &str {
        self.name.as_deref().unwrap_or("fact")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_inclusive() {
        let fact = Fact::node("A", "p", Interval::TRUE).during(1, 3);
        assert!(!fact.active_at(0));
        assert!(fact.active_at(1));
        assert!(fact.active_at(3));
        assert!(!fact.active_at(4));
        assert!(fact.pending_after(2));
        assert!(!fact.pending_after(3));
    }

    #[test]
    fn static_fact_asserts_once() {
        let fact = Fact::node("A", "p", Interval::TRUE).during(2, 5).static_fact();
        assert!(fact.active_at(2));
        assert!(!fact.active_at(3));
    }

    #[test]
    fn reversed_window_is_normalized() {
        let fact = Fact::edge("A", "B", "link", Interval::TRUE).during(4, 1);
        assert_eq!((fact.t_lower, fact.t_upper), (1, 4));
        assert_eq!(fact.target.to_string(), "(A, B)");
        assert_eq!(fact.trace_name(), "fact");
    }
}
