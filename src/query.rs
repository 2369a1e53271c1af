//! Read-only access to a reasoned interpretation.
//!
//! Every accessor checks the requested timestep against the last timestep the
//! scheduler completed and reads end-of-timestep bounds from the history, so
//! past timesteps stay queryable after the run moves on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ReasonerConfig;
use crate::error::QueryError;
use crate::fact::FactTarget;
use crate::graph::Entity;
use crate::interpretation::Interpretation;
use crate::interval::Interval;
use crate::label::Label;
use crate::trace::TraceLog;

pub type QueryResult<T> = std::result::Result<T, QueryError>;

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// What a query asks of an atom's bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCheck {
    /// Lower bound at or above the true threshold.
    True,
    /// Upper bound at or below the false threshold.
    False,
    /// Exactly `[0, 1]`.
    Unknown,
    /// Bound contained in the given interval.
    Within(Interval),
    /// Return the bound itself.
    Bound,
}

/// A question about one ground atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub target: FactTarget,
    pub label: Label,
    pub check: QueryCheck,
    /// Unset means the reasoner's `true_threshold`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_threshold: Option<f64>,
    /// Unset means the reasoner's `false_threshold`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_threshold: Option<f64>,
}

impl Query {
    /// Ask for the bound of `label` on a node.
    pub fn node(node: impl Into<String>, label: impl Into<Label>) -> Self {
        Self::new(FactTarget::Node(node.into()), label)
    }

    /// Ask for the bound of `label` on an edge.
    pub fn edge(source: impl Into<String>, target: impl Into<String>, label: impl Into<Label>) -> Self {
        Self::new(FactTarget::Edge(source.into(), target.into()), label)
    }

    pub fn new(target: FactTarget, label: impl Into<Label>) -> Self {
        Self {
            target,
            label: label.into(),
            check: QueryCheck::Bound,
            true_threshold: None,
            false_threshold: None,
        }
    }

    pub fn is_true(mut self) -> Self {
        self.check = QueryCheck::True;
        self
    }

    pub fn is_false(mut self) -> Self {
        self.check = QueryCheck::False;
        self
    }

    pub fn is_unknown(mut self) -> Self {
        self.check = QueryCheck::Unknown;
        self
    }

    pub fn within(mut self, bound: Interval) -> Self {
        self.check = QueryCheck::Within(bound);
        self
    }

    pub fn with_thresholds(mut self, true_threshold: f64, false_threshold: f64) -> Self {
        self.true_threshold = Some(true_threshold);
        self.false_threshold = Some(false_threshold);
        self
    }

    /// Fill thresholds the query leaves unset from `config`.
    pub fn with_config_thresholds(mut self, config: &ReasonerConfig) -> Self {
        self.true_threshold.get_or_insert(config.true_threshold);
        self.false_threshold.get_or_insert(config.false_threshold);
        self
    }
}

/// Answer to a [`Query`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryAnswer {
    Bool(bool),
    Interval(Interval),
}

impl QueryAnswer {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Interval(_) => None,
        }
    }

    pub fn as_interval(&self) -> Option<Interval> {
        match self {
            Self::Interval(i) => Some(*i),
            Self::Bool(_) => None,
        }
    }
}

/// Evaluate `query` against the bounds held at the end of timestep `t`.
///
/// An atom that never held a bound reads as `[0, 1]`. Thresholds the query
/// leaves unset take the [`ReasonerConfig`] defaults; [`crate::Reasoner::query`]
/// supplies the run's own configuration instead. Node names are resolved
/// against every node ever interned, so atoms of deleted nodes remain
/// queryable at the timesteps where they existed.
pub fn query(interp: &Interpretation, query: &Query, t: usize) -> QueryResult<QueryAnswer> {
    check_timestep(interp, t)?;
    let entity = resolve(interp, &query.target)?;
    let bound = interp
        .bound_at(entity, &query.label, t)
        .unwrap_or_else(Interval::unknown);
    tracing::trace!(entity = %query.target, label = %query.label, t, %bound, "query");

    let defaults = ReasonerConfig::default();
    Ok(match query.check {
        QueryCheck::True => QueryAnswer::Bool(
            bound.is_true(query.true_threshold.unwrap_or(defaults.true_threshold)),
        ),
        QueryCheck::False => QueryAnswer::Bool(
            bound.is_false(query.false_threshold.unwrap_or(defaults.false_threshold)),
        ),
        QueryCheck::Unknown => QueryAnswer::Bool(bound.is_unknown()),
        QueryCheck::Within(outer) => QueryAnswer::Bool(bound.is_subset_of(&outer)),
        QueryCheck::Bound => QueryAnswer::Interval(bound),
    })
}

fn check_timestep(interp: &Interpretation, t: usize) -> QueryResult<()> {
    match interp.last_timestep() {
        None => Err(QueryError::NotReasoned { timestep: t }),
        Some(last) if t > last => Err(QueryError::TimestepOutOfRange { timestep: t, last }),
        Some(_) => Ok(()),
    }
}

fn resolve(interp: &Interpretation, target: &FactTarget) -> QueryResult<Entity> {
    let registry = interp.graph().registry();
    let lookup = |name: &str| {
        registry
            .lookup(name)
            .ok_or_else(|| crate::error::GraphError::NodeNotFound {
                name: name.to_string(),
            })
    };
    Ok(match target {
        FactTarget::Node(name) => Entity::Node(lookup(name)?),
        FactTarget::Edge(source, target) => Entity::Edge(lookup(source)?, lookup(target)?),
    })
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// One entity's bounds for the filtered labels, in label order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRow {
    pub entity: String,
    pub bounds: Vec<Option<Interval>>,
}

/// Snapshot of every entity holding at least one of the requested labels at a
/// timestep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterTable {
    pub timestep: usize,
    pub labels: Vec<Label>,
    pub rows: Vec<FilterRow>,
}

impl FilterTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, entity: &str) -> Option<&FilterRow> {
        self.rows.iter().find(|r| r.entity == entity)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Collect the bounds of `labels` for every entity at timestep `t`.
///
/// Rows list nodes before edges, each ordered by name.
pub fn filter(interp: &Interpretation, labels: &[Label], t: usize) -> QueryResult<FilterTable> {
    check_timestep(interp, t)?;

    let mut rows: BTreeMap<(bool, String), Vec<Option<Interval>>> = BTreeMap::new();
    for (entity, label) in interp.recorded_atoms() {
        let Some(column) = labels.iter().position(|l| l == label) else {
            continue;
        };
        let Some(bound) = interp.bound_at(*entity, label, t) else {
            continue;
        };
        let key = (entity.is_edge(), interp.describe(*entity));
        rows.entry(key).or_insert_with(|| vec![None; labels.len()])[column] = Some(bound);
    }

    let table = FilterTable {
        timestep: t,
        labels: labels.to_vec(),
        rows: rows
            .into_iter()
            .map(|((_, entity), bounds)| FilterRow { entity, bounds })
            .collect(),
    };
    tracing::debug!(t, labels = labels.len(), rows = table.len(), "filter");
    Ok(table)
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

/// The run's trace log, or an error when tracing was disabled.
pub fn trace(interp: &Interpretation) -> QueryResult<&TraceLog> {
    interp.trace().ok_or_else(|| QueryError::StateUnavailable {
        what: "trace".to_string(),
        reason: "tracing was disabled in the reasoner configuration".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consistency::ExclusivePairs;

    fn sealed(trace: bool) -> Interpretation {
        let mut interp = Interpretation::new(ExclusivePairs::new(), trace);
        let a = interp.add_node("A").unwrap();
        let (s, t) = interp.add_edge("A", "B").unwrap();
        interp
            .tighten(Entity::Node(a), &Label::new("p"), Interval::TRUE)
            .unwrap()
            .unwrap();
        interp.seal_timestep(0);
        interp
            .tighten(Entity::Edge(s, t), &Label::new("e"), Interval::new(0.2, 0.8).unwrap())
            .unwrap()
            .unwrap();
        interp.seal_timestep(1);
        interp
    }

    #[test]
    fn query_reads_history_per_timestep() {
        let interp = sealed(true);
        let edge = Query::edge("A", "B", "e");
        assert_eq!(
            query(&interp, &edge, 0).unwrap(),
            QueryAnswer::Interval(Interval::unknown())
        );
        assert_eq!(
            query(&interp, &edge, 1).unwrap().as_interval(),
            Some(Interval::new(0.2, 0.8).unwrap())
        );
        assert_eq!(
            query(&interp, &Query::node("A", "p").is_true(), 0).unwrap(),
            QueryAnswer::Bool(true)
        );
        assert_eq!(
            query(&interp, &Query::node("B", "p").is_unknown(), 1).unwrap(),
            QueryAnswer::Bool(true)
        );
        let within = Query::edge("A", "B", "e").within(Interval::new(0.1, 0.9).unwrap());
        assert_eq!(query(&interp, &within, 1).unwrap().as_bool(), Some(true));
    }

    #[test]
    fn thresholds_relax_truth() {
        let interp = sealed(true);
        let loose = Query::edge("A", "B", "e").is_true().with_thresholds(0.2, 0.0);
        assert_eq!(query(&interp, &loose, 1).unwrap().as_bool(), Some(true));
        let strict = Query::edge("A", "B", "e").is_true();
        assert_eq!(query(&interp, &strict, 1).unwrap().as_bool(), Some(false));
    }

    #[test]
    fn config_thresholds_fill_only_unset_values() {
        let config = ReasonerConfig {
            true_threshold: 0.8,
            false_threshold: 0.1,
            ..ReasonerConfig::default()
        };
        let filled = Query::node("A", "p").is_true().with_config_thresholds(&config);
        assert_eq!(filled.true_threshold, Some(0.8));
        assert_eq!(filled.false_threshold, Some(0.1));

        let explicit = Query::node("A", "p")
            .with_thresholds(0.5, 0.0)
            .with_config_thresholds(&config);
        assert_eq!(explicit.true_threshold, Some(0.5));
        assert_eq!(explicit.false_threshold, Some(0.0));
    }

    #[test]
    fn out_of_range_and_unreasoned_fail() {
        let interp = sealed(true);
        assert!(matches!(
            query(&interp, &Query::node("A", "p"), 2),
            Err(QueryError::TimestepOutOfRange { timestep: 2, last: 1 })
        ));
        let fresh = Interpretation::new(ExclusivePairs::new(), true);
        assert!(matches!(
            filter(&fresh, &[Label::new("p")], 0),
            Err(QueryError::NotReasoned { timestep: 0 })
        ));
    }

    #[test]
    fn unknown_node_fails() {
        let interp = sealed(true);
        assert!(matches!(
            query(&interp, &Query::node("Z", "p"), 0),
            Err(QueryError::Graph(_))
        ));
    }

    #[test]
    fn deleted_nodes_stay_queryable_in_the_past() {
        let mut interp = sealed(true);
        interp.delete_node("A").unwrap();
        interp.seal_timestep(2);
        let q = Query::node("A", "p");
        assert_eq!(query(&interp, &q, 1).unwrap().as_interval(), Some(Interval::TRUE));
        assert_eq!(query(&interp, &q, 2).unwrap().as_interval(), Some(Interval::unknown()));
    }

    #[test]
    fn filter_orders_nodes_before_edges() {
        let interp = sealed(true);
        let labels = [Label::new("p"), Label::new("e")];
        let table = filter(&interp, &labels, 1).unwrap();
        let entities: Vec<&str> = table.rows.iter().map(|r| r.entity.as_str()).collect();
        assert_eq!(entities, vec!["A", "(A, B)"]);
        assert_eq!(table.row("A").unwrap().bounds, vec![Some(Interval::TRUE), None]);

        let early = filter(&interp, &labels, 0).unwrap();
        assert_eq!(early.len(), 1);
        assert!(early.to_json().unwrap().contains("\"timestep\": 0"));
    }

    #[test]
    fn trace_requires_tracing() {
        assert!(trace(&sealed(true)).is_ok());
        assert!(matches!(
            trace(&sealed(false)),
            Err(QueryError::StateUnavailable { .. })
        ));
    }
}
