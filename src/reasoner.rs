//! Fixed-point scheduler.
//!
//! The [`Reasoner`] owns an [`Interpretation`] and drives it through discrete
//! timesteps. Each timestep:
//!
//! 1. resets non-static bounds when the run is not persistent,
//! 2. commits the facts active at `t` and the conclusions scheduled for `t`,
//! 3. grounds every rule; conclusions with a delay are scheduled, the rest are
//!    committed immediately,
//! 4. with `again` set, repeats step 3 until a pass changes nothing or a cap
//!    is hit,
//! 5. seals the timestep into the history and checks for convergence.
//!
//! Grounding is read-only and may run in parallel; all writes go through the
//! single [`Resolver`].

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::annotation::{AnnotationFn, AnnotationRegistry};
use crate::config::{ConvergenceMode, ReasonerConfig, StrategyKind};
use crate::consistency::{ExclusivePairs, Resolver, Update};
use crate::error::{AnnologResult, GraphError, QueryError, ReasonError};
use crate::fact::{Fact, FactTarget};
use crate::graph::{Entity, GraphSnapshot};
use crate::grounding::strategy::strategy_for;
use crate::grounding::{Conclusion, GroundingContext, GroundingStrategy};
use crate::interpretation::{Interpretation, TimestepDelta};
use crate::interval::Interval;
use crate::label::Label;
use crate::query::{self, FilterTable, Query, QueryAnswer};
use crate::rule::{Rule, RuleSet};
use crate::trace::TraceSource;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A timestep changed nothing and nothing was pending.
    FixedPoint,
    /// A timestep changed no more atoms than the configured delta.
    DeltaInterpretation,
    /// A timestep moved no bound further than the configured delta.
    DeltaBound,
    /// The requested `tmax` was reached.
    ReachedTmax,
    /// `max_timesteps` ran out before a fixed point.
    TimestepBudget,
}

/// Summary of one `reason` or `resume` call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReasonOutcome {
    /// Last timestep completed, `None` if no timestep ran.
    pub last_timestep: Option<usize>,
    /// Timesteps run by this call.
    pub timesteps: usize,
    /// Whether the run reached a stable state within its caps.
    pub converged: bool,
    /// Atoms whose end-of-timestep bound changed, summed over timesteps.
    pub changes: usize,
    pub stop_reason: StopReason,
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

type ScheduleKey = (usize, usize, Entity, Label, (u64, u64));

/// Delayed conclusions keyed by the timestep they take effect at.
#[derive(Debug, Default)]
struct Schedule {
    pending: BTreeMap<usize, Vec<Update>>,
    seen: HashSet<ScheduleKey>,
}

impl Schedule {
    fn insert(&mut self, at: usize, rule: usize, update: Update) {
        let key = (at, rule, update.entity, update.label.clone(), update.bound.bits());
        if self.seen.insert(key) {
            self.pending.entry(at).or_default().push(update);
        }
    }

    fn take(&mut self, t: usize) -> Vec<Update> {
        self.seen.retain(|key| key.0 > t);
        let mut due = Vec::new();
        let later = self.pending.split_off(&(t + 1));
        for (_, updates) in std::mem::replace(&mut self.pending, later) {
            due.extend(updates);
        }
        due
    }

    fn after(&self, t: usize) -> impl Iterator<Item = &Update> {
        self.pending.range(t + 1..).flat_map(|(_, updates)| updates)
    }
}

/// A fact resolved against the graph.
#[derive(Debug, Clone)]
struct BoundFact {
    entity: Entity,
    fact: Fact,
}

impl BoundFact {
    fn update(&self) -> Update {
        let mut update = Update::new(
            self.entity,
            self.fact.label.clone(),
            self.fact.bound,
            TraceSource::Fact(self.fact.trace_name().to_string()),
        );
        update.pin = self.fact.is_static;
        update
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects the inputs of a run and validates them.
pub struct ReasonerBuilder {
    config: ReasonerConfig,
    snapshot: GraphSnapshot,
    facts: Vec<Fact>,
    rules: Vec<Rule>,
    exclusive: ExclusivePairs,
    annotations: AnnotationRegistry,
    strategy: Option<Box<dyn GroundingStrategy>>,
}

impl Default for ReasonerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReasonerBuilder {
    pub fn new() -> Self {
        Self {
            config: ReasonerConfig::default(),
            snapshot: GraphSnapshot::default(),
            facts: Vec::new(),
            rules: Vec::new(),
            exclusive: ExclusivePairs::new(),
            annotations: AnnotationRegistry::with_builtins(),
            strategy: None,
        }
    }

    pub fn config(mut self, config: ReasonerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn graph(mut self, snapshot: GraphSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn fact(mut self, fact: Fact) -> Self {
        self.facts.push(fact);
        self
    }

    pub fn facts(mut self, facts: impl IntoIterator<Item = Fact>) -> Self {
        self.facts.extend(facts);
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, set: RuleSet) -> Self {
        self.rules.extend(set.rules);
        self
    }

    /// Declare two labels mutually exclusive.
    pub fn exclusive(mut self, a: impl Into<Label>, b: impl Into<Label>) -> Self {
        self.exclusive.declare(a, b);
        self
    }

    /// Register an annotation function rules can refer to by name.
    pub fn annotation(mut self, name: impl Into<String>, function: impl AnnotationFn + 'static) -> Self {
        self.annotations.register(name, function);
        self
    }

    /// Use a custom grounding strategy instead of the configured one.
    pub fn strategy(mut self, strategy: Box<dyn GroundingStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn build(self) -> AnnologResult<Reasoner> {
        self.config.validate()?;
        for rule in &self.rules {
            rule.validate(&self.annotations)?;
        }

        let mut interp = Interpretation::new(self.exclusive, self.config.trace);
        let mut attributes = Vec::new();
        for node in &self.snapshot.nodes {
            let id = interp.add_node(&node.name)?;
            for (label, bound) in &node.labels {
                let target = FactTarget::Node(node.name.clone());
                attributes.push(attribute(Entity::Node(id), target, label, *bound, &self.config));
            }
        }
        for edge in &self.snapshot.edges {
            let key = interp.add_edge(&edge.source, &edge.target)?;
            for (label, bound) in &edge.labels {
                let target = FactTarget::Edge(edge.source.clone(), edge.target.clone());
                attributes.push(attribute(Entity::edge(key), target, label, *bound, &self.config));
            }
        }

        let facts = self
            .facts
            .into_iter()
            .map(|fact| bind_fact(&interp, fact))
            .collect::<Result<Vec<_>, _>>()?;

        let strategy = self
            .strategy
            .unwrap_or_else(|| strategy_for(self.config.strategy));

        tracing::info!(
            nodes = interp.graph().node_count(),
            edges = interp.graph().edge_count(),
            facts = facts.len(),
            attributes = attributes.len(),
            rules = self.rules.len(),
            strategy = %strategy.kind(),
            "reasoner built"
        );

        Ok(Reasoner {
            resolver: Resolver::new(&self.config),
            config: self.config,
            rules: self.rules,
            annotations: self.annotations,
            facts,
            attributes,
            interp,
            strategy,
            schedule: Schedule::default(),
            next_t: 0,
        })
    }
}

/// A label read off the graph, asserted like a fact at every timestep (or once
/// and pinned when graph attributes are static).
fn attribute(
    entity: Entity,
    target: FactTarget,
    label: &Label,
    bound: Interval,
    config: &ReasonerConfig,
) -> BoundFact {
    let fact = Fact {
        target,
        label: label.clone(),
        bound,
        t_lower: 0,
        t_upper: usize::MAX,
        is_static: config.static_graph_facts,
        name: Some("graph-attribute".to_string()),
    };
    BoundFact { entity, fact }
}

fn bind_fact(interp: &Interpretation, fact: Fact) -> Result<BoundFact, GraphError> {
    let graph = interp.graph();
    let entity = match &fact.target {
        FactTarget::Node(name) => Entity::Node(graph.require(name)?),
        FactTarget::Edge(source, target) => {
            let s = graph.require(source)?;
            let t = graph.require(target)?;
            if !graph.contains_edge(s, t) {
                return Err(GraphError::EdgeNotFound {
                    source_name: source.clone(),
                    target_name: target.clone(),
                });
            }
            Entity::Edge(s, t)
        }
    };
    Ok(BoundFact { entity, fact })
}

// ---------------------------------------------------------------------------
// Reasoner
// ---------------------------------------------------------------------------

/// Drives an interpretation to a fixed point.
pub struct Reasoner {
    config: ReasonerConfig,
    rules: Vec<Rule>,
    annotations: AnnotationRegistry,
    facts: Vec<BoundFact>,
    attributes: Vec<BoundFact>,
    interp: Interpretation,
    strategy: Box<dyn GroundingStrategy>,
    resolver: Resolver,
    schedule: Schedule,
    next_t: usize,
}

impl Reasoner {
    pub fn builder() -> ReasonerBuilder {
        ReasonerBuilder::new()
    }

    pub fn config(&self) -> &ReasonerConfig {
        &self.config
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn interpretation(&self) -> &Interpretation {
        &self.interp
    }

    /// Mutable access for structural edits between runs.
    pub fn interpretation_mut(&mut self) -> &mut Interpretation {
        &mut self.interp
    }

    pub fn into_interpretation(self) -> Interpretation {
        self.interp
    }

    /// Run from the next unreached timestep.
    ///
    /// With `tmax` set, timesteps up to and including `tmax` run unless a delta
    /// convergence mode stops earlier. Without it, the run stops at the first
    /// fixed point or after `max_timesteps` timesteps.
    pub fn reason(&mut self, tmax: Option<usize>) -> Result<ReasonOutcome, ReasonError> {
        let start = self.next_t;
        let end = match tmax {
            Some(t) => t,
            None => start + self.config.max_timesteps.saturating_sub(1),
        };
        tracing::info!(
            start,
            tmax = ?tmax,
            convergence = %self.config.convergence,
            strategy = %self.strategy.kind(),
            parallel = self.config.parallel,
            "reasoning started"
        );

        let mut capped = false;
        let mut changes = 0;
        let mut timesteps = 0;
        let mut last_delta = TimestepDelta::default();
        let mut stop = None;

        for t in start..=end {
            let delta = self.step(t, &mut capped)?;
            self.next_t = t + 1;
            timesteps += 1;
            changes += delta.changed;
            last_delta = delta;
            tracing::debug!(t, changed = delta.changed, max_movement = delta.max_movement, "timestep complete");

            stop = match self.config.convergence {
                ConvergenceMode::DeltaInterpretation { delta: limit } if delta.changed <= limit => {
                    Some(StopReason::DeltaInterpretation)
                }
                ConvergenceMode::DeltaBound { delta: limit } if delta.max_movement <= limit => {
                    Some(StopReason::DeltaBound)
                }
                ConvergenceMode::PerfectConvergence
                    if tmax.is_none() && delta.changed == 0 && !self.pending_work(t) =>
                {
                    Some(StopReason::FixedPoint)
                }
                _ => None,
            };
            if stop.is_some() {
                break;
            }
        }

        let stop_reason = stop.unwrap_or(if tmax.is_some() {
            StopReason::ReachedTmax
        } else {
            StopReason::TimestepBudget
        });
        let converged = !capped
            && match stop_reason {
                StopReason::FixedPoint | StopReason::DeltaInterpretation | StopReason::DeltaBound => true,
                StopReason::ReachedTmax => last_delta.changed == 0,
                StopReason::TimestepBudget => false,
            };
        let outcome = ReasonOutcome {
            last_timestep: self.interp.last_timestep(),
            timesteps,
            converged,
            changes,
            stop_reason,
        };
        tracing::info!(
            last_timestep = ?outcome.last_timestep,
            timesteps,
            changes,
            converged,
            stop_reason = ?stop_reason,
            "reasoning finished"
        );
        Ok(outcome)
    }

    /// Continue a finished run for `extra_timesteps` more timesteps with
    /// additional facts.
    pub fn resume(&mut self, extra_timesteps: usize, new_facts: Vec<Fact>) -> AnnologResult<ReasonOutcome> {
        for fact in new_facts {
            let bound = bind_fact(&self.interp, fact)?;
            self.facts.push(bound);
        }
        if extra_timesteps == 0 {
            return Ok(ReasonOutcome {
                last_timestep: self.interp.last_timestep(),
                timesteps: 0,
                converged: true,
                changes: 0,
                stop_reason: StopReason::ReachedTmax,
            });
        }
        Ok(self.reason(Some(self.next_t + extra_timesteps - 1))?)
    }

    // -- query surface -----------------------------------------------------

    pub fn query(&self, query: &Query, t: usize) -> Result<QueryAnswer, QueryError> {
        let query = query.clone().with_config_thresholds(&self.config);
        query::query(&self.interp, &query, t)
    }

    pub fn filter(&self, labels: &[Label], t: usize) -> Result<FilterTable, QueryError> {
        query::filter(&self.interp, labels, t)
    }

    // -- internals ---------------------------------------------------------

    fn step(&mut self, t: usize, capped: &mut bool) -> Result<TimestepDelta, ReasonError> {
        if !self.config.persistent && t > 0 {
            let reset = self.interp.reset_transient();
            tracing::trace!(t, reset, "transient bounds reset");
        }

        let mut batch: Vec<Update> = self
            .attributes
            .iter()
            .filter(|a| t == 0 || !a.fact.is_static)
            .map(BoundFact::update)
            .collect();
        batch.extend(self.facts.iter().filter(|f| f.fact.active_at(t)).map(BoundFact::update));
        batch.extend(self.schedule.take(t));
        let seeded = self.resolver.commit(&mut self.interp, &batch, t, 0)?;
        tracing::trace!(t, updates = batch.len(), changes = seeded.changes, "facts committed");

        let started = Instant::now();
        let budget = self.config.again_time_budget_ms.map(Duration::from_millis);
        let mut pass = 0;
        loop {
            let conclusions = {
                let ctx = GroundingContext::new(&self.interp, &self.annotations, &self.config);
                self.strategy.ground(&ctx, &self.rules)
            };
            let mut immediate = Vec::new();
            for conclusion in conclusions {
                let delay = conclusion.delay;
                let rule = conclusion.rule;
                let update = self.to_update(conclusion);
                if delay == 0 {
                    immediate.push(update);
                } else {
                    self.schedule.insert(t + delay, rule, update);
                }
            }
            let stats = self.resolver.commit(&mut self.interp, &immediate, t, pass)?;
            tracing::trace!(t, pass, conclusions = immediate.len(), changes = stats.changes, "grounding pass");

            if !self.config.again || stats.changes == 0 {
                break;
            }
            pass += 1;
            let out_of_time = budget.is_some_and(|b| started.elapsed() >= b);
            if pass >= self.config.max_again_iterations || out_of_time {
                tracing::warn!(t, pass, out_of_time, "again sub-loop capped before reaching a fixed point");
                *capped = true;
                break;
            }
        }

        Ok(self.interp.seal_timestep(t))
    }

    fn to_update(&self, conclusion: Conclusion) -> Update {
        let name = self
            .rules
            .get(conclusion.rule)
            .map_or_else(|| "rule".to_string(), |r| r.name.clone());
        Update {
            entity: conclusion.entity,
            label: conclusion.label,
            bound: conclusion.bound,
            source: TraceSource::Rule(name),
            atoms: conclusion.atoms,
            create_edge: conclusion.infer_edge,
            pin: false,
        }
    }

    /// Whether anything could still change after timestep `t`.
    fn pending_work(&self, t: usize) -> bool {
        let transient = !self.config.persistent;
        let facts_pending = self.facts.iter().any(|f| {
            f.fact.pending_after(t) || (transient && !f.fact.is_static && f.fact.active_at(t))
        });
        facts_pending
            || self
                .schedule
                .after(t)
                .any(|u| self.resolver.would_change(&self.interp, u))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> ReasonerBuilder {
        Reasoner::builder()
            .graph(GraphSnapshot::new().edge("A", "B").edge("B", "C"))
            .fact(Fact::edge("A", "B", "connected", Interval::TRUE).during(0, 3))
            .fact(Fact::edge("B", "C", "connected", Interval::TRUE).during(0, 3))
            .rule(
                Rule::new("transitive", "connected", ["x", "z"])
                    .edge_clause("connected", "x", "y")
                    .edge_clause("connected", "y", "z")
                    .with_delay(1)
                    .infer_edges(),
            )
    }

    #[test]
    fn schedule_deduplicates_and_releases_in_order() {
        let mut schedule = Schedule::default();
        let update = Update::new(
            Entity::Node(crate::graph::NodeRegistry::new().intern("A").unwrap()),
            Label::new("p"),
            Interval::TRUE,
            TraceSource::Rule("r".into()),
        );
        schedule.insert(2, 0, update.clone());
        schedule.insert(2, 0, update.clone());
        schedule.insert(3, 0, update.clone());
        assert!(schedule.take(1).is_empty());
        assert_eq!(schedule.take(2).len(), 1);
        assert_eq!(schedule.after(2).count(), 1);
        assert_eq!(schedule.take(3).len(), 1);
    }

    #[test]
    fn chain_reaches_fixed_point() {
        let mut reasoner = chain().build().unwrap();
        let outcome = reasoner.reason(None).unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.stop_reason, StopReason::FixedPoint);
        assert_eq!(outcome.last_timestep, Some(3));

        let interp = reasoner.interpretation();
        let a = interp.graph().require("A").unwrap();
        let c = interp.graph().require("C").unwrap();
        let label = Label::new("connected");
        assert!(interp.graph().contains_edge(a, c));
        assert_eq!(interp.bound_at(Entity::Edge(a, c), &label, 0), None);
        assert_eq!(interp.bound_at(Entity::Edge(a, c), &label, 1), Some(Interval::TRUE));
    }

    #[test]
    fn tmax_runs_every_timestep() {
        let mut reasoner = chain().build().unwrap();
        let outcome = reasoner.reason(Some(6)).unwrap();
        assert_eq!(outcome.stop_reason, StopReason::ReachedTmax);
        assert_eq!(outcome.timesteps, 7);
        assert!(outcome.converged);
    }

    #[test]
    fn unknown_fact_target_is_rejected() {
        let result = chain()
            .fact(Fact::node("Z", "p", Interval::TRUE))
            .build();
        assert!(matches!(
            result,
            Err(crate::error::AnnologError::Graph(GraphError::NodeNotFound { .. }))
        ));
    }

    #[test]
    fn invalid_rule_is_rejected_at_build() {
        let result = Reasoner::builder()
            .rule(Rule::new("bad", "p", ["x"]).node_clause("q", "x").with_annotation("nope"))
            .build();
        assert!(matches!(result, Err(crate::error::AnnologError::Rule(_))));
    }

    #[test]
    fn timestep_budget_stops_runaway_runs() {
        let config = ReasonerConfig {
            max_timesteps: 5,
            ..ReasonerConfig::default()
        };
        let mut reasoner = Reasoner::builder()
            .config(config)
            .graph(GraphSnapshot::new().node("A"))
            .fact(Fact::node("A", "tick", Interval::TRUE).during(0, 100))
            .rule(Rule::new("r", "tock", ["x"]).node_clause("tick", "x"))
            .build()
            .unwrap();
        let outcome = reasoner.reason(None).unwrap();
        assert_eq!(outcome.stop_reason, StopReason::TimestepBudget);
        assert!(!outcome.converged);
        assert_eq!(outcome.last_timestep, Some(4));
    }

    #[test]
    fn again_propagates_within_one_timestep() {
        let rules = RuleSet::new("chain")
            .with_rule(Rule::new("b", "b", ["x"]).node_clause("a", "x"))
            .with_rule(Rule::new("c", "c", ["x"]).node_clause("b", "x"))
            .with_rule(Rule::new("d", "d", ["x"]).node_clause("c", "x"));
        let run = |again: bool| {
            let config = ReasonerConfig {
                again,
                ..ReasonerConfig::default()
            };
            let mut reasoner = Reasoner::builder()
                .config(config)
                .graph(GraphSnapshot::new().node("N"))
                .fact(Fact::node("N", "a", Interval::TRUE))
                .rules(rules.clone())
                .build()
                .unwrap();
            reasoner.reason(Some(0)).unwrap();
            let n = reasoner.interpretation().graph().require("N").unwrap();
            reasoner.interpretation().bound_at(Entity::Node(n), &Label::new("d"), 0)
        };
        assert_eq!(run(false), None);
        assert_eq!(run(true), Some(Interval::TRUE));
    }

    #[test]
    fn again_cap_marks_outcome_unconverged() {
        let rules = RuleSet::new("chain")
            .with_rule(Rule::new("b", "b", ["x"]).node_clause("a", "x"))
            .with_rule(Rule::new("c", "c", ["x"]).node_clause("b", "x"))
            .with_rule(Rule::new("d", "d", ["x"]).node_clause("c", "x"));
        let config = ReasonerConfig {
            again: true,
            max_again_iterations: 1,
            ..ReasonerConfig::default()
        };
        let mut reasoner = Reasoner::builder()
            .config(config)
            .graph(GraphSnapshot::new().node("N"))
            .fact(Fact::node("N", "a", Interval::TRUE))
            .rules(rules)
            .build()
            .unwrap();
        let outcome = reasoner.reason(Some(0)).unwrap();
        assert!(!outcome.converged);
    }

    #[test]
    fn resume_adds_facts_and_timesteps() {
        let mut reasoner = Reasoner::builder()
            .graph(GraphSnapshot::new().node("A").node("B"))
            .fact(Fact::node("A", "p", Interval::TRUE))
            .rule(Rule::new("r", "q", ["x"]).node_clause("p", "x"))
            .build()
            .unwrap();
        let first = reasoner.reason(Some(1)).unwrap();
        assert_eq!(first.last_timestep, Some(1));

        let second = reasoner
            .resume(2, vec![Fact::node("B", "p", Interval::TRUE).during(2, 2)])
            .unwrap();
        assert_eq!(second.last_timestep, Some(3));
        let interp = reasoner.interpretation();
        let b = interp.graph().require("B").unwrap();
        assert_eq!(interp.bound_at(Entity::Node(b), &Label::new("q"), 1), None);
        assert_eq!(interp.bound_at(Entity::Node(b), &Label::new("q"), 2), Some(Interval::TRUE));
    }

    #[test]
    fn non_persistent_bounds_expire_with_their_facts() {
        let config = ReasonerConfig {
            persistent: false,
            ..ReasonerConfig::default()
        };
        let mut reasoner = Reasoner::builder()
            .config(config)
            .graph(GraphSnapshot::new().node("A"))
            .fact(Fact::node("A", "p", Interval::TRUE).during(0, 1))
            .rule(Rule::new("r", "q", ["x"]).node_clause("p", "x"))
            .build()
            .unwrap();
        let outcome = reasoner.reason(None).unwrap();
        assert!(outcome.converged);

        let interp = reasoner.interpretation();
        let a = Entity::Node(interp.graph().require("A").unwrap());
        let p = Label::new("p");
        assert_eq!(interp.bound_at(a, &p, 1), Some(Interval::TRUE));
        assert_eq!(interp.bound_at(a, &p, 2), Some(Interval::unknown()));
    }
}
