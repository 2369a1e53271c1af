//! Rule grounding: matching rule bodies against the current interpretation.
//!
//! Grounding a rule runs in two phases:
//!
//! 1. **Discovery.** Clauses are joined left to right from an empty binding.
//!    Existential clauses extend bindings with their qualified groundings;
//!    clauses carrying any other threshold extend with every candidate,
//!    because qualification is only decided once counts are known. The
//!    surviving bindings are projected onto the head variables.
//! 2. **Evaluation.** For each distinct head assignment the join is redone
//!    from that assignment. Each node/edge clause counts its candidate,
//!    available and qualified groundings over all current bindings and must
//!    pass its threshold; only qualified groundings carry forward.
//!
//! A head assignment that passes every clause yields a [`Conclusion`].
//! Grounding only reads the [`Interpretation`], so rules can be grounded in
//! parallel against one snapshot.

pub mod strategy;

use std::collections::HashSet;

use rayon::prelude::*;

use crate::annotation::AnnotationRegistry;
use crate::config::ReasonerConfig;
use crate::graph::{Entity, NodeId};
use crate::interpretation::Interpretation;
use crate::interval::Interval;
use crate::label::Label;
use crate::rule::{Clause, CompareOp, Rule, Term};
use crate::threshold::{QuantifierScope, Threshold};
use crate::trace::TraceAtom;

pub use strategy::{FactPointerGrounding, FullGrounding, GroundingStrategy};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A satisfied rule instance: the head atom and the bound it receives.
#[derive(Debug, Clone, PartialEq)]
pub struct Conclusion {
    /// Index of the rule in the reasoner's rule list.
    pub rule: usize,
    pub entity: Entity,
    pub label: Label,
    pub bound: Interval,
    pub delay: usize,
    /// The head edge may be created when missing.
    pub infer_edge: bool,
    /// Qualified groundings that justified the conclusion (atom tracing only).
    pub atoms: Vec<TraceAtom>,
}

/// Read-only inputs shared by every grounding call of one pass.
#[derive(Clone, Copy)]
pub struct GroundingContext<'a> {
    pub interp: &'a Interpretation,
    pub annotations: &'a AnnotationRegistry,
    pub true_threshold: f64,
    pub allow_ground_rules: bool,
    pub atom_trace: bool,
    pub parallel: bool,
}

impl<'a> GroundingContext<'a> {
    pub fn new(
        interp: &'a Interpretation,
        annotations: &'a AnnotationRegistry,
        config: &ReasonerConfig,
    ) -> Self {
        Self {
            interp,
            annotations,
            true_threshold: config.true_threshold,
            allow_ground_rules: config.allow_ground_rules,
            atom_trace: config.atom_trace,
            parallel: config.parallel,
        }
    }
}

/// Ground the rules at `which`, in that order.
///
/// With `parallel` set the rules are spread over the rayon pool; results keep
/// the requested order either way.
pub fn ground_rules(
    ctx: &GroundingContext<'_>,
    rules: &[Rule],
    which: &[usize],
) -> Vec<(usize, Vec<Conclusion>)> {
    let one = |&i: &usize| (i, ground_rule(ctx, i, &rules[i]));
    if ctx.parallel {
        which.par_iter().map(one).collect()
    } else {
        which.iter().map(one).collect()
    }
}

/// Ground a single rule against the context's interpretation.
pub fn ground_rule(ctx: &GroundingContext<'_>, index: usize, rule: &Rule) -> Vec<Conclusion> {
    if rule.clauses.is_empty() {
        return Vec::new();
    }
    let plan = Plan::compile(ctx, rule);
    let grounder = Grounder {
        ctx,
        rule,
        plan: &plan,
        distinct: !(ctx.allow_ground_rules || rule.allow_ground_rules),
    };

    let mut conclusions = Vec::new();
    for head in grounder.discover() {
        let Some(entity) = grounder.head_entity(&head) else {
            continue;
        };
        let Some(evaluation) = grounder.evaluate(&head) else {
            continue;
        };
        let bound = match &rule.annotation {
            Some(name) => match ctx.annotations.get(name) {
                Some(function) => {
                    let weights: Vec<f64> =
                        (0..plan.quantified).map(|q| rule.weight(q)).collect();
                    function.annotate(&evaluation.annotations, &weights)
                }
                None => {
                    tracing::warn!(rule = %rule.name, function = %name, "annotation function vanished");
                    continue;
                }
            },
            None => rule.head_bound,
        };
        conclusions.push(Conclusion {
            rule: index,
            entity,
            label: rule.head.label.clone(),
            bound,
            delay: rule.delay,
            infer_edge: rule.infer_edges,
            atoms: evaluation.atoms,
        });
    }
    conclusions
}

// ---------------------------------------------------------------------------
// Compiled rule
// ---------------------------------------------------------------------------

type Binding = Vec<Option<NodeId>>;

/// A clause argument after constants are resolved.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Var(usize),
    Node(NodeId),
    /// A constant naming a node that is not in the graph.
    Missing,
}

#[derive(Debug, Clone, Copy)]
enum Operand<'r> {
    Var(usize),
    Literal(&'r str),
}

#[derive(Debug)]
enum Step<'r> {
    Node {
        label: &'r Label,
        arg: Slot,
        bound: Option<Interval>,
        q: usize,
    },
    Edge {
        label: &'r Label,
        source: Slot,
        target: Slot,
        bound: Option<Interval>,
        q: usize,
    },
    Compare {
        left: Operand<'r>,
        op: CompareOp,
        right: Operand<'r>,
    },
}

#[derive(Debug)]
struct Plan<'r> {
    vars: Vec<&'r str>,
    steps: Vec<Step<'r>>,
    head: Vec<Slot>,
    quantified: usize,
}

impl<'r> Plan<'r> {
    fn compile(ctx: &GroundingContext<'_>, rule: &'r Rule) -> Self {
        let mut vars: Vec<&'r str> = Vec::new();
        let mut slot = |term: &'r Term| match term {
            Term::Var(name) => {
                let idx = vars.iter().position(|v| *v == name.as_str()).unwrap_or_else(|| {
                    vars.push(name.as_str());
                    vars.len() - 1
                });
                Slot::Var(idx)
            }
            Term::Const(name) => ctx
                .interp
                .graph()
                .node_id(name)
                .map_or(Slot::Missing, Slot::Node),
        };

        let head: Vec<Slot> = rule.head.args.iter().map(&mut slot).collect();
        let mut steps = Vec::with_capacity(rule.clauses.len());
        let mut q = 0;
        for clause in &rule.clauses {
            let step = match clause {
                Clause::Node { label, arg, bound } => {
                    q += 1;
                    Step::Node {
                        label,
                        arg: slot(arg),
                        bound: *bound,
                        q: q - 1,
                    }
                }
                Clause::Edge {
                    label,
                    source,
                    target,
                    bound,
                } => {
                    q += 1;
                    Step::Edge {
                        label,
                        source: slot(source),
                        target: slot(target),
                        bound: *bound,
                        q: q - 1,
                    }
                }
                Clause::Comparison { left, op, right } => {
                    let mut operand = |term: &'r Term| match term {
                        Term::Var(_) => match slot(term) {
                            Slot::Var(v) => Operand::Var(v),
                            _ => Operand::Literal(""),
                        },
                        Term::Const(value) => Operand::Literal(value),
                    };
                    Step::Compare {
                        left: operand(left),
                        op: *op,
                        right: operand(right),
                    }
                }
            };
            steps.push(step);
        }
        Plan {
            vars,
            steps,
            head,
            quantified: q,
        }
    }
}

// ---------------------------------------------------------------------------
// Grounder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Resolved {
    Fixed(NodeId),
    Free(usize),
    Missing,
}

struct Evaluation {
    annotations: Vec<Vec<Interval>>,
    atoms: Vec<TraceAtom>,
}

struct Grounder<'a, 'r> {
    ctx: &'a GroundingContext<'a>,
    rule: &'r Rule,
    plan: &'a Plan<'r>,
    distinct: bool,
}

impl Grounder<'_, '_> {
    fn resolve(&self, slot: Slot, binding: &Binding) -> Resolved {
        match slot {
            Slot::Node(n) => Resolved::Fixed(n),
            Slot::Missing => Resolved::Missing,
            Slot::Var(v) => match binding[v] {
                Some(n) => Resolved::Fixed(n),
                None => Resolved::Free(v),
            },
        }
    }

    /// `node` may be assigned to variable `var` without colliding with
    /// another variable's value.
    fn assignable(&self, binding: &Binding, var: usize, node: NodeId) -> bool {
        !self.distinct
            || binding
                .iter()
                .enumerate()
                .all(|(w, value)| w == var || *value != Some(node))
    }

    fn assign(&self, binding: &Binding, pairs: &[(Resolved, NodeId)]) -> Binding {
        let mut next = binding.clone();
        for (slot, node) in pairs {
            if let Resolved::Free(v) = slot {
                next[*v] = Some(*node);
            }
        }
        next
    }

    /// Structurally possible groundings of a node/edge step.
    fn candidates(&self, step: &Step<'_>, binding: &Binding) -> Vec<Entity> {
        let interp = self.ctx.interp;
        let graph = interp.graph();
        match *step {
            Step::Node { label, arg, .. } => match self.resolve(arg, binding) {
                Resolved::Fixed(n) if graph.contains_node(n) => vec![Entity::Node(n)],
                Resolved::Fixed(_) | Resolved::Missing => Vec::new(),
                Resolved::Free(v) => interp
                    .nodes_with(label)
                    .iter()
                    .filter(|&&n| self.assignable(binding, v, n))
                    .map(|&n| Entity::Node(n))
                    .collect(),
            },
            Step::Edge {
                label,
                source,
                target,
                ..
            } => {
                let s = self.resolve(source, binding);
                let t = self.resolve(target, binding);
                match (s, t) {
                    (Resolved::Missing, _) | (_, Resolved::Missing) => Vec::new(),
                    (Resolved::Fixed(a), Resolved::Fixed(b)) => {
                        if graph.contains_edge(a, b) {
                            vec![Entity::Edge(a, b)]
                        } else {
                            Vec::new()
                        }
                    }
                    (Resolved::Fixed(a), Resolved::Free(v)) => graph
                        .neighbors(a)
                        .filter(|&b| self.assignable(binding, v, b))
                        .map(|b| Entity::Edge(a, b))
                        .collect(),
                    (Resolved::Free(v), Resolved::Fixed(b)) => graph
                        .reverse_neighbors(b)
                        .filter(|&a| self.assignable(binding, v, a))
                        .map(|a| Entity::Edge(a, b))
                        .collect(),
                    (Resolved::Free(v), Resolved::Free(w)) => interp
                        .edges_with(label)
                        .iter()
                        .filter(|&&(a, b)| {
                            self.assignable(binding, v, a)
                                && self.assignable(binding, w, b)
                                && (!self.distinct || v == w || a != b)
                        })
                        .map(|&(a, b)| Entity::Edge(a, b))
                        .collect(),
                }
            }
            Step::Compare { .. } => Vec::new(),
        }
    }

    fn extend(&self, step: &Step<'_>, binding: &Binding, entity: Entity) -> Binding {
        match (step, entity) {
            (Step::Node { arg, .. }, Entity::Node(n)) => {
                self.assign(binding, &[(self.resolve(*arg, binding), n)])
            }
            (Step::Edge { source, target, .. }, Entity::Edge(a, b)) => self.assign(
                binding,
                &[
                    (self.resolve(*source, binding), a),
                    (self.resolve(*target, binding), b),
                ],
            ),
            _ => binding.clone(),
        }
    }

    fn holds_label(&self, entity: Entity, label: &Label) -> bool {
        self.ctx
            .interp
            .world(entity)
            .is_some_and(|w| w.contains(label))
    }

    fn qualifies(&self, entity: Entity, label: &Label, bound: Option<Interval>) -> bool {
        let Some(current) = self.ctx.interp.bound(entity, label) else {
            return false;
        };
        match bound {
            Some(required) => current.is_subset_of(&required),
            None => current.is_true(self.ctx.true_threshold),
        }
    }

    /// `None` when an operand variable is unbound.
    fn compare(&self, binding: &Binding, left: Operand<'_>, op: CompareOp, right: Operand<'_>) -> Option<bool> {
        let value = |operand: Operand<'_>| -> Option<String> {
            match operand {
                Operand::Literal(s) => Some(s.to_string()),
                Operand::Var(v) => binding[v].map(|n| self.ctx.interp.graph().name(n).to_string()),
            }
        };
        Some(op.apply(&value(left)?, &value(right)?))
    }

    fn filter_compare(
        &self,
        bindings: Vec<Binding>,
        left: Operand<'_>,
        op: CompareOp,
        right: Operand<'_>,
    ) -> Vec<Binding> {
        bindings
            .into_iter()
            .filter(|b| match self.compare(b, left, op, right) {
                Some(holds) => holds,
                None => {
                    tracing::warn!(rule = %self.rule.name, "comparison on unbound variable, skipping binding");
                    false
                }
            })
            .collect()
    }

    // -- phase 1 -----------------------------------------------------------

    /// Distinct head assignments worth evaluating, in discovery order.
    fn discover(&self) -> Vec<Vec<NodeId>> {
        let mut bindings: Vec<Binding> = vec![vec![None; self.plan.vars.len()]];
        for step in &self.plan.steps {
            bindings = match *step {
                Step::Compare { left, op, right } => self.filter_compare(bindings, left, op, right),
                Step::Node { label, bound, q, .. } | Step::Edge { label, bound, q, .. } => {
                    let existential = self.rule.threshold(q).is_existential();
                    let mut next = Vec::new();
                    for binding in &bindings {
                        // A non-existential clause can hold with zero
                        // groundings, so the unextended binding stays a
                        // candidate for phase 2.
                        if !existential {
                            next.push(binding.clone());
                        }
                        for entity in self.candidates(step, binding) {
                            if !existential || self.qualifies(entity, label, bound) {
                                next.push(self.extend(step, binding, entity));
                            }
                        }
                    }
                    dedup(next)
                }
            };
            if bindings.is_empty() {
                return Vec::new();
            }
        }

        let mut seen = HashSet::new();
        let mut heads = Vec::new();
        for binding in &bindings {
            for head in self.head_tuples(binding) {
                if seen.insert(head.clone()) {
                    heads.push(head);
                }
            }
        }
        heads
    }

    /// Head assignments reachable from one body binding. Head variables the
    /// body leaves unbound range over all nodes, or over existing edges for
    /// edge heads.
    fn head_tuples(&self, binding: &Binding) -> Vec<Vec<NodeId>> {
        let graph = self.ctx.interp.graph();
        let resolved: Vec<Resolved> = self
            .plan
            .head
            .iter()
            .map(|&slot| self.resolve(slot, binding))
            .collect();
        match resolved.as_slice() {
            [Resolved::Fixed(n)] => vec![vec![*n]],
            [Resolved::Free(v)] => graph
                .nodes()
                .filter(|&n| self.assignable(binding, *v, n))
                .map(|n| vec![n])
                .collect(),
            [Resolved::Fixed(a), Resolved::Fixed(b)] => vec![vec![*a, *b]],
            [Resolved::Fixed(a), Resolved::Free(v)] => graph
                .neighbors(*a)
                .filter(|&b| self.assignable(binding, *v, b))
                .map(|b| vec![*a, b])
                .collect(),
            [Resolved::Free(v), Resolved::Fixed(b)] => graph
                .reverse_neighbors(*b)
                .filter(|&a| self.assignable(binding, *v, a))
                .map(|a| vec![a, *b])
                .collect(),
            [Resolved::Free(v), Resolved::Free(w)] => graph
                .edges()
                .filter(|&(a, b)| {
                    if v == w {
                        return a == b;
                    }
                    self.assignable(binding, *v, a)
                        && self.assignable(binding, *w, b)
                        && (!self.distinct || a != b)
                })
                .map(|(a, b)| vec![a, b])
                .collect(),
            _ => Vec::new(),
        }
    }

    fn head_entity(&self, head: &[NodeId]) -> Option<Entity> {
        let graph = self.ctx.interp.graph();
        match *head {
            [n] => graph.contains_node(n).then_some(Entity::Node(n)),
            [a, b] => {
                let exists = graph.contains_edge(a, b);
                (exists || (self.rule.infer_edges && graph.contains_node(a) && graph.contains_node(b)))
                    .then_some(Entity::Edge(a, b))
            }
            _ => None,
        }
    }

    // -- phase 2 -----------------------------------------------------------

    fn seed(&self, head: &[NodeId]) -> Option<Binding> {
        let mut binding: Binding = vec![None; self.plan.vars.len()];
        for (slot, &node) in self.plan.head.iter().zip(head) {
            if let Slot::Var(v) = *slot {
                match binding[v] {
                    Some(existing) if existing != node => return None,
                    _ => binding[v] = Some(node),
                }
            }
        }
        Some(binding)
    }

    /// Re-run the join from one head assignment, enforcing thresholds.
    fn evaluate(&self, head: &[NodeId]) -> Option<Evaluation> {
        let mut bindings = vec![self.seed(head)?];
        let mut annotations = vec![Vec::new(); self.plan.quantified];
        let mut atoms = Vec::new();

        for step in &self.plan.steps {
            match *step {
                Step::Compare { left, op, right } => {
                    bindings = self.filter_compare(bindings, left, op, right);
                }
                Step::Node { label, bound, q, .. } | Step::Edge { label, bound, q, .. } => {
                    let threshold = self.rule.threshold(q);
                    let mut total: HashSet<Entity> = HashSet::new();
                    let mut available: HashSet<Entity> = HashSet::new();
                    let mut qualified: Vec<Entity> = Vec::new();
                    let mut qualified_seen: HashSet<Entity> = HashSet::new();
                    let mut extended = Vec::new();

                    for binding in &bindings {
                        for entity in self.candidates(step, binding) {
                            total.insert(entity);
                            if self.holds_label(entity, label) {
                                available.insert(entity);
                            }
                            if self.qualifies(entity, label, bound) {
                                if qualified_seen.insert(entity) {
                                    qualified.push(entity);
                                }
                                extended.push(self.extend(step, binding, entity));
                            }
                        }
                    }

                    if !passes(&threshold, qualified.len(), total.len(), available.len()) {
                        return None;
                    }
                    annotations[q] = qualified
                        .iter()
                        .map(|&e| self.ctx.interp.bound(e, label).unwrap_or_else(Interval::unknown))
                        .collect();
                    if self.ctx.atom_trace {
                        atoms.extend(qualified.iter().zip(&annotations[q]).map(|(&e, &b)| TraceAtom {
                            entity: self.ctx.interp.describe(e),
                            label: label.clone(),
                            bound: b,
                        }));
                    }
                    if !extended.is_empty() {
                        bindings = dedup(extended);
                    }
                }
            }
            if bindings.is_empty() {
                return None;
            }
        }
        Some(Evaluation { annotations, atoms })
    }
}

fn passes(threshold: &Threshold, qualified: usize, total: usize, available: usize) -> bool {
    let denominator = match threshold.scope {
        QuantifierScope::Total => total,
        QuantifierScope::Available => available,
    };
    threshold.holds(qualified, denominator)
}

fn dedup(bindings: Vec<Binding>) -> Vec<Binding> {
    let mut seen = HashSet::with_capacity(bindings.len());
    bindings
        .into_iter()
        .filter(|b| seen.insert(b.clone()))
        .collect()
}
