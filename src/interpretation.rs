//! The aggregate root of a reasoning run.
//!
//! An [`Interpretation`] owns the graph, one [`World`] per node and edge, the
//! two predicate indices, the exclusive-pair table, the trace log and the
//! per-timestep history. Every mutation goes through methods here so the
//! indices, label epochs and history bookkeeping stay in step with the worlds.

use std::collections::{HashMap, HashSet};

use crate::consistency::ExclusivePairs;
use crate::error::GraphError;
use crate::graph::{EdgeKey, Entity, Graph, GraphResult, NodeId, PredicateIndex};
use crate::interval::{Interval, IntervalResult};
use crate::label::Label;
use crate::trace::{TraceEntry, TraceLog};
use crate::world::{BoundUpdate, World};

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// End-of-timestep values per atom, stored as change points.
#[derive(Debug, Clone, Default)]
struct History {
    points: HashMap<(Entity, Label), Vec<(usize, Option<Interval>)>>,
}

impl History {
    fn latest(&self, key: &(Entity, Label)) -> Option<Interval> {
        self.points
            .get(key)
            .and_then(|p| p.last())
            .and_then(|(_, v)| *v)
    }

    fn at(&self, key: &(Entity, Label), t: usize) -> Option<Interval> {
        let points = self.points.get(key)?;
        let idx = points.partition_point(|(time, _)| *time <= t);
        idx.checked_sub(1).and_then(|i| points[i].1)
    }

    fn record(&mut self, key: (Entity, Label), t: usize, value: Option<Interval>) {
        let points = self.points.entry(key).or_default();
        match points.last_mut() {
            Some(last) if last.0 == t => last.1 = value,
            _ => points.push((t, value)),
        }
    }

    fn keys(&self) -> impl Iterator<Item = &(Entity, Label)> {
        self.points.keys()
    }
}

/// How much a timestep changed relative to the previous one.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimestepDelta {
    /// Atoms whose end-of-timestep bound differs from the previous timestep.
    pub changed: usize,
    /// Largest bound movement among them.
    pub max_movement: f64,
}

// ---------------------------------------------------------------------------
// Interpretation
// ---------------------------------------------------------------------------

/// Truth state of one reasoning run.
#[derive(Debug, Clone, Default)]
pub struct Interpretation {
    graph: Graph,
    node_worlds: HashMap<NodeId, World>,
    edge_worlds: HashMap<EdgeKey, World>,
    node_index: PredicateIndex<NodeId>,
    edge_index: PredicateIndex<EdgeKey>,
    exclusive: ExclusivePairs,
    trace: Option<TraceLog>,
    history: History,
    label_epochs: HashMap<Label, u64>,
    epoch: u64,
    touched: HashSet<(Entity, Label)>,
    last_timestep: Option<usize>,
}

impl Interpretation {
    /// An empty interpretation. `trace` controls whether changes are logged.
    pub fn new(exclusive: ExclusivePairs, trace: bool) -> Self {
        Self {
            exclusive,
            trace: trace.then(TraceLog::new),
            ..Self::default()
        }
    }

    // -- structure ---------------------------------------------------------

    /// Add a node by name. Idempotent.
    pub fn add_node(&mut self, name: &str) -> GraphResult<NodeId> {
        let id = self.graph.add_node(name)?;
        self.node_worlds.entry(id).or_default();
        Ok(id)
    }

    /// Add an edge by endpoint names, creating missing endpoints.
    pub fn add_edge(&mut self, source: &str, target: &str) -> GraphResult<EdgeKey> {
        let s = self.add_node(source)?;
        let t = self.add_node(target)?;
        self.add_edge_ids(s, t)?;
        Ok((s, t))
    }

    /// Add an edge between existing nodes. Returns `false` if it existed.
    pub(crate) fn add_edge_ids(&mut self, source: NodeId, target: NodeId) -> GraphResult<bool> {
        let created = self.graph.add_edge(source, target)?;
        if created {
            self.edge_worlds.entry((source, target)).or_default();
        }
        Ok(created)
    }

    /// Delete a node, its world, and every incident edge.
    pub fn delete_node(&mut self, name: &str) -> GraphResult<()> {
        let id = self.graph.require(name)?;
        for key in self.graph.remove_node(id)? {
            self.drop_edge_world(key);
        }
        if let Some(world) = self.node_worlds.remove(&id) {
            let labels: Vec<Label> = world.iter().map(|(l, _)| l.clone()).collect();
            self.node_index.purge(id, labels.iter());
            for label in labels {
                self.mark(Entity::Node(id), &label);
            }
        }
        tracing::debug!(node = name, "deleted node");
        Ok(())
    }

    /// Delete one edge and its world.
    pub fn delete_edge(&mut self, source: &str, target: &str) -> GraphResult<()> {
        let s = self.graph.require(source)?;
        let t = self.graph.require(target)?;
        self.graph.remove_edge(s, t)?;
        self.drop_edge_world((s, t));
        Ok(())
    }

    fn drop_edge_world(&mut self, key: EdgeKey) {
        if let Some(world) = self.edge_worlds.remove(&key) {
            let labels: Vec<Label> = world.iter().map(|(l, _)| l.clone()).collect();
            self.edge_index.purge(key, labels.iter());
            for label in labels {
                self.mark(Entity::edge(key), &label);
            }
        }
    }

    // -- read access -------------------------------------------------------

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn world(&self, entity: Entity) -> Option<&World> {
        match entity {
            Entity::Node(n) => self.node_worlds.get(&n),
            Entity::Edge(s, t) => self.edge_worlds.get(&(s, t)),
        }
    }

    /// Current stored bound, `None` when absent.
    pub fn bound(&self, entity: Entity, label: &Label) -> Option<Interval> {
        self.world(entity).and_then(|w| w.bound(label))
    }

    pub fn is_static(&self, entity: Entity, label: &Label) -> bool {
        self.world(entity).is_some_and(|w| w.is_static(label))
    }

    /// Nodes whose world holds `label`.
    pub fn nodes_with(&self, label: &Label) -> &[NodeId] {
        self.node_index.members(label)
    }

    /// Edges whose world holds `label`.
    pub fn edges_with(&self, label: &Label) -> &[EdgeKey] {
        self.edge_index.members(label)
    }

    pub fn exclusive_pairs(&self) -> &ExclusivePairs {
        &self.exclusive
    }

    pub fn describe(&self, entity: Entity) -> String {
        self.graph.describe(entity)
    }

    /// Trace log, `None` when tracing is disabled.
    pub fn trace(&self) -> Option<&TraceLog> {
        self.trace.as_ref()
    }

    /// Last timestep the scheduler completed.
    pub fn last_timestep(&self) -> Option<usize> {
        self.last_timestep
    }

    /// Mutation counter for `label`. Changes whenever any entity's bound for
    /// `label` changes.
    pub fn label_epoch(&self, label: &Label) -> u64 {
        self.label_epochs.get(label).copied().unwrap_or(0)
    }

    /// Bound of `label` on `entity` at the end of timestep `t`.
    ///
    /// Range checking is left to the caller; see [`crate::query`].
    pub fn bound_at(&self, entity: Entity, label: &Label, t: usize) -> Option<Interval> {
        self.history.at(&(entity, label.clone()), t)
    }

    /// Every atom that ever held a bound.
    pub fn recorded_atoms(&self) -> impl Iterator<Item = &(Entity, Label)> {
        self.history.keys()
    }

    // -- mutation ----------------------------------------------------------

    fn world_mut(&mut self, entity: Entity) -> GraphResult<&mut World> {
        if !self.graph.contains(entity) {
            return Err(self.missing(entity));
        }
        Ok(match entity {
            Entity::Node(n) => self.node_worlds.entry(n).or_default(),
            Entity::Edge(s, t) => self.edge_worlds.entry((s, t)).or_default(),
        })
    }

    fn missing(&self, entity: Entity) -> GraphError {
        match entity {
            Entity::Node(n) => GraphError::NodeNotFound {
                name: self.graph.name(n).to_string(),
            },
            Entity::Edge(s, t) => GraphError::EdgeNotFound {
                source_name: self.graph.name(s).to_string(),
                target_name: self.graph.name(t).to_string(),
            },
        }
    }

    fn mark(&mut self, entity: Entity, label: &Label) {
        self.epoch += 1;
        self.label_epochs.insert(label.clone(), self.epoch);
        self.touched.insert((entity, label.clone()));
    }

    fn after_write(&mut self, entity: Entity, label: &Label, update: &BoundUpdate) {
        if update.inserted() {
            match entity {
                Entity::Node(n) => self.node_index.insert(label, n),
                Entity::Edge(s, t) => self.edge_index.insert(label, (s, t)),
            };
        }
        if update.changed() {
            self.mark(entity, label);
        }
    }

    /// Intersect the stored bound with `proposed`.
    ///
    /// The outer error is a missing entity; the inner one an empty
    /// intersection, in which case nothing was written.
    pub(crate) fn tighten(
        &mut self,
        entity: Entity,
        label: &Label,
        proposed: Interval,
    ) -> GraphResult<IntervalResult<BoundUpdate>> {
        let world = self.world_mut(entity)?;
        let result = world.tighten(label, proposed);
        if let Ok(update) = &result {
            self.after_write(entity, label, update);
        }
        Ok(result)
    }

    /// Replace the stored bound.
    pub(crate) fn overwrite(
        &mut self,
        entity: Entity,
        label: &Label,
        value: Interval,
    ) -> GraphResult<BoundUpdate> {
        let world = self.world_mut(entity)?;
        let update = world.overwrite(label, value);
        self.after_write(entity, label, &update);
        Ok(update)
    }

    /// Reset `label` to unknown and pin it.
    pub(crate) fn annihilate(&mut self, entity: Entity, label: &Label) -> GraphResult<BoundUpdate> {
        let update = self.overwrite(entity, label, Interval::unknown())?;
        self.pin(entity, label);
        Ok(update)
    }

    pub(crate) fn pin(&mut self, entity: Entity, label: &Label) {
        if let Ok(world) = self.world_mut(entity) {
            world.pin(label);
        }
    }

    /// Reset every non-static bound to unknown.
    pub(crate) fn reset_transient(&mut self) -> usize {
        let mut reset: Vec<(Entity, Label)> = Vec::new();
        for (&n, world) in self.node_worlds.iter_mut() {
            reset.extend(world.reset_transient().into_iter().map(|l| (Entity::Node(n), l)));
        }
        for (&key, world) in self.edge_worlds.iter_mut() {
            reset.extend(world.reset_transient().into_iter().map(|l| (Entity::edge(key), l)));
        }
        let count = reset.len();
        for (entity, label) in reset {
            self.mark(entity, &label);
        }
        count
    }

    pub(crate) fn record(&mut self, entry: TraceEntry) {
        if let Some(log) = self.trace.as_mut() {
            log.push(entry);
        }
    }

    /// Close timestep `t`: store end-of-timestep values for every atom touched
    /// since the previous close and report how much changed.
    pub(crate) fn seal_timestep(&mut self, t: usize) -> TimestepDelta {
        let mut delta = TimestepDelta::default();
        for key in std::mem::take(&mut self.touched) {
            let current = self.bound(key.0, &key.1);
            let previous = self.history.latest(&key);
            if current == previous {
                continue;
            }
            let movement = current
                .unwrap_or_else(Interval::unknown)
                .distance_from(&previous.unwrap_or_else(Interval::unknown));
            delta.changed += 1;
            delta.max_movement = delta.max_movement.max(movement);
            self.history.record(key, t, current);
        }
        self.last_timestep = Some(t);
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interp() -> Interpretation {
        Interpretation::new(ExclusivePairs::new(), true)
    }

    #[test]
    fn tighten_updates_index_and_epoch() {
        let mut i = interp();
        let a = i.add_node("A").unwrap();
        let p = Label::new("p");
        assert_eq!(i.label_epoch(&p), 0);

        let update = i.tighten(Entity::Node(a), &p, Interval::TRUE).unwrap().unwrap();
        assert!(update.inserted());
        assert_eq!(i.nodes_with(&p), &[a]);
        let epoch = i.label_epoch(&p);
        assert!(epoch > 0);

        i.tighten(Entity::Node(a), &p, Interval::TRUE).unwrap().unwrap();
        assert_eq!(i.label_epoch(&p), epoch);
    }

    #[test]
    fn tighten_missing_entity_fails() {
        let mut i = interp();
        let a = i.add_node("A").unwrap();
        let b = i.add_node("B").unwrap();
        assert!(matches!(
            i.tighten(Entity::Edge(a, b), &Label::new("p"), Interval::TRUE),
            Err(GraphError::EdgeNotFound { .. })
        ));
    }

    #[test]
    fn delete_node_purges_edges_and_indices() {
        let mut i = interp();
        let (a, b) = i.add_edge("A", "B").unwrap();
        let link = Label::new("link");
        let p = Label::new("p");
        i.tighten(Entity::Edge(a, b), &link, Interval::TRUE).unwrap().unwrap();
        i.tighten(Entity::Node(b), &p, Interval::TRUE).unwrap().unwrap();

        i.delete_node("B").unwrap();
        assert!(i.edges_with(&link).is_empty());
        assert!(i.nodes_with(&p).is_empty());
        assert!(i.world(Entity::Edge(a, b)).is_none());
        assert_eq!(i.graph().edge_count(), 0);
    }

    #[test]
    fn history_answers_past_timesteps() {
        let mut i = interp();
        let a = i.add_node("A").unwrap();
        let p = Label::new("p");

        assert_eq!(i.seal_timestep(0).changed, 0);
        i.tighten(Entity::Node(a), &p, Interval::new(0.5, 1.0).unwrap())
            .unwrap()
            .unwrap();
        let d1 = i.seal_timestep(1);
        assert_eq!(d1.changed, 1);
        assert!((d1.max_movement - 0.5).abs() < 1e-12);
        i.tighten(Entity::Node(a), &p, Interval::TRUE).unwrap().unwrap();
        i.seal_timestep(2);

        let n = Entity::Node(a);
        assert_eq!(i.bound_at(n, &p, 0), None);
        assert_eq!(i.bound_at(n, &p, 1), Some(Interval::new(0.5, 1.0).unwrap()));
        assert_eq!(i.bound_at(n, &p, 2), Some(Interval::TRUE));
        assert_eq!(i.bound_at(n, &p, 7), Some(Interval::TRUE));
        assert_eq!(i.last_timestep(), Some(2));
    }

    #[test]
    fn value_restored_within_timestep_is_not_a_change() {
        let mut i = interp();
        let a = i.add_node("A").unwrap();
        let p = Label::new("p");
        i.tighten(Entity::Node(a), &p, Interval::TRUE).unwrap().unwrap();
        i.seal_timestep(0);

        i.reset_transient();
        i.tighten(Entity::Node(a), &p, Interval::TRUE).unwrap().unwrap();
        assert_eq!(i.seal_timestep(1).changed, 0);
    }

    #[test]
    fn annihilate_pins_label() {
        let mut i = interp();
        let a = i.add_node("A").unwrap();
        let p = Label::new("p");
        i.tighten(Entity::Node(a), &p, Interval::TRUE).unwrap().unwrap();
        i.annihilate(Entity::Node(a), &p).unwrap();
        assert!(i.is_static(Entity::Node(a), &p));
        assert_eq!(i.bound(Entity::Node(a), &p), Some(Interval::unknown()));
        assert_eq!(i.reset_transient(), 0);
    }
}
