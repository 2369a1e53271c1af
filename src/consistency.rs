//! Consistency checking and conflict resolution.
//!
//! Every bound that reaches an [`Interpretation`] during a run goes through
//! the [`Resolver`]: it tightens by intersection, detects empty intersections
//! and mutually exclusive labels that are both true, and either aborts or
//! resolves the conflict by resetting the labels involved to unknown.
//!
//! A reset label is pinned, so the same contradiction cannot flip it back and
//! forth inside a fixed-point loop.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::{ReasonerConfig, UpdateMode};
use crate::error::ReasonError;
use crate::graph::Entity;
use crate::interpretation::Interpretation;
use crate::interval::Interval;
use crate::label::Label;
use crate::trace::{TraceAtom, TraceEntry, TraceSource};

// ---------------------------------------------------------------------------
// Exclusive pairs
// ---------------------------------------------------------------------------

/// Unordered pairs of labels that may not both be true on one entity.
/// Stored both ways for O(1) lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExclusivePairs {
    partners: HashMap<Label, BTreeSet<Label>>,
}

impl ExclusivePairs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `a` and `b` mutually exclusive. Returns `false` if already known.
    pub fn declare(&mut self, a: impl Into<Label>, b: impl Into<Label>) -> bool {
        let (a, b) = (a.into(), b.into());
        let fresh = self.partners.entry(a.clone()).or_default().insert(b.clone());
        self.partners.entry(b).or_default().insert(a);
        fresh
    }

    pub fn are_exclusive(&self, a: &Label, b: &Label) -> bool {
        self.partners.get(a).is_some_and(|p| p.contains(b))
    }

    /// Labels exclusive with `label`, in label order.
    pub fn partners<'a>(&'a self, label: &Label) -> impl Iterator<Item = &'a Label> + 'a {
        self.partners.get(label).into_iter().flatten()
    }

    /// Number of pairs, counting each once.
    pub fn len(&self) -> usize {
        let directed: usize = self.partners.values().map(BTreeSet::len).sum();
        let self_pairs = self
            .partners
            .iter()
            .filter(|(l, p)| p.contains(*l))
            .count();
        (directed + self_pairs) / 2
    }

    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// A proposed bound for one atom.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub entity: Entity,
    pub label: Label,
    pub bound: Interval,
    pub source: TraceSource,
    pub atoms: Vec<TraceAtom>,
    /// Create the edge first if it does not exist.
    pub create_edge: bool,
    /// Pin the label after a successful write (static facts).
    pub pin: bool,
}

impl Update {
    pub fn new(entity: Entity, label: Label, bound: Interval, source: TraceSource) -> Self {
        Self {
            entity,
            label,
            bound,
            source,
            atoms: Vec::new(),
            create_edge: false,
            pin: false,
        }
    }
}

/// Counters for one committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CommitStats {
    /// Writes that changed a stored bound (resets included).
    pub changes: usize,
    /// Conflicts resolved by reset.
    pub inconsistencies: usize,
    pub edges_created: usize,
    /// Updates dropped because the target is missing or static.
    pub skipped: usize,
    /// Largest bound movement.
    pub max_movement: f64,
}

impl CommitStats {
    fn changed(&mut self, movement: f64) {
        self.changes += 1;
        self.max_movement = self.max_movement.max(movement);
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// The single committer of bound updates.
#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    true_threshold: f64,
    update_mode: UpdateMode,
    check: bool,
    abort: bool,
}

impl Resolver {
    pub fn new(config: &ReasonerConfig) -> Self {
        Self {
            true_threshold: config.true_threshold,
            update_mode: config.update_mode,
            check: config.inconsistency_check,
            abort: config.abort_on_inconsistency,
        }
    }

    fn checking(&self) -> bool {
        self.check && self.update_mode == UpdateMode::Intersection
    }

    /// Apply `updates` in order at timestep `t`.
    ///
    /// With `abort_on_inconsistency` the whole batch is validated first, so a
    /// conflict anywhere in it commits nothing.
    pub fn commit(
        &self,
        interp: &mut Interpretation,
        updates: &[Update],
        t: usize,
        pass: usize,
    ) -> Result<CommitStats, ReasonError> {
        if self.abort && self.checking() {
            self.preflight(interp, updates, t)?;
        }
        let mut stats = CommitStats::default();
        for update in updates {
            self.apply(interp, update, t, pass, &mut stats)?;
        }
        Ok(stats)
    }

    /// Whether applying `update` now would change anything.
    pub fn would_change(&self, interp: &Interpretation, update: &Update) -> bool {
        let exists = interp.graph().contains(update.entity);
        if !exists {
            return update.create_edge;
        }
        if interp.is_static(update.entity, &update.label) {
            return false;
        }
        let current = interp.bound(update.entity, &update.label);
        match self.update_mode {
            UpdateMode::Override => current != Some(update.bound),
            UpdateMode::Intersection => {
                let base = current.unwrap_or_else(Interval::unknown);
                match base.intersect(&update.bound) {
                    Ok(next) => Some(next) != current,
                    Err(_) => true,
                }
            }
        }
    }

    /// Simulate the batch on an overlay and report the first conflict.
    fn preflight(
        &self,
        interp: &Interpretation,
        updates: &[Update],
        t: usize,
    ) -> Result<(), ReasonError> {
        let mut overlay: HashMap<(Entity, Label), Interval> = HashMap::new();
        let mut pinned: BTreeSet<(Entity, Label)> = BTreeSet::new();
        let value = |overlay: &HashMap<(Entity, Label), Interval>, entity: Entity, label: &Label| {
            overlay
                .get(&(entity, label.clone()))
                .copied()
                .or_else(|| interp.bound(entity, label))
        };

        for update in updates {
            let (entity, label) = (update.entity, &update.label);
            if !interp.graph().contains(entity) && !update.create_edge {
                continue;
            }
            let key = (entity, label.clone());
            if interp.is_static(entity, label) || pinned.contains(&key) {
                continue;
            }
            let current = value(&overlay, entity, label);
            let next = current
                .unwrap_or_else(Interval::unknown)
                .intersect(&update.bound)
                .map_err(|_| ReasonError::InconsistentBounds {
                    entity: interp.describe(entity),
                    label: label.to_string(),
                    timestep: t,
                    existing: current.unwrap_or_else(Interval::unknown).to_string(),
                    incoming: update.bound.to_string(),
                })?;
            overlay.insert(key.clone(), next);
            if update.pin {
                pinned.insert(key);
            }
            if !next.is_true(self.true_threshold) {
                continue;
            }
            for partner in interp.exclusive_pairs().partners(label) {
                let other = value(&overlay, entity, partner);
                if other.is_some_and(|b| b.is_true(self.true_threshold)) {
                    return Err(ReasonError::ExclusiveConflict {
                        entity: interp.describe(entity),
                        first: label.to_string(),
                        second: partner.to_string(),
                        timestep: t,
                    });
                }
            }
        }
        Ok(())
    }

    fn apply(
        &self,
        interp: &mut Interpretation,
        update: &Update,
        t: usize,
        pass: usize,
        stats: &mut CommitStats,
    ) -> Result<(), ReasonError> {
        let entity = update.entity;
        let label = &update.label;

        if !interp.graph().contains(entity) {
            match entity {
                Entity::Edge(s, d) if update.create_edge => {
                    if interp.add_edge_ids(s, d)? {
                        stats.edges_created += 1;
                        tracing::debug!(edge = %interp.describe(entity), t, "inferred edge");
                    }
                }
                _ => {
                    stats.skipped += 1;
                    return Ok(());
                }
            }
        }
        if interp.is_static(entity, label) {
            stats.skipped += 1;
            return Ok(());
        }

        let written = match self.update_mode {
            UpdateMode::Override => interp.overwrite(entity, label, update.bound)?,
            UpdateMode::Intersection => match interp.tighten(entity, label, update.bound)? {
                Ok(written) => written,
                Err(_) if !self.check => interp.overwrite(entity, label, update.bound)?,
                Err(_) => {
                    let existing = interp.bound(entity, label).unwrap_or_else(Interval::unknown);
                    if self.abort {
                        return Err(ReasonError::InconsistentBounds {
                            entity: interp.describe(entity),
                            label: label.to_string(),
                            timestep: t,
                            existing: existing.to_string(),
                            incoming: update.bound.to_string(),
                        });
                    }
                    tracing::warn!(
                        entity = %interp.describe(entity),
                        %label,
                        %existing,
                        incoming = %update.bound,
                        t,
                        "inconsistent bounds, resetting to unknown"
                    );
                    self.annihilate(interp, entity, label, &update.source, t, pass, stats)?;
                    return Ok(());
                }
            },
        };

        if update.pin {
            interp.pin(entity, label);
        }
        if written.changed() {
            stats.changed(written.magnitude());
            interp.record(TraceEntry {
                timestep: t,
                pass,
                entity: interp.describe(entity),
                label: label.clone(),
                previous: written.previous,
                bound: written.current,
                source: update.source.clone(),
                atoms: update.atoms.clone(),
            });
        }

        if self.checking() && written.current.is_true(self.true_threshold) {
            self.check_exclusive(interp, entity, label, &update.source, t, pass, stats)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn check_exclusive(
        &self,
        interp: &mut Interpretation,
        entity: Entity,
        label: &Label,
        source: &TraceSource,
        t: usize,
        pass: usize,
        stats: &mut CommitStats,
    ) -> Result<(), ReasonError> {
        let conflicting: Vec<Label> = interp
            .exclusive_pairs()
            .partners(label)
            .filter(|p| {
                interp
                    .bound(entity, p)
                    .is_some_and(|b| b.is_true(self.true_threshold))
            })
            .cloned()
            .collect();
        let Some(first) = conflicting.first() else {
            return Ok(());
        };
        if self.abort {
            return Err(ReasonError::ExclusiveConflict {
                entity: interp.describe(entity),
                first: label.to_string(),
                second: first.to_string(),
                timestep: t,
            });
        }
        tracing::warn!(
            entity = %interp.describe(entity),
            %label,
            partner = %first,
            t,
            "mutually exclusive labels both true, resetting both"
        );
        self.annihilate(interp, entity, label, source, t, pass, stats)?;
        for partner in &conflicting {
            self.annihilate(interp, entity, partner, source, t, pass, stats)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn annihilate(
        &self,
        interp: &mut Interpretation,
        entity: Entity,
        label: &Label,
        source: &TraceSource,
        t: usize,
        pass: usize,
        stats: &mut CommitStats,
    ) -> Result<(), ReasonError> {
        let written = interp.annihilate(entity, label)?;
        stats.inconsistencies += 1;
        if written.changed() {
            stats.changed(written.magnitude());
        }
        interp.record(TraceEntry {
            timestep: t,
            pass,
            entity: interp.describe(entity),
            label: label.clone(),
            previous: written.previous,
            bound: written.current,
            source: TraceSource::Inconsistency(source.name().to_string()),
            atoms: Vec::new(),
        });
        Ok(())
    }
}
