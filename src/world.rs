//! Per-entity truth state.
//!
//! A [`World`] maps labels to intervals for exactly one node or edge. A label
//! that is absent is unknown (`[0, 1]`) and is not stored. Static labels
//! (static facts, graph attributes, annihilated contradictions) are pinned and
//! ignore every later update except an explicit reset.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::interval::{Interval, IntervalResult};
use crate::label::Label;

/// Outcome of writing a bound into a world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundUpdate {
    /// Interval stored before the write (`None` if the label was absent).
    pub previous: Option<Interval>,
    /// Interval stored after the write.
    pub current: Interval,
}

impl BoundUpdate {
    /// The label was absent before this write.
    pub fn inserted(&self) -> bool {
        self.previous.is_none()
    }

    /// The write changed what the world holds.
    pub fn changed(&self) -> bool {
        self.previous != Some(self.current)
    }

    /// Largest bound movement caused by this write.
    pub fn magnitude(&self) -> f64 {
        self.current
            .distance_from(&self.previous.unwrap_or_else(Interval::unknown))
    }
}

/// Label → interval map for one node or edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct World {
    bounds: BTreeMap<Label, Interval>,
    pinned: BTreeSet<Label>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current interval for `label`, or unknown when absent.
    pub fn get(&self, label: &Label) -> Interval {
        self.bounds.get(label).copied().unwrap_or_else(Interval::unknown)
    }

    /// Stored interval for `label`, `None` when absent.
    pub fn bound(&self, label: &Label) -> Option<Interval> {
        self.bounds.get(label).copied()
    }

    pub fn contains(&self, label: &Label) -> bool {
        self.bounds.contains_key(label)
    }

    pub fn is_static(&self, label: &Label) -> bool {
        self.pinned.contains(label)
    }

    /// Intersect the stored interval with `proposed`.
    ///
    /// Fails without touching the world if the two do not overlap.
    pub fn tighten(&mut self, label: &Label, proposed: Interval) -> IntervalResult<BoundUpdate> {
        let previous = self.bound(label);
        let current = previous
            .unwrap_or_else(Interval::unknown)
            .intersect(&proposed)?;
        self.bounds.insert(label.clone(), current);
        Ok(BoundUpdate { previous, current })
    }

    /// Replace the stored interval outright.
    pub fn overwrite(&mut self, label: &Label, value: Interval) -> BoundUpdate {
        let previous = self.bounds.insert(label.clone(), value);
        BoundUpdate {
            previous,
            current: value,
        }
    }

    /// Reset `label` to unknown, keeping it present in the world.
    pub fn reset(&mut self, label: &Label) -> BoundUpdate {
        self.overwrite(label, Interval::unknown())
    }

    pub fn pin(&mut self, label: &Label) {
        self.pinned.insert(label.clone());
    }

    /// Reset every non-static label to unknown. Returns the labels whose
    /// value actually changed.
    pub fn reset_transient(&mut self) -> Vec<Label> {
        let mut changed = Vec::new();
        for (label, bound) in self.bounds.iter_mut() {
            if self.pinned.contains(label) || bound.is_unknown() {
                continue;
            }
            *bound = Interval::unknown();
            changed.push(label.clone());
        }
        changed
    }

    /// Iterate stored labels in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&Label, &Interval)> {
        self.bounds.iter()
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(l: f64, u: f64) -> Interval {
        Interval::new(l, u).unwrap()
    }

    #[test]
    fn absent_label_is_unknown() {
        let world = World::new();
        assert!(world.get(&Label::new("p")).is_unknown());
        assert!(world.bound(&Label::new("p")).is_none());
    }

    #[test]
    fn tighten_inserts_then_narrows() {
        let mut world = World::new();
        let p = Label::new("p");

        let first = world.tighten(&p, iv(0.2, 1.0)).unwrap();
        assert!(first.inserted());
        assert!(first.changed());

        let second = world.tighten(&p, iv(0.0, 0.8)).unwrap();
        assert!(!second.inserted());
        assert_eq!(second.current, iv(0.2, 0.8));
    }

    #[test]
    fn tighten_never_widens() {
        let mut world = World::new();
        let p = Label::new("p");
        world.tighten(&p, Interval::TRUE).unwrap();
        let update = world.tighten(&p, Interval::unknown()).unwrap();
        assert!(!update.changed());
        assert_eq!(world.get(&p), Interval::TRUE);
    }

    #[test]
    fn failed_tighten_leaves_world_untouched() {
        let mut world = World::new();
        let p = Label::new("p");
        world.tighten(&p, Interval::TRUE).unwrap();
        assert!(world.tighten(&p, Interval::FALSE).is_err());
        assert_eq!(world.get(&p), Interval::TRUE);
    }

    #[test]
    fn reset_transient_skips_pinned_labels() {
        let mut world = World::new();
        let fixed = Label::new("fixed");
        let moving = Label::new("moving");
        world.tighten(&fixed, Interval::TRUE).unwrap();
        world.pin(&fixed);
        world.tighten(&moving, Interval::TRUE).unwrap();

        let changed = world.reset_transient();
        assert_eq!(changed, vec![moving.clone()]);
        assert_eq!(world.get(&fixed), Interval::TRUE);
        assert!(world.get(&moving).is_unknown());
        assert!(world.contains(&moving));
    }
}
