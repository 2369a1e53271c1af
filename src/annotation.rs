//! Annotation functions: combine the intervals of satisfying groundings into
//! the interval asserted by a rule head.
//!
//! Rules refer to annotation functions by name; the [`AnnotationRegistry`]
//! resolves names when the reasoner is built, so an unknown name is a
//! configuration error rather than a runtime surprise.

use std::collections::HashMap;
use std::sync::Arc;

use crate::interval::Interval;

/// Combines per-clause grounding intervals into a head interval.
///
/// `annotations[i]` holds the intervals of every qualified grounding of the
/// i-th node/edge clause; `weights[i]` is that clause's weight.
pub trait AnnotationFn: Send + Sync {
    fn annotate(&self, annotations: &[Vec<Interval>], weights: &[f64]) -> Interval;
}

impl<F> AnnotationFn for F
where
    F: Fn(&[Vec<Interval>], &[f64]) -> Interval + Send + Sync,
{
    fn annotate(&self, annotations: &[Vec<Interval>], weights: &[f64]) -> Interval {
        self(annotations, weights)
    }
}

/// Name → annotation function table.
#[derive(Clone)]
pub struct AnnotationRegistry {
    functions: HashMap<String, Arc<dyn AnnotationFn>>,
}

impl AnnotationRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// A registry holding `average`, `average_lower`, `maximum` and `minimum`.
    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();
        reg.register("average", average);
        reg.register("average_lower", average_lower);
        reg.register("maximum", maximum);
        reg.register("minimum", minimum);
        reg
    }

    pub fn register(&mut self, name: impl Into<String>, function: impl AnnotationFn + 'static) {
        self.functions.insert(name.into(), Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AnnotationFn>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for AnnotationRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for AnnotationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Built-ins
// ---------------------------------------------------------------------------

fn clamp_interval(lower: f64, upper: f64) -> Interval {
    Interval::new(lower.clamp(0.0, 1.0), upper.clamp(0.0, 1.0)).unwrap_or_else(|_| Interval::unknown())
}

fn weighted_means(annotations: &[Vec<Interval>], weights: &[f64]) -> Option<(f64, f64)> {
    let mut total_weight = 0.0;
    let mut lower = 0.0;
    let mut upper = 0.0;
    for (i, group) in annotations.iter().enumerate() {
        let w = weights.get(i).copied().unwrap_or(1.0);
        for bound in group {
            lower += w * bound.lower();
            upper += w * bound.upper();
            total_weight += w;
        }
    }
    (total_weight > 0.0).then(|| (lower / total_weight, upper / total_weight))
}

/// Weighted mean of lower and upper bounds.
pub fn average(annotations: &[Vec<Interval>], weights: &[f64]) -> Interval {
    match weighted_means(annotations, weights) {
        Some((l, u)) => clamp_interval(l, u),
        None => Interval::unknown(),
    }
}

/// Weighted mean of lower bounds, upper bound left at 1.
pub fn average_lower(annotations: &[Vec<Interval>], weights: &[f64]) -> Interval {
    match weighted_means(annotations, weights) {
        Some((l, _)) => clamp_interval(l, 1.0),
        None => Interval::unknown(),
    }
}

/// Largest lower and largest upper bound.
pub fn maximum(annotations: &[Vec<Interval>], _weights: &[f64]) -> Interval {
    let mut all = annotations.iter().flatten().peekable();
    if all.peek().is_none() {
        return Interval::unknown();
    }
    let (l, u) = all.fold((0.0_f64, 0.0_f64), |(l, u), b| {
        (l.max(b.lower()), u.max(b.upper()))
    });
    clamp_interval(l, u)
}

/// Smallest lower and smallest upper bound.
pub fn minimum(annotations: &[Vec<Interval>], _weights: &[f64]) -> Interval {
    let mut all = annotations.iter().flatten().peekable();
    if all.peek().is_none() {
        return Interval::unknown();
    }
    let (l, u) = all.fold((1.0_f64, 1.0_f64), |(l, u), b| {
        (l.min(b.lower()), u.min(b.upper()))
    });
    clamp_interval(l, u)
}
