//! Grounding strategies.
//!
//! A strategy decides which rules are actually re-grounded on a pass. Both
//! strategies return the same conclusions for the same interpretation; the
//! fact-pointer strategy just avoids recomputing rules whose inputs have not
//! moved.

use crate::config::StrategyKind;
use crate::label::Label;
use crate::rule::Rule;

use super::{Conclusion, GroundingContext, ground_rules};

/// Produces every rule's conclusions for one grounding pass.
pub trait GroundingStrategy: Send {
    fn kind(&self) -> StrategyKind;

    /// Conclusions of all `rules`, in rule order.
    fn ground(&mut self, ctx: &GroundingContext<'_>, rules: &[Rule]) -> Vec<Conclusion>;
}

/// Construct the strategy selected by configuration.
pub fn strategy_for(kind: StrategyKind) -> Box<dyn GroundingStrategy> {
    match kind {
        StrategyKind::Full => Box::new(FullGrounding),
        StrategyKind::FactPointer => Box::new(FactPointerGrounding::default()),
    }
}

// ---------------------------------------------------------------------------
// Full
// ---------------------------------------------------------------------------

/// Re-grounds every rule on every pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullGrounding;

impl GroundingStrategy for FullGrounding {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Full
    }

    fn ground(&mut self, ctx: &GroundingContext<'_>, rules: &[Rule]) -> Vec<Conclusion> {
        let all: Vec<usize> = (0..rules.len()).collect();
        ground_rules(ctx, rules, &all)
            .into_iter()
            .flat_map(|(_, conclusions)| conclusions)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Fact pointer
// ---------------------------------------------------------------------------

/// What a rule's last grounding depended on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    graph_version: u64,
    epochs: Vec<u64>,
}

#[derive(Debug, Clone)]
struct Memo {
    fingerprint: Fingerprint,
    conclusions: Vec<Conclusion>,
}

/// Re-grounds a rule only when a label its body reads has changed on some
/// entity, or the graph structure has changed, since it was last grounded.
/// Otherwise the previous conclusions are replayed.
#[derive(Debug, Clone, Default)]
pub struct FactPointerGrounding {
    memos: Vec<Option<Memo>>,
    regrounded: usize,
    replayed: usize,
}

impl FactPointerGrounding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules grounded from scratch so far.
    pub fn regrounded(&self) -> usize {
        self.regrounded
    }

    /// Rules answered from memo so far.
    pub fn replayed(&self) -> usize {
        self.replayed
    }

    fn fingerprint(ctx: &GroundingContext<'_>, rule: &Rule) -> Fingerprint {
        Fingerprint {
            graph_version: ctx.interp.graph().version(),
            epochs: rule
                .body_labels()
                .map(|label: &Label| ctx.interp.label_epoch(label))
                .collect(),
        }
    }
}

impl GroundingStrategy for FactPointerGrounding {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FactPointer
    }

    fn ground(&mut self, ctx: &GroundingContext<'_>, rules: &[Rule]) -> Vec<Conclusion> {
        self.memos.resize_with(rules.len(), || None);

        let fingerprints: Vec<Fingerprint> =
            rules.iter().map(|r| Self::fingerprint(ctx, r)).collect();
        let stale: Vec<usize> = fingerprints
            .iter()
            .enumerate()
            .filter(|(i, fp)| {
                self.memos[*i]
                    .as_ref()
                    .is_none_or(|memo| &memo.fingerprint != *fp)
            })
            .map(|(i, _)| i)
            .collect();

        self.regrounded += stale.len();
        self.replayed += rules.len() - stale.len();
        tracing::trace!(stale = stale.len(), total = rules.len(), "fact-pointer pass");

        let mut fingerprints: Vec<Option<Fingerprint>> = fingerprints.into_iter().map(Some).collect();
        for (i, conclusions) in ground_rules(ctx, rules, &stale) {
            if let Some(fingerprint) = fingerprints[i].take() {
                self.memos[i] = Some(Memo {
                    fingerprint,
                    conclusions,
                });
            }
        }

        self.memos
            .iter()
            .flatten()
            .flat_map(|memo| memo.conclusions.iter().cloned())
            .collect()
    }
}
