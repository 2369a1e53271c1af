//! Property-based tests over random graphs.
//!
//! These check the guarantees callers rely on regardless of input shape:
//! both grounding strategies compute the same interpretation, persistent runs
//! only ever tighten bounds, and re-asserting a fact is a no-op.

use proptest::prelude::*;

use annolog::config::{ReasonerConfig, StrategyKind};
use annolog::fact::Fact;
use annolog::graph::GraphSnapshot;
use annolog::interval::Interval;
use annolog::label::Label;
use annolog::query::FilterTable;
use annolog::reasoner::Reasoner;
use annolog::rule::{Rule, RuleSet};

const NODES: usize = 6;

/// Nested so that no two fact bounds contradict each other.
const BOUNDS: [(f64, f64); 4] = [(0.0, 1.0), (0.2, 0.9), (0.4, 0.8), (0.5, 0.7)];

#[derive(Debug, Clone)]
struct Input {
    edges: Vec<(usize, usize)>,
    facts: Vec<(usize, usize, usize, usize)>,
}

fn input() -> impl Strategy<Value = Input> {
    (
        prop::collection::vec((0..NODES, 0..NODES), 0..12),
        prop::collection::vec((0..NODES, 0..BOUNDS.len(), 0usize..4, 0usize..3), 1..8),
    )
        .prop_map(|(edges, facts)| Input { edges, facts })
}

fn name(i: usize) -> String {
    format!("n{i}")
}

fn rules() -> RuleSet {
    RuleSet::new("random")
        .with_rule(
            Rule::new("spread", "b", ["x"])
                .edge_clause("link", "x", "y")
                .bounded_node_clause("a", "y", Interval::new(0.2, 1.0).unwrap()),
        )
        .with_rule(
            Rule::new("both", "c", ["x"])
                .node_clause("b", "x")
                .bounded_node_clause("a", "x", Interval::new(0.4, 1.0).unwrap())
                .with_delay(1),
        )
        .with_rule(
            Rule::new("reach", "link", ["x", "z"])
                .edge_clause("link", "x", "y")
                .edge_clause("link", "y", "z")
                .with_delay(1)
                .infer_edges(),
        )
}

fn facts(input: &Input) -> Vec<Fact> {
    input
        .facts
        .iter()
        .map(|&(node, bound, start, len)| {
            let (lower, upper) = BOUNDS[bound];
            Fact::node(name(node), "a", Interval::new(lower, upper).unwrap())
                .during(start, start + len)
        })
        .collect()
}

fn graph(input: &Input) -> GraphSnapshot {
    let mut graph = GraphSnapshot::new();
    for i in 0..NODES {
        graph = graph.node(name(i));
    }
    for &(s, t) in input.edges.iter().filter(|(s, t)| s != t) {
        graph = graph.labeled_edge(name(s), name(t), "link", Interval::TRUE);
    }
    graph
}

fn labels() -> Vec<Label> {
    ["a", "b", "c", "link"].into_iter().map(Label::new).collect()
}

fn run(input: &Input, facts: Vec<Fact>, config: ReasonerConfig) -> (Reasoner, Vec<FilterTable>) {
    let mut reasoner = Reasoner::builder()
        .config(config)
        .graph(graph(input))
        .facts(facts)
        .rules(rules())
        .build()
        .unwrap();
    let outcome = reasoner.reason(None).unwrap();
    let last = outcome.last_timestep.unwrap();
    let tables = (0..=last)
        .map(|t| reasoner.filter(&labels(), t).unwrap())
        .collect();
    (reasoner, tables)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn strategies_compute_the_same_interpretation(input in input()) {
        let full = ReasonerConfig { strategy: StrategyKind::Full, ..ReasonerConfig::default() };
        let pointer = ReasonerConfig { strategy: StrategyKind::FactPointer, ..ReasonerConfig::default() };

        let (a, tables_a) = run(&input, facts(&input), full);
        let (b, tables_b) = run(&input, facts(&input), pointer);

        prop_assert_eq!(tables_a, tables_b);
        prop_assert_eq!(
            a.interpretation().trace().unwrap().entries(),
            b.interpretation().trace().unwrap().entries()
        );
    }

    #[test]
    fn persistent_bounds_only_tighten(input in input()) {
        let (reasoner, _) = run(&input, facts(&input), ReasonerConfig::default());
        let interp = reasoner.interpretation();
        let last = interp.last_timestep().unwrap();

        for (entity, label) in interp.recorded_atoms() {
            for t in 0..last {
                let (Some(before), Some(after)) = (
                    interp.bound_at(*entity, label, t),
                    interp.bound_at(*entity, label, t + 1),
                ) else {
                    continue;
                };
                prop_assert!(
                    after.is_subset_of(&before),
                    "{} {} widened from {} to {} at t={}",
                    interp.describe(*entity), label, before, after, t + 1
                );
            }
        }
    }

    #[test]
    fn repeating_facts_changes_nothing(input in input()) {
        let once = facts(&input);
        let mut twice = once.clone();
        twice.extend(once.iter().cloned());

        let (_, tables_once) = run(&input, once, ReasonerConfig::default());
        let (_, tables_twice) = run(&input, twice, ReasonerConfig::default());
        prop_assert_eq!(tables_once, tables_twice);
    }
}
