//! Benchmarks for grounding and full reasoning runs.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};

use annolog::config::{ReasonerConfig, StrategyKind};
use annolog::fact::Fact;
use annolog::graph::GraphSnapshot;
use annolog::interval::Interval;
use annolog::reasoner::{Reasoner, ReasonerBuilder};
use annolog::rule::Rule;
use annolog::threshold::{QuantifierScope, Threshold, ThresholdMode, ThresholdOp};

/// Random directed graph with `nodes` nodes and about `degree` out-edges each,
/// a sprinkling of seed facts and a diffusion rule with a percent threshold.
fn random_setup(nodes: usize, degree: usize, config: ReasonerConfig) -> ReasonerBuilder {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let mut graph = GraphSnapshot::new();
    for i in 0..nodes {
        graph = graph.node(format!("n{i}"));
    }
    for i in 0..nodes {
        for _ in 0..degree {
            let j = rng.gen_range(0..nodes);
            if i != j {
                graph = graph.labeled_edge(format!("n{i}"), format!("n{j}"), "follows", Interval::TRUE);
            }
        }
    }
    let facts: Vec<Fact> = (0..nodes / 10 + 1)
        .map(|_| {
            let n = rng.gen_range(0..nodes);
            Fact::node(format!("n{n}"), "adopted", Interval::TRUE).during(0, 2)
        })
        .collect();

    let half = Threshold::new(
        ThresholdOp::GreaterEqual,
        ThresholdMode::Percent,
        QuantifierScope::Total,
        50.0,
    );
    Reasoner::builder()
        .config(config)
        .graph(graph)
        .facts(facts)
        .rule(
            Rule::new("influence", "adopted", ["x"])
                .edge_clause("follows", "x", "y")
                .node_clause("adopted", "y")
                .with_thresholds(vec![Threshold::existential(), half])
                .with_delay(1),
        )
        .rule(
            Rule::new("aware", "aware", ["x"])
                .edge_clause("follows", "x", "y")
                .node_clause("adopted", "y"),
        )
}

fn bench_reason(c: &mut Criterion) {
    let mut group = c.benchmark_group("reason_to_fixed_point");
    for nodes in [100, 500] {
        for strategy in [StrategyKind::Full, StrategyKind::FactPointer] {
            let config = ReasonerConfig {
                strategy,
                trace: false,
                ..ReasonerConfig::default()
            };
            group.bench_with_input(
                BenchmarkId::new(strategy.to_string(), nodes),
                &nodes,
                |bench, &nodes| {
                    bench.iter(|| {
                        let mut reasoner = random_setup(nodes, 4, config.clone()).build().unwrap();
                        black_box(reasoner.reason(None).unwrap())
                    })
                },
            );
        }
    }
    group.finish();
}

fn bench_parallel(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_grounding");
    for parallel in [false, true] {
        let config = ReasonerConfig {
            parallel,
            trace: false,
            ..ReasonerConfig::default()
        };
        group.bench_function(if parallel { "parallel" } else { "sequential" }, |bench| {
            bench.iter(|| {
                let mut reasoner = random_setup(1000, 4, config.clone()).build().unwrap();
                black_box(reasoner.reason(None).unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_reason, bench_parallel);
criterion_main!(benches);
