//! Bundled scenarios.
//!
//! Small self-contained graphs with facts and rules, used by the `demo`
//! command, the benchmarks and the end-to-end tests.

use crate::config::ReasonerConfig;
use crate::fact::Fact;
use crate::graph::GraphSnapshot;
use crate::interval::Interval;
use crate::label::Label;
use crate::reasoner::{Reasoner, ReasonerBuilder};
use crate::rule::{Rule, RuleSet};

/// A graph plus the facts and rules that run over it.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub graph: GraphSnapshot,
    pub facts: Vec<Fact>,
    pub rules: RuleSet,
    /// Labels worth printing after a run.
    pub report: Vec<Label>,
}

impl Scenario {
    /// Names accepted by [`Scenario::by_name`].
    pub const NAMES: [&'static str; 2] = ["chain", "diffusion"];

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "chain" => Some(Self::chain()),
            "diffusion" => Some(Self::diffusion()),
            _ => None,
        }
    }

    /// `A -> B -> C -> D` with `connected` facts on the links and a delayed
    /// transitivity rule that infers the missing edges.
    pub fn chain() -> Self {
        let links = [("A", "B"), ("B", "C"), ("C", "D")];
        let mut graph = GraphSnapshot::new();
        for (s, t) in links {
            graph = graph.edge(s, t);
        }
        Self {
            name: "chain",
            description: "transitive closure of connected edges, one hop per timestep",
            graph,
            facts: links
                .iter()
                .map(|(s, t)| Fact::edge(*s, *t, "connected", Interval::TRUE).during(0, 4))
                .collect(),
            rules: RuleSet::new("chain").with_rule(
                Rule::new("transitive", "connected", ["x", "z"])
                    .edge_clause("connected", "x", "y")
                    .edge_clause("connected", "y", "z")
                    .with_delay(1)
                    .infer_edges(),
            ),
            report: vec![Label::new("connected")],
        }
    }

    /// Popularity spreading between friends who own the same pet.
    pub fn diffusion() -> Self {
        let friends = Label::new("friends");
        let owns = Label::new("owns");
        let graph = GraphSnapshot::new()
            .labeled_edge("Justin", "Mary", friends.clone(), Interval::TRUE)
            .labeled_edge("John", "Justin", friends.clone(), Interval::TRUE)
            .labeled_edge("John", "Mary", friends, Interval::TRUE)
            .labeled_edge("Mary", "Cat", owns.clone(), Interval::TRUE)
            .labeled_edge("Justin", "Cat", owns.clone(), Interval::TRUE)
            .labeled_edge("Justin", "Dog", owns.clone(), Interval::TRUE)
            .labeled_edge("John", "Dog", owns, Interval::TRUE);
        Self {
            name: "diffusion",
            description: "popular(x) <-1 popular(y), friends(x,y), owns(y,z), owns(x,z)",
            graph,
            facts: vec![Fact::node("Mary", "popular", Interval::TRUE).during(0, 2).named("popular-fact")],
            rules: RuleSet::new("diffusion").with_rule(
                Rule::new("popular_rule", "popular", ["x"])
                    .node_clause("popular", "y")
                    .edge_clause("friends", "x", "y")
                    .edge_clause("owns", "y", "z")
                    .edge_clause("owns", "x", "z")
                    .with_delay(1),
            ),
            report: vec![Label::new("popular")],
        }
    }

    /// Load the scenario into a reasoner builder.
    pub fn builder(self, config: ReasonerConfig) -> ReasonerBuilder {
        Reasoner::builder()
            .config(config)
            .graph(self.graph)
            .facts(self.facts)
            .rules(self.rules)
    }
}
