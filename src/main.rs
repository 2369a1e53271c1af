//! annolog CLI: run bundled annotated-logic scenarios.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use annolog::config::{ReasonerConfig, StrategyKind};
use annolog::interval::Interval;
use annolog::query::{self, FilterTable};
use annolog::reasoner::ReasonOutcome;
use annolog::scenario::Scenario;

#[derive(Parser)]
#[command(name = "annolog", version, about = "Annotated-logic reasoning over graphs")]
struct Cli {
    /// Reasoner configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a bundled scenario and print its results.
    Demo {
        scenario: Demo,

        /// Last timestep to run. Runs to a fixed point when omitted.
        #[arg(long)]
        timesteps: Option<usize>,

        /// Grounding strategy (full or fact_pointer).
        #[arg(long)]
        strategy: Option<StrategyKind>,

        /// Ground rules in parallel.
        #[arg(long)]
        parallel: bool,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum Demo {
    Chain,
    Diffusion,
}

impl Demo {
    fn scenario(self) -> Scenario {
        match self {
            Demo::Chain => Scenario::chain(),
            Demo::Diffusion => Scenario::diffusion(),
        }
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ReasonerConfig::from_toml_file(path)?,
        None => ReasonerConfig::default(),
    };

    match cli.command {
        Commands::Demo {
            scenario,
            timesteps,
            strategy,
            parallel,
            json,
        } => {
            if let Some(strategy) = strategy {
                config.strategy = strategy;
            }
            config.parallel |= parallel;

            let scenario = scenario.scenario();
            let name = scenario.name;
            let description = scenario.description;
            let labels = scenario.report.clone();
            let mut reasoner = scenario.builder(config).build()?;
            let outcome = reasoner.reason(timesteps)?;
            let interp = reasoner.interpretation();

            let last = outcome.last_timestep.unwrap_or(0);
            let tables = (0..=last)
                .map(|t| query::filter(interp, &labels, t))
                .collect::<std::result::Result<Vec<_>, _>>()?;

            if json {
                let report = serde_json::json!({
                    "scenario": name,
                    "outcome": outcome,
                    "timesteps": tables,
                    "trace": query::trace(interp).ok().map(|log| log.entries()),
                });
                let json = serde_json::to_string_pretty(&report).into_diagnostic()?;
                println!("{json}");
            } else {
                println!("Scenario: {name} ({description})");
                print_outcome(&outcome);
                for table in &tables {
                    print_table(table);
                }
                match query::trace(interp) {
                    Ok(log) => {
                        println!("\nTrace ({} entries):", log.len());
                        for entry in log.entries() {
                            println!(
                                "  t={} pass={} {}({}) {} -> {} [{}]",
                                entry.timestep,
                                entry.pass,
                                entry.label,
                                entry.entity,
                                entry.previous.map_or_else(|| "-".to_string(), |p| p.to_string()),
                                entry.bound,
                                entry.source.name()
                            );
                        }
                    }
                    Err(e) => println!("\nTrace: {e}"),
                }
            }
        }

        Commands::Config => {
            config.validate()?;
            print!("{}", config.to_toml_string()?);
        }
    }

    Ok(())
}

fn print_outcome(outcome: &ReasonOutcome) {
    println!(
        "Stopped: {:?} after {} timestep(s), last t={}, converged={}, changes={}",
        outcome.stop_reason,
        outcome.timesteps,
        outcome
            .last_timestep
            .map_or_else(|| "-".to_string(), |t| t.to_string()),
        outcome.converged,
        outcome.changes
    );
}

fn print_table(table: &FilterTable) {
    println!("\nTIMESTEP {}", table.timestep);
    if table.is_empty() {
        println!("  (no entities)");
        return;
    }
    let header: Vec<&str> = table.labels.iter().map(|l| l.as_str()).collect();
    println!("  {:<16} {}", "entity", header.join("  "));
    for row in &table.rows {
        let cells: Vec<String> = row
            .bounds
            .iter()
            .map(|b| b.map_or_else(|| "-".to_string(), |b: Interval| b.to_string()))
            .collect();
        println!("  {:<16} {}", row.entity, cells.join("  "));
    }
}
