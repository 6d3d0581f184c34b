use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use migrasim::scenario::ScenarioLoader;

#[derive(Debug, Parser)]
#[command(author, version, about = "Inter-city migration simulator")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/two_cities.yaml")]
    scenario: PathBuf,

    /// Override the scenario's max_steps
    #[arg(long)]
    max_steps: Option<u64>,

    /// Override the scenario's random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print the outcome and final world as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let loader = ScenarioLoader::new(".");
    let scenario = loader.load(&cli.scenario)?;
    let mut config = scenario.simulation.to_builder();
    if let Some(max_steps) = cli.max_steps {
        config = config.max_steps(max_steps);
    }
    if let Some(seed) = cli.seed {
        config = config.random_seed(seed);
    }
    let config = config.build().context("invalid command-line overrides")?;

    let mut world = scenario
        .build_world()
        .with_context(|| format!("scenario '{}' has an invalid world", scenario.name))?;
    let engine = scenario.engine_builder(&world, config)?.build();
    info!(scenario = %scenario.name, "starting run");
    let outcome = engine.run(&mut world)?;

    if cli.json {
        let report = serde_json::json!({
            "scenario": scenario.name,
            "outcome": outcome,
            "world": world.snapshot(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Scenario '{}' finished after {} ticks ({:?}). Final population: {:.2}",
            scenario.name,
            outcome.ticks,
            outcome.reason,
            world.total_population()
        );
        for city in world.cities() {
            println!("  {:<20} {:>14.2}", city.name(), city.population());
        }
    }
    Ok(())
}
