use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;

mod demo;
mod logging;
mod random;
mod stress;

use stress::Target;

#[derive(Parser)]
#[command(name = "orb")]
#[command(about = "Orb object runtime driver")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run random operation sequences and check them against std collections
    Stress {
        /// Random seed
        #[arg(long, default_value_t = 5489)]
        seed: u32,
        /// Operations per container
        #[arg(long, default_value_t = 10_000)]
        ops: usize,
        /// Container to exercise
        #[arg(long, value_enum, default_value_t = Target::All)]
        target: Target,
    },
    /// Run the scripted scenarios and print what happens
    Demo,
}

fn main() -> miette::Result<()> {
    logging::init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Stress { seed, ops, target } => run_stress(seed, ops, target)?,
        Commands::Demo => {
            demo::run().map_err(|e| miette::miette!("Demo failed: {}", e))?;
        }
    }

    Ok(())
}

fn run_stress(seed: u32, ops: usize, target: Target) -> miette::Result<()> {
    tracing::info!(seed, ops, ?target, "starting stress run");
    let reports = stress::run(seed, ops, target).into_diagnostic()?;

    for report in &reports {
        println!(
            "{:<6} ok  ops={} final_len={} peak_capacity={}",
            report.target, report.ops, report.final_len, report.peak_capacity
        );
    }
    tracing::info!(targets = reports.len(), "stress run passed");
    Ok(())
}
