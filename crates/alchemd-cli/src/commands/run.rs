use crate::cli::RunArgs;
use crate::config::{AppConfig, build_config};
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use alchemd::engine::comm::SerialCommunicator;
use alchemd::engine::progress::ProgressReporter;
use alchemd::workflows::sandbox::{RunReport, Sandbox, SandboxCheckpoint};
use tracing::{info, warn};

pub fn run(args: RunArgs) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let config = build_config(&args)?;
    let report = execute(&config)?;
    print_report(&report);
    Ok(())
}

fn execute(config: &AppConfig) -> Result<RunReport> {
    let comm = SerialCommunicator;

    let mut sandbox = match &config.resume_path {
        Some(path) => {
            info!("Resuming from checkpoint {:?}", path);
            let checkpoint = SandboxCheckpoint::read(path)?;
            Sandbox::resume(&config.sandbox, &checkpoint, &comm)?
        }
        None => Sandbox::new(&config.sandbox, &comm)?,
    };

    let progress_handler = CliProgressHandler::new();
    let reporter = if config.show_progress {
        ProgressReporter::with_callback(progress_handler.get_callback())
    } else {
        ProgressReporter::new()
    };

    println!(
        "Running {} timestep(s) from timestep {}...",
        config.steps,
        sandbox.timestep()
    );
    let report = sandbox.run(config.steps, &comm, &reporter)?;

    if let Some(path) = &config.checkpoint_path {
        sandbox.checkpoint().write(path)?;
        println!("✓ Checkpoint written to: {}", path.display());
    }

    Ok(report)
}

fn print_report(report: &RunReport) {
    println!(
        "Timesteps {}..{} complete ({} alchemostat firing step(s)).",
        report.start_timestep, report.end_timestep, report.firing_steps
    );
    println!("  Potential energy:           {:.6}", report.potential_energy);
    println!(
        "  Alchemical kinetic energy:  {:.6}",
        report.alchemical_kinetic_energy
    );

    if !report.values.is_empty() {
        println!("Alchemical degrees of freedom:");
        for (name, value) in &report.values {
            println!("  {:<32} {:.6}", name, value);
        }
    }

    if report.trials.attempted > 0 {
        println!(
            "Shape-move trials: {}/{} accepted ({:.1}%)",
            report.trials.accepted,
            report.trials.attempted,
            100.0 * report.trials.acceptance_ratio()
        );
        for (name, stats) in &report.statistics {
            println!(
                "  {:<20} {:>6}/{:<6} move size {:.4e}",
                name, stats.accepted, stats.attempted, stats.move_size
            );
        }
    } else if !report.statistics.is_empty() {
        warn!("Shape moves are registered but no trial was attempted.");
    }
}
