use crate::cli::InspectArgs;
use crate::error::Result;
use alchemd::workflows::sandbox::SandboxCheckpoint;
use std::fmt::Write;
use tracing::info;

pub fn run(args: InspectArgs) -> Result<()> {
    info!("Reading checkpoint {:?}", &args.checkpoint);
    let checkpoint = SandboxCheckpoint::read(&args.checkpoint)?;
    print!("{}", summarize(&checkpoint));
    Ok(())
}

fn summarize(checkpoint: &SandboxCheckpoint) -> String {
    let alchemical = &checkpoint.alchemical;
    let mut out = String::new();

    let _ = writeln!(out, "Checkpoint version {}", alchemical.version);
    let _ = writeln!(out, "  Next timestep:    {}", alchemical.timestep);
    let _ = writeln!(out, "  Seed:             {}", checkpoint.seed);
    let _ = writeln!(out, "  Particles:        {}", checkpoint.particles.len());
    let _ = writeln!(out, "  Reference scale:  {}", checkpoint.reference_scale);

    let _ = writeln!(out, "Degrees of freedom ({}):", alchemical.dofs.len());
    for dof in &alchemical.dofs {
        let _ = writeln!(
            out,
            "  {}/{:<16} value {:>12.6}  momentum {:>12.6}  mass {}  period {}{}",
            dof.target,
            dof.parameter,
            dof.value,
            dof.momentum,
            dof.mass,
            dof.period,
            if dof.integrated { "  [integrated]" } else { "" }
        );
    }

    if !alchemical.schedules.is_empty() {
        let _ = writeln!(out, "Alchemostat schedules:");
        for schedule in &alchemical.schedules {
            let _ = writeln!(
                out,
                "  period {:<6} next firing {:<10} firings {}",
                schedule.period, schedule.next_timestep, schedule.firings
            );
        }
    }

    if !alchemical.moves.is_empty() {
        let _ = writeln!(out, "Shape moves:");
        for record in &alchemical.moves {
            let stats = &record.statistics;
            let _ = writeln!(
                out,
                "  {:<20} {:>6}/{:<6} accepted  move size {:.4e}",
                record.name, stats.accepted, stats.attempted, stats.move_size
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use alchemd::engine::alchemostat::AlchemostatState;
    use alchemd::engine::checkpoint::{CHECKPOINT_VERSION, Checkpoint, DofRecord, MoveRecord};
    use alchemd::engine::statistics::MoveStatistics;
    use alchemd::core::models::dof::DofTarget;

    fn checkpoint() -> SandboxCheckpoint {
        let mut statistics = MoveStatistics::new(0.1);
        statistics.record(true);
        statistics.record(false);
        SandboxCheckpoint {
            seed: 42,
            reference_scale: 1.0,
            alchemical: Checkpoint {
                version: CHECKPOINT_VERSION,
                timestep: 17,
                dofs: vec![DofRecord {
                    parameter: "diameter".to_string(),
                    value: 1.25,
                    momentum: -0.5,
                    mass: 1.0,
                    period: 3,
                    integrated: true,
                    target: DofTarget::Type("A".to_string()),
                }],
                schedules: vec![AlchemostatState {
                    period: 3,
                    next_timestep: 18,
                    firings: 5,
                }],
                moves: vec![MoveRecord {
                    name: "walk".to_string(),
                    statistics,
                }],
            },
            particles: Vec::new(),
        }
    }

    #[test]
    fn summary_lists_every_section() {
        let summary = summarize(&checkpoint());
        assert!(summary.contains("Next timestep:    17"));
        assert!(summary.contains("Seed:             42"));
        assert!(summary.contains("type 'A'/diameter"));
        assert!(summary.contains("[integrated]"));
        assert!(summary.contains("next firing 18"));
        assert!(summary.contains("walk"));
        assert!(summary.contains("1/2"));
    }

    #[test]
    fn inspect_reads_written_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        checkpoint().write(&path).unwrap();
        assert!(run(InspectArgs { checkpoint: path }).is_ok());

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            run(InspectArgs { checkpoint: missing }),
            Err(CliError::Checkpoint(_))
        ));
    }
}
