//! `dipola`: coupled-dipole scattering solver.
//!
//! Builds a box or sphere of dipoles, illuminates it with a plane wave
//! travelling along z and solves for the dipole polarizations with one of
//! the Krylov solvers.

mod backend;
mod config;
mod output;
mod simulation;

use anyhow::Result;
use clap::{Parser, Subcommand};
use simulation::{ProfileArgs, SolveArgs};

#[derive(Parser)]
#[command(name = "dipola", version, about = "Coupled-dipole Krylov solver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Solve for the dipole polarizations and write them as JSON
    Solve(SolveArgs),
    /// Time steady-state iterations of the chosen solver
    Profile(ProfileArgs),
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Solve(args) => simulation::run_solve(args),
        Command::Profile(args) => simulation::run_profile(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_solve() {
        let cli = Cli::try_parse_from([
            "dipola", "solve", "--shape", "sphere", "--size", "8", "--solver", "bicgstab", "-o",
            "out.json",
        ])
        .unwrap();
        let Command::Solve(args) = cli.command else {
            panic!("expected solve")
        };
        assert_eq!(args.problem.shape, config::Shape::Sphere);
        assert_eq!(args.output.as_deref(), Some(std::path::Path::new("out.json")));
    }
}
