mod bindings;
mod cli;
mod config;
mod notes;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Inspect(args)) => run::inspect(&args, &cli.run),
        Some(Command::Notes(args)) => run::notes(&args, &cli.run),
        Some(Command::Config(args)) => run::show_config(&args, &cli.run),
        Some(Command::Snapshot(args)) => run::snapshot(&args, &cli.run),
        None => run::run(cli.run),
    }
}
