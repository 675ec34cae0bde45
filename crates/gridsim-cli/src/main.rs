use clap::Parser;
use gridsim_cli::{Cli, Commands};
use tracing::error;
use tracing_subscriber::FmtSubscriber;
mod commands;

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let result = match &cli.command {
        Commands::Layout {
            system,
            mode,
            format,
        } => commands::layout::handle(system, mode, *format),
        Commands::Init { system, format } => commands::init::handle(system, *format),
        Commands::Simulate {
            system,
            stop,
            solver,
            format,
        } => commands::simulate::handle(system, *stop, solver.as_deref(), *format),
    };

    if let Err(err) = result {
        error!("{:#}", err);
        std::process::exit(1);
    }
}
