use clap::{Parser, Subcommand};
use eyre::Result;

mod config;
mod history;
mod plot;
mod run;
mod server;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the resolved configuration
    Config {
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
    },

    /// List stored runs or dump one run's samples
    History(history::HistoryOpts),

    /// Render PNG charts of stored runs
    Plot(plot::PlotOpts),

    /// Drive the heater link until interrupted
    Run {
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
    },

    /// Serve the HTTP control API alongside the pipeline
    Server {
        #[arg(short, long, default_value = "config.yaml")]
        config: String,

        #[arg(short, long)]
        port: Option<u16>,
    },
}

pub async fn parse() -> Result<()> {
    execute_command(Cli::parse().command).await
}

pub async fn execute_command(command: Command) -> Result<()> {
    match command {
        Command::Config { config } => self::config::read_and_print(&config).await,
        Command::History(opts) => self::history::history(opts).await,
        Command::Plot(opts) => self::plot::plot(opts).await,
        Command::Run { config } => self::run::launch(&config).await,
        Command::Server { config, port } => self::server::launch(&config, port).await,
    }
}
