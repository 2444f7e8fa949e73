use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use casesmith::config::ServiceConfig;

mod cli;

#[derive(Parser)]
#[command(name = "casesmith")]
#[command(about = "Generates pytest and Allure TestOps test code with an LLM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Enable verbose debug output")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the HTTP service")]
    Serve(ServiceConfig),

    #[command(about = "Render a JSON test case report into a pytest module")]
    Render {
        #[arg(help = "Path to the report JSON file")]
        report: PathBuf,

        #[arg(short, long, help = "Write to this file instead of stdout")]
        output: Option<PathBuf>,
    },

    #[command(about = "Build a pytest skeleton from an OpenAPI document without calling the model")]
    Scaffold {
        #[arg(help = "Path to the OpenAPI document (YAML or JSON)")]
        spec: PathBuf,

        #[arg(short, long, help = "Write to this file instead of stdout")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve(config) => {
            cli::serve(config).await?;
        }
        Commands::Render { report, output } => {
            cli::render(&report, output)?;
        }
        Commands::Scaffold { spec, output } => {
            cli::scaffold(&spec, output)?;
        }
    }

    Ok(())
}
