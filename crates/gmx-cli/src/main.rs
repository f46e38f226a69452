use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use gmx_convert::{export_network, import_case, read_case_file, write_case_file};
use gmx_core::Network;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import a flat exchange case into a hierarchical network model
    Import {
        /// Path to the exchange case file
        case: PathBuf,
        /// Write the model as JSON to this path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Export a hierarchical network model back to a flat exchange case
    Export {
        /// Path to the model JSON file
        model: PathBuf,
        /// Write the exchange case to this path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Import a case and export it again in one pass
    Roundtrip {
        /// Path to the exchange case file
        case: PathBuf,
        /// Write the re-exported case to this path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Parse and import a case, reporting diagnostics without writing output
    Validate {
        /// Path to the exchange case file
        case: PathBuf,
    },
}

fn run_import(case: &PathBuf, output: &PathBuf) -> anyhow::Result<()> {
    let (raw, parse_diag) = read_case_file(case)?;
    if parse_diag.has_issues() {
        info!("parser: {}", parse_diag.summary());
    }
    let (network, conv) = import_case(&raw)?;
    info!("{}", conv.summary());
    info!("{}", network.stats());
    let json = serde_json::to_string_pretty(&network)?;
    fs::write(output, json)?;
    info!("wrote model to {}", output.display());
    Ok(())
}

fn run_export(model: &PathBuf, output: &PathBuf) -> anyhow::Result<()> {
    let json = fs::read_to_string(model)?;
    let network: Network = serde_json::from_str(&json)?;
    let (case, conv) = export_network(&network)?;
    info!("{}", conv.summary());
    write_case_file(output, &case)?;
    info!("wrote case to {}", output.display());
    Ok(())
}

fn run_roundtrip(case: &PathBuf, output: &PathBuf) -> anyhow::Result<()> {
    let (raw, parse_diag) = read_case_file(case)?;
    if parse_diag.has_issues() {
        info!("parser: {}", parse_diag.summary());
    }
    let (network, import_conv) = import_case(&raw)?;
    info!("import: {}", import_conv.summary());
    let (exported, export_conv) = export_network(&network)?;
    info!("export: {}", export_conv.summary());
    write_case_file(output, &exported)?;
    info!("wrote case to {}", output.display());
    Ok(())
}

fn run_validate(case: &PathBuf) -> anyhow::Result<()> {
    let (raw, parse_diag) = read_case_file(case)?;
    for issue in parse_diag.errors().chain(parse_diag.warnings()) {
        info!("{}", issue);
    }
    let (network, conv) = import_case(&raw)?;
    for issue in conv.diagnostics.errors().chain(conv.diagnostics.warnings()) {
        info!("{}", issue);
    }
    info!("{}", conv.summary());
    info!("{}", network.stats());
    if parse_diag.has_errors() || conv.diagnostics.has_errors() {
        anyhow::bail!("case has errors");
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let result = match &cli.command {
        Commands::Import { case, output } => run_import(case, output),
        Commands::Export { model, output } => run_export(model, output),
        Commands::Roundtrip { case, output } => run_roundtrip(case, output),
        Commands::Validate { case } => run_validate(case),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}
