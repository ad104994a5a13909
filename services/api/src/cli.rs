use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use enrolsync::error::AppError;
use enrolsync::workflows::roster::RosterImporter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Learner Registry Reconciler",
    about = "Run and demonstrate the learner registry reconciliation service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect roster CSV files before they are imported
    Roster {
        #[command(subcommand)]
        command: RosterCommand,
    },
    /// Run an end-to-end CLI demo covering roster ingestion and reconciliation
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum RosterCommand {
    /// Parse a roster export and report usable rows and problems
    Preview(RosterPreviewArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct RosterPreviewArgs {
    /// Path to the roster CSV export
    #[arg(long)]
    pub(crate) csv: PathBuf,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Roster {
            command: RosterCommand::Preview(args),
        } => run_roster_preview(args),
        Command::Demo(args) => run_demo(args).await,
    }
}

fn run_roster_preview(args: RosterPreviewArgs) -> Result<(), AppError> {
    let preview = RosterImporter::from_path(&args.csv)?;

    println!("Roster preview: {}", args.csv.display());
    println!("Usable rows: {}", preview.entries.len());
    for entry in &preview.entries {
        let identity = entry
            .index_no
            .as_deref()
            .or(entry.birth_certificate_no.as_deref())
            .unwrap_or("-");
        let marks = entry
            .marks
            .map(|marks| marks.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("- {} | {} | marks {}", entry.name, identity, marks);
    }

    if preview.problems.is_empty() {
        println!("\nProblems: none");
    } else {
        println!("\nProblems");
        for problem in &preview.problems {
            println!("- line {}: {}", problem.line, problem.detail);
        }
    }

    Ok(())
}
