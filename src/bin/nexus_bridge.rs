use clap::{Parser, Subcommand};
use nexus_bridge::cli::{self as prog_cli, Command};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "nexus-bridge", version, about = "Filter/update translation tool", long_about = None)]
struct Cli {
    /// Path to a config file (TOML)
    #[arg(long, help = "Path to a config file (TOML). If omitted, NEXUS_BRIDGE_CONFIG or ./nexus-bridge.toml is used.")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Translate a filter into the native store's filter; prints JSON")]
    Translate {
        #[arg(help = "Filter JSON (e.g., {\"score\": {\"$ne\": null}})")]
        filter: String,
        #[arg(long, help = "Sort JSON in order (e.g., {\"score\": -1, \"name\": 1})")]
        sort: Option<String>,
        #[arg(long, help = "Schema JSON: {\"Class\": {\"field\": \"Number\"}}")]
        schema: Option<String>,
        #[arg(long, default_value = "_Default", help = "Class name used for schema lookups")]
        class: String,
    },
    #[command(about = "Apply an update to a document; prints the replacement document")]
    Apply {
        #[arg(help = "Current document JSON")]
        document: String,
        #[arg(help = "Update JSON (e.g., {\"$inc\": {\"n\": 1}})")]
        update: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = nexus_bridge::init(cli.config.as_deref()) {
        eprintln!("config error: {e}");
        return ExitCode::from(2);
    }
    let cmd = match cli.command {
        Commands::Translate { filter, sort, schema, class } => Command::Translate {
            filter_json: filter,
            sort_json: sort,
            schema_json: schema,
            class_name: class,
        },
        Commands::Apply { document, update } => {
            Command::Apply { document_json: document, update_json: update }
        }
    };
    match prog_cli::run(cmd) {
        Ok(out) => {
            println!("{out}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("command failed: {e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
