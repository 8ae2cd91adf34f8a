use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sparebank1_core::load_ledger;
use sparebank1_import::{default_config_path, Config};
use tracing_subscriber::EnvFilter;

mod commands;
mod diff;

use commands::Importers;

/// Import SpareBank 1 deposit account exports and PDF statements into Beancount.
#[derive(Parser, Debug)]
#[command(name = "sparebank1", version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print which importer recognizes each file
    Identify {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },
    /// Extract ledger entries from the files
    Extract {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
        /// Existing ledger used to flag duplicates
        #[arg(short, long, value_name = "LEDGER")]
        existing: Option<PathBuf>,
        /// Print JSON instead of Beancount
        #[arg(long)]
        json: bool,
    },
    /// Print the archival file name of each recognized file
    Archive {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the ledger account of each recognized file
    Account {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },
    /// Write FILE.beancount with the current extraction output
    Generate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Compare extraction output against FILE.beancount
    Test {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

// Logs go to stderr so stdout stays clean ledger text.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = match path {
        Some(p) => p,
        None => default_config_path().context("cannot determine the configuration directory")?,
    };
    Config::load(&path).with_context(|| format!("loading configuration {}", path.display()))
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config)?;
    let importers = Importers::from_config(&config)?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Command::Identify { files } => commands::identify(&importers, &files, &mut out)?,
        Command::Extract {
            files,
            existing,
            json,
        } => {
            let existing = match existing {
                Some(path) => load_ledger(&path)
                    .with_context(|| format!("reading ledger {}", path.display()))?,
                None => Vec::new(),
            };
            commands::extract(&importers, &files, &existing, json, &mut out)?;
        }
        Command::Archive { files } => commands::archive(&importers, &files, &mut out)?,
        Command::Account { files } => commands::account(&importers, &files, &mut out)?,
        Command::Generate { file } => commands::generate(&importers, &file, &mut out)?,
        Command::Test { file } => {
            if !commands::test(&importers, &file, &mut out)? {
                return Ok(ExitCode::from(1));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_extract_with_options() {
        let cli = Cli::try_parse_from([
            "sparebank1",
            "--config",
            "c.toml",
            "extract",
            "a.csv",
            "b.pdf",
            "--existing",
            "main.beancount",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
        match cli.command {
            Command::Extract {
                files,
                existing,
                json,
            } => {
                assert_eq!(files.len(), 2);
                assert_eq!(existing, Some(PathBuf::from("main.beancount")));
                assert!(json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn identify_requires_files() {
        assert!(Cli::try_parse_from(["sparebank1", "identify"]).is_err());
    }

    #[test]
    fn load_config_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(dir.path().join("missing.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("missing.toml"));
    }

    #[test]
    fn load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[deposit]\naccount = \"Assets:Bank:SpareBank1:Checking\"\n").unwrap();
        let config = load_config(Some(path)).unwrap();
        assert!(Importers::from_config(&config).is_ok());
    }
}
