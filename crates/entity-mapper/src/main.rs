//! Command-line entry point for the entity mapper.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Local;
use clap::error::ErrorKind;
use clap::Parser;
use entity_mapper_core::logging::{build_logging, LogSettings};
use entity_mapper_core::{pipeline, ConnectionSettings, DatasetCatalog, RunOptions, RunSummary};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Map entity identifier pairs onto company and firmographics warehouse data",
    long_about = None
)]
struct Cli {
    /// Spreadsheet (.xlsx, .xls, .ods) or delimited (.csv, .tsv) file of identifier pairs
    #[arg(short = 'i', long)]
    input_file: PathBuf,

    /// Output CSV path (defaults to entity_mapping_<timestamp>.csv)
    #[arg(short = 'o', long)]
    output_file: Option<PathBuf>,

    /// Warehouse host
    #[arg(short = 'a', long, visible_alias = "account", env = "ENTITY_MAPPER_HOST")]
    host: String,

    #[arg(long, default_value_t = 5432, env = "ENTITY_MAPPER_PORT")]
    port: u16,

    #[arg(short = 'u', long, env = "ENTITY_MAPPER_USER")]
    user: String,

    #[arg(short = 'p', long, env = "ENTITY_MAPPER_PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(short = 'd', long, default_value = "PROD", env = "ENTITY_MAPPER_DATABASE")]
    database: String,

    /// Role to assume after connecting
    #[arg(short = 'r', long, env = "ENTITY_MAPPER_ROLE")]
    role: Option<String>,

    /// TOML file overriding the dataset catalog
    #[arg(long)]
    datasets: Option<PathBuf>,

    #[arg(long, default_value = "entity_mapper.log")]
    log_file: PathBuf,

    /// Log to the console only
    #[arg(long)]
    no_log_file: bool,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            role: self.role.clone(),
            application_name: env!("CARGO_PKG_NAME").to_string(),
        }
    }

    fn log_settings(&self) -> LogSettings {
        LogSettings {
            verbose: self.verbose,
            log_file: (!self.no_log_file).then(|| self.log_file.clone()),
            console: true,
        }
    }
}

fn default_output_path() -> PathBuf {
    PathBuf::from(format!(
        "entity_mapping_{}.csv",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let logging = match build_logging(&cli.log_settings()) {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("failed to initialise logging: {err}");
            return ExitCode::FAILURE;
        }
    };

    tracing::dispatcher::with_default(logging.dispatch(), || match run(cli) {
        Ok(summary) => {
            info!(
                output = %summary.output_path.display(),
                rows = summary.merge.rows,
                columns = summary.merge.columns,
                "entity mapping completed"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "entity mapping failed");
            ExitCode::FAILURE
        }
    })
}

fn run(cli: Cli) -> Result<RunSummary> {
    info!("starting entity mapper");

    let datasets = match &cli.datasets {
        Some(path) => DatasetCatalog::load(path)
            .with_context(|| format!("failed to load dataset catalog {}", path.display()))?,
        None => DatasetCatalog::default(),
    };
    let options = RunOptions {
        input_path: cli.input_file.clone(),
        output_path: cli.output_file.clone().unwrap_or_else(default_output_path),
        datasets,
    };
    let connection = cli.connection_settings();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime
        .block_on(pipeline::execute(&options, &connection))
        .with_context(|| format!("failed to map {}", options.input_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 9] = [
        "entity-mapper",
        "-i",
        "ids.xlsx",
        "-a",
        "warehouse.internal",
        "-u",
        "mapper",
        "-p",
        "secret",
    ];

    #[test]
    fn parses_required_arguments_with_defaults() {
        let cli = Cli::try_parse_from(REQUIRED).expect("cli");

        assert_eq!(cli.input_file, PathBuf::from("ids.xlsx"));
        assert_eq!(cli.database, "PROD");
        assert_eq!(cli.port, 5432);
        assert!(cli.output_file.is_none());
        assert!(!cli.verbose);

        let log = cli.log_settings();
        assert_eq!(log.log_file, Some(PathBuf::from("entity_mapper.log")));
    }

    #[test]
    fn account_alias_and_flags() {
        let mut args: Vec<&str> = vec!["entity-mapper", "-i", "ids.csv", "--account", "wh"];
        args.extend(["-u", "mapper", "-p", "secret", "-v", "--no-log-file", "-r", "ANALYST"]);
        let cli = Cli::try_parse_from(args).expect("cli");

        assert_eq!(cli.host, "wh");
        assert!(cli.verbose);
        assert_eq!(cli.log_settings().log_file, None);
        assert_eq!(cli.connection_settings().role.as_deref(), Some("ANALYST"));
    }

    #[test]
    fn missing_input_file_is_an_error() {
        let err = Cli::try_parse_from(["entity-mapper", "-a", "wh", "-u", "m", "-p", "s"])
            .expect_err("missing input");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn default_output_path_is_timestamped_csv() {
        let path = default_output_path();
        let name = path.to_string_lossy();
        assert!(name.starts_with("entity_mapping_"));
        assert!(name.ends_with(".csv"));
    }
}
