//! uetl CLI - load a PostgreSQL data warehouse from SQL Server and Firebird.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use uetl::{source, Config, ConnectErrorKind, DataSource, DataWarehouse, EtlError};

#[derive(Parser)]
#[command(name = "uetl")]
#[command(about = "Minimalist ETL for PostgreSQL data warehouses")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "uetl.yaml")]
    config: PathBuf,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test the warehouse connection, creating its database if missing
    HealthCheck,

    /// Create the configured warehouse tables that do not exist yet
    CreateTables {
        /// Report each table as it is created
        #[arg(long)]
        verbose: bool,
    },

    /// Remove every row from a warehouse table
    Truncate {
        /// Table to truncate
        table: String,

        /// Also truncate tables that reference it through foreign keys
        #[arg(long)]
        cascade: bool,

        #[arg(long)]
        verbose: bool,
    },

    /// Run a query against the warehouse or a source and print the result
    Query {
        /// SQL to run
        sql: String,

        /// Name of a configured source (default: the warehouse)
        #[arg(long)]
        source: Option<String>,

        /// Print at most this many rows
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Extract rows from a source and append them to a warehouse table
    Load {
        /// Name of a configured source
        #[arg(long)]
        source: String,

        /// Extraction query run on the source
        #[arg(long)]
        sql: String,

        /// Destination warehouse table
        #[arg(long)]
        table: String,

        /// Write the row index as the table's surrogate key column
        #[arg(long)]
        indexed: bool,

        /// Rows per INSERT statement (default: all rows at once)
        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), EtlError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(EtlError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let dw = DataWarehouse::from_config(&config.warehouse);

    match cli.command {
        Commands::HealthCheck => {
            let healthy = dw.test_connection().await?;
            println!("Health Check Results:");
            println!(
                "  Data warehouse '{}' ({}:{}/{}): {}",
                dw.name(),
                dw.host(),
                dw.port(),
                dw.database(),
                if healthy { "OK" } else { "FAILED" }
            );

            if !healthy {
                return Err(EtlError::connect(
                    ConnectErrorKind::Unreachable,
                    "Health check failed",
                ));
            }
        }

        Commands::CreateTables { verbose } => {
            if config.tables.is_empty() {
                info!("No tables configured");
                return Ok(());
            }
            if !dw.ensure_tables(config.table_ddl(), verbose).await? {
                return Err(EtlError::connect(
                    ConnectErrorKind::Other,
                    "Failed creating tables",
                ));
            }
            println!("{} table(s) present", config.tables.len());
        }

        Commands::Truncate {
            table,
            cascade,
            verbose,
        } => {
            if !dw.truncate(&table, cascade, verbose).await? {
                return Err(unreachable_warehouse(&dw));
            }
            println!("{}: table truncated", table);
        }

        Commands::Query { sql, source, limit } => {
            let result = match source {
                None => dw.try_query(&sql).await?,
                Some(name) => {
                    let source_config = config.source(&name).ok_or_else(|| {
                        EtlError::Config(format!("Unknown source '{}'", name))
                    })?;
                    let mut src = source::from_config(source_config);
                    let mut scope = source::enter(&mut *src).await?;
                    let table = scope.query(&sql).await?;
                    table
                }
            };

            match limit {
                Some(n) if n < result.num_rows() => {
                    println!("{}", result.head(n));
                    println!("({} of {} rows shown)", n, result.num_rows());
                }
                _ => println!("{}", result),
            }
        }

        Commands::Load {
            source,
            sql,
            table,
            indexed,
            chunk_size,
            verbose,
        } => {
            let source_config = config
                .source(&source)
                .ok_or_else(|| EtlError::Config(format!("Unknown source '{}'", source)))?;

            let data = {
                let mut src = source::from_config(source_config);
                let mut scope = source::enter(&mut *src).await?;
                let data = scope.query(&sql).await?;
                data
            };
            info!("Extracted {} rows from '{}'", data.num_rows(), source);

            let written = if indexed {
                dw.write_indexed(&table, &data, chunk_size, verbose).await?
            } else {
                dw.write_unindexed(&table, &data, chunk_size, verbose).await?
            };
            if !written {
                return Err(unreachable_warehouse(&dw));
            }
            println!("{}: {} rows loaded", table, data.num_rows());
        }
    }

    Ok(())
}

fn unreachable_warehouse(dw: &DataWarehouse) -> EtlError {
    EtlError::connect(
        ConnectErrorKind::Unreachable,
        format!(
            "Unable to connect to data warehouse '{}' ({}:{}/{})",
            dw.name(),
            dw.host(),
            dw.port(),
            dw.database()
        ),
    )
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => {
            return Err(format!(
                "Invalid log format '{}'. Valid values: text, json",
                other
            ))
        }
    }

    Ok(())
}
