//! Registrar MCP Server Entry Point

use std::path::Path;

use clap::{Parser, Subcommand};
use registrar::{config::TransportType, run_server, Config, RegistrarServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;

/// Registrar: academic portal MCP server
#[derive(Parser, Debug)]
#[command(name = "registrar")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the MCP server
    Serve {
        /// Transport type (stdio or http)
        #[arg(short, long)]
        transport: Option<String>,
        /// HTTP port (when using http transport)
        #[arg(short, long)]
        port: Option<u16>,
        /// Output logs in JSON format
        #[arg(long)]
        json_logs: bool,
    },
    /// Show grade records and the GPA summary
    Grades {
        /// Only show one term, by term code (e.g. 2023-20241)
        #[arg(short, long)]
        term: Option<String>,
    },
    /// Show the GPA summary
    Gpa,
    /// List academic terms
    Terms,
    /// Show the current term and its first day
    CurrentTerm,
    /// Find the term week and weekday of a date
    Locate {
        /// Date as YYYY-MM-DD (default: today)
        date: Option<String>,
        /// Academic year such as 2023-2024 (default: current)
        #[arg(short, long)]
        year: Option<String>,
        /// Term number within the year (default: current)
        #[arg(short, long)]
        term: Option<u8>,
    },
    /// List teaching buildings
    Buildings,
    /// Find free classrooms in a building
    Classrooms {
        /// Building code
        #[arg(short, long)]
        building: String,
        /// Weeks such as "1-8,10"
        #[arg(short, long)]
        weeks: String,
        /// Weekday, 1 (Monday) to 7 (Sunday)
        #[arg(short = 'd', long)]
        weekday: Option<i64>,
        /// Class periods such as "3-4" or "5"
        #[arg(short, long)]
        periods: Option<String>,
        /// Minimum number of seats
        #[arg(short = 's', long)]
        min_seats: Option<i64>,
        /// Only rooms with movable seats
        #[arg(long)]
        movable: bool,
        /// Only tiered rooms
        #[arg(long)]
        tiered: bool,
        /// Academic year (default: current)
        #[arg(short, long)]
        year: Option<String>,
        /// Term number (default: current)
        #[arg(long)]
        term: Option<u8>,
    },
    /// Encode a week spec, or describe a week mask
    Weeks {
        /// Week spec such as "1-8,10,12-16"
        spec: Option<String>,
        /// Describe this bit mask instead (bit 0 is week 1)
        #[arg(short, long)]
        mask: Option<u32>,
    },
    /// Export grades and the GPA summary to CSV
    Export {
        /// Output file (default: grades.csv in the export directory)
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (transport, port, json_logs) = match args.command {
        Some(Command::Serve {
            transport,
            port,
            json_logs,
        }) => (transport, port, json_logs),
        None => (None, None, false),
        Some(command) => {
            // Minimal logging for CLI commands
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::WARN)
                .with_writer(std::io::stderr)
                .init();
            return run_command(args.config.as_deref(), command, args.json).await;
        }
    };

    run_mcp_server(args.config.as_deref(), transport, port, json_logs).await
}

fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    Ok(Config::load_from(config_path.map(Path::new))?)
}

/// Run a one-shot query command.
async fn run_command(config_path: Option<&str>, command: Command, json: bool) -> anyhow::Result<()> {
    if let Command::Weeks { spec, mask } = command {
        return cli::run_weeks(spec, mask, json);
    }

    let ctx = cli::CliContext::connect(load_config(config_path)?)?;
    match command {
        Command::Grades { term } => cli::run_grades(&ctx, term, json).await,
        Command::Gpa => cli::run_gpa(&ctx, json).await,
        Command::Terms => cli::run_terms(&ctx, json).await,
        Command::CurrentTerm => cli::run_current_term(&ctx, json).await,
        Command::Locate { date, year, term } => cli::run_locate(&ctx, date, year, term, json).await,
        Command::Buildings => cli::run_buildings(&ctx, json).await,
        Command::Classrooms {
            building,
            weeks,
            weekday,
            periods,
            min_seats,
            movable,
            tiered,
            year,
            term,
        } => {
            let args = cli::ClassroomArgs {
                building,
                weeks,
                weekday,
                periods,
                min_seats,
                movable: movable.then_some(true),
                tiered: tiered.then_some(true),
                year,
                term,
            };
            cli::run_classrooms(&ctx, args, json).await
        }
        Command::Export { output } => cli::run_export(&ctx, output, json).await,
        Command::Serve { .. } | Command::Weeks { .. } => Ok(()),
    }
}

/// Run the MCP server.
async fn run_mcp_server(
    config_path: Option<&str>,
    transport: Option<String>,
    port: Option<u16>,
    json_logs: bool,
) -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the stdio transport
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    tracing::info!("Starting registrar MCP server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(config_path)?;

    // Override transport from CLI args only if explicitly provided
    if let Some(ref t) = transport {
        config.server.transport = match t.as_str() {
            "http" => TransportType::Http,
            _ => TransportType::Stdio,
        };
    }
    if let Some(p) = port {
        config.server.http_port = p;
    }

    tracing::info!(
        transport = ?config.server.transport,
        portal = %config.portal.base_url,
        session_cookie = config.portal.session_cookie.is_some(),
        availability_ttl_secs = config.cache.availability_ttl_secs,
        "Configuration loaded"
    );

    let transport = config.server.transport;
    let port = config.server.http_port;
    let server = RegistrarServer::from_config(config)?;
    run_server(server, transport, port).await?;

    Ok(())
}
