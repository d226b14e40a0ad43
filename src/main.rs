//! valkey-reshard - move hash slots between two Valkey cluster masters.
//!
//! This is the main entry point that:
//! - Parses command-line arguments
//! - Initializes the info and error log sinks
//! - Connects to the source and destination masters
//! - Resolves the slot ranges and reshards them one range at a time

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use tracing::{error, info, warn};

use valkey_reshard::client::{NodeAddress, NodeClient, ValkeyClient, ValkeyClientConfig};
use valkey_reshard::config::{DEFAULT_MAX_CONCURRENT, ReshardConfig};
use valkey_reshard::logging::{self, DEFAULT_LOG_PATH, LogConfig};
use valkey_reshard::{ReshardError, ReshardReport, Resharder, Result, SlotSelection, resolve_slots};

#[derive(Parser, Debug)]
#[command(name = "valkey-reshard", version, about = "Move hash slots between Valkey cluster masters")]
struct Args {
    /// Source master, as host or host:port
    #[arg(short = 's', long)]
    source: Option<String>,

    /// Destination master, as host or host:port
    #[arg(short = 'd', long)]
    destination: Option<String>,

    /// Password shared by both nodes
    #[arg(short = 'a', long, env = "RESHARD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Slots to move: a single slot or `start,end`
    #[arg(short = 'l', long)]
    slots: Option<String>,

    /// Number of slots to move, taken from what the source owns
    #[arg(short = 'n', long, default_value_t = 0, allow_negative_numbers = true)]
    count: i64,

    /// Maximum number of slots migrated at once
    #[arg(short = 'p', long, default_value_t = DEFAULT_MAX_CONCURRENT)]
    parallel: usize,

    /// Base log file; `.info.log` and `.error.log` files are written next to it
    #[arg(long, default_value = DEFAULT_LOG_PATH)]
    log_path: PathBuf,

    /// Write the info log
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    enable_info_log: bool,
}

fn required(value: Option<String>, what: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ReshardError::InvalidConfig(format!("{} is required", what)))
}

/// Validated command-line input.
#[derive(Debug)]
struct Inputs {
    source: NodeAddress,
    destination: NodeAddress,
    password: String,
    selection: SlotSelection,
    config: ReshardConfig,
}

/// Check the arguments before any node is contacted.
///
/// Source, destination and password are mandatory; a slot spec wins over
/// a count.
fn inputs(args: &Args) -> Result<Inputs> {
    let source = NodeAddress::parse(&required(args.source.clone(), "source address (-s)")?)?;
    let destination = NodeAddress::parse(&required(
        args.destination.clone(),
        "destination address (-d)",
    )?)?;
    let password = required(args.password.clone(), "password (-a)")?;
    let selection = SlotSelection::from_cli(args.slots.as_deref(), args.count)?;

    let config = ReshardConfig::default().with_max_concurrent(args.parallel);
    config.validate()?;

    Ok(Inputs {
        source,
        destination,
        password,
        selection,
        config,
    })
}

/// Process exit status for a finished run.
///
/// 0 when every slot moved, 1 when any slot failed or was skipped, and the
/// error's own code when the run aborted.
fn exit_status(outcome: &Result<ReshardReport>) -> u8 {
    match outcome {
        Ok(report) if report.is_complete() => 0,
        Ok(_) => 1,
        Err(e) => e.exit_code(),
    }
}

async fn connect(address: NodeAddress, password: &str) -> Result<NodeClient<ValkeyClient>> {
    let config = ValkeyClientConfig::new(address.clone()).with_password(password);
    let client = ValkeyClient::connect(config)
        .await
        .map_err(|source| ReshardError::Node { address, source })?;
    Ok(NodeClient::new(client))
}

async fn run(args: &Args) -> Result<ReshardReport> {
    let Inputs {
        source,
        destination,
        password,
        selection,
        config,
    } = inputs(args)?;

    let source = connect(source, &password).await?;
    let ranges = resolve_slots(&source, &selection).await?;
    let destination = connect(destination, &password).await?;

    let resharder = Resharder::new(source, destination, config);
    let mut report = ReshardReport::default();

    for range in ranges {
        info!(
            range = %range,
            slots = range.count(),
            source = %resharder.source().address(),
            destination = %resharder.destination().address(),
            "Resharding slot range"
        );
        report.merge(resharder.reshard(range).await?);
    }

    for node in [resharder.source(), resharder.destination()] {
        if let Err(e) = node.transport().close().await {
            warn!(node = %node.address(), error = %e, "Failed to close connection");
        }
    }

    Ok(report)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_config = LogConfig::new(&args.log_path).with_info_enabled(args.enable_info_log);
    if let Err(e) = logging::init(&log_config) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(2);
    }

    let outcome = run(&args).await;
    match &outcome {
        Ok(report) if report.is_complete() => {
            info!(
                slots = report.migrated.len(),
                keys = report.keys_migrated(),
                peak_concurrency = report.peak_concurrency,
                "Reshard complete"
            );
        }
        Ok(report) => {
            let failed: Vec<u16> = report.failed.iter().map(|f| f.slot).collect();
            error!(
                migrated = report.migrated.len(),
                failed = ?failed,
                skipped = report.skipped.len(),
                "Reshard finished with failed slots"
            );
        }
        Err(e) => error!(error = %e, "Reshard aborted"),
    }
    ExitCode::from(exit_status(&outcome))
}
