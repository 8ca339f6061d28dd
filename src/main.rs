use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::info;
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;

use netaddr::address::RangeType;
use netaddr::allocator::{
    AddressRange, AllocationKind, Allocator, KeyspaceReport, Policy, RangeUsage,
};
use netaddr::config::Config;
use netaddr::config_loader;
use netaddr::store::{FileStore, KvStore};

/// Named IPv4, MAC and IPv6 address allocation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// State file holding the ranges (overrides the configuration)
    #[arg(long)]
    state: Option<PathBuf>,

    /// Retries of transiently failing store requests (overrides the configuration)
    #[arg(long)]
    retries: Option<u32>,

    /// Accept matching pre-existing state and treat missing state as a no-op
    #[arg(long)]
    tolerant: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage address ranges
    Range {
        #[command(subcommand)]
        action: RangeCommand,
    },
    /// Manage addresses within ranges
    Address {
        #[command(subcommand)]
        action: AddressCommand,
    },
}

#[derive(Subcommand, Debug)]
enum RangeCommand {
    /// Create a range
    Create {
        prefix: String,
        #[arg(long = "type")]
        range_type: RangeType,
        first: String,
        last: String,
    },
    /// Show a range
    Show { prefix: String },
    /// Delete a range and everything allocated in it
    Destroy { prefix: String },
    /// Capacity, used and free addresses of one or more ranges
    Usage {
        #[arg(required = true)]
        prefixes: Vec<String>,
    },
    /// Export every key of a range as JSON
    Keyspace { prefix: String },
}

#[derive(Subcommand, Debug)]
enum AddressCommand {
    /// Generate an address from the first range with room
    Generate {
        name: String,
        #[arg(long = "range", required = true)]
        ranges: Vec<String>,
        #[arg(long = "type")]
        range_type: RangeType,
    },
    /// Bind a specific address
    Hardcode {
        name: String,
        address: String,
        #[arg(long = "range", required = true)]
        ranges: Vec<String>,
        #[arg(long = "type")]
        range_type: RangeType,
    },
    /// Look up the address bound to a name
    Get {
        name: String,
        #[arg(long = "range")]
        prefix: String,
        #[arg(long = "type")]
        range_type: RangeType,
    },
    /// Release an address
    Delete {
        name: String,
        address: String,
        #[arg(long = "range")]
        prefix: String,
        #[arg(long, value_enum)]
        kind: KindArg,
    },
    /// List the names bound in a range
    List {
        #[arg(long = "range")]
        prefix: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum KindArg {
    Hardcoded,
    Generated,
}

impl From<KindArg> for AllocationKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Hardcoded => AllocationKind::Hardcoded,
            KindArg::Generated => AllocationKind::Generated,
        }
    }
}

#[derive(Serialize)]
struct RangeView {
    prefix: String,
    range_type: RangeType,
    first: String,
    last: String,
    capacity: u128,
}

#[derive(Serialize)]
struct AddressView {
    name: String,
    prefix: String,
    address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<AllocationKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pre_existing: Option<bool>,
}

#[derive(Serialize)]
struct UsageView {
    prefix: String,
    usage: RangeUsage,
}

/// Apply command line overrides on top of the loaded configuration
fn resolve_config(args: &Args) -> Result<Config> {
    let mut config = config_loader::load_or_default(args.config.as_deref())?;
    if let Some(state) = &args.state {
        config.store.path = state.clone();
    }
    if let Some(retries) = args.retries {
        config.store.retries = retries;
    }
    if args.tolerant {
        config.strict = false;
    }
    config.validate()?;
    Ok(config)
}

fn range_view<S: KvStore>(allocator: &Allocator<S>, prefix: &str) -> Result<RangeView> {
    let range = allocator.require_range(prefix)?;
    Ok(RangeView {
        prefix: prefix.to_string(),
        range_type: range.range_type,
        first: range.format(&range.first),
        last: range.format(&range.last),
        capacity: range.capacity(),
    })
}

fn formatted<S: KvStore>(allocator: &Allocator<S>, prefix: &str, address: &[u8]) -> Result<String> {
    Ok(allocator.require_range(prefix)?.format(address))
}

fn run_range<S: KvStore>(allocator: &Allocator<S>, action: RangeCommand) -> Result<String> {
    let json = match action {
        RangeCommand::Create {
            prefix,
            range_type,
            first,
            last,
        } => {
            let range = AddressRange::parse(range_type, &first, &last)
                .wrap_err_with(|| format!("Invalid boundaries for range '{}'", prefix))?;
            allocator.create_range(&prefix, &range)?;
            serde_json::to_string_pretty(&range_view(allocator, &prefix)?)?
        }
        RangeCommand::Show { prefix } => {
            serde_json::to_string_pretty(&range_view(allocator, &prefix)?)?
        }
        RangeCommand::Destroy { prefix } => {
            allocator.destroy_range(&prefix)?;
            serde_json::to_string_pretty(&serde_json::json!({ "destroyed": prefix }))?
        }
        RangeCommand::Usage { prefixes } => {
            let usage = prefixes
                .par_iter()
                .map(|prefix| {
                    allocator.usage(prefix).map(|usage| UsageView {
                        prefix: prefix.clone(),
                        usage,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            serde_json::to_string_pretty(&usage)?
        }
        RangeCommand::Keyspace { prefix } => {
            let report: KeyspaceReport = allocator.keyspace(&prefix)?.to_report();
            serde_json::to_string_pretty(&report)?
        }
    };
    Ok(json)
}

fn run_address<S: KvStore>(
    allocator: &Allocator<S>,
    policy: Policy,
    action: AddressCommand,
) -> Result<String> {
    let json = match action {
        AddressCommand::Generate {
            name,
            ranges,
            range_type,
        } => {
            let allocation =
                allocator.generate_with_validation(&name, &ranges, range_type, policy)?;
            let view = AddressView {
                address: Some(formatted(allocator, &allocation.prefix, &allocation.address)?),
                name,
                prefix: allocation.prefix,
                kind: Some(AllocationKind::Generated),
                pre_existing: Some(allocation.pre_existing),
            };
            serde_json::to_string_pretty(&view)?
        }
        AddressCommand::Hardcode {
            name,
            address,
            ranges,
            range_type,
        } => {
            let bytes = range_type
                .codec()
                .parse(&address)
                .wrap_err_with(|| format!("Invalid {} address '{}'", range_type, address))?;
            let allocation =
                allocator.hardcode_with_validation(&name, &ranges, &bytes, range_type, policy)?;
            let view = AddressView {
                address: Some(formatted(allocator, &allocation.prefix, &allocation.address)?),
                name,
                prefix: allocation.prefix,
                kind: Some(AllocationKind::Hardcoded),
                pre_existing: Some(allocation.pre_existing),
            };
            serde_json::to_string_pretty(&view)?
        }
        AddressCommand::Get {
            name,
            prefix,
            range_type,
        } => {
            let binding =
                allocator.get_binding_with_validation(&name, &prefix, range_type, policy)?;
            let view = match binding {
                Some(binding) => AddressView {
                    address: Some(formatted(allocator, &prefix, &binding.address)?),
                    kind: Some(binding.kind),
                    name,
                    prefix,
                    pre_existing: None,
                },
                None => AddressView {
                    name,
                    prefix,
                    address: None,
                    kind: None,
                    pre_existing: None,
                },
            };
            serde_json::to_string_pretty(&view)?
        }
        AddressCommand::Delete {
            name,
            address,
            prefix,
            kind,
        } => {
            let range = allocator.require_range(&prefix)?;
            let bytes = range
                .codec()
                .parse(&address)
                .wrap_err_with(|| format!("Invalid {} address '{}'", range.range_type, address))?;
            let existed =
                allocator.delete_with_validation(&name, &prefix, kind.into(), &bytes, policy)?;
            serde_json::to_string_pretty(&serde_json::json!({
                "name": name,
                "prefix": prefix,
                "deleted": existed,
            }))?
        }
        AddressCommand::List { prefix } => {
            let range = allocator.require_range(&prefix)?;
            let entries: Vec<serde_json::Value> = allocator
                .list_names(&prefix)?
                .into_iter()
                .map(|entry| {
                    serde_json::json!({
                        "name": entry.name,
                        "address": range.format(&entry.address),
                    })
                })
                .collect();
            serde_json::to_string_pretty(&entries)?
        }
    };
    Ok(json)
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    // Initialize logging with default filter level of "info"
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = resolve_config(&args)?;
    info!("Using state file: {:?}", config.store.path);

    let store = FileStore::open(&config.store.path)
        .wrap_err_with(|| format!("Failed to open state file '{}'", config.store.path.display()))?;
    let allocator = Allocator::new(store, config.engine_settings());

    let output = match args.command {
        Command::Range { action } => run_range(&allocator, action)?,
        Command::Address { action } => run_address(&allocator, config.policy(), action)?,
    };
    println!("{}", output);
    Ok(())
}
