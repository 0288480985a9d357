//! incentra-cli: command-line interface to an Incentra node.
//!
//! Every command is a single JSON-RPC call. Addresses, denominations and
//! allocations are parsed locally first so malformed input never reaches
//! the node.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde_json::Value;
use tracing::debug;

use incentra_core::{Address, Allocation, Denom, Params, Rate};

/// Incentra command-line interface.
#[derive(Parser)]
#[command(name = "incentra-cli")]
#[command(version, about = "Usage-proportional contract incentives")]
struct Cli {
    /// RPC endpoint URL.
    #[arg(
        short,
        long = "rpc",
        visible_alias = "rpc-endpoint",
        global = true,
        env = "INCENTRA_RPC_ENDPOINT",
        default_value = "http://127.0.0.1:26680"
    )]
    rpc_endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show node info.
    Info,
    /// Show the module params.
    Params,
    /// Update one or more module params.
    SetParams(SetParamsArgs),
    /// List every registered incentive.
    Incentives,
    /// Show the incentive of a contract.
    Incentive(ContractArgs),
    /// Register an incentive for a contract.
    Register(RegisterArgs),
    /// Cancel the incentive of a contract.
    Cancel(ContractArgs),
    /// Record usage of a contract by a participant.
    ReportUsage(ReportUsageArgs),
    /// Distribute rewards for every incentive now.
    Distribute,
    /// End the next epoch under an identifier.
    EndEpoch(EndEpochArgs),
    /// Show usage meters of a contract.
    Usage(UsageArgs),
    /// Show the total registered rate per denom.
    Allocations(AllocationsArgs),
    /// Mint funds into an account (the incentive pool by default).
    Fund(FundArgs),
    /// Show the balances of an account.
    Balance(BalanceArgs),
    /// Print the module genesis state.
    ExportGenesis,
}

#[derive(Args)]
struct ContractArgs {
    /// Contract address (0x-prefixed hex).
    contract: Address,
}

#[derive(Args)]
struct SetParamsArgs {
    /// Enable or disable the module.
    #[arg(long)]
    enable: Option<bool>,

    /// Per-denom allocation cap (e.g. 0.05).
    #[arg(long)]
    allocation_limit: Option<Rate>,

    /// Epoch identifier that triggers distribution.
    #[arg(long)]
    epoch_identifier: Option<String>,
}

#[derive(Args)]
struct RegisterArgs {
    /// Contract address (0x-prefixed hex).
    contract: Address,

    /// Allocations as denom:rate (e.g. uatom:0.05). Repeatable.
    #[arg(short, long = "allocation", required = true)]
    allocations: Vec<Allocation>,

    /// Number of epochs the incentive runs for.
    #[arg(short, long)]
    epochs: u32,
}

#[derive(Args)]
struct ReportUsageArgs {
    /// Contract address.
    contract: Address,

    /// Participant address.
    participant: Address,

    /// Usage units to add.
    delta: u64,
}

#[derive(Args)]
struct EndEpochArgs {
    /// Epoch identifier (default: the configured one).
    identifier: Option<String>,
}

#[derive(Args)]
struct UsageArgs {
    /// Contract address.
    contract: Address,

    /// Only show this participant's meter.
    #[arg(short, long)]
    participant: Option<Address>,
}

#[derive(Args)]
struct AllocationsArgs {
    /// Only show this denom.
    denom: Option<Denom>,
}

#[derive(Args)]
struct FundArgs {
    /// Denomination to mint.
    denom: Denom,

    /// Amount to mint.
    amount: u64,

    /// Recipient (default: the incentive pool).
    #[arg(short, long)]
    account: Option<Address>,
}

#[derive(Args)]
struct BalanceArgs {
    /// Account address.
    account: Address,

    /// Only show this denom.
    #[arg(short, long)]
    denom: Option<Denom>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let client = HttpClientBuilder::default()
        .build(&cli.rpc_endpoint)
        .context("Failed to connect to RPC")?;
    debug!(endpoint = %cli.rpc_endpoint, "rpc client ready");

    let result = run(&client, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Execute one command and return the node's JSON response.
async fn run(client: &HttpClient, command: Commands) -> Result<Value> {
    match command {
        Commands::Info => call(client, "getinfo", ArrayParams::new()).await,
        Commands::Params => call(client, "getparams", ArrayParams::new()).await,
        Commands::SetParams(args) => set_params(client, args).await,
        Commands::Incentives => call(client, "getincentives", ArrayParams::new()).await,
        Commands::Incentive(args) => {
            call(client, "getincentive", params([args.contract.to_string()])?).await
        }
        Commands::Register(args) => {
            let mut p = ArrayParams::new();
            p.insert(args.contract.to_string())?;
            p.insert(
                args.allocations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>(),
            )?;
            p.insert(args.epochs)?;
            call(client, "registerincentive", p).await
        }
        Commands::Cancel(args) => {
            call(client, "cancelincentive", params([args.contract.to_string()])?).await
        }
        Commands::ReportUsage(args) => {
            let mut p = ArrayParams::new();
            p.insert(args.contract.to_string())?;
            p.insert(args.participant.to_string())?;
            p.insert(args.delta)?;
            call(client, "reportusage", p).await
        }
        Commands::Distribute => call(client, "distribute", ArrayParams::new()).await,
        Commands::EndEpoch(args) => {
            let identifier = match args.identifier {
                Some(id) => id,
                None => fetch_params(client).await?.epoch_identifier,
            };
            call(client, "endepoch", params([identifier])?).await
        }
        Commands::Usage(args) => match args.participant {
            Some(participant) => {
                let p = params([args.contract.to_string(), participant.to_string()])?;
                call(client, "getusagemeter", p).await
            }
            None => call(client, "getusagemeters", params([args.contract.to_string()])?).await,
        },
        Commands::Allocations(args) => match args.denom {
            Some(denom) => call(client, "getallocationmeter", params([denom.to_string()])?).await,
            None => call(client, "getallocationmeters", ArrayParams::new()).await,
        },
        Commands::Fund(args) => {
            let mut p = ArrayParams::new();
            p.insert(args.denom.to_string())?;
            p.insert(args.amount)?;
            p.insert(args.account.map(|a| a.to_string()))?;
            call(client, "fund", p).await
        }
        Commands::Balance(args) => match args.denom {
            Some(denom) => {
                let p = params([args.account.to_string(), denom.to_string()])?;
                call(client, "getbalance", p).await
            }
            None => call(client, "getbalances", params([args.account.to_string()])?).await,
        },
        Commands::ExportGenesis => call(client, "exportgenesis", ArrayParams::new()).await,
    }
}

/// Fetch the current params, apply the overrides, and send them back.
async fn set_params(client: &HttpClient, args: SetParamsArgs) -> Result<Value> {
    let mut current = fetch_params(client).await?;
    apply_overrides(&mut current, args);
    current.validate().context("Invalid params")?;

    let mut p = ArrayParams::new();
    p.insert(&current)?;
    call(client, "setparams", p).await
}

fn apply_overrides(params: &mut Params, args: SetParamsArgs) {
    if let Some(enable) = args.enable {
        params.enable_incentives = enable;
    }
    if let Some(limit) = args.allocation_limit {
        params.allocation_limit = limit;
    }
    if let Some(id) = args.epoch_identifier {
        params.epoch_identifier = id;
    }
}

async fn fetch_params(client: &HttpClient) -> Result<Params> {
    client
        .request("getparams", ArrayParams::new())
        .await
        .context("RPC getparams failed")
}

async fn call(client: &HttpClient, method: &str, params: ArrayParams) -> Result<Value> {
    client
        .request(method, params)
        .await
        .with_context(|| format!("RPC {method} failed"))
}

/// Build positional params from a list of strings.
fn params<const N: usize>(items: [String; N]) -> Result<ArrayParams> {
    let mut p = ArrayParams::new();
    for item in items {
        p.insert(item)?;
    }
    Ok(p)
}
