//! govflow command line
//!
//! - `propose`: resolve the governance, assemble a treasury transfer
//!   proposal and submit it one step per transaction, strictly in order
//! - `treasury`: list the asset accounts a governance controls
//! - `mint-to`: mint to many token accounts, chunked by
//!   `submission.chunk_size` and submitted in order

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use govflow::config::{parse_pubkey, Config};
use govflow::governance::{
    treasury_transfer, AssetDiscovery, AssetKind, GovernanceTarget, ProposalDraft,
    ProposalPipeline, ProposalRequest, RpcAssetDiscovery, RpcGovernanceResolver,
};
use govflow::metrics::Metrics;
use govflow::rpc_manager::RpcTransport;
use govflow::submission::{BatchOutcome, SubmissionEngine, SubmissionReport};
use govflow::tx_builder::{InstructionUnit, SequencePolicy};
use govflow::wallet::WalletManager;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "GOVFLOW_CONFIG")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON (overrides monitoring.json_logs)
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a proposal transferring native currency out of the treasury
    Propose(ProposeArgs),
    /// List treasury asset accounts of a governance
    Treasury(TargetArgs),
    /// Mint the same amount to many token accounts; the wallet is the mint authority
    MintTo(MintToArgs),
}

#[derive(Args, Debug)]
struct MintToArgs {
    /// Token mint
    #[arg(long)]
    mint: String,

    /// Amount in base units per recipient
    #[arg(long)]
    amount: u64,

    /// Recipient token accounts
    #[arg(long = "recipient", required = true)]
    recipients: Vec<String>,

    /// Submit every chunk at once instead of one after another
    #[arg(long)]
    parallel: bool,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Realm address (overrides governance.realm)
    #[arg(long, env = "GOVFLOW_REALM")]
    realm: Option<String>,

    /// Governance address (overrides governance.governance)
    #[arg(long, env = "GOVFLOW_GOVERNANCE")]
    governance: Option<String>,

    /// Governing token mint (overrides governance.governing_token_mint)
    #[arg(long, env = "GOVFLOW_MINT")]
    mint: Option<String>,
}

#[derive(Args, Debug)]
struct ProposeArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Proposal title
    #[arg(long)]
    name: String,

    /// Link to the proposal description
    #[arg(long, default_value = "")]
    description: String,

    /// Recipient of the transfer
    #[arg(long)]
    destination: String,

    /// Amount in lamports
    #[arg(long)]
    amount: u64,

    /// Signatory key; defaults to the wallet. Sign-off needs this key to sign
    #[arg(long)]
    signatory: Option<String>,

    /// Hold-up time in seconds; defaults to the governance minimum
    #[arg(long)]
    hold_up: Option<u32>,

    /// Assemble and print the steps without submitting
    #[arg(long)]
    dry_run: bool,

    /// Print Prometheus metrics after submission
    #[arg(long)]
    print_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(cli.verbose, cli.json_logs || config.monitoring.json_logs)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting govflow");

    match cli.command {
        Command::Propose(args) => propose(&config, args).await,
        Command::Treasury(args) => treasury(&config, args).await,
        Command::MintTo(args) => mint_to(&config, args).await,
    }
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "govflow=debug,info"
    } else {
        "govflow=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path))
    } else {
        dotenvy::dotenv().ok();
        warn!("Config file '{}' not found, using defaults", path);
        Ok(Config::default())
    }
}

fn pick(field: &str, flag: Option<String>, configured: &Option<String>) -> Result<Pubkey> {
    let value = flag
        .or_else(|| configured.clone())
        .with_context(|| format!("{} is not set", field))?;
    Ok(parse_pubkey(field, &value)?)
}

fn resolve_target(config: &Config, args: TargetArgs, token_owner: Pubkey) -> Result<GovernanceTarget> {
    let gov = &config.governance;
    Ok(GovernanceTarget {
        program_id: parse_pubkey("governance.program_id", &gov.program_id)?,
        realm: pick("governance.realm", args.realm, &gov.realm)?,
        governance: pick("governance.governance", args.governance, &gov.governance)?,
        governing_token_mint: pick(
            "governance.governing_token_mint",
            args.mint,
            &gov.governing_token_mint,
        )?,
        token_owner,
    })
}

async fn propose(config: &Config, args: ProposeArgs) -> Result<()> {
    let wallet = Arc::new(
        WalletManager::from_file(&config.wallet.keypair_path).context("Failed to load wallet")?,
    );
    let payer = wallet.pubkey();
    info!(wallet = %payer, "Wallet loaded");

    let target = resolve_target(config, args.target, payer)?;
    let destination = parse_pubkey("destination", &args.destination)?;
    let signatory = match &args.signatory {
        Some(value) => parse_pubkey("signatory", value)?,
        None => payer,
    };

    let transport = Arc::new(RpcTransport::from_config(
        &config.rpc,
        config.submission.simulate_before_send,
    )?);
    let discovery = RpcAssetDiscovery::new(transport.client(), transport.commitment());
    let assets = discovery.discover(&target.program_id, &target.governance).await?;
    let native = assets
        .iter()
        .find(|asset| asset.kind == AssetKind::Native)
        .context("native treasury missing from discovered assets")?;
    let payload = treasury_transfer(native, &destination, args.amount)?.to_unit(&target.program_id)?;

    let resolver = Arc::new(RpcGovernanceResolver::new(
        transport.client(),
        transport.commitment(),
        config.rpc.max_retries as usize,
    ));
    let pipeline = ProposalPipeline::new(resolver, target);
    let assembled = pipeline
        .assemble(
            payer,
            ProposalRequest {
                draft: ProposalDraft::approve_deny(args.name, args.description),
                signatory,
                payload: vec![vec![payload]],
                hold_up_time: args.hold_up,
            },
        )
        .await?;

    println!("proposal {} (index {})", assembled.proposal, assembled.proposal_index);
    for step in assembled.steps() {
        println!("  step {}", step);
    }
    if args.dry_run {
        return Ok(());
    }

    let metrics = Arc::new(Metrics::new()?);
    metrics.pipelines_assembled.inc();
    let mut engine = SubmissionEngine::new(transport, Arc::clone(&wallet), config.engine_config());
    if config.monitoring.enable_metrics {
        engine = engine.with_metrics(Arc::clone(&metrics));
    }

    let report = engine.submit(assembled.into_schedule()).await;
    if args.print_metrics && config.monitoring.enable_metrics {
        print!("{}", metrics.render()?);
    }
    finish_report(&report)?;
    info!(confirmed = report.confirmed_count(), "Proposal submitted");
    Ok(())
}

/// Print one line per batch and fail unless everything confirmed
fn finish_report(report: &SubmissionReport) -> Result<()> {
    for result in &report.results {
        let signature = result
            .signature
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  batch {}: {} ({})", result.index, result.outcome, signature);
    }
    if let Some((index, err)) = report.first_failure() {
        bail!("batch {} failed: {}", index, err);
    }
    if report.results.iter().any(|r| r.outcome == BatchOutcome::Skipped) {
        bail!("submission cancelled before every batch was sent");
    }
    Ok(())
}

async fn mint_to(config: &Config, args: MintToArgs) -> Result<()> {
    let wallet = Arc::new(
        WalletManager::from_file(&config.wallet.keypair_path).context("Failed to load wallet")?,
    );
    let authority = wallet.pubkey();
    let mint = parse_pubkey("mint", &args.mint)?;

    let mut units: Vec<InstructionUnit> = Vec::with_capacity(args.recipients.len());
    for recipient in &args.recipients {
        let account = parse_pubkey("recipient", recipient)?;
        let instruction = spl_token::instruction::mint_to(
            &spl_token::id(),
            &mint,
            &account,
            &authority,
            &[],
            args.amount,
        )
        .context("Failed to build mint instruction")?;
        units.push(instruction.into());
    }

    let policy = if args.parallel {
        SequencePolicy::Parallel
    } else {
        SequencePolicy::Sequential
    };
    let schedule = config.bulk_schedule(&units, policy)?;
    info!(
        recipients = units.len(),
        batches = schedule.len(),
        chunk_size = config.submission.chunk_size,
        %policy,
        "Minting"
    );

    let transport = Arc::new(RpcTransport::from_config(
        &config.rpc,
        config.submission.simulate_before_send,
    )?);
    let mut engine = SubmissionEngine::new(transport, wallet, config.engine_config());
    if config.monitoring.enable_metrics {
        engine = engine.with_metrics(Arc::new(Metrics::new()?));
    }

    let report = engine.submit(schedule).await;
    finish_report(&report)?;
    info!(confirmed = report.confirmed_count(), "Mint complete");
    Ok(())
}

async fn treasury(config: &Config, args: TargetArgs) -> Result<()> {
    let gov = &config.governance;
    let program_id = parse_pubkey("governance.program_id", &gov.program_id)?;
    let governance = pick("governance.governance", args.governance, &gov.governance)?;

    let transport = RpcTransport::from_config(&config.rpc, true)?;
    let discovery = RpcAssetDiscovery::new(transport.client(), transport.commitment());
    let assets = discovery.discover(&program_id, &governance).await?;

    for asset in &assets {
        match asset.kind {
            AssetKind::Native => println!("{}  native  {} lamports", asset.address, asset.balance),
            AssetKind::Token { mint, .. } => {
                println!("{}  token   {} (mint {})", asset.address, asset.balance, mint)
            }
        }
    }
    Ok(())
}
