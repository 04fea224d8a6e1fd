use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use ballot_cli::ballot::BallotClient;
use ballot_cli::board::{Board, MemoryBoard, TextBoard};
use ballot_cli::config::AppConfig;
use ballot_cli::contracts::ContractInterface;
use ballot_cli::ledger::EthLedger;
use ballot_cli::registry::CandidateId;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ballot", about = "Vote for candidates and display tallies of a Voting contract")]
struct Args {
    /// Path to the TOML config.
    #[arg(long, env = "BALLOT_CONFIG", default_value = "configs/ballot.toml")]
    config: PathBuf,

    /// Print the board as a JSON object instead of `slot<TAB>count` lines.
    #[arg(long)]
    json: bool,

    /// Debug logging (overridden by RUST_LOG).
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Display the current vote count of every registered candidate.
    Tally,
    /// Vote for a candidate, then redisplay its count.
    Vote {
        /// Candidate id: 0x-prefixed hex or a plain name (bytes32).
        candidate: String,
    },
    /// Ask the contract whether a candidate is valid.
    Check { candidate: String },
    /// List the contract's candidates and compare them with the registry.
    Candidates,
    /// Print the contract owner.
    Owner,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.verbose);

    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let cfg = AppConfig::from_toml(&args.config)?;
    let iface = ContractInterface::load(&cfg.contract.abi_path)?;
    info!(
        abi = %cfg.contract.abi_path.display(),
        abi_sha256 = %iface.fingerprint_hex(),
        candidates = cfg.candidates.len(),
        "loaded contract interface"
    );

    let ledger = EthLedger::connect(&cfg.ledger_config()?, &iface).await?;
    let client = BallotClient::new(ledger, cfg.registry()?, cfg.vote_settings()?)
        .with_interface(iface);

    match args.command {
        Command::Tally => {
            let report = if args.json {
                let mut board = MemoryBoard::new();
                let report = client.initialize(&mut board).await;
                print_json(&board)?;
                report
            } else {
                let mut board = TextBoard::new(io::stdout());
                client.initialize(&mut board).await
            };
            if !report.is_complete() {
                bail!(
                    "{} of {} candidates could not be queried",
                    report.failures.len(),
                    client.registry().len()
                );
            }
        }
        Command::Vote { candidate } => {
            let selection = CandidateId::parse(&candidate)?;
            if args.json {
                let mut board = MemoryBoard::new();
                let outcome = client.vote_for_candidate(&selection, &mut board).await;
                print_json(&board)?;
                outcome?;
            } else {
                let mut board = TextBoard::new(io::stdout());
                vote(&client, &selection, &mut board).await?;
            }
        }
        Command::Check { candidate } => {
            let id = CandidateId::parse(&candidate)?;
            let valid = client.check(&id).await?;
            if args.json {
                println!("{}", serde_json::json!({ "candidate": id.to_string(), "valid": valid }));
            } else {
                println!("{id}\t{}", if valid { "valid" } else { "invalid" });
            }
        }
        Command::Candidates => {
            let audit = client.audit().await?;
            if args.json {
                let view = serde_json::json!({
                    "on_chain": audit.on_chain.iter().map(describe).collect::<Vec<_>>(),
                    "unregistered": audit.unregistered.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "not_on_chain": audit.not_on_chain.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "truncated": audit.truncated,
                });
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                for id in &audit.on_chain {
                    let slot = client
                        .registry()
                        .slot_for(id)
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "-".to_string());
                    println!("{}\t{slot}", describe(id));
                }
                for id in &audit.not_on_chain {
                    println!("{id}\tregistered but not listed by the contract");
                }
            }
            if !audit.is_consistent() {
                bail!(
                    "registry out of sync with contract: {} unregistered, {} not on chain",
                    audit.unregistered.len(),
                    audit.not_on_chain.len()
                );
            }
        }
        Command::Owner => {
            let owner = client.owner().await?;
            println!("{owner:#x}");
        }
    }
    Ok(())
}

async fn vote<B: Board>(
    client: &BallotClient<EthLedger>,
    selection: &CandidateId,
    board: &mut B,
) -> Result<()> {
    let receipt = client
        .vote_for_candidate(selection, board)
        .await
        .with_context(|| format!("vote for {selection}"))?;
    info!(tx_hash = ?receipt.tx_hash, count = receipt.count, "vote recorded");
    Ok(())
}

fn describe(id: &CandidateId) -> String {
    match id.label() {
        Some(label) => format!("{id} ({label})"),
        None => id.to_string(),
    }
}

fn print_json(board: &MemoryBoard) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&board.to_json())?);
    Ok(())
}
