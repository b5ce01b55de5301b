//! Chain store inspector
//! 
//! Opens a block store, rebuilds the chain index and reports what the next
//! block must look like.
//!
//! Usage: hybrid-inspect <store-path> [--testnet] [--params <json>] [--log-level <level>]

use clap::Parser;
use hybrid_core::consensus::{next_work_required, Algorithm, Network, NetworkRules};
use hybrid_core::storage::BlockStore;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Inspect a hybrid chain block store.
#[derive(Parser, Debug)]
#[command(name = "hybrid-inspect")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the sled block store
    store_path: PathBuf,

    /// Use the test network profile
    #[arg(long)]
    testnet: bool,

    /// JSON file with a complete rule set, overriding the built-in profile
    #[arg(long)]
    params: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: Level,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let network = if args.testnet { Network::Test } else { Network::Main };
    let rules = match &args.params {
        Some(path) => NetworkRules::from_json_file(path)?,
        None => NetworkRules::for_network(network),
    };
    let params = &rules.params;
    info!(network = ?params.network, genesis = %params.genesis_hash, "Using network rules");

    let store = BlockStore::open(&args.store_path)?;
    let index = store.load_chain_index()?;

    let tip = index.best_tip();
    match tip {
        Some(tip) => {
            let link = index.get(tip);
            info!(
                height = link.height,
                hash = %link.hash,
                proof_of_stake = link.is_proof_of_stake(),
                chain_tx = link.chain_tx,
                "Best tip"
            );
            if store.tip()? != Some(link.hash) {
                warn!("Recorded tip differs from the heaviest indexed chain");
            }
        }
        None => info!("Store is empty"),
    }

    for algorithm in Algorithm::ALL {
        let bits = next_work_required(&index, tip, algorithm, false, params)?;
        info!(algorithm = %algorithm, bits = format_args!("{:#010x}", bits), "Next PoW target");
    }
    let pos_bits = next_work_required(&index, tip, Algorithm::X12, true, params)?;
    info!(bits = format_args!("{:#010x}", pos_bits), "Next PoS target");

    match rules.checkpoints.last_checkpoint(&index) {
        Some(checkpoint) => {
            info!(height = checkpoint.height, hash = %checkpoint.hash, "Last checkpoint")
        }
        None => info!("No checkpoint reached"),
    }

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let progress = rules
        .checkpoints
        .guess_verification_progress(tip.map(|id| index.get(id)), now);
    info!(
        progress = format_args!("{}.{:04}%", progress / 10_000, progress % 10_000),
        "Estimated verification progress"
    );

    Ok(())
}
