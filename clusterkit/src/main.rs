use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use clusterkit::{
    appstore,
    blockstore::{self, BlockStore, Pruner, TxIndexStore},
    config::{
        ChainConfig, CloneOptions, EvmAuxOptions, ExtractOptions, IndexOptions, PurgeOptions,
        DEFAULT_BATCH_SIZE,
    },
    util::dir_size,
};
use clusterkit_storage::rocksdb_storage::OpenMode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clusterkit", about = "Maintenance tools for node chain data")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Operations on the app store
    #[command(subcommand)]
    AppStore(AppStoreCommand),
    /// Operations on the block archive
    #[command(subcommand)]
    BlockStore(BlockStoreCommand),
    /// Print the version and the commit it was built from
    Version,
}

#[derive(Subcommand)]
enum AppStoreCommand {
    /// Copy one version of the app store into a new store
    Clone {
        src: PathBuf,
        dest: PathBuf,
        /// Version to clone, 0 for the latest
        #[arg(short = 'b', long, default_value_t = 0)]
        height: u64,
        /// Progress granularity, 0 disables progress logging
        #[arg(short = 'l', long = "log", default_value_t = 0)]
        log_level: u32,
        /// Node saves between intermediate commits, 0 for a single commit
        #[arg(short = 's', long, default_value_t = 0)]
        saves_per_commit: u64,
        /// Store holding the values of the latest version
        #[arg(long, value_name = "PATH")]
        src_value_db: Option<PathBuf>,
    },
    /// Copy the leaves of one version into a plain store
    ExtractValues {
        src: PathBuf,
        dest: PathBuf,
        /// Version to extract, 0 for the latest
        #[arg(long, default_value_t = 0)]
        version: u64,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Copy the EVM state of one version into a plain store
    ExtractEvmState {
        src: PathBuf,
        dest: PathBuf,
        /// Version to extract, 0 for the latest
        #[arg(short = 'b', long, default_value_t = 0)]
        height: u64,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Copy bloom filters and tx hashes into a store under their new prefixes
    ExtractEvmData {
        src: PathBuf,
        dest: PathBuf,
        /// Only copy bloom filters
        #[arg(long, conflicts_with = "tx_hashes")]
        bloom_filters: bool,
        /// Only copy tx hashes
        #[arg(long)]
        tx_hashes: bool,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Count the keys under a prefix and total their sizes
    TotalData {
        src: PathBuf,
        #[arg(short = 'p', long, default_value = "")]
        prefix: String,
        #[arg(short = 'l', long = "log", default_value_t = 0)]
        log_level: u32,
        #[arg(short = 'b', long, default_value_t = 0)]
        height: u64,
    },
}

#[derive(Subcommand)]
enum BlockStoreCommand {
    /// Build a store mapping block hashes to heights
    IndexByHash {
        /// Chain data root
        root: PathBuf,
        dest: PathBuf,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Remove every block above a height
    Rollback {
        /// Chain data root
        root: PathBuf,
        #[arg(short = 'b', long, default_value_t = 1)]
        height: u64,
        /// Also remove the transactions of deleted blocks from the tx index
        #[arg(long)]
        prune_tx_index: bool,
    },
    /// Remove every block below a height
    Purge {
        /// Chain data root
        root: PathBuf,
        #[arg(short = 'b', long, default_value_t = 1)]
        height: u64,
        #[command(flatten)]
        batch: BatchArgs,
        /// Keep going past heights without metadata
        #[arg(long)]
        skip_missing: bool,
        #[arg(long)]
        skip_compaction: bool,
        /// Also remove the transactions of deleted blocks from the tx index
        #[arg(long)]
        prune_tx_index: bool,
    },
}

#[derive(Args)]
struct BatchArgs {
    /// Entries per write batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    /// Progress granularity, 0 disables progress logging
    #[arg(short = 'l', long = "log", default_value_t = 0)]
    log_level: u32,
}

impl BatchArgs {
    fn extract(&self, version: u64) -> ExtractOptions {
        ExtractOptions {
            version,
            batch_size: self.batch_size,
            log_level: self.log_level,
        }
    }
}

fn check_source(path: &Path) -> anyhow::Result<()> {
    if !path.is_dir() {
        bail!("source {} is not a directory", path.display());
    }
    Ok(())
}

fn check_destination(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        bail!("destination {} already exists", path.display());
    }
    Ok(())
}

fn run_app_store(cmd: AppStoreCommand) -> anyhow::Result<()> {
    match cmd {
        AppStoreCommand::Clone {
            src,
            dest,
            height,
            log_level,
            saves_per_commit,
            src_value_db,
        } => {
            check_source(&src)?;
            if let Some(values) = &src_value_db {
                check_source(values)?;
            }
            check_destination(&dest)?;
            let options = CloneOptions {
                height,
                log_level,
                saves_per_commit,
            };
            let report = appstore::clone_tree(&src, src_value_db.as_deref(), &dest, &options)
                .context("clone failed")?;
            println!(
                "cloned version {} ({} keys) in {:?}",
                report.version, report.keys, report.elapsed
            );
            println!("source size: {} bytes", dir_size(&src)?);
            println!("destination size: {} bytes", dir_size(&dest)?);
        }
        AppStoreCommand::ExtractValues {
            src,
            dest,
            version,
            batch,
        } => {
            check_source(&src)?;
            check_destination(&dest)?;
            let stats = appstore::extract_values(&src, &dest, &batch.extract(version))
                .context("value extraction failed")?;
            println!("extracted {} keys in {:?}", stats.matched, stats.elapsed);
        }
        AppStoreCommand::ExtractEvmState {
            src,
            dest,
            height,
            batch,
        } => {
            check_source(&src)?;
            check_destination(&dest)?;
            let stats = appstore::extract_evm_state(&src, &dest, &batch.extract(height))
                .context("EVM state extraction failed")?;
            println!("extracted {} keys in {:?}", stats.matched, stats.elapsed);
        }
        AppStoreCommand::ExtractEvmData {
            src,
            dest,
            bloom_filters,
            tx_hashes,
            batch,
        } => {
            check_source(&src)?;
            let families = EvmAuxOptions {
                bloom_filter: !tx_hashes,
                tx_hash: !bloom_filters,
            };
            let stats = appstore::extract_evm_aux(&src, &dest, &batch.extract(0), families)
                .context("EVM data extraction failed")?;
            println!("extracted {} keys in {:?}", stats.matched, stats.elapsed);
        }
        AppStoreCommand::TotalData {
            src,
            prefix,
            log_level,
            height,
        } => {
            check_source(&src)?;
            let stats = appstore::total_data(&src, prefix.as_bytes(), height, log_level)
                .context("totalling data failed")?;
            println!("keys: {}", stats.num_keys);
            println!("key bytes: {}", stats.total_key_bytes);
            println!("value bytes: {}", stats.total_value_bytes);
            println!("total bytes: {}", stats.total_bytes());
            println!("elapsed: {:?}", stats.elapsed);
        }
    }
    Ok(())
}

fn open_tx_index(config: &ChainConfig, enabled: bool) -> anyhow::Result<Option<TxIndexStore>> {
    if !enabled {
        return Ok(None);
    }
    let tx_index =
        TxIndexStore::open_chain(config, OpenMode::ReadWrite).context("cannot open tx index")?;
    Ok(Some(tx_index))
}

fn run_block_store(cmd: BlockStoreCommand) -> anyhow::Result<()> {
    match cmd {
        BlockStoreCommand::IndexByHash { root, dest, batch } => {
            check_source(&root)?;
            check_destination(&dest)?;
            let options = IndexOptions {
                batch_size: batch.batch_size,
                log_level: batch.log_level,
            };
            let report =
                blockstore::index_by_hash(&root, &dest, &options).context("indexing failed")?;
            println!(
                "indexed {} blocks, {} missing",
                report.indexed, report.missing
            );
        }
        BlockStoreCommand::Rollback {
            root,
            height,
            prune_tx_index,
        } => {
            check_source(&root)?;
            let config = ChainConfig::load(&root)?;
            let store = BlockStore::open_chain(&config, OpenMode::ReadWrite)?;
            let tx_index = open_tx_index(&config, prune_tx_index)?;
            let mut pruner = Pruner::new(&store);
            if let Some(tx_index) = &tx_index {
                pruner = pruner.with_tx_index(tx_index);
            }
            let report = pruner.rollback(height).context("rollback failed")?;
            println!(
                "rolled back to height {height}, removed {} blocks and {} txs",
                report.removed, report.txs_removed
            );
        }
        BlockStoreCommand::Purge {
            root,
            height,
            batch,
            skip_missing,
            skip_compaction,
            prune_tx_index,
        } => {
            check_source(&root)?;
            let config = ChainConfig::load(&root)?;
            let store = BlockStore::open_chain(&config, OpenMode::ReadWrite)?;
            let tx_index = open_tx_index(&config, prune_tx_index)?;
            let mut pruner = Pruner::new(&store);
            if let Some(tx_index) = &tx_index {
                pruner = pruner.with_tx_index(tx_index);
            }
            let options = PurgeOptions {
                batch_size: batch.batch_size,
                log_level: batch.log_level,
                skip_missing,
                skip_compaction,
            };
            let report = pruner.purge(height, &options).context("purge failed")?;
            println!(
                "purged {} blocks below height {height}, {} missing, {} txs removed",
                report.removed, report.missing, report.txs_removed
            );
            if let Some(gap) = report.stopped_at {
                println!("stopped at missing height {gap}");
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.cmd {
        Command::AppStore(cmd) => run_app_store(cmd),
        Command::BlockStore(cmd) => run_block_store(cmd),
        Command::Version => {
            println!("{}", clusterkit::full_version());
            Ok(())
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
