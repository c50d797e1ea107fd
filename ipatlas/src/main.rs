mod config;
mod loader;

use std::{env, process, str::FromStr, sync::Arc};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use alloc_store::MemoryAllocationStore;
use config::{AppConfig, ConfigError, Environment};
use core_types::types::IpVersion;
use loader::{LoadError, LoadReport};
use snapshot_cache::{FileSnapshotStore, TieredSnapshots};
use space_engine::{SpaceError, SpaceReconciler};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("ipatlas failed: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let config = AppConfig::load(parse_environment()?)?;
    config.ensure_dirs()?;

    let store = Arc::new(MemoryAllocationStore::new());
    let mut totals = LoadReport::default();
    for path in &config.delegation_files {
        let report = loader::load_delegation_file(path, store.as_ref())?;
        println!(
            "Loaded {}: v4={} v6={} skipped={} rejected={}",
            path.display(),
            report.v4,
            report.v6,
            report.skipped,
            report.rejected
        );
        totals.merge(&report);
    }
    println!(
        "Allocation store ready: {} v4 records, {} v6 records ({} rows rejected)",
        store.len(IpVersion::V4),
        store.len(IpVersion::V6),
        totals.rejected
    );

    let durable = Arc::new(FileSnapshotStore::new(config.snapshot_dir()));
    let reconciler = SpaceReconciler::new(
        config.space.clone(),
        store,
        TieredSnapshots::new(durable),
    );

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())?;

    println!(
        "ipatlas booted in {} mode; snapshot state at {:?}",
        config.env_label(),
        config.snapshot_dir()
    );
    println!(
        "Warming snapshots over {} countries; press Ctrl+C to stop early.",
        config.space.warm_countries.len()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(reconciler.warm(&cancel))?;
    if report.cancelled {
        println!("Warm pass interrupted after {} snapshots.", report.resolved);
    } else {
        println!("Warm pass complete: {} snapshots resolved.", report.resolved);
    }
    Ok(())
}

fn parse_environment() -> Result<Environment, AppError> {
    let arg = env::args().nth(1).ok_or(AppError::Usage)?;
    Environment::from_str(&arg).map_err(AppError::from)
}

#[derive(Debug, Error)]
enum AppError {
    #[error("usage: ipatlas <dev|prod>")]
    Usage,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error("failed to build async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}
