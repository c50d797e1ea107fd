// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Snapshot documents and the two-tier snapshot cache.
//!
//! A [`Snapshot`] is the persisted aggregate for one `(version, date,
//! tightness)` key. Reads go through [`TieredSnapshots`]: the in-process
//! mirror first, then the durable store, warming the mirror on a store
//! hit. The two tiers miss independently; a durable hit says nothing
//! about the process cache and vice versa.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_types::types::{CountryCode, CountrySpace, Day, IpVersion, Tightness};

#[derive(Debug, Error)]
pub enum SnapshotStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("snapshot store unavailable: {detail}")]
    Unavailable { detail: String },
}

pub type Result<T> = std::result::Result<T, SnapshotStoreError>;

/// Cache/store key. Tightness is meaningless for v4 and pinned to
/// `Straight` so v4 keys collapse to a single granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotKey {
    pub version: IpVersion,
    pub date: Day,
    pub tightness: Tightness,
}

impl SnapshotKey {
    pub fn new(version: IpVersion, date: Day, tightness: Tightness) -> Self {
        let tightness = match version {
            IpVersion::V4 => Tightness::Straight,
            IpVersion::V6 => tightness,
        };
        Self {
            version,
            date,
            tightness,
        }
    }

    /// Stable token used for file names and log lines, e.g. `6-20230101-1`.
    pub fn token(&self) -> String {
        match self.version {
            IpVersion::V4 => format!("4-{}", self.date),
            IpVersion::V6 => format!("6-{}-{}", self.date, self.tightness.as_flag()),
        }
    }
}

/// Persisted aggregate for one key.
///
/// `data` is authoritative only for the countries in `known_countries`;
/// a country missing from that set must not be trusted even if a stale
/// copy left an entry behind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub date: Day,
    pub known_countries: BTreeSet<CountryCode>,
    pub data: CountrySpace,
}

impl Snapshot {
    pub fn new(date: Day, known_countries: BTreeSet<CountryCode>, data: CountrySpace) -> Self {
        Self {
            date,
            known_countries,
            data,
        }
    }
}

/// Durable keyed snapshot storage. Entries live until overwritten; no
/// eviction or expiry is defined.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, key: &SnapshotKey) -> Result<Option<Snapshot>>;
    async fn put(&self, key: &SnapshotKey, snapshot: Snapshot) -> Result<()>;
}

/// In-memory keyed store. Serves as the process cache tier and as the
/// durable tier in tests.
#[derive(Default)]
pub struct MemorySnapshotStore {
    entries: RwLock<HashMap<SnapshotKey, Snapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get(&self, key: &SnapshotKey) -> Result<Option<Snapshot>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &SnapshotKey, snapshot: Snapshot) -> Result<()> {
        self.entries.write().insert(*key, snapshot);
        Ok(())
    }
}

/// Snapshot store backed by one pretty-printed JSON file per key.
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn file_path(&self, key: &SnapshotKey) -> PathBuf {
        self.root.join(format!("space-{}.json", key.token()))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn get(&self, key: &SnapshotKey) -> Result<Option<Snapshot>> {
        let path = self.file_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn put(&self, key: &SnapshotKey, snapshot: Snapshot) -> Result<()> {
        let path = self.file_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, &snapshot)?;
        Ok(())
    }
}

/// Read-through composition of the process cache and the durable store.
pub struct TieredSnapshots {
    process: MemorySnapshotStore,
    durable: Arc<dyn SnapshotStore>,
}

impl TieredSnapshots {
    pub fn new(durable: Arc<dyn SnapshotStore>) -> Self {
        Self {
            process: MemorySnapshotStore::new(),
            durable,
        }
    }

    /// Cheapest source first: the process mirror, then the durable store.
    /// A durable hit warms the mirror before returning.
    pub async fn get(&self, key: &SnapshotKey) -> Result<Option<Snapshot>> {
        if let Some(snapshot) = self.process.get(key).await? {
            debug!("snapshot cache hit key={}", key.token());
            return Ok(Some(snapshot));
        }
        match self.durable.get(key).await? {
            Some(snapshot) => {
                debug!("snapshot store hit key={}; warming process cache", key.token());
                if let Err(err) = self.process.put(key, snapshot.clone()).await {
                    warn!("failed to warm process cache for key={}: {err}", key.token());
                }
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Write-through: the process mirror first, then the durable store.
    /// Entries replace wholesale; there is no field-level patching.
    pub async fn put(&self, key: &SnapshotKey, snapshot: Snapshot) -> Result<()> {
        if let Err(err) = self.process.put(key, snapshot.clone()).await {
            warn!("failed to set process cache for key={}: {err}", key.token());
        }
        self.durable.put(key, snapshot).await
    }
}
