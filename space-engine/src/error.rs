// Copyright (c) James Kassemi, SC, US. All rights reserved.

use thiserror::Error;

use alloc_store::AllocStoreError;
use snapshot_cache::SnapshotStoreError;

#[derive(Debug, Error)]
pub enum SpaceError {
    #[error("allocation query failed: {0}")]
    Alloc(#[from] AllocStoreError),
    #[error("snapshot store failed: {0}")]
    Snapshot(#[from] SnapshotStoreError),
}

pub type Result<T> = std::result::Result<T, SpaceError>;
