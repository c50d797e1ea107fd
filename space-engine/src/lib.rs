// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Incremental reconciliation of per-country address space over time.
//!
//! Answers "which countries held which address buckets as of date D"
//! without re-scanning full allocation history per request: the
//! [`reconciler::SpaceReconciler`] seeds each answer from the nearest
//! prior snapshot, tops it up with a bounded delta aggregation, and
//! optionally persists the result for the next caller.

pub mod anchor;
pub mod error;
pub mod flatten;
pub mod reconciler;

pub use anchor::AnchorTable;
pub use error::{Result, SpaceError};
pub use flatten::{flatten, BucketOwnership};
pub use reconciler::{
    ResolvedSpace, SpaceReconciler, SpaceRequest, SpaceResponse, WarmReport,
};
