// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! End-to-end: raw delegation lines through ingestion, aggregation,
//! snapshot reconciliation, and flattening.

use std::collections::BTreeSet;
use std::sync::Arc;

use alloc_store::MemoryAllocationStore;
use bucketing::ingest::{v4_record, v6_record, RegistryLine};
use core_types::config::SpaceConfig;
use core_types::types::{CountryCode, Day, IpVersion, Tightness};
use snapshot_cache::{MemorySnapshotStore, TieredSnapshots};
use space_engine::{SpaceReconciler, SpaceRequest};

const DELEGATION_LINES: &[&str] = &[
    "apnic|CN|ipv4|1.0.1.0|256|20110414|allocated",
    "apnic|CN|ipv4|1.0.2.0|512|20110414|allocated",
    "apnic|HK|ipv4|1.0.32.0|1024|20110412|allocated",
    "apnic|US|ipv4|2.0.0.0|65536|20000101|assigned",
    "apnic|EU|ipv4|3.0.0.0|65536|20000101|allocated",
    "apnic|JP|ipv4|4.0.0.0|65536|20000101|reserved",
    "apnic|JP|ipv4|5.0.0.0|65536|20000101|available",
    "apnic|JP|ipv6|2001:200::|35|19990813|allocated",
    "apnic|TW|ipv6|2404:3c00::|32|20000101|allocated",
];

fn load_store() -> MemoryAllocationStore {
    let store = MemoryAllocationStore::new();
    for raw in DELEGATION_LINES {
        let line = RegistryLine::parse(raw).unwrap();
        let record = match line.rtype {
            "ipv4" => v4_record(&line).unwrap(),
            "ipv6" => v6_record(&line).unwrap(),
            other => panic!("unexpected record type {other}"),
        };
        if let Some(record) = record {
            store.insert(record);
        }
    }
    store
}

fn reconciler(store: Arc<MemoryAllocationStore>) -> SpaceReconciler {
    SpaceReconciler::new(
        SpaceConfig::default(),
        store,
        TieredSnapshots::new(Arc::new(MemorySnapshotStore::new())),
    )
}

fn cc(code: &str) -> CountryCode {
    CountryCode::new(code).unwrap()
}

fn countries(codes: &[&str]) -> BTreeSet<CountryCode> {
    codes.iter().map(|code| cc(code)).collect()
}

#[tokio::test]
async fn ingestion_filters_never_reach_the_resolved_space() {
    let engine = reconciler(Arc::new(load_store()));
    let request = SpaceRequest::new(
        IpVersion::V4,
        Day(20230101),
        countries(&["CN", "US", "JP", "EU", "HK"]),
    );
    let resolved = engine.resolve(&request).await.unwrap();

    // Available/reserved JP rows and the EU pseudo-country were dropped
    // at ingestion; HK folded into CN before aggregation.
    assert!(!resolved.data.contains_key(&cc("JP")));
    assert!(!resolved.data.contains_key(&cc("EU")));
    assert!(!resolved.data.contains_key(&cc("HK")));
    assert_eq!(resolved.data[&cc("CN")]["1.0.0.0/16"], 256 + 512 + 1024);
    assert_eq!(resolved.data[&cc("US")]["2.0.0.0/16"], 65536);
}

#[tokio::test]
async fn dates_slice_history_and_snapshots_carry_deltas_forward() {
    let store = Arc::new(load_store());
    let engine = reconciler(store.clone());

    // At the 2011 anchor, before the April APNIC rows, only US space
    // exists.
    let early = SpaceRequest::new(IpVersion::V4, Day(20110101), countries(&["CN", "US"]))
        .with_refresh(true);
    let resolved = engine.resolve(&early).await.unwrap();
    assert!(!resolved.data.contains_key(&cc("CN")));
    assert_eq!(resolved.data[&cc("US")]["2.0.0.0/16"], 65536);
    let baseline = store.query_count();

    // A later date in the same anchor year is seeded from that snapshot
    // and picks the April rows up through a single delta window.
    let late = SpaceRequest::new(IpVersion::V4, Day(20111231), countries(&["CN", "US"]));
    let resolved = engine.resolve(&late).await.unwrap();
    assert_eq!(resolved.data[&cc("CN")]["1.0.0.0/16"], 1792);
    assert_eq!(resolved.data[&cc("US")]["2.0.0.0/16"], 65536);
    assert_eq!(store.query_count(), baseline + 1);
}

#[tokio::test]
async fn flattened_v6_space_folds_tw_into_cn() {
    let engine = reconciler(Arc::new(load_store()));
    let request = SpaceRequest::new(IpVersion::V6, Day(20230101), countries(&["CN", "JP"]))
        .with_tightness(Tightness::Tight);
    let response = engine.resolve_space(&request).await.unwrap();

    // Both /32-equivalent allocations sit in distinct /24 buckets.
    let owners: Vec<(&str, &str)> = response
        .blocks
        .iter()
        .map(|block| (block.bucket.as_str(), block.country.as_str()))
        .collect();
    assert_eq!(
        owners,
        vec![("2001:200::/24", "JP"), ("2404:3c00::/24", "CN")]
    );
    assert_eq!(response.snapshot_date, Day(20230101));
}
