// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, info};
use tokio_util::sync::CancellationToken;

use alloc_store::{AllocationStore, BucketAggregate, DateFilter};
use core_types::config::SpaceConfig;
use core_types::types::{
    add_count, BucketField, CountryCode, CountrySpace, Day, IpVersion, Tightness,
};
use snapshot_cache::{Snapshot, SnapshotKey, TieredSnapshots};

use crate::anchor::AnchorTable;
use crate::error::Result;
use crate::flatten::{flatten, BucketOwnership};

/// One space query: which countries hold which buckets as of `date`.
#[derive(Clone, Debug)]
pub struct SpaceRequest {
    pub version: IpVersion,
    pub date: Day,
    pub countries: BTreeSet<CountryCode>,
    pub tightness: Tightness,
    /// Persist the computed space back at the requested date.
    pub refresh: bool,
    /// Consult the snapshot tiers even when refreshing.
    pub force_cache: bool,
}

impl SpaceRequest {
    pub fn new(version: IpVersion, date: Day, countries: BTreeSet<CountryCode>) -> Self {
        Self {
            version,
            date,
            countries,
            tightness: Tightness::Straight,
            refresh: false,
            force_cache: false,
        }
    }

    pub fn with_tightness(mut self, tightness: Tightness) -> Self {
        self.tightness = tightness;
        self
    }

    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_force_cache(mut self, force_cache: bool) -> Self {
        self.force_cache = force_cache;
        self
    }
}

/// The computed country map plus the date it is effective for (the
/// requested date after clamping to the end of loaded data).
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedSpace {
    pub data: CountrySpace,
    pub snapshot_date: Day,
}

/// Flattened, route-facing form of a resolved space.
#[derive(Clone, Debug, PartialEq)]
pub struct SpaceResponse {
    pub blocks: Vec<BucketOwnership>,
    pub snapshot_date: Day,
}

#[derive(Debug, Default)]
pub struct WarmReport {
    pub resolved: usize,
    pub cancelled: bool,
}

/// The usable portion of a snapshot hit: how fresh it is and which of
/// the requested countries it actually answers for.
struct CachedSlice {
    date: Day,
    found: BTreeSet<CountryCode>,
}

/// Answers space queries by stitching snapshots together with targeted
/// allocation-store aggregations, instead of re-scanning full history
/// on every request.
pub struct SpaceReconciler {
    config: SpaceConfig,
    anchors: AnchorTable,
    allocations: Arc<dyn AllocationStore>,
    snapshots: TieredSnapshots,
}

impl SpaceReconciler {
    pub fn new(
        config: SpaceConfig,
        allocations: Arc<dyn AllocationStore>,
        snapshots: TieredSnapshots,
    ) -> Self {
        let anchors = AnchorTable::from_config(&config);
        Self {
            config,
            anchors,
            allocations,
            snapshots,
        }
    }

    pub fn anchor_table(&self) -> &AnchorTable {
        &self.anchors
    }

    /// Computes the per-country bucket counts effective at the requested
    /// date.
    ///
    /// The snapshot nearest at or before the date seeds the result for
    /// the countries it knows; a delta aggregation over `(snapshot date,
    /// requested date]` brings those forward, and a full-history
    /// aggregation fills in the countries the snapshot is missing. With
    /// `refresh` the combined result is persisted back at the requested
    /// date before returning.
    pub async fn resolve(&self, request: &SpaceRequest) -> Result<ResolvedSpace> {
        let date = self.clamp_date(request.version, request.date);
        if request.countries.is_empty() {
            return Ok(ResolvedSpace {
                data: CountrySpace::new(),
                snapshot_date: date,
            });
        }

        let mut combined = CountrySpace::new();
        let mut cached: Option<CachedSlice> = None;

        if !request.refresh || request.force_cache {
            let anchor = self.anchors.nearest_anchor(request.version, date);
            let key = SnapshotKey::new(request.version, anchor, request.tightness);
            if let Some(snapshot) = self.snapshots.get(&key).await? {
                let found: BTreeSet<CountryCode> = request
                    .countries
                    .intersection(&snapshot.known_countries)
                    .copied()
                    .collect();
                for country in &found {
                    if let Some(buckets) = snapshot.data.get(country) {
                        combined.insert(*country, buckets.clone());
                    }
                }
                if !request.refresh && snapshot.date == date && found == request.countries {
                    debug!("snapshot {} answers the request in full", key.token());
                    return Ok(ResolvedSpace {
                        data: combined,
                        snapshot_date: snapshot.date,
                    });
                }
                cached = Some(CachedSlice {
                    date: snapshot.date,
                    found,
                });
            }
        }

        let field = BucketField::select(request.version, request.tightness);

        // Countries the snapshot could not answer for need full history.
        let full_set: BTreeSet<CountryCode> = match &cached {
            None => request.countries.clone(),
            Some(slice) => request
                .countries
                .difference(&slice.found)
                .copied()
                .collect(),
        };
        if !full_set.is_empty() {
            let rows = self
                .allocations
                .aggregate(request.version, field, &full_set, DateFilter::through(date))
                .await?;
            debug!(
                "full aggregation through {date} countries={} rows={}",
                full_set.len(),
                rows.len()
            );
            merge_rows(&mut combined, rows);
        }

        // Countries the snapshot did answer for only need the window
        // between its date and the requested date.
        if let Some(slice) = &cached {
            if slice.date < date && !slice.found.is_empty() {
                let rows = self
                    .allocations
                    .aggregate(
                        request.version,
                        field,
                        &slice.found,
                        DateFilter::between(slice.date, date),
                    )
                    .await?;
                debug!(
                    "delta aggregation ({}, {date}] countries={} rows={}",
                    slice.date,
                    slice.found.len(),
                    rows.len()
                );
                merge_rows(&mut combined, rows);
            }
        }

        if request.refresh {
            self.persist(request, date, &combined).await?;
        }

        combined.retain(|country, _| request.countries.contains(country));
        Ok(ResolvedSpace {
            data: combined,
            snapshot_date: date,
        })
    }

    /// Resolves and flattens to one winning country per bucket.
    pub async fn resolve_space(&self, request: &SpaceRequest) -> Result<SpaceResponse> {
        let resolved = self.resolve(request).await?;
        Ok(SpaceResponse {
            blocks: flatten(&resolved.data),
            snapshot_date: resolved.snapshot_date,
        })
    }

    /// Precomputes a snapshot at every anchor for the configured warm
    /// country set, across both address families and, for v6, both
    /// bucket granularities.
    pub async fn warm(&self, cancel: &CancellationToken) -> Result<WarmReport> {
        let countries: BTreeSet<CountryCode> =
            self.config.warm_countries.iter().copied().collect();
        let mut plan: Vec<(IpVersion, Day, Tightness)> = Vec::new();
        for date in self.anchors.anchors(IpVersion::V4) {
            plan.push((IpVersion::V4, *date, Tightness::Straight));
        }
        for tightness in [Tightness::Straight, Tightness::Tight] {
            for date in self.anchors.anchors(IpVersion::V6) {
                plan.push((IpVersion::V6, *date, tightness));
            }
        }
        info!(
            "warming {} snapshots over {} countries",
            plan.len(),
            countries.len()
        );

        let mut report = WarmReport::default();
        for (version, date, tightness) in plan {
            if cancel.is_cancelled() {
                info!("warm pass cancelled after {} snapshots", report.resolved);
                report.cancelled = true;
                break;
            }
            let request = SpaceRequest::new(version, date, countries.clone())
                .with_tightness(tightness)
                .with_refresh(true)
                .with_force_cache(true);
            self.resolve(&request).await?;
            report.resolved += 1;
        }
        Ok(report)
    }

    /// Snapshots always land at the exact (clamped) requested date, not
    /// at the anchor the lookup resolved to.
    async fn persist(&self, request: &SpaceRequest, date: Day, data: &CountrySpace) -> Result<()> {
        if data.is_empty() {
            debug!("nothing to persist for v{} at {date}", request.version);
            return Ok(());
        }
        let key = SnapshotKey::new(request.version, date, request.tightness);
        let mut known = request.countries.clone();
        let mut body = data.clone();
        if self.config.union_known_countries {
            if let Some(previous) = self.snapshots.get(&key).await? {
                for (country, buckets) in previous.data {
                    body.entry(country).or_insert(buckets);
                }
                known.extend(previous.known_countries.iter().copied());
            }
        }
        debug!(
            "persisting snapshot key={} known_countries={}",
            key.token(),
            known.len()
        );
        self.snapshots
            .put(&key, Snapshot::new(date, known, body))
            .await?;
        Ok(())
    }

    fn clamp_date(&self, version: IpVersion, date: Day) -> Day {
        let end = self.config.alloc_end(version);
        if date > end {
            info!("clamping v{version} query date {date} to end of loaded data {end}");
            return end;
        }
        date
    }
}

fn merge_rows(space: &mut CountrySpace, rows: Vec<BucketAggregate>) {
    for row in rows {
        add_count(space, row.country, row.bucket, row.count);
    }
}
