// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! AllocationStore trait and the in-process implementation.
//!
//! The reconciler only consumes two query shapes: a date-bounded range
//! filter over a country set, and a group-by aggregation keyed by
//! `(country, bucket)` summing address counts. Anything that can answer
//! those (a document store, a column store, or the in-memory vector here)
//! can sit behind the trait.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;
use thiserror::Error;

use core_types::types::{
    AllocationRecord, BucketField, BucketKey, CountryCode, Day, IpVersion,
};

#[derive(Debug, Error)]
pub enum AllocStoreError {
    #[error("allocation store unavailable: {detail}")]
    Unavailable { detail: String },
}

/// Date bounds for an aggregation: `date <= until`, and when `after` is
/// set, additionally `date > after` (the delta query shape).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateFilter {
    pub after: Option<Day>,
    pub until: Day,
}

impl DateFilter {
    /// Everything from the beginning of history through `until`.
    pub fn through(until: Day) -> Self {
        Self { after: None, until }
    }

    /// The half-open window `(after, until]`.
    pub fn between(after: Day, until: Day) -> Self {
        Self {
            after: Some(after),
            until,
        }
    }

    pub fn matches(&self, date: Day) -> bool {
        date <= self.until && self.after.map_or(true, |after| date > after)
    }
}

/// One aggregation output row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketAggregate {
    pub country: CountryCode,
    pub bucket: BucketKey,
    pub count: u128,
}

/// Persisted, range-filterable, group-aggregatable store of allocation
/// records.
#[async_trait]
pub trait AllocationStore: Send + Sync {
    /// Group-by aggregation over `countries` within `filter`, keyed by
    /// `(country, bucket)` and summing the address count field. A country
    /// with no matching rows simply produces no output rows; that is not
    /// an error.
    async fn aggregate(
        &self,
        version: IpVersion,
        field: BucketField,
        countries: &BTreeSet<CountryCode>,
        filter: DateFilter,
    ) -> Result<Vec<BucketAggregate>, AllocStoreError>;
}

/// In-process record store used by tests, dev mode, and the warm binary.
#[derive(Default)]
pub struct MemoryAllocationStore {
    v4: RwLock<Vec<AllocationRecord>>,
    v6: RwLock<Vec<AllocationRecord>>,
    queries: AtomicU64,
}

impl MemoryAllocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: AllocationRecord) {
        match record.version() {
            IpVersion::V4 => self.v4.write().push(record),
            IpVersion::V6 => self.v6.write().push(record),
        }
    }

    pub fn insert_all(&self, records: impl IntoIterator<Item = AllocationRecord>) {
        for record in records {
            self.insert(record);
        }
    }

    pub fn len(&self, version: IpVersion) -> usize {
        match version {
            IpVersion::V4 => self.v4.read().len(),
            IpVersion::V6 => self.v6.read().len(),
        }
    }

    pub fn is_empty(&self, version: IpVersion) -> bool {
        self.len(version) == 0
    }

    /// Number of aggregation queries served since construction. The
    /// reconciler's cache tests assert on this to prove a warm cache
    /// issues no queries.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AllocationStore for MemoryAllocationStore {
    async fn aggregate(
        &self,
        version: IpVersion,
        field: BucketField,
        countries: &BTreeSet<CountryCode>,
        filter: DateFilter,
    ) -> Result<Vec<BucketAggregate>, AllocStoreError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let records = match version {
            IpVersion::V4 => self.v4.read(),
            IpVersion::V6 => self.v6.read(),
        };
        let mut grouped: BTreeMap<(CountryCode, BucketKey), u128> = BTreeMap::new();
        for record in records.iter() {
            if !countries.contains(&record.country) || !filter.matches(record.date) {
                continue;
            }
            let Some(bucket) = record.bucket_for(field) else {
                continue;
            };
            *grouped.entry((record.country, bucket.clone())).or_insert(0) += record.count;
        }
        debug!(
            "aggregated v{version} rows={} countries={} filter={filter:?}",
            grouped.len(),
            countries.len()
        );
        Ok(grouped
            .into_iter()
            .map(|((country, bucket), count)| BucketAggregate {
                country,
                bucket,
                count,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketing::ingest::{v4_record, RegistryLine};

    fn record(cc: &'static str, start: &'static str, value: &'static str, date: &'static str) -> AllocationRecord {
        let line = RegistryLine {
            registry: "apnic",
            cc,
            rtype: "ipv4",
            start,
            value,
            date,
            status: "allocated",
        };
        v4_record(&line).unwrap().unwrap()
    }

    fn countries(codes: &[&str]) -> BTreeSet<CountryCode> {
        codes
            .iter()
            .map(|code| CountryCode::new(code).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn groups_by_country_and_bucket() {
        let store = MemoryAllocationStore::new();
        // Two /24s inside the same /16 plus one unrelated /16.
        store.insert(record("CN", "1.0.1.0", "256", "20000101"));
        store.insert(record("CN", "1.0.2.0", "256", "20010101"));
        store.insert(record("US", "2.0.0.0", "65536", "20050101"));

        let rows = store
            .aggregate(
                IpVersion::V4,
                BucketField::V4,
                &countries(&["CN", "US"]),
                DateFilter::through(Day(20100101)),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].country, CountryCode::CN);
        assert_eq!(rows[0].bucket, "1.0.0.0/16");
        assert_eq!(rows[0].count, 512);
        assert_eq!(rows[1].bucket, "2.0.0.0/16");
        assert_eq!(rows[1].count, 65536);
    }

    #[tokio::test]
    async fn date_filter_is_half_open() {
        let store = MemoryAllocationStore::new();
        store.insert(record("CN", "1.0.1.0", "256", "20000101"));
        store.insert(record("CN", "1.0.2.0", "256", "20050101"));

        let rows = store
            .aggregate(
                IpVersion::V4,
                BucketField::V4,
                &countries(&["CN"]),
                DateFilter::between(Day(20000101), Day(20050101)),
            )
            .await
            .unwrap();
        // The boundary row at `after` is excluded, the one at `until` kept.
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 256);
    }

    #[tokio::test]
    async fn unmatched_country_yields_no_rows() {
        let store = MemoryAllocationStore::new();
        store.insert(record("CN", "1.0.1.0", "256", "20000101"));
        let rows = store
            .aggregate(
                IpVersion::V4,
                BucketField::V4,
                &countries(&["BR"]),
                DateFilter::through(Day(20100101)),
            )
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(store.query_count(), 1);
    }
}
