//! Normalization of RIR delegation lines into [`AllocationRecord`]s.
//!
//! Line format: `registry|cc|type|start|value|date|status`. Rows with
//! status `available`/`reserved` and rows attributed to `EU` are dropped;
//! HK/MO/TW fold into CN before the record is built.

use std::net::{Ipv4Addr, Ipv6Addr};

use log::warn;
use thiserror::Error;

use core_types::types::{
    AllocationRecord, BucketKeys, CountryCode, Day, PrefixRange,
};

use crate::{
    exploded, v4_bucket, v6_bucket, v6_mask, V6_COUNT_CIDR, V6_STRAIGHT_CIDR, V6_TIGHT_CIDR,
};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed registry line: {0}")]
    MalformedLine(String),
    #[error("invalid country code in registry line: {0}")]
    BadCountry(#[from] core_types::types::CountryCodeError),
    #[error("invalid address '{value}': {detail}")]
    BadAddress { value: String, detail: String },
    #[error("invalid allocation size '{0}'")]
    BadSize(String),
}

/// One raw `|`-separated delegation row, borrowed from the input line.
#[derive(Debug, Clone, Copy)]
pub struct RegistryLine<'a> {
    pub registry: &'a str,
    pub cc: &'a str,
    pub rtype: &'a str,
    pub start: &'a str,
    pub value: &'a str,
    pub date: &'a str,
    pub status: &'a str,
}

impl<'a> RegistryLine<'a> {
    pub fn parse(line: &'a str) -> Result<Self, IngestError> {
        let mut parts = line.trim_end_matches('\n').split('|');
        let mut next = || {
            parts
                .next()
                .map(str::trim)
                .ok_or_else(|| IngestError::MalformedLine(line.to_string()))
        };
        Ok(Self {
            registry: next()?,
            cc: next()?,
            rtype: next()?,
            start: next()?,
            value: next()?,
            date: next()?,
            status: next()?,
        })
    }

    /// Rows the aggregates must never see: unallocated space and the EU
    /// pseudo-country.
    fn is_needed(&self) -> bool {
        !matches!(self.status, "available" | "reserved") && self.cc != "EU"
    }
}

/// Builds a v4 record, or `None` when the row is filtered at ingestion.
pub fn v4_record(line: &RegistryLine<'_>) -> Result<Option<AllocationRecord>, IngestError> {
    if !line.is_needed() {
        return Ok(None);
    }
    let country = CountryCode::new(line.cc)?.fold_region();
    let start_addr: Ipv4Addr = line.start.parse().map_err(|err| IngestError::BadAddress {
        value: line.start.to_string(),
        detail: format!("{err}"),
    })?;
    let start = u32::from(start_addr);
    let value: u64 = line
        .value
        .parse()
        .map_err(|_| IngestError::BadSize(line.value.to_string()))?;
    if value == 0 || value > u64::from(u32::MAX) + 1 {
        return Err(IngestError::BadSize(line.value.to_string()));
    }
    let cidr = (32 - value.ilog2()) as u8;
    let end = u64::from(start) + value - 1;
    if end > u64::from(u32::MAX) {
        return Err(IngestError::BadSize(line.value.to_string()));
    }
    let prefix = format!("{start_addr}/{cidr}");
    let bucket = v4_bucket(start, &prefix, cidr);
    Ok(Some(AllocationRecord {
        registry: line.registry.to_string(),
        country,
        status: line.status.to_string(),
        date: Day::parse_lenient(line.date),
        range: PrefixRange::V4 {
            start,
            end: end as u32,
        },
        prefix,
        cidr,
        count: u128::from(value),
        buckets: BucketKeys::V4(bucket),
    }))
}

/// Builds a v6 record, or `None` when the row is filtered at ingestion.
/// Prefixes longer than /64 fold to /64 for counting; the precision loss
/// is logged, not rejected.
pub fn v6_record(line: &RegistryLine<'_>) -> Result<Option<AllocationRecord>, IngestError> {
    if !line.is_needed() {
        return Ok(None);
    }
    let country = CountryCode::new(line.cc)?.fold_region();
    let addr: Ipv6Addr = line.start.parse().map_err(|err| IngestError::BadAddress {
        value: line.start.to_string(),
        detail: format!("{err}"),
    })?;
    let raw_cidr: u8 = line
        .value
        .parse()
        .ok()
        .filter(|cidr| *cidr <= 128)
        .ok_or_else(|| IngestError::BadSize(line.value.to_string()))?;
    let prefix = format!("{}/{}", line.start, raw_cidr);

    let mut cidr = raw_cidr;
    if cidr > V6_COUNT_CIDR {
        warn!("folding v6 allocation {prefix} with cidr={cidr} to /{V6_COUNT_CIDR} for counting");
        cidr = V6_COUNT_CIDR;
    }
    let count = 1u128 << (V6_COUNT_CIDR - cidr);

    let mask = v6_mask(raw_cidr);
    let network = u128::from(addr) & mask;
    let broadcast = network | !mask;

    let tight = v6_bucket(addr, &prefix, cidr, V6_TIGHT_CIDR);
    let straight = v6_bucket(addr, &prefix, cidr, V6_STRAIGHT_CIDR);

    Ok(Some(AllocationRecord {
        registry: line.registry.to_string(),
        country,
        status: line.status.to_string(),
        date: Day::parse_lenient(line.date),
        range: PrefixRange::V6 {
            start: exploded(Ipv6Addr::from(network)),
            end: exploded(Ipv6Addr::from(broadcast)),
        },
        prefix,
        cidr,
        count,
        buckets: BucketKeys::V6 { tight, straight },
    }))
}
