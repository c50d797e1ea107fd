// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Address family of an allocation record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpVersion::V4 => "4",
            IpVersion::V6 => "6",
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpVersion {
    type Err = VersionParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "4" | "v4" => Ok(IpVersion::V4),
            "6" | "v6" => Ok(IpVersion::V6),
            other => Err(VersionParseError {
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown ip version '{value}' (expected '4' or '6')")]
pub struct VersionParseError {
    pub value: String,
}

/// Bucket granularity selector for the v6 scheme. v4 only ever has one
/// granularity and is pinned to [`Tightness::Straight`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tightness {
    /// /20-equivalent buckets.
    Straight,
    /// /24-equivalent buckets.
    Tight,
}

impl Tightness {
    pub fn as_flag(&self) -> u8 {
        match self {
            Tightness::Straight => 0,
            Tightness::Tight => 1,
        }
    }
}

/// Validated two-letter ISO-like country code, uppercase ASCII.
///
/// A fixed-width value type keeps set differences and map ordering
/// well-defined instead of leaning on free-form strings.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CountryCode([u8; 2]);

impl CountryCode {
    pub const CN: CountryCode = CountryCode(*b"CN");
    pub const EU: CountryCode = CountryCode(*b"EU");
    pub const HK: CountryCode = CountryCode(*b"HK");
    pub const MO: CountryCode = CountryCode(*b"MO");
    pub const TW: CountryCode = CountryCode(*b"TW");

    pub fn new(code: &str) -> Result<Self, CountryCodeError> {
        let bytes = code.as_bytes();
        if bytes.len() != 2 {
            return Err(CountryCodeError {
                value: code.to_string(),
            });
        }
        let a = bytes[0].to_ascii_uppercase();
        let b = bytes[1].to_ascii_uppercase();
        if !a.is_ascii_uppercase() || !b.is_ascii_uppercase() {
            return Err(CountryCodeError {
                value: code.to_string(),
            });
        }
        Ok(CountryCode([a, b]))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).expect("country code is ascii")
    }

    /// Folds the focused regions (HK, MO, TW) into CN. Applied once at
    /// ingestion so aggregates never see the unfolded codes.
    pub fn fold_region(self) -> Self {
        match self {
            CountryCode::HK | CountryCode::MO | CountryCode::TW => CountryCode::CN,
            other => other,
        }
    }

    /// EU rows carry no usable country and are dropped at ingestion.
    pub fn is_hidden(self) -> bool {
        self == CountryCode::EU
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CountryCode({})", self.as_str())
    }
}

impl FromStr for CountryCode {
    type Err = CountryCodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        CountryCode::new(value)
    }
}

impl Serialize for CountryCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CountryCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        CountryCode::new(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Error)]
#[error("invalid country code '{value}' (expected two ascii letters)")]
pub struct CountryCodeError {
    pub value: String,
}

/// Calendar day as carried by registry delegation files: integer YYYYMMDD.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Day(pub u32);

impl Day {
    pub const ZERO: Day = Day(0);

    pub fn new(raw: u32) -> Self {
        Day(raw)
    }

    pub fn from_ymd(year: u32, month: u32, day: u32) -> Self {
        Day(year * 10_000 + month * 100 + day)
    }

    pub fn year(&self) -> u32 {
        self.0 / 10_000
    }

    pub fn month_day(&self) -> u32 {
        self.0 % 10_000
    }

    /// Delegation files occasionally carry unparsable dates; those fold to
    /// day zero rather than rejecting the whole record.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.trim().parse::<u32>().map(Day).unwrap_or(Day::ZERO)
    }

    pub fn as_naive(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(
            self.year() as i32,
            self.month_day() / 100,
            self.month_day() % 100,
        )
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarsened address block used as aggregation granularity, e.g. `1.0.0.0/16`.
pub type BucketKey = String;

/// Per-country cumulative address counts keyed by bucket.
pub type BucketCounts = BTreeMap<BucketKey, u128>;

/// The combined country -> bucket -> count working map the reconciler
/// produces. BTreeMap keeps iteration deterministic; bucket ownership
/// tie-breaks resolve to the lexically smallest country code.
pub type CountrySpace = BTreeMap<CountryCode, BucketCounts>;

/// Accumulates a count into the working map, never overwriting: repeated
/// contributions for the same (country, bucket) pair add up.
pub fn add_count(space: &mut CountrySpace, country: CountryCode, bucket: BucketKey, count: u128) {
    *space
        .entry(country)
        .or_default()
        .entry(bucket)
        .or_insert(0) += count;
}

/// Which precomputed bucket field an aggregation groups by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BucketField {
    V4,
    V6Tight,
    V6Straight,
}

impl BucketField {
    pub fn select(version: IpVersion, tightness: Tightness) -> Self {
        match (version, tightness) {
            (IpVersion::V4, _) => BucketField::V4,
            (IpVersion::V6, Tightness::Tight) => BucketField::V6Tight,
            (IpVersion::V6, Tightness::Straight) => BucketField::V6Straight,
        }
    }
}

/// Ordered numeric bounds of an allocated range. v4 ranges are exact 32-bit
/// integers; v6 ranges are string-encoded expanded addresses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrefixRange {
    V4 { start: u32, end: u32 },
    V6 { start: String, end: String },
}

/// Precomputed bucket keys, assigned at ingestion time. The v6 scheme keeps
/// two independent keys, one per tightness level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BucketKeys {
    V4(BucketKey),
    V6 { tight: BucketKey, straight: BucketKey },
}

/// One normalized allocation row. Immutable once ingested.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub registry: String,
    pub country: CountryCode,
    pub status: String,
    pub date: Day,
    pub range: PrefixRange,
    pub prefix: String,
    pub cidr: u8,
    pub count: u128,
    pub buckets: BucketKeys,
}

impl AllocationRecord {
    pub fn version(&self) -> IpVersion {
        match self.range {
            PrefixRange::V4 { .. } => IpVersion::V4,
            PrefixRange::V6 { .. } => IpVersion::V6,
        }
    }

    /// Bucket key for the requested field, or `None` if the record belongs
    /// to the other address family.
    pub fn bucket_for(&self, field: BucketField) -> Option<&BucketKey> {
        match (&self.buckets, field) {
            (BucketKeys::V4(bucket), BucketField::V4) => Some(bucket),
            (BucketKeys::V6 { tight, .. }, BucketField::V6Tight) => Some(tight),
            (BucketKeys::V6 { straight, .. }, BucketField::V6Straight) => Some(straight),
            _ => None,
        }
    }
}
