// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Bucket key assignment for allocation records.
//!
//! Every record gets its coarse address-block key(s) at ingestion time, so
//! aggregation queries can group by a precomputed field instead of masking
//! prefixes per request. The v4 scheme uses a single `/16`-equivalent
//! granularity; the v6 scheme carries two independent keys, a `/24`
//! ("tight") and a `/20` ("straight").

pub mod ingest;

use std::net::{Ipv4Addr, Ipv6Addr};

use core_types::types::BucketKey;

/// Records at or above this prefix length land in a fixed `/16` v4 bucket.
pub const V4_BUCKET_CIDR: u8 = 16;
/// Threshold for the v6 tight (`/24`) bucket.
pub const V6_TIGHT_CIDR: u8 = 24;
/// Threshold for the v6 straight (`/20`) bucket.
pub const V6_STRAIGHT_CIDR: u8 = 20;
/// v6 counts are taken in units of /64 networks; longer prefixes fold here.
pub const V6_COUNT_CIDR: u8 = 64;

const V4_BUCKET_MASK: u32 = 0xffff_0000;

/// v4 bucket key: the enclosing /16 when the record is at least that
/// narrow, otherwise the record's own prefix. The key is never finer than
/// the record itself.
pub fn v4_bucket(start: u32, prefix: &str, cidr: u8) -> BucketKey {
    if cidr >= V4_BUCKET_CIDR {
        let base = Ipv4Addr::from(start & V4_BUCKET_MASK);
        format!("{base}/{V4_BUCKET_CIDR}")
    } else {
        prefix.to_string()
    }
}

/// v6 bucket key at the requested granularity (`bucket_cidr` is one of
/// [`V6_TIGHT_CIDR`] / [`V6_STRAIGHT_CIDR`]). The mask applies over the
/// full 128-bit value.
pub fn v6_bucket(addr: Ipv6Addr, prefix: &str, cidr: u8, bucket_cidr: u8) -> BucketKey {
    if cidr >= bucket_cidr {
        let base = Ipv6Addr::from(u128::from(addr) & v6_mask(bucket_cidr));
        format!("{base}/{bucket_cidr}")
    } else {
        prefix.to_string()
    }
}

pub(crate) fn v6_mask(cidr: u8) -> u128 {
    if cidr == 0 {
        0
    } else {
        u128::MAX << (128 - cidr as u32)
    }
}

/// Full uncompressed representation, e.g. `2001:0db8:0000:...:0000`.
pub fn exploded(addr: Ipv6Addr) -> String {
    let s = addr.segments();
    format!(
        "{:04x}:{:04x}:{:04x}:{:04x}:{:04x}:{:04x}:{:04x}:{:04x}",
        s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]
    )
}
