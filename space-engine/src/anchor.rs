// Copyright (c) James Kassemi, SC, US. All rights reserved.

use log::debug;

use core_types::config::{SpaceConfig, VersionWindow};
use core_types::types::{Day, IpVersion};

/// Precomputed snapshot anchor dates, one ascending table per address
/// family. Built once from config at startup and never mutated.
///
/// Anchors are the yearly boundaries strictly between `history_start`
/// and `horizon` (both endpoints excluded), plus the trailing
/// `alloc_end` day. Snapshot lookups resolve a requested date down to
/// the nearest anchor at or before it.
#[derive(Clone, Debug)]
pub struct AnchorTable {
    v4: Vec<Day>,
    v6: Vec<Day>,
}

impl AnchorTable {
    pub fn from_config(config: &SpaceConfig) -> Self {
        Self {
            v4: build_anchors(&config.v4),
            v6: build_anchors(&config.v6),
        }
    }

    pub fn anchors(&self, version: IpVersion) -> &[Day] {
        match version {
            IpVersion::V4 => &self.v4,
            IpVersion::V6 => &self.v6,
        }
    }

    /// Newest anchor at or before `date`. Dates older than every anchor
    /// have no coarser representative and anchor to themselves.
    pub fn nearest_anchor(&self, version: IpVersion, date: Day) -> Day {
        for anchor in self.anchors(version).iter().rev() {
            if *anchor <= date {
                return *anchor;
            }
        }
        debug!("no v{version} anchor at or before {date}; using the date itself");
        date
    }
}

fn build_anchors(window: &VersionWindow) -> Vec<Day> {
    let month_day = window.history_start.month_day();
    let mut anchors = Vec::new();
    for year in window.history_start.year()..=window.horizon.year() {
        let candidate = Day(year * 10_000 + month_day);
        if candidate <= window.history_start || candidate >= window.horizon {
            continue;
        }
        anchors.push(candidate);
    }
    anchors.push(window.alloc_end);
    anchors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> AnchorTable {
        AnchorTable::from_config(&SpaceConfig::default())
    }

    #[test]
    fn yearly_boundaries_exclude_both_endpoints() {
        let table = table();
        let v4 = table.anchors(IpVersion::V4);
        assert_eq!(v4.first(), Some(&Day(19820101)));
        // 19820101..=20230101 yearly, then the data end marker.
        assert_eq!(v4[v4.len() - 2], Day(20230101));
        assert_eq!(v4.last(), Some(&Day(20230710)));
        assert_eq!(v4.len(), 43);
        assert!(!v4.contains(&Day(19810101)));
        assert!(!v4.contains(&Day(20240101)));

        let v6 = table.anchors(IpVersion::V6);
        assert_eq!(v6.first(), Some(&Day(19990101)));
        assert_eq!(v6.len(), 26);
    }

    #[test]
    fn mid_year_dates_anchor_to_their_year_boundary() {
        let table = table();
        assert_eq!(
            table.nearest_anchor(IpVersion::V4, Day(20150615)),
            Day(20150101)
        );
        assert_eq!(
            table.nearest_anchor(IpVersion::V4, Day(20150101)),
            Day(20150101)
        );
    }

    #[test]
    fn dates_past_the_last_boundary_anchor_to_alloc_end() {
        let table = table();
        assert_eq!(
            table.nearest_anchor(IpVersion::V4, Day(20230710)),
            Day(20230710)
        );
        // Between the final yearly boundary and alloc_end.
        assert_eq!(
            table.nearest_anchor(IpVersion::V6, Day(20230301)),
            Day(20230101)
        );
    }

    #[test]
    fn prehistoric_dates_anchor_to_themselves() {
        let table = table();
        assert_eq!(
            table.nearest_anchor(IpVersion::V4, Day(19810501)),
            Day(19810501)
        );
    }
}
