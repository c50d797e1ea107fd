use serde::{Deserialize, Serialize};

use crate::types::{CountryCode, Day, IpVersion};

/// Historical bounds for one address family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionWindow {
    /// First day of recorded allocation history.
    pub history_start: Day,
    /// Horizon used when precomputing yearly anchor boundaries.
    pub horizon: Day,
    /// Last day with loaded allocation data; queries past it are clamped.
    pub alloc_end: Day,
}

/// Knobs for the snapshot reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceConfig {
    #[serde(default = "default_v4_window")]
    pub v4: VersionWindow,
    #[serde(default = "default_v6_window")]
    pub v6: VersionWindow,
    /// When true, persisting a snapshot unions `known_countries` (and keeps
    /// bucket data for countries the new computation did not touch) with any
    /// snapshot already stored at the same key. When false, the persist
    /// replaces the document wholesale and earlier known countries are
    /// forgotten, matching the narrower historical semantics.
    #[serde(default = "default_union_known")]
    pub union_known_countries: bool,
    /// Country set used by the warm pass at startup.
    #[serde(default = "default_warm_countries")]
    pub warm_countries: Vec<CountryCode>,
}

impl SpaceConfig {
    pub fn window(&self, version: IpVersion) -> &VersionWindow {
        match version {
            IpVersion::V4 => &self.v4,
            IpVersion::V6 => &self.v6,
        }
    }

    pub fn alloc_end(&self, version: IpVersion) -> Day {
        self.window(version).alloc_end
    }
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            v4: default_v4_window(),
            v6: default_v6_window(),
            union_known_countries: default_union_known(),
            warm_countries: default_warm_countries(),
        }
    }
}

fn default_v4_window() -> VersionWindow {
    VersionWindow {
        history_start: Day(19810101),
        horizon: Day(20240101),
        alloc_end: Day(20230710),
    }
}

fn default_v6_window() -> VersionWindow {
    VersionWindow {
        history_start: Day(19980101),
        horizon: Day(20240101),
        alloc_end: Day(20230710),
    }
}

fn default_union_known() -> bool {
    true
}

fn default_warm_countries() -> Vec<CountryCode> {
    ["US", "CN", "JP", "DE", "GB", "KR", "BR", "FR", "CA", "IT"]
        .iter()
        .map(|code| CountryCode::new(code).expect("valid warm country code"))
        .collect()
}
