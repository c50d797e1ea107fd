// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::collections::BTreeMap;

use serde::Serialize;

use core_types::types::{BucketKey, CountryCode, CountrySpace};

/// One bucket with the country holding the most address space in it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BucketOwnership {
    pub bucket: BucketKey,
    pub country: CountryCode,
}

/// Reduces a country map to a single winning country per bucket, ordered
/// by bucket key. The winner is the country with the highest cumulative
/// count; ties keep the lexically smallest country code.
pub fn flatten(space: &CountrySpace) -> Vec<BucketOwnership> {
    let mut winners: BTreeMap<&BucketKey, (CountryCode, u128)> = BTreeMap::new();
    for (country, buckets) in space {
        for (bucket, count) in buckets {
            match winners.get_mut(bucket) {
                Some((winner, best)) if *count > *best => {
                    *winner = *country;
                    *best = *count;
                }
                Some(_) => {}
                None => {
                    winners.insert(bucket, (*country, *count));
                }
            }
        }
    }
    winners
        .into_iter()
        .map(|(bucket, (country, _))| BucketOwnership {
            bucket: bucket.clone(),
            country,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::types::add_count;

    fn cc(code: &str) -> CountryCode {
        CountryCode::new(code).unwrap()
    }

    #[test]
    fn largest_holder_wins_each_bucket() {
        let mut space = CountrySpace::new();
        add_count(&mut space, cc("CN"), "1.0.0.0/16".to_string(), 512);
        add_count(&mut space, cc("US"), "1.0.0.0/16".to_string(), 256);
        add_count(&mut space, cc("US"), "2.0.0.0/16".to_string(), 65536);

        let rows = flatten(&space);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].bucket, "1.0.0.0/16");
        assert_eq!(rows[0].country, cc("CN"));
        assert_eq!(rows[1].bucket, "2.0.0.0/16");
        assert_eq!(rows[1].country, cc("US"));
    }

    #[test]
    fn ties_keep_the_lexically_smallest_country() {
        let mut space = CountrySpace::new();
        add_count(&mut space, cc("US"), "1.0.0.0/16".to_string(), 100);
        add_count(&mut space, cc("BR"), "1.0.0.0/16".to_string(), 100);

        let rows = flatten(&space);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].country, cc("BR"));
    }

    #[test]
    fn empty_space_flattens_to_nothing() {
        assert!(flatten(&CountrySpace::new()).is_empty());
    }
}
