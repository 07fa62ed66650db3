//! In-memory ALR: subscriber records and the route-group policy.

use std::collections::HashMap;

/// Current network attachment of a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlrRecord {
    pub imsi: String,
    pub serving_msc: String,
    pub serving_vlr: String,
    pub region: String,
}

pub struct AlrStore {
    records: HashMap<String, AlrRecord>,
}

impl AlrStore {
    /// Seed records. A production deployment loads these from the
    /// subscriber database layer instead.
    pub fn with_seed_data() -> Self {
        let mut records = HashMap::new();
        records.insert(
            "+14085551234".to_string(),
            AlrRecord {
                imsi: "310150123456789".into(),
                serving_msc: "MSC_DALLAS_01".into(),
                serving_vlr: "VLR_DAL_01".into(),
                region: "US-SOUTH".into(),
            },
        );
        records.insert(
            "+12125550123".to_string(),
            AlrRecord {
                imsi: "310150987654321".into(),
                serving_msc: "MSC_NYC_01".into(),
                serving_vlr: "VLR_NYC_01".into(),
                region: "US-EAST".into(),
            },
        );
        records.insert(
            "+442079460123".to_string(),
            AlrRecord {
                imsi: "234150111222333".into(),
                serving_msc: "MSC_LON_01".into(),
                serving_vlr: "VLR_LON_01".into(),
                region: "UK".into(),
            },
        );
        Self { records }
    }

    pub fn lookup(&self, msisdn: &str) -> Option<&AlrRecord> {
        self.records.get(msisdn)
    }
}

/// Map a record's region to the outbound route group.
pub fn route_policy(record: &AlrRecord) -> &'static str {
    match record.region.as_str() {
        "US-EAST" => "ROUTE_GROUP_EAST",
        "US-SOUTH" => "ROUTE_GROUP_SOUTH",
        _ => "ROUTE_GROUP_INTL",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_subscriber_is_found() {
        let store = AlrStore::with_seed_data();
        let record = store.lookup("+14085551234").expect("seeded record");
        assert_eq!(record.imsi, "310150123456789");
        assert_eq!(record.serving_msc, "MSC_DALLAS_01");
        assert_eq!(record.serving_vlr, "VLR_DAL_01");
    }

    #[test]
    fn unknown_subscriber_is_a_miss() {
        let store = AlrStore::with_seed_data();
        assert!(store.lookup("+19998887777").is_none());
    }

    #[test]
    fn policy_maps_regions_to_route_groups() {
        let store = AlrStore::with_seed_data();
        assert_eq!(
            route_policy(store.lookup("+12125550123").unwrap()),
            "ROUTE_GROUP_EAST"
        );
        assert_eq!(
            route_policy(store.lookup("+14085551234").unwrap()),
            "ROUTE_GROUP_SOUTH"
        );
        assert_eq!(
            route_policy(store.lookup("+442079460123").unwrap()),
            "ROUTE_GROUP_INTL"
        );
    }
}
