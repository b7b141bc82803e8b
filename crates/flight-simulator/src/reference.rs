//! Reference airline and airport rows.

use flight_domain::{Airline, Airport};

/// Carrier code, airline name and a per-carrier shift in expected gain.
pub(crate) const CARRIERS: [(&str, &str, f64); 12] = [
    ("AA", "American Airlines Inc.", 1.5),
    ("AS", "Alaska Airlines Inc.", 3.0),
    ("B6", "JetBlue Airways", 2.0),
    ("CO", "Continental Air Lines Inc.", 0.5),
    ("DH", "Independence Air", -1.0),
    ("DL", "Delta Air Lines Inc.", 1.0),
    ("HP", "America West Airlines Inc.", 2.5),
    ("NW", "Northwest Airlines Inc.", 0.0),
    ("TZ", "ATA Airlines d/b/a ATA", -0.5),
    ("UA", "United Air Lines Inc.", 1.2),
    ("US", "US Airways Inc.", 0.8),
    ("WN", "Southwest Airlines Co.", 4.0),
];

const AIRPORTS: [(&str, &str, f64, f64); 14] = [
    ("ATL", "William B Hartsfield-Atlanta Intl", 33.640_444, -84.426_944),
    ("BOS", "Gen Edw L Logan Intl", 42.364_347, -71.005_181),
    ("DEN", "Denver Intl", 39.858_408, -104.667_002),
    ("DFW", "Dallas-Fort Worth International", 32.895_951, -97.037_200),
    ("IAD", "Washington Dulles International", 38.947_444, -77.459_806),
    ("JFK", "John F Kennedy Intl", 40.639_751, -73.778_926),
    ("LAS", "McCarran International", 36.080_361, -115.152_333),
    ("LAX", "Los Angeles International", 33.942_536, -118.408_074),
    ("MDW", "Chicago Midway", 41.785_983, -87.752_424),
    ("ORD", "Chicago O'Hare International", 41.979_595, -87.904_464),
    ("PHX", "Phoenix Sky Harbor International", 33.434_167, -112.008_056),
    ("SEA", "Seattle-Tacoma Intl", 47.448_982, -122.309_313),
    ("SFO", "San Francisco International", 37.619_002, -122.374_843),
    ("SLC", "Salt Lake City Intl", 40.788_388, -111.977_773),
];

/// Airlines known to the generator.
pub fn reference_airlines() -> Vec<Airline> {
    CARRIERS
        .iter()
        .map(|(code, description, _)| Airline::new(code, description))
        .collect()
}

/// Airports known to the generator.
pub fn reference_airports() -> Vec<Airport> {
    AIRPORTS
        .iter()
        .map(|(faa, name, lat, lon)| Airport::new(faa, name, *lat, *lon))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_unique() {
        let airlines: HashSet<_> = reference_airlines().into_iter().map(|a| a.code).collect();
        assert_eq!(airlines.len(), CARRIERS.len());
        let airports: HashSet<_> = reference_airports().into_iter().map(|a| a.faa).collect();
        assert_eq!(airports.len(), AIRPORTS.len());
    }

    #[test]
    fn test_correction_targets_are_known_airlines() {
        let codes: HashSet<_> = reference_airlines().into_iter().map(|a| a.code).collect();
        for code in ["DH", "TZ", "HP"] {
            assert!(codes.contains(code));
        }
    }
}
