//! Fixed coordinates for the places the entity patterns recognize.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceKind {
    Water,
    Continent,
    City,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Place {
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub kind: PlaceKind,
}

const PLACES: &[(&str, f64, f64)] = &[
    ("China", 35.8617, 104.1954),
    ("Beijing", 39.9042, 116.4074),
    ("Nanjing", 32.0603, 118.7969),
    ("Shanghai", 31.2304, 121.4737),
    ("India", 20.5937, 78.9629),
    ("Sri Lanka", 7.8731, 80.7718),
    ("Sumatra", -0.5897, 101.3431),
    ("Java", -7.6145, 110.7123),
    ("Africa", 8.7832, 34.5085),
    ("America", 37.0902, -95.7129),
    ("California", 36.7783, -119.4179),
    ("Peru", -9.1900, -75.0152),
    ("Mexico", 23.6345, -102.5528),
    ("Pacific Ocean", 0.0, -160.0),
    ("Indian Ocean", -20.0, 80.0),
    ("South China Sea", 12.0, 115.0),
    ("Malacca", 2.1896, 102.2501),
    ("Calicut", 11.2588, 75.7804),
    ("Hormuz", 27.1561, 56.2815),
    ("Mombasa", -4.0435, 39.6682),
    ("Zanzibar", -6.1659, 39.2026),
    ("Aden", 12.7855, 45.0187),
    ("Quanzhou", 24.9139, 118.5858),
    ("Guangzhou", 23.1291, 113.2644),
];

const CONTINENT_TERMS: [&str; 4] = ["China", "India", "Africa", "America"];

/// Case-insensitive lookup returning the canonical spelling.
pub fn lookup(name: &str) -> Option<Place> {
    let name = name.trim();
    PLACES
        .iter()
        .find(|(known, _, _)| known.eq_ignore_ascii_case(name))
        .map(|&(known, latitude, longitude)| Place {
            name: known,
            latitude,
            longitude,
            kind: classify(known),
        })
}

fn classify(name: &str) -> PlaceKind {
    if name.contains("Ocean") || name.contains("Sea") {
        PlaceKind::Water
    } else if CONTINENT_TERMS.iter().any(|term| name.contains(term)) {
        PlaceKind::Continent
    } else {
        PlaceKind::City
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_and_classifies() {
        let calicut = lookup("calicut").unwrap();
        assert_eq!(calicut.name, "Calicut");
        assert_eq!(calicut.kind, PlaceKind::City);

        assert_eq!(lookup("South China Sea").unwrap().kind, PlaceKind::Water);
        assert_eq!(lookup("India").unwrap().kind, PlaceKind::Continent);
        assert!(lookup("Atlantis").is_none());
    }
}
