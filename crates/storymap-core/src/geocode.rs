//! Location lookup for pins that arrive without coordinates.
//!
//! [`Geocoder`] is the seam for an external service. [`Gazetteer`] is the
//! bundled implementation: a fixed table of cities and a representative
//! point per country.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Coordinates;

/// Resolves a country and optional city to a point.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the location is unknown.
    async fn locate(&self, country: &str, city: &str) -> Result<Option<Coordinates>>;
}

/// (country, city, lat, lng). The first row of each country is its
/// representative point.
const PLACES: &[(&str, &str, f64, f64)] = &[
    ("nigeria", "abuja", 9.0765, 7.3986),
    ("nigeria", "lagos", 6.5244, 3.3792),
    ("kenya", "nairobi", -1.2921, 36.8219),
    ("kenya", "mombasa", -4.0435, 39.6682),
    ("united states", "washington", 38.9072, -77.0369),
    ("united states", "new york", 40.7128, -74.0060),
    ("united states", "los angeles", 34.0522, -118.2437),
    ("united kingdom", "london", 51.5074, -0.1278),
    ("canada", "ottawa", 45.4215, -75.6972),
    ("canada", "toronto", 43.6532, -79.3832),
    ("mexico", "mexico city", 19.4326, -99.1332),
    ("brazil", "brasilia", -15.7939, -47.8828),
    ("brazil", "sao paulo", -23.5505, -46.6333),
    ("argentina", "buenos aires", -34.6037, -58.3816),
    ("colombia", "bogota", 4.7110, -74.0721),
    ("south africa", "pretoria", -25.7479, 28.2293),
    ("south africa", "johannesburg", -26.2041, 28.0473),
    ("south africa", "cape town", -33.9249, 18.4241),
    ("ghana", "accra", 5.6037, -0.1870),
    ("uganda", "kampala", 0.3476, 32.5825),
    ("ethiopia", "addis ababa", 8.9806, 38.7578),
    ("egypt", "cairo", 30.0444, 31.2357),
    ("france", "paris", 48.8566, 2.3522),
    ("germany", "berlin", 52.5200, 13.4050),
    ("india", "new delhi", 28.6139, 77.2090),
    ("india", "mumbai", 19.0760, 72.8777),
    ("pakistan", "islamabad", 33.6844, 73.0479),
    ("bangladesh", "dhaka", 23.8103, 90.4125),
    ("philippines", "manila", 14.5995, 120.9842),
    ("japan", "tokyo", 35.6762, 139.6503),
    ("australia", "canberra", -35.2809, 149.1300),
    ("australia", "sydney", -33.8688, 151.2093),
];

const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("usa", "united states"),
    ("us", "united states"),
    ("united states of america", "united states"),
    ("uk", "united kingdom"),
    ("great britain", "united kingdom"),
    ("england", "united kingdom"),
];

fn key(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .replace(['á', 'à', 'â', 'ã'], "a")
        .replace(['é', 'ê'], "e")
        .replace('í', "i")
        .replace(['ó', 'ô'], "o")
}

/// Static country/city table.
#[derive(Debug, Clone)]
pub struct Gazetteer {
    cities: HashMap<(String, String), Coordinates>,
    countries: HashMap<String, Coordinates>,
}

impl Default for Gazetteer {
    fn default() -> Self {
        let mut cities = HashMap::new();
        let mut countries = HashMap::new();
        for &(country, city, lat, lng) in PLACES {
            let point = Coordinates { lat, lng };
            countries.entry(country.to_string()).or_insert(point);
            cities.insert((country.to_string(), city.to_string()), point);
        }
        Self { cities, countries }
    }
}

impl Gazetteer {
    pub fn new() -> Self {
        Self::default()
    }

    fn canonical_country(country: &str) -> String {
        let k = key(country);
        COUNTRY_ALIASES
            .iter()
            .find(|(alias, _)| *alias == k)
            .map(|(_, name)| name.to_string())
            .unwrap_or(k)
    }

    /// City point if known, else the country's representative point.
    pub fn lookup(&self, country: &str, city: &str) -> Option<Coordinates> {
        let country = Self::canonical_country(country);
        let city = key(city);
        if !city.is_empty() {
            if let Some(point) = self.cities.get(&(country.clone(), city)) {
                return Some(*point);
            }
        }
        self.countries.get(&country).copied()
    }
}

#[async_trait]
impl Geocoder for Gazetteer {
    async fn locate(&self, country: &str, city: &str) -> Result<Option<Coordinates>> {
        Ok(self.lookup(country, city))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_city_lookup() {
        let g = Gazetteer::new();
        let lagos = g.locate("Nigeria", "Lagos").await.unwrap().unwrap();
        assert_eq!((lagos.lat, lagos.lng), (6.5244, 3.3792));
    }

    #[test]
    fn test_country_fallback_and_aliases() {
        let g = Gazetteer::new();
        let kenya = g.lookup(" kenya ", "").unwrap();
        assert_eq!((kenya.lat, kenya.lng), (-1.2921, 36.8219));

        let unknown_city = g.lookup("Nigeria", "Kano").unwrap();
        assert_eq!((unknown_city.lat, unknown_city.lng), (9.0765, 7.3986));

        let nyc = g.lookup("USA", "New York").unwrap();
        assert_eq!(nyc.lat, 40.7128);
        assert!(g.lookup("UK", "").is_some());
    }

    #[test]
    fn test_accents_fold() {
        let g = Gazetteer::new();
        assert!(g.lookup("Brazil", "São Paulo").is_some());
        assert_eq!(
            g.lookup("Colombia", "Bogotá"),
            g.lookup("colombia", "bogota")
        );
    }

    #[test]
    fn test_unknown_country() {
        assert!(Gazetteer::new().lookup("Atlantis", "Poseidonia").is_none());
        assert!(Gazetteer::new().lookup("", "").is_none());
    }
}
