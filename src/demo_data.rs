//! Built-in tour site catalog.
//!
//! Used when no site file is configured. Coordinates are WGS84 and were taken
//! from public map data around central Cheongju:
//! - Old downtown (Seongan-gil, Jungang Park, Yongdusa flagpole)
//! - Printing heritage (Heungdeoksa temple site, Early Printing Museum)
//! - Eastern hills (Sangdang fortress, Uamsan, National Museum, Zoo)

use crate::domain::TourSite;

/// Site data with name and coordinates.
struct SiteData {
    name: &'static str,
    lat: f64,
    lng: f64,
}

// ============================================================================
// Cheongju Data
// ============================================================================

const CHEONGJU_SITES: &[SiteData] = &[
    // Downtown
    SiteData { name: "Seongan-gil Shopping Street", lat: 36.6349, lng: 127.4893 },
    SiteData { name: "Yongdusa Temple Site Iron Flagpole", lat: 36.6356, lng: 127.4886 },
    SiteData { name: "Jungang Park", lat: 36.6370, lng: 127.4867 },
    SiteData { name: "Chungcheongbuk-do Provincial Office", lat: 36.6356, lng: 127.4914 },
    SiteData { name: "Yukgeori Market", lat: 36.6297, lng: 127.4871 },
    SiteData { name: "Suamgol Mural Village", lat: 36.6400, lng: 127.4950 },
    SiteData { name: "MMCA Cheongju", lat: 36.6484, lng: 127.4849 },
    // Printing heritage
    SiteData { name: "Heungdeoksa Temple Site", lat: 36.6372, lng: 127.4700 },
    SiteData { name: "Cheongju Early Printing Museum", lat: 36.6369, lng: 127.4706 },
    // Eastern hills
    SiteData { name: "Uamsan Mountain Trailhead", lat: 36.6475, lng: 127.5034 },
    SiteData { name: "National Cheongju Museum", lat: 36.6581, lng: 127.5137 },
    SiteData { name: "Cheongju Zoo", lat: 36.6546, lng: 127.5207 },
    SiteData { name: "Sangdangsanseong Fortress", lat: 36.6542, lng: 127.5319 },
    // West
    SiteData { name: "Munam Ecological Park", lat: 36.6651, lng: 127.4434 },
];

fn to_sites(data: &[SiteData]) -> Vec<TourSite> {
    data.iter()
        .map(|d| TourSite::new(d.name, d.lng, d.lat))
        .collect()
}

/// Returns the built-in Cheongju catalog.
///
/// ```
/// use tour_routing::demo_data::cheongju_sites;
///
/// let sites = cheongju_sites();
/// assert!(sites.len() >= 10);
/// assert!(sites.iter().any(|s| s.name == "Cheongju Early Printing Museum"));
/// ```
pub fn cheongju_sites() -> Vec<TourSite> {
    to_sites(CHEONGJU_SITES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let sites = cheongju_sites();
        let names: HashSet<_> = sites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), sites.len());
    }

    #[test]
    fn test_sites_are_near_cheongju() {
        for site in cheongju_sites() {
            assert!((36.55..36.75).contains(&site.latitude), "{}", site.name);
            assert!((127.40..127.60).contains(&site.longitude), "{}", site.name);
        }
    }
}
