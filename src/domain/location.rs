// Reef location domain model
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReefLocation {
    pub id: String,
    pub name: String,
    pub coordinates: Coordinates,
    #[serde(default)]
    pub description: String,
}

impl ReefLocation {
    pub fn new(id: impl Into<String>, name: &str, lat: f64, lon: f64, description: &str) -> Self {
        Self {
            id: id.into(),
            name: Self::format_name(name),
            coordinates: Coordinates { lat, lon },
            description: description.to_string(),
        }
    }

    pub fn lat(&self) -> f64 {
        self.coordinates.lat
    }

    pub fn lon(&self) -> f64 {
        self.coordinates.lon
    }

    fn format_name(name: &str) -> String {
        // Convert "Jolly_Buoy_" to "Jolly Buoy"
        name.trim_end_matches('_').replace('_', " ")
    }
}

/// The Andaman sites monitored when no location list is configured.
pub fn default_locations() -> Vec<ReefLocation> {
    vec![
        ReefLocation::new("jolly-buoy", "Jolly_Buoy", 11.495, 92.610, "Primary monitoring site"),
        ReefLocation::new("neel-islands", "Neel Islands", 11.832919, 93.052612, "Northern reef system"),
        ReefLocation::new(
            "mahatma-gandhi",
            "Mahatma Gandhi Marine National Park",
            11.5690,
            92.6542,
            "Protected marine area",
        ),
        ReefLocation::new("havelock", "Havelock", 11.96, 93.0, "Tourist diving area"),
    ]
}

pub fn find_location<'a>(locations: &'a [ReefLocation], id: &str) -> Option<&'a ReefLocation> {
    locations.iter().find(|l| l.id == id)
}
