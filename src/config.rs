use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};

use crate::cache::CachePolicy;
use crate::pois::osm::TagPolicy;

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG: &str = "montreal.yaml";

/// EPSG:32188, NAD83 / MTM zone 8. The only working CRS supported.
pub const CRS: u32 = 32188;

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Project root; every other path is relative to it.
    pub root: PathBuf,
    pub crs: u32,
    /// Hexagon circumradius in metres.
    pub hex_radius: f64,
    /// Minutes.
    pub travel_time: f64,
    /// Kilometres per hour.
    pub walking_speed: f64,
    pub cache: CachePolicy,
    pub osm: OsmConfig,
    pub network: NetworkConfig,
    pub plot: PlotConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct OsmConfig {
    /// On-island municipalities besides Montreal.
    pub cities: Vec<String>,
    /// Appended to each city when geocoding.
    pub region: String,
    pub tag_policy: TagPolicy,
    /// Overpass server-side timeout, seconds.
    pub timeout: u32,
    pub nominatim_url: String,
    pub overpass_url: String,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Extra attempts after a failed request.
    pub retries: u32,
    /// First retry delay; doubles on each attempt.
    #[serde(rename = "backoff_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub backoff: Duration,
    #[serde(rename = "timeout_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
    pub user_agent: String,
    /// Sent to Nominatim so heavy use can be traced back to someone.
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct PlotConfig {
    /// Width and height of the rendered image, pixels.
    pub size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            crs: CRS,
            hex_radius: 250.0,
            travel_time: 15.0,
            walking_speed: 5.0,
            cache: CachePolicy::default(),
            osm: OsmConfig::default(),
            network: NetworkConfig::default(),
            plot: PlotConfig::default(),
        }
    }
}

impl Default for OsmConfig {
    fn default() -> Self {
        let cities = [
            "Baie-d'Urfé",
            "Beaconsfield",
            "Côte Saint-Luc",
            "Dollard-des-Ormeaux",
            "Dorval",
            "Hampstead",
            "Kirkland",
            "L'Île-Dorval",
            "Montréal-Est",
            "Montreal West",
            "Mount Royal",
            "Pointe-Claire",
            "Sainte-Anne-de-Bellevue",
            "Senneville",
            "Westmount",
        ];
        Self {
            cities: cities.iter().map(|x| x.to_string()).collect(),
            region: "Quebec, Canada".to_string(),
            tag_policy: TagPolicy::default(),
            timeout: 180,
            nominatim_url: "https://nominatim.openstreetmap.org/search".to_string(),
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
            user_agent: concat!("montreal-features/", env!("CARGO_PKG_VERSION")).to_string(),
            email: None,
        }
    }
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self { size: 2400 }
    }
}

impl Config {
    /// Reads `path`, or [`DEFAULT_CONFIG`] if it exists, or falls back to the
    /// built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None if Path::new(DEFAULT_CONFIG).is_file() => {
                Self::load_from_file(Path::new(DEFAULT_CONFIG))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {path:?}"))
    }

    fn validate(&self) -> Result<()> {
        if self.crs != CRS {
            bail!("Unsupported working CRS EPSG:{} (only EPSG:{CRS})", self.crs);
        }
        if !(self.hex_radius > 0.0) {
            bail!("hex_radius must be positive, got {}", self.hex_radius);
        }
        if self.plot.size == 0 {
            bail!("plot.size must be positive");
        }
        Ok(())
    }

    /// Metres covered in `travel_time` at `walking_speed`.
    pub fn walking_distance(&self) -> f64 {
        self.walking_speed * (self.travel_time / 60.0) * 1000.0
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir().join("raw")
    }

    pub fn features_dir(&self) -> PathBuf {
        self.data_dir().join("features")
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.data_dir().join("metadata")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn grid_file(&self) -> PathBuf {
        self.data_dir().join("grid.geojson")
    }

    pub fn pois_file(&self) -> PathBuf {
        self.features_dir().join("pois.geojson")
    }

    pub fn stops_file(&self) -> PathBuf {
        self.features_dir().join("stops.geojson")
    }

    pub fn island_shp(&self) -> PathBuf {
        self.raw_dir().join("island/limites-terrestres.shp")
    }

    pub fn agglo_shp(&self) -> PathBuf {
        self.raw_dir()
            .join("city/limites-administratives-agglomeration.shp")
    }

    pub fn stm_shp(&self) -> PathBuf {
        self.raw_dir().join("stm/stm_arrets_sig.shp")
    }

    pub fn places_csv(&self) -> PathBuf {
        self.raw_dir().join("lieux_d_interet.csv")
    }

    pub fn establishments_csv(&self) -> PathBuf {
        self.raw_dir().join("etablissements_alimentaires.csv")
    }

    pub fn translations(&self) -> PathBuf {
        self.meta_dir().join("translations.json")
    }

    pub fn group_mappings(&self) -> PathBuf {
        self.meta_dir().join("group_mappings.json")
    }

    /// Raw API responses kept between runs.
    pub fn osm_raw_dir(&self) -> PathBuf {
        self.raw_dir().join("osm")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_constants() {
        let config = Config::default();
        assert_eq!(config.crs, 32188);
        assert_eq!(config.hex_radius, 250.0);
        assert_eq!(config.walking_distance(), 1250.0);
        assert_eq!(config.osm.cities.len(), 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "root: /tmp/montreal\nhex_radius: 500\nosm:\n  tag_policy: first-tag\n",
        )
        .unwrap();
        assert_eq!(config.hex_radius, 500.0);
        assert_eq!(config.osm.tag_policy, TagPolicy::FirstTag);
        assert_eq!(config.osm.region, "Quebec, Canada");
        assert_eq!(
            config.pois_file(),
            PathBuf::from("/tmp/montreal/data/features/pois.geojson")
        );
    }

    #[test]
    fn network_durations() {
        let config: Config =
            serde_yaml::from_str("network:\n  backoff_ms: 250\n  timeout_secs: 60\n").unwrap();
        assert_eq!(config.network.backoff, Duration::from_millis(250));
        assert_eq!(config.network.timeout, Duration::from_secs(60));
        assert_eq!(config.network.retries, 3);
    }

    #[test]
    fn rejects_other_crs() {
        let config = Config {
            crs: 4326,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(serde_yaml::from_str::<Config>("hex_raduis: 100\n").is_err());
    }
}
