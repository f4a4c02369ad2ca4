use std::{collections::BTreeMap, fs::read_to_string, path::Path, thread::sleep, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use geo::MultiPolygon;
use indicatif::ProgressIterator;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::{cache::write_atomic, config::Config, utils::progress_style, utils::Http};

/// Nominatim's usage policy allows one request per second.
const REQUEST_INTERVAL: Duration = Duration::from_secs(1);

/// Results requested per search. The top hit is often a place node, so the
/// boundary is the first polygon among these.
const RESULT_LIMIT: &str = "50";

/// Boundary polygon of every configured city, in longitude/latitude.
///
/// Raw search results are kept in `boundaries.json` under the OSM raw
/// directory, and only cities missing from it are fetched.
pub fn boundaries(config: &Config, http: &Http) -> Result<BTreeMap<String, MultiPolygon<f64>>> {
    let raw_path = config.osm_raw_dir().join("boundaries.json");
    let mut raw: BTreeMap<String, Value> = if raw_path.exists() {
        serde_json::from_str(&read_to_string(&raw_path)?)
            .with_context(|| format!("Failed to parse {raw_path:?}"))?
    } else {
        BTreeMap::new()
    };

    let missing: Vec<_> = config
        .osm
        .cities
        .iter()
        .filter(|x| !raw.contains_key(*x))
        .collect();

    if !missing.is_empty() {
        info!("Geocoding {} cities...", missing.len());
        for (i, city) in missing.iter().enumerate().progress_with_style(progress_style()) {
            if i > 0 {
                sleep(REQUEST_INTERVAL);
            }
            raw.insert(city.to_string(), search(config, http, city)?);
        }

        // write now to keep raw data
        write_raw(&raw_path, &raw)?;
    }

    let mut output = BTreeMap::new();
    for city in &config.osm.cities {
        let geojson = raw
            .get(city)
            .ok_or_else(|| anyhow!("No boundary for {city}"))?;
        let boundary =
            parse_boundary(geojson).with_context(|| format!("Invalid boundary for {city}"))?;
        output.insert(city.clone(), boundary);
    }
    Ok(output)
}

fn write_raw(path: &Path, raw: &BTreeMap<String, Value>) -> Result<()> {
    let mut contents = serde_json::to_string_pretty(raw)?;
    contents.push('\n');
    write_atomic(path, contents.as_bytes())
}

/// The GeoJSON outline of the best polygonal match for `city`.
fn search(config: &Config, http: &Http, city: &str) -> Result<Value> {
    let q = format!("{city}, {}", config.osm.region);
    let response: Vec<Place> = http
        .send(&format!("Geocoding {q:?}"), |agent| {
            let mut request = agent
                .get(&config.osm.nominatim_url)
                .query("q", &q)
                .query("format", "json")
                .query("polygon_geojson", "1")
                .query("limit", RESULT_LIMIT);
            if let Some(email) = &config.network.email {
                request = request.query("email", email);
            }
            request.call()
        })?
        .into_json()
        .with_context(|| format!("Failed to parse Nominatim response for {q:?}"))?;

    if response.is_empty() {
        bail!("Nominatim found nothing for {q:?}");
    }
    let place = first_polygon(response)
        .ok_or_else(|| anyhow!("Nominatim found no polygon boundary for {q:?}"))?;
    info!("{city} -> {}", place.display_name);
    Ok(place.geojson)
}

#[derive(Debug, Deserialize)]
struct Place {
    display_name: String,
    #[serde(default)]
    geojson: Value,
}

fn first_polygon(places: Vec<Place>) -> Option<Place> {
    places.into_iter().find(|x| {
        matches!(
            x.geojson.get("type").and_then(Value::as_str),
            Some("Polygon" | "MultiPolygon")
        )
    })
}

fn parse_boundary(value: &Value) -> Result<MultiPolygon<f64>> {
    let geometry = geojson::Geometry::from_json_value(value.clone())
        .map_err(|e| anyhow!("Failed to parse geometry: {e}"))?;
    let geometry: geo::Geometry<f64> = geometry
        .value
        .try_into()
        .map_err(|e| anyhow!("Failed to convert geometry: {e:?}"))?;
    match geometry {
        geo::Geometry::Polygon(x) => Ok(MultiPolygon::new(vec![x])),
        geo::Geometry::MultiPolygon(x) => Ok(x),
        x => bail!("Expected a polygon boundary, found {x:?}"),
    }
}
