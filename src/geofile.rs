//! GeoJSON feature collections for the derived datasets.

use _model::{GridCell, Poi, TransitStop};
use anyhow::{anyhow, bail, Context, Result};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use serde_json::json;

use crate::config::CRS;

/// A typed row of a feature collection.
pub trait Record: Sized {
    fn to_feature(&self) -> Feature;
    fn from_feature(feature: Feature) -> Result<Self>;
}

pub fn to_string<R: Record>(records: &[R]) -> Result<String> {
    let mut foreign_members = JsonObject::new();
    foreign_members.insert("crs".to_string(), crs_member());
    let collection = FeatureCollection {
        bbox: None,
        features: records.iter().map(Record::to_feature).collect(),
        foreign_members: Some(foreign_members),
    };
    let mut output = serde_json::to_string(&collection)?;
    output.push('\n');
    Ok(output)
}

pub fn from_str<R: Record>(s: &str) -> Result<Vec<R>> {
    let collection = match s.parse::<GeoJson>().context("Failed to parse GeoJSON")? {
        GeoJson::FeatureCollection(fc) => fc,
        _ => bail!("GeoJSON must be a FeatureCollection"),
    };

    if let Some(crs) = collection
        .foreign_members
        .as_ref()
        .and_then(|x| x.get("crs"))
    {
        if *crs != crs_member() {
            bail!("Expected features in EPSG:{CRS}, found crs {crs}");
        }
    }

    collection
        .features
        .into_iter()
        .map(R::from_feature)
        .collect()
}

fn crs_member() -> JsonValue {
    json!({
        "type": "name",
        "properties": { "name": format!("urn:ogc:def:crs:EPSG::{CRS}") },
    })
}

fn feature(geometry: geojson::Value, properties: JsonValue) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geometry)),
        id: None,
        properties: match properties {
            JsonValue::Object(x) => Some(x),
            _ => None,
        },
        foreign_members: None,
    }
}

fn geometry(feature: &mut Feature) -> Result<geo::Geometry<f64>> {
    let geometry = feature
        .geometry
        .take()
        .ok_or_else(|| anyhow!("Feature has no geometry"))?;
    geometry
        .value
        .try_into()
        .map_err(|e| anyhow!("Failed to convert geojson geometry: {e:?}"))
}

fn property(feature: &Feature, key: &str) -> Option<String> {
    match feature.properties.as_ref()?.get(key)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required(feature: &Feature, key: &str) -> Result<String> {
    property(feature, key).ok_or_else(|| anyhow!("Feature is missing property '{key}'"))
}

impl Record for GridCell {
    fn to_feature(&self) -> Feature {
        feature(
            geojson::Value::from(&self.geometry),
            json!({ "cell_id": self.id, "subdivision": self.subdivision }),
        )
    }

    fn from_feature(mut feature: Feature) -> Result<Self> {
        let geometry = match geometry(&mut feature)? {
            geo::Geometry::Polygon(x) => x,
            x => bail!("Grid cells must be polygons, found {x:?}"),
        };
        Ok(GridCell {
            id: required(&feature, "cell_id")?
                .parse()
                .context("cell_id must be an integer")?,
            subdivision: required(&feature, "subdivision")?,
            geometry,
        })
    }
}

impl Record for Poi {
    fn to_feature(&self) -> Feature {
        feature(
            geojson::Value::from(&self.point),
            json!({
                "name": self.name,
                "type": self.kind,
                "group": self.group,
                "city": self.city,
            }),
        )
    }

    fn from_feature(mut feature: Feature) -> Result<Self> {
        let point = match geometry(&mut feature)? {
            geo::Geometry::Point(x) => x,
            x => bail!("POIs must be points, found {x:?}"),
        };
        Ok(Poi {
            name: property(&feature, "name"),
            kind: required(&feature, "type")?,
            group: property(&feature, "group"),
            city: property(&feature, "city"),
            point,
        })
    }
}

impl Record for TransitStop {
    fn to_feature(&self) -> Feature {
        feature(
            geojson::Value::from(&self.point),
            json!({
                "stop_code": self.code,
                "stop_id": self.id,
                "stop_name": self.name,
            }),
        )
    }

    fn from_feature(mut feature: Feature) -> Result<Self> {
        let point = match geometry(&mut feature)? {
            geo::Geometry::Point(x) => x,
            x => bail!("Stops must be points, found {x:?}"),
        };
        Ok(TransitStop {
            code: required(&feature, "stop_code")?,
            id: required(&feature, "stop_id")?,
            name: required(&feature, "stop_name")?,
            point,
        })
    }
}
