use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use geo::{MultiPolygon, Point};
use shapefile::dbase::{FieldValue, Record};
use shapefile::{Reader, Shape};
use tracing::debug;

use crate::crs::{Crs, Reprojector};

/// Extensions of the files that together make up a shapefile.
const COMPONENTS: [&str; 5] = ["shp", "shx", "dbf", "prj", "cpg"];

/// Every file belonging to the shapefile at `shp`, whether present or not.
/// Attributes live in the `.dbf` and the CRS in the `.prj`, so a cache keyed
/// on the `.shp` alone would miss edits to either.
pub fn components(shp: &Path) -> Vec<PathBuf> {
    COMPONENTS.iter().map(|x| shp.with_extension(x)).collect()
}

/// Reads every polygon of a shapefile, reprojected to the working CRS.
pub fn load_polygons(path: &Path) -> Result<Vec<(MultiPolygon<f64>, Record)>> {
    let crs = Crs::from_shapefile(path)?;
    let reprojector = Reprojector::new(crs)?;
    let mut reader =
        Reader::from_path(path).with_context(|| format!("Failed to open shapefile: {path:?}"))?;

    let mut output = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.with_context(|| format!("Failed to read {path:?}"))?;
        let geometry: MultiPolygon<f64> = match shape {
            Shape::Polygon(x) => x
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {e:?}"))?,
            Shape::PolygonM(x) => x
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {e:?}"))?,
            Shape::PolygonZ(x) => x
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {e:?}"))?,
            Shape::NullShape => continue,
            x => bail!("Expected polygons in {path:?}, found {:?}", x.shapetype()),
        };
        let geometry = reprojector
            .reproject(geometry)
            .with_context(|| format!("Failed to reproject {path:?}"))?;
        output.push((geometry, record));
    }

    debug!(?path, ?crs, count = output.len(), "loaded polygons");
    Ok(output)
}

/// Reads every point of a shapefile, reprojected to the working CRS.
pub fn load_points(path: &Path) -> Result<Vec<(Point<f64>, Record)>> {
    let crs = Crs::from_shapefile(path)?;
    let reprojector = Reprojector::new(crs)?;
    let mut reader =
        Reader::from_path(path).with_context(|| format!("Failed to open shapefile: {path:?}"))?;

    let mut output = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.with_context(|| format!("Failed to read {path:?}"))?;
        let point = match shape {
            Shape::Point(p) => Point::new(p.x, p.y),
            Shape::PointM(p) => Point::new(p.x, p.y),
            Shape::PointZ(p) => Point::new(p.x, p.y),
            Shape::NullShape => continue,
            x => bail!("Expected points in {path:?}, found {:?}", x.shapetype()),
        };
        let point = reprojector
            .reproject(point)
            .with_context(|| format!("Failed to reproject {path:?}"))?;
        output.push((point, record));
    }

    debug!(?path, ?crs, count = output.len(), "loaded points");
    Ok(output)
}

/// Reads a dBase attribute as text. Numeric codes are rendered without a
/// trailing `.0`.
pub fn field_string(record: &Record, name: &str) -> Result<Option<String>> {
    let value = record
        .get(name)
        .ok_or_else(|| anyhow!("Field '{name}' not found in shapefile"))?;
    Ok(field_value_string(value))
}

fn field_value_string(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Character(x) => x.as_ref().map(|x| x.trim().to_string()),
        FieldValue::Memo(x) => Some(x.trim().to_string()),
        FieldValue::Numeric(x) => x.map(number_string),
        FieldValue::Float(x) => x.map(|x| number_string(x as f64)),
        FieldValue::Double(x) => Some(number_string(*x)),
        FieldValue::Integer(x) => Some(x.to_string()),
        _ => None,
    }
    .filter(|x| !x.is_empty())
}

fn number_string(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        x.to_string()
    }
}
