use std::collections::BTreeMap;

use _model::OsmId;
use anyhow::{Context, Result};
use geo::Point;
use serde::Deserialize;

use crate::utils::Http;

pub fn query(http: &Http, url: &str, timeout: u32, q: &str) -> Result<Vec<OsmElement>> {
    let payload = format!("[out:json][timeout:{timeout}];\n{q}");
    let response: OverpassResponse = http
        .send("Overpass query", |agent| {
            agent.post(url).send_form(&[("data", payload.as_str())])
        })?
        .into_json()
        .context("Failed to parse Overpass response")?;

    Ok(response.elements.into_iter().map(OsmElement::from).collect())
}

#[derive(Deserialize)]
struct OverpassResponse {
    elements: Vec<RawElement>,
}

/// An element as returned by `out tags center`: nodes carry their position
/// inline, ways and relations a `center` object.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum RawElement {
    Node {
        id: u64,
        #[serde(flatten)]
        center: RawPosition,
        #[serde(default)]
        tags: BTreeMap<String, String>,
    },
    Way {
        id: u64,
        center: RawPosition,
        #[serde(default)]
        tags: BTreeMap<String, String>,
    },
    Relation {
        id: u64,
        center: RawPosition,
        #[serde(default)]
        tags: BTreeMap<String, String>,
    },
}

#[derive(Deserialize)]
struct RawPosition {
    lat: f64,
    lon: f64,
}

impl From<RawElement> for OsmElement {
    fn from(raw: RawElement) -> Self {
        let (id, center, tags) = match raw {
            RawElement::Node { id, center, tags } => (OsmId::Node(id), center, tags),
            RawElement::Way { id, center, tags } => (OsmId::Way(id), center, tags),
            RawElement::Relation { id, center, tags } => (OsmId::Relation(id), center, tags),
        };
        Self {
            id,
            point: Point::new(center.lon, center.lat),
            tags,
        }
    }
}

/// A node, or the centre of a way or relation, with all of its tags.
#[derive(Debug, Clone, PartialEq)]
pub struct OsmElement {
    pub id: OsmId,
    pub point: Point,
    pub tags: BTreeMap<String, String>,
}
