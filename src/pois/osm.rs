//! Points of interest in the on-island municipalities outside Montreal,
//! queried from OpenStreetMap.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use _model::{Poi, TagKey};
use anyhow::Result;
use geo::{BooleanOps, Contains, MultiPolygon};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{config::Config, utils::Http};

use super::{nominatim, overpass};

/// How an element carrying several queried keys is flattened.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagPolicy {
    /// One POI per queried key the element carries, so a feature tagged
    /// `amenity=library` and `tourism=museum` is emitted twice.
    #[default]
    PerTag,
    /// One POI per element, typed by the first key in [`TagKey::all`] order.
    FirstTag,
}

impl TagPolicy {
    pub fn slug(&self) -> &'static str {
        match self {
            Self::PerTag => "per-tag",
            Self::FirstTag => "first-tag",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Theme {
    Healthcare,
    Education,
    Recreation,
    Community,
    Mobility,
    Government,
    Leisure,
    Shop,
    TransitStation,
    Tourism,
}

pub struct TagGroup {
    pub theme: Theme,
    pub key: TagKey,
    pub values: &'static [&'static str],
}

/// Tag values chosen to match the DOM categories as closely as possible.
pub const TAXONOMY: &[TagGroup] = &[
    TagGroup {
        theme: Theme::Healthcare,
        key: TagKey::Amenity,
        values: &["clinic", "social_facility"],
    },
    TagGroup {
        theme: Theme::Education,
        key: TagKey::Amenity,
        values: &["college", "kindergarten", "school", "university"],
    },
    TagGroup {
        theme: Theme::Recreation,
        key: TagKey::Amenity,
        values: &["arts_centre", "cinema", "library", "theatre"],
    },
    TagGroup {
        theme: Theme::Community,
        key: TagKey::Amenity,
        values: &["community_centre", "exhibition_centre", "social_centre"],
    },
    TagGroup {
        theme: Theme::Mobility,
        key: TagKey::Amenity,
        values: &["mobility_hub", "bus_station"],
    },
    TagGroup {
        theme: Theme::Government,
        key: TagKey::Amenity,
        values: &["courthouse", "townhall"],
    },
    TagGroup {
        theme: Theme::Government,
        key: TagKey::Government,
        values: &["public_service", "social_services"],
    },
    TagGroup {
        theme: Theme::Leisure,
        key: TagKey::Leisure,
        values: &[
            "fitness_centre",
            "fitness_station",
            "garden",
            "marina",
            "park",
            "sports_centre",
            "sports_hall",
            "swimming_pool",
        ],
    },
    TagGroup {
        theme: Theme::Recreation,
        key: TagKey::Place,
        values: &["square"],
    },
    TagGroup {
        theme: Theme::Shop,
        key: TagKey::Shop,
        values: &["mall"],
    },
    TagGroup {
        theme: Theme::TransitStation,
        key: TagKey::Station,
        values: &["subway", "train"],
    },
    TagGroup {
        theme: Theme::Tourism,
        key: TagKey::Tourism,
        values: &["gallery", "museum"],
    },
];

/// Queried values per key, across every theme.
pub fn tags() -> BTreeMap<TagKey, BTreeSet<&'static str>> {
    let mut output: BTreeMap<TagKey, BTreeSet<&'static str>> = BTreeMap::new();
    for group in TAXONOMY {
        output
            .entry(group.key)
            .or_default()
            .extend(group.values.iter().copied());
    }
    output
}

/// An Overpass QL query for every tagged element inside `region`.
pub fn build_query(region: &MultiPolygon<f64>) -> String {
    let tags = tags();
    let mut output = String::from("(\n");
    for polygon in region {
        let poly = polygon
            .exterior()
            .coords()
            .map(|c| format!("{} {}", c.y, c.x))
            .join(" ");
        for (key, values) in &tags {
            // writing to a String cannot fail
            let _ = writeln!(
                output,
                "  nwr[\"{key}\"~\"^({})$\"](poly:\"{poly}\");",
                values.iter().join("|")
            );
        }
    }
    output.push_str(");\nout tags center;\n");
    output
}

/// Loads the OSM points of interest for every configured city, in
/// longitude/latitude.
pub fn load_osm_pois(config: &Config, http: &Http) -> Result<Vec<Poi>> {
    for group in TAXONOMY {
        debug!("{:?}: {}={}", group.theme, group.key, group.values.join("|"));
    }

    let boundaries = nominatim::boundaries(config, http)?;
    let region = boundaries
        .values()
        .fold(MultiPolygon::new(Vec::new()), |acc, x| acc.union(x));
    info!(
        "Querying Overpass over {} cities ({} polygons)...",
        boundaries.len(),
        region.0.len()
    );

    let elements = overpass::query(
        http,
        &config.osm.overpass_url,
        config.osm.timeout,
        &build_query(&region),
    )?;
    let total = elements.len();
    // the poly filter ignores holes
    let elements: Vec<_> = elements
        .into_iter()
        .filter(|x| region.contains(&x.point))
        .collect();
    info!(
        "Fetched {} OSM elements ({} outside the region)",
        elements.len(),
        total - elements.len()
    );

    let pois = flatten(&elements, config.osm.tag_policy);
    info!(
        "Flattened into {} OSM POIs ({})",
        pois.len(),
        config.osm.tag_policy.slug()
    );
    Ok(pois)
}

/// One POI per element and key, key-major: every `amenity` first, then every
/// `government`, and so on. The type is the element's value for that key,
/// whatever it is.
pub fn flatten(elements: &[overpass::OsmElement], policy: TagPolicy) -> Vec<Poi> {
    let mut seen = BTreeSet::new();
    let mut output = Vec::new();
    for key in TagKey::all() {
        for element in elements {
            let Some(kind) = element.tags.get(key.key()) else {
                continue;
            };
            if policy == TagPolicy::FirstTag && !seen.insert(element.id) {
                continue;
            }
            output.push(Poi::new(
                element.tags.get("name").cloned(),
                kind.clone(),
                element.tags.get("addr:city").cloned(),
                element.point,
            ));
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use _model::OsmId;
    use geo::{polygon, Point};

    use super::*;
    use crate::pois::overpass::OsmElement;

    fn element(id: OsmId, tags: &[(&str, &str)]) -> OsmElement {
        OsmElement {
            id,
            point: Point::new(-73.6, 45.48),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn elements() -> Vec<OsmElement> {
        vec![
            element(
                OsmId::Way(1),
                &[
                    ("amenity", "library"),
                    ("tourism", "museum"),
                    ("name", "Bibliothèque de Westmount"),
                    ("addr:city", "Westmount"),
                ],
            ),
            element(OsmId::Node(2), &[("leisure", "park"), ("name", "Parc Murray")]),
            element(OsmId::Node(3), &[("amenity", "clinic")]),
        ]
    }

    #[test]
    fn per_tag_duplicates_multi_tagged_elements() {
        let pois = flatten(&elements(), TagPolicy::PerTag);
        let kinds: Vec<_> = pois.iter().map(|x| x.kind.as_str()).collect();
        assert_eq!(kinds, ["library", "clinic", "park", "museum"]);
        assert_eq!(pois[0].name, pois[3].name);
        assert_eq!(pois[0].city.as_deref(), Some("Westmount"));
        assert_eq!(pois[1].name, None);
        assert!(pois.iter().all(|x| x.group.is_none()));
    }

    #[test]
    fn first_tag_keeps_one_poi_per_element() {
        let pois = flatten(&elements(), TagPolicy::FirstTag);
        let kinds: Vec<_> = pois.iter().map(|x| x.kind.as_str()).collect();
        assert_eq!(kinds, ["library", "clinic", "park"]);
    }

    #[test]
    fn taxonomy_merges_values_per_key() {
        let tags = tags();
        assert_eq!(tags.len(), TagKey::all().len());
        assert_eq!(tags[&TagKey::Amenity].len(), 17);
        assert!(tags[&TagKey::Amenity].contains("social_facility"));
        assert!(tags[&TagKey::Amenity].contains("college"));
        assert_eq!(
            tags[&TagKey::Tourism].iter().copied().collect::<Vec<_>>(),
            ["gallery", "museum"]
        );
    }

    #[test]
    fn query_covers_every_polygon_and_key() {
        let region = MultiPolygon::new(vec![
            polygon![(x: -73.6, y: 45.48), (x: -73.59, y: 45.48), (x: -73.59, y: 45.49)],
            polygon![(x: -73.9, y: 45.4), (x: -73.8, y: 45.4), (x: -73.8, y: 45.5)],
        ]);
        let query = build_query(&region);
        assert!(query.starts_with("(\n"));
        assert!(query.ends_with(");\nout tags center;\n"));
        assert_eq!(query.matches("nwr[").count(), 2 * TagKey::all().len());
        assert!(query.contains(r#"nwr["station"~"^(subway|train)$"](poly:"45.48 -73.6 45.48 -73.59 45.49 -73.59 45.48 -73.6");"#));
    }

    #[test]
    fn policy_from_yaml() {
        assert_eq!(
            serde_yaml::from_str::<TagPolicy>("first-tag").unwrap(),
            TagPolicy::FirstTag
        );
        assert_eq!(TagPolicy::default().slug(), "per-tag");
    }
}
