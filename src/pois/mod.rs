use _model::{Poi, Source};
use anyhow::{Context, Result};
use tracing::info;

use crate::{
    config::Config,
    crs::{Crs, Reprojector},
    metadata::{GroupMappings, Translations},
    utils::Http,
};

pub mod dom;
pub mod nominatim;
pub mod osm;
pub mod overpass;

/// Loads the DOM and OSM points of interest, groups them, and reprojects them
/// to the working CRS.
pub fn load(config: &Config, http: &Http) -> Result<Vec<Poi>> {
    let translations = Translations::load(&config.translations())?;
    let groups = GroupMappings::load(&config.group_mappings())?;

    info!("Extracting DOM POIs from the places and food establishments datasets...");
    let dom = dom::load_dom_pois(
        &config.places_csv(),
        &config.establishments_csv(),
        &translations,
    )?;

    info!("Querying OSM for suburb POIs. This can take a minute...");
    let osm = osm::load_osm_pois(config, http)?;

    info!("Combining {} DOM and {} OSM POIs", dom.len(), osm.len());
    let mut pois = combine(dom, osm, &groups)?;
    let reprojector = Reprojector::new(Crs::Geographic)?;
    for poi in &mut pois {
        reprojector
            .apply(&mut poi.point)
            .with_context(|| format!("Failed to reproject {:?}", poi.name))?;
    }
    Ok(pois)
}

/// Assigns every POI its group and concatenates DOM then OSM.
pub fn combine(dom: Vec<Poi>, osm: Vec<Poi>, groups: &GroupMappings) -> Result<Vec<Poi>> {
    let mut output = Vec::with_capacity(dom.len() + osm.len());
    for (source, pois) in [(Source::Dom, dom), (Source::Osm, osm)] {
        for mut poi in pois {
            poi.group = Some(groups.group(source, &poi.kind)?.to_string());
            output.push(poi);
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use geo::Point;

    use super::*;
    use crate::metadata::{tests::groups, UnknownCategory};

    fn poi(kind: &str) -> Poi {
        Poi::new(None, kind.to_string(), None, Point::new(-73.6, 45.5))
    }

    #[test]
    fn groups_come_from_the_matching_source() {
        let pois = combine(
            vec![poi("Library"), poi("Bakery")],
            vec![poi("library"), poi("park")],
            &groups(),
        )
        .unwrap();
        let combined: Vec<_> = pois
            .iter()
            .map(|x| (x.kind.as_str(), x.group.as_deref().unwrap()))
            .collect();
        assert_eq!(
            combined,
            [
                ("Library", "Culture"),
                ("Bakery", "Food"),
                ("library", "Culture"),
                ("park", "Parks"),
            ]
        );
    }

    #[test]
    fn unresolvable_group_is_fatal() {
        // DOM spelling looked up in the OSM table
        let err = combine(vec![], vec![poi("Library")], &groups()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<UnknownCategory>(),
            Some(&UnknownCategory::Group {
                provider: Source::Osm,
                value: "Library".to_string()
            })
        );
    }
}
