//! Points of interest from two Données ouvertes Montréal datasets: "Lieux
//! d'intérêt" (places) and "Établissements alimentaires" (food businesses).

use std::{fs::File, io::Read, path::Path};

use _model::{Field, Poi};
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use geo::Point;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::metadata::Translations;

const EXCLUDED_CATEGORIES: &[&str] = &[
    "Accommodation",
    "Emergency Service",
    "Public Art",
    "Tourist Information",
];

const EXCLUDED_TYPES: &[&str] = &[
    "Architectural / Design Building",
    "Commercial Tourist Attraction",
    "Consular Service",
    "Convention / Exhibition Center",
    "Historic / Heritage Building",
    "International Agency",
    "Public Toilet",
    "Recovery and Sorting Center",
    "Taxi Waiting Stand",
];

const ESTABLISHMENT_TYPES: &[&str] = &[
    "Bakery",
    "Brewery",
    "Butcher",
    "Butcher-Grocery",
    "Caterer",
    "Coffee, Tea, Herbal Infusion",
    "Confectionery / Chocolate Shop",
    "Dairy Bar",
    "Daycare",
    "Deli",
    "Deli / Cheese Shop",
    "Department Store",
    "Fast Food Restaurant",
    "Fish Market",
    "Food Aid Organization",
    "Food Truck",
    "Grocery Store",
    "Grocery with Prepared Food",
    "Hospital",
    "Kiosk",
    "Lounge Bar, Tavern",
    "Natural Foods",
    "Pastry Shop / Bakery",
    "Public Market",
    "Ready-to-Eat Fruits and Vegetables",
    "Restaurant",
    "Senior Residence",
    "Snack Bar",
    "Sugar Shack",
    "Supermarket",
    "Takeout Restaurant",
];

const CLOSED: &str = "Closed";

#[derive(Debug, Deserialize)]
struct RawPlace {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Famille")]
    family: String,
    #[serde(rename = "Catégorie")]
    category: String,
    #[serde(rename = "Nom français")]
    name: Option<String>,
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Ville")]
    city: Option<String>,
    #[serde(rename = "Longitude")]
    longitude: Option<f64>,
    #[serde(rename = "Latitude")]
    latitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawEstablishment {
    business_id: String,
    name: Option<String>,
    city: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "statut")]
    status: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// Places then establishments, in longitude/latitude.
pub fn load_dom_pois(
    places: &Path,
    establishments: &Path,
    translations: &Translations,
) -> Result<Vec<Poi>> {
    let mut output = read_places(open(places)?, translations)
        .with_context(|| format!("Failed to load places from {places:?}"))?;
    info!("Loaded {} places", output.len());

    let establishments_pois = read_establishments(open(establishments)?, translations)
        .with_context(|| format!("Failed to load establishments from {establishments:?}"))?;
    info!("Loaded {} establishments", establishments_pois.len());

    output.extend(establishments_pois);
    Ok(output)
}

fn open(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open CSV file: {path:?}"))?;
    Ok(ReaderBuilder::new().from_reader(file))
}

pub fn read_places<R: Read>(
    mut reader: csv::Reader<R>,
    translations: &Translations,
) -> Result<Vec<Poi>> {
    let mut output = Vec::new();
    let mut unlocated = 0usize;
    for result in reader.deserialize() {
        let row: RawPlace = result?;
        // checked even though it is not kept
        translations.translate(Field::Family, &row.family)?;
        let category = translations.translate(Field::Category, &row.category)?;
        let kind = translations.translate(Field::Type, &row.kind)?;

        if EXCLUDED_CATEGORIES.contains(&category) || EXCLUDED_TYPES.contains(&kind) {
            continue;
        }
        let (Some(x), Some(y)) = (row.longitude, row.latitude) else {
            debug!(id = %row.id, "place without coordinates");
            unlocated += 1;
            continue;
        };
        output.push(Poi::new(
            row.name,
            kind.to_string(),
            row.city,
            Point::new(x, y),
        ));
    }
    if unlocated > 0 {
        warn!("Skipped {unlocated} places without coordinates");
    }
    Ok(output)
}

pub fn read_establishments<R: Read>(
    mut reader: csv::Reader<R>,
    translations: &Translations,
) -> Result<Vec<Poi>> {
    let mut output = Vec::new();
    let mut unlocated = 0usize;
    for result in reader.deserialize() {
        let row: RawEstablishment = result?;
        let kind = translations.translate(Field::Type, &row.kind)?;
        let status = translations.translate(Field::Status, &row.status)?;

        if !ESTABLISHMENT_TYPES.contains(&kind) || status == CLOSED {
            continue;
        }
        let (Some(x), Some(y)) = (row.longitude, row.latitude) else {
            debug!(id = %row.business_id, "establishment without coordinates");
            unlocated += 1;
            continue;
        };
        output.push(Poi::new(
            row.name,
            kind.to_string(),
            row.city,
            Point::new(x, y),
        ));
    }
    if unlocated > 0 {
        warn!("Skipped {unlocated} establishments without coordinates");
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use crate::metadata::{tests::translations, UnknownCategory};

    use super::*;

    fn reader(data: &str) -> csv::Reader<&[u8]> {
        ReaderBuilder::new().from_reader(data.as_bytes())
    }

    const PLACES: &str = "\
ID,Famille,Catégorie,Nom français,Nom anglais,Type,Ville,Code postal,Arrondissement,Longitude,Latitude
1,Culture,Bibliothèque,Bibliothèque de Verdun,,Bibliothèque,Montréal,H4G 1T6,Verdun,-73.5694,45.4562
2,Culture,Art public,La Joute,,Parc,Montréal,,Ville-Marie,-73.56,45.50
3,Sports et loisirs,Parc,Parc La Fontaine,,Toilette publique,Montréal,,Plateau,-73.57,45.52
4,Sports et loisirs,Parc,Parc La Fontaine,,Parc,Montréal,,Plateau,-73.5699,45.5271
5,Sports et loisirs,Parc,Parc sans adresse,,Parc,Montréal,,,,
";

    const ESTABLISHMENTS: &str = "\
business_id,name,address,city,state,type,statut,date_statut,latitude,longitude
10,Boulangerie Au Pain Doré,,Montréal,Québec,Boulangerie,Ouvert,2023-01-01,45.52,-73.58
11,Chez Ginette,,Montréal,Québec,Restaurant,Fermé,2022-05-01,45.51,-73.57
12,Distributrice du métro,,Montréal,Québec,Distributrice automatique,Ouvert,2021-03-01,45.50,-73.56
13,Chez Paul,,Verdun,Québec,Restaurant,Sous inspection fédérale,2020-01-01,45.45,-73.57
";

    #[test]
    fn places_are_translated_and_filtered() {
        let pois = read_places(reader(PLACES), &translations()).unwrap();
        let kinds: Vec<_> = pois.iter().map(|x| x.kind.as_str()).collect();
        // public art, public toilets and rows without coordinates are dropped
        assert_eq!(kinds, ["Library", "Park"]);
        assert_eq!(pois[0].name.as_deref(), Some("Bibliothèque de Verdun"));
        assert_eq!(pois[0].city.as_deref(), Some("Montréal"));
        assert_eq!(pois[0].point, Point::new(-73.5694, 45.4562));
    }

    #[test]
    fn closed_establishments_are_excluded() {
        let pois = read_establishments(reader(ESTABLISHMENTS), &translations()).unwrap();
        let names: Vec<_> = pois.iter().filter_map(|x| x.name.as_deref()).collect();
        assert_eq!(names, ["Boulangerie Au Pain Doré", "Chez Paul"]);
        assert!(pois.iter().all(|x| ESTABLISHMENT_TYPES.contains(&x.kind.as_str())));
        assert_eq!(pois[0].point, Point::new(-73.58, 45.52));
    }

    #[test]
    fn unmapped_values_are_fatal() {
        let data = "\
business_id,name,city,type,statut,latitude,longitude
10,Chez Ginette,Montréal,Casse-croûte,Ouvert,45.51,-73.57
";
        let err = read_establishments(reader(data), &translations()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<UnknownCategory>(),
            Some(&UnknownCategory::Translation {
                field: Field::Type,
                value: "Casse-croûte".to_string()
            })
        );
    }

    #[test]
    fn empty_categories_are_fatal() {
        let data = "\
ID,Famille,Catégorie,Nom français,Type,Ville,Longitude,Latitude
1,Culture,,Sans catégorie,Parc,Montréal,-73.56,45.50
";
        let err = read_places(reader(data), &translations()).unwrap_err();
        assert!(err.downcast_ref::<UnknownCategory>().is_some());
    }

    #[test]
    fn loads_both_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let places = dir.path().join("lieux_d_interet.csv");
        let establishments = dir.path().join("etablissements_alimentaires.csv");
        std::fs::write(&places, PLACES).unwrap();
        std::fs::write(&establishments, ESTABLISHMENTS).unwrap();

        let pois = load_dom_pois(&places, &establishments, &translations()).unwrap();
        let kinds: Vec<_> = pois.iter().map(|x| x.kind.as_str()).collect();
        assert_eq!(kinds, ["Library", "Park", "Bakery", "Restaurant"]);

        let missing = dir.path().join("missing.csv");
        assert!(load_dom_pois(&missing, &establishments, &translations()).is_err());
    }
}
