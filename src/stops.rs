use std::collections::HashSet;

use _model::TransitStop;
use anyhow::{anyhow, Result};
use geo::{Contains, MultiPolygon, Point};
use tracing::info;

use crate::{config::Config, shapes};

/// A row of the STM stops layer.
#[derive(Debug, Clone)]
pub struct RawStop {
    pub code: Option<String>,
    pub id: String,
    pub name: Option<String>,
    pub point: Point<f64>,
}

/// STM bus stops and metro stations on the island, one per stop code.
pub fn load_transit_stops(config: &Config) -> Result<Vec<TransitStop>> {
    let island = MultiPolygon::new(
        shapes::load_polygons(&config.island_shp())?
            .into_iter()
            .flat_map(|(x, _)| x.0)
            .collect(),
    );

    let mut stops = Vec::new();
    for (point, record) in shapes::load_points(&config.stm_shp())? {
        stops.push(RawStop {
            code: shapes::field_string(&record, "stop_code")?,
            id: shapes::field_string(&record, "stop_id")?
                .ok_or_else(|| anyhow!("Stop without a stop_id"))?,
            name: shapes::field_string(&record, "stop_name")?,
            point,
        });
    }

    let total = stops.len();
    let output = select(stops, &island);
    info!("Kept {} of {total} STM stops", output.len());
    Ok(output)
}

/// Keeps stops strictly inside `island`, then the first stop of each code.
pub fn select(stops: Vec<RawStop>, island: &MultiPolygon<f64>) -> Vec<TransitStop> {
    let mut seen = HashSet::new();
    stops
        .into_iter()
        .filter(|x| island.contains(&x.point))
        .filter(|x| seen.insert(x.code.clone()))
        .map(|x| TransitStop {
            code: x.code.unwrap_or_default(),
            id: x.id,
            name: x.name.unwrap_or_default(),
            point: x.point,
        })
        .collect()
}
