use _model::GridCell;
use anyhow::{anyhow, Result};
use geo::{
    BoundingRect, Centroid, Contains, Coord, Intersects, LineString, MultiPolygon, Point, Polygon,
    Rect,
};
use rstar::{RTree, RTreeObject, AABB};
use tracing::{debug, info};

use crate::{config::Config, shapes};

/// Subdivision name field in the agglomeration shapefile.
const NAME_FIELD: &str = "NOM";

pub struct Subdivision {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

/// A polygon in an R-tree, remembering which layer row it came from.
struct Indexed {
    row: usize,
    polygon: Polygon<f64>,
    envelope: AABB<[f64; 2]>,
}

impl Indexed {
    fn new(row: usize, polygon: Polygon<f64>) -> Option<Self> {
        let envelope = aabb(polygon.bounding_rect()?);
        Some(Self {
            row,
            polygon,
            envelope,
        })
    }
}

impl RTreeObject for Indexed {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn aabb(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

fn index<'a>(layer: impl Iterator<Item = &'a MultiPolygon<f64>>) -> RTree<Indexed> {
    let mut polygons = Vec::new();
    for (row, geometry) in layer.enumerate() {
        polygons.extend(
            geometry
                .iter()
                .filter_map(|p| Indexed::new(row, p.clone())),
        );
    }
    RTree::bulk_load(polygons)
}

/// Builds the hex grid from the island and agglomeration shapefiles.
pub fn create_grid(config: &Config) -> Result<Vec<GridCell>> {
    let island = MultiPolygon::new(
        shapes::load_polygons(&config.island_shp())?
            .into_iter()
            .flat_map(|(x, _)| x.0)
            .collect(),
    );

    let mut subdivisions = Vec::new();
    for (geometry, record) in shapes::load_polygons(&config.agglo_shp())? {
        let name = shapes::field_string(&record, NAME_FIELD)?
            .ok_or_else(|| anyhow!("Subdivision without a {NAME_FIELD}"))?;
        subdivisions.push(Subdivision { name, geometry });
    }
    info!(
        "Loaded {} island polygons and {} subdivisions",
        island.0.len(),
        subdivisions.len()
    );

    Ok(build(&island, &subdivisions, config.hex_radius))
}

/// Hexagons of circumradius `radius` covering `island`, each labelled with the
/// subdivision containing its centroid. Ids count every hexagon touching the
/// island, so cells dropped for having no subdivision leave gaps.
pub fn build(
    island: &MultiPolygon<f64>,
    subdivisions: &[Subdivision],
    radius: f64,
) -> Vec<GridCell> {
    let hexagons = tessellate(island, radius);
    let tree = index(subdivisions.iter().map(|x| &x.geometry));

    let mut cells = Vec::new();
    let mut dropped = 0usize;
    for (id, hexagon) in hexagons.into_iter().enumerate() {
        let subdivision = hexagon
            .centroid()
            .and_then(|c| locate(&tree, &c))
            .map(|row| subdivisions[row].name.clone());

        match subdivision {
            Some(subdivision) => cells.push(GridCell {
                id: id as u32,
                subdivision,
                geometry: hexagon,
            }),
            None => {
                debug!(id, "cell centroid is outside every subdivision");
                dropped += 1;
            }
        }
    }

    info!(
        "Built {} grid cells (dropped {dropped} without a subdivision)",
        cells.len()
    );
    cells
}

/// Row of the first subdivision, in layer order, containing `point`.
fn locate(tree: &RTree<Indexed>, point: &Point<f64>) -> Option<usize> {
    tree.locate_in_envelope_intersecting(&AABB::from_point([point.x(), point.y()]))
        .filter(|x| x.polygon.contains(point))
        .map(|x| x.row)
        .min()
}

/// Flat-topped hexagons over the bounding box of `area`, keeping those that
/// intersect it. Column-major order, west to east then south to north.
pub fn tessellate(area: &MultiPolygon<f64>, radius: f64) -> Vec<Polygon<f64>> {
    let bounds = match area.bounding_rect() {
        Some(x) => x,
        None => return Vec::new(),
    };
    let tree = index(std::iter::once(area));

    let dx = 1.5 * radius;
    let dy = 3f64.sqrt() * radius;

    let mut output = Vec::new();
    let mut column = 0usize;
    loop {
        let x = bounds.min().x + dx * column as f64;
        if x - radius >= bounds.max().x {
            break;
        }
        let offset = if column % 2 == 1 { dy / 2.0 } else { 0.0 };

        let mut row = -1i64;
        loop {
            let y = bounds.min().y + offset + dy * row as f64;
            if y - dy / 2.0 >= bounds.max().y {
                break;
            }
            let hexagon = hexagon(Coord { x, y }, radius);
            let envelope = aabb(hexagon.bounding_rect().unwrap_or(bounds));
            if tree
                .locate_in_envelope_intersecting(&envelope)
                .any(|x| x.polygon.intersects(&hexagon))
            {
                output.push(hexagon);
            }
            row += 1;
        }
        column += 1;
    }
    output
}

/// Flat-topped regular hexagon with circumradius `radius`.
pub fn hexagon(center: Coord<f64>, radius: f64) -> Polygon<f64> {
    let mut ring: Vec<Coord<f64>> = (0..6)
        .map(|i| {
            let angle = (60.0 * i as f64).to_radians();
            Coord {
                x: center.x + radius * angle.cos(),
                y: center.y + radius * angle.sin(),
            }
        })
        .collect();
    ring.push(ring[0]);
    Polygon::new(LineString::new(ring), Vec::new())
}
