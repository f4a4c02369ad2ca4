use geo::{Centroid, Point, Polygon};

/// One hexagon of the analysis grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub id: u32,
    /// Borough or municipality containing the cell's centroid.
    pub subdivision: String,
    pub geometry: Polygon<f64>,
}

impl GridCell {
    pub fn centroid(&self) -> Option<Point<f64>> {
        self.geometry.centroid()
    }
}
