use geo::Point;

#[derive(Debug, Clone, PartialEq)]
pub struct TransitStop {
    /// Rider-facing stop code, unique per output.
    pub code: String,
    pub id: String,
    pub name: String,
    pub point: Point<f64>,
}
