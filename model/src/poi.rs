use geo::Point;

#[derive(Debug, Clone, PartialEq)]
pub struct Poi {
    pub name: Option<String>,
    /// Source-specific category, e.g. `Bakery` (DOM) or `library` (OSM).
    pub kind: String,
    /// Coarse category resolved from `kind`. Empty until combined.
    pub group: Option<String>,
    pub city: Option<String>,
    pub point: Point<f64>,
}

impl Poi {
    pub fn new(
        name: Option<String>,
        kind: String,
        city: Option<String>,
        point: Point<f64>,
    ) -> Self {
        Self {
            name,
            kind,
            group: None,
            city,
            point,
        }
    }
}
