use core::fmt;

mod cell;
mod osm;
mod poi;
mod stop;

pub use cell::GridCell;
pub use osm::{OsmId, TagKey};
pub use poi::Poi;
pub use stop::TransitStop;

/// Where a point of interest was sourced from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Source {
    /// Données ouvertes Montréal, the city's open data portal.
    Dom,
    /// OpenStreetMap.
    Osm,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Source {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dom => "DOM",
            Self::Osm => "OSM",
        }
    }

    /// Key of this source in the group mappings file.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Dom => "dom",
            Self::Osm => "osm",
        }
    }
}

/// Categorical columns of the DOM datasets that are translated from French.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Family,
    Category,
    Type,
    Status,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl Field {
    /// Key of this field in the translations file.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Family => "family",
            Self::Category => "category",
            Self::Type => "type",
            Self::Status => "status",
        }
    }
}
