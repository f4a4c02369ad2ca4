use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OsmId {
    Node(u64),
    Way(u64),
    Relation(u64),
}

/// OSM tag keys queried for points of interest, in flattening order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagKey {
    Amenity,
    Government,
    Leisure,
    Place,
    Shop,
    Station,
    Tourism,
}

impl TagKey {
    pub fn all() -> Vec<Self> {
        vec![
            TagKey::Amenity,
            TagKey::Government,
            TagKey::Leisure,
            TagKey::Place,
            TagKey::Shop,
            TagKey::Station,
            TagKey::Tourism,
        ]
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Amenity => "amenity",
            Self::Government => "government",
            Self::Leisure => "leisure",
            Self::Place => "place",
            Self::Shop => "shop",
            Self::Station => "station",
            Self::Tourism => "tourism",
        }
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
