//! Coordinate reference systems.
//!
//! Everything is processed in EPSG:32188 (NAD83 / MTM zone 8), a transverse
//! Mercator projection in metres. Inputs are either already in that CRS or
//! geographic longitude/latitude (NAD83 or WGS84, which agree to within a metre
//! here and are treated as the same datum).

use std::fs;
use std::path::{Path, PathBuf};

use geo::{Coord, MapCoordsInPlace};
use proj4rs::{transform::Transform, Proj};
use thiserror::Error;

/// Proj definition of EPSG:32188.
pub const WORKING_PROJ: &str =
    "+proj=tmerc +lat_0=0 +lon_0=-73.5 +k=0.9999 +x_0=304800 +y_0=0 +ellps=GRS80 +units=m +no_defs";

/// Proj definition of NAD83 longitude/latitude.
pub const GEOGRAPHIC_PROJ: &str = "+proj=longlat +ellps=GRS80 +no_defs";

#[derive(Debug, Error)]
pub enum CrsError {
    #[error("no .prj file next to {0:?}; its CRS is unknown")]
    Missing(PathBuf),
    #[error("failed to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported CRS in {path:?}: {name}")]
    Unsupported { path: PathBuf, name: String },
    #[error("reprojection failed")]
    Proj(#[from] proj4rs::errors::Error),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Crs {
    /// Longitude/latitude degrees.
    Geographic,
    /// EPSG:32188, the working CRS.
    Mtm8,
}

impl Crs {
    /// Reads the `.prj` sidecar of a shapefile.
    pub fn from_shapefile(shp: &Path) -> Result<Self, CrsError> {
        let prj = shp.with_extension("prj");
        if !prj.is_file() {
            return Err(CrsError::Missing(shp.to_path_buf()));
        }
        let wkt = fs::read_to_string(&prj).map_err(|source| CrsError::Read {
            path: prj.clone(),
            source,
        })?;
        Self::from_wkt(&wkt).ok_or_else(|| CrsError::Unsupported {
            path: prj,
            name: wkt_name(&wkt),
        })
    }

    /// Recognises geographic CRSs and the MTM zone 8 projection (any NAD83
    /// realisation) from ESRI or OGC WKT.
    pub fn from_wkt(wkt: &str) -> Option<Self> {
        let wkt = wkt.trim().to_uppercase();
        if wkt.starts_with("GEOGCS") || wkt.starts_with("GEOGCRS") {
            return Some(Self::Geographic);
        }
        let mtm8 = ["MTM_8", "MTM ZONE 8", "MTM_ZONE_8", "\"32188\""];
        if (wkt.starts_with("PROJCS") || wkt.starts_with("PROJCRS"))
            && mtm8.iter().any(|x| wkt.contains(x))
        {
            return Some(Self::Mtm8);
        }
        None
    }

    pub fn definition(self) -> &'static str {
        match self {
            Self::Geographic => GEOGRAPHIC_PROJ,
            Self::Mtm8 => WORKING_PROJ,
        }
    }
}

/// Reprojects geometries from one CRS into the working CRS.
pub struct Reprojector {
    /// `None` when the source already is the working CRS.
    source: Option<Proj>,
    working: Proj,
}

impl Reprojector {
    pub fn new(crs: Crs) -> Result<Self, CrsError> {
        let source = match crs {
            Crs::Mtm8 => None,
            x => Some(Proj::from_proj_string(x.definition())?),
        };
        Ok(Self {
            source,
            working: Proj::from_proj_string(WORKING_PROJ)?,
        })
    }

    pub fn apply<G>(&self, geometry: &mut G) -> Result<(), CrsError>
    where
        G: Transform + MapCoordsInPlace<f64>,
    {
        let Some(source) = &self.source else {
            return Ok(());
        };
        // proj works in radians
        if source.is_latlong() {
            geometry.map_coords_in_place(|c| Coord {
                x: c.x.to_radians(),
                y: c.y.to_radians(),
            });
        }
        proj4rs::transform::transform(source, &self.working, geometry)?;
        Ok(())
    }

    /// Owned variant of [`Reprojector::apply`].
    pub fn reproject<G>(&self, mut geometry: G) -> Result<G, CrsError>
    where
        G: Transform + MapCoordsInPlace<f64>,
    {
        self.apply(&mut geometry)?;
        Ok(geometry)
    }
}

fn wkt_name(wkt: &str) -> String {
    wkt.split('"').nth(1).unwrap_or(wkt).to_string()
}
