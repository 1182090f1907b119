//! RD New (EPSG:28992) <-> WGS84 (EPSG:4326) coordinate transform on top of
//! `proj4rs`.
//!
//! The datum shift uses the 7-parameter `+towgs84` values published with
//! EPSG:28992. Geographic positions lie on the WGS84 ellipsoid (height zero);
//! on the way in, the matching Bessel height is solved for so both directions
//! are exact inverses of each other.
//!
//! Projected coordinates are `x`/`y` in metres, geographic coordinates are
//! `x = longitude`, `y = latitude` in degrees (GeoJSON order).

use geo_types::Coord;
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::error::{Error, MalformedInput, Result};

pub const RD_NEW_PROJ: &str = "+proj=sterea +lat_0=52.15616055555555 +lon_0=5.38763888888889 \
    +k=0.9999079 +x_0=155000 +y_0=463000 +ellps=bessel \
    +towgs84=565.417,50.3319,465.552,-0.398957,0.343988,-1.8774,4.0725 +units=m +no_defs";

pub const WGS84_PROJ: &str = "+proj=longlat +ellps=WGS84 +datum=WGS84 +no_defs";

/// Transform passes used to solve the Bessel height, the last one included.
const HEIGHT_PASSES: usize = 3;

/// Both ends of the RD New <-> WGS84 transform, parsed once per batch.
pub struct RdNew {
    projected: Proj,
    geographic: Proj,
}

impl RdNew {
    pub fn new() -> Result<Self> {
        Ok(Self {
            projected: Proj::from_proj_string(RD_NEW_PROJ).map_err(projection_error)?,
            geographic: Proj::from_proj_string(WGS84_PROJ).map_err(projection_error)?,
        })
    }

    /// RD New `x`/`y` -> WGS84 longitude/latitude.
    pub fn to_geographic(&self, coord: Coord) -> Result<Coord> {
        ensure_finite(coord)?;
        let mut height = 0.0;
        for _ in 1..HEIGHT_PASSES {
            let mut point = (coord.x, coord.y, height);
            transform(&self.projected, &self.geographic, &mut point).map_err(projection_error)?;
            height -= point.2;
        }
        let mut point = (coord.x, coord.y, height);
        transform(&self.projected, &self.geographic, &mut point).map_err(projection_error)?;
        finite_output(point.0.to_degrees(), point.1.to_degrees())
    }

    /// WGS84 longitude/latitude -> RD New `x`/`y`.
    pub fn to_projected(&self, coord: Coord) -> Result<Coord> {
        ensure_finite(coord)?;
        let mut point = (coord.x.to_radians(), coord.y.to_radians(), 0.0);
        transform(&self.geographic, &self.projected, &mut point).map_err(projection_error)?;
        finite_output(point.0, point.1)
    }
}

/// Converts RD New coordinates to WGS84 longitude/latitude.
pub fn project_to_geographic(points: &[Coord]) -> Result<Vec<Coord>> {
    if points.is_empty() {
        return Ok(Vec::new());
    }
    let rd = RdNew::new()?;
    points.iter().map(|&point| rd.to_geographic(point)).collect()
}

/// Converts WGS84 longitude/latitude to RD New coordinates.
pub fn project_to_projected(points: &[Coord]) -> Result<Vec<Coord>> {
    if points.is_empty() {
        return Ok(Vec::new());
    }
    let rd = RdNew::new()?;
    points.iter().map(|&point| rd.to_projected(point)).collect()
}

pub fn rd_to_wgs84(point: Coord) -> Result<Coord> {
    RdNew::new()?.to_geographic(point)
}

pub fn wgs84_to_rd(point: Coord) -> Result<Coord> {
    RdNew::new()?.to_projected(point)
}

fn ensure_finite(coord: Coord) -> Result<()> {
    if coord.x.is_finite() && coord.y.is_finite() {
        Ok(())
    } else {
        Err(MalformedInput::InvalidCoordinate(format!("({}, {})", coord.x, coord.y)).into())
    }
}

fn finite_output(x: f64, y: f64) -> Result<Coord> {
    if x.is_finite() && y.is_finite() {
        Ok(Coord { x, y })
    } else {
        Err(Error::Projection(format!("result ({x}, {y}) is out of range")))
    }
}

fn projection_error(err: impl std::fmt::Display) -> Error {
    Error::Projection(err.to_string())
}
