use geo::{AffineTransform, Coord, Rect};

use crate::components::Extent;

/// Spatial reference of a granule.
///
/// Carried through the pipeline untouched: whatever the source
/// raster declares is what the composite gets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeoReference {
    /// GDAL ordered geotransform, `None` for rasters without one.
    geo_transform: Option<[f64; 6]>,
    /// WKT, may be empty.
    projection: String,
}

fn affine_from_gdal(gdal_transform: [f64; 6]) -> AffineTransform {
    AffineTransform::new(
        gdal_transform[1],
        gdal_transform[2],
        gdal_transform[0],
        gdal_transform[4],
        gdal_transform[5],
        gdal_transform[3],
    )
}

impl GeoReference {
    pub fn new(geo_transform: Option<[f64; 6]>, projection: impl Into<String>) -> Self {
        Self {
            geo_transform,
            projection: projection.into(),
        }
    }

    pub fn geo_transform(&self) -> Option<[f64; 6]> {
        self.geo_transform
    }

    pub fn projection(&self) -> &str {
        &self.projection
    }

    /// Pixel to world transform.
    pub fn affine(&self) -> Option<AffineTransform> {
        self.geo_transform.map(affine_from_gdal)
    }

    /// World bounds covered by a raster of `extent` pixels.
    pub fn bounds(&self, extent: Extent) -> Option<Rect> {
        let affine = self.affine()?;
        let top_left = affine.apply(Coord { x: 0., y: 0. });
        let bottom_right = affine.apply(Coord {
            x: extent.width as f64,
            y: extent.height as f64,
        });
        Some(Rect::new(top_left, bottom_right))
    }
}
