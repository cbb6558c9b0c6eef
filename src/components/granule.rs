use geo::Rect;
use log::info;
use ndarray::Array2;
use std::{fmt::Debug, sync::Arc};

use crate::components::{GeoReference, Sample};

/// Pixel size of a grid, (width, height).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: usize,
    pub height: usize,
}

impl Extent {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn of<T>(grid: &Array2<T>) -> Self {
        let (height, width) = grid.dim();
        Self { width, height }
    }

    /// Array shape (H, W).
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn size(&self) -> usize {
        self.width * self.height
    }
}

impl std::fmt::Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One mosaicked multiband raster.
///
/// Bands are kept in source order, band `i` of the raster
/// is `bands()[i - 1]`. Extents are not checked on construction,
/// [build_sum](crate::components::build_sum) does that.
#[derive(Clone)]
pub struct Granule<T: Sample> {
    id: String,
    georeference: Arc<GeoReference>,
    bands: Vec<Array2<T>>,
}

impl<T: Sample> Debug for Granule<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let extents: Vec<String> = self
            .bands
            .iter()
            .map(|band| Extent::of(band).to_string())
            .collect();
        f.debug_struct("Granule")
            .field("id", &self.id)
            .field("bands", &extents)
            .field("geo_bounds", &self.bounds())
            .finish()
    }
}

impl<T: Sample> Granule<T> {
    pub fn new(id: impl Into<String>, georeference: GeoReference, bands: Vec<Array2<T>>) -> Self {
        let granule = Self {
            id: id.into(),
            georeference: Arc::new(georeference),
            bands,
        };
        info!("new {granule:?}");
        granule
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn georeference(&self) -> &Arc<GeoReference> {
        &self.georeference
    }

    pub fn bands(&self) -> &[Array2<T>] {
        &self.bands
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Extent of the first band.
    pub fn extent(&self) -> Option<Extent> {
        self.bands.first().map(Extent::of)
    }

    /// World bounds of the first band.
    pub fn bounds(&self) -> Option<Rect> {
        self.georeference.bounds(self.extent()?)
    }
}
