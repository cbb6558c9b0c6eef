use log::debug;
use ndarray::{Array2, Zip};
use shrinkwraprs::Shrinkwrap;
use std::sync::Arc;

use crate::{
    components::{Extent, GeoReference, Granule, Sample},
    errors::{BorderError, Result},
};

/// Per pixel sum of every band of a granule.
///
/// Sums are exact, so a pixel is zero here iff it is zero
/// in all bands. That zero is the border signal shared by
/// every band of the granule.
#[derive(Shrinkwrap, Debug, Clone)]
pub struct SumRaster {
    #[shrinkwrap(main_field)]
    sums: Array2<u32>,
    georeference: Arc<GeoReference>,
}

impl SumRaster {
    pub fn new(sums: Array2<u32>, georeference: Arc<GeoReference>) -> Self {
        Self {
            sums,
            georeference,
        }
    }

    pub fn extent(&self) -> Extent {
        Extent::of(&self.sums)
    }

    pub fn georeference(&self) -> &Arc<GeoReference> {
        &self.georeference
    }

    pub fn is_border(&self, row: usize, col: usize) -> bool {
        self.sums[[row, col]] == 0
    }

    /// Number of border pixels.
    pub fn border_count(&self) -> usize {
        self.sums.iter().filter(|sum| **sum == 0).count()
    }
}

/// Sum all bands of `granule` pixel by pixel.
pub fn build_sum<T: Sample>(granule: &Granule<T>) -> Result<SumRaster> {
    let bands = granule.bands();
    let first = bands.first().ok_or(BorderError::BandCountMismatch {
        expected: 1,
        found: 0,
    })?;

    let max_sample: u32 = T::max_value().into();
    if bands.len() > (u32::MAX / max_sample) as usize {
        return Err(BorderError::TooManyBands(bands.len()));
    }

    let extent = Extent::of(first);
    for (idx, band) in bands.iter().enumerate().skip(1) {
        let found = Extent::of(band);
        if found != extent {
            return Err(BorderError::GeometryMismatch {
                what: format!("band {} of {}", idx + 1, granule.id()),
                expected: extent,
                found,
            });
        }
    }

    let mut sums = Array2::<u32>::zeros(extent.shape());
    for band in bands {
        Zip::from(&mut sums)
            .and(band)
            .for_each(|sum, &value| *sum += value.into());
    }

    let sum_raster = SumRaster::new(sums, Arc::clone(granule.georeference()));
    debug!(
        "{}: {} of {} pixels are border",
        granule.id(),
        sum_raster.border_count(),
        extent.size()
    );
    Ok(sum_raster)
}
