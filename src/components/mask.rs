use log::debug;
use ndarray::{Array2, Zip};
use rayon::prelude::*;
use std::sync::Arc;

use crate::{
    components::{Extent, GeoReference, Granule, Sample, SumRaster},
    errors::{BorderError, Result},
};

/// A band with its granule's border pixels set to null.
#[derive(Debug, Clone)]
pub struct MaskedBand<T: Sample> {
    /// 1-based position of the band in its granule.
    index: usize,
    values: Array2<T>,
    null: T,
    georeference: Arc<GeoReference>,
}

impl<T: Sample> MaskedBand<T> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn values(&self) -> &Array2<T> {
        &self.values
    }

    pub fn null(&self) -> T {
        self.null
    }

    pub fn extent(&self) -> Extent {
        Extent::of(&self.values)
    }

    pub fn georeference(&self) -> &Arc<GeoReference> {
        &self.georeference
    }

    pub fn is_null(&self, row: usize, col: usize) -> bool {
        self.values[[row, col]] == self.null
    }

    pub fn into_values(self) -> Array2<T> {
        self.values
    }
}

/// Null every pixel of `band` that is border according to `sum`.
///
/// The band's own values play no part in the decision.
pub fn mask_band<T: Sample>(
    index: usize,
    band: &Array2<T>,
    sum: &SumRaster,
    null: T,
) -> Result<MaskedBand<T>> {
    let expected = Extent::of(band);
    let found = sum.extent();
    if found != expected {
        return Err(BorderError::GeometryMismatch {
            what: format!("sum raster for band {index}"),
            expected,
            found,
        });
    }

    let values = Zip::from(band)
        .and(&**sum)
        .map_collect(|&value, &total| if total == 0 { null } else { value });

    Ok(MaskedBand {
        index,
        values,
        null,
        georeference: Arc::clone(sum.georeference()),
    })
}

/// Mask all bands of `granule` against one shared `sum`, in band order.
pub fn mask_granule<T: Sample>(
    granule: &Granule<T>,
    sum: &SumRaster,
    null: T,
) -> Result<Vec<MaskedBand<T>>> {
    let masked = granule
        .bands()
        .par_iter()
        .enumerate()
        .map(|(idx, band)| {
            debug!("{}: masking band {}", granule.id(), idx + 1);
            mask_band(idx + 1, band, sum, null)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(masked)
}
