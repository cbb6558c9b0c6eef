use log::info;
use ndarray::Array2;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    components::{Extent, GeoReference, MaskedBand, RasterSink, Sample},
    errors::{BorderError, Result},
};

/// A composite as it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeOutput {
    pub path: PathBuf,
    pub band_count: usize,
    pub extent: Extent,
    pub georeference: Arc<GeoReference>,
    /// No-data value of every band.
    pub null: u32,
}

/// Stack `bands`, in the given order, into one raster at `output_path`.
///
/// All bands must share extent and georeference. The null of the
/// first band becomes the no-data value of the whole composite.
pub fn compose<T: Sample, S: RasterSink>(
    bands: &[MaskedBand<T>],
    output_path: &Path,
    sink: &S,
    overwrite: bool,
) -> Result<CompositeOutput> {
    let first = bands.first().ok_or(BorderError::BandCountMismatch {
        expected: 1,
        found: 0,
    })?;
    let extent = first.extent();
    for (idx, band) in bands.iter().enumerate().skip(1) {
        let found = band.extent();
        if found != extent {
            return Err(BorderError::MisalignedBands {
                band: idx + 1,
                expected: extent,
                found,
            });
        }
        if band.georeference() != first.georeference() {
            return Err(BorderError::GeoreferenceMismatch {
                what: format!("band {}", idx + 1),
            });
        }
    }

    if !overwrite && sink.exists(output_path) {
        return Err(BorderError::OutputCollision(output_path.to_path_buf()));
    }

    let grids: Vec<&Array2<T>> = bands.iter().map(MaskedBand::values).collect();
    sink.write(
        output_path,
        &grids,
        first.georeference(),
        Some(first.null()),
    )?;
    info!("composed {} bands into {:?}", bands.len(), output_path);

    Ok(CompositeOutput {
        path: output_path.to_path_buf(),
        band_count: bands.len(),
        extent,
        georeference: Arc::clone(first.georeference()),
        null: first.null().into(),
    })
}
