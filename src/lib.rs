//! Null the black borders of mosaicked multiband rasters.
//!
//! A pixel is border when every band is zero there. Border pixels
//! become null in all bands at once, so a pixel that is dark in
//! some bands only is kept as it is.

pub mod cli;
mod components;
mod errors;
pub mod logging;
pub mod pipeline;

pub use components::{
    backends::{gdal_backend, memory_backend, RasterHandle, RasterSink, RasterSource},
    build_sum, compose, mask_band, mask_granule, CompositeOutput, Extent, GeoReference, Granule,
    MaskedBand, Pixel, Sample, SumRaster, DEFAULT_NULL,
};
pub use errors::{BorderError, ErrorKind, Result};
pub use pipeline::{Pipeline, RunOptions, RunSummary};
