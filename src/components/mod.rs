pub mod backends;
pub mod compose;
pub mod georef;
pub mod granule;
pub mod mask;
pub mod sum;

pub use backends::{RasterHandle, RasterSink, RasterSource};
pub use compose::{compose, CompositeOutput};
pub use georef::GeoReference;
pub use granule::{Extent, Granule};
pub use mask::{mask_band, mask_granule, MaskedBand};
pub use sum::{build_sum, SumRaster};

use gdal::raster::GdalType;
use num_traits::Bounded;
use std::fmt::Debug;

/// Pixel type the pipeline reads granules as.
///
/// Source imagery is 8 bit, reading it widened leaves room
/// for a null sentinel that no real sample can take.
pub type Pixel = u16;

/// Default null sentinel, the first value past the 8 bit range.
pub const DEFAULT_NULL: Pixel = 256;

/// Unsigned sample types a band can hold.
///
/// `Into<u32>` is what lets band sums stay exact.
pub trait Sample:
    GdalType + Bounded + Into<u32> + PartialEq + Copy + Send + Sync + Debug + 'static
{
}

impl<T> Sample for T where
    T: GdalType + Bounded + Into<u32> + PartialEq + Copy + Send + Sync + Debug + 'static
{
}
