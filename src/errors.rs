use std::path::PathBuf;

use crate::components::{Extent, Pixel};

pub type Result<T> = std::result::Result<T, BorderError>;

/// Coarse classification of [BorderError]s,
/// used by the pipeline to decide between skipping, retrying and aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    GeometryMismatch,
    BandCountMismatch,
    RasterIo,
    OutputCollision,
    Runtime,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::GeometryMismatch => "GeometryMismatch",
            ErrorKind::BandCountMismatch => "BandCountMismatch",
            ErrorKind::RasterIo => "RasterIOError",
            ErrorKind::OutputCollision => "OutputCollision",
            ErrorKind::Runtime => "RuntimeError",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BorderError {
    #[error("{what} is {found}, expected {expected}")]
    GeometryMismatch {
        what: String,
        expected: Extent,
        found: Extent,
    },
    #[error("{what} is not georeferenced like the rest of the granule")]
    GeoreferenceMismatch { what: String },
    #[error("expected {expected} bands, found {found}")]
    BandCountMismatch { expected: usize, found: usize },
    #[error("band {band} is {found} while band 1 is {expected}, bands can not be stacked")]
    MisalignedBands {
        band: usize,
        expected: Extent,
        found: Extent,
    },
    #[error("{0} bands of this sample type can not be summed without overflow")]
    TooManyBands(usize),
    #[error("{0} already exists")]
    OutputCollision(PathBuf),
    #[error("no raster at {0}")]
    MissingRaster(PathBuf),
    #[error("band {band} holds {found} samples, only 8 bit samples or 16 bit ones with no-data {null} are read")]
    UnsupportedSamples {
        band: usize,
        found: String,
        null: Pixel,
    },
    #[error(transparent)]
    GdalError(#[from] gdal::errors::GdalError),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    NdarrayError(#[from] ndarray::ShapeError),
    #[error(transparent)]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
}

impl BorderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BorderError::GeometryMismatch { .. } | BorderError::GeoreferenceMismatch { .. } => {
                ErrorKind::GeometryMismatch
            }
            BorderError::BandCountMismatch { .. }
            | BorderError::MisalignedBands { .. }
            | BorderError::TooManyBands(_) => ErrorKind::BandCountMismatch,
            BorderError::OutputCollision(_) => ErrorKind::OutputCollision,
            BorderError::MissingRaster(_)
            | BorderError::UnsupportedSamples { .. }
            | BorderError::GdalError(_)
            | BorderError::IoError(_)
            | BorderError::NdarrayError(_) => ErrorKind::RasterIo,
            BorderError::ThreadPoolError(_) => ErrorKind::Runtime,
        }
    }

    /// Whether reprocessing the granule from scratch could succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::RasterIo
            && !matches!(self, BorderError::UnsupportedSamples { .. })
    }
}
