use std::path::{Path, PathBuf};

use crate::{
    components::{RasterHandle, RasterSink},
    errors::Result,
};

pub const SUM_DIR: &str = "summed_band_images";
pub const MASKED_DIR: &str = "nulled_singleband_images";
pub const COMPOSITE_EXTENSION: &str = "tif";

/// Where a granule is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Mosaicked granule read from the source.
    Mosaicked,
    Summed,
    Masked,
    Composed,
    /// Run level intermediates removed.
    Cleaned,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Mosaicked => "mosaicked",
            Stage::Summed => "summed",
            Stage::Masked => "masked",
            Stage::Composed => "composed",
            Stage::Cleaned => "cleaned",
        };
        f.write_str(name)
    }
}

/// Directory layout of one run.
#[derive(Debug, Clone)]
pub struct Workspace {
    output_dir: PathBuf,
    sum_dir: PathBuf,
    masked_dir: PathBuf,
}

impl Workspace {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        let output_dir = output_dir.as_ref().to_path_buf();
        Self {
            sum_dir: output_dir.join(SUM_DIR),
            masked_dir: output_dir.join(MASKED_DIR),
            output_dir,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Working directories, removed once every granule is composed.
    pub fn intermediate_dirs(&self) -> [&Path; 2] {
        [&self.sum_dir, &self.masked_dir]
    }

    pub fn prepare<S: RasterSink>(&self, sink: &S, with_intermediates: bool) -> Result<()> {
        sink.prepare_dir(&self.output_dir)?;
        if with_intermediates {
            for dir in self.intermediate_dirs() {
                sink.prepare_dir(dir)?;
            }
        }
        Ok(())
    }

    pub fn clean<S: RasterSink>(&self, sink: &S) -> Result<()> {
        for dir in self.intermediate_dirs() {
            sink.remove_dir(dir)?;
        }
        Ok(())
    }

    pub fn context(&self, raster: RasterHandle) -> GranuleContext {
        let id = raster.id();
        GranuleContext {
            sum_path: self.sum_dir.join(format!("{id}_sum.{COMPOSITE_EXTENSION}")),
            masked_dir: self.masked_dir.clone(),
            composite_path: self
                .output_dir
                .join(format!("{id}.{COMPOSITE_EXTENSION}")),
            raster,
            stage: Stage::Mosaicked,
            band_count: 0,
        }
    }
}

/// Everything the pipeline knows about one granule while it runs.
#[derive(Debug, Clone)]
pub struct GranuleContext {
    raster: RasterHandle,
    sum_path: PathBuf,
    masked_dir: PathBuf,
    composite_path: PathBuf,
    /// Stage being worked towards.
    stage: Stage,
    band_count: usize,
}

impl GranuleContext {
    pub fn id(&self) -> &str {
        self.raster.id()
    }

    pub fn raster(&self) -> &RasterHandle {
        &self.raster
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn enter(&mut self, stage: Stage) {
        self.stage = stage;
    }

    pub fn set_band_count(&mut self, band_count: usize) {
        self.band_count = band_count;
    }

    pub fn sum_path(&self) -> &Path {
        &self.sum_path
    }

    /// Masked single band raster for band `index` (1-based).
    pub fn band_path(&self, index: usize) -> PathBuf {
        self.masked_dir
            .join(format!("{}_Band_{index}.{COMPOSITE_EXTENSION}", self.id()))
    }

    pub fn composite_path(&self) -> &Path {
        &self.composite_path
    }

    /// Intermediate artifacts this granule may have written so far.
    pub fn intermediate_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.sum_path.clone()];
        paths.extend((1..=self.band_count).map(|idx| self.band_path(idx)));
        paths
    }
}
