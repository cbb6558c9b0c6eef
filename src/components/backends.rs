use ndarray::Array2;
use std::{
    fmt::Debug,
    path::{Path, PathBuf},
};

use crate::{
    components::{GeoReference, Granule, Pixel, Sample},
    errors::Result,
};

/// A raster found by a [RasterSource], identified by its file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RasterHandle {
    id: String,
    path: PathBuf,
}

impl RasterHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { id, path }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Where granules are read from.
pub trait RasterSource: Sync + Debug {
    /// Rasters directly inside `dir`, sorted by path.
    fn list_rasters(&self, dir: &Path) -> Result<Vec<RasterHandle>>;
    fn band_count(&self, raster: &RasterHandle) -> Result<usize>;
    fn georeference(&self, raster: &RasterHandle) -> Result<GeoReference>;
    /// Read band `index` (1-based) as a (H, W) grid.
    fn read_band(&self, raster: &RasterHandle, index: usize) -> Result<Array2<Pixel>>;

    fn read_granule(&self, raster: &RasterHandle) -> Result<Granule<Pixel>> {
        let georeference = self.georeference(raster)?;
        let bands = (1..=self.band_count(raster)?)
            .map(|idx| self.read_band(raster, idx))
            .collect::<Result<Vec<_>>>()?;
        Ok(Granule::new(raster.id(), georeference, bands))
    }
}

/// Where rasters are written to.
pub trait RasterSink: Sync + Debug {
    fn exists(&self, path: &Path) -> bool;
    /// Write `bands` as one raster, in order, all sharing `georeference`.
    ///
    /// Either the whole raster lands at `path` or nothing does.
    fn write<T: Sample>(
        &self,
        path: &Path,
        bands: &[&Array2<T>],
        georeference: &GeoReference,
        nodata: Option<T>,
    ) -> Result<()>;
    fn remove(&self, path: &Path) -> Result<()>;
    fn prepare_dir(&self, dir: &Path) -> Result<()>;
    /// Remove `dir` and everything in it.
    fn remove_dir(&self, dir: &Path) -> Result<()>;
}

/// Implementations for gdal
pub mod gdal_backend {
    use super::*;
    use crate::errors::BorderError;
    use crate::components::DEFAULT_NULL;
    use gdal::{
        cpl::CslStringList,
        raster::{Buffer, GdalType},
        Dataset as GdalDataset, DriverManager,
    };
    use log::debug;
    use std::{ffi::OsString, fs};

    pub const RASTER_EXTENSIONS: [&str; 5] = ["tif", "tiff", "img", "jp2", "vrt"];

    fn is_raster(path: &Path) -> bool {
        path.is_file()
            && path.extension().is_some_and(|extension| {
                let extension = extension.to_string_lossy().to_lowercase();
                RASTER_EXTENSIONS.contains(&extension.as_str())
            })
    }

    fn open(raster: &RasterHandle) -> Result<GdalDataset> {
        if !raster.path().is_file() {
            return Err(BorderError::MissingRaster(raster.path().to_path_buf()));
        }
        Ok(GdalDataset::open(raster.path())?)
    }

    fn georeference_gdal(dataset: &GdalDataset) -> GeoReference {
        GeoReference::new(dataset.geo_transform().ok(), dataset.projection())
    }

    /// Read band `index` widened to [Pixel].
    ///
    /// 8 bit bands are read as they are. 16 bit bands only when their
    /// no-data is `null`, as in composites of an earlier run, since any
    /// other 16 bit sample could equal the null value or be truncated.
    fn read_band_gdal(dataset: &GdalDataset, index: usize, null: Pixel) -> Result<Array2<Pixel>> {
        let rasterband = dataset.rasterband(index)?;
        let band_type = rasterband.band_type();
        let accepted = if band_type as u32 == u8::gdal_ordinal() {
            true
        } else if band_type as u32 == Pixel::gdal_ordinal() {
            rasterband.no_data_value() == Some(f64::from(null))
        } else {
            false
        };
        if !accepted {
            return Err(BorderError::UnsupportedSamples {
                band: index,
                found: format!("{band_type:?}"),
                null,
            });
        }
        let width = rasterband.x_size();
        let height = rasterband.y_size();
        let buffer = rasterband.read_as::<Pixel>((0, 0), (width, height), (width, height), None)?;
        Ok(Array2::from_shape_vec(
            (height, width),
            buffer.data().to_vec(),
        )?)
    }

    /// Reads granules from files GDAL can open.
    #[derive(Debug, Clone, Copy)]
    pub struct GdalSource {
        null: Pixel,
    }

    impl Default for GdalSource {
        fn default() -> Self {
            Self::new(DEFAULT_NULL)
        }
    }

    impl GdalSource {
        /// A source accepting 16 bit bands whose no-data is `null`.
        pub fn new(null: Pixel) -> Self {
            Self { null }
        }
    }

    impl RasterSource for GdalSource {
        fn list_rasters(&self, dir: &Path) -> Result<Vec<RasterHandle>> {
            let mut paths = Vec::new();
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if is_raster(&path) {
                    paths.push(path);
                }
            }
            paths.sort();
            Ok(paths.into_iter().map(RasterHandle::new).collect())
        }
        fn band_count(&self, raster: &RasterHandle) -> Result<usize> {
            Ok(open(raster)?.raster_count())
        }
        fn georeference(&self, raster: &RasterHandle) -> Result<GeoReference> {
            Ok(georeference_gdal(&open(raster)?))
        }
        fn read_band(&self, raster: &RasterHandle, index: usize) -> Result<Array2<Pixel>> {
            read_band_gdal(&open(raster)?, index, self.null)
        }
        fn read_granule(&self, raster: &RasterHandle) -> Result<Granule<Pixel>> {
            let dataset = open(raster)?;
            let bands = (1..=dataset.raster_count())
                .map(|idx| read_band_gdal(&dataset, idx, self.null))
                .collect::<Result<Vec<_>>>()?;
            Ok(Granule::new(
                raster.id(),
                georeference_gdal(&dataset),
                bands,
            ))
        }
    }

    /// Writes GeoTIFFs.
    #[derive(Debug)]
    pub struct GdalSink {
        creation_options: Vec<String>,
    }

    impl Default for GdalSink {
        fn default() -> Self {
            Self::new(vec!["COMPRESS=LZW".to_string()])
        }
    }

    impl GdalSink {
        pub fn new(creation_options: Vec<String>) -> Self {
            Self { creation_options }
        }

        fn create<T: Sample>(
            &self,
            path: &Path,
            bands: &[&Array2<T>],
            georeference: &GeoReference,
            nodata: Option<T>,
        ) -> Result<()> {
            let (height, width) = bands.first().map(|band| band.dim()).ok_or(
                BorderError::BandCountMismatch {
                    expected: 1,
                    found: 0,
                },
            )?;

            let driver = DriverManager::get_driver_by_name("GTiff")?;
            let mut options = CslStringList::new();
            for option in &self.creation_options {
                options.add_string(option)?;
            }
            let mut dataset = driver.create_with_band_type_with_options::<T, _>(
                path,
                width,
                height,
                bands.len(),
                &options,
            )?;

            if let Some(geo_transform) = georeference.geo_transform() {
                dataset.set_geo_transform(&geo_transform)?;
            }
            if !georeference.projection().is_empty() {
                dataset.set_projection(georeference.projection())?;
            }

            for (idx, band) in bands.iter().enumerate() {
                let mut raster_band = dataset.rasterband(idx + 1)?;
                // logical order, whatever the array's memory layout
                let data: Vec<T> = band.iter().copied().collect();
                let mut buffer = Buffer::new((width, height), data);
                raster_band.write((0, 0), (width, height), &mut buffer)?;
                if let Some(nodata) = nodata {
                    let nodata: u32 = nodata.into();
                    raster_band.set_no_data_value(Some(f64::from(nodata)))?;
                }
            }
            Ok(())
        }
    }

    fn partial_path(path: &Path) -> PathBuf {
        let mut file_name = path.file_name().map(OsString::from).unwrap_or_default();
        file_name.push(".partial");
        path.with_file_name(file_name)
    }

    impl RasterSink for GdalSink {
        fn exists(&self, path: &Path) -> bool {
            path.exists()
        }
        fn write<T: Sample>(
            &self,
            path: &Path,
            bands: &[&Array2<T>],
            georeference: &GeoReference,
            nodata: Option<T>,
        ) -> Result<()> {
            let partial = partial_path(path);
            debug!("writing {} bands to {:?}", bands.len(), partial);
            // the dataset is closed, and flushed, when `create` returns
            let written = self
                .create(&partial, bands, georeference, nodata)
                .and_then(|()| Ok(fs::rename(&partial, path)?));
            if written.is_err() && partial.exists() {
                fs::remove_file(&partial).ok();
            }
            written
        }
        fn remove(&self, path: &Path) -> Result<()> {
            if path.exists() {
                fs::remove_file(path)?;
            }
            Ok(())
        }
        fn prepare_dir(&self, dir: &Path) -> Result<()> {
            Ok(fs::create_dir_all(dir)?)
        }
        fn remove_dir(&self, dir: &Path) -> Result<()> {
            if dir.exists() {
                fs::remove_dir_all(dir)?;
            }
            Ok(())
        }
    }

}

/// In memory implementations, for embedding and tests.
pub mod memory_backend {
    use super::*;
    use crate::errors::BorderError;
    use std::{
        collections::{BTreeMap, BTreeSet},
        io,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex, PoisonError,
        },
    };

    #[derive(Debug, Clone)]
    pub struct MemoryRaster {
        pub georeference: GeoReference,
        pub bands: Vec<Array2<Pixel>>,
    }

    #[derive(Debug, Default)]
    pub struct MemorySource {
        rasters: BTreeMap<PathBuf, MemoryRaster>,
    }

    impl MemorySource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(
            &mut self,
            path: impl Into<PathBuf>,
            georeference: GeoReference,
            bands: Vec<Array2<Pixel>>,
        ) {
            self.rasters.insert(
                path.into(),
                MemoryRaster {
                    georeference,
                    bands,
                },
            );
        }

        fn get(&self, raster: &RasterHandle) -> Result<&MemoryRaster> {
            self.rasters
                .get(raster.path())
                .ok_or_else(|| BorderError::MissingRaster(raster.path().to_path_buf()))
        }
    }

    impl RasterSource for MemorySource {
        fn list_rasters(&self, dir: &Path) -> Result<Vec<RasterHandle>> {
            Ok(self
                .rasters
                .keys()
                .filter(|path| path.parent() == Some(dir))
                .map(|path| RasterHandle::new(path.clone()))
                .collect())
        }
        fn band_count(&self, raster: &RasterHandle) -> Result<usize> {
            Ok(self.get(raster)?.bands.len())
        }
        fn georeference(&self, raster: &RasterHandle) -> Result<GeoReference> {
            Ok(self.get(raster)?.georeference.clone())
        }
        fn read_band(&self, raster: &RasterHandle, index: usize) -> Result<Array2<Pixel>> {
            let bands = &self.get(raster)?.bands;
            index
                .checked_sub(1)
                .and_then(|idx| bands.get(idx))
                .cloned()
                .ok_or(BorderError::BandCountMismatch {
                    expected: index,
                    found: bands.len(),
                })
        }
    }

    /// A raster as a [MemorySink] received it, samples widened to `u32`.
    #[derive(Debug, Clone, PartialEq)]
    pub struct WrittenRaster {
        pub bands: Vec<Array2<u32>>,
        pub georeference: GeoReference,
        pub nodata: Option<u32>,
    }

    #[derive(Debug, Default)]
    pub struct MemorySink {
        files: Mutex<BTreeMap<PathBuf, WrittenRaster>>,
        dirs: Mutex<BTreeSet<PathBuf>>,
        failing_writes: AtomicUsize,
    }

    impl MemorySink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `count` writes fail with an I/O error.
        pub fn fail_next_writes(&self, count: usize) {
            self.failing_writes.store(count, Ordering::SeqCst);
        }

        pub fn get(&self, path: &Path) -> Option<WrittenRaster> {
            self.files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(path)
                .cloned()
        }

        pub fn paths(&self) -> Vec<PathBuf> {
            self.files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .keys()
                .cloned()
                .collect()
        }

        pub fn dirs(&self) -> Vec<PathBuf> {
            self.dirs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .cloned()
                .collect()
        }
    }

    impl RasterSink for MemorySink {
        fn exists(&self, path: &Path) -> bool {
            self.files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(path)
        }
        fn write<T: Sample>(
            &self,
            path: &Path,
            bands: &[&Array2<T>],
            georeference: &GeoReference,
            nodata: Option<T>,
        ) -> Result<()> {
            let failing = self
                .failing_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
            if failing.is_ok() {
                return Err(io::Error::other(format!("injected failure writing {path:?}")).into());
            }
            let written = WrittenRaster {
                bands: bands
                    .iter()
                    .map(|band| band.mapv(Into::<u32>::into))
                    .collect(),
                georeference: georeference.clone(),
                nodata: nodata.map(Into::into),
            };
            self.files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(path.to_path_buf(), written);
            Ok(())
        }
        fn remove(&self, path: &Path) -> Result<()> {
            self.files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(path);
            Ok(())
        }
        fn prepare_dir(&self, dir: &Path) -> Result<()> {
            self.dirs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(dir.to_path_buf());
            Ok(())
        }
        fn remove_dir(&self, dir: &Path) -> Result<()> {
            self.dirs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|known| !known.starts_with(dir));
            self.files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|path, _| !path.starts_with(dir));
            Ok(())
        }
    }

}
