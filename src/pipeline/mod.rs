mod context;
mod report;

pub use context::{GranuleContext, Stage, Workspace, MASKED_DIR, SUM_DIR};
pub use report::{error_block, failure_block, log_error_block, LogReporter, Reporter};

use itertools::{Either, Itertools};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
};

use crate::{
    components::{
        build_sum, compose, mask_granule, CompositeOutput, Pixel, RasterHandle, RasterSink,
        RasterSource, DEFAULT_NULL,
    },
    errors::{BorderError, Result},
};

/// Knobs of a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Value border pixels get in every band.
    pub null_value: Pixel,
    /// Band count every granule must have, `None` accepts any.
    pub band_count: Option<usize>,
    /// Worker threads, `None` for one per core.
    pub threads: Option<usize>,
    /// How often a granule failing on raster I/O is started over.
    pub retries: usize,
    /// Replace composites already in the output directory.
    pub overwrite: bool,
    /// Persist sum rasters and masked bands to the working directories.
    pub write_intermediates: bool,
    /// Leave the working directories behind even when every granule succeeded.
    pub keep_intermediates: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            null_value: DEFAULT_NULL,
            band_count: Some(3),
            threads: None,
            retries: 0,
            overwrite: false,
            write_intermediates: true,
            keep_intermediates: false,
        }
    }
}

/// A granule that did not make it to a composite.
#[derive(Debug, thiserror::Error)]
#[error("granule {id} failed at stage {stage} after {attempts} attempt(s): {error}")]
pub struct GranuleFailure {
    pub id: String,
    pub stage: Stage,
    pub attempts: usize,
    #[source]
    pub error: BorderError,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    /// Composites by granule id.
    pub composites: BTreeMap<String, CompositeOutput>,
    /// Failures sorted by granule id.
    pub failures: Vec<GranuleFailure>,
    pub intermediates_cleaned: bool,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.composites.len() + self.failures.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failure(&self, id: &str) -> Option<&GranuleFailure> {
        self.failures.iter().find(|failure| failure.id == id)
    }
}

/// Drives every granule of a directory from mosaic to composite.
#[derive(Debug)]
pub struct Pipeline<Src, Snk, R = LogReporter> {
    source: Src,
    sink: Snk,
    reporter: R,
    options: RunOptions,
}

impl<Src: RasterSource, Snk: RasterSink> Pipeline<Src, Snk, LogReporter> {
    pub fn new(source: Src, sink: Snk, options: RunOptions) -> Self {
        Self {
            source,
            sink,
            reporter: LogReporter,
            options,
        }
    }
}

type GranuleOutcome = std::result::Result<(String, CompositeOutput), GranuleFailure>;

impl<Src: RasterSource, Snk: RasterSink, R: Reporter> Pipeline<Src, Snk, R> {
    pub fn with_reporter<R2: Reporter>(self, reporter: R2) -> Pipeline<Src, Snk, R2> {
        Pipeline {
            source: self.source,
            sink: self.sink,
            reporter,
            options: self.options,
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn sink(&self) -> &Snk {
        &self.sink
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Process every granule in `input_dir` into `output_dir`.
    ///
    /// Granule failures end up in the [RunSummary]. Only failing to set up
    /// the output directory, list the input or start the workers is an `Err`.
    pub fn run(&self, input_dir: &Path, output_dir: &Path) -> Result<RunSummary> {
        if self.options.null_value <= Pixel::from(u8::MAX) {
            warn!(
                "null value {} is a valid 8 bit sample, real pixels may read as null",
                self.options.null_value
            );
        }

        let workspace = Workspace::new(output_dir);
        workspace.prepare(&self.sink, self.options.write_intermediates)?;

        let rasters = self.source.list_rasters(input_dir)?;
        self.reporter.run_started(input_dir, rasters.len());
        let (contexts, claim_failures) = self.claim_outputs(&workspace, rasters);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.threads.unwrap_or(0))
            .build()?;
        debug!("processing on {} threads", pool.current_num_threads());
        let outcomes: Vec<GranuleOutcome> = pool.install(|| {
            contexts
                .into_par_iter()
                .map(|context| self.run_granule(context))
                .collect()
        });

        let (composites, failures): (BTreeMap<_, _>, Vec<_>) =
            outcomes.into_iter().partition_map(|outcome| match outcome {
                Ok(composed) => Either::Left(composed),
                Err(failure) => Either::Right(failure),
            });
        let failures = failures
            .into_iter()
            .chain(claim_failures)
            .sorted_by(|lhs, rhs| lhs.id.cmp(&rhs.id))
            .collect_vec();

        let intermediates_cleaned = if !failures.is_empty() {
            warn!(
                "keeping working directories in {:?} for diagnosis",
                workspace.output_dir()
            );
            false
        } else if self.options.keep_intermediates {
            info!("keeping working directories as requested");
            false
        } else {
            workspace.clean(&self.sink)?;
            for id in composites.keys() {
                self.reporter.stage_reached(id, Stage::Cleaned);
            }
            true
        };

        let summary = RunSummary {
            composites,
            failures,
            intermediates_cleaned,
        };
        self.reporter.run_finished(&summary);
        Ok(summary)
    }

    /// Give each granule its own output names, failing ids already taken
    /// in this run and, unless overwriting, composites already written.
    fn claim_outputs(
        &self,
        workspace: &Workspace,
        rasters: Vec<RasterHandle>,
    ) -> (Vec<GranuleContext>, Vec<GranuleFailure>) {
        let mut claimed = HashSet::new();
        rasters
            .into_iter()
            .map(|raster| workspace.context(raster))
            .partition_map(|context| {
                let taken = !claimed.insert(context.id().to_string())
                    || (!self.options.overwrite && self.sink.exists(context.composite_path()));
                if !taken {
                    Either::Left(context)
                } else {
                    let failure = GranuleFailure {
                        id: context.id().to_string(),
                        stage: context.stage(),
                        attempts: 0,
                        error: BorderError::OutputCollision(context.composite_path().to_path_buf()),
                    };
                    self.reporter.granule_failed(&failure);
                    Either::Right(failure)
                }
            })
    }

    fn run_granule(&self, mut context: GranuleContext) -> GranuleOutcome {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.reporter.granule_started(context.id(), attempt);
            match self.process(&mut context) {
                Ok(output) => {
                    self.reporter.granule_composed(context.id(), &output);
                    return Ok((context.id().to_string(), output));
                }
                Err(error) => {
                    self.discard_intermediates(&context);
                    if error.is_retryable() && attempt <= self.options.retries {
                        warn!(
                            "[{}] attempt {attempt} failed at stage {}: {error}",
                            context.id(),
                            context.stage()
                        );
                        continue;
                    }
                    let failure = GranuleFailure {
                        id: context.id().to_string(),
                        stage: context.stage(),
                        attempts: attempt,
                        error,
                    };
                    self.reporter.granule_failed(&failure);
                    return Err(failure);
                }
            }
        }
    }

    fn process(&self, context: &mut GranuleContext) -> Result<CompositeOutput> {
        let id = context.id().to_string();

        context.enter(Stage::Mosaicked);
        let granule = self.source.read_granule(context.raster())?;
        context.set_band_count(granule.band_count());
        if let Some(expected) = self.options.band_count {
            if granule.band_count() != expected {
                return Err(BorderError::BandCountMismatch {
                    expected,
                    found: granule.band_count(),
                });
            }
        }
        self.reporter.stage_reached(&id, Stage::Mosaicked);

        context.enter(Stage::Summed);
        let sum = build_sum(&granule)?;
        if self.options.write_intermediates {
            self.sink
                .write(context.sum_path(), &[&*sum], sum.georeference(), None)?;
        }
        self.reporter.stage_reached(&id, Stage::Summed);

        context.enter(Stage::Masked);
        let masked = mask_granule(&granule, &sum, self.options.null_value)?;
        if self.options.write_intermediates {
            for band in &masked {
                self.sink.write(
                    &context.band_path(band.index()),
                    &[band.values()],
                    band.georeference(),
                    Some(band.null()),
                )?;
            }
        }
        self.reporter.stage_reached(&id, Stage::Masked);

        context.enter(Stage::Composed);
        let output = compose(
            &masked,
            context.composite_path(),
            &self.sink,
            self.options.overwrite,
        )?;
        self.reporter.stage_reached(&id, Stage::Composed);
        Ok(output)
    }

    fn discard_intermediates(&self, context: &GranuleContext) {
        for path in context.intermediate_paths() {
            if let Err(error) = self.sink.remove(&path) {
                warn!("[{}] could not remove {path:?}: {error}", context.id());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::{
            backends::memory_backend::{MemorySink, MemorySource},
            GeoReference,
        },
        errors::ErrorKind,
    };
    use ndarray::Array2;
    use std::{path::PathBuf, sync::Mutex};

    #[derive(Debug, Default)]
    struct RecordingReporter {
        events: Mutex<Vec<(String, String)>>,
    }

    impl RecordingReporter {
        fn record(&self, id: &str, event: String) {
            self.events.lock().unwrap().push((id.to_string(), event));
        }

        fn events_of(&self, id: &str) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(event_id, _)| event_id == id)
                .map(|(_, event)| event.clone())
                .collect()
        }
    }

    impl Reporter for RecordingReporter {
        fn granule_started(&self, id: &str, attempt: usize) {
            self.record(id, format!("started {attempt}"));
        }
        fn stage_reached(&self, id: &str, stage: Stage) {
            self.record(id, stage.to_string());
        }
        fn granule_failed(&self, failure: &GranuleFailure) {
            self.record(&failure.id, format!("failed {}", failure.error.kind()));
        }
    }

    fn uniform(value: Pixel) -> Vec<Array2<Pixel>> {
        vec![Array2::from_elem((4, 4), value); 3]
    }

    fn pipeline(
        source: MemorySource,
        options: RunOptions,
    ) -> Pipeline<MemorySource, MemorySink, RecordingReporter> {
        Pipeline::new(source, MemorySink::new(), options).with_reporter(RecordingReporter::default())
    }

    fn out(name: &str) -> PathBuf {
        Path::new("out").join(name)
    }

    #[test_log::test]
    fn walks_every_stage_and_cleans_up() {
        let mut source = MemorySource::new();
        source.insert("in/a.tif", GeoReference::default(), uniform(9));
        let pipeline = pipeline(source, RunOptions::default());

        let summary = pipeline.run(Path::new("in"), Path::new("out")).unwrap();
        assert!(summary.all_succeeded());
        assert!(summary.intermediates_cleaned);
        assert_eq!(
            pipeline.reporter().events_of("a"),
            vec!["started 1", "mosaicked", "summed", "masked", "composed", "cleaned"]
        );
        assert_eq!(pipeline.sink().paths(), vec![out("a.tif")]);
        assert!(pipeline.sink().dirs().iter().all(|dir| dir == Path::new("out")));
    }

    #[test_log::test]
    fn failing_granule_is_isolated() {
        let mut source = MemorySource::new();
        source.insert("in/good.tif", GeoReference::default(), uniform(1));
        source.insert(
            "in/bad.tif",
            GeoReference::default(),
            vec![
                Array2::zeros((4, 4)),
                Array2::zeros((4, 3)),
                Array2::zeros((4, 4)),
            ],
        );
        let pipeline = pipeline(source, RunOptions::default());

        let summary = pipeline.run(Path::new("in"), Path::new("out")).unwrap();
        assert_eq!(summary.total(), 2);
        assert!(summary.composites.contains_key("good"));

        let failure = summary.failure("bad").unwrap();
        assert_eq!(failure.error.kind(), ErrorKind::GeometryMismatch);
        assert_eq!(failure.stage, Stage::Summed);
        assert_eq!(failure.attempts, 1);

        let sink = pipeline.sink();
        assert!(!sink.exists(&out("bad.tif")));
        assert!(!summary.intermediates_cleaned);
        // the good granule's intermediates stay as evidence, the bad one left none
        assert!(sink.exists(&out("summed_band_images/good_sum.tif")));
        assert!(sink
            .paths()
            .iter()
            .all(|path| !path.to_string_lossy().contains("bad")));
    }

    #[test]
    fn unexpected_band_count() {
        let mut source = MemorySource::new();
        source.insert("in/rgba.tif", GeoReference::default(), vec![Array2::ones((2, 2)); 4]);
        let summary = pipeline(source, RunOptions::default())
            .run(Path::new("in"), Path::new("out"))
            .unwrap();
        let failure = summary.failure("rgba").unwrap();
        assert_eq!(failure.error.kind(), ErrorKind::BandCountMismatch);
        assert_eq!(failure.stage, Stage::Mosaicked);
    }

    #[test]
    fn any_band_count() {
        let mut source = MemorySource::new();
        source.insert("in/rgba.tif", GeoReference::default(), vec![Array2::ones((2, 2)); 4]);
        let options = RunOptions {
            band_count: None,
            ..Default::default()
        };
        let summary = pipeline(source, options)
            .run(Path::new("in"), Path::new("out"))
            .unwrap();
        assert_eq!(summary.composites["rgba"].band_count, 4);
    }

    #[test]
    fn duplicate_ids_collide() {
        let mut source = MemorySource::new();
        source.insert("in/a.tif", GeoReference::default(), uniform(1));
        source.insert("in/a.img", GeoReference::default(), uniform(2));
        let pipeline = pipeline(source, RunOptions::default());
        let summary = pipeline.run(Path::new("in"), Path::new("out")).unwrap();

        assert_eq!(summary.composites.len(), 1);
        let failure = summary.failure("a").unwrap();
        assert_eq!(failure.error.kind(), ErrorKind::OutputCollision);
        assert_eq!(failure.attempts, 0);
        // in/a.img sorts first and claims the name
        assert_eq!(
            pipeline.sink().get(&out("a.tif")).unwrap().bands[0][[0, 0]],
            2
        );
    }

    #[test]
    fn existing_composite_is_not_overwritten() {
        let mut source = MemorySource::new();
        source.insert("in/a.tif", GeoReference::default(), uniform(1));
        let pipeline = pipeline(source, RunOptions::default());
        pipeline.run(Path::new("in"), Path::new("out")).unwrap();

        let summary = pipeline.run(Path::new("in"), Path::new("out")).unwrap();
        let failure = summary.failure("a").unwrap();
        assert_eq!(failure.error.kind(), ErrorKind::OutputCollision);
        assert_eq!(failure.stage, Stage::Mosaicked);
        assert_eq!(failure.attempts, 0);
        // refused before the granule was read again
        let starts = pipeline
            .reporter()
            .events_of("a")
            .into_iter()
            .filter(|event| event.starts_with("started"))
            .count();
        assert_eq!(starts, 1);
    }

    #[test]
    fn existing_composite_is_overwritten_on_request() {
        let mut source = MemorySource::new();
        source.insert("in/a.tif", GeoReference::default(), uniform(1));
        let options = RunOptions {
            overwrite: true,
            ..Default::default()
        };
        let pipeline = pipeline(source, options);
        pipeline.run(Path::new("in"), Path::new("out")).unwrap();
        let summary = pipeline.run(Path::new("in"), Path::new("out")).unwrap();
        assert!(summary.all_succeeded());
        assert!(summary.composites.contains_key("a"));
    }

    #[test]
    fn raster_io_failures_are_retried() {
        let mut source = MemorySource::new();
        source.insert("in/a.tif", GeoReference::default(), uniform(1));
        let options = RunOptions {
            retries: 2,
            ..Default::default()
        };
        let pipeline = pipeline(source, options);
        pipeline.sink().fail_next_writes(2);

        let summary = pipeline.run(Path::new("in"), Path::new("out")).unwrap();
        assert!(summary.all_succeeded());
        let starts = pipeline
            .reporter()
            .events_of("a")
            .into_iter()
            .filter(|event| event.starts_with("started"))
            .count();
        assert_eq!(starts, 3);
    }

    #[test]
    fn retries_run_out() {
        let mut source = MemorySource::new();
        source.insert("in/a.tif", GeoReference::default(), uniform(1));
        let options = RunOptions {
            retries: 1,
            ..Default::default()
        };
        let pipeline = pipeline(source, options);
        pipeline.sink().fail_next_writes(5);

        let summary = pipeline.run(Path::new("in"), Path::new("out")).unwrap();
        let failure = summary.failure("a").unwrap();
        assert_eq!(failure.error.kind(), ErrorKind::RasterIo);
        assert_eq!(failure.stage, Stage::Summed);
        assert_eq!(failure.attempts, 2);
    }

    #[test]
    fn without_intermediates() {
        let mut source = MemorySource::new();
        source.insert("in/a.tif", GeoReference::default(), uniform(1));
        let options = RunOptions {
            write_intermediates: false,
            ..Default::default()
        };
        let pipeline = pipeline(source, options);
        pipeline.run(Path::new("in"), Path::new("out")).unwrap();
        assert_eq!(pipeline.sink().paths(), vec![out("a.tif")]);
    }

    #[test]
    fn kept_intermediates() {
        let mut source = MemorySource::new();
        source.insert("in/a.tif", GeoReference::default(), uniform(1));
        let options = RunOptions {
            keep_intermediates: true,
            ..Default::default()
        };
        let pipeline = pipeline(source, options);
        let summary = pipeline.run(Path::new("in"), Path::new("out")).unwrap();
        assert!(!summary.intermediates_cleaned);
        assert_eq!(pipeline.sink().paths().len(), 5);
        assert!(pipeline
            .sink()
            .exists(&out("nulled_singleband_images/a_Band_3.tif")));
    }

    #[test]
    fn failure_message_names_granule_and_stage() {
        let failure = GranuleFailure {
            id: "T33".into(),
            stage: Stage::Masked,
            attempts: 1,
            error: BorderError::BandCountMismatch {
                expected: 3,
                found: 2,
            },
        };
        assert_eq!(
            failure.to_string(),
            "granule T33 failed at stage masked after 1 attempt(s): expected 3 bands, found 2"
        );
    }
}
