use log::{error, info, warn};
use std::{error::Error, iter, path::Path};

use crate::{
    components::CompositeOutput,
    errors::BorderError,
    pipeline::{GranuleFailure, RunSummary, Stage},
};

/// Receives the progress of a run.
///
/// Every granule event carries the granule id, which is the
/// correlation id across concurrently processed granules.
pub trait Reporter: Sync {
    fn run_started(&self, _input_dir: &Path, _granules: usize) {}
    fn granule_started(&self, _id: &str, _attempt: usize) {}
    fn stage_reached(&self, _id: &str, _stage: Stage) {}
    fn granule_composed(&self, _id: &str, _output: &CompositeOutput) {}
    fn granule_failed(&self, _failure: &GranuleFailure) {}
    fn run_finished(&self, _summary: &RunSummary) {}
}

/// Reports through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

/// `error` with its kind and full cause chain, every line prefixed.
pub fn error_block(prefix: &str, error: &BorderError) -> Vec<String> {
    [
        format!("{prefix} error type: {}", error.kind()),
        format!("{prefix} message: {error}"),
    ]
    .into_iter()
    .chain(
        iter::successors(error.source(), |&cause| cause.source())
            .map(|cause| format!("{prefix} caused by: {cause}")),
    )
    .collect()
}

/// The error block of a granule, led by the stage it failed at.
pub fn failure_block(failure: &GranuleFailure) -> Vec<String> {
    let prefix = format!("[{}]", failure.id);
    let mut lines = vec![format!(
        "{prefix} failed at stage {} after {} attempt(s)",
        failure.stage, failure.attempts
    )];
    lines.extend(error_block(&prefix, &failure.error));
    lines
}

pub fn log_error_block(prefix: &str, error: &BorderError) {
    for line in error_block(prefix, error) {
        error!("{line}");
    }
}

impl Reporter for LogReporter {
    fn run_started(&self, input_dir: &Path, granules: usize) {
        info!("found {granules} granules in {input_dir:?}");
    }

    fn granule_started(&self, id: &str, attempt: usize) {
        if attempt > 1 {
            warn!("[{id}] retrying, attempt {attempt}");
        } else {
            info!("[{id}] started");
        }
    }

    fn stage_reached(&self, id: &str, stage: Stage) {
        info!("[{id}] {stage}");
    }

    fn granule_composed(&self, id: &str, output: &CompositeOutput) {
        info!(
            "[{id}] wrote {} bands of {} to {:?}",
            output.band_count, output.extent, output.path
        );
    }

    fn granule_failed(&self, failure: &GranuleFailure) {
        for line in failure_block(failure) {
            error!("{line}");
        }
    }

    fn run_finished(&self, summary: &RunSummary) {
        if summary.all_succeeded() {
            info!("composed all {} granules", summary.total());
        } else {
            error!(
                "{} of {} granules failed: {}",
                summary.failed_count(),
                summary.total(),
                summary
                    .failures
                    .iter()
                    .map(|failure| failure.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }
}
