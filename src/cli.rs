use clap::Parser;
use std::path::PathBuf;

use crate::{
    components::DEFAULT_NULL,
    errors::Result,
    pipeline::{RunOptions, RunSummary},
};

/// Exit status of a run that could not get going at all.
pub const FATAL: u8 = 255;

/// Process exit status for the outcome of a run.
///
/// 0 when every granule was composed, the number of failed granules
/// (at most 254) when some failed, [FATAL] when the run aborted.
pub fn exit_status(outcome: &Result<RunSummary>) -> u8 {
    match outcome {
        Ok(summary) => summary
            .failed_count()
            .min(usize::from(FATAL - 1))
            .try_into()
            .unwrap_or(FATAL - 1),
        Err(_) => FATAL,
    }
}

#[derive(Parser, Debug)]
#[command(name = "border-nuller")]
#[command(about = "Null the black borders of mosaicked multiband granules")]
#[command(version)]
pub struct Args {
    /// Directory of mosaicked granules
    #[arg(short, long, value_name = "DIR")]
    pub input: PathBuf,

    /// Output directory (composites, working directories and log.log)
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// No-data value given to border pixels
    #[arg(long, value_name = "VALUE", default_value_t = DEFAULT_NULL)]
    pub null_value: u16,

    /// Number of bands every granule must have
    #[arg(
        long,
        value_name = "N",
        default_value_t = 3,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub bands: u16,

    /// Accept granules with any number of bands
    #[arg(long)]
    pub any_band_count: bool,

    /// Number of threads (default: all available)
    #[arg(short, long, value_name = "N")]
    pub threads: Option<usize>,

    /// Times a granule failing on raster I/O is started over
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub retries: usize,

    /// Replace composites that already exist
    #[arg(long)]
    pub overwrite: bool,

    /// Keep the working directories after a successful run
    #[arg(long, conflicts_with = "no_intermediates")]
    pub keep_intermediates: bool,

    /// Do not write sum rasters and masked bands at all
    #[arg(long)]
    pub no_intermediates: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            null_value: self.null_value,
            band_count: (!self.any_band_count).then_some(usize::from(self.bands)),
            threads: self.threads,
            retries: self.retries,
            overwrite: self.overwrite,
            write_intermediates: !self.no_intermediates,
            keep_intermediates: self.keep_intermediates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::BorderError,
        pipeline::{GranuleFailure, Stage},
    };
    use rstest::rstest;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["border-nuller", "-i", "in", "-o", "out"]).unwrap();
        let options = args.run_options();
        assert_eq!(args.input, PathBuf::from("in"));
        assert_eq!(options.null_value, 256);
        assert_eq!(options.band_count, Some(3));
        assert_eq!(options.retries, 0);
        assert!(options.write_intermediates);
        assert!(!options.keep_intermediates);
        assert!(!options.overwrite);
    }

    #[test]
    fn any_band_count() {
        let args = Args::try_parse_from([
            "border-nuller",
            "--input",
            "in",
            "--output",
            "out",
            "--any-band-count",
            "--no-intermediates",
            "--threads",
            "2",
        ])
        .unwrap();
        let options = args.run_options();
        assert_eq!(options.band_count, None);
        assert_eq!(options.threads, Some(2));
        assert!(!options.write_intermediates);
    }

    #[rstest]
    #[case("0")]
    #[case("-2")]
    #[case("three")]
    fn band_count_must_be_positive(#[case] bands: &str) {
        assert!(
            Args::try_parse_from(["border-nuller", "-i", "in", "-o", "out", "--bands", bands])
                .is_err()
        );
    }

    #[test]
    fn explicit_band_count() {
        let args =
            Args::try_parse_from(["border-nuller", "-i", "in", "-o", "out", "--bands", "4"])
                .unwrap();
        assert_eq!(args.run_options().band_count, Some(4));
    }

    fn summary_failing(count: usize) -> RunSummary {
        RunSummary {
            failures: (0..count)
                .map(|idx| GranuleFailure {
                    id: format!("g{idx}"),
                    stage: Stage::Summed,
                    attempts: 1,
                    error: BorderError::BandCountMismatch {
                        expected: 3,
                        found: 2,
                    },
                })
                .collect(),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(0, 0)]
    #[case(3, 3)]
    #[case(254, 254)]
    #[case(300, 254)]
    fn exit_status_counts_failures(#[case] failed: usize, #[case] status: u8) {
        assert_eq!(exit_status(&Ok(summary_failing(failed))), status);
    }

    #[test]
    fn exit_status_of_aborted_run() {
        let aborted = Err(BorderError::MissingRaster("in".into()));
        assert_eq!(exit_status(&aborted), FATAL);
    }

    #[test]
    fn output_is_required() {
        assert!(Args::try_parse_from(["border-nuller", "-i", "in"]).is_err());
    }

    #[test]
    fn keep_and_skip_intermediates_conflict() {
        assert!(Args::try_parse_from([
            "border-nuller",
            "-i",
            "in",
            "-o",
            "out",
            "--keep-intermediates",
            "--no-intermediates",
        ])
        .is_err());
    }
}
