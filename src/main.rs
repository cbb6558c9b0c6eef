use border_nuller::{
    cli::{exit_status, Args, FATAL},
    gdal_backend::{GdalSink, GdalSource},
    logging,
    pipeline::log_error_block,
    Pipeline,
};
use clap::Parser;
use log::{error, info};
use std::{fs, process::ExitCode};

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(error) = fs::create_dir_all(&args.output) {
        eprintln!("can not create output directory {:?}: {error}", args.output);
        return ExitCode::from(FATAL);
    }
    if let Err(error) = logging::init(&args.output, args.verbose) {
        eprintln!("can not open log file in {:?}: {error}", args.output);
        return ExitCode::from(FATAL);
    }

    info!("=== Border nulling ===");
    info!("input: {:?}", args.input);
    info!("output: {:?}", args.output);

    let pipeline = Pipeline::new(
        GdalSource::new(args.null_value),
        GdalSink::default(),
        args.run_options(),
    );
    let outcome = pipeline.run(&args.input, &args.output);
    match &outcome {
        Ok(summary) if summary.all_succeeded() => info!("=== Done! ==="),
        Ok(summary) => error!(
            "{} of {} granules failed, working directories kept in {:?}",
            summary.failed_count(),
            summary.total(),
            args.output
        ),
        Err(error) => {
            error!("run aborted");
            log_error_block("[run]", error);
        }
    }
    ExitCode::from(exit_status(&outcome))
}
