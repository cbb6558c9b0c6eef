use env_logger::{Env, Target, WriteStyle};
use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
};

use crate::errors::Result;

pub const LOG_FILE: &str = "log.log";

/// Copies every log line to stderr and to the run's log file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Log to stderr and to `log.log` in `output_dir`, appending.
///
/// `RUST_LOG` wins over `verbose`.
pub fn init(output_dir: &Path, verbose: bool) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(output_dir.join(LOG_FILE))?;
    let log_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .target(Target::Pipe(Box::new(Tee { file })))
        .write_style(WriteStyle::Never)
        .init();
    Ok(())
}
