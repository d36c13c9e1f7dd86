use anyhow::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::warn;

/// Scalar metrics sink: one tagged value per training step.
pub trait ScalarWriter {
    fn add_scalar(&mut self, tag: &str, value: f32, step: usize);
}

/// Discards everything. For tests and headless runs.
#[derive(Debug, Default)]
pub struct NullWriter;

impl ScalarWriter for NullWriter {
    fn add_scalar(&mut self, _tag: &str, _value: f32, _step: usize) {}
}

/// Appends `step,tag,value` rows to a csv file.
pub struct CsvWriter {
    out: BufWriter<File>,
}

impl CsvWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "step,tag,value")?;
        Ok(Self { out })
    }
}

impl ScalarWriter for CsvWriter {
    fn add_scalar(&mut self, tag: &str, value: f32, step: usize) {
        // metric emission is best effort, a failed write must not abort training
        if let Err(err) = writeln!(self.out, "{step},{tag},{value}") {
            warn!(%err, "failed to write metrics row");
        }
    }
}
