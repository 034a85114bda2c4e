//! Scalar telemetry emitted during training. The trainer reports through the
//! [`TelemetrySink`] trait so runs can log to a CSV file, to the test harness,
//! or nowhere at all without the loop caring.

use crate::error::Result;
use crate::metrics::ValidationReport;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub trait TelemetrySink: Send {
	/// Per-iteration training loss (the regularized squared EPE).
	fn training_loss(&mut self, iteration: u64, loss: f32);

	/// One validation pass result.
	fn validation(&mut self, iteration: u64, report: &ValidationReport);
}

/// Sink that drops everything.
pub struct NullSink;

impl TelemetrySink for NullSink {
	fn training_loss(&mut self, _iteration: u64, _loss: f32) {}

	fn validation(&mut self, _iteration: u64, _report: &ValidationReport) {}
}

/// Append-only CSV of training scalars under `logs/<run_id>/`. Write failures
/// are logged and swallowed so a full disk cannot kill a long run.
pub struct CsvSink {
	path: PathBuf,
	writer: Option<BufWriter<File>>,
}

impl CsvSink {
	pub fn create<P: AsRef<Path>>(log_dir: P) -> Result<Self> {
		let log_dir = log_dir.as_ref();
		fs::create_dir_all(log_dir)?;
		let path = log_dir.join(crate::constants::file::SCALARS_FILE);
		let mut writer = BufWriter::new(File::create(&path)?);
		writeln!(writer, "iteration,kind,value,segment")?;
		Ok(CsvSink {
			path,
			writer: Some(writer),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn write_row(&mut self, iteration: u64, kind: &str, value: f32, segment: &str) {
		if let Some(writer) = self.writer.as_mut() {
			if let Err(e) = writeln!(writer, "{},{},{},{}", iteration, kind, value, segment) {
				warn!("telemetry write to {} failed, disabling sink: {}", self.path.display(), e);
				self.writer = None;
			}
		}
	}
}

impl TelemetrySink for CsvSink {
	fn training_loss(&mut self, iteration: u64, loss: f32) {
		self.write_row(iteration, "train_loss", loss, "");
	}

	fn validation(&mut self, iteration: u64, report: &ValidationReport) {
		self.write_row(iteration, "val_epe", report.overall, "");
		for (i, segment) in report.segments.iter().enumerate() {
			if let Some(error) = segment.error {
				self.write_row(iteration, "val_epe_segment", error, &i.to_string());
			}
		}
		if let Some(writer) = self.writer.as_mut() {
			if let Err(e) = writer.flush() {
				warn!("telemetry flush to {} failed: {}", self.path.display(), e);
			}
		}
	}
}
