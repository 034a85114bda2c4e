use crate::error::{FlowError, Result};
use crate::training::CheckpointManager;
use crate::validation;
use clap::ArgMatches;
use std::fs;

/// Copies the newest snapshot of a run out to a standalone parameter file,
/// re-encoded so the export is self-contained even if the run directory is
/// later purged.
pub fn finalize(app_m: &ArgMatches) -> Result<()> {
	let snapshot_folder = app_m
		.value_of("SNAPSHOT_FOLDER")
		.ok_or_else(|| FlowError::Config("no snapshot folder specified".into()))?;
	let output_file = app_m
		.value_of("OUTPUT_FILE")
		.ok_or_else(|| FlowError::Config("no output file specified".into()))?;
	validation::validate_directory(snapshot_folder)?;
	let output_path = validation::validate_output_path(output_file)?;

	let manager = CheckpointManager::new(snapshot_folder)?;
	let (iteration, path) = manager
		.latest()?
		.ok_or_else(|| FlowError::FileNotFound(format!("no snapshots in {}", snapshot_folder)))?;

	// decode before copying so a truncated snapshot cannot be exported
	CheckpointManager::load(&path)?;
	fs::copy(&path, &output_path)?;
	info!(
		"exported snapshot from iteration {} to {}",
		iteration,
		output_path.display()
	);
	Ok(())
}
