use crate::config::TrainingConfig;
use crate::dataset::{FlowFolderSource, ValidationSet};
use crate::error::{FlowError, Result};
use crate::training::{CheckpointManager, TrainingLoop};
use crate::validation;
use clap::ArgMatches;

/// Evaluates a saved checkpoint over a held-out folder and prints the overall
/// and speed-segmented endpoint error.
pub fn validate(app_m: &ArgMatches) -> Result<()> {
	let folder = app_m
		.value_of("VALIDATION_FOLDER")
		.ok_or_else(|| FlowError::Config("no validation folder specified".into()))?;
	let checkpoint_file = app_m
		.value_of("CHECKPOINT_FILE")
		.ok_or_else(|| FlowError::Config("no checkpoint file specified".into()))?;
	validation::validate_directory(folder)?;
	validation::validate_input_file(checkpoint_file)?;

	let mut builder = TrainingConfig::builder();
	if let Some(batch) = app_m.value_of("BATCH_SIZE") {
		builder = builder.batch_size(super::train::parse(batch, "batch size")?);
	}
	if let Some(scales) = app_m.value_of("SCALES") {
		builder = builder.num_scales(super::train::parse(scales, "scale count")?);
	}
	let config = builder.build();
	config.validate()?;

	let desc = CheckpointManager::load(checkpoint_file)?;
	info!(
		"evaluating parameters from iteration {} (saved {})",
		desc.iteration, desc.saved_at
	);

	let mut looper = TrainingLoop::new(config.clone())?;
	looper.restore(desc)?;

	let source = FlowFolderSource::open(folder)?;
	let set = ValidationSet::load(&source)?;
	let report = looper.validate(&set, &config.segment_thresholds)?;

	info!("overall EPE over {} samples: {:.4}", set.len(), report.overall);
	for (i, segment) in report.segments.iter().enumerate() {
		match segment.error {
			Some(error) => info!("  speed segment {}: EPE {:.4} over {} px", i, error, segment.pixels),
			None => info!("  speed segment {}: no pixels", i),
		}
	}
	Ok(())
}
