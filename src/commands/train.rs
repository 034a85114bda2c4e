use crate::config::TrainingConfig;
use crate::config_file::RunConfigFile;
use crate::constants::file::{LOG_ROOT, SNAPSHOT_ROOT};
use crate::dataset::{FlowFolderSource, ValidationSet};
use crate::error::{FlowError, Result};
use crate::telemetry::CsvSink;
use crate::training::checkpoint::{OperatorPrompt, StartDisposition};
use crate::training::{BatchProducer, CheckpointManager, StdinPrompt, TrainingLoop};
use crate::validation;
use clap::ArgMatches;
use std::path::PathBuf;
use std::sync::Arc;

pub fn train(app_m: &ArgMatches) -> Result<()> {
	let file = match app_m.value_of("CONFIG") {
		Some(path) => RunConfigFile::from_toml_file(path)?,
		None => RunConfigFile::default(),
	};
	let config = apply_overrides(file.to_training_config()?, app_m)?;
	config.validate()?;

	if config.gpu {
		warn!("GPU acceleration is not available in this build; running on CPU");
	}

	let training_folder = app_m
		.value_of("TRAINING_FOLDER")
		.ok_or_else(|| FlowError::Config("no training folder specified".into()))?;
	validation::validate_directory(training_folder)?;

	let run_id = app_m
		.value_of("RUN_ID")
		.map(str::to_string)
		.unwrap_or_else(|| file.output.run_id.clone());
	let root = app_m
		.value_of("OUTPUT_ROOT")
		.map(str::to_string)
		.unwrap_or_else(|| file.output.root.clone());
	let snapshot_dir = PathBuf::from(&root).join(SNAPSHOT_ROOT).join(&run_id);
	let log_dir = PathBuf::from(&root).join(LOG_ROOT).join(&run_id);

	print_run_info(&config, training_folder, &run_id);

	let source = Arc::new(FlowFolderSource::open(training_folder)?);
	let validation_set = load_validation_set(app_m, &file)?;

	let checkpoints = CheckpointManager::new(&snapshot_dir)?;
	let disposition = if app_m.is_present("RESUME") {
		match checkpoints.latest()? {
			Some((iteration, path)) => StartDisposition::Resume(path, iteration),
			None => StartDisposition::Fresh,
		}
	} else if app_m.is_present("FRESH") {
		checkpoints.prepare(&mut AlwaysAnswer(false))?
	} else {
		checkpoints.prepare(&mut StdinPrompt)?
	};

	if let Some(set) = validation_set.as_ref() {
		ensure_validation_capacity(set.len(), config.batch_size)?;
	}

	let mut looper = TrainingLoop::new(config.clone())?;
	match disposition {
		StartDisposition::Resume(path, iteration) => {
			info!("resuming from a snapshot of {} completed iterations", iteration);
			looper.restore(CheckpointManager::load(&path)?)?;
		},
		StartDisposition::Fresh => {
			// a purged run's telemetry goes with its snapshots
			std::fs::remove_dir_all(&log_dir).ok();
		},
	}

	let producer = BatchProducer::start(source, config.batch_size, config.num_threads, config.seed)?;
	let mut telemetry = CsvSink::create(&log_dir)?;
	looper.run(&producer, validation_set.as_ref(), &checkpoints, &mut telemetry)
}

/// The held-out set must strictly exceed one training batch.
fn ensure_validation_capacity(samples: usize, batch_size: usize) -> Result<()> {
	if samples <= batch_size {
		return Err(FlowError::Config(format!(
			"validation set ({} samples) must be larger than the batch size ({})",
			samples, batch_size
		)));
	}
	Ok(())
}

/// Answers every snapshot prompt the same way; backs the `--fresh` flag.
struct AlwaysAnswer(bool);

impl OperatorPrompt for AlwaysAnswer {
	fn confirm(&mut self, _question: &str) -> Result<bool> {
		Ok(self.0)
	}
}

fn apply_overrides(mut config: TrainingConfig, app_m: &ArgMatches) -> Result<TrainingConfig> {
	if let Some(rate) = app_m.value_of("LEARNING_RATE") {
		config.learning_rate = parse(rate, "learning rate")?;
	}
	if let Some(batch) = app_m.value_of("BATCH_SIZE") {
		config.batch_size = parse(batch, "batch size")?;
	}
	if let Some(iterations) = app_m.value_of("ITERATIONS") {
		config.iterations = parse(iterations, "iteration count")?;
	}
	if let Some(scales) = app_m.value_of("SCALES") {
		config.num_scales = parse(scales, "scale count")?;
	}
	if let Some(threads) = app_m.value_of("THREADS") {
		config.num_threads = parse(threads, "thread count")?;
	}
	if let Some(seed) = app_m.value_of("SEED") {
		config.seed = parse(seed, "seed")?;
	}
	config.gpu = config.gpu || app_m.is_present("GPU");
	Ok(config)
}

pub(crate) fn parse<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
	value
		.parse()
		.map_err(|_| FlowError::Config(format!("could not parse {} '{}'", what, value)))
}

fn load_validation_set(app_m: &ArgMatches, file: &RunConfigFile) -> Result<Option<ValidationSet>> {
	let folder = app_m
		.value_of("VALIDATION_FOLDER")
		.map(str::to_string)
		.or_else(|| file.data.validation_dir.clone());
	match folder {
		Some(folder) => {
			validation::validate_directory(&folder)?;
			let source = FlowFolderSource::open(&folder)?;
			let set = ValidationSet::load(&source)?;
			info!("loaded {} validation samples from {}", set.len(), folder);
			Ok(Some(set))
		},
		None => {
			info!("no validation folder given; skipping validation passes");
			Ok(None)
		},
	}
}

fn print_run_info(config: &TrainingConfig, training_folder: &str, run_id: &str) {
	info!("Training run '{}' with:", run_id);
	info!("  data:          {}", training_folder);
	info!("  scales:        {}", config.num_scales);
	info!("  batch size:    {}", config.batch_size);
	info!("  learning rate: {}", config.learning_rate);
	info!("  iterations:    {}", config.iterations);
	info!("  loader threads:{}", config.num_threads);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_validation_set_must_exceed_the_batch_size() {
		assert!(ensure_validation_capacity(3, 4).is_err());
		assert!(ensure_validation_capacity(4, 4).is_err());
		assert!(ensure_validation_capacity(5, 4).is_ok());
	}
}
