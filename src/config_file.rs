//! TOML run configuration. Every section and field is optional; anything
//! absent falls back to the built-in defaults, so a minimal file can set just
//! the handful of values a run cares about.

use crate::config::TrainingConfig;
use crate::constants::{metrics, pyramid, training};
use crate::error::{FlowError, Result};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfigFile {
	pub network: NetworkSection,
	pub training: TrainingSection,
	pub data: DataSection,
	pub validation: ValidationSection,
	pub output: OutputSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
	/// Number of pyramid scales (default: 5)
	pub num_scales: usize,

	/// Input image channels (default: 1, grayscale)
	pub input_channels: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSection {
	/// Adam learning rate (default: 0.012)
	pub learning_rate: f32,

	/// Training batch size (default: 4)
	pub batch_size: usize,

	/// Total optimization steps (default: 600000)
	pub iterations: u64,

	/// Console report interval in steps (default: 10)
	pub print_interval: u64,

	/// Validation pass interval in steps (default: 50)
	pub validation_interval: u64,

	/// Snapshot interval in steps (default: 20)
	pub snapshot_interval: u64,

	/// Background loader threads (default: 6)
	pub num_threads: usize,

	/// Parameter initialisation seed (default: 0)
	pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
	/// Training sample directory
	pub training_dir: String,

	/// Held-out sample directory (optional; no directory means no validation passes)
	pub validation_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSection {
	/// Upper speed bound of each segment bucket except the open-ended last
	pub segment_thresholds: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
	/// Run identifier; names the snapshot and log subdirectories
	pub run_id: String,

	/// Root directory for run outputs (default: current directory)
	pub root: String,
}

impl Default for NetworkSection {
	fn default() -> Self {
		Self {
			num_scales: pyramid::DEFAULT_NUM_SCALES,
			input_channels: 1,
		}
	}
}

impl Default for TrainingSection {
	fn default() -> Self {
		Self {
			learning_rate: training::DEFAULT_LEARNING_RATE,
			batch_size: training::DEFAULT_BATCH_SIZE,
			iterations: training::DEFAULT_ITERATIONS,
			print_interval: training::DEFAULT_PRINT_INTERVAL,
			validation_interval: training::DEFAULT_VALIDATION_INTERVAL,
			snapshot_interval: training::DEFAULT_SNAPSHOT_INTERVAL,
			num_threads: training::DEFAULT_NUM_THREADS,
			seed: 0,
		}
	}
}

impl Default for DataSection {
	fn default() -> Self {
		Self {
			training_dir: "./data/train".to_string(),
			validation_dir: None,
		}
	}
}

impl Default for ValidationSection {
	fn default() -> Self {
		Self {
			segment_thresholds: metrics::SPEED_THRESHOLDS.to_vec(),
		}
	}
}

impl Default for OutputSection {
	fn default() -> Self {
		Self {
			run_id: "default".to_string(),
			root: ".".to_string(),
		}
	}
}

impl RunConfigFile {
	pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
		let path = path.as_ref();
		let contents = fs::read_to_string(path)
			.map_err(|e| FlowError::FileNotFound(format!("{}: {}", path.display(), e)))?;
		toml::from_str(&contents).map_err(|e| FlowError::Parse(format!("TOML config: {}", e)))
	}

	pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		let contents =
			toml::to_string_pretty(self).map_err(|e| FlowError::Serialization(format!("TOML config: {}", e)))?;
		fs::write(path, contents)?;
		Ok(())
	}

	/// Collapses the file into a validated [`TrainingConfig`].
	pub fn to_training_config(&self) -> Result<TrainingConfig> {
		let config = TrainingConfig::builder()
			.learning_rate(self.training.learning_rate)
			.batch_size(self.training.batch_size)
			.iterations(self.training.iterations)
			.print_interval(self.training.print_interval)
			.validation_interval(self.training.validation_interval)
			.snapshot_interval(self.training.snapshot_interval)
			.num_threads(self.training.num_threads)
			.num_scales(self.network.num_scales)
			.input_channels(self.network.input_channels)
			.seed(self.training.seed)
			.segment_thresholds(self.validation.segment_thresholds.clone())
			.build();
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_file_yields_defaults() {
		let file: RunConfigFile = toml::from_str("").unwrap();
		let config = file.to_training_config().unwrap();
		assert_eq!(config.batch_size, training::DEFAULT_BATCH_SIZE);
		assert_eq!(config.num_scales, pyramid::DEFAULT_NUM_SCALES);
	}

	#[test]
	fn partial_sections_keep_other_defaults() {
		let file: RunConfigFile = toml::from_str(
			"[training]\nbatch_size = 8\n\n[network]\nnum_scales = 3\n",
		)
		.unwrap();
		let config = file.to_training_config().unwrap();
		assert_eq!(config.batch_size, 8);
		assert_eq!(config.num_scales, 3);
		assert_eq!(config.learning_rate, training::DEFAULT_LEARNING_RATE);
	}

	#[test]
	fn round_trips_through_toml() {
		let mut file = RunConfigFile::default();
		file.output.run_id = "exp-7".to_string();
		file.data.validation_dir = Some("/tmp/val".to_string());
		let text = toml::to_string_pretty(&file).unwrap();
		let back: RunConfigFile = toml::from_str(&text).unwrap();
		assert_eq!(back.output.run_id, "exp-7");
		assert_eq!(back.data.validation_dir.as_deref(), Some("/tmp/val"));
	}

	#[test]
	fn invalid_values_fail_conversion() {
		let file: RunConfigFile = toml::from_str("[training]\nbatch_size = 0\n").unwrap();
		assert!(file.to_training_config().is_err());
	}
}
