use crate::constants::{metrics, pyramid, training};
use crate::error::{FlowError, Result};

/// Hyperparameters for one training run. Built through [`TrainingConfigBuilder`]
/// or loaded from a TOML file, then checked once with [`TrainingConfig::validate`].
#[derive(Debug, Clone)]
pub struct TrainingConfig {
	pub learning_rate: f32,
	pub batch_size: usize,
	pub iterations: u64,
	pub print_interval: u64,
	pub validation_interval: u64,
	pub snapshot_interval: u64,
	pub num_threads: usize,
	pub num_scales: usize,
	pub input_channels: usize,
	pub seed: u64,
	pub segment_thresholds: Vec<f32>,
	/// Accepted for command-line compatibility; this build always runs on CPU.
	pub gpu: bool,
}

impl Default for TrainingConfig {
	fn default() -> Self {
		Self {
			learning_rate: training::DEFAULT_LEARNING_RATE,
			batch_size: training::DEFAULT_BATCH_SIZE,
			iterations: training::DEFAULT_ITERATIONS,
			print_interval: training::DEFAULT_PRINT_INTERVAL,
			validation_interval: training::DEFAULT_VALIDATION_INTERVAL,
			snapshot_interval: training::DEFAULT_SNAPSHOT_INTERVAL,
			num_threads: training::DEFAULT_NUM_THREADS,
			num_scales: pyramid::DEFAULT_NUM_SCALES,
			input_channels: 1,
			seed: 0,
			segment_thresholds: metrics::SPEED_THRESHOLDS.to_vec(),
			gpu: false,
		}
	}
}

impl TrainingConfig {
	pub fn builder() -> TrainingConfigBuilder {
		TrainingConfigBuilder::default()
	}

	pub fn validate(&self) -> Result<()> {
		if self.learning_rate <= 0.0 || !self.learning_rate.is_finite() {
			return Err(FlowError::Config(format!(
				"learning rate ({}) must be a positive finite number",
				self.learning_rate
			)));
		}
		if self.batch_size == 0 {
			return Err(FlowError::Config("batch size must be greater than 0".into()));
		}
		if self.iterations == 0 {
			return Err(FlowError::Config("iteration count must be greater than 0".into()));
		}
		if self.print_interval == 0 || self.validation_interval == 0 || self.snapshot_interval == 0 {
			return Err(FlowError::Config("cadence intervals must be greater than 0".into()));
		}
		if self.num_threads == 0 {
			return Err(FlowError::Config("loader thread count must be greater than 0".into()));
		}
		if self.num_scales == 0 {
			return Err(FlowError::Config("pyramid needs at least one scale".into()));
		}
		if self.input_channels == 0 {
			return Err(FlowError::Config("input channel count must be greater than 0".into()));
		}
		if self.segment_thresholds.is_empty() {
			return Err(FlowError::Config("at least one speed threshold is required".into()));
		}
		let ascending = self
			.segment_thresholds
			.windows(2)
			.all(|w| w[0] < w[1]);
		if !ascending || self.segment_thresholds[0] <= 0.0 {
			return Err(FlowError::Config(
				"speed thresholds must be positive and strictly ascending".into(),
			));
		}
		Ok(())
	}
}

#[derive(Default)]
pub struct TrainingConfigBuilder {
	learning_rate: Option<f32>,
	batch_size: Option<usize>,
	iterations: Option<u64>,
	print_interval: Option<u64>,
	validation_interval: Option<u64>,
	snapshot_interval: Option<u64>,
	num_threads: Option<usize>,
	num_scales: Option<usize>,
	input_channels: Option<usize>,
	seed: Option<u64>,
	segment_thresholds: Option<Vec<f32>>,
	gpu: Option<bool>,
}

impl TrainingConfigBuilder {
	pub fn learning_rate(mut self, learning_rate: f32) -> Self {
		self.learning_rate = Some(learning_rate);
		self
	}

	pub fn batch_size(mut self, batch_size: usize) -> Self {
		self.batch_size = Some(batch_size);
		self
	}

	pub fn iterations(mut self, iterations: u64) -> Self {
		self.iterations = Some(iterations);
		self
	}

	pub fn print_interval(mut self, print_interval: u64) -> Self {
		self.print_interval = Some(print_interval);
		self
	}

	pub fn validation_interval(mut self, validation_interval: u64) -> Self {
		self.validation_interval = Some(validation_interval);
		self
	}

	pub fn snapshot_interval(mut self, snapshot_interval: u64) -> Self {
		self.snapshot_interval = Some(snapshot_interval);
		self
	}

	pub fn num_threads(mut self, num_threads: usize) -> Self {
		self.num_threads = Some(num_threads);
		self
	}

	pub fn num_scales(mut self, num_scales: usize) -> Self {
		self.num_scales = Some(num_scales);
		self
	}

	pub fn input_channels(mut self, input_channels: usize) -> Self {
		self.input_channels = Some(input_channels);
		self
	}

	pub fn seed(mut self, seed: u64) -> Self {
		self.seed = Some(seed);
		self
	}

	pub fn segment_thresholds(mut self, thresholds: Vec<f32>) -> Self {
		self.segment_thresholds = Some(thresholds);
		self
	}

	pub fn gpu(mut self, gpu: bool) -> Self {
		self.gpu = Some(gpu);
		self
	}

	pub fn build(self) -> TrainingConfig {
		let defaults = TrainingConfig::default();
		TrainingConfig {
			learning_rate: self.learning_rate.unwrap_or(defaults.learning_rate),
			batch_size: self.batch_size.unwrap_or(defaults.batch_size),
			iterations: self.iterations.unwrap_or(defaults.iterations),
			print_interval: self.print_interval.unwrap_or(defaults.print_interval),
			validation_interval: self.validation_interval.unwrap_or(defaults.validation_interval),
			snapshot_interval: self.snapshot_interval.unwrap_or(defaults.snapshot_interval),
			num_threads: self.num_threads.unwrap_or(defaults.num_threads),
			num_scales: self.num_scales.unwrap_or(defaults.num_scales),
			input_channels: self.input_channels.unwrap_or(defaults.input_channels),
			seed: self.seed.unwrap_or(defaults.seed),
			segment_thresholds: self.segment_thresholds.unwrap_or(defaults.segment_thresholds),
			gpu: self.gpu.unwrap_or(defaults.gpu),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_validate() {
		assert!(TrainingConfig::default().validate().is_ok());
	}

	#[test]
	fn builder_overrides_only_what_is_set() {
		let config = TrainingConfig::builder().batch_size(8).seed(42).build();
		assert_eq!(config.batch_size, 8);
		assert_eq!(config.seed, 42);
		assert_eq!(config.learning_rate, TrainingConfig::default().learning_rate);
	}

	#[test]
	fn bad_values_are_rejected() {
		assert!(TrainingConfig::builder().learning_rate(0.0).build().validate().is_err());
		assert!(TrainingConfig::builder().learning_rate(f32::NAN).build().validate().is_err());
		assert!(TrainingConfig::builder().batch_size(0).build().validate().is_err());
		assert!(TrainingConfig::builder().iterations(0).build().validate().is_err());
		assert!(TrainingConfig::builder().num_scales(0).build().validate().is_err());
		assert!(TrainingConfig::builder()
			.segment_thresholds(vec![2.0, 1.0])
			.build()
			.validate()
			.is_err());
	}
}
