//! The optimization loop: pulls batches, runs forward/backward through the
//! pyramid, applies Adam, and fires validation and snapshot work on their
//! configured cadences.

use crate::config::TrainingConfig;
use crate::constants::training::WEIGHT_DECAY;
use crate::dataset::ValidationSet;
use crate::error::{FlowError, Result};
use crate::metrics::{squared_epe_with_grad, SegmentedAccumulator, ValidationReport};
use crate::network::{FrameStack, MotionField, PyramidComposer, PyramidParams};
use crate::optimizer::Adam;
use crate::telemetry::TelemetrySink;
use crate::training::checkpoint::{CheckpointDescription, CheckpointManager};
use crate::training::data_loader::BatchProducer;
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;

pub struct TrainingLoop {
	composer: PyramidComposer,
	params: PyramidParams,
	optimizer: Adam,
	config: TrainingConfig,
	start_iteration: u64,
}

impl TrainingLoop {
	pub fn new(config: TrainingConfig) -> Result<Self> {
		config.validate()?;
		let mut rng = StdRng::seed_from_u64(config.seed);
		let composer = PyramidComposer::new(config.num_scales, config.input_channels)?;
		let params = PyramidParams::init(config.num_scales, config.input_channels, &mut rng)?;
		let optimizer = Adam::new(config.learning_rate);
		Ok(TrainingLoop {
			composer,
			params,
			optimizer,
			config,
			start_iteration: 0,
		})
	}

	pub fn params(&self) -> &PyramidParams {
		&self.params
	}

	pub fn composer(&self) -> &PyramidComposer {
		&self.composer
	}

	pub fn start_iteration(&self) -> u64 {
		self.start_iteration
	}

	/// Adopts a checkpoint's parameters. The checkpoint carries the count of
	/// completed steps, which is also the next 0-based iteration to run.
	/// Adam restarts cold since checkpoints do not carry moment estimates.
	pub fn restore(&mut self, desc: CheckpointDescription) -> Result<()> {
		self.params.set.load_arrays(desc.parameters)?;
		self.start_iteration = desc.iteration;
		self.optimizer.reset();
		info!("restored parameters saved after {} iterations", desc.iteration);
		Ok(())
	}

	/// One gradient step on a batch. Returns the regularized loss.
	fn train_step(&mut self, frames: &FrameStack, target: &MotionField) -> Result<f32> {
		self.params.set.zero_grads();
		let (predicted, cache) = self.composer.forward(&self.params, frames)?;
		let (data_loss, grad_flow) = squared_epe_with_grad(&predicted, target)?;
		let penalty = self.params.set.weight_penalty(WEIGHT_DECAY);
		self.composer.backward(&mut self.params, &cache, &grad_flow)?;
		self.optimizer.step(&mut self.params.set);
		let loss = data_loss + penalty;
		if !loss.is_finite() {
			return Err(FlowError::Training(format!(
				"non-finite loss {} (data {}, penalty {})",
				loss, data_loss, penalty
			)));
		}
		Ok(loss)
	}

	/// Full pass over the held-out set in batch-sized chunks, aggregated
	/// pixel-exactly across chunks.
	pub fn validate(&self, set: &ValidationSet, segment_thresholds: &[f32]) -> Result<ValidationReport> {
		if set.is_empty() {
			return Err(FlowError::Validation("validation set is empty".to_string()));
		}
		let chunk = self.config.batch_size.max(1);
		let chunks = (set.len() + chunk - 1) / chunk;
		let bar = ProgressBar::new(chunks as u64);
		bar.set_style(
			ProgressStyle::with_template("validating [{bar:30}] {pos}/{len} chunks")
				.map_err(|e| FlowError::Validation(e.to_string()))?,
		);
		let mut acc = SegmentedAccumulator::with_thresholds(segment_thresholds);
		for start in (0..set.len()).step_by(chunk) {
			let (frames, target) = set.chunk(start, start + chunk);
			let predicted = self.composer.predict(&self.params, &frames)?;
			acc.accumulate(&predicted, &target)?;
			bar.inc(1);
		}
		bar.finish_and_clear();
		Ok(acc.report())
	}

	/// Runs from the start iteration (0 or post-restore) to the configured
	/// total. Validation and snapshot failures are logged and skipped; data
	/// and step failures abort the run with the failing iteration.
	pub fn run(
		&mut self,
		producer: &BatchProducer,
		validation: Option<&ValidationSet>,
		checkpoints: &CheckpointManager,
		telemetry: &mut dyn TelemetrySink,
	) -> Result<()> {
		let total = self.config.iterations;
		let started = Instant::now();
		let first = self.start_iteration;
		if first >= total {
			info!("nothing to do: start iteration {} >= total {}", first, total);
			return Ok(());
		}
		info!("training iterations {}..{}", first, total);

		let mut window_loss = 0.0f64;
		let mut window_steps = 0u64;
		for iteration in first..total {
			let (frames, target) = producer
				.next_batch()
				.map_err(|e| FlowError::Training(format!("batch load at iteration {}: {}", iteration, e)))?;
			let loss = self
				.train_step(&frames, &target)
				.map_err(|e| FlowError::Training(format!("step at iteration {}: {}", iteration, e)))?;
			telemetry.training_loss(iteration, loss);
			window_loss += loss as f64;
			window_steps += 1;

			let step = iteration + 1;
			if step % self.config.print_interval == 0 {
				let done = step - first;
				let elapsed = started.elapsed();
				let per_step = elapsed / done.max(1) as u32;
				let remaining = per_step * (total - step) as u32;
				info!(
					"iteration {}/{}  loss {:.6}  ({:.2} steps/s, ~{} left)",
					step,
					total,
					window_loss / window_steps as f64,
					done as f64 / elapsed.as_secs_f64().max(1e-9),
					HumanDuration(remaining)
				);
				window_loss = 0.0;
				window_steps = 0;
			}

			if step % self.config.validation_interval == 0 {
				if let Some(set) = validation {
					match self.validate(set, &self.config.segment_thresholds) {
						Ok(report) => {
							log_validation(iteration, &report);
							telemetry.validation(iteration, &report);
						},
						Err(e) => {
							warn!("validation at iteration {} failed, continuing: {}", iteration, e)
						},
					}
				}
			}

			if step % self.config.snapshot_interval == 0 {
				self.snapshot(step, checkpoints);
			}
		}

		// final state always gets a snapshot, cadence-aligned or not
		if total % self.config.snapshot_interval != 0 {
			self.snapshot(total, checkpoints);
		}
		info!("training finished after {}", HumanDuration(started.elapsed()));
		Ok(())
	}

	/// `steps` is the count of completed steps the snapshot represents; it
	/// keys the file name and rides along in the checkpoint itself.
	fn snapshot(&self, steps: u64, checkpoints: &CheckpointManager) {
		match checkpoints.save(steps, self.params.set.to_arrays()) {
			Ok(path) => info!("saved snapshot {}", path.display()),
			Err(e) => warn!("snapshot after {} steps failed, continuing: {}", steps, e),
		}
	}
}

fn log_validation(iteration: u64, report: &ValidationReport) {
	info!("validation at iteration {}: EPE {:.4}", iteration, report.overall);
	for (i, segment) in report.segments.iter().enumerate() {
		match segment.error {
			Some(error) => info!(
				"  speed segment {}: EPE {:.4} over {} px",
				i, error, segment.pixels
			),
			None => info!("  speed segment {}: no pixels", i),
		}
	}
}
