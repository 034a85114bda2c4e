//! Endpoint-error metrics between predicted and ground-truth motion fields:
//! the scalar training loss (squared EPE plus weight penalty), the validation
//! EPE, and the speed-segmented EPE used to expose accuracy loss at high
//! ground-truth speeds.

use crate::constants::metrics::{NUM_SEGMENTS, SPEED_THRESHOLDS};
use crate::error::{FlowError, Result};
use crate::network::MotionField;
use ndarray::Array4;

fn check_shapes(predicted: &MotionField, target: &MotionField) -> Result<()> {
	if predicted.dim() != target.dim() {
		return Err(FlowError::ShapeMismatch(format!(
			"prediction shape {:?} does not match target shape {:?}",
			predicted.dim(),
			target.dim()
		)));
	}
	Ok(())
}

fn pixel_count(field: &MotionField) -> usize {
	let (batch, height, width, _) = field.dim();
	batch * height * width
}

/// Mean endpoint error: the Euclidean distance between predicted and true
/// motion vectors, averaged over every pixel.
pub fn epe(predicted: &MotionField, target: &MotionField) -> Result<f32> {
	check_shapes(predicted, target)?;
	let (batch, height, width, _) = predicted.dim();
	let mut sum = 0.0f32;
	for b in 0..batch {
		for y in 0..height {
			for x in 0..width {
				let du = predicted[[b, y, x, 0]] - target[[b, y, x, 0]];
				let dv = predicted[[b, y, x, 1]] - target[[b, y, x, 1]];
				sum += (du * du + dv * dv).sqrt();
			}
		}
	}
	Ok(sum / pixel_count(predicted) as f32)
}

/// Training loss: mean squared endpoint error, with its gradient with respect
/// to the prediction. The weight-regularization penalty is added by the
/// caller from the parameter registry (it does not depend on the batch).
pub fn squared_epe_with_grad(predicted: &MotionField, target: &MotionField) -> Result<(f32, MotionField)> {
	check_shapes(predicted, target)?;
	let count = pixel_count(predicted) as f32;
	let diff = predicted - target;
	let loss = diff.mapv(|v| v * v).sum() / count;
	let grad = diff.mapv(|v| 2.0 * v / count);
	Ok((loss, grad))
}

/// One magnitude bucket's outcome over a validation pass. A bucket with no
/// member pixels is explicitly absent rather than a division by zero.
#[derive(Debug, Clone, Copy)]
pub struct SegmentError {
	pub pixels: u64,
	pub error: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
	pub overall: f32,
	pub segments: Vec<SegmentError>,
}

/// Accumulates endpoint-error sums and pixel counts across an entire
/// validation pass, bucketed by ground-truth speed. Dividing once at the end
/// keeps unequal per-batch bucket occupancy from biasing the result.
#[derive(Debug, Clone)]
pub struct SegmentedAccumulator {
	thresholds: Vec<f32>,
	error_sums: Vec<f64>,
	counts: Vec<u64>,
	total_error: f64,
	total_count: u64,
}

impl SegmentedAccumulator {
	pub fn new() -> Self {
		Self::with_thresholds(&SPEED_THRESHOLDS)
	}

	/// `thresholds` are the ascending upper bounds of all buckets except the
	/// open-ended last one.
	pub fn with_thresholds(thresholds: &[f32]) -> Self {
		let segments = thresholds.len() + 1;
		SegmentedAccumulator {
			thresholds: thresholds.to_vec(),
			error_sums: vec![0.0; segments],
			counts: vec![0; segments],
			total_error: 0.0,
			total_count: 0,
		}
	}

	pub fn num_segments(&self) -> usize {
		self.thresholds.len() + 1
	}

	fn bucket(&self, speed: f32) -> usize {
		self.thresholds.iter().position(|&t| speed < t).unwrap_or(self.thresholds.len())
	}

	/// Folds one prediction/target chunk into the running sums.
	pub fn accumulate(&mut self, predicted: &MotionField, target: &MotionField) -> Result<()> {
		check_shapes(predicted, target)?;
		let (batch, height, width, _) = predicted.dim();
		for b in 0..batch {
			for y in 0..height {
				for x in 0..width {
					let tu = target[[b, y, x, 0]];
					let tv = target[[b, y, x, 1]];
					let du = predicted[[b, y, x, 0]] - tu;
					let dv = predicted[[b, y, x, 1]] - tv;
					let err = (du * du + dv * dv).sqrt() as f64;
					let speed = (tu * tu + tv * tv).sqrt();
					let seg = self.bucket(speed);
					self.error_sums[seg] += err;
					self.counts[seg] += 1;
					self.total_error += err;
					self.total_count += 1;
				}
			}
		}
		Ok(())
	}

	pub fn report(&self) -> ValidationReport {
		let segments = self
			.error_sums
			.iter()
			.zip(&self.counts)
			.map(|(&sum, &count)| SegmentError {
				pixels: count,
				error: if count > 0 { Some((sum / count as f64) as f32) } else { None },
			})
			.collect();
		let overall = if self.total_count > 0 {
			(self.total_error / self.total_count as f64) as f32
		} else {
			f32::NAN
		};
		ValidationReport { overall, segments }
	}
}

impl Default for SegmentedAccumulator {
	fn default() -> Self {
		Self::new()
	}
}

/// Single-batch segmented EPE, mostly useful for spot checks and tests.
pub fn epe_segmented(predicted: &MotionField, target: &MotionField) -> Result<ValidationReport> {
	let mut acc = SegmentedAccumulator::new();
	acc.accumulate(predicted, target)?;
	Ok(acc.report())
}

/// Builds a uniform-motion field, handy for synthetic data and tests.
pub fn constant_flow(batch: usize, height: usize, width: usize, u: f32, v: f32) -> MotionField {
	Array4::from_shape_fn((batch, height, width, 2), |(_, _, _, c)| if c == 0 { u } else { v })
}

#[cfg(test)]
mod tests {
	use super::*;
	use ndarray::Array4;

	fn field(batch: usize, size: usize, f: impl Fn(usize, usize, usize) -> (f32, f32)) -> MotionField {
		Array4::from_shape_fn((batch, size, size, 2), |(_, y, x, c)| {
			let (u, v) = f(y, x, c);
			if c == 0 {
				u
			} else {
				v
			}
		})
	}

	#[test]
	fn epe_of_identical_fields_is_zero() {
		let p = field(2, 8, |y, x, _| (y as f32, x as f32 * 0.5));
		assert_eq!(epe(&p, &p).unwrap(), 0.0);
	}

	#[test]
	fn epe_is_symmetric_under_joint_sign_flip() {
		let p = field(1, 6, |y, x, _| (y as f32 - 2.0, x as f32));
		let t = field(1, 6, |y, x, _| (x as f32, y as f32 * 0.3));
		let a = epe(&p, &t).unwrap();
		let b = epe(&p.mapv(|v| -v), &t.mapv(|v| -v)).unwrap();
		assert!((a - b).abs() < 1e-6);
	}

	#[test]
	fn epe_is_not_translation_invariant() {
		// shifting only the prediction changes the error by exactly the shift norm
		let p = constant_flow(1, 4, 4, 0.0, 0.0);
		let t = constant_flow(1, 4, 4, 0.0, 0.0);
		assert_eq!(epe(&p, &t).unwrap(), 0.0);
		let shifted = constant_flow(1, 4, 4, 3.0, 4.0);
		assert!((epe(&shifted, &t).unwrap() - 5.0).abs() < 1e-6);
		// while shifting both leaves it unchanged
		let t_shifted = constant_flow(1, 4, 4, 3.0, 4.0);
		assert_eq!(epe(&shifted, &t_shifted).unwrap(), 0.0);
	}

	#[test]
	fn shape_mismatch_is_an_error() {
		let p = constant_flow(1, 4, 4, 0.0, 0.0);
		let t = constant_flow(1, 4, 5, 0.0, 0.0);
		assert!(epe(&p, &t).is_err());
	}

	#[test]
	fn squared_epe_gradient_points_from_target_to_prediction() {
		let p = constant_flow(1, 2, 2, 1.0, 0.0);
		let t = constant_flow(1, 2, 2, 0.0, 0.0);
		let (loss, grad) = squared_epe_with_grad(&p, &t).unwrap();
		assert!((loss - 1.0).abs() < 1e-6);
		// d/dp mean||p-t||^2 = 2(p-t)/count, count = 4 pixels
		assert!((grad[[0, 0, 0, 0]] - 0.5).abs() < 1e-6);
		assert!(grad[[0, 0, 0, 1]].abs() < 1e-6);
	}

	#[test]
	fn segment_sums_recover_overall_epe() {
		let p = field(1, 8, |y, x, _| (y as f32 * 1.3, x as f32 * 0.7));
		let t = field(1, 8, |y, x, _| (x as f32 * 2.0, y as f32 * 5.0));
		let report = epe_segmented(&p, &t).unwrap();
		let overall = epe(&p, &t).unwrap();
		let total_pixels: u64 = report.segments.iter().map(|s| s.pixels).sum();
		assert_eq!(total_pixels, 64);
		let weighted: f64 = report
			.segments
			.iter()
			.filter_map(|s| s.error.map(|e| e as f64 * s.pixels as f64))
			.sum();
		assert!((weighted / total_pixels as f64 - overall as f64).abs() < 1e-4);
	}

	#[test]
	fn zero_fields_fill_only_the_slowest_bucket() {
		let p = constant_flow(2, 4, 4, 0.0, 0.0);
		let report = epe_segmented(&p, &p).unwrap();
		assert_eq!(report.overall, 0.0);
		assert_eq!(report.segments.len(), NUM_SEGMENTS);
		assert_eq!(report.segments[0].error, Some(0.0));
		for seg in &report.segments[1..] {
			assert_eq!(seg.pixels, 0);
			assert!(seg.error.is_none());
		}
	}

	#[test]
	fn chunked_accumulation_matches_single_shot() {
		let p = field(4, 8, |y, x, _| (y as f32 - x as f32, 0.4 * x as f32));
		let t = field(4, 8, |y, x, _| (0.2 * y as f32, x as f32));
		let whole = epe_segmented(&p, &t).unwrap();

		let mut acc = SegmentedAccumulator::new();
		// deliberately uneven chunks, including a partial final one
		for (start, end) in &[(0usize, 3usize), (3, 4)] {
			let pc = p.slice(ndarray::s![*start..*end, .., .., ..]).to_owned();
			let tc = t.slice(ndarray::s![*start..*end, .., .., ..]).to_owned();
			acc.accumulate(&pc, &tc).unwrap();
		}
		let chunked = acc.report();
		assert!((whole.overall - chunked.overall).abs() < 1e-6);
		for (a, b) in whole.segments.iter().zip(&chunked.segments) {
			assert_eq!(a.pixels, b.pixels);
			match (a.error, b.error) {
				(Some(x), Some(y)) => assert!((x - y).abs() < 1e-6),
				(None, None) => {},
				_ => panic!("bucket presence mismatch"),
			}
		}
	}
}
