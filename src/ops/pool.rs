use crate::error::{FlowError, Result};
use ndarray::Array4;

/// Average pooling over a `window`×`window` spatial neighbourhood (VALID) fused
/// with the temporal collapse: the two temporal planes are averaged into one.
///
/// Both planes are `[batch, h, w, c]`; output is `[batch, h-window+1, w-window+1, c]`.
pub fn temporal_avg_pool(plane0: &Array4<f32>, plane1: &Array4<f32>, window: usize) -> Result<Array4<f32>> {
	let (batch, height, width, channels) = plane0.dim();
	if plane1.dim() != plane0.dim() {
		return Err(FlowError::ShapeMismatch(format!(
			"temporal pooling: plane shapes differ, {:?} vs {:?}",
			plane0.dim(),
			plane1.dim()
		)));
	}
	if height < window || width < window {
		return Err(FlowError::ShapeMismatch(format!(
			"temporal pooling: input {}x{} smaller than the {} pixel window",
			height, width, window
		)));
	}

	let out_h = height - window + 1;
	let out_w = width - window + 1;
	let norm = 1.0 / (2 * window * window) as f32;
	let mut output = Array4::<f32>::zeros((batch, out_h, out_w, channels));
	for b in 0..batch {
		for y in 0..out_h {
			for x in 0..out_w {
				for c in 0..channels {
					let mut acc = 0.0;
					for dy in 0..window {
						for dx in 0..window {
							acc += plane0[[b, y + dy, x + dx, c]] + plane1[[b, y + dy, x + dx, c]];
						}
					}
					output[[b, y, x, c]] = acc * norm;
				}
			}
		}
	}
	Ok(output)
}

/// Backward pass of [`temporal_avg_pool`]: distributes each output gradient
/// uniformly over its contributing window in both temporal planes.
pub fn temporal_avg_pool_backward(
	grad_output: &Array4<f32>,
	input_dim: (usize, usize, usize, usize),
	window: usize,
) -> (Array4<f32>, Array4<f32>) {
	let (batch, _, _, channels) = input_dim;
	let (_, out_h, out_w, _) = grad_output.dim();
	let norm = 1.0 / (2 * window * window) as f32;
	let mut grad0 = Array4::<f32>::zeros(input_dim);
	let mut grad1 = Array4::<f32>::zeros(input_dim);
	for b in 0..batch {
		for y in 0..out_h {
			for x in 0..out_w {
				for c in 0..channels {
					let g = grad_output[[b, y, x, c]] * norm;
					if g == 0.0 {
						continue;
					}
					for dy in 0..window {
						for dx in 0..window {
							grad0[[b, y + dy, x + dx, c]] += g;
							grad1[[b, y + dy, x + dx, c]] += g;
						}
					}
				}
			}
		}
	}
	(grad0, grad1)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn constant_planes_pool_to_their_mean() {
		let plane0 = Array4::from_elem((1, 7, 7, 2), 2.0f32);
		let plane1 = Array4::from_elem((1, 7, 7, 2), 4.0f32);
		let out = temporal_avg_pool(&plane0, &plane1, 5).unwrap();
		assert_eq!(out.dim(), (1, 3, 3, 2));
		assert!(out.iter().all(|v| (v - 3.0).abs() < 1e-6));
	}

	#[test]
	fn backward_distributes_uniformly() {
		let dim = (1, 5, 5, 1);
		let grad_out = Array4::from_elem((1, 1, 1, 1), 50.0f32);
		let (g0, g1) = temporal_avg_pool_backward(&grad_out, dim, 5);
		// every input position contributes once with weight 1/(2*25)
		assert!(g0.iter().all(|v| (v - 1.0).abs() < 1e-6));
		assert!(g1.iter().all(|v| (v - 1.0).abs() < 1e-6));
	}

	#[test]
	fn rejects_undersized_input() {
		let plane = Array4::<f32>::zeros((1, 4, 4, 1));
		assert!(temporal_avg_pool(&plane, &plane, 5).is_err());
	}
}
