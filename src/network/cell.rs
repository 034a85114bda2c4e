//! The MSOE motion-feature cell: a fixed 3-convolution block whose squared
//! first-stage response approximates motion-energy filtering. One instance
//! runs per pyramid level; levels above 0 share one prototype's parameters.

use crate::constants::network::*;
use crate::error::{FlowError, Result};
use crate::network::params::{xavier_conv, FrameStack, ParamId, ParamSet};
use crate::ops::{conv2d_same, conv2d_same_backward, temporal_avg_pool, temporal_avg_pool_backward};
use ndarray::{Array1, Array4, ArrayD, Axis, Ix1, Ix4, IxDyn};
use rand::Rng;

/// Registry indices of one cell's learnable tensors. Copyable on purpose:
/// handing the same value to several levels is what ties their weights.
#[derive(Debug, Clone, Copy)]
pub struct CellParamIds {
	pub conv1_w: ParamId,
	pub conv1_b: ParamId,
	pub conv2_w: ParamId,
	pub conv2_b: ParamId,
	pub conv3_w: ParamId,
	pub conv3_b: ParamId,
}

pub struct MotionFeatureCell {
	pub ids: CellParamIds,
}

/// Intermediate activations kept for the backward pass.
pub struct CellCache {
	stack: FrameStack,
	plane0: Array4<f32>,
	plane1: Array4<f32>,
	pooled: Array4<f32>,
	conv2_out: Array4<f32>,
	relu1: Array4<f32>,
	output: Array4<f32>,
}

impl MotionFeatureCell {
	/// Registers a fresh set of cell parameters under `prefix`.
	pub fn register<R: Rng>(set: &mut ParamSet, prefix: &str, input_channels: usize, rng: &mut R) -> Self {
		let conv1_w = set.register(
			&format!("{}/conv1_w", prefix),
			xavier_conv(rng, &[TEMPORAL_EXTENT, CONV1_KERNEL, CONV1_KERNEL, input_channels, CONV1_FILTERS]),
			true,
		);
		let conv1_b = set.register(
			&format!("{}/conv1_b", prefix),
			ArrayD::zeros(IxDyn(&[CONV1_FILTERS])),
			false,
		);
		let conv2_w = set.register(
			&format!("{}/conv2_w", prefix),
			xavier_conv(rng, &[1, 1, CONV1_FILTERS, CONV2_FILTERS]),
			true,
		);
		let conv2_b = set.register(
			&format!("{}/conv2_b", prefix),
			ArrayD::zeros(IxDyn(&[CONV2_FILTERS])),
			false,
		);
		let conv3_w = set.register(
			&format!("{}/conv3_w", prefix),
			xavier_conv(rng, &[CONV3_KERNEL, CONV3_KERNEL, CONV2_FILTERS, CONV3_FILTERS]),
			true,
		);
		let conv3_b = set.register(
			&format!("{}/conv3_b", prefix),
			ArrayD::zeros(IxDyn(&[CONV3_FILTERS])),
			false,
		);
		MotionFeatureCell {
			ids: CellParamIds {
				conv1_w,
				conv1_b,
				conv2_w,
				conv2_b,
				conv3_w,
				conv3_b,
			},
		}
	}

	/// A cell that reuses the parameters of `prototype` instead of owning any.
	pub fn shared(prototype: &MotionFeatureCell) -> Self {
		MotionFeatureCell { ids: prototype.ids }
	}

	/// Runs the cell on a frame pair. Output is `[batch, h-4, w-4, 128]`.
	pub fn forward(&self, set: &ParamSet, stack: &FrameStack) -> Result<(Array4<f32>, CellCache)> {
		if stack.height() < MIN_CELL_INPUT || stack.width() < MIN_CELL_INPUT {
			return Err(FlowError::Config(format!(
				"cell input {}x{} is smaller than the {}px receptive field of conv1 + pooling",
				stack.height(),
				stack.width(),
				MIN_CELL_INPUT
			)));
		}

		let ids = &self.ids;
		let w1 = set.value(ids.conv1_w);
		let w1_t0 = w1.index_axis(Axis(0), 0).into_dimensionality::<Ix4>()?.to_owned();
		let w1_t1 = w1.index_axis(Axis(0), 1).into_dimensionality::<Ix4>()?.to_owned();
		let b1 = set.value(ids.conv1_b).into_dimensionality::<Ix1>()?.to_owned();
		let zero_bias = Array1::<f32>::zeros(CONV1_FILTERS);

		// stage 1: convolution spanning the frame pair (SAME temporal padding,
		// so plane 1 pairs the second frame with zeros)
		let mut plane0 = conv2d_same(&stack.prev, w1_t0.view(), b1.view())?;
		plane0 += &conv2d_same(&stack.next, w1_t1.view(), zero_bias.view())?;
		let plane1 = conv2d_same(&stack.next, w1_t0.view(), b1.view())?;

		// stage 2: squared response. Motion energy is a squared quantity;
		// this is not a stand-in for ReLU.
		let sq0 = plane0.mapv(|v| v * v);
		let sq1 = plane1.mapv(|v| v * v);

		// stage 3: spatial pooling that also collapses the temporal pair
		let pooled = temporal_avg_pool(&sq0, &sq1, POOL_WINDOW)?;

		// stage 4: 1x1 widening convolution
		let w2 = set.value(ids.conv2_w).into_dimensionality::<Ix4>()?.to_owned();
		let b2 = set.value(ids.conv2_b).into_dimensionality::<Ix1>()?.to_owned();
		let conv2_out = conv2d_same(&pooled, w2.view(), b2.view())?;

		// stage 5: channel-wise L1 normalization decouples the response from
		// raw pixel contrast
		let normed = l1_normalize(&conv2_out);

		// stage 6
		let relu1 = normed.mapv(|v| v.max(0.0));

		// stage 7
		let w3 = set.value(ids.conv3_w).into_dimensionality::<Ix4>()?.to_owned();
		let b3 = set.value(ids.conv3_b).into_dimensionality::<Ix1>()?.to_owned();
		let conv3_out = conv2d_same(&relu1, w3.view(), b3.view())?;
		let output = conv3_out.mapv(|v| v.max(0.0));

		let cache = CellCache {
			stack: stack.clone(),
			plane0,
			plane1,
			pooled,
			conv2_out,
			relu1,
			output: output.clone(),
		};
		Ok((output, cache))
	}

	/// Accumulates parameter gradients for this cell. The cell's inputs are
	/// data, so no input gradient is produced.
	pub fn backward(&self, set: &mut ParamSet, cache: &CellCache, grad_output: &Array4<f32>) -> Result<()> {
		let ids = &self.ids;

		// final ReLU
		let mut grad = grad_output.clone();
		grad.zip_mut_with(&cache.output, |g, &o| {
			if o <= 0.0 {
				*g = 0.0
			}
		});

		// conv3
		let w3 = set.value(ids.conv3_w).into_dimensionality::<Ix4>()?.to_owned();
		let g3 = conv2d_same_backward(&cache.relu1, w3.view(), &grad, true)?;
		set.accumulate_grad(ids.conv3_w, &g3.weights.into_dyn());
		set.accumulate_grad(ids.conv3_b, &g3.bias.into_dyn());
		let mut grad = g3.input.ok_or_else(|| FlowError::Training("conv3 input gradient missing".into()))?;

		// ReLU over the normalized response
		grad.zip_mut_with(&cache.relu1, |g, &r| {
			if r <= 0.0 {
				*g = 0.0
			}
		});

		// channel-wise L1 normalization
		let grad = l1_normalize_backward(&cache.conv2_out, &grad);

		// conv2
		let w2 = set.value(ids.conv2_w).into_dimensionality::<Ix4>()?.to_owned();
		let g2 = conv2d_same_backward(&cache.pooled, w2.view(), &grad, true)?;
		set.accumulate_grad(ids.conv2_w, &g2.weights.into_dyn());
		set.accumulate_grad(ids.conv2_b, &g2.bias.into_dyn());
		let grad_pooled = g2.input.ok_or_else(|| FlowError::Training("conv2 input gradient missing".into()))?;

		// pooling, then the squaring nonlinearity
		let (mut grad_sq0, mut grad_sq1) = temporal_avg_pool_backward(&grad_pooled, cache.plane0.dim(), POOL_WINDOW);
		grad_sq0.zip_mut_with(&cache.plane0, |g, &v| *g *= 2.0 * v);
		grad_sq1.zip_mut_with(&cache.plane1, |g, &v| *g *= 2.0 * v);

		// conv1: temporal tap 0 sees (prev -> plane0) and (next -> plane1),
		// temporal tap 1 sees (next -> plane0)
		let w1 = set.value(ids.conv1_w).to_owned();
		let w1_t0 = w1.index_axis(Axis(0), 0).into_dimensionality::<Ix4>()?.to_owned();
		let w1_t1 = w1.index_axis(Axis(0), 1).into_dimensionality::<Ix4>()?.to_owned();
		let ga = conv2d_same_backward(&cache.stack.prev, w1_t0.view(), &grad_sq0, false)?;
		let gb = conv2d_same_backward(&cache.stack.next, w1_t1.view(), &grad_sq0, false)?;
		let gc = conv2d_same_backward(&cache.stack.next, w1_t0.view(), &grad_sq1, false)?;

		let (k, _, c_in, f) = w1_t0.dim();
		let mut grad_w1 = ArrayD::<f32>::zeros(IxDyn(&[TEMPORAL_EXTENT, k, k, c_in, f]));
		{
			let mut t0 = grad_w1.index_axis_mut(Axis(0), 0);
			t0 += &(&ga.weights + &gc.weights).into_dyn();
			let mut t1 = grad_w1.index_axis_mut(Axis(0), 1);
			t1 += &gb.weights.into_dyn();
		}
		set.accumulate_grad(ids.conv1_w, &grad_w1);
		set.accumulate_grad(ids.conv1_b, &(&ga.bias + &gc.bias).into_dyn());
		Ok(())
	}
}

fn l1_normalize(input: &Array4<f32>) -> Array4<f32> {
	let (batch, height, width, channels) = input.dim();
	let mut output = input.clone();
	for b in 0..batch {
		for y in 0..height {
			for x in 0..width {
				let mut sum = L1_NORM_EPSILON;
				for c in 0..channels {
					sum += input[[b, y, x, c]].abs();
				}
				for c in 0..channels {
					output[[b, y, x, c]] /= sum;
				}
			}
		}
	}
	output
}

fn l1_normalize_backward(input: &Array4<f32>, grad_output: &Array4<f32>) -> Array4<f32> {
	let (batch, height, width, channels) = input.dim();
	let mut grad_input = Array4::<f32>::zeros(input.raw_dim());
	for b in 0..batch {
		for y in 0..height {
			for x in 0..width {
				let mut sum = L1_NORM_EPSILON;
				let mut dot = 0.0;
				for c in 0..channels {
					sum += input[[b, y, x, c]].abs();
				}
				for c in 0..channels {
					dot += grad_output[[b, y, x, c]] * input[[b, y, x, c]];
				}
				for c in 0..channels {
					let sign = if input[[b, y, x, c]] > 0.0 {
						1.0
					} else if input[[b, y, x, c]] < 0.0 {
						-1.0
					} else {
						0.0
					};
					grad_input[[b, y, x, c]] = grad_output[[b, y, x, c]] / sum - sign * dot / (sum * sum);
				}
			}
		}
	}
	grad_input
}
