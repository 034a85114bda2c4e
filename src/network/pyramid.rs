//! Multi-scale composition of MSOE cells: one full-resolution cell with its
//! own parameters, plus N-1 weight-tied cells on blurred-and-downsampled
//! copies of the input, fused back at full resolution into a motion field.

use crate::constants::network::*;
use crate::constants::pyramid::*;
use crate::error::{FlowError, Result};
use crate::network::cell::{CellCache, MotionFeatureCell};
use crate::network::params::{xavier_conv, FrameStack, MotionField, ParamId, ParamSet};
use crate::ops::{
	bilinear_resize, bilinear_resize_adjoint, blur_downsample, conv2d_same, conv2d_same_backward, gaussian_kernel,
};
use ndarray::{concatenate, s, Array4, ArrayD, Ix1, Ix4, IxDyn};
use rand::Rng;

/// Learnable state of the whole pyramid. Construction registers level 0's
/// private cell, the shared prototype used by every coarser level, and the
/// two fusion convolutions.
pub struct PyramidParams {
	pub set: ParamSet,
	level0: MotionFeatureCell,
	shared: MotionFeatureCell,
	fuse_w: ParamId,
	fuse_b: ParamId,
	out_w: ParamId,
	out_b: ParamId,
}

pub struct PyramidComposer {
	pub num_scales: usize,
	pub input_channels: usize,
	blur: Vec<f32>,
}

pub struct PyramidCache {
	cells: Vec<CellCache>,
	cell_dims: Vec<(usize, usize, usize, usize)>,
	concat: Array4<f32>,
	fused: Array4<f32>,
}

impl PyramidParams {
	pub fn init<R: Rng>(num_scales: usize, input_channels: usize, rng: &mut R) -> Result<Self> {
		if num_scales == 0 {
			return Err(FlowError::Config("pyramid depth must be at least 1".into()));
		}
		let mut set = ParamSet::new();
		let level0 = MotionFeatureCell::register(&mut set, "msoe_0", input_channels, rng);
		let shared = MotionFeatureCell::register(&mut set, "msoe_shared", input_channels, rng);
		let fuse_in = CONV3_FILTERS * num_scales;
		let fuse_w = set.register(
			"fuse/conv4_w",
			xavier_conv(rng, &[FUSE_KERNEL, FUSE_KERNEL, fuse_in, FUSE_FILTERS]),
			true,
		);
		let fuse_b = set.register("fuse/conv4_b", ArrayD::zeros(IxDyn(&[FUSE_FILTERS])), false);
		let out_w = set.register("fuse/conv5_w", xavier_conv(rng, &[1, 1, FUSE_FILTERS, FLOW_CHANNELS]), true);
		let out_b = set.register("fuse/conv5_b", ArrayD::zeros(IxDyn(&[FLOW_CHANNELS])), false);
		Ok(PyramidParams {
			set,
			level0,
			shared,
			fuse_w,
			fuse_b,
			out_w,
			out_b,
		})
	}

	/// The prototype cell whose parameters every level >= 1 references.
	pub fn shared_cell(&self) -> &MotionFeatureCell {
		&self.shared
	}

	pub fn level0_cell(&self) -> &MotionFeatureCell {
		&self.level0
	}
}

impl PyramidComposer {
	pub fn new(num_scales: usize, input_channels: usize) -> Result<Self> {
		if num_scales == 0 {
			return Err(FlowError::Config("pyramid depth must be at least 1".into()));
		}
		Ok(PyramidComposer {
			num_scales,
			input_channels,
			blur: gaussian_kernel(BLUR_KERNEL, BLUR_SIGMA),
		})
	}

	/// Rejects geometries whose coarsest level would fall below the cell's
	/// minimum input size. Checked before any computation.
	pub fn check_geometry(&self, height: usize, width: usize) -> Result<()> {
		let (mut h, mut w) = (height, width);
		for level in 0..self.num_scales {
			if h < MIN_CELL_INPUT || w < MIN_CELL_INPUT {
				return Err(FlowError::Config(format!(
					"pyramid level {} would be {}x{}, below the {}px minimum; reduce num_scales ({}) or use larger frames",
					level, h, w, MIN_CELL_INPUT, self.num_scales
				)));
			}
			h = (h + DOWNSAMPLE_STRIDE - 1) / DOWNSAMPLE_STRIDE;
			w = (w + DOWNSAMPLE_STRIDE - 1) / DOWNSAMPLE_STRIDE;
		}
		Ok(())
	}

	/// Full forward pass: `[batch, h, w, c]` frame pair in, `[batch, h, w, 2]`
	/// motion field out. Pure given identical input and parameters.
	pub fn forward(&self, params: &PyramidParams, stack: &FrameStack) -> Result<(MotionField, PyramidCache)> {
		if stack.channels() != self.input_channels {
			return Err(FlowError::ShapeMismatch(format!(
				"expected {} input channels, frame stack has {}",
				self.input_channels,
				stack.channels()
			)));
		}
		self.check_geometry(stack.height(), stack.width())?;
		let (height, width) = (stack.height(), stack.width());

		let normalized = contrast_normalize(stack);

		let mut cells = Vec::with_capacity(self.num_scales);
		let mut cell_dims = Vec::with_capacity(self.num_scales);
		let mut upsampled = Vec::with_capacity(self.num_scales);
		let mut current = normalized;
		for level in 0..self.num_scales {
			if level > 0 {
				current = FrameStack {
					prev: blur_downsample(&current.prev, &self.blur, DOWNSAMPLE_STRIDE),
					next: blur_downsample(&current.next, &self.blur, DOWNSAMPLE_STRIDE),
				};
			}
			let cell = if level == 0 { &params.level0 } else { &params.shared };
			let (out, cache) = cell.forward(&params.set, &current)?;
			cell_dims.push(out.dim());
			// every level comes back to level-0 resolution, level 0 included
			// (pooling trimmed its border)
			upsampled.push(bilinear_resize(&out, height, width));
			cells.push(cache);
		}

		let views: Vec<_> = upsampled.iter().map(|u| u.view()).collect();
		let concat = concatenate(ndarray::Axis(3), &views)?;

		let fuse_w = params.set.value(params.fuse_w).into_dimensionality::<Ix4>()?.to_owned();
		let fuse_b = params.set.value(params.fuse_b).into_dimensionality::<Ix1>()?.to_owned();
		let fused = conv2d_same(&concat, fuse_w.view(), fuse_b.view())?.mapv(|v| v.max(0.0));

		let out_w = params.set.value(params.out_w).into_dimensionality::<Ix4>()?.to_owned();
		let out_b = params.set.value(params.out_b).into_dimensionality::<Ix1>()?.to_owned();
		let flow = conv2d_same(&fused, out_w.view(), out_b.view())?;

		let cache = PyramidCache {
			cells,
			cell_dims,
			concat,
			fused,
		};
		Ok((flow, cache))
	}

	/// Inference-only forward.
	pub fn predict(&self, params: &PyramidParams, stack: &FrameStack) -> Result<MotionField> {
		self.forward(params, stack).map(|(flow, _)| flow)
	}

	/// Backpropagates a motion-field gradient into every parameter gradient.
	/// Levels >= 1 accumulate into the one shared cell.
	pub fn backward(&self, params: &mut PyramidParams, cache: &PyramidCache, grad_flow: &MotionField) -> Result<()> {
		let out_w = params.set.value(params.out_w).into_dimensionality::<Ix4>()?.to_owned();
		let g_out = conv2d_same_backward(&cache.fused, out_w.view(), grad_flow, true)?;
		params.set.accumulate_grad(params.out_w, &g_out.weights.into_dyn());
		params.set.accumulate_grad(params.out_b, &g_out.bias.into_dyn());
		let mut grad_fused = g_out
			.input
			.ok_or_else(|| FlowError::Training("fusion input gradient missing".into()))?;

		grad_fused.zip_mut_with(&cache.fused, |g, &v| {
			if v <= 0.0 {
				*g = 0.0
			}
		});

		let fuse_w = params.set.value(params.fuse_w).into_dimensionality::<Ix4>()?.to_owned();
		let g_fuse = conv2d_same_backward(&cache.concat, fuse_w.view(), &grad_fused, true)?;
		params.set.accumulate_grad(params.fuse_w, &g_fuse.weights.into_dyn());
		params.set.accumulate_grad(params.fuse_b, &g_fuse.bias.into_dyn());
		let grad_concat = g_fuse
			.input
			.ok_or_else(|| FlowError::Training("concat gradient missing".into()))?;

		for (level, cell_cache) in cache.cells.iter().enumerate() {
			let lo = level * CONV3_FILTERS;
			let hi = lo + CONV3_FILTERS;
			let grad_up = grad_concat.slice(s![.., .., .., lo..hi]).to_owned();
			let (_, cell_h, cell_w, _) = cache.cell_dims[level];
			let grad_cell = bilinear_resize_adjoint(&grad_up, cell_h, cell_w);
			let cell = if level == 0 { &params.level0 } else { &params.shared };
			// split the mutable borrow: backward only touches gradient storage
			let ids_cell = MotionFeatureCell { ids: cell.ids };
			ids_cell.backward(&mut params.set, cell_cache, &grad_cell)?;
		}
		Ok(())
	}
}

/// Per-sample zero-mean, unit-variance normalization over both frames.
/// Applied once at level 0; coarser levels derive from the normalized stack.
fn contrast_normalize(stack: &FrameStack) -> FrameStack {
	let batch = stack.batch();
	let mut prev = stack.prev.clone();
	let mut next = stack.next.clone();
	let per_frame = stack.height() * stack.width() * stack.channels();
	for b in 0..batch {
		let mut sum = 0.0f32;
		let mut sum_sq = 0.0f32;
		for v in stack.prev.slice(s![b, .., .., ..]).iter().chain(stack.next.slice(s![b, .., .., ..]).iter()) {
			sum += v;
			sum_sq += v * v;
		}
		let count = (2 * per_frame) as f32;
		let mean = sum / count;
		let var = (sum_sq / count - mean * mean).max(0.0);
		let scale = 1.0 / (var.sqrt() + CONTRAST_NORM_EPSILON);
		prev.slice_mut(s![b, .., .., ..]).mapv_inplace(|v| (v - mean) * scale);
		next.slice_mut(s![b, .., .., ..]).mapv_inplace(|v| (v - mean) * scale);
	}
	FrameStack { prev, next }
}
