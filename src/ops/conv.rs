use crate::error::{FlowError, Result};
use ndarray::{Array1, Array4, ArrayView1, ArrayView3, ArrayView4, ArrayViewMut3, Axis, Zip};

/// SAME-padding 2-D convolution.
///
/// `input` is `[batch, h, w, c_in]`, `weights` is `[k, k, c_in, c_out]` with odd `k`,
/// `bias` is `[c_out]`. Output is `[batch, h, w, c_out]`. Batches run in parallel.
pub fn conv2d_same(input: &Array4<f32>, weights: ArrayView4<f32>, bias: ArrayView1<f32>) -> Result<Array4<f32>> {
	let (batch, height, width, c_in) = input.dim();
	let (k_h, k_w, w_in, c_out) = weights.dim();
	check_kernel(k_h, k_w, w_in, c_in, c_out, bias.len())?;

	let mut output = Array4::<f32>::zeros((batch, height, width, c_out));
	Zip::from(output.axis_iter_mut(Axis(0)))
		.and(input.axis_iter(Axis(0)))
		.par_for_each(|out, inp| conv_single(inp, weights, bias, out));
	Ok(output)
}

fn conv_single(input: ArrayView3<f32>, weights: ArrayView4<f32>, bias: ArrayView1<f32>, mut output: ArrayViewMut3<f32>) {
	let (height, width, c_in) = input.dim();
	let (k_h, k_w, _, c_out) = weights.dim();
	let pad = (k_h - 1) / 2;

	for y in 0..height {
		for x in 0..width {
			for co in 0..c_out {
				output[[y, x, co]] = bias[co];
			}
			for dy in 0..k_h {
				let iy = (y + dy) as isize - pad as isize;
				if iy < 0 || iy >= height as isize {
					continue;
				}
				for dx in 0..k_w {
					let ix = (x + dx) as isize - pad as isize;
					if ix < 0 || ix >= width as isize {
						continue;
					}
					for ci in 0..c_in {
						let v = input[[iy as usize, ix as usize, ci]];
						if v == 0.0 {
							continue;
						}
						for co in 0..c_out {
							output[[y, x, co]] += v * weights[[dy, dx, ci, co]];
						}
					}
				}
			}
		}
	}
}

/// Gradients produced by [`conv2d_same_backward`].
pub struct ConvGrads {
	pub weights: Array4<f32>,
	pub bias: Array1<f32>,
	/// Present only when the caller asked for it (cell inputs are data).
	pub input: Option<Array4<f32>>,
}

/// Backward pass of [`conv2d_same`]. `grad_output` must match the forward output shape.
pub fn conv2d_same_backward(
	input: &Array4<f32>,
	weights: ArrayView4<f32>,
	grad_output: &Array4<f32>,
	need_input_grad: bool,
) -> Result<ConvGrads> {
	let (batch, height, width, c_in) = input.dim();
	let (k_h, k_w, w_in, c_out) = weights.dim();
	check_kernel(k_h, k_w, w_in, c_in, c_out, c_out)?;
	if grad_output.dim() != (batch, height, width, c_out) {
		return Err(FlowError::ShapeMismatch(format!(
			"conv2d backward: gradient shape {:?} does not match output shape {:?}",
			grad_output.dim(),
			(batch, height, width, c_out)
		)));
	}

	let pad = (k_h - 1) / 2;
	let mut grad_weights = Array4::<f32>::zeros((k_h, k_w, c_in, c_out));
	let mut grad_bias = Array1::<f32>::zeros(c_out);
	let mut grad_input = if need_input_grad {
		Some(Array4::<f32>::zeros((batch, height, width, c_in)))
	} else {
		None
	};

	for b in 0..batch {
		for y in 0..height {
			for x in 0..width {
				for co in 0..c_out {
					grad_bias[co] += grad_output[[b, y, x, co]];
				}
				for dy in 0..k_h {
					let iy = (y + dy) as isize - pad as isize;
					if iy < 0 || iy >= height as isize {
						continue;
					}
					for dx in 0..k_w {
						let ix = (x + dx) as isize - pad as isize;
						if ix < 0 || ix >= width as isize {
							continue;
						}
						for ci in 0..c_in {
							let v = input[[b, iy as usize, ix as usize, ci]];
							for co in 0..c_out {
								let g = grad_output[[b, y, x, co]];
								grad_weights[[dy, dx, ci, co]] += v * g;
								if let Some(gi) = grad_input.as_mut() {
									gi[[b, iy as usize, ix as usize, ci]] += weights[[dy, dx, ci, co]] * g;
								}
							}
						}
					}
				}
			}
		}
	}

	Ok(ConvGrads {
		weights: grad_weights,
		bias: grad_bias,
		input: grad_input,
	})
}

fn check_kernel(k_h: usize, k_w: usize, w_in: usize, c_in: usize, _c_out: usize, bias_len: usize) -> Result<()> {
	if k_h != k_w || k_h % 2 == 0 {
		return Err(FlowError::Config(format!(
			"convolution kernels must be square with odd extent, got {}x{}",
			k_h, k_w
		)));
	}
	if w_in != c_in {
		return Err(FlowError::ShapeMismatch(format!(
			"convolution expects {} input channels, input has {}",
			w_in, c_in
		)));
	}
	if bias_len == 0 {
		return Err(FlowError::ShapeMismatch("convolution bias is empty".into()));
	}
	Ok(())
}
