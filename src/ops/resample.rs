use ndarray::Array4;

/// Normalized 1-D Gaussian kernel of `size` taps.
pub fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
	let centre = (size as f32 - 1.0) / 2.0;
	let mut kernel: Vec<f32> = (0..size)
		.map(|i| {
			let d = i as f32 - centre;
			(-d * d / (2.0 * sigma * sigma)).exp()
		})
		.collect();
	let sum: f32 = kernel.iter().sum();
	for v in &mut kernel {
		*v /= sum;
	}
	kernel
}

/// Separable Gaussian blur (zero padding) followed by strided subsampling.
///
/// Blur-before-subsample is what keeps the coarser pyramid levels alias-free.
/// Input `[batch, h, w, c]`, output `[batch, ceil(h/stride), ceil(w/stride), c]`.
pub fn blur_downsample(input: &Array4<f32>, kernel: &[f32], stride: usize) -> Array4<f32> {
	let (batch, height, width, channels) = input.dim();
	let radius = (kernel.len() - 1) / 2;

	// horizontal pass
	let mut horiz = Array4::<f32>::zeros((batch, height, width, channels));
	for b in 0..batch {
		for y in 0..height {
			for x in 0..width {
				for c in 0..channels {
					let mut acc = 0.0;
					for (t, k) in kernel.iter().enumerate() {
						let ix = x as isize + t as isize - radius as isize;
						if ix >= 0 && ix < width as isize {
							acc += input[[b, y, ix as usize, c]] * k;
						}
					}
					horiz[[b, y, x, c]] = acc;
				}
			}
		}
	}

	// vertical pass, sampled directly at the strided positions
	let out_h = (height + stride - 1) / stride;
	let out_w = (width + stride - 1) / stride;
	let mut output = Array4::<f32>::zeros((batch, out_h, out_w, channels));
	for b in 0..batch {
		for oy in 0..out_h {
			let y = oy * stride;
			for ox in 0..out_w {
				let x = ox * stride;
				for c in 0..channels {
					let mut acc = 0.0;
					for (t, k) in kernel.iter().enumerate() {
						let iy = y as isize + t as isize - radius as isize;
						if iy >= 0 && iy < height as isize {
							acc += horiz[[b, iy as usize, x, c]] * k;
						}
					}
					output[[b, oy, ox, c]] = acc;
				}
			}
		}
	}
	output
}

#[derive(Clone, Copy)]
struct Taps {
	lo: usize,
	hi: usize,
	frac: f32,
}

/// Source taps for one output coordinate under the legacy `src = dst * in/out`
/// mapping (the behaviour of the original graph framework's bilinear resize).
fn taps(dst: usize, in_extent: usize, out_extent: usize) -> Taps {
	let src = dst as f32 * in_extent as f32 / out_extent as f32;
	let lo = (src.floor() as usize).min(in_extent - 1);
	let hi = (lo + 1).min(in_extent - 1);
	Taps {
		lo,
		hi,
		frac: src - lo as f32,
	}
}

/// Bilinear resampling of `[batch, h, w, c]` to `[batch, out_h, out_w, c]`.
pub fn bilinear_resize(input: &Array4<f32>, out_h: usize, out_w: usize) -> Array4<f32> {
	let (batch, height, width, channels) = input.dim();
	let mut output = Array4::<f32>::zeros((batch, out_h, out_w, channels));
	for y in 0..out_h {
		let ty = taps(y, height, out_h);
		for x in 0..out_w {
			let tx = taps(x, width, out_w);
			for b in 0..batch {
				for c in 0..channels {
					let top = input[[b, ty.lo, tx.lo, c]] * (1.0 - tx.frac) + input[[b, ty.lo, tx.hi, c]] * tx.frac;
					let bottom = input[[b, ty.hi, tx.lo, c]] * (1.0 - tx.frac) + input[[b, ty.hi, tx.hi, c]] * tx.frac;
					output[[b, y, x, c]] = top * (1.0 - ty.frac) + bottom * ty.frac;
				}
			}
		}
	}
	output
}

/// Adjoint of [`bilinear_resize`]: scatters output gradients back onto the
/// source grid with the same interpolation weights.
pub fn bilinear_resize_adjoint(grad_output: &Array4<f32>, in_h: usize, in_w: usize) -> Array4<f32> {
	let (batch, out_h, out_w, channels) = grad_output.dim();
	let mut grad_input = Array4::<f32>::zeros((batch, in_h, in_w, channels));
	for y in 0..out_h {
		let ty = taps(y, in_h, out_h);
		for x in 0..out_w {
			let tx = taps(x, in_w, out_w);
			for b in 0..batch {
				for c in 0..channels {
					let g = grad_output[[b, y, x, c]];
					grad_input[[b, ty.lo, tx.lo, c]] += g * (1.0 - ty.frac) * (1.0 - tx.frac);
					grad_input[[b, ty.lo, tx.hi, c]] += g * (1.0 - ty.frac) * tx.frac;
					grad_input[[b, ty.hi, tx.lo, c]] += g * ty.frac * (1.0 - tx.frac);
					grad_input[[b, ty.hi, tx.hi, c]] += g * ty.frac * tx.frac;
				}
			}
		}
	}
	grad_input
}
